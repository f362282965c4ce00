// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redis broker gateway. Messages are pushed onto the list named after the
//! queue, where Celery workers consume them.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::envelope;
use crate::error::Result;
use crate::gateway::DispatchGateway;
use crate::request::{DispatchReceipt, DispatchRequest};

pub struct RedisGateway {
	conn: ConnectionManager,
	default_queue: String,
	origin: String,
}

impl RedisGateway {
	/// Connect to `url`. Fails with `BrokerUnavailable` if Redis is unreachable.
	#[tracing::instrument(skip(url))]
	pub async fn connect(url: &str, default_queue: &str) -> Result<Self> {
		let client = redis::Client::open(url)?;
		let conn = ConnectionManager::new(client).await?;

		let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
		tracing::info!(queue = %default_queue, "connected to broker");

		Ok(Self {
			conn,
			default_queue: default_queue.to_string(),
			origin: format!("tempo@{host}"),
		})
	}
}

#[async_trait]
impl DispatchGateway for RedisGateway {
	#[tracing::instrument(skip(self, request), fields(task = %request.task))]
	async fn enqueue(&self, request: &DispatchRequest) -> Result<DispatchReceipt> {
		let dispatch_id = Uuid::new_v4();
		let (queue, envelope) =
			envelope::build(request, dispatch_id, &self.default_queue, &self.origin)?;
		let payload = serde_json::to_string(&envelope)?;

		let mut conn = self.conn.clone();
		let _: i64 = conn.lpush(&queue, payload).await?;

		tracing::debug!(dispatch_id = %dispatch_id, queue = %queue, "message pushed");
		Ok(DispatchReceipt {
			dispatch_id,
			queue,
			dispatched_at: Utc::now(),
		})
	}
}
