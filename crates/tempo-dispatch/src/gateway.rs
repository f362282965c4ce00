// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::envelope;
use crate::error::Result;
use crate::request::{DispatchReceipt, DispatchRequest};

/// Submits work to the execution system. Returns once the broker has
/// accepted the message, never waits for the task to run.
#[async_trait]
pub trait DispatchGateway: Send + Sync {
	async fn enqueue(&self, request: &DispatchRequest) -> Result<DispatchReceipt>;
}

/// Builds the envelope and logs it instead of sending. Used for dry runs.
pub struct LoggingGateway {
	default_queue: String,
}

impl LoggingGateway {
	pub fn new(default_queue: impl Into<String>) -> Self {
		Self {
			default_queue: default_queue.into(),
		}
	}
}

#[async_trait]
impl DispatchGateway for LoggingGateway {
	async fn enqueue(&self, request: &DispatchRequest) -> Result<DispatchReceipt> {
		let dispatch_id = Uuid::new_v4();
		let (queue, envelope) = envelope::build(request, dispatch_id, &self.default_queue, "tempo-dry-run")?;

		tracing::info!(
			dispatch_id = %dispatch_id,
			task = %request.task,
			queue = %queue,
			argsrepr = %envelope.headers.argsrepr,
			kwargsrepr = %envelope.headers.kwargsrepr,
			"dry run: task not sent"
		);

		Ok(DispatchReceipt {
			dispatch_id,
			queue,
			dispatched_at: Utc::now(),
		})
	}
}
