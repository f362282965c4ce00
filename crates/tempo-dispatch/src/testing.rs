// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A gateway that records requests in memory and can be told to fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{DispatchError, Result};
use crate::gateway::DispatchGateway;
use crate::request::{DispatchReceipt, DispatchRequest};

#[derive(Default)]
pub struct RecordingGateway {
	sent: Mutex<Vec<DispatchRequest>>,
	failing: AtomicBool,
}

impl RecordingGateway {
	pub fn new() -> Self {
		Self::default()
	}

	/// While set, every enqueue fails with `BrokerUnavailable`.
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn sent(&self) -> Vec<DispatchRequest> {
		self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	pub fn sent_count(&self) -> usize {
		self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	/// Number of requests recorded for the given periodic task name.
	pub fn count_for(&self, periodic_task_name: &str) -> usize {
		self.sent()
			.iter()
			.filter(|r| r.periodic_task_name.as_deref() == Some(periodic_task_name))
			.count()
	}
}

#[async_trait]
impl DispatchGateway for RecordingGateway {
	async fn enqueue(&self, request: &DispatchRequest) -> Result<DispatchReceipt> {
		request.validate()?;
		if self.failing.load(Ordering::SeqCst) {
			return Err(DispatchError::BrokerUnavailable(
				"recording gateway set to fail".to_string(),
			));
		}

		self.sent
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push(request.clone());

		Ok(DispatchReceipt {
			dispatch_id: Uuid::new_v4(),
			queue: request
				.routing
				.queue
				.clone()
				.unwrap_or_else(|| "celery".to_string()),
			dispatched_at: Utc::now(),
		})
	}
}
