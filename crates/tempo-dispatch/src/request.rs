// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempo_core::{task::MAX_PRIORITY, PeriodicTask, RoutingOptions};
use uuid::Uuid;

use crate::error::{DispatchError, Result};

/// One unit of work to hand to the execution system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
	/// Name the worker resolves to a callable.
	pub task: String,
	pub args: Vec<Value>,
	pub kwargs: Map<String, Value>,
	pub routing: RoutingOptions,
	/// Absolute expiry. Workers discard the message after this instant.
	pub expires: Option<DateTime<Utc>>,
	/// Name of the periodic task this dispatch came from, if any.
	pub periodic_task_name: Option<String>,
}

impl DispatchRequest {
	pub fn new(task: impl Into<String>) -> Self {
		Self {
			task: task.into(),
			args: Vec::new(),
			kwargs: Map::new(),
			routing: RoutingOptions::default(),
			expires: None,
			periodic_task_name: None,
		}
	}

	/// Build the request for a periodic task fired at `now`. A relative
	/// `expire_seconds` becomes an absolute expiry here.
	pub fn from_task(task: &PeriodicTask, now: DateTime<Utc>) -> Self {
		Self {
			task: task.task.clone(),
			args: task.args.clone(),
			kwargs: task.kwargs.clone(),
			routing: task.routing.clone(),
			expires: task.expiry_at(now),
			periodic_task_name: Some(task.name.clone()),
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.task.trim().is_empty() {
			return Err(DispatchError::RoutingRejected(
				"task name is empty".to_string(),
			));
		}
		if let Some(priority) = self.routing.priority {
			if priority > MAX_PRIORITY {
				return Err(DispatchError::RoutingRejected(format!(
					"priority {priority} outside 0-{MAX_PRIORITY}"
				)));
			}
		}
		if let Some(queue) = &self.routing.queue {
			if queue.trim().is_empty() {
				return Err(DispatchError::RoutingRejected("queue is empty".to_string()));
			}
		}
		Ok(())
	}
}

/// Acknowledgement that the broker accepted the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
	pub dispatch_id: Uuid,
	pub queue: String,
	pub dispatched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validate_priority() {
		let mut req = DispatchRequest::new("app.tasks.add");
		req.routing.priority = Some(9);
		assert!(req.validate().is_ok());
		req.routing.priority = Some(10);
		assert!(matches!(
			req.validate(),
			Err(DispatchError::RoutingRejected(_))
		));
	}

	#[test]
	fn test_validate_empty_names() {
		assert!(DispatchRequest::new(" ").validate().is_err());
		let mut req = DispatchRequest::new("t");
		req.routing.queue = Some(String::new());
		assert!(req.validate().is_err());
	}
}
