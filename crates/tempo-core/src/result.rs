// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Execution results reported by the worker side, keyed by dispatch id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
	Pending,
	Started,
	Success,
	Failure,
	Retry,
	Revoked,
}

impl TaskStatus {
	pub const ALL: [TaskStatus; 6] = [
		TaskStatus::Pending,
		TaskStatus::Started,
		TaskStatus::Success,
		TaskStatus::Failure,
		TaskStatus::Retry,
		TaskStatus::Revoked,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			TaskStatus::Pending => "PENDING",
			TaskStatus::Started => "STARTED",
			TaskStatus::Success => "SUCCESS",
			TaskStatus::Failure => "FAILURE",
			TaskStatus::Retry => "RETRY",
			TaskStatus::Revoked => "REVOKED",
		}
	}

	/// Terminal states stamp `date_done`.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			TaskStatus::Success | TaskStatus::Failure | TaskStatus::Revoked
		)
	}
}

impl std::str::FromStr for TaskStatus {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		TaskStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
	}
}

impl std::fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
	pub id: i64,
	pub dispatch_id: String,
	pub task_name: String,
	pub periodic_task_name: Option<String>,
	pub args: Option<String>,
	pub kwargs: Option<String>,
	pub status: TaskStatus,
	pub result: Option<String>,
	pub traceback: Option<String>,
	pub worker: Option<String>,
	pub date_created: DateTime<Utc>,
	pub date_done: Option<DateTime<Utc>>,
}

/// A lifecycle event from the execution system. Creates the result row on
/// first sight of `dispatch_id`, updates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultUpdate {
	pub dispatch_id: String,
	pub task_name: String,
	pub periodic_task_name: Option<String>,
	pub args: Option<String>,
	pub kwargs: Option<String>,
	pub status: TaskStatus,
	pub result: Option<String>,
	pub traceback: Option<String>,
	pub worker: Option<String>,
}

impl TaskResultUpdate {
	pub fn new(dispatch_id: impl Into<String>, task_name: impl Into<String>, status: TaskStatus) -> Self {
		Self {
			dispatch_id: dispatch_id.into(),
			task_name: task_name.into(),
			periodic_task_name: None,
			args: None,
			kwargs: None,
			status,
			result: None,
			traceback: None,
			worker: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_parse_round_trip() {
		for status in TaskStatus::ALL {
			assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
		}
		assert!("DONE".parse::<TaskStatus>().is_err());
	}

	#[test]
	fn test_terminal_states() {
		assert!(TaskStatus::Success.is_terminal());
		assert!(TaskStatus::Failure.is_terminal());
		assert!(TaskStatus::Revoked.is_terminal());
		assert!(!TaskStatus::Pending.is_terminal());
		assert!(!TaskStatus::Started.is_terminal());
		assert!(!TaskStatus::Retry.is_terminal());
	}
}
