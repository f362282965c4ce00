// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for schedule and task configuration.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Configuration errors. These are raised when a schedule or task is built,
/// never while deciding whether it is due.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("invalid {field} field '{expression}': {reason}")]
	InvalidCronField {
		field: &'static str,
		expression: String,
		reason: String,
	},

	#[error("invalid cron expression: {0}")]
	InvalidCronExpression(String),

	#[error("invalid timezone: {0}")]
	InvalidTimezone(String),

	#[error("invalid interval: {0}")]
	InvalidInterval(String),

	#[error("invalid schedule reference: {0}")]
	InvalidScheduleRef(String),

	#[error("invalid routing options: {0}")]
	InvalidRouting(String),

	#[error("unknown task status: {0}")]
	UnknownStatus(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}
