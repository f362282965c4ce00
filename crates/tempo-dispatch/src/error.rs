// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Every variant is recoverable from the scheduler's point of view.
#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("broker unavailable: {0}")]
	BrokerUnavailable(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("routing rejected: {0}")]
	RoutingRejected(String),
}

impl From<redis::RedisError> for DispatchError {
	fn from(err: redis::RedisError) -> Self {
		DispatchError::BrokerUnavailable(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, DispatchError>;
