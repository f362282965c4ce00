// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tempo_core::TaskId;
use tempo_dispatch::DispatchError;
use tempo_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("task not found: {0}")]
	TaskNotFound(String),

	#[error("store error: {0}")]
	Store(#[from] StoreError),

	#[error("dispatch error: {0}")]
	Dispatch(#[from] DispatchError),
}

impl SchedulerError {
	pub(crate) fn missing(id: TaskId) -> Self {
		SchedulerError::TaskNotFound(id.to_string())
	}
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
