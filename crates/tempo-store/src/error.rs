// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tempo_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Invalid row: {0}")]
	InvalidRow(String),

	#[error("Out of range: {0}")]
	OutOfRange(String),

	#[error("Invalid definition: {0}")]
	Invalid(#[from] CoreError),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl StoreError {
	/// Map a unique/foreign-key violation into `Conflict`, keep everything else.
	pub(crate) fn from_constraint(err: sqlx::Error, context: impl Into<String>) -> Self {
		if let sqlx::Error::Database(db) = &err {
			if db.is_unique_violation() || db.is_foreign_key_violation() {
				return StoreError::Conflict(context.into());
			}
		}
		StoreError::Sqlx(err)
	}
}

pub type Result<T> = std::result::Result<T, StoreError>;
