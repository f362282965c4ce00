// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::error::StoreError;

/// Connection limits for the shared database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
	pub busy_timeout: Duration,
	pub max_connections: u32,
}

impl Default for PoolSettings {
	fn default() -> Self {
		Self {
			busy_timeout: Duration::from_secs(5),
			max_connections: 4,
		}
	}
}

/// Create a SqlitePool with default [`PoolSettings`].
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
	create_pool_with(database_url, &PoolSettings::default()).await
}

/// Create a SqlitePool with WAL mode, foreign keys on and a busy timeout so
/// the admin side and the scheduler can share one database file.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./tempo.db")
/// * `settings` - busy timeout and pool size
///
/// # Errors
/// Returns `StoreError::InvalidRow` if the URL is invalid, or the connect error.
#[tracing::instrument(skip(database_url), fields(max_connections = settings.max_connections))]
pub async fn create_pool_with(
	database_url: &str,
	settings: &PoolSettings,
) -> Result<SqlitePool, StoreError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| StoreError::InvalidRow(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.busy_timeout(settings.busy_timeout)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(settings.max_connections.max(1))
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}
