// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tempo_core::{TaskResult, TaskResultUpdate, TaskStatus};

use crate::error::{Result, StoreError};
use crate::timestamp;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultFilter {
	pub task_name: Option<String>,
	pub status: Option<TaskStatus>,
	pub limit: Option<u32>,
	pub offset: u32,
}

/// Result counts per status plus task definition counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
	pub results_by_status: BTreeMap<String, u64>,
	pub total_results: u64,
	pub enabled_tasks: u64,
	pub disabled_tasks: u64,
}

#[derive(sqlx::FromRow)]
struct ResultRow {
	id: i64,
	dispatch_id: String,
	task_name: String,
	periodic_task_name: Option<String>,
	args: Option<String>,
	kwargs: Option<String>,
	status: String,
	result: Option<String>,
	traceback: Option<String>,
	worker: Option<String>,
	date_created: String,
	date_done: Option<String>,
}

impl TryFrom<ResultRow> for TaskResult {
	type Error = StoreError;

	fn try_from(row: ResultRow) -> Result<Self> {
		Ok(TaskResult {
			id: row.id,
			dispatch_id: row.dispatch_id,
			task_name: row.task_name,
			periodic_task_name: row.periodic_task_name,
			args: row.args,
			kwargs: row.kwargs,
			status: row.status.parse()?,
			result: row.result,
			traceback: row.traceback,
			worker: row.worker,
			date_created: timestamp::parse("date_created", &row.date_created)?,
			date_done: timestamp::parse_opt("date_done", row.date_done)?,
		})
	}
}

const RESULT_COLUMNS: &str = "id, dispatch_id, task_name, periodic_task_name, args, kwargs, \
	status, result, traceback, worker, date_created, date_done";

/// Execution results written by the worker-side lifecycle hooks.
#[derive(Clone)]
pub struct TaskResultRepository {
	pool: SqlitePool,
}

impl TaskResultRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Upsert by dispatch id. Terminal statuses stamp `date_done`; argument
	/// columns keep their first non-null value.
	#[tracing::instrument(skip(self, update), fields(dispatch_id = %update.dispatch_id, status = %update.status))]
	pub async fn record(&self, update: &TaskResultUpdate) -> Result<TaskResult> {
		let now = Utc::now();
		let done = update.status.is_terminal().then(|| timestamp::format(now));

		sqlx::query(
			r#"
			INSERT INTO task_result (
				dispatch_id, task_name, periodic_task_name, args, kwargs, status,
				result, traceback, worker, date_created, date_done
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(dispatch_id) DO UPDATE SET
				status = excluded.status,
				result = COALESCE(excluded.result, task_result.result),
				traceback = COALESCE(excluded.traceback, task_result.traceback),
				worker = COALESCE(excluded.worker, task_result.worker),
				periodic_task_name = COALESCE(task_result.periodic_task_name, excluded.periodic_task_name),
				args = COALESCE(task_result.args, excluded.args),
				kwargs = COALESCE(task_result.kwargs, excluded.kwargs),
				date_done = COALESCE(excluded.date_done, task_result.date_done)
			"#,
		)
		.bind(&update.dispatch_id)
		.bind(&update.task_name)
		.bind(&update.periodic_task_name)
		.bind(&update.args)
		.bind(&update.kwargs)
		.bind(update.status.as_str())
		.bind(&update.result)
		.bind(&update.traceback)
		.bind(&update.worker)
		.bind(timestamp::format(now))
		.bind(done)
		.execute(&self.pool)
		.await?;

		self
			.get(&update.dispatch_id)
			.await?
			.ok_or_else(|| StoreError::NotFound(format!("result {}", update.dispatch_id)))
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&self, dispatch_id: &str) -> Result<Option<TaskResult>> {
		let sql = format!("SELECT {RESULT_COLUMNS} FROM task_result WHERE dispatch_id = ?");
		let row = sqlx::query_as::<_, ResultRow>(&sql)
			.bind(dispatch_id)
			.fetch_optional(&self.pool)
			.await?;

		row.map(TaskResult::try_from).transpose()
	}

	/// Newest first.
	#[tracing::instrument(skip(self))]
	pub async fn list(&self, filter: &ResultFilter) -> Result<Vec<TaskResult>> {
		let sql = format!(
			r#"
			SELECT {RESULT_COLUMNS} FROM task_result
			WHERE (? IS NULL OR task_name = ? OR periodic_task_name = ?)
				AND (? IS NULL OR status = ?)
			ORDER BY date_created DESC, id DESC
			LIMIT ? OFFSET ?
			"#
		);
		let status = filter.status.map(|s| s.as_str());
		let rows = sqlx::query_as::<_, ResultRow>(&sql)
			.bind(&filter.task_name)
			.bind(&filter.task_name)
			.bind(&filter.task_name)
			.bind(status)
			.bind(status)
			.bind(filter.limit.map_or(-1, i64::from))
			.bind(i64::from(filter.offset))
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(TaskResult::try_from).collect()
	}

	/// Delete finished results whose `date_done` is older than `days`.
	#[tracing::instrument(skip(self))]
	pub async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
		let cutoff = Utc::now()
			.checked_sub_signed(Duration::days(i64::from(days)))
			.ok_or_else(|| StoreError::OutOfRange(format!("retention of {days} days")))?;
		let result =
			sqlx::query("DELETE FROM task_result WHERE date_done IS NOT NULL AND date_done < ?")
				.bind(timestamp::format(cutoff))
				.execute(&self.pool)
				.await?;

		let deleted = result.rows_affected();
		tracing::info!(deleted, days, "old task results removed");
		Ok(deleted)
	}

	#[tracing::instrument(skip(self))]
	pub async fn statistics(&self) -> Result<TaskStatistics> {
		let by_status = sqlx::query_as::<_, (String, i64)>(
			"SELECT status, COUNT(*) FROM task_result GROUP BY status",
		)
		.fetch_all(&self.pool)
		.await?;

		let (enabled, disabled) = sqlx::query_as::<_, (i64, i64)>(
			r#"
			SELECT
				COALESCE(SUM(CASE WHEN enabled THEN 1 ELSE 0 END), 0),
				COALESCE(SUM(CASE WHEN enabled THEN 0 ELSE 1 END), 0)
			FROM periodic_task
			"#,
		)
		.fetch_one(&self.pool)
		.await?;

		let mut stats = TaskStatistics {
			enabled_tasks: enabled.max(0) as u64,
			disabled_tasks: disabled.max(0) as u64,
			..Default::default()
		};
		for (status, count) in by_status {
			let count = count.max(0) as u64;
			stats.total_results += count;
			stats.results_by_status.insert(status, count);
		}
		Ok(stats)
	}
}
