// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema and change-marker triggers.
//!
//! Every statement is idempotent so `run_migrations` can run on each start.
//! The `periodic_task_changed` row is bumped by triggers only: inserts and
//! deletes of tasks, updates that touch a definition column, and updates or
//! deletes of schedules. The scheduler's own run-state writes
//! (`last_run_at`, `total_run_count`) never bump it.

use sqlx::SqlitePool;

use crate::error::Result;

const BUMP_MARKER: &str = "UPDATE periodic_task_changed \
	SET version = version + 1, last_update = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
	WHERE id = 1;";

fn statements() -> Vec<String> {
	let mut stmts: Vec<String> = vec![
		r#"
		CREATE TABLE IF NOT EXISTS interval_schedule (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			every INTEGER NOT NULL CHECK (every >= 1),
			period TEXT NOT NULL CHECK (period IN ('seconds', 'minutes', 'hours', 'days')),
			UNIQUE (every, period)
		)
		"#
		.to_string(),
		r#"
		CREATE TABLE IF NOT EXISTS crontab_schedule (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			minute TEXT NOT NULL DEFAULT '*',
			hour TEXT NOT NULL DEFAULT '*',
			day_of_month TEXT NOT NULL DEFAULT '*',
			month_of_year TEXT NOT NULL DEFAULT '*',
			day_of_week TEXT NOT NULL DEFAULT '*',
			timezone TEXT NOT NULL DEFAULT 'UTC'
		)
		"#
		.to_string(),
		r#"
		CREATE TABLE IF NOT EXISTS periodic_task (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			name TEXT NOT NULL UNIQUE,
			task TEXT NOT NULL,
			interval_id INTEGER REFERENCES interval_schedule(id) ON DELETE RESTRICT,
			crontab_id INTEGER REFERENCES crontab_schedule(id) ON DELETE RESTRICT,
			args TEXT NOT NULL DEFAULT '[]',
			kwargs TEXT NOT NULL DEFAULT '{}',
			queue TEXT,
			exchange TEXT,
			routing_key TEXT,
			priority INTEGER CHECK (priority IS NULL OR priority BETWEEN 0 AND 9),
			expires TEXT,
			expire_seconds INTEGER CHECK (expire_seconds IS NULL OR expire_seconds >= 0),
			one_off INTEGER NOT NULL DEFAULT 0,
			start_time TEXT,
			enabled INTEGER NOT NULL DEFAULT 1,
			last_run_at TEXT,
			total_run_count INTEGER NOT NULL DEFAULT 0 CHECK (total_run_count >= 0),
			date_changed TEXT NOT NULL,
			description TEXT NOT NULL DEFAULT '',
			CHECK ((interval_id IS NULL) <> (crontab_id IS NULL))
		)
		"#
		.to_string(),
		"CREATE INDEX IF NOT EXISTS idx_periodic_task_enabled ON periodic_task(enabled)".to_string(),
		r#"
		CREATE TABLE IF NOT EXISTS periodic_task_changed (
			id INTEGER PRIMARY KEY CHECK (id = 1),
			version INTEGER NOT NULL DEFAULT 0,
			last_update TEXT NOT NULL
		)
		"#
		.to_string(),
		r#"
		INSERT OR IGNORE INTO periodic_task_changed (id, version, last_update)
		VALUES (1, 0, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
		"#
		.to_string(),
		r#"
		CREATE TABLE IF NOT EXISTS task_result (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			dispatch_id TEXT NOT NULL UNIQUE,
			task_name TEXT NOT NULL,
			periodic_task_name TEXT,
			args TEXT,
			kwargs TEXT,
			status TEXT NOT NULL,
			result TEXT,
			traceback TEXT,
			worker TEXT,
			date_created TEXT NOT NULL,
			date_done TEXT
		)
		"#
		.to_string(),
		"CREATE INDEX IF NOT EXISTS idx_task_result_status ON task_result(status)".to_string(),
		"CREATE INDEX IF NOT EXISTS idx_task_result_date_done ON task_result(date_done)".to_string(),
	];

	stmts.push(format!(
		"CREATE TRIGGER IF NOT EXISTS periodic_task_insert_changed \
		AFTER INSERT ON periodic_task BEGIN {BUMP_MARKER} END"
	));
	stmts.push(format!(
		"CREATE TRIGGER IF NOT EXISTS periodic_task_delete_changed \
		AFTER DELETE ON periodic_task BEGIN {BUMP_MARKER} END"
	));
	stmts.push(format!(
		r#"
		CREATE TRIGGER IF NOT EXISTS periodic_task_update_changed
		AFTER UPDATE ON periodic_task
		WHEN OLD.name IS NOT NEW.name
			OR OLD.task IS NOT NEW.task
			OR OLD.interval_id IS NOT NEW.interval_id
			OR OLD.crontab_id IS NOT NEW.crontab_id
			OR OLD.args IS NOT NEW.args
			OR OLD.kwargs IS NOT NEW.kwargs
			OR OLD.queue IS NOT NEW.queue
			OR OLD.exchange IS NOT NEW.exchange
			OR OLD.routing_key IS NOT NEW.routing_key
			OR OLD.priority IS NOT NEW.priority
			OR OLD.expires IS NOT NEW.expires
			OR OLD.expire_seconds IS NOT NEW.expire_seconds
			OR OLD.one_off IS NOT NEW.one_off
			OR OLD.start_time IS NOT NEW.start_time
			OR OLD.enabled IS NOT NEW.enabled
			OR OLD.description IS NOT NEW.description
			OR OLD.date_changed IS NOT NEW.date_changed
		BEGIN {BUMP_MARKER} END
		"#
	));

	for table in ["interval_schedule", "crontab_schedule"] {
		let column = match table {
			"interval_schedule" => "interval_id",
			_ => "crontab_id",
		};
		stmts.push(format!(
			r#"
			CREATE TRIGGER IF NOT EXISTS {table}_update_changed
			AFTER UPDATE ON {table}
			BEGIN
				UPDATE periodic_task
				SET date_changed = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
				WHERE {column} = NEW.id;
				{BUMP_MARKER}
			END
			"#
		));
		stmts.push(format!(
			"CREATE TRIGGER IF NOT EXISTS {table}_delete_changed \
			AFTER DELETE ON {table} BEGIN {BUMP_MARKER} END"
		));
	}

	stmts
}

/// Create tables, indexes, the marker row and triggers.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	let mut tx = pool.begin().await?;
	for stmt in statements() {
		sqlx::query(&stmt).execute(&mut *tx).await?;
	}
	tx.commit().await?;

	tracing::info!("schema up to date");
	Ok(())
}
