// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tempo_core::{
	CrontabSchedule, IntervalPeriod, IntervalSchedule, PeriodicTask, RoutingOptions, RunState,
	ScheduleDefinition, ScheduleRef, TaskId,
};

use crate::error::{Result, StoreError};
use crate::timestamp;

const TASK_SELECT: &str = r#"
	SELECT
		t.id, t.name, t.task, t.interval_id, t.crontab_id, t.args, t.kwargs,
		t.queue, t.exchange, t.routing_key, t.priority, t.expires, t.expire_seconds,
		t.one_off, t.start_time, t.enabled, t.last_run_at, t.total_run_count,
		t.date_changed, t.description,
		i.every AS interval_every, i.period AS interval_period,
		c.minute AS cron_minute, c.hour AS cron_hour, c.day_of_month AS cron_day_of_month,
		c.month_of_year AS cron_month_of_year, c.day_of_week AS cron_day_of_week,
		c.timezone AS cron_timezone
	FROM periodic_task t
	LEFT JOIN interval_schedule i ON i.id = t.interval_id
	LEFT JOIN crontab_schedule c ON c.id = t.crontab_id
"#;

/// The single change-marker row. `version` increases on every definition
/// change; the scheduler reloads when it moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMarker {
	pub version: i64,
	pub last_update: DateTime<Utc>,
}

/// Fields for a new task. Build with [`NewPeriodicTask::new`] and override.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPeriodicTask {
	pub name: String,
	pub task: String,
	pub schedule: ScheduleRef,
	pub args: Vec<Value>,
	pub kwargs: Map<String, Value>,
	pub routing: RoutingOptions,
	pub expires: Option<DateTime<Utc>>,
	pub expire_seconds: Option<u32>,
	pub one_off: bool,
	pub start_time: Option<DateTime<Utc>>,
	pub enabled: bool,
	pub description: String,
}

impl NewPeriodicTask {
	pub fn new(name: impl Into<String>, task: impl Into<String>, schedule: ScheduleRef) -> Self {
		Self {
			name: name.into(),
			task: task.into(),
			schedule,
			args: Vec::new(),
			kwargs: Map::new(),
			routing: RoutingOptions::default(),
			expires: None,
			expire_seconds: None,
			one_off: false,
			start_time: None,
			enabled: true,
			description: String::new(),
		}
	}
}

/// A partial update. `None` leaves a column untouched; the nested options
/// clear nullable columns with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
	pub name: Option<String>,
	pub task: Option<String>,
	pub schedule: Option<ScheduleRef>,
	pub args: Option<Vec<Value>>,
	pub kwargs: Option<Map<String, Value>>,
	pub routing: Option<RoutingOptions>,
	pub expires: Option<Option<DateTime<Utc>>>,
	pub expire_seconds: Option<Option<u32>>,
	pub one_off: Option<bool>,
	pub start_time: Option<Option<DateTime<Utc>>>,
	pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
	pub enabled: Option<bool>,
	pub limit: Option<u32>,
	pub offset: u32,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
	id: i64,
	name: String,
	task: String,
	interval_id: Option<i64>,
	crontab_id: Option<i64>,
	args: String,
	kwargs: String,
	queue: Option<String>,
	exchange: Option<String>,
	routing_key: Option<String>,
	priority: Option<i64>,
	expires: Option<String>,
	expire_seconds: Option<i64>,
	one_off: bool,
	start_time: Option<String>,
	enabled: bool,
	last_run_at: Option<String>,
	total_run_count: i64,
	date_changed: String,
	description: String,
	interval_every: Option<i64>,
	interval_period: Option<String>,
	cron_minute: Option<String>,
	cron_hour: Option<String>,
	cron_day_of_month: Option<String>,
	cron_month_of_year: Option<String>,
	cron_day_of_week: Option<String>,
	cron_timezone: Option<String>,
}

fn missing(column: &str, id: i64) -> StoreError {
	StoreError::InvalidRow(format!("task {id}: {column} missing"))
}

impl TryFrom<TaskRow> for PeriodicTask {
	type Error = StoreError;

	fn try_from(row: TaskRow) -> Result<Self> {
		let id = row.id;
		let schedule_ref = ScheduleRef::from_columns(row.interval_id, row.crontab_id)?;
		let schedule = match schedule_ref {
			ScheduleRef::Interval(_) => {
				let every = row.interval_every.ok_or_else(|| missing("interval", id))?;
				let period = row.interval_period.ok_or_else(|| missing("interval", id))?;
				ScheduleDefinition::Interval(IntervalSchedule {
					every: u32::try_from(every)
						.map_err(|_| StoreError::InvalidRow(format!("task {id}: every {every}")))?,
					period: period.parse::<IntervalPeriod>()?,
				})
			}
			ScheduleRef::Crontab(_) => ScheduleDefinition::Crontab(CrontabSchedule {
				minute: row.cron_minute.ok_or_else(|| missing("crontab", id))?,
				hour: row.cron_hour.ok_or_else(|| missing("crontab", id))?,
				day_of_month: row.cron_day_of_month.ok_or_else(|| missing("crontab", id))?,
				month_of_year: row.cron_month_of_year.ok_or_else(|| missing("crontab", id))?,
				day_of_week: row.cron_day_of_week.ok_or_else(|| missing("crontab", id))?,
				timezone: row.cron_timezone.ok_or_else(|| missing("crontab", id))?,
			}),
		};

		let priority = row
			.priority
			.map(|p| {
				u8::try_from(p).map_err(|_| StoreError::InvalidRow(format!("task {id}: priority {p}")))
			})
			.transpose()?;
		let expire_seconds = row
			.expire_seconds
			.map(|s| {
				u32::try_from(s)
					.map_err(|_| StoreError::InvalidRow(format!("task {id}: expire_seconds {s}")))
			})
			.transpose()?;

		Ok(PeriodicTask {
			id: TaskId(id),
			name: row.name,
			task: row.task,
			schedule_ref,
			schedule,
			args: serde_json::from_str(&row.args)?,
			kwargs: serde_json::from_str(&row.kwargs)?,
			routing: RoutingOptions {
				queue: row.queue,
				exchange: row.exchange,
				routing_key: row.routing_key,
				priority,
			},
			expires: timestamp::parse_opt("expires", row.expires)?,
			expire_seconds,
			one_off: row.one_off,
			start_time: timestamp::parse_opt("start_time", row.start_time)?,
			enabled: row.enabled,
			last_run_at: timestamp::parse_opt("last_run_at", row.last_run_at)?,
			total_run_count: u64::try_from(row.total_run_count).unwrap_or(0),
			date_changed: timestamp::parse("date_changed", &row.date_changed)?,
			description: row.description,
		})
	}
}

/// Decode rows, logging and skipping any that do not form a valid task.
fn decode_rows(rows: Vec<TaskRow>) -> Vec<PeriodicTask> {
	rows
		.into_iter()
		.filter_map(|row| {
			let id = row.id;
			let name = row.name.clone();
			match PeriodicTask::try_from(row) {
				Ok(task) => Some(task),
				Err(e) => {
					tracing::warn!(task_id = id, task_name = %name, error = %e, "skipping undecodable task row");
					None
				}
			}
		})
		.collect()
}

fn insert_error(err: sqlx::Error, name: &str, schedule: ScheduleRef) -> StoreError {
	if let sqlx::Error::Database(db) = &err {
		if db.is_unique_violation() {
			return StoreError::Conflict(format!("task name '{name}' already exists"));
		}
		if db.is_foreign_key_violation() {
			return StoreError::NotFound(format!("schedule {schedule}"));
		}
	}
	StoreError::Sqlx(err)
}

fn validate_definition(name: &str, task: &str, routing: &RoutingOptions) -> Result<()> {
	if name.trim().is_empty() {
		return Err(StoreError::InvalidRow("task name must not be empty".to_string()));
	}
	if task.trim().is_empty() {
		return Err(StoreError::InvalidRow("task identifier must not be empty".to_string()));
	}
	routing.validate()?;
	Ok(())
}

/// Periodic task rows: the scheduler's reads and run-state writes plus the
/// admin mutations.
#[derive(Clone)]
pub struct TaskRepository {
	pool: SqlitePool,
}

impl TaskRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn change_marker(&self) -> Result<Option<ChangeMarker>> {
		let row = sqlx::query_as::<_, (i64, String)>(
			"SELECT version, last_update FROM periodic_task_changed WHERE id = 1",
		)
		.fetch_optional(&self.pool)
		.await?;

		row
			.map(|(version, last_update)| {
				Ok(ChangeMarker {
					version,
					last_update: timestamp::parse("last_update", &last_update)?,
				})
			})
			.transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_enabled_tasks(&self) -> Result<Vec<PeriodicTask>> {
		let sql = format!("{TASK_SELECT} WHERE t.enabled = 1 ORDER BY t.id");
		let rows = sqlx::query_as::<_, TaskRow>(&sql)
			.fetch_all(&self.pool)
			.await?;

		Ok(decode_rows(rows))
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<PeriodicTask>> {
		let sql = format!(
			"{TASK_SELECT} WHERE (? IS NULL OR t.enabled = ?) ORDER BY t.id LIMIT ? OFFSET ?"
		);
		let rows = sqlx::query_as::<_, TaskRow>(&sql)
			.bind(filter.enabled)
			.bind(filter.enabled)
			.bind(filter.limit.map_or(-1, i64::from))
			.bind(i64::from(filter.offset))
			.fetch_all(&self.pool)
			.await?;

		Ok(decode_rows(rows))
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_task(&self, id: TaskId) -> Result<Option<PeriodicTask>> {
		let sql = format!("{TASK_SELECT} WHERE t.id = ?");
		let row = sqlx::query_as::<_, TaskRow>(&sql)
			.bind(id.0)
			.fetch_optional(&self.pool)
			.await?;

		row.map(PeriodicTask::try_from).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_task_by_name(&self, name: &str) -> Result<Option<PeriodicTask>> {
		let sql = format!("{TASK_SELECT} WHERE t.name = ?");
		let row = sqlx::query_as::<_, TaskRow>(&sql)
			.bind(name)
			.fetch_optional(&self.pool)
			.await?;

		row.map(PeriodicTask::try_from).transpose()
	}

	/// Write back the columns the scheduler owns. `enabled` can only be
	/// cleared here, so a stale scheduler never re-enables a disabled task.
	#[tracing::instrument(skip(self, state), fields(task_id = %id))]
	pub async fn save_run_state(&self, id: TaskId, state: &RunState) -> Result<()> {
		let count = i64::try_from(state.total_run_count)
			.map_err(|_| StoreError::InvalidRow(format!("total_run_count {}", state.total_run_count)))?;

		let result = sqlx::query(
			r#"
			UPDATE periodic_task
			SET last_run_at = ?, total_run_count = ?, enabled = (enabled AND ?)
			WHERE id = ?
			"#,
		)
		.bind(state.last_run_at.map(timestamp::format))
		.bind(count)
		.bind(state.enabled)
		.bind(id.0)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!("task {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, new), fields(task_name = %new.name))]
	pub async fn create_task(&self, new: &NewPeriodicTask) -> Result<TaskId> {
		validate_definition(&new.name, &new.task, &new.routing)?;
		let (interval_id, crontab_id) = new.schedule.to_columns();

		let result = sqlx::query(
			r#"
			INSERT INTO periodic_task (
				name, task, interval_id, crontab_id, args, kwargs,
				queue, exchange, routing_key, priority, expires, expire_seconds,
				one_off, start_time, enabled, date_changed, description
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&new.name)
		.bind(&new.task)
		.bind(interval_id)
		.bind(crontab_id)
		.bind(serde_json::to_string(&new.args)?)
		.bind(serde_json::to_string(&new.kwargs)?)
		.bind(&new.routing.queue)
		.bind(&new.routing.exchange)
		.bind(&new.routing.routing_key)
		.bind(new.routing.priority.map(i64::from))
		.bind(new.expires.map(timestamp::format))
		.bind(new.expire_seconds.map(i64::from))
		.bind(new.one_off)
		.bind(new.start_time.map(timestamp::format))
		.bind(new.enabled)
		.bind(timestamp::format(Utc::now()))
		.bind(&new.description)
		.execute(&self.pool)
		.await
		.map_err(|e| insert_error(e, &new.name, new.schedule))?;

		let id = TaskId(result.last_insert_rowid());
		tracing::info!(task_id = %id, task_name = %new.name, "periodic task created");
		Ok(id)
	}

	/// Apply a partial update. Moving a task to another schedule clears
	/// `last_run_at` so the new schedule starts fresh.
	#[tracing::instrument(skip(self, update), fields(task_id = %id))]
	pub async fn update_task(&self, id: TaskId, update: &TaskUpdate) -> Result<PeriodicTask> {
		let mut tx = self.pool.begin().await?;
		let current = fetch_in_tx(&mut tx, id)
			.await?
			.ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;

		let name = update.name.clone().unwrap_or(current.name.clone());
		let task = update.task.clone().unwrap_or(current.task.clone());
		let routing = update.routing.clone().unwrap_or(current.routing.clone());
		validate_definition(&name, &task, &routing)?;

		let schedule = update.schedule.unwrap_or(current.schedule_ref);
		let last_run_at = if schedule != current.schedule_ref {
			None
		} else {
			current.last_run_at
		};
		let (interval_id, crontab_id) = schedule.to_columns();
		let args = update.args.as_ref().unwrap_or(&current.args);
		let kwargs = update.kwargs.as_ref().unwrap_or(&current.kwargs);

		sqlx::query(
			r#"
			UPDATE periodic_task SET
				name = ?, task = ?, interval_id = ?, crontab_id = ?, args = ?, kwargs = ?,
				queue = ?, exchange = ?, routing_key = ?, priority = ?, expires = ?,
				expire_seconds = ?, one_off = ?, start_time = ?, last_run_at = ?,
				description = ?, date_changed = ?
			WHERE id = ?
			"#,
		)
		.bind(&name)
		.bind(&task)
		.bind(interval_id)
		.bind(crontab_id)
		.bind(serde_json::to_string(args)?)
		.bind(serde_json::to_string(kwargs)?)
		.bind(&routing.queue)
		.bind(&routing.exchange)
		.bind(&routing.routing_key)
		.bind(routing.priority.map(i64::from))
		.bind(update.expires.unwrap_or(current.expires).map(timestamp::format))
		.bind(
			update
				.expire_seconds
				.unwrap_or(current.expire_seconds)
				.map(i64::from),
		)
		.bind(update.one_off.unwrap_or(current.one_off))
		.bind(
			update
				.start_time
				.unwrap_or(current.start_time)
				.map(timestamp::format),
		)
		.bind(last_run_at.map(timestamp::format))
		.bind(update.description.as_ref().unwrap_or(&current.description))
		.bind(timestamp::format(Utc::now()))
		.bind(id.0)
		.execute(&mut *tx)
		.await
		.map_err(|e| insert_error(e, &name, schedule))?;

		let updated = fetch_in_tx(&mut tx, id)
			.await?
			.ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
		tx.commit().await?;

		tracing::info!(task_id = %id, task_name = %updated.name, "periodic task updated");
		Ok(updated)
	}

	#[tracing::instrument(skip(self), fields(task_id = %id))]
	pub async fn set_enabled(&self, id: TaskId, enabled: bool) -> Result<()> {
		let result =
			sqlx::query("UPDATE periodic_task SET enabled = ?, date_changed = ? WHERE id = ?")
				.bind(enabled)
				.bind(timestamp::format(Utc::now()))
				.bind(id.0)
				.execute(&self.pool)
				.await?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!("task {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(task_id = %id))]
	pub async fn delete_task(&self, id: TaskId) -> Result<()> {
		let result = sqlx::query("DELETE FROM periodic_task WHERE id = ?")
			.bind(id.0)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!("task {id}")));
		}
		Ok(())
	}

	/// Clear `last_run_at` and zero `total_run_count`. This is the explicit
	/// reset that lets a one-off task fire again.
	#[tracing::instrument(skip(self), fields(task_id = %id))]
	pub async fn reset_run_state(&self, id: TaskId) -> Result<()> {
		let result = sqlx::query(
			"UPDATE periodic_task SET last_run_at = NULL, total_run_count = 0, date_changed = ? WHERE id = ?",
		)
		.bind(timestamp::format(Utc::now()))
		.bind(id.0)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!("task {id}")));
		}
		Ok(())
	}
}

async fn fetch_in_tx(tx: &mut Transaction<'_, Sqlite>, id: TaskId) -> Result<Option<PeriodicTask>> {
	let sql = format!("{TASK_SELECT} WHERE t.id = ?");
	let row = sqlx::query_as::<_, TaskRow>(&sql)
		.bind(id.0)
		.fetch_optional(&mut **tx)
		.await?;

	row.map(PeriodicTask::try_from).transpose()
}

/// What the scheduler loop needs from the store.
#[async_trait]
pub trait TaskStore: Send + Sync {
	async fn change_marker(&self) -> Result<Option<ChangeMarker>>;
	async fn list_enabled_tasks(&self) -> Result<Vec<PeriodicTask>>;
	async fn get_task(&self, id: TaskId) -> Result<Option<PeriodicTask>>;
	async fn save_run_state(&self, id: TaskId, state: &RunState) -> Result<()>;
}

#[async_trait]
impl TaskStore for TaskRepository {
	async fn change_marker(&self) -> Result<Option<ChangeMarker>> {
		self.change_marker().await
	}

	async fn list_enabled_tasks(&self) -> Result<Vec<PeriodicTask>> {
		self.list_enabled_tasks().await
	}

	async fn get_task(&self, id: TaskId) -> Result<Option<PeriodicTask>> {
		self.get_task(id).await
	}

	async fn save_run_state(&self, id: TaskId, state: &RunState) -> Result<()> {
		self.save_run_state(id, state).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schedule::ScheduleRepository;
	use crate::testing::create_test_pool;
	use chrono::TimeZone;
	use serde_json::json;
	use tempo_core::{CrontabId, IntervalId};

	struct Fixture {
		tasks: TaskRepository,
		schedules: ScheduleRepository,
		interval: IntervalId,
		crontab: CrontabId,
	}

	async fn fixture() -> Fixture {
		let pool = create_test_pool().await;
		let schedules = ScheduleRepository::new(pool.clone());
		let interval = schedules
			.create_interval(&IntervalSchedule::new(10, IntervalPeriod::Seconds).unwrap())
			.await
			.unwrap();
		let crontab = schedules
			.create_crontab(&CrontabSchedule::from_expression("*/5 * * * *", "UTC").unwrap())
			.await
			.unwrap();
		Fixture {
			tasks: TaskRepository::new(pool),
			schedules,
			interval,
			crontab,
		}
	}

	async fn version(repo: &TaskRepository) -> i64 {
		repo.change_marker().await.unwrap().unwrap().version
	}

	#[tokio::test]
	async fn test_create_and_get_task() {
		let f = fixture().await;
		let mut new = NewPeriodicTask::new(
			"report",
			"app.tasks.report",
			ScheduleRef::Interval(f.interval),
		);
		new.args = vec![json!(1), json!("two")];
		new.kwargs.insert("verbose".to_string(), json!(true));
		new.routing.queue = Some("reports".to_string());
		new.routing.priority = Some(5);
		new.expire_seconds = Some(30);

		let id = f.tasks.create_task(&new).await.unwrap();
		let task = f.tasks.get_task(id).await.unwrap().unwrap();

		assert_eq!(task.name, "report");
		assert_eq!(task.task, "app.tasks.report");
		assert_eq!(task.args, vec![json!(1), json!("two")]);
		assert_eq!(task.kwargs["verbose"], json!(true));
		assert_eq!(task.routing.queue.as_deref(), Some("reports"));
		assert_eq!(task.routing.priority, Some(5));
		assert_eq!(task.expire_seconds, Some(30));
		assert!(task.enabled);
		assert_eq!(task.total_run_count, 0);
		assert!(task.last_run_at.is_none());
		assert_eq!(
			task.schedule,
			ScheduleDefinition::Interval(IntervalSchedule {
				every: 10,
				period: IntervalPeriod::Seconds
			})
		);

		let by_name = f.tasks.get_task_by_name("report").await.unwrap().unwrap();
		assert_eq!(by_name.id, id);
	}

	#[tokio::test]
	async fn test_duplicate_name_conflicts() {
		let f = fixture().await;
		let new = NewPeriodicTask::new("dup", "t", ScheduleRef::Interval(f.interval));
		f.tasks.create_task(&new).await.unwrap();
		assert!(matches!(
			f.tasks.create_task(&new).await,
			Err(StoreError::Conflict(_))
		));
	}

	#[tokio::test]
	async fn test_missing_schedule_not_found() {
		let f = fixture().await;
		let new = NewPeriodicTask::new("x", "t", ScheduleRef::Interval(IntervalId(999)));
		assert!(matches!(
			f.tasks.create_task(&new).await,
			Err(StoreError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_invalid_priority_rejected() {
		let f = fixture().await;
		let mut new = NewPeriodicTask::new("x", "t", ScheduleRef::Interval(f.interval));
		new.routing.priority = Some(12);
		assert!(matches!(
			f.tasks.create_task(&new).await,
			Err(StoreError::Invalid(_))
		));
	}

	#[tokio::test]
	async fn test_save_run_state_does_not_bump_marker() {
		let f = fixture().await;
		let id = f
			.tasks
			.create_task(&NewPeriodicTask::new("a", "t", ScheduleRef::Interval(f.interval)))
			.await
			.unwrap();
		let before = version(&f.tasks).await;

		let ran_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 10).unwrap();
		f.tasks
			.save_run_state(
				id,
				&RunState {
					last_run_at: Some(ran_at),
					total_run_count: 1,
					enabled: true,
				},
			)
			.await
			.unwrap();

		assert_eq!(version(&f.tasks).await, before);
		let task = f.tasks.get_task(id).await.unwrap().unwrap();
		assert_eq!(task.last_run_at, Some(ran_at));
		assert_eq!(task.total_run_count, 1);
	}

	#[tokio::test]
	async fn test_save_run_state_never_reenables() {
		let f = fixture().await;
		let id = f
			.tasks
			.create_task(&NewPeriodicTask::new("a", "t", ScheduleRef::Interval(f.interval)))
			.await
			.unwrap();
		f.tasks.set_enabled(id, false).await.unwrap();

		f.tasks
			.save_run_state(
				id,
				&RunState {
					last_run_at: Some(Utc::now()),
					total_run_count: 1,
					enabled: true,
				},
			)
			.await
			.unwrap();
		assert!(!f.tasks.get_task(id).await.unwrap().unwrap().enabled);
	}

	#[tokio::test]
	async fn test_save_run_state_missing_task() {
		let f = fixture().await;
		let result = f
			.tasks
			.save_run_state(
				TaskId(42),
				&RunState {
					last_run_at: None,
					total_run_count: 0,
					enabled: true,
				},
			)
			.await;
		assert!(matches!(result, Err(StoreError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_admin_mutations_bump_marker() {
		let f = fixture().await;
		let v0 = version(&f.tasks).await;
		let id = f
			.tasks
			.create_task(&NewPeriodicTask::new("a", "t", ScheduleRef::Interval(f.interval)))
			.await
			.unwrap();
		let v1 = version(&f.tasks).await;
		assert!(v1 > v0);

		f.tasks.set_enabled(id, false).await.unwrap();
		let v2 = version(&f.tasks).await;
		assert!(v2 > v1);

		f.tasks.reset_run_state(id).await.unwrap();
		let v3 = version(&f.tasks).await;
		assert!(v3 > v2);

		f.tasks.delete_task(id).await.unwrap();
		assert!(version(&f.tasks).await > v3);
	}

	#[tokio::test]
	async fn test_update_task_schedule_change_resets_last_run() {
		let f = fixture().await;
		let id = f
			.tasks
			.create_task(&NewPeriodicTask::new("a", "t", ScheduleRef::Interval(f.interval)))
			.await
			.unwrap();
		f.tasks
			.save_run_state(
				id,
				&RunState {
					last_run_at: Some(Utc::now()),
					total_run_count: 3,
					enabled: true,
				},
			)
			.await
			.unwrap();

		let renamed = f
			.tasks
			.update_task(
				id,
				&TaskUpdate {
					description: Some("nightly".to_string()),
					..Default::default()
				},
			)
			.await
			.unwrap();
		assert!(renamed.last_run_at.is_some());
		assert_eq!(renamed.description, "nightly");

		let moved = f
			.tasks
			.update_task(
				id,
				&TaskUpdate {
					schedule: Some(ScheduleRef::Crontab(f.crontab)),
					..Default::default()
				},
			)
			.await
			.unwrap();
		assert!(moved.last_run_at.is_none());
		assert_eq!(moved.total_run_count, 3);
		assert!(matches!(moved.schedule, ScheduleDefinition::Crontab(_)));
	}

	#[tokio::test]
	async fn test_update_missing_task() {
		let f = fixture().await;
		let result = f.tasks.update_task(TaskId(7), &TaskUpdate::default()).await;
		assert!(matches!(result, Err(StoreError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_schedule_in_use_cannot_be_deleted() {
		let f = fixture().await;
		f.tasks
			.create_task(&NewPeriodicTask::new("a", "t", ScheduleRef::Crontab(f.crontab)))
			.await
			.unwrap();
		assert!(matches!(
			f.schedules.delete_crontab(f.crontab).await,
			Err(StoreError::Conflict(_))
		));
	}

	#[tokio::test]
	async fn test_list_enabled_and_filtered() {
		let f = fixture().await;
		for name in ["a", "b", "c"] {
			f.tasks
				.create_task(&NewPeriodicTask::new(name, "t", ScheduleRef::Interval(f.interval)))
				.await
				.unwrap();
		}
		let b = f.tasks.get_task_by_name("b").await.unwrap().unwrap();
		f.tasks.set_enabled(b.id, false).await.unwrap();

		let enabled = f.tasks.list_enabled_tasks().await.unwrap();
		let names: Vec<_> = enabled.iter().map(|t| t.name.as_str()).collect();
		assert_eq!(names, vec!["a", "c"]);

		let disabled = f
			.tasks
			.list_tasks(TaskFilter {
				enabled: Some(false),
				..Default::default()
			})
			.await
			.unwrap();
		assert_eq!(disabled.len(), 1);

		let page = f
			.tasks
			.list_tasks(TaskFilter {
				enabled: None,
				limit: Some(2),
				offset: 1,
			})
			.await
			.unwrap();
		let names: Vec<_> = page.iter().map(|t| t.name.as_str()).collect();
		assert_eq!(names, vec!["b", "c"]);
	}

	#[tokio::test]
	async fn test_crontab_update_refreshes_date_changed() {
		let f = fixture().await;
		let id = f
			.tasks
			.create_task(&NewPeriodicTask::new("a", "t", ScheduleRef::Crontab(f.crontab)))
			.await
			.unwrap();
		let before = f.tasks.get_task(id).await.unwrap().unwrap();
		let v = version(&f.tasks).await;

		tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		f.schedules
			.update_crontab(
				f.crontab,
				&CrontabSchedule::from_expression("0 * * * *", "UTC").unwrap(),
			)
			.await
			.unwrap();

		let after = f.tasks.get_task(id).await.unwrap().unwrap();
		assert!(version(&f.tasks).await > v);
		assert_ne!(after.date_changed, before.date_changed);
		match after.schedule {
			ScheduleDefinition::Crontab(c) => assert_eq!(c.minute, "0"),
			other => panic!("unexpected schedule {other:?}"),
		}
	}
}
