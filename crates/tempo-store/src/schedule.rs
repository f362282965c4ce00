// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::SqlitePool;
use tempo_core::{CrontabId, CrontabSchedule, IntervalId, IntervalPeriod, IntervalSchedule};

use crate::error::{Result, StoreError};

#[derive(sqlx::FromRow)]
struct IntervalRow {
	id: i64,
	every: i64,
	period: String,
}

impl IntervalRow {
	fn into_schedule(self) -> Result<(IntervalId, IntervalSchedule)> {
		let every = u32::try_from(self.every)
			.map_err(|_| StoreError::InvalidRow(format!("interval every {}", self.every)))?;
		Ok((
			IntervalId(self.id),
			IntervalSchedule {
				every,
				period: self.period.parse::<IntervalPeriod>()?,
			},
		))
	}
}

#[derive(sqlx::FromRow)]
struct CrontabRow {
	id: i64,
	minute: String,
	hour: String,
	day_of_month: String,
	month_of_year: String,
	day_of_week: String,
	timezone: String,
}

impl CrontabRow {
	fn into_schedule(self) -> (CrontabId, CrontabSchedule) {
		(
			CrontabId(self.id),
			CrontabSchedule {
				minute: self.minute,
				hour: self.hour,
				day_of_month: self.day_of_month,
				month_of_year: self.month_of_year,
				day_of_week: self.day_of_week,
				timezone: self.timezone,
			},
		)
	}
}

/// Interval and crontab schedule rows.
#[derive(Clone)]
pub struct ScheduleRepository {
	pool: SqlitePool,
}

impl ScheduleRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Get-or-create: `(every, period)` is unique, so an existing row is reused.
	#[tracing::instrument(skip(self), fields(every = schedule.every, period = %schedule.period))]
	pub async fn create_interval(&self, schedule: &IntervalSchedule) -> Result<IntervalId> {
		schedule.validate()?;

		sqlx::query("INSERT OR IGNORE INTO interval_schedule (every, period) VALUES (?, ?)")
			.bind(i64::from(schedule.every))
			.bind(schedule.period.as_str())
			.execute(&self.pool)
			.await?;

		let id: i64 =
			sqlx::query_scalar("SELECT id FROM interval_schedule WHERE every = ? AND period = ?")
				.bind(i64::from(schedule.every))
				.bind(schedule.period.as_str())
				.fetch_one(&self.pool)
				.await?;

		Ok(IntervalId(id))
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_interval(&self, id: IntervalId) -> Result<Option<IntervalSchedule>> {
		let row = sqlx::query_as::<_, IntervalRow>(
			"SELECT id, every, period FROM interval_schedule WHERE id = ?",
		)
		.bind(id.0)
		.fetch_optional(&self.pool)
		.await?;

		row
			.map(|r| r.into_schedule().map(|(_, s)| s))
			.transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_intervals(&self) -> Result<Vec<(IntervalId, IntervalSchedule)>> {
		let rows = sqlx::query_as::<_, IntervalRow>(
			"SELECT id, every, period FROM interval_schedule ORDER BY id",
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(IntervalRow::into_schedule).collect()
	}

	/// Refused with `Conflict` while any task references the schedule.
	#[tracing::instrument(skip(self))]
	pub async fn delete_interval(&self, id: IntervalId) -> Result<()> {
		let result = sqlx::query("DELETE FROM interval_schedule WHERE id = ?")
			.bind(id.0)
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::from_constraint(e, format!("interval {id} is in use")))?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!("interval {id}")));
		}
		Ok(())
	}

	/// The schedule is compiled first so invalid fields never reach the table.
	#[tracing::instrument(skip(self, schedule), fields(expression = %schedule))]
	pub async fn create_crontab(&self, schedule: &CrontabSchedule) -> Result<CrontabId> {
		schedule.compile()?;

		let result = sqlx::query(
			r#"
			INSERT INTO crontab_schedule (minute, hour, day_of_month, month_of_year, day_of_week, timezone)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&schedule.minute)
		.bind(&schedule.hour)
		.bind(&schedule.day_of_month)
		.bind(&schedule.month_of_year)
		.bind(&schedule.day_of_week)
		.bind(&schedule.timezone)
		.execute(&self.pool)
		.await?;

		Ok(CrontabId(result.last_insert_rowid()))
	}

	/// Replace a crontab's fields. Referencing tasks get a new `date_changed`
	/// through the schedule trigger.
	#[tracing::instrument(skip(self, schedule), fields(expression = %schedule))]
	pub async fn update_crontab(&self, id: CrontabId, schedule: &CrontabSchedule) -> Result<()> {
		schedule.compile()?;

		let result = sqlx::query(
			r#"
			UPDATE crontab_schedule
			SET minute = ?, hour = ?, day_of_month = ?, month_of_year = ?, day_of_week = ?, timezone = ?
			WHERE id = ?
			"#,
		)
		.bind(&schedule.minute)
		.bind(&schedule.hour)
		.bind(&schedule.day_of_month)
		.bind(&schedule.month_of_year)
		.bind(&schedule.day_of_week)
		.bind(&schedule.timezone)
		.bind(id.0)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!("crontab {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_crontab(&self, id: CrontabId) -> Result<Option<CrontabSchedule>> {
		let row = sqlx::query_as::<_, CrontabRow>(
			r#"
			SELECT id, minute, hour, day_of_month, month_of_year, day_of_week, timezone
			FROM crontab_schedule WHERE id = ?
			"#,
		)
		.bind(id.0)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|r| r.into_schedule().1))
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_crontabs(&self) -> Result<Vec<(CrontabId, CrontabSchedule)>> {
		let rows = sqlx::query_as::<_, CrontabRow>(
			r#"
			SELECT id, minute, hour, day_of_month, month_of_year, day_of_week, timezone
			FROM crontab_schedule ORDER BY id
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(CrontabRow::into_schedule).collect())
	}

	/// Refused with `Conflict` while any task references the schedule.
	#[tracing::instrument(skip(self))]
	pub async fn delete_crontab(&self, id: CrontabId) -> Result<()> {
		let result = sqlx::query("DELETE FROM crontab_schedule WHERE id = ?")
			.bind(id.0)
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::from_constraint(e, format!("crontab {id} is in use")))?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!("crontab {id}")));
		}
		Ok(())
	}
}
