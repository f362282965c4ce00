// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The schedule variant bound to a task, in stored and resolved form.

use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::crontab::{Crontab, CrontabSchedule};
use crate::error::Result;
use crate::interval::IntervalSchedule;

/// Floor applied to every "check again in" delay so the loop never spins.
pub const MIN_NEXT_CHECK: StdDuration = StdDuration::from_millis(100);

/// Answer to "is it due, and how long until the next check?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleState {
	pub is_due: bool,
	pub next_check: StdDuration,
}

impl ScheduleState {
	pub fn due() -> Self {
		Self {
			is_due: true,
			next_check: StdDuration::ZERO,
		}
	}

	/// Not due; check again after `remaining`, floored at [`MIN_NEXT_CHECK`].
	pub fn not_due(remaining: Duration) -> Self {
		let next_check = remaining
			.to_std()
			.unwrap_or(StdDuration::ZERO)
			.max(MIN_NEXT_CHECK);
		Self {
			is_due: false,
			next_check,
		}
	}
}

/// A schedule as referenced by a stored task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleDefinition {
	Interval(IntervalSchedule),
	Crontab(CrontabSchedule),
}

impl ScheduleDefinition {
	/// Validate and compile into an evaluable [`Schedule`].
	pub fn resolve(&self) -> Result<Schedule> {
		match self {
			ScheduleDefinition::Interval(interval) => {
				interval.validate()?;
				Ok(Schedule::Interval(*interval))
			}
			ScheduleDefinition::Crontab(crontab) => Ok(Schedule::Crontab(crontab.compile()?)),
		}
	}
}

impl fmt::Display for ScheduleDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScheduleDefinition::Interval(interval) => write!(f, "{interval}"),
			ScheduleDefinition::Crontab(crontab) => write!(f, "cron {crontab}"),
		}
	}
}

/// A resolved schedule. Evaluation is infallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
	Interval(IntervalSchedule),
	Crontab(Crontab),
}

impl Schedule {
	/// Raw schedule state at `now`. `anchor` is the instant an interval
	/// counts from; crontabs ignore it.
	pub fn state(&self, anchor: DateTime<Utc>, now: DateTime<Utc>) -> ScheduleState {
		match self {
			Schedule::Interval(interval) => interval.state(anchor, now),
			Schedule::Crontab(crontab) => crontab.state(now),
		}
	}

	pub fn as_crontab(&self) -> Option<&Crontab> {
		match self {
			Schedule::Crontab(crontab) => Some(crontab),
			Schedule::Interval(_) => None,
		}
	}
}
