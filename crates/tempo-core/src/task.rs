// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic task definitions and their run-state.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::schedule::ScheduleDefinition;

/// Highest message priority accepted by the broker.
pub const MAX_PRIORITY: u8 = 9;

macro_rules! id_type {
	($name:ident) => {
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub i64);

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}
	};
}

id_type!(TaskId);
id_type!(IntervalId);
id_type!(CrontabId);

/// Which schedule row a task points at. Exactly one, by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ScheduleRef {
	Interval(IntervalId),
	Crontab(CrontabId),
}

impl ScheduleRef {
	/// Build from the two nullable foreign-key columns.
	pub fn from_columns(interval_id: Option<i64>, crontab_id: Option<i64>) -> Result<Self> {
		match (interval_id, crontab_id) {
			(Some(id), None) => Ok(ScheduleRef::Interval(IntervalId(id))),
			(None, Some(id)) => Ok(ScheduleRef::Crontab(CrontabId(id))),
			(Some(_), Some(_)) => Err(CoreError::InvalidScheduleRef(
				"both interval and crontab are set".to_string(),
			)),
			(None, None) => Err(CoreError::InvalidScheduleRef(
				"neither interval nor crontab is set".to_string(),
			)),
		}
	}

	/// Split back into `(interval_id, crontab_id)` columns.
	pub fn to_columns(&self) -> (Option<i64>, Option<i64>) {
		match self {
			ScheduleRef::Interval(id) => (Some(id.0), None),
			ScheduleRef::Crontab(id) => (None, Some(id.0)),
		}
	}
}

impl fmt::Display for ScheduleRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScheduleRef::Interval(id) => write!(f, "interval:{id}"),
			ScheduleRef::Crontab(id) => write!(f, "crontab:{id}"),
		}
	}
}

/// Broker routing hints forwarded on dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingOptions {
	pub queue: Option<String>,
	pub exchange: Option<String>,
	pub routing_key: Option<String>,
	pub priority: Option<u8>,
}

impl RoutingOptions {
	pub fn validate(&self) -> Result<()> {
		if let Some(priority) = self.priority {
			if priority > MAX_PRIORITY {
				return Err(CoreError::InvalidRouting(format!(
					"priority {priority} outside 0-{MAX_PRIORITY}"
				)));
			}
		}
		Ok(())
	}
}

/// A stored periodic task with its resolved schedule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicTask {
	pub id: TaskId,
	pub name: String,
	/// Name the execution system resolves to a callable.
	pub task: String,
	pub schedule_ref: ScheduleRef,
	pub schedule: ScheduleDefinition,
	pub args: Vec<Value>,
	pub kwargs: Map<String, Value>,
	pub routing: RoutingOptions,
	pub expires: Option<DateTime<Utc>>,
	pub expire_seconds: Option<u32>,
	pub one_off: bool,
	pub start_time: Option<DateTime<Utc>>,
	pub enabled: bool,
	pub last_run_at: Option<DateTime<Utc>>,
	pub total_run_count: u64,
	pub date_changed: DateTime<Utc>,
	pub description: String,
}

impl PeriodicTask {
	pub fn run_state(&self) -> RunState {
		RunState {
			last_run_at: self.last_run_at,
			total_run_count: self.total_run_count,
			enabled: self.enabled,
		}
	}

	/// Expiry for a dispatch made at `now`. An absolute `expires` wins over
	/// `expire_seconds`.
	pub fn expiry_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
		self.expires.or_else(|| {
			self.expire_seconds
				.map(|secs| now + Duration::seconds(i64::from(secs)))
		})
	}
}

/// The columns the scheduler writes back after a fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
	pub last_run_at: Option<DateTime<Utc>>,
	pub total_run_count: u64,
	pub enabled: bool,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::interval::{IntervalPeriod, IntervalSchedule};
	use chrono::TimeZone;

	fn sample_task() -> PeriodicTask {
		PeriodicTask {
			id: TaskId(1),
			name: "cleanup".to_string(),
			task: "app.tasks.cleanup".to_string(),
			schedule_ref: ScheduleRef::Interval(IntervalId(1)),
			schedule: ScheduleDefinition::Interval(IntervalSchedule {
				every: 10,
				period: IntervalPeriod::Seconds,
			}),
			args: vec![],
			kwargs: Map::new(),
			routing: RoutingOptions::default(),
			expires: None,
			expire_seconds: None,
			one_off: false,
			start_time: None,
			enabled: true,
			last_run_at: None,
			total_run_count: 0,
			date_changed: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
			description: String::new(),
		}
	}

	#[test]
	fn test_schedule_ref_from_columns() {
		assert_eq!(
			ScheduleRef::from_columns(Some(3), None).unwrap(),
			ScheduleRef::Interval(IntervalId(3))
		);
		assert_eq!(
			ScheduleRef::from_columns(None, Some(4)).unwrap(),
			ScheduleRef::Crontab(CrontabId(4))
		);
		assert!(ScheduleRef::from_columns(Some(1), Some(2)).is_err());
		assert!(ScheduleRef::from_columns(None, None).is_err());
	}

	#[test]
	fn test_schedule_ref_columns_round_trip() {
		let r = ScheduleRef::Crontab(CrontabId(9));
		let (i, c) = r.to_columns();
		assert_eq!(ScheduleRef::from_columns(i, c).unwrap(), r);
	}

	#[test]
	fn test_priority_validation() {
		let ok = RoutingOptions {
			priority: Some(9),
			..Default::default()
		};
		assert!(ok.validate().is_ok());
		let bad = RoutingOptions {
			priority: Some(10),
			..Default::default()
		};
		assert!(matches!(bad.validate(), Err(CoreError::InvalidRouting(_))));
	}

	#[test]
	fn test_expiry_prefers_absolute() {
		let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
		let mut task = sample_task();
		assert_eq!(task.expiry_at(now), None);

		task.expire_seconds = Some(30);
		assert_eq!(task.expiry_at(now), Some(now + Duration::seconds(30)));

		let absolute = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
		task.expires = Some(absolute);
		assert_eq!(task.expiry_at(now), Some(absolute));
	}
}
