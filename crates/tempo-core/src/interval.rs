// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fixed-interval schedules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::schedule::ScheduleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalPeriod {
	Seconds,
	Minutes,
	Hours,
	Days,
}

impl IntervalPeriod {
	pub fn as_str(&self) -> &'static str {
		match self {
			IntervalPeriod::Seconds => "seconds",
			IntervalPeriod::Minutes => "minutes",
			IntervalPeriod::Hours => "hours",
			IntervalPeriod::Days => "days",
		}
	}

	fn seconds(&self) -> i64 {
		match self {
			IntervalPeriod::Seconds => 1,
			IntervalPeriod::Minutes => 60,
			IntervalPeriod::Hours => 3_600,
			IntervalPeriod::Days => 86_400,
		}
	}
}

impl FromStr for IntervalPeriod {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"seconds" => Ok(IntervalPeriod::Seconds),
			"minutes" => Ok(IntervalPeriod::Minutes),
			"hours" => Ok(IntervalPeriod::Hours),
			"days" => Ok(IntervalPeriod::Days),
			other => Err(CoreError::InvalidInterval(format!("unknown period '{other}'"))),
		}
	}
}

impl fmt::Display for IntervalPeriod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Run every `every` units of `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalSchedule {
	pub every: u32,
	pub period: IntervalPeriod,
}

impl IntervalSchedule {
	pub fn new(every: u32, period: IntervalPeriod) -> Result<Self> {
		let schedule = Self { every, period };
		schedule.validate()?;
		Ok(schedule)
	}

	pub fn validate(&self) -> Result<()> {
		if self.every < 1 {
			return Err(CoreError::InvalidInterval(
				"every must be at least 1".to_string(),
			));
		}
		Ok(())
	}

	pub fn duration(&self) -> Duration {
		Duration::seconds(i64::from(self.every) * self.period.seconds())
	}

	/// Due once a full period has elapsed since `anchor`. A pause of any
	/// length still yields a single due state.
	pub fn state(&self, anchor: DateTime<Utc>, now: DateTime<Utc>) -> ScheduleState {
		let remaining = self.duration() - (now - anchor);
		if remaining <= Duration::zero() {
			ScheduleState::due()
		} else {
			ScheduleState::not_due(remaining)
		}
	}
}

impl fmt::Display for IntervalSchedule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "every {} {}", self.every, self.period)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use std::time::Duration as StdDuration;

	fn at(secs: i64) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
	}

	#[test]
	fn test_zero_every_rejected() {
		assert!(IntervalSchedule::new(0, IntervalPeriod::Seconds).is_err());
		assert!(IntervalSchedule::new(1, IntervalPeriod::Seconds).is_ok());
	}

	#[test]
	fn test_duration() {
		let s = IntervalSchedule::new(3, IntervalPeriod::Hours).unwrap();
		assert_eq!(s.duration(), Duration::hours(3));
	}

	#[test]
	fn test_period_parse() {
		assert_eq!("days".parse::<IntervalPeriod>().unwrap(), IntervalPeriod::Days);
		assert!("fortnights".parse::<IntervalPeriod>().is_err());
	}

	#[test]
	fn test_state_before_and_after_period() {
		let s = IntervalSchedule::new(10, IntervalPeriod::Seconds).unwrap();

		let state = s.state(at(0), at(4));
		assert!(!state.is_due);
		assert_eq!(state.next_check, StdDuration::from_secs(6));

		assert!(s.state(at(0), at(10)).is_due);
	}

	#[test]
	fn test_long_pause_is_single_due_state() {
		let s = IntervalSchedule::new(10, IntervalPeriod::Seconds).unwrap();
		let state = s.state(at(0), at(100));
		assert!(state.is_due);
		assert_eq!(state.next_check, StdDuration::ZERO);
	}

	#[test]
	fn test_display() {
		let s = IntervalSchedule::new(5, IntervalPeriod::Minutes).unwrap();
		assert_eq!(s.to_string(), "every 5 minutes");
	}
}
