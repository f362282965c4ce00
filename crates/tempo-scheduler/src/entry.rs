// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory view of one periodic task and its due-time guards.

use chrono::{DateTime, Duration, Utc};
use tempo_core::{CoreError, PeriodicTask, RunState, Schedule, ScheduleState, TaskId};

/// How long a disabled or deactivated entry waits before it is looked at again.
const DISABLED_RECHECK_SECS: i64 = 5;

/// How long a one-off that already ran waits before it is looked at again.
const SPENT_RECHECK_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct ScheduleEntry {
	task: PeriodicTask,
	schedule: Schedule,
	/// Anchor for an interval that has never run and has no start time.
	loaded_at: DateTime<Utc>,
	/// Set once a one-off has fired and until the store confirms it disabled.
	deactivated: bool,
	/// After a failed dispatch or persist the entry is not due before this.
	retry_at: Option<DateTime<Utc>>,
	/// Latest fire this entry knows of. Unlike `last_run_at` it survives a
	/// reset or schedule change, so separation and minute guards still hold.
	last_fired_at: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
	pub fn new(task: PeriodicTask, now: DateTime<Utc>) -> Result<Self, CoreError> {
		let schedule = task.schedule.resolve()?;
		Ok(Self {
			last_fired_at: task.last_run_at,
			task,
			schedule,
			loaded_at: now,
			deactivated: false,
			retry_at: None,
		})
	}

	pub fn id(&self) -> TaskId {
		self.task.id
	}

	pub fn name(&self) -> &str {
		&self.task.name
	}

	pub fn task(&self) -> &PeriodicTask {
		&self.task
	}

	pub fn schedule(&self) -> &Schedule {
		&self.schedule
	}

	pub fn date_changed(&self) -> DateTime<Utc> {
		self.task.date_changed
	}

	/// Decide whether the entry fires at `now`.
	///
	/// The raw schedule is consulted only after the enablement, one-off,
	/// start-time and retry guards pass. A due raw state is then held back
	/// while the previous fire is closer than `min_separation`, and for
	/// crontabs until the local minute moves past the one last fired in.
	/// Comparing minute tuples rather than instants keeps the repeated hour
	/// of a DST fold from firing a second time.
	pub fn is_due(&self, now: DateTime<Utc>, min_separation: Duration) -> ScheduleState {
		if !self.task.enabled || self.deactivated {
			return ScheduleState::not_due(Duration::seconds(DISABLED_RECHECK_SECS));
		}
		if self.task.one_off && self.task.last_run_at.is_some() {
			return ScheduleState::not_due(Duration::seconds(SPENT_RECHECK_SECS));
		}
		if let Some(start) = self.task.start_time {
			if start > now {
				return ScheduleState::not_due(start - now);
			}
		}
		if let Some(retry_at) = self.retry_at {
			if retry_at > now {
				return ScheduleState::not_due(retry_at - now);
			}
		}

		let anchor = self
			.task
			.last_run_at
			.or(self.task.start_time)
			.unwrap_or(self.loaded_at);
		let raw = self.schedule.state(anchor, now);
		if !raw.is_due {
			return raw;
		}

		let Some(last) = self.last_fired_at.max(self.task.last_run_at) else {
			return raw;
		};

		let elapsed = now - last;
		if elapsed < min_separation {
			return ScheduleState::not_due(min_separation - elapsed);
		}

		if let Some(crontab) = self.schedule.as_crontab() {
			if crontab.minute_key(now) <= crontab.minute_key(last) {
				return ScheduleState::not_due(crontab.until_minute_end(now));
			}
		}

		raw
	}

	/// Apply a successful dispatch at `now`.
	pub fn record_fire(&mut self, now: DateTime<Utc>) {
		self.task.last_run_at = Some(now);
		self.task.total_run_count += 1;
		self.last_fired_at = Some(now);
		self.retry_at = None;
		if self.task.one_off {
			self.deactivated = true;
		}
	}

	/// The columns to write back to the store.
	pub fn run_state(&self) -> RunState {
		RunState {
			last_run_at: self.task.last_run_at,
			total_run_count: self.task.total_run_count,
			enabled: self.task.enabled && !self.deactivated,
		}
	}

	/// Roll back to `state` after its write-back failed.
	pub fn restore(&mut self, state: RunState) {
		self.task.last_run_at = state.last_run_at;
		self.task.total_run_count = state.total_run_count;
		self.last_fired_at = state.last_run_at;
		self.deactivated = !state.enabled;
	}

	/// Hold the entry back until `at`.
	pub fn retry_after(&mut self, at: DateTime<Utc>) {
		self.retry_at = Some(at);
	}

	/// Take a new definition from the store.
	///
	/// Run history is kept: the later `last_run_at` and larger count win,
	/// unless the stored `last_run_at` was cleared, which is an explicit reset
	/// (or a schedule change) and is adopted together with the stored count.
	/// The last fire seen by this entry is kept either way.
	pub fn refresh(&mut self, snapshot: PeriodicTask, now: DateTime<Utc>) -> Result<(), CoreError> {
		let schedule = snapshot.schedule.resolve()?;

		let (last_run_at, total_run_count) = match snapshot.last_run_at {
			None => {
				self.loaded_at = now;
				(None, snapshot.total_run_count)
			}
			Some(stored) => (
				Some(self.task.last_run_at.map_or(stored, |ours| ours.max(stored))),
				self.task.total_run_count.max(snapshot.total_run_count),
			),
		};

		self.last_fired_at = self.last_fired_at.max(last_run_at);
		self.task = PeriodicTask {
			last_run_at,
			total_run_count,
			..snapshot
		};
		self.schedule = schedule;
		self.deactivated = false;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use serde_json::Map;
	use tempo_core::{
		CrontabId, CrontabSchedule, IntervalId, IntervalPeriod, IntervalSchedule, RoutingOptions,
		ScheduleDefinition, ScheduleRef,
	};

	fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
	}

	fn task(schedule: ScheduleDefinition) -> PeriodicTask {
		let schedule_ref = match schedule {
			ScheduleDefinition::Interval(_) => ScheduleRef::Interval(IntervalId(1)),
			ScheduleDefinition::Crontab(_) => ScheduleRef::Crontab(CrontabId(1)),
		};
		PeriodicTask {
			id: TaskId(1),
			name: "sweep".to_string(),
			task: "app.tasks.sweep".to_string(),
			schedule_ref,
			schedule,
			args: Vec::new(),
			kwargs: Map::new(),
			routing: RoutingOptions::default(),
			expires: None,
			expire_seconds: None,
			one_off: false,
			start_time: None,
			enabled: true,
			last_run_at: None,
			total_run_count: 0,
			date_changed: at(0, 0, 0),
			description: String::new(),
		}
	}

	fn cron(expr: &str) -> ScheduleDefinition {
		ScheduleDefinition::Crontab(CrontabSchedule::from_expression(expr, "UTC").unwrap())
	}

	fn every(secs: u32) -> ScheduleDefinition {
		ScheduleDefinition::Interval(IntervalSchedule::new(secs, IntervalPeriod::Seconds).unwrap())
	}

	fn sep() -> Duration {
		Duration::seconds(1)
	}

	#[test]
	fn test_crontab_fires_once_per_minute_under_fast_polling() {
		let mut entry = ScheduleEntry::new(task(cron("* * * * *")), at(9, 59, 0)).unwrap();
		let mut fires = 0;
		let mut now = at(10, 0, 0);
		while now < at(10, 1, 0) {
			if entry.is_due(now, sep()).is_due {
				entry.record_fire(now);
				fires += 1;
			}
			now += Duration::milliseconds(100);
		}
		assert_eq!(fires, 1);
		assert!(entry.is_due(at(10, 1, 0), sep()).is_due);
	}

	#[test]
	fn test_same_minute_guard_waits_for_minute_end() {
		let mut entry = ScheduleEntry::new(task(cron("* * * * *")), at(10, 0, 0)).unwrap();
		entry.record_fire(at(10, 0, 10));
		let state = entry.is_due(at(10, 0, 20), sep());
		assert!(!state.is_due);
		assert_eq!(state.next_check, std::time::Duration::from_secs(40));
	}

	#[test]
	fn test_min_separation_holds_back_a_due_entry() {
		let mut entry = ScheduleEntry::new(task(every(1)), at(10, 0, 0)).unwrap();
		entry.record_fire(at(10, 0, 1));
		let wide = Duration::seconds(5);
		let state = entry.is_due(at(10, 0, 3), wide);
		assert!(!state.is_due);
		assert_eq!(state.next_check, std::time::Duration::from_secs(3));
		assert!(entry.is_due(at(10, 0, 6), wide).is_due);
	}

	#[test]
	fn test_interval_anchors_on_load_time_then_last_run() {
		let mut entry = ScheduleEntry::new(task(every(10)), at(10, 0, 0)).unwrap();
		assert!(!entry.is_due(at(10, 0, 9), sep()).is_due);
		assert!(entry.is_due(at(10, 0, 10), sep()).is_due);
		entry.record_fire(at(10, 0, 12));
		assert!(!entry.is_due(at(10, 0, 21), sep()).is_due);
		assert!(entry.is_due(at(10, 0, 22), sep()).is_due);
	}

	#[test]
	fn test_start_time_gates_and_anchors() {
		let mut t = task(every(60));
		t.start_time = Some(at(12, 0, 0));
		let entry = ScheduleEntry::new(t, at(10, 0, 0)).unwrap();

		let state = entry.is_due(at(11, 59, 0), sep());
		assert!(!state.is_due);
		assert_eq!(state.next_check, std::time::Duration::from_secs(60));
		assert!(!entry.is_due(at(12, 0, 30), sep()).is_due);
		assert!(entry.is_due(at(12, 1, 0), sep()).is_due);
	}

	#[test]
	fn test_disabled_entry_is_never_due() {
		let mut t = task(every(1));
		t.enabled = false;
		let entry = ScheduleEntry::new(t, at(10, 0, 0)).unwrap();
		let state = entry.is_due(at(11, 0, 0), sep());
		assert!(!state.is_due);
		assert_eq!(state.next_check, std::time::Duration::from_secs(5));
	}

	#[test]
	fn test_one_off_deactivates_after_fire() {
		let mut t = task(every(1));
		t.one_off = true;
		let mut entry = ScheduleEntry::new(t, at(10, 0, 0)).unwrap();
		assert!(entry.is_due(at(10, 0, 1), sep()).is_due);
		entry.record_fire(at(10, 0, 1));

		assert!(!entry.run_state().enabled);
		assert!(!entry.is_due(at(11, 0, 0), sep()).is_due);
	}

	#[test]
	fn test_re_enabled_one_off_does_not_replay() {
		let mut t = task(every(1));
		t.one_off = true;
		t.last_run_at = Some(at(9, 0, 0));
		t.total_run_count = 1;
		let entry = ScheduleEntry::new(t, at(10, 0, 0)).unwrap();
		let state = entry.is_due(at(10, 0, 5), sep());
		assert!(!state.is_due);
		assert_eq!(state.next_check, std::time::Duration::from_secs(86_400));
	}

	#[test]
	fn test_restore_rolls_back_fire() {
		let mut t = task(every(1));
		t.one_off = true;
		let mut entry = ScheduleEntry::new(t, at(10, 0, 0)).unwrap();
		let before = entry.run_state();
		entry.record_fire(at(10, 0, 1));
		entry.restore(before);

		assert_eq!(entry.run_state(), before);
		assert!(entry.is_due(at(10, 0, 2), sep()).is_due);
	}

	#[test]
	fn test_retry_after_defers() {
		let mut entry = ScheduleEntry::new(task(every(1)), at(10, 0, 0)).unwrap();
		entry.retry_after(at(10, 0, 30));
		assert!(!entry.is_due(at(10, 0, 10), sep()).is_due);
		assert!(entry.is_due(at(10, 0, 30), sep()).is_due);
	}

	#[test]
	fn test_refresh_keeps_newer_run_history() {
		let mut entry = ScheduleEntry::new(task(every(10)), at(10, 0, 0)).unwrap();
		entry.record_fire(at(10, 0, 10));
		entry.record_fire(at(10, 0, 20));

		let mut snapshot = task(every(30));
		snapshot.last_run_at = Some(at(10, 0, 10));
		snapshot.total_run_count = 1;
		snapshot.date_changed = at(10, 0, 25);
		entry.refresh(snapshot, at(10, 0, 25)).unwrap();

		assert_eq!(entry.task().last_run_at, Some(at(10, 0, 20)));
		assert_eq!(entry.task().total_run_count, 2);
		assert_eq!(entry.date_changed(), at(10, 0, 25));
		assert!(!entry.is_due(at(10, 0, 40), sep()).is_due);
		assert!(entry.is_due(at(10, 0, 50), sep()).is_due);
	}

	#[test]
	fn test_refresh_adopts_reset() {
		let mut entry = ScheduleEntry::new(task(every(10)), at(10, 0, 0)).unwrap();
		entry.record_fire(at(10, 0, 10));

		let snapshot = task(every(10));
		entry.refresh(snapshot, at(10, 0, 15)).unwrap();

		assert_eq!(entry.task().last_run_at, None);
		assert_eq!(entry.task().total_run_count, 0);
		assert!(!entry.is_due(at(10, 0, 24), sep()).is_due);
		assert!(entry.is_due(at(10, 0, 25), sep()).is_due);
	}

	#[test]
	fn test_refresh_rejects_invalid_schedule() {
		let mut entry = ScheduleEntry::new(task(every(10)), at(10, 0, 0)).unwrap();
		let bad = task(ScheduleDefinition::Interval(IntervalSchedule {
			every: 0,
			period: IntervalPeriod::Seconds,
		}));
		assert!(entry.refresh(bad, at(10, 0, 1)).is_err());
		assert_eq!(entry.task().schedule, every(10));
	}

	#[test]
	fn test_crontab_fold_minute_fires_once() {
		let def = ScheduleDefinition::Crontab(
			CrontabSchedule::from_expression("30 1 * * *", "America/New_York").unwrap(),
		);
		// 2026-11-01 01:30 EDT is 05:30Z; 01:30 EST is 06:30Z.
		let first = Utc.with_ymd_and_hms(2026, 11, 1, 5, 30, 0).unwrap();
		let second = Utc.with_ymd_and_hms(2026, 11, 1, 6, 30, 0).unwrap();
		let mut entry = ScheduleEntry::new(task(def), first - Duration::hours(1)).unwrap();

		assert!(entry.is_due(first, sep()).is_due);
		entry.record_fire(first);
		assert!(!entry.is_due(second, sep()).is_due);
	}

	fn new_york(expr: &str) -> ScheduleDefinition {
		ScheduleDefinition::Crontab(
			CrontabSchedule::from_expression(expr, "America/New_York").unwrap(),
		)
	}

	#[test]
	fn test_crontab_fold_never_reuses_a_minute() {
		// 01:00-02:00 local repeats between 05:00Z and 07:00Z on 2026-11-01.
		let start = Utc.with_ymd_and_hms(2026, 11, 1, 5, 20, 0).unwrap();
		let end = Utc.with_ymd_and_hms(2026, 11, 1, 6, 45, 0).unwrap();
		let mut entry = ScheduleEntry::new(task(new_york("*/30 * * * *")), start).unwrap();

		let mut fired = Vec::new();
		let mut now = start;
		while now <= end {
			if entry.is_due(now, sep()).is_due {
				entry.record_fire(now);
				fired.push(now);
			}
			now += Duration::seconds(1);
		}

		let crontab = entry.schedule().as_crontab().unwrap().clone();
		let keys: std::collections::BTreeSet<_> =
			fired.iter().map(|t| crontab.minute_key(*t)).collect();
		assert_eq!(fired, vec![Utc.with_ymd_and_hms(2026, 11, 1, 5, 30, 0).unwrap()]);
		assert_eq!(keys.len(), fired.len());

		// 02:00 EST is past every fold minute.
		let after_fold = Utc.with_ymd_and_hms(2026, 11, 1, 7, 0, 0).unwrap();
		assert!(entry.is_due(after_fold, sep()).is_due);
	}

	#[test]
	fn test_schedule_switch_keeps_minute_guard() {
		let mut entry = ScheduleEntry::new(task(cron("* * * * *")), at(9, 59, 0)).unwrap();
		entry.record_fire(at(10, 0, 0));

		// A schedule change clears the stored run-state.
		let mut snapshot = task(cron("0-5 * * * *"));
		snapshot.date_changed = at(10, 0, 10);
		entry.refresh(snapshot, at(10, 0, 10)).unwrap();
		assert_eq!(entry.task().last_run_at, None);

		let mut now = at(10, 0, 10);
		while now < at(10, 1, 0) {
			assert!(!entry.is_due(now, sep()).is_due, "refired at {now}");
			now += Duration::seconds(1);
		}
		assert!(entry.is_due(at(10, 1, 0), sep()).is_due);
	}
}
