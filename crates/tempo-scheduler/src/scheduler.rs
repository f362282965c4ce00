// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tempo_core::{PeriodicTask, RunState, TaskId, MIN_NEXT_CHECK};
use tempo_dispatch::{DispatchGateway, DispatchRequest};
use tempo_store::{StoreError, TaskStore};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::config::BeatConfig;
use crate::entry::ScheduleEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
	Loading,
	Waiting,
	Ticking,
	Dispatching,
	Stopped,
}

/// Counters since the scheduler was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
	pub state: SchedulerState,
	pub entries: usize,
	pub ticks: u64,
	pub reloads: u64,
	pub dispatched: u64,
	pub dispatch_failures: u64,
	pub persist_failures: u64,
	pub invalid_tasks: u64,
	pub marker_version: Option<i64>,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
	pub reloaded: bool,
	pub dispatched: Vec<TaskId>,
	pub dispatch_failures: usize,
	pub persist_failures: usize,
	/// How long to sleep before the next tick.
	pub next_wake: StdDuration,
}

enum PersistOutcome {
	Saved,
	TaskGone,
	Failed(StoreError),
}

/// The beat loop: keeps entries in sync with the store and dispatches the
/// ones that are due.
pub struct Scheduler {
	store: Arc<dyn TaskStore>,
	gateway: Arc<dyn DispatchGateway>,
	clock: Arc<dyn Clock>,
	config: BeatConfig,
	entries: BTreeMap<TaskId, ScheduleEntry>,
	loaded: bool,
	status: SchedulerStatus,
}

impl Scheduler {
	pub fn new(
		store: Arc<dyn TaskStore>,
		gateway: Arc<dyn DispatchGateway>,
		clock: Arc<dyn Clock>,
		config: BeatConfig,
	) -> Self {
		Self {
			store,
			gateway,
			clock,
			config,
			entries: BTreeMap::new(),
			loaded: false,
			status: SchedulerStatus {
				state: SchedulerState::Loading,
				entries: 0,
				ticks: 0,
				reloads: 0,
				dispatched: 0,
				dispatch_failures: 0,
				persist_failures: 0,
				invalid_tasks: 0,
				marker_version: None,
			},
		}
	}

	pub fn status(&self) -> &SchedulerStatus {
		&self.status
	}

	pub fn entries(&self) -> impl Iterator<Item = &ScheduleEntry> {
		self.entries.values()
	}

	pub fn entry(&self, id: TaskId) -> Option<&ScheduleEntry> {
		self.entries.get(&id)
	}

	/// Run until `shutdown` turns true or its sender is dropped. A tick in
	/// progress always completes.
	pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerStatus {
		info!(
			max_interval_ms = self.config.max_interval.as_millis() as u64,
			min_separation_ms = self.config.min_separation.as_millis() as u64,
			"beat scheduler starting"
		);

		loop {
			if *shutdown.borrow() {
				break;
			}

			let report = self.tick().await;
			self.status.state = SchedulerState::Waiting;
			debug!(next_wake_ms = report.next_wake.as_millis() as u64, "sleeping");

			tokio::select! {
				_ = tokio::time::sleep(report.next_wake) => {}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}
			}
		}

		self.status.state = SchedulerState::Stopped;
		info!(
			dispatched = self.status.dispatched,
			ticks = self.status.ticks,
			"beat scheduler stopped"
		);
		self.status.clone()
	}

	/// One pass: reload if the change marker moved, dispatch every due
	/// entry in task-id order and compute the next wake-up.
	#[instrument(skip(self))]
	pub async fn tick(&mut self) -> TickReport {
		self.status.ticks += 1;
		self.status.state = if self.loaded {
			SchedulerState::Ticking
		} else {
			SchedulerState::Loading
		};

		let now = self.clock.now();
		let mut report = TickReport {
			reloaded: self.sync(now).await,
			..Default::default()
		};
		self.status.state = SchedulerState::Ticking;

		let min_separation = self.min_separation();
		let due: Vec<TaskId> = self
			.entries
			.values()
			.filter(|entry| entry.is_due(now, min_separation).is_due)
			.map(ScheduleEntry::id)
			.collect();

		if !due.is_empty() {
			self.status.state = SchedulerState::Dispatching;
		}
		for id in due {
			self.fire(id, now, &mut report).await;
		}

		report.next_wake = self.next_wake(now);
		self.status.entries = self.entries.len();
		report
	}

	fn min_separation(&self) -> Duration {
		Duration::from_std(self.config.min_separation).unwrap_or_else(|_| Duration::seconds(1))
	}

	fn next_wake(&self, now: DateTime<Utc>) -> StdDuration {
		let min_separation = self.min_separation();
		self.entries
			.values()
			.map(|entry| entry.is_due(now, min_separation).next_check)
			.min()
			.unwrap_or(self.config.max_interval)
			.clamp(MIN_NEXT_CHECK, self.config.max_interval.max(MIN_NEXT_CHECK))
	}

	/// Reload entries when the change marker differs from the last one seen.
	/// A failed read keeps the current entries and is retried next tick.
	async fn sync(&mut self, now: DateTime<Utc>) -> bool {
		let marker = match self.store.change_marker().await {
			Ok(marker) => marker.map(|m| m.version),
			Err(e) => {
				warn!(error = %e, "failed to read change marker");
				return false;
			}
		};

		if self.loaded && marker == self.status.marker_version {
			return false;
		}

		let tasks = match self.store.list_enabled_tasks().await {
			Ok(tasks) => tasks,
			Err(e) => {
				warn!(error = %e, "failed to load periodic tasks");
				return false;
			}
		};

		self.reconcile(tasks, now);
		self.loaded = true;
		self.status.marker_version = marker;
		self.status.reloads += 1;
		true
	}

	fn reconcile(&mut self, tasks: Vec<PeriodicTask>, now: DateTime<Utc>) {
		let mut seen = BTreeSet::new();
		let (mut added, mut refreshed, mut invalid) = (0usize, 0usize, 0usize);

		for task in tasks {
			let id = task.id;
			let name = task.name.clone();
			seen.insert(id);

			match self.entries.get_mut(&id) {
				Some(entry) if entry.date_changed() == task.date_changed => {}
				Some(entry) => match entry.refresh(task, now) {
					Ok(()) => refreshed += 1,
					Err(e) => {
						warn!(task_id = %id, task_name = %name, error = %e, "dropping task with invalid schedule");
						self.entries.remove(&id);
						invalid += 1;
					}
				},
				None => match ScheduleEntry::new(task, now) {
					Ok(entry) => {
						self.entries.insert(id, entry);
						added += 1;
					}
					Err(e) => {
						warn!(task_id = %id, task_name = %name, error = %e, "skipping task with invalid schedule");
						invalid += 1;
					}
				},
			}
		}

		let before = self.entries.len();
		self.entries.retain(|id, _| seen.contains(id));
		let removed = before - self.entries.len();

		self.status.invalid_tasks += invalid as u64;
		self.status.entries = self.entries.len();
		info!(
			added,
			refreshed,
			removed,
			invalid,
			total = self.entries.len(),
			"schedule reloaded"
		);
	}

	async fn fire(&mut self, id: TaskId, now: DateTime<Utc>, report: &mut TickReport) {
		let store = Arc::clone(&self.store);
		let gateway = Arc::clone(&self.gateway);
		let retry_at = now
			+ Duration::from_std(self.config.dispatch_retry).unwrap_or_else(|_| Duration::seconds(5));
		let attempts = self.config.persist_attempts.max(1);
		let retry_delay = self.config.persist_retry_delay;

		let Some(entry) = self.entries.get_mut(&id) else {
			return;
		};

		let request = DispatchRequest::from_task(entry.task(), now);
		let receipt = match gateway.enqueue(&request).await {
			Ok(receipt) => receipt,
			Err(e) => {
				warn!(task_id = %id, task_name = %entry.name(), error = %e, "dispatch failed, will retry");
				entry.retry_after(retry_at);
				self.status.dispatch_failures += 1;
				report.dispatch_failures += 1;
				return;
			}
		};

		info!(
			task_id = %id,
			task_name = %entry.name(),
			task = %request.task,
			dispatch_id = %receipt.dispatch_id,
			queue = %receipt.queue,
			"task dispatched"
		);
		self.status.dispatched += 1;
		report.dispatched.push(id);

		let previous = entry.run_state();
		entry.record_fire(now);
		let state = entry.run_state();

		match persist(store.as_ref(), id, &state, attempts, retry_delay).await {
			PersistOutcome::Saved => {}
			PersistOutcome::TaskGone => {
				debug!(task_id = %id, "task deleted while dispatching");
				self.entries.remove(&id);
			}
			PersistOutcome::Failed(e) => {
				error!(
					task_id = %id,
					task_name = %entry.name(),
					error = %e,
					"failed to save run state, rolling back"
				);
				entry.restore(previous);
				entry.retry_after(retry_at);
				self.status.persist_failures += 1;
				report.persist_failures += 1;
			}
		}
	}
}

async fn persist(
	store: &dyn TaskStore,
	id: TaskId,
	state: &RunState,
	attempts: u32,
	retry_delay: StdDuration,
) -> PersistOutcome {
	let mut attempt = 1;
	loop {
		match store.save_run_state(id, state).await {
			Ok(()) => return PersistOutcome::Saved,
			Err(StoreError::NotFound(_)) => return PersistOutcome::TaskGone,
			Err(e) if attempt >= attempts => return PersistOutcome::Failed(e),
			Err(e) => {
				warn!(task_id = %id, attempt, error = %e, "save run state failed, retrying");
				attempt += 1;
				tokio::time::sleep(retry_delay).await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::ManualClock;
	use chrono::TimeZone;
	use tempo_core::{CrontabSchedule, IntervalPeriod, IntervalSchedule, ScheduleRef};
	use tempo_dispatch::testing::RecordingGateway;
	use tempo_store::testing::create_test_pool;
	use tempo_store::{NewPeriodicTask, ScheduleRepository, TaskRepository};

	struct Harness {
		repo: TaskRepository,
		schedules: ScheduleRepository,
		gateway: Arc<RecordingGateway>,
		clock: Arc<ManualClock>,
		scheduler: Scheduler,
	}

	async fn harness() -> Harness {
		let pool = create_test_pool().await;
		let repo = TaskRepository::new(pool.clone());
		let gateway = Arc::new(RecordingGateway::new());
		let clock = Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2026, 4, 6, 8, 0, 0).unwrap(),
		));
		let config = BeatConfig {
			persist_retry_delay: StdDuration::ZERO,
			..Default::default()
		};
		let scheduler = Scheduler::new(
			Arc::new(repo.clone()),
			gateway.clone(),
			clock.clone(),
			config,
		);
		Harness {
			repo,
			schedules: ScheduleRepository::new(pool),
			gateway,
			clock,
			scheduler,
		}
	}

	#[tokio::test]
	async fn test_first_tick_loads_entries() {
		let mut h = harness().await;
		let interval = h
			.schedules
			.create_interval(&IntervalSchedule::new(30, IntervalPeriod::Seconds).unwrap())
			.await
			.unwrap();
		h.repo
			.create_task(&NewPeriodicTask::new(
				"sync",
				"app.tasks.sync",
				ScheduleRef::Interval(interval),
			))
			.await
			.unwrap();

		let report = h.scheduler.tick().await;
		assert!(report.reloaded);
		assert!(report.dispatched.is_empty());
		assert_eq!(report.next_wake, StdDuration::from_secs(5));
		assert_eq!(h.scheduler.status().entries, 1);

		let again = h.scheduler.tick().await;
		assert!(!again.reloaded);
	}

	#[tokio::test]
	async fn test_next_wake_tracks_nearest_entry() {
		let mut h = harness().await;
		let interval = h
			.schedules
			.create_interval(&IntervalSchedule::new(2, IntervalPeriod::Seconds).unwrap())
			.await
			.unwrap();
		h.repo
			.create_task(&NewPeriodicTask::new(
				"fast",
				"app.tasks.fast",
				ScheduleRef::Interval(interval),
			))
			.await
			.unwrap();

		let report = h.scheduler.tick().await;
		assert_eq!(report.next_wake, StdDuration::from_secs(2));
	}

	#[tokio::test]
	async fn test_empty_schedule_sleeps_max_interval() {
		let mut h = harness().await;
		let report = h.scheduler.tick().await;
		assert!(report.reloaded);
		assert_eq!(report.next_wake, StdDuration::from_secs(5));
		assert_eq!(h.scheduler.status().marker_version, Some(0));
	}

	#[tokio::test]
	async fn test_dispatch_persists_run_state() {
		let mut h = harness().await;
		let crontab = h
			.schedules
			.create_crontab(&CrontabSchedule::default())
			.await
			.unwrap();
		let id = h
			.repo
			.create_task(&NewPeriodicTask::new(
				"heartbeat",
				"app.tasks.heartbeat",
				ScheduleRef::Crontab(crontab),
			))
			.await
			.unwrap();

		let report = h.scheduler.tick().await;
		assert_eq!(report.dispatched, vec![id]);
		assert_eq!(h.gateway.count_for("heartbeat"), 1);

		let stored = h.repo.get_task(id).await.unwrap().unwrap();
		assert_eq!(stored.last_run_at, Some(h.clock.now()));
		assert_eq!(stored.total_run_count, 1);
		assert!(!h.scheduler.tick().await.reloaded);
	}

	#[tokio::test]
	async fn test_run_stops_on_shutdown() {
		let h = harness().await;
		let mut scheduler = h.scheduler;
		let (tx, rx) = watch::channel(false);

		let handle = tokio::spawn(async move { scheduler.run(rx).await });
		tokio::time::sleep(StdDuration::from_millis(50)).await;
		tx.send(true).unwrap();

		let status = handle.await.unwrap();
		assert_eq!(status.state, SchedulerState::Stopped);
		assert!(status.ticks >= 1);
	}
}
