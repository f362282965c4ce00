// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::Utc;
use tempo_core::TaskId;
use tempo_dispatch::{DispatchGateway, DispatchReceipt, DispatchRequest};
use tempo_store::TaskStore;
use tracing::{info, instrument};

use crate::error::{Result, SchedulerError};

/// Dispatch a stored task immediately, outside its schedule.
///
/// Run-state is left alone, so the next scheduled fire is unaffected. A
/// disabled task is dispatched too.
#[instrument(skip(store, gateway))]
pub async fn dispatch_now(
	store: &dyn TaskStore,
	gateway: &dyn DispatchGateway,
	task_id: TaskId,
) -> Result<DispatchReceipt> {
	let task = store
		.get_task(task_id)
		.await?
		.ok_or_else(|| SchedulerError::missing(task_id))?;

	let request = DispatchRequest::from_task(&task, Utc::now());
	let receipt = gateway.enqueue(&request).await?;

	info!(
		task_id = %task_id,
		task_name = %task.name,
		dispatch_id = %receipt.dispatch_id,
		queue = %receipt.queue,
		"task dispatched on demand"
	);
	Ok(receipt)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use tempo_core::{IntervalPeriod, IntervalSchedule, ScheduleRef};
	use tempo_dispatch::testing::RecordingGateway;
	use tempo_dispatch::DispatchError;
	use tempo_store::testing::create_test_pool;
	use tempo_store::{NewPeriodicTask, ScheduleRepository, TaskRepository};

	async fn setup() -> (TaskRepository, TaskId) {
		let pool = create_test_pool().await;
		let interval = ScheduleRepository::new(pool.clone())
			.create_interval(&IntervalSchedule::new(1, IntervalPeriod::Hours).unwrap())
			.await
			.unwrap();
		let repo = TaskRepository::new(pool);
		let mut new = NewPeriodicTask::new("report", "app.tasks.report", ScheduleRef::Interval(interval));
		new.args = vec![json!("daily")];
		new.enabled = false;
		let id = repo.create_task(&new).await.unwrap();
		(repo, id)
	}

	#[tokio::test]
	async fn test_dispatch_now_sends_without_touching_run_state() {
		let (repo, id) = setup().await;
		let gateway = RecordingGateway::new();

		dispatch_now(&repo, &gateway, id).await.unwrap();

		let sent = gateway.sent();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].task, "app.tasks.report");
		assert_eq!(sent[0].args, vec![json!("daily")]);

		let stored = repo.get_task(id).await.unwrap().unwrap();
		assert_eq!(stored.total_run_count, 0);
		assert!(stored.last_run_at.is_none());
	}

	#[tokio::test]
	async fn test_dispatch_now_unknown_task() {
		let (repo, _) = setup().await;
		let gateway = RecordingGateway::new();
		let err = dispatch_now(&repo, &gateway, TaskId(404)).await.unwrap_err();
		assert!(matches!(err, SchedulerError::TaskNotFound(_)));
	}

	#[tokio::test]
	async fn test_dispatch_now_surfaces_broker_errors() {
		let (repo, id) = setup().await;
		let gateway = RecordingGateway::new();
		gateway.set_failing(true);
		let err = dispatch_now(&repo, &gateway, id).await.unwrap_err();
		assert!(matches!(
			err,
			SchedulerError::Dispatch(DispatchError::BrokerUnavailable(_))
		));
	}
}
