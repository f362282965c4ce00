// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::SecondsFormat;
use tempo_config::{SchedulerConfig, TempoConfig, MAX_RETENTION_DAYS};
use tempo_core::PeriodicTask;
use tempo_dispatch::{DispatchGateway, LoggingGateway, RedisGateway};
use tempo_scheduler::{dispatch_now, BeatConfig, Scheduler, SystemClock};
use tempo_store::{
	create_pool_with, run_migrations, PoolSettings, SqlitePool, TaskFilter, TaskRepository,
	TaskResultRepository,
};
use tokio::sync::watch;
use tracing::info;

pub fn beat_config(config: &SchedulerConfig) -> BeatConfig {
	BeatConfig {
		max_interval: Duration::from_secs(config.max_interval_secs),
		min_separation: Duration::from_millis(config.min_separation_ms),
		dispatch_retry: Duration::from_secs(config.dispatch_retry_secs),
		persist_attempts: config.persist_attempts,
		persist_retry_delay: Duration::from_millis(config.persist_retry_delay_ms),
	}
}

async fn open_store(config: &TempoConfig) -> Result<SqlitePool> {
	let settings = PoolSettings {
		busy_timeout: Duration::from_millis(config.database.busy_timeout_ms),
		max_connections: config.database.max_connections,
	};
	let pool = create_pool_with(&config.database.url, &settings)
		.await
		.with_context(|| format!("opening database {}", config.database.url))?;
	run_migrations(&pool).await.context("running migrations")?;
	Ok(pool)
}

async fn gateway(config: &TempoConfig, dry_run: bool) -> Result<Arc<dyn DispatchGateway>> {
	let queue = config.broker.default_queue.clone();
	if dry_run || config.broker.dry_run {
		info!(default_queue = %queue, "dry run: dispatches are logged, not sent");
		return Ok(Arc::new(LoggingGateway::new(queue)));
	}
	let gateway = RedisGateway::connect(&config.broker.url, &queue)
		.await
		.with_context(|| format!("connecting to broker {}", config.broker.url))?;
	Ok(Arc::new(gateway))
}

pub async fn run(config: &TempoConfig, dry_run: bool) -> Result<()> {
	let pool = open_store(config).await?;
	let store = Arc::new(TaskRepository::new(pool));
	let gateway = gateway(config, dry_run).await?;

	let mut scheduler = Scheduler::new(
		store,
		gateway,
		Arc::new(SystemClock),
		beat_config(&config.scheduler),
	);

	let (tx, rx) = watch::channel(false);
	tokio::spawn(async move {
		shutdown_signal().await;
		info!("shutdown signal received, finishing current tick");
		let _ = tx.send(true);
	});

	let status = scheduler.run(rx).await;
	info!(
		ticks = status.ticks,
		reloads = status.reloads,
		dispatched = status.dispatched,
		dispatch_failures = status.dispatch_failures,
		persist_failures = status.persist_failures,
		"tempo-beat shutdown complete"
	);
	Ok(())
}

pub async fn migrate(config: &TempoConfig) -> Result<()> {
	open_store(config).await?;
	println!("migrations applied to {}", config.database.url);
	Ok(())
}

fn describe(task: &PeriodicTask) -> String {
	let last_run = task
		.last_run_at
		.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
		.unwrap_or_else(|| "never".to_string());
	format!(
		"{:>5}  {:<8} {:<32} {:<40} runs={} last={}{}",
		task.id.to_string(),
		if task.enabled { "enabled" } else { "disabled" },
		task.name,
		task.schedule.to_string(),
		task.total_run_count,
		last_run,
		if task.one_off { " one-off" } else { "" },
	)
}

pub async fn tasks(config: &TempoConfig) -> Result<()> {
	let repo = TaskRepository::new(open_store(config).await?);
	let tasks = repo.list_tasks(TaskFilter::default()).await?;
	if tasks.is_empty() {
		println!("no periodic tasks");
		return Ok(());
	}
	for task in &tasks {
		println!("{}", describe(task));
	}
	Ok(())
}

pub async fn run_now(config: &TempoConfig, name: &str, dry_run: bool) -> Result<()> {
	let repo = TaskRepository::new(open_store(config).await?);
	let task = repo
		.get_task_by_name(name)
		.await?
		.ok_or_else(|| anyhow!("no periodic task named '{name}'"))?;
	let gateway = gateway(config, dry_run).await?;

	let receipt = dispatch_now(&repo, gateway.as_ref(), task.id).await?;
	println!(
		"dispatched {} as {} to queue {}",
		task.name, receipt.dispatch_id, receipt.queue
	);
	Ok(())
}

pub async fn cleanup_results(config: &TempoConfig, days: Option<u32>) -> Result<()> {
	let days = days.unwrap_or(config.results.retention_days);
	if days == 0 {
		return Err(anyhow!("--days must be at least 1"));
	}
	if days > MAX_RETENTION_DAYS {
		return Err(anyhow!("--days must be at most {MAX_RETENTION_DAYS}"));
	}
	let repo = TaskResultRepository::new(open_store(config).await?);
	let deleted = repo.cleanup_older_than(days).await?;
	println!("removed {deleted} task results older than {days} days");
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "failed to listen for ctrl-c");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				tracing::error!(error = %e, "failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_beat_config_units() {
		let config = SchedulerConfig {
			max_interval_secs: 3,
			min_separation_ms: 250,
			dispatch_retry_secs: 7,
			persist_attempts: 2,
			persist_retry_delay_ms: 50,
		};
		let beat = beat_config(&config);
		assert_eq!(beat.max_interval, Duration::from_secs(3));
		assert_eq!(beat.min_separation, Duration::from_millis(250));
		assert_eq!(beat.dispatch_retry, Duration::from_secs(7));
		assert_eq!(beat.persist_attempts, 2);
		assert_eq!(beat.persist_retry_delay, Duration::from_millis(50));
	}

	#[test]
	fn test_defaults_match_beat_defaults() {
		assert_eq!(beat_config(&SchedulerConfig::default()), BeatConfig::default());
	}
}
