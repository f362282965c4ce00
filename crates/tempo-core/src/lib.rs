// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the tempo periodic-task scheduler.
//!
//! This crate holds the pure, I/O-free parts of the system:
//! - Schedule value types ([`IntervalSchedule`], [`CrontabSchedule`]) and their
//!   resolved form ([`Schedule`]), each answering "is it due, and how long until
//!   the next check?"
//! - Crontab evaluation built on the `cron` crate ([`Crontab`])
//! - Task definitions, run-state and execution results as stored in the task store

pub mod crontab;
pub mod error;
pub mod interval;
pub mod result;
pub mod schedule;
pub mod task;

pub use crontab::{Crontab, CrontabSchedule, MinuteKey};
pub use error::{CoreError, Result};
pub use interval::{IntervalPeriod, IntervalSchedule};
pub use result::{TaskResult, TaskResultUpdate, TaskStatus};
pub use schedule::{Schedule, ScheduleDefinition, ScheduleState, MIN_NEXT_CHECK};
pub use task::{
	CrontabId, IntervalId, PeriodicTask, RoutingOptions, RunState, ScheduleRef, TaskId,
};
