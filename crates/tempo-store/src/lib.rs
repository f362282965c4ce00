// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for tempo.
//!
//! - [`TaskRepository`]: task definitions, run-state and the change marker
//! - [`ScheduleRepository`]: interval and crontab rows
//! - [`TaskResultRepository`]: execution results reported by workers
//!
//! The scheduler depends only on the [`TaskStore`] trait.

pub mod error;
pub mod pool;
pub mod result;
pub mod schedule;
pub mod schema;
pub mod task;
mod timestamp;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Result, StoreError};
pub use pool::{create_pool, create_pool_with, PoolSettings};
pub use result::{ResultFilter, TaskResultRepository, TaskStatistics};
pub use schedule::ScheduleRepository;
pub use schema::run_migrations;
pub use task::{ChangeMarker, NewPeriodicTask, TaskFilter, TaskRepository, TaskStore, TaskUpdate};
pub use sqlx::SqlitePool;
