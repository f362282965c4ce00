// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The beat loop: turns stored periodic tasks into dispatches at the right
//! instants, at most once per due occurrence.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod run_now;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BeatConfig;
pub use entry::ScheduleEntry;
pub use error::{Result, SchedulerError};
pub use run_now::dispatch_now;
pub use scheduler::{Scheduler, SchedulerState, SchedulerStatus, TickReport};
