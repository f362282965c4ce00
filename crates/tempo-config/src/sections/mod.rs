// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod broker;
mod database;
mod logging;
mod results;
mod scheduler;

pub use broker::{BrokerConfig, BrokerConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use results::{ResultsConfig, ResultsConfigLayer, MAX_RETENTION_DAYS};
pub use scheduler::{SchedulerConfig, SchedulerConfigLayer};
