// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Beat loop tuning.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfigLayer {
	pub max_interval_secs: Option<u64>,
	pub min_separation_ms: Option<u64>,
	pub dispatch_retry_secs: Option<u64>,
	pub persist_attempts: Option<u32>,
	pub persist_retry_delay_ms: Option<u64>,
}

impl SchedulerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_interval_secs.is_some() {
			self.max_interval_secs = other.max_interval_secs;
		}
		if other.min_separation_ms.is_some() {
			self.min_separation_ms = other.min_separation_ms;
		}
		if other.dispatch_retry_secs.is_some() {
			self.dispatch_retry_secs = other.dispatch_retry_secs;
		}
		if other.persist_attempts.is_some() {
			self.persist_attempts = other.persist_attempts;
		}
		if other.persist_retry_delay_ms.is_some() {
			self.persist_retry_delay_ms = other.persist_retry_delay_ms;
		}
	}

	pub fn finalize(self) -> SchedulerConfig {
		let defaults = SchedulerConfig::default();
		SchedulerConfig {
			max_interval_secs: self.max_interval_secs.unwrap_or(defaults.max_interval_secs),
			min_separation_ms: self.min_separation_ms.unwrap_or(defaults.min_separation_ms),
			dispatch_retry_secs: self
				.dispatch_retry_secs
				.unwrap_or(defaults.dispatch_retry_secs),
			persist_attempts: self.persist_attempts.unwrap_or(defaults.persist_attempts),
			persist_retry_delay_ms: self
				.persist_retry_delay_ms
				.unwrap_or(defaults.persist_retry_delay_ms),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
	pub max_interval_secs: u64,
	pub min_separation_ms: u64,
	pub dispatch_retry_secs: u64,
	pub persist_attempts: u32,
	pub persist_retry_delay_ms: u64,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			max_interval_secs: 5,
			min_separation_ms: 1000,
			dispatch_retry_secs: 5,
			persist_attempts: 3,
			persist_retry_delay_ms: 200,
		}
	}
}

impl SchedulerConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_interval_secs < 1 {
			return Err(ConfigError::Validation(
				"scheduler.max_interval_secs must be at least 1".to_string(),
			));
		}
		if self.persist_attempts < 1 {
			return Err(ConfigError::Validation(
				"scheduler.persist_attempts must be at least 1".to_string(),
			));
		}
		Ok(())
	}
}
