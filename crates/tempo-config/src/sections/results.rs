// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

use crate::error::ConfigError;

/// Longest retention accepted, about a century.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsConfig {
	/// Finished results older than this are removed by `cleanup-results`.
	pub retention_days: u32,
}

impl Default for ResultsConfig {
	fn default() -> Self {
		Self { retention_days: 7 }
	}
}

impl ResultsConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.retention_days < 1 {
			return Err(ConfigError::Validation(
				"results.retention_days must be at least 1".to_string(),
			));
		}
		if self.retention_days > MAX_RETENTION_DAYS {
			return Err(ConfigError::Validation(format!(
				"results.retention_days must be at most {MAX_RETENTION_DAYS}"
			)));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultsConfigLayer {
	#[serde(default)]
	pub retention_days: Option<u32>,
}

impl ResultsConfigLayer {
	pub fn merge(&mut self, other: ResultsConfigLayer) {
		if other.retention_days.is_some() {
			self.retention_days = other.retention_days;
		}
	}

	pub fn finalize(self) -> ResultsConfig {
		ResultsConfig {
			retention_days: self
				.retention_days
				.unwrap_or(ResultsConfig::default().retention_days),
		}
	}
}
