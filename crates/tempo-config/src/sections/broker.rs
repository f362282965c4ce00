// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Message broker configuration.

use serde::Deserialize;

const DEFAULT_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_QUEUE: &str = "celery";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
	pub url: String,
	/// Queue used when a task names none.
	pub default_queue: String,
	/// Log dispatches instead of sending them.
	pub dry_run: bool,
}

impl Default for BrokerConfig {
	fn default() -> Self {
		BrokerConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub default_queue: Option<String>,
	#[serde(default)]
	pub dry_run: Option<bool>,
}

impl BrokerConfigLayer {
	pub fn merge(&mut self, other: BrokerConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.default_queue.is_some() {
			self.default_queue = other.default_queue;
		}
		if other.dry_run.is_some() {
			self.dry_run = other.dry_run;
		}
	}

	pub fn finalize(self) -> BrokerConfig {
		BrokerConfig {
			url: self.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
			default_queue: self
				.default_queue
				.unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
			dry_run: self.dry_run.unwrap_or(false),
		}
	}
}
