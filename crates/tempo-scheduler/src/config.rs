// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

/// Loop tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatConfig {
	/// Longest sleep between ticks, so store changes are noticed promptly.
	pub max_interval: Duration,
	/// Two fires of one entry are never closer than this.
	pub min_separation: Duration,
	/// Back-off before retrying an entry whose dispatch or persist failed.
	pub dispatch_retry: Duration,
	/// Attempts at writing run-state after a dispatch.
	pub persist_attempts: u32,
	pub persist_retry_delay: Duration,
}

impl Default for BeatConfig {
	fn default() -> Self {
		Self {
			max_interval: Duration::from_secs(5),
			min_separation: Duration::from_secs(1),
			dispatch_retry: Duration::from_secs(5),
			persist_attempts: 3,
			persist_retry_delay: Duration::from_millis(200),
		}
	}
}
