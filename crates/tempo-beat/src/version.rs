// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Build information for `tempo-beat version`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set by the release pipeline; absent in local builds.
const GIT_SHA: Option<&str> = option_env!("TEMPO_GIT_SHA");

pub fn format_version_info() -> String {
	format!(
		"tempo-beat version: {}\n\
		 Git SHA:            {}\n\
		 Platform:           {}-{}",
		VERSION,
		GIT_SHA.unwrap_or("unknown"),
		std::env::consts::OS,
		std::env::consts::ARCH,
	)
}
