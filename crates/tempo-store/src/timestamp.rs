// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timestamps are stored as RFC 3339 UTC text. Triggers write millisecond
//! precision, the repositories write microseconds; both parse here.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, StoreError};

pub(crate) fn format(dt: DateTime<Utc>) -> String {
	dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse(column: &str, value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| StoreError::InvalidRow(format!("{column} '{value}': {e}")))
}

pub(crate) fn parse_opt(column: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
	value.map(|v| parse(column, &v)).transpose()
}
