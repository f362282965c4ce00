// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crontab schedules: five cron fields evaluated in an IANA timezone.
//!
//! Field parsing and the occurrence search are delegated to the `cron` crate.
//! Stored fields use the classic crontab conventions (day-of-week 0 = Sunday,
//! `a/n` steps, `sun`..`sat` and `jan`..`dec` names), which are translated to
//! the crate's seven-field form before parsing. Local wall-clock times are
//! resolved against the timezone here, so a DST gap never matches and a DST
//! fold yields both instants.

use std::fmt;
use std::str::FromStr;

use chrono::{
	DateTime, Datelike, Duration, LocalResult, NaiveDateTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use cron::{Schedule, TimeUnitSpec};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::schedule::ScheduleState;

/// Recheck delay, in seconds, for expressions that never match (`0 0 31 2 *`).
const NO_OCCURRENCE_RECHECK_SECS: i64 = 3600;

/// How far before `after` the occurrence search starts, in local wall-clock
/// hours. Covers the repeated hour of a DST fold.
const FOLD_LOOKBACK_HOURS: i64 = 2;

/// Bound on crate candidates inspected per search.
const MAX_CANDIDATES: usize = 4096;

const FIELD_NAMES: [&str; 5] = ["minute", "hour", "day_of_month", "month_of_year", "day_of_week"];

/// Number of values in each field's domain.
const DOMAIN_LENS: [usize; 5] = [60, 24, 31, 12, 7];

/// A crontab schedule as stored: raw field strings and a timezone name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrontabSchedule {
	pub minute: String,
	pub hour: String,
	pub day_of_month: String,
	pub month_of_year: String,
	pub day_of_week: String,
	#[serde(default = "default_timezone")]
	pub timezone: String,
}

fn default_timezone() -> String {
	"UTC".to_string()
}

impl Default for CrontabSchedule {
	fn default() -> Self {
		Self {
			minute: "*".to_string(),
			hour: "*".to_string(),
			day_of_month: "*".to_string(),
			month_of_year: "*".to_string(),
			day_of_week: "*".to_string(),
			timezone: default_timezone(),
		}
	}
}

impl CrontabSchedule {
	/// Build from a standard five-field expression
	/// (`minute hour day-of-month month day-of-week`).
	pub fn from_expression(expression: &str, timezone: &str) -> Result<Self> {
		let fields: Vec<&str> = expression.split_whitespace().collect();
		if fields.len() != 5 {
			return Err(CoreError::InvalidCronExpression(format!(
				"expected 5 fields, got {} in '{expression}'",
				fields.len()
			)));
		}

		let schedule = Self {
			minute: fields[0].to_string(),
			hour: fields[1].to_string(),
			day_of_month: fields[2].to_string(),
			month_of_year: fields[3].to_string(),
			day_of_week: fields[4].to_string(),
			timezone: timezone.to_string(),
		};
		schedule.compile()?;
		Ok(schedule)
	}

	pub fn expression(&self) -> String {
		format!(
			"{} {} {} {} {}",
			self.minute, self.hour, self.day_of_month, self.month_of_year, self.day_of_week
		)
	}

	fn fields(&self) -> [&str; 5] {
		[
			&self.minute,
			&self.hour,
			&self.day_of_month,
			&self.month_of_year,
			&self.day_of_week,
		]
	}

	/// Parse every field and the timezone. This is where configuration
	/// errors surface; a compiled [`Crontab`] cannot fail to evaluate.
	pub fn compile(&self) -> Result<Crontab> {
		let tz: Tz = self
			.timezone
			.parse()
			.map_err(|_| CoreError::InvalidTimezone(self.timezone.clone()))?;

		let mut fields: [String; 5] = Default::default();
		for (idx, raw) in self.fields().into_iter().enumerate() {
			let compact: String = raw.split_whitespace().collect();
			if compact.is_empty() {
				return Err(field_error(idx, raw, "field is empty".to_string()));
			}
			fields[idx] = compact;
		}

		let schedule = Schedule::from_str(&to_cron_crate_format(&fields))
			.map_err(|e| locate_error(&fields, e.to_string()))?;
		let crontab = Crontab::new(schedule, tz);

		if let Some(idx) = crontab.empty_field() {
			return Err(field_error(idx, &fields[idx], "matches no values".to_string()));
		}
		Ok(crontab)
	}
}

impl fmt::Display for CrontabSchedule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.expression(), self.timezone)
	}
}

/// Seven-field form for the `cron` crate: second 0, the five fields with
/// day-of-week shifted to 1 = Sunday, and any year.
fn to_cron_crate_format(fields: &[String; 5]) -> String {
	format!(
		"0 {} {} {} {} {} *",
		fields[0],
		fields[1],
		fields[2],
		fields[3],
		shift_day_of_week(&fields[4])
	)
}

/// Rewrite numeric day-of-week values from 0 = Sunday to the crate's
/// 1 = Sunday. Names and step sizes are left alone.
fn shift_day_of_week(field: &str) -> String {
	fn flush(out: &mut String, digits: &mut String, is_step: bool) {
		if digits.is_empty() {
			return;
		}
		match digits.parse::<u32>() {
			Ok(value) if !is_step => out.push_str(&(value + 1).to_string()),
			_ => out.push_str(digits),
		}
		digits.clear();
	}

	let mut out = String::with_capacity(field.len() + 2);
	let mut digits = String::new();
	let mut is_step = false;
	for c in field.chars() {
		if c.is_ascii_digit() {
			digits.push(c);
			continue;
		}
		flush(&mut out, &mut digits, is_step);
		is_step = c == '/';
		out.push(c);
	}
	flush(&mut out, &mut digits, is_step);
	out
}

/// Re-parse each field against an otherwise full expression to name the
/// one the crate rejected.
fn locate_error(fields: &[String; 5], reason: String) -> CoreError {
	for idx in 0..fields.len() {
		let mut isolated: [String; 5] = Default::default();
		for (i, slot) in isolated.iter_mut().enumerate() {
			*slot = if i == idx {
				fields[i].clone()
			} else {
				"*".to_string()
			};
		}
		if Schedule::from_str(&to_cron_crate_format(&isolated)).is_err() {
			return field_error(idx, &fields[idx], reason);
		}
	}
	CoreError::InvalidCronExpression(reason)
}

fn field_error(idx: usize, expression: &str, reason: String) -> CoreError {
	CoreError::InvalidCronField {
		field: FIELD_NAMES[idx],
		expression: expression.to_string(),
		reason,
	}
}

/// Canonical form of one field: `*` when full, otherwise ascending values
/// with consecutive runs collapsed into `a-b`.
fn canonical_field(values: &[u32], domain_len: usize) -> String {
	if values.len() == domain_len {
		return "*".to_string();
	}

	let mut parts = Vec::new();
	let mut i = 0;
	while i < values.len() {
		let start = values[i];
		let mut end = start;
		while i + 1 < values.len() && values[i + 1] == end + 1 {
			i += 1;
			end = values[i];
		}
		if start == end {
			parts.push(start.to_string());
		} else {
			parts.push(format!("{start}-{end}"));
		}
		i += 1;
	}
	parts.join(",")
}

/// Wall-clock minute identity in a schedule's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinuteKey {
	pub year: i32,
	pub month: u32,
	pub day: u32,
	pub hour: u32,
	pub minute: u32,
}

/// A compiled crontab, ready for evaluation.
#[derive(Clone)]
pub struct Crontab {
	schedule: Schedule,
	tz: Tz,
	/// Matched values per field, day-of-week with 0 = Sunday.
	values: [Vec<u32>; 5],
}

impl Crontab {
	fn new(schedule: Schedule, tz: Tz) -> Self {
		let collect = |range: std::ops::RangeInclusive<u32>, includes: &dyn Fn(u32) -> bool| {
			range.filter(|v| includes(*v)).collect::<Vec<u32>>()
		};
		let values = [
			collect(0..=59, &|v| schedule.minutes().includes(v)),
			collect(0..=23, &|v| schedule.hours().includes(v)),
			collect(1..=31, &|v| schedule.days_of_month().includes(v)),
			collect(1..=12, &|v| schedule.months().includes(v)),
			collect(0..=6, &|v| schedule.days_of_week().includes(v + 1)),
		];
		Self {
			schedule,
			tz,
			values,
		}
	}

	fn empty_field(&self) -> Option<usize> {
		self.values.iter().position(Vec::is_empty)
	}

	pub fn timezone(&self) -> Tz {
		self.tz
	}

	/// Whether the minute containing `instant`, in the schedule's timezone,
	/// matches all five fields.
	pub fn matches(&self, instant: DateTime<Utc>) -> bool {
		let start = instant.timestamp() - instant.timestamp().rem_euclid(60);
		DateTime::from_timestamp(start, 0)
			.map(|start| self.schedule.includes(start.with_timezone(&self.tz)))
			.unwrap_or(false)
	}

	fn is_every_minute(&self) -> bool {
		self.values
			.iter()
			.zip(DOMAIN_LENS)
			.all(|(values, len)| values.len() == len)
	}

	pub fn minute_key(&self, instant: DateTime<Utc>) -> MinuteKey {
		let local = instant.with_timezone(&self.tz);
		MinuteKey {
			year: local.year(),
			month: local.month(),
			day: local.day(),
			hour: local.hour(),
			minute: local.minute(),
		}
	}

	/// Time left until the local wall-clock minute containing `instant` ends.
	pub fn until_minute_end(&self, instant: DateTime<Utc>) -> Duration {
		let local = instant.with_timezone(&self.tz);
		let into_minute = Duration::seconds(i64::from(local.second()))
			+ Duration::nanoseconds(i64::from(local.nanosecond() % 1_000_000_000));
		Duration::minutes(1) - into_minute
	}

	/// UTC instants for a local wall-clock time: none in a DST gap, two in a
	/// DST fold.
	fn resolve(&self, wall: NaiveDateTime) -> impl Iterator<Item = DateTime<Utc>> {
		let (early, late) = match self.tz.from_local_datetime(&wall) {
			LocalResult::Single(dt) => (Some(dt), None),
			LocalResult::Ambiguous(early, late) => (Some(early), Some(late)),
			LocalResult::None => (None, None),
		};
		early
			.into_iter()
			.chain(late)
			.map(|dt| dt.with_timezone(&Utc))
	}

	/// The first matching minute boundary strictly after `after`.
	///
	/// The crate walks local wall-clock times (expressed as naive UTC so no
	/// offset is applied); each candidate is then resolved in the schedule's
	/// timezone.
	pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
		if self.is_every_minute() {
			let truncated = after.timestamp() - after.timestamp().rem_euclid(60);
			return DateTime::from_timestamp(truncated + 60, 0);
		}

		let local_after = after.with_timezone(&self.tz).naive_local();
		let from = Utc.from_utc_datetime(&(local_after - Duration::hours(FOLD_LOOKBACK_HOURS)));

		let mut best: Option<(NaiveDateTime, DateTime<Utc>)> = None;
		for candidate in self.schedule.after(&from).take(MAX_CANDIDATES) {
			let wall = candidate.naive_utc();
			if let Some((found_at, _)) = best {
				if wall - found_at > Duration::hours(FOLD_LOOKBACK_HOURS) {
					break;
				}
			}
			for instant in self.resolve(wall) {
				if instant > after && best.map_or(true, |(_, b)| instant < b) {
					best = Some((wall, instant));
				}
			}
		}

		best.map(|(_, instant)| instant)
	}

	/// Raw match state at `now`: due while inside a matching minute, and the
	/// delay until the next matching minute boundary otherwise.
	pub fn state(&self, now: DateTime<Utc>) -> ScheduleState {
		if self.matches(now) {
			return ScheduleState::due();
		}
		let remaining = self
			.next_occurrence(now)
			.map(|next| next - now)
			.unwrap_or_else(|| Duration::seconds(NO_OCCURRENCE_RECHECK_SECS));
		ScheduleState::not_due(remaining)
	}

	/// Canonical field strings for this crontab.
	pub fn canonical(&self) -> CrontabSchedule {
		let [minute, hour, day_of_month, month_of_year, day_of_week] =
			std::array::from_fn(|idx| canonical_field(&self.values[idx], DOMAIN_LENS[idx]));
		CrontabSchedule {
			minute,
			hour,
			day_of_month,
			month_of_year,
			day_of_week,
			timezone: self.tz.name().to_string(),
		}
	}
}

impl PartialEq for Crontab {
	fn eq(&self, other: &Self) -> bool {
		self.tz == other.tz && self.values == other.values
	}
}

impl Eq for Crontab {}

impl fmt::Debug for Crontab {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Crontab")
			.field("expression", &self.canonical().expression())
			.field("tz", &self.tz.name())
			.finish()
	}
}

impl fmt::Display for Crontab {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let canonical = self.canonical();
		write!(f, "{} ({})", canonical.expression(), self.tz.name())
	}
}
