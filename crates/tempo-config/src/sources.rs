// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and the environment.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::BeatConfigLayer;
use crate::sections::{
	BrokerConfigLayer, DatabaseConfigLayer, LogFormat, LoggingConfigLayer, ResultsConfigLayer,
	SchedulerConfigLayer,
};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/tempo/beat.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<BeatConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<BeatConfigLayer, ConfigError> {
		Ok(BeatConfigLayer::default())
	}
}

/// A TOML file. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<BeatConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(BeatConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: BeatConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variables.
///
/// Convention: TEMPO_<SECTION>_<FIELD>, except logging which uses TEMPO_LOG_*.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<BeatConfigLayer, ConfigError> {
		load_env_with(|name| std::env::var(name).ok())
	}
}

struct Env<F> {
	lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
		match self.var(name) {
			Some(v) => match v.to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" => Ok(Some(true)),
				"0" | "false" | "no" => Ok(Some(false)),
				_ => Err(ConfigError::InvalidValue {
					key: name.to_string(),
					message: format!("invalid boolean value '{v}'"),
				}),
			},
			None => Ok(None),
		}
	}

	fn parse<T: FromStr>(&self, name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid {kind} value '{v}'"),
			}),
			None => Ok(None),
		}
	}
}

pub(crate) fn load_env_with(
	lookup: impl Fn(&str) -> Option<String>,
) -> Result<BeatConfigLayer, ConfigError> {
	debug!("loading environment variables");
	let env = Env { lookup };

	let format = match env.var("TEMPO_LOG_FORMAT") {
		Some(v) => Some(
			v.parse::<LogFormat>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "TEMPO_LOG_FORMAT".to_string(),
					message,
				})?,
		),
		None => None,
	};

	Ok(BeatConfigLayer {
		database: Some(DatabaseConfigLayer {
			url: env.var("TEMPO_DATABASE_URL"),
			busy_timeout_ms: env.parse("TEMPO_DATABASE_BUSY_TIMEOUT_MS", "u64")?,
			max_connections: env.parse("TEMPO_DATABASE_MAX_CONNECTIONS", "u32")?,
		}),
		broker: Some(BrokerConfigLayer {
			url: env.var("TEMPO_BROKER_URL"),
			default_queue: env.var("TEMPO_BROKER_DEFAULT_QUEUE"),
			dry_run: env.bool("TEMPO_BROKER_DRY_RUN")?,
		}),
		scheduler: Some(SchedulerConfigLayer {
			max_interval_secs: env.parse("TEMPO_SCHEDULER_MAX_INTERVAL_SECS", "u64")?,
			min_separation_ms: env.parse("TEMPO_SCHEDULER_MIN_SEPARATION_MS", "u64")?,
			dispatch_retry_secs: env.parse("TEMPO_SCHEDULER_DISPATCH_RETRY_SECS", "u64")?,
			persist_attempts: env.parse("TEMPO_SCHEDULER_PERSIST_ATTEMPTS", "u32")?,
			persist_retry_delay_ms: env.parse("TEMPO_SCHEDULER_PERSIST_RETRY_DELAY_MS", "u64")?,
		}),
		results: Some(ResultsConfigLayer {
			retention_days: env.parse("TEMPO_RESULTS_RETENTION_DAYS", "u32")?,
		}),
		logging: Some(LoggingConfigLayer {
			level: env.var("TEMPO_LOG_LEVEL"),
			format,
		}),
	})
}
