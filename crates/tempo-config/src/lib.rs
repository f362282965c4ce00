// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the tempo beat daemon.
//!
//! Layered from built-in defaults, a TOML file and `TEMPO_*` environment
//! variables, later sources overriding earlier ones field by field.

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::BeatConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempoConfig {
	pub database: DatabaseConfig,
	pub broker: BrokerConfig,
	pub scheduler: SchedulerConfig,
	pub results: ResultsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration with the standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TEMPO_*`)
/// 2. Config file (`/etc/tempo/beat.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<TempoConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a specific config file in place of the system one.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<TempoConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<TempoConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = BeatConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Resolve a merged layer and validate it.
pub fn finalize(layer: BeatConfigLayer) -> Result<TempoConfig, ConfigError> {
	let config = TempoConfig {
		database: layer.database.unwrap_or_default().finalize(),
		broker: layer.broker.unwrap_or_default().finalize(),
		scheduler: layer.scheduler.unwrap_or_default().finalize(),
		results: layer.results.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	config.database.validate()?;
	config.scheduler.validate()?;
	config.results.validate()?;

	info!(
		database = %config.database.url,
		default_queue = %config.broker.default_queue,
		dry_run = config.broker.dry_run,
		max_interval_secs = config.scheduler.max_interval_secs,
		min_separation_ms = config.scheduler.min_separation_ms,
		"configuration loaded"
	);

	Ok(config)
}
