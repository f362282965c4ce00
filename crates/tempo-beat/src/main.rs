// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! tempo-beat: dispatches database-defined periodic tasks to the broker.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod version;

#[derive(Parser, Debug)]
#[command(
	name = "tempo-beat",
	about = "Database-backed periodic task scheduler",
	version
)]
struct Args {
	/// Config file to use instead of /etc/tempo/beat.toml
	#[arg(long, global = true, env = "TEMPO_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Apply migrations and run the scheduler loop (default)
	Run {
		/// Log dispatches instead of sending them to the broker
		#[arg(long)]
		dry_run: bool,
	},
	/// Apply database migrations and exit
	Migrate,
	/// List periodic task definitions with their run state
	Tasks,
	/// Dispatch a task immediately, outside its schedule
	RunNow {
		name: String,
		#[arg(long)]
		dry_run: bool,
	},
	/// Remove finished task results older than the retention period
	CleanupResults {
		#[arg(long)]
		days: Option<u32>,
	},
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let command = args.command.unwrap_or(Command::Run { dry_run: false });
	if let Command::Version = command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => tempo_config::load_config_with_file(path)?,
		None => tempo_config::load_config()?,
	};
	logging::init(&config.logging);

	tracing::info!(
		version = version::VERSION,
		database = %config.database.url,
		"starting tempo-beat"
	);

	match command {
		Command::Run { dry_run } => commands::run(&config, dry_run).await,
		Command::Migrate => commands::migrate(&config).await,
		Command::Tasks => commands::tasks(&config).await,
		Command::RunNow { name, dry_run } => commands::run_now(&config, &name, dry_run).await,
		Command::CleanupResults { days } => commands::cleanup_results(&config, days).await,
		Command::Version => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_command_is_none() {
		let args = Args::try_parse_from(["tempo-beat"]).unwrap();
		assert!(args.command.is_none());
	}

	#[test]
	fn test_parse_subcommands() {
		let args =
			Args::try_parse_from(["tempo-beat", "--config", "/tmp/beat.toml", "run", "--dry-run"])
				.unwrap();
		assert_eq!(args.config, Some(PathBuf::from("/tmp/beat.toml")));
		assert!(matches!(args.command, Some(Command::Run { dry_run: true })));

		let args = Args::try_parse_from(["tempo-beat", "run-now", "nightly-report"]).unwrap();
		assert!(matches!(
			args.command,
			Some(Command::RunNow { ref name, dry_run: false }) if name == "nightly-report"
		));

		let args = Args::try_parse_from(["tempo-beat", "cleanup-results", "--days", "30"]).unwrap();
		assert!(matches!(
			args.command,
			Some(Command::CleanupResults { days: Some(30) })
		));
	}
}
