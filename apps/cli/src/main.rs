use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod context;
mod domains;
mod logging;

use crate::{
	config::{AppConfig, Overrides},
	context::{Context, OutputFormat},
	domains::{config::ConfigCmd, cursor::CursorCmd, sync::UploadArgs},
};

#[derive(Parser, Debug)]
#[command(name = "tsync", about = "Incremental tracking-device telemetry sync")]
struct Cli {
	/// Path to the tsync data directory
	#[arg(long, env = "TSYNC_DATA_DIR", global = true)]
	data_dir: Option<PathBuf>,

	/// Integration whose cursors are read and written
	#[arg(long, env = "TSYNC_INTEGRATION_ID", global = true)]
	integration_id: Option<String>,

	/// Source API base URL
	#[arg(long, env = "TSYNC_SOURCE_URL", global = true)]
	source_url: Option<String>,

	/// Downstream observations endpoint
	#[arg(long, env = "TSYNC_FORWARD_URL", global = true)]
	forward_url: Option<String>,

	/// Key sent in the `apikey` header downstream
	#[arg(long, env = "TSYNC_FORWARD_API_KEY", global = true, hide_env_values = true)]
	forward_api_key: Option<String>,

	/// Output format
	#[arg(long, value_enum, default_value = "human", global = true)]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Sync every uploaded device in this process
	Sync(UploadArgs),
	/// Trigger one task per uploaded device, then run them on the local dispatcher
	Trigger(UploadArgs),
	/// Inspect or repair device cursors
	#[command(subcommand)]
	Cursor(CursorCmd),
	/// Manage the config file
	#[command(subcommand)]
	Config(ConfigCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let data_dir = match cli.data_dir {
		Some(dir) => dir,
		None => tsync_config::default_data_dir()?,
	};

	// Init must work even when the existing config no longer parses
	let command = match cli.command {
		Commands::Config(ConfigCmd::Init { force }) => {
			return domains::config::init(&data_dir, force)
		}
		command => command,
	};

	let mut config = AppConfig::load(&data_dir)?;
	let _guard = logging::init(&AppConfig::logs_dir(&data_dir), &config.log_filter)?;

	config.apply(Overrides {
		integration_id: cli.integration_id,
		source_url: cli.source_url,
		forward_url: cli.forward_url,
		forward_api_key: cli.forward_api_key,
	});

	let ctx = Context::new(data_dir, config, cli.format);

	match command {
		Commands::Sync(args) => domains::sync::run(&ctx, args).await,
		Commands::Trigger(args) => domains::sync::trigger(&ctx, args).await,
		Commands::Cursor(cmd) => domains::cursor::run(&ctx, cmd).await,
		Commands::Config(ConfigCmd::Show) => domains::config::show(&ctx),
		Commands::Config(ConfigCmd::Init { force }) => domains::config::init(&ctx.data_dir, force),
	}
}
