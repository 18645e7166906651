use anyhow::Result;
use clap::Subcommand;
use std::path::Path;

use crate::{config::AppConfig, context::Context};

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
	/// Write a default config file
	Init {
		/// Replace an existing config file
		#[arg(long, default_value_t = false)]
		force: bool,
	},
	/// Show the effective configuration, flags and environment included
	Show,
}

pub fn init(data_dir: &Path, force: bool) -> Result<()> {
	let config_path = AppConfig::config_path(data_dir);

	if config_path.exists() && !force {
		anyhow::bail!(
			"Config already exists at {}, pass --force to replace it",
			config_path.display()
		);
	}

	AppConfig::default().save(data_dir)?;
	println!("Wrote default config to {}", config_path.display());

	Ok(())
}

pub fn show(ctx: &Context) -> Result<()> {
	let mut config = ctx.config.clone();
	if config.forwarder.api_key.is_some() {
		config.forwarder.api_key = Some("<redacted>".to_string());
	}

	println!("{}", serde_json::to_string_pretty(&config)?);
	println!();
	println!(
		"Config file: {}",
		AppConfig::config_path(&ctx.data_dir).display()
	);
	println!(
		"Cursor file: {}",
		ctx.config.cursor_path(&ctx.data_dir).display()
	);

	Ok(())
}
