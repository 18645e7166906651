use anyhow::{Context as _, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::info;
use tsync_core::CursorStore;

use crate::context::{Context, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum CursorCmd {
	/// Show where the next sync of a device starts
	Get {
		device_id: String,
	},
	/// Overwrite a device's cursor, moving it back replays that window
	Set {
		device_id: String,
		/// RFC 3339 timestamp, naive timestamps are read as UTC
		at: String,
	},
}

pub async fn run(ctx: &Context, cmd: CursorCmd) -> Result<()> {
	let store = ctx.cursor_store().await?;

	match cmd {
		CursorCmd::Get { device_id } => {
			let key = ctx.cursor_key(&device_id)?;
			let cursor = store.get(&key).await?;

			match ctx.format {
				OutputFormat::Human => println!(
					"{key}: {}",
					cursor.map_or_else(|| "(not set)".to_string(), |c| c.to_rfc3339())
				),
				OutputFormat::Json => println!(
					"{}",
					serde_json::to_string_pretty(&json!({
						"key": key.to_string(),
						"cursor": cursor,
					}))?
				),
			}
		}
		CursorCmd::Set { device_id, at } => {
			let key = ctx.cursor_key(&device_id)?;
			let at = tsync_source_api::parse_timestamp(at.trim())
				.with_context(|| format!("Invalid timestamp: '{at}'"))?;

			let previous = store.get(&key).await?;
			store.set(&key, at).await?;

			info!(%key, ?previous, %at, "Cursor overwritten by operator");
			println!("Set {key} = {}", at.to_rfc3339());
		}
	}

	Ok(())
}
