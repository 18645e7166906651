use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
	/// Device list files, JSON or base64 encoded JSON
	#[arg(long = "upload", required = true, num_args = 1..)]
	pub files: Vec<PathBuf>,
}
