mod cache;
mod commands;
mod config;
mod db;
mod history;
mod logging;
mod qr;

use clap::{ArgAction, Parser};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qretro")]
#[command(about = "Retro-terminal QR code generator with an offline cache and synchronized history")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/qretro/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let _log_guard = logging::init(args.verbose, config.log_file.as_deref())?;

  commands::run(args.command, &config).await
}
