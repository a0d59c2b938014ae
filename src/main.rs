//! Songrack CLI
//!
//! Command-line interface for the songrack engine.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use songrack::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Songrack v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Songrack v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Modules { json } => commands::list_modules(json).context("listing modules"),
        Commands::Render {
            out,
            seconds,
            config,
            demo,
            bit_depth,
        } => commands::render(&out, seconds, config.as_deref(), demo, bit_depth)
            .with_context(|| format!("rendering to {}", out.display())),
        #[cfg(feature = "cpal-output")]
        Commands::Play {
            seconds,
            config,
            demo,
        } => commands::play(seconds, config.as_deref(), demo).context("playing song"),
        Commands::Config { dump, check } => {
            commands::config(dump, check.as_deref()).context("reading config")
        }
    }
}
