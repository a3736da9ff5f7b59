use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use nsmove_netns::RelocationConfig;
use std::path::Path;

pub mod namespaces;
pub mod relocate;

/// Dispatch command to appropriate handler
pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Request(args) => relocate::request(&config, &args).await,
        Commands::Close(args) => relocate::close(&config, &args).await,
        Commands::Namespaces { pid } => namespaces::execute(&config, pid),
    }
}

fn load_config(path: Option<&Path>) -> Result<RelocationConfig> {
    let Some(path) = path else {
        return Ok(RelocationConfig::default());
    };

    RelocationConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
