use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value as JsonValue;
use tokio::fs;

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::config::AppConfig;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration with secrets redacted
    Show,

    /// Get a single value by dotted key (e.g. `servicenow.instance_url`)
    Get {
        /// Configuration key
        key: String,
    },

    /// Validate the configuration file and the instance URL
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Show => {
            let redacted = ctx.config().redacted();
            emit(output, &redacted, |config| {
                println!("Current configuration ({}):", path.display());
                match serde_yaml::to_string(config) {
                    Ok(text) => print!("{text}"),
                    Err(err) => eprintln!("failed to render configuration: {err}"),
                }
            })?;
        }
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(ctx.config().redacted())?;
            let Some(value) = lookup_key(&json, &key) else {
                bail!("{} not found in configuration", key);
            };
            emit(output, value, |value| match value {
                JsonValue::String(text) => println!("{text}"),
                other => println!("{other}"),
            })?;
        }
        ConfigAction::Validate => {
            if fs::try_exists(path).await? {
                let raw = fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_yaml::from_str::<AppConfig>(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?;
                println!("Configuration file {} is valid", path.display());
            } else {
                println!("No configuration file at {}; using defaults", path.display());
            }
            let url = ctx.config().instance_url()?;
            println!("ServiceNow instance: {url}");
        }
    }

    Ok(())
}

fn lookup_key<'a>(root: &'a JsonValue, key: &str) -> Option<&'a JsonValue> {
    key.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |node, segment| node.get(segment))
}
