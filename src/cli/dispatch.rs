use super::config::cmd_config;
use super::dashboard::cmd_dashboard;
use super::env::CliArgs;
use super::serve::cmd_serve;
use super::workflow::cmd_workflow;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx.config().clone()).await,
        Commands::Config(args) => cmd_config(args, ctx, &cli.output).await,
        Commands::Workflow(args) => cmd_workflow(args, ctx, &cli.output).await,
        Commands::Dashboard(args) => cmd_dashboard(args, ctx, &cli.output).await,
    }
}
