use clap::Subcommand;

use super::config::ConfigArgs;
use super::dashboard::DashboardArgs;
use super::serve::ServeArgs;
use super::workflow::WorkflowArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the dashboard HTTP backend
    Serve(ServeArgs),

    /// Inspect snowdash configuration
    Config(ConfigArgs),

    /// Compute the Discovery Onboarding board from exported RITMs
    Workflow(WorkflowArgs),

    /// Edit the local dashboard document
    Dashboard(DashboardArgs),
}
