use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::dashboard::{NewDashboard, WidgetDraft};

#[derive(Args, Clone, Debug)]
pub struct DashboardArgs {
    #[command(subcommand)]
    pub action: DashboardAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum DashboardAction {
    /// List dashboards in the local document
    List,

    /// Create a dashboard
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a dashboard (the default one is kept)
    Delete { id: String },

    /// Make a dashboard the active one
    Activate { id: String },

    /// Add a widget to a dashboard
    AddWidget {
        dashboard: String,
        /// chart, metric, table or list
        #[arg(long, default_value = "chart")]
        kind: String,
        /// Table the widget reads from
        #[arg(long, default_value = "sc_req_item")]
        source: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        group_by: Option<String>,
        /// Encoded ServiceNow query
        #[arg(long)]
        filter: Option<String>,
    },

    /// Remove a widget from a dashboard
    RemoveWidget { dashboard: String, widget: String },

    /// Print the raw document
    Export,
}

pub async fn cmd_dashboard(
    args: DashboardArgs,
    ctx: &CliContext,
    output: &OutputFormat,
) -> Result<()> {
    let store = ctx.dashboard_store();
    let mut document = store.load().await?;
    let now = Utc::now();

    match args.action {
        DashboardAction::List => {
            return emit(output, &document.dashboards, |dashboards| {
                for dashboard in dashboards {
                    let marker = if dashboard.id == document.active_dashboard_id {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{marker} {:<28} {:<24} {} widget(s)",
                        dashboard.id,
                        dashboard.name,
                        dashboard.widgets.len()
                    );
                }
            });
        }
        DashboardAction::Export => {
            return emit(output, &document, |document| {
                match serde_json::to_string_pretty(document) {
                    Ok(text) => println!("{text}"),
                    Err(err) => eprintln!("failed to render document: {err}"),
                }
            });
        }
        DashboardAction::Create { name, description } => {
            let created = document.create_dashboard(
                NewDashboard {
                    name,
                    description,
                    ..NewDashboard::default()
                },
                now,
            )?;
            println!("Created dashboard {} ({})", created.name, created.id);
        }
        DashboardAction::Delete { id } => {
            document.delete_dashboard(&id, now)?;
            println!("Deleted dashboard {id}");
        }
        DashboardAction::Activate { id } => {
            document.set_active(&id, now)?;
            println!("Active dashboard is now {id}");
        }
        DashboardAction::AddWidget {
            dashboard,
            kind,
            source,
            title,
            group_by,
            filter,
        } => {
            let draft = widget_draft(&kind, &source, title, group_by, filter)?;
            let widget = document.add_widget(&dashboard, draft, now)?;
            println!("Added widget {} ({})", widget.title, widget.id);
        }
        DashboardAction::RemoveWidget { dashboard, widget } => {
            document.remove_widget(&dashboard, &widget, now)?;
            println!("Removed widget {widget}");
        }
    }

    store.save(&document).await?;
    info!(
        path = %store.path().display(),
        revision = document.revision,
        "dashboard document saved"
    );
    Ok(())
}

fn widget_draft(
    kind: &str,
    source: &str,
    title: Option<String>,
    group_by: Option<String>,
    filter: Option<String>,
) -> Result<WidgetDraft> {
    let mut fields = Map::new();
    fields.insert("type".into(), json!(kind));
    fields.insert("dataSource".into(), json!(source));
    for (key, value) in [("title", title), ("groupBy", group_by), ("filter", filter)] {
        if let Some(value) = value {
            fields.insert(key.into(), Value::String(value));
        }
    }
    serde_json::from_value(Value::Object(fields))
        .with_context(|| format!("unsupported widget kind `{kind}` or source `{source}`"))
}
