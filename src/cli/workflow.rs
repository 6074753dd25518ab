use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::Args;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::servicenow::Record;
use crate::workflow::{Board, BoardFilter, StatusFilter};

#[derive(Args, Clone, Debug)]
pub struct WorkflowArgs {
    /// RITM export: a JSON array or a Table API body with `result`. `-` reads stdin.
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Match number, catalog item or requester
    #[arg(long, default_value = "")]
    pub search: String,

    /// all, discovery, escalation, or a phase: new, email_1, email_2, email_3,
    /// response_received, completed
    #[arg(long, default_value = "all")]
    pub status: String,

    /// Spread discovery items across phases for a walkthrough
    #[arg(long)]
    pub demo: bool,
}

pub async fn cmd_workflow(
    args: WorkflowArgs,
    ctx: &CliContext,
    output: &OutputFormat,
) -> Result<()> {
    let status: StatusFilter = args
        .status
        .parse()
        .map_err(|err: String| anyhow!("invalid --status: {err}"))?;
    let raw = read_input(&args.input).await?;
    let records = parse_records(&raw)?;
    let filter = BoardFilter {
        search: args.search,
        status,
    };
    let instance_url = ctx.config().instance_url().ok();
    let board = Board::build(
        &records,
        &filter,
        Utc::now(),
        args.demo,
        instance_url.as_deref(),
    );

    emit(output, &board, |board| {
        println!(
            "{:<12} {:<20} {:<22} {:<16} {:>7}  NEXT",
            "NUMBER", "PHASE", "REQUESTER", "DUE", "OVERDUE"
        );
        for row in &board.rows {
            let due = row
                .due
                .due_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<12} {:<20} {:<22} {:<16} {:>7}  {}",
                row.number,
                row.phase_label,
                row.requester,
                due,
                row.due.days_overdue,
                row.due.next_action
            );
        }
        let stats = &board.stats;
        println!();
        println!(
            "discovery={} open={} pending={} in_progress={} escalated={} completed={} overdue={} mismatches={}",
            stats.total,
            stats.open,
            stats.pending,
            stats.in_progress,
            stats.escalated,
            stats.completed,
            stats.schedule_overdue,
            stats.escalation_mismatches
        );
    })
}

async fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("reading stdin")?;
        return Ok(raw);
    }
    fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

fn parse_records(raw: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(raw).context("RITM export is not valid JSON")?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut body) => match body.remove("result") {
            Some(Value::Array(items)) => items,
            _ => bail!("expected a `result` array in the RITM export"),
        },
        _ => bail!("expected a JSON array of RITMs"),
    };
    Ok(items.into_iter().filter_map(Record::from_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_arrays_and_table_bodies() {
        let plain = parse_records(r#"[{"sys_id":"a"},{"sys_id":"b"}]"#).unwrap();
        assert_eq!(plain.len(), 2);

        let wrapped = parse_records(r#"{"result":[{"sys_id":"a"}, 7]}"#).unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].display("sys_id"), "a");

        assert!(parse_records(r#"{"records":[]}"#).is_err());
    }

    #[test]
    fn every_status_named_in_help_parses() {
        let command = WorkflowArgs::augment_args(clap::Command::new("workflow"));
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "status")
            .and_then(|arg| arg.get_help())
            .map(ToString::to_string)
            .unwrap();
        let names: Vec<&str> = help
            .split(|ch: char| ch == ',' || ch == ':' || ch.is_whitespace())
            .filter(|word| !word.is_empty() && !matches!(*word, "or" | "a" | "phase"))
            .collect();
        assert!(names.contains(&"email_1"), "{help}");
        for name in names {
            assert!(name.parse::<StatusFilter>().is_ok(), "`{name}` from: {help}");
        }
        assert!("email1".parse::<StatusFilter>().is_err());
    }
}
