//! Widget datasets: the numbers and rows behind chart, metric, table and list
//! widgets, computed from a single table read.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::dashboard::{Aggregation, DataSource, Widget, WidgetKind};
use crate::servicenow::{Credential, DisplayValue, NowApi, NowError, Record, TableQuery};

pub const UNKNOWN_GROUP: &str = "Unknown";
pub const DEFAULT_TABLE_COLUMNS: [&str; 4] = ["number", "short_description", "state", "priority"];

#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("Unknown data source: {0}")]
    UnknownSource(String),
    #[error("Unknown widget type: {0}")]
    UnknownKind(String),
    #[error("Unknown aggregation: {0}")]
    UnknownAggregation(String),
    #[error("A numeric field is required for sum and avg metrics")]
    MissingField,
    #[error(transparent)]
    Upstream(#[from] NowError),
}

/// Query string of `GET /api/widgets/data`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDataParams {
    pub source: Option<String>,
    pub kind: Option<String>,
    pub group_by: Option<String>,
    /// Comma separated.
    pub columns: Option<String>,
    pub aggregation: Option<String>,
    pub field: Option<String>,
    pub filter: Option<String>,
    pub limit: Option<u32>,
}

/// Everything needed to compute one widget's dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WidgetSpec {
    pub source: DataSource,
    pub kind: WidgetKind,
    pub group_by: String,
    pub columns: Vec<String>,
    pub aggregation: Aggregation,
    pub field: Option<String>,
    pub filter: Option<String>,
    pub limit: u32,
}

impl WidgetSpec {
    pub fn from_params(params: WidgetDataParams) -> Result<Self, WidgetError> {
        let source = match params.source.as_deref().map(str::trim) {
            None | Some("") => DataSource::default(),
            Some(table) => DataSource::from_table(table)
                .ok_or_else(|| WidgetError::UnknownSource(table.to_string()))?,
        };
        let kind = parse_lowercase(params.kind.as_deref(), WidgetError::UnknownKind)?;
        let aggregation =
            parse_lowercase(params.aggregation.as_deref(), WidgetError::UnknownAggregation)?;
        let columns = params
            .columns
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|column| !column.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(Self::assemble(
            source,
            kind,
            params.group_by,
            columns,
            aggregation,
            params.field,
            params.filter,
            params.limit,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        source: DataSource,
        kind: WidgetKind,
        group_by: Option<String>,
        columns: Vec<String>,
        aggregation: Aggregation,
        field: Option<String>,
        filter: Option<String>,
        limit: Option<u32>,
    ) -> Self {
        let group_by = group_by
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "state".to_string());
        let columns = if columns.is_empty() {
            DEFAULT_TABLE_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            columns
        };
        Self {
            source,
            kind,
            group_by,
            columns,
            aggregation,
            field: field.filter(|value| !value.trim().is_empty()),
            filter: filter.filter(|value| !value.trim().is_empty()),
            limit: limit.filter(|n| *n > 0).unwrap_or(default_limit(kind)),
        }
    }

    fn table_query(&self) -> TableQuery {
        let query = TableQuery::new()
            .limit(self.limit)
            .display_value(DisplayValue::All);
        match &self.filter {
            Some(filter) => query.query(filter.clone()),
            None => query,
        }
    }
}

impl From<&Widget> for WidgetSpec {
    fn from(widget: &Widget) -> Self {
        WidgetSpec::assemble(
            widget.data_source,
            widget.kind,
            widget.group_by.clone(),
            widget.columns.clone().unwrap_or_default(),
            widget.aggregation.unwrap_or_default(),
            widget.field.clone(),
            widget.filter.clone(),
            widget.limit,
        )
    }
}

fn parse_lowercase<T: Default + for<'de> Deserialize<'de>>(
    raw: Option<&str>,
    err: fn(String) -> WidgetError,
) -> Result<T, WidgetError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(text) => serde_json::from_value(Value::String(text.to_ascii_lowercase()))
            .map_err(|_| err(text.to_string())),
    }
}

/// Rows fetched when the widget does not set a limit.
pub fn default_limit(kind: WidgetKind) -> u32 {
    match kind {
        WidgetKind::Chart => 100,
        WidgetKind::Metric => 1000,
        WidgetKind::Table | WidgetKind::List => 10,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartGroup {
    pub name: String,
    pub value: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableColumn {
    pub key: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub sys_id: String,
    pub title: String,
    pub subtitle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WidgetData {
    Chart {
        #[serde(rename = "groupBy")]
        group_by: String,
        groups: Vec<ChartGroup>,
    },
    Metric {
        value: f64,
        aggregation: Aggregation,
        label: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    Table {
        columns: Vec<TableColumn>,
        rows: Vec<Map<String, Value>>,
    },
    List {
        items: Vec<ListItem>,
    },
}

/// Groups by the display text of `field`, largest group first.
pub fn chart_groups(records: &[Record], field: &str) -> Vec<ChartGroup> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for record in records {
        let key = record.display(field);
        let key = if key.trim().is_empty() {
            UNKNOWN_GROUP.to_string()
        } else {
            key
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    let mut groups: Vec<ChartGroup> = counts
        .into_iter()
        .map(|(name, value)| ChartGroup { name, value })
        .collect();
    groups.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.name.cmp(&b.name)));
    groups
}

/// Count uses `total` when the instance reported one. Sum and avg skip
/// records whose field is not numeric.
pub fn metric_value(
    records: &[Record],
    total: Option<u64>,
    aggregation: Aggregation,
    field: Option<&str>,
) -> Result<f64, WidgetError> {
    if aggregation == Aggregation::Count {
        return Ok(total.unwrap_or(records.len() as u64) as f64);
    }
    let field = field.ok_or(WidgetError::MissingField)?;
    let numbers: Vec<f64> = records
        .iter()
        .filter_map(|record| record.raw(field).trim().parse::<f64>().ok())
        .collect();
    let sum: f64 = numbers.iter().sum();
    Ok(match aggregation {
        Aggregation::Avg if numbers.is_empty() => 0.0,
        Aggregation::Avg => sum / numbers.len() as f64,
        _ => sum,
    })
}

/// `short_description` -> `Short Description`.
pub fn column_label(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn table_rows(records: &[Record], columns: &[String]) -> Vec<Map<String, Value>> {
    records
        .iter()
        .map(|record| {
            let mut row = Map::new();
            row.insert("sys_id".into(), Value::String(record.sys_id()));
            for column in columns {
                let text = record.display(column);
                let text = if text.is_empty() { "-".to_string() } else { text };
                row.insert(column.clone(), Value::String(text));
            }
            row
        })
        .collect()
}

pub fn list_items(records: &[Record]) -> Vec<ListItem> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let title = first_display(record, &["number", "user_name"])
                .unwrap_or_else(|| format!("Item {}", index + 1));
            let subtitle = first_display(record, &["short_description", "email", "state"])
                .unwrap_or_else(|| "-".to_string());
            ListItem {
                sys_id: record.sys_id(),
                title,
                subtitle,
                state: first_display(record, &["state"]),
                priority: first_display(record, &["priority"]),
            }
        })
        .collect()
}

fn first_display(record: &Record, keys: &[&str]) -> Option<String> {
    keys.iter()
        .map(|key| record.display(key))
        .find(|text| !text.trim().is_empty())
}

pub fn shape(
    spec: &WidgetSpec,
    records: &[Record],
    total: Option<u64>,
) -> Result<WidgetData, WidgetError> {
    Ok(match spec.kind {
        WidgetKind::Chart => WidgetData::Chart {
            group_by: spec.group_by.clone(),
            groups: chart_groups(records, &spec.group_by),
        },
        WidgetKind::Metric => WidgetData::Metric {
            value: metric_value(records, total, spec.aggregation, spec.field.as_deref())?,
            aggregation: spec.aggregation,
            label: spec.source.label(),
            filter: spec.filter.clone(),
        },
        WidgetKind::Table => WidgetData::Table {
            columns: spec
                .columns
                .iter()
                .map(|key| TableColumn {
                    key: key.clone(),
                    label: column_label(key),
                })
                .collect(),
            rows: table_rows(records, &spec.columns),
        },
        WidgetKind::List => WidgetData::List {
            items: list_items(records),
        },
    })
}

#[instrument(
    name = "snowdash.widgets.load",
    skip(api, cred, spec),
    fields(table = spec.source.table(), kind = ?spec.kind)
)]
pub async fn load_widget_data(
    api: &dyn NowApi,
    cred: &Credential,
    spec: &WidgetSpec,
) -> Result<WidgetData, WidgetError> {
    if matches!(spec.aggregation, Aggregation::Sum | Aggregation::Avg)
        && spec.kind == WidgetKind::Metric
        && spec.field.is_none()
    {
        return Err(WidgetError::MissingField);
    }
    let page = api
        .list_with_count(cred, spec.source.table(), &spec.table_query())
        .await?;
    debug!(records = page.records.len(), "widget rows fetched");
    shape(spec, &page.records, page.total_count)
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub table: &'static str,
    pub label: &'static str,
    pub group_fields: &'static [&'static str],
}

pub fn sources() -> Vec<SourceInfo> {
    DataSource::ALL
        .into_iter()
        .map(|source| SourceInfo {
            table: source.table(),
            label: source.label(),
            group_fields: source.group_fields(),
        })
        .collect()
}
