//! Report Parser: flattens a fact-map report payload into labelled rows.

use crate::error::{Result, SnapshotError};
use crate::utils::amount_or_zero;
use chrono::{Local, NaiveDateTime};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One report row keyed by column label. Cell values are kept as reported.
pub type RawRow = BTreeMap<String, Value>;

pub const AMOUNT_COLUMN: &str = "Amount";

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub report_id: String,
    pub report_name: String,
    pub report_type: String,
    pub run_date: NaiveDateTime,
    pub filters: BTreeMap<String, Value>,
    /// Declared column labels; position `i` labels the `i`-th cell of every row.
    pub columns: Vec<String>,
    pub raw_rows: Vec<RawRow>,
    pub total_records: usize,
    pub total_amount: f64,
    pub grouping_fields: Vec<String>,
    pub summary_fields: Vec<String>,
}

impl ReportData {
    /// Build a report from already-flattened rows, deriving the totals.
    pub fn new(
        report_id: impl Into<String>,
        report_name: impl Into<String>,
        report_type: impl Into<String>,
        columns: Vec<String>,
        raw_rows: Vec<RawRow>,
    ) -> Self {
        let total_amount = raw_rows
            .iter()
            .map(|row| amount_or_zero(row.get(AMOUNT_COLUMN)))
            .sum();

        Self {
            report_id: report_id.into(),
            report_name: report_name.into(),
            report_type: report_type.into(),
            run_date: Local::now().naive_local(),
            filters: BTreeMap::new(),
            columns,
            total_records: raw_rows.len(),
            raw_rows,
            total_amount,
            grouping_fields: Vec::new(),
            summary_fields: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_rows.is_empty()
    }
}

/// Response of the report "describe" call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeResponse {
    #[serde(default)]
    pub report_metadata: Option<ReportMetadata>,
    #[serde(default)]
    pub report_extended_metadata: Option<ExtendedMetadata>,
    /// Some report services place the detail columns at the top level.
    #[serde(default)]
    pub detail_columns: Option<Vec<DetailColumn>>,
}

/// Response of the report "run" call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    #[serde(default)]
    pub report_metadata: Option<ReportMetadata>,
    #[serde(default)]
    pub report_extended_metadata: Option<ExtendedMetadata>,
    #[serde(default)]
    pub fact_map: Option<BTreeMap<String, FactMapEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub report_type: Option<ReportTypeRef>,
    #[serde(default)]
    pub detail_columns: Option<Vec<DetailColumn>>,
    #[serde(default)]
    pub report_filters: Vec<ReportFilter>,
    #[serde(default)]
    pub groupings_down: Vec<Grouping>,
    #[serde(default)]
    pub aggregates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportTypeRef {
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
}

/// A declared column: either a bare name or an object carrying a label.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DetailColumn {
    Name(String),
    Described {
        label: String,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportFilter {
    pub column: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Grouping {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedMetadata {
    #[serde(default)]
    pub detail_column_info: BTreeMap<String, DetailColumnInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailColumnInfo {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactMapEntry {
    #[serde(default)]
    pub rows: Option<Vec<FactRow>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactRow {
    #[serde(default)]
    pub data_cells: Vec<DataCell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataCell {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub label: Option<String>,
}

/// Parse raw describe/run responses into a [`ReportData`].
///
/// Fails with `ReportNotFound` when neither response carries report metadata.
/// Missing columns are not an error; rows simply lack those keys.
pub fn parse_report(report_id: &str, describe: Option<&Value>, results: &Value) -> Result<ReportData> {
    let describe: Option<DescribeResponse> = describe
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()
        .map_err(|e| SnapshotError::InvalidPayload(format!("describe response for {}: {}", report_id, e)))?;
    let results: ReportPayload = serde_json::from_value(results.clone())
        .map_err(|e| SnapshotError::InvalidPayload(format!("report results for {}: {}", report_id, e)))?;

    parse_payloads(report_id, describe.as_ref(), &results)
}

pub fn parse_payloads(
    report_id: &str,
    describe: Option<&DescribeResponse>,
    results: &ReportPayload,
) -> Result<ReportData> {
    let metadata = describe
        .and_then(|d| d.report_metadata.as_ref())
        .or(results.report_metadata.as_ref());

    let has_top_level_columns = describe.is_some_and(|d| d.detail_columns.is_some());
    if metadata.is_none() && !has_top_level_columns {
        return Err(SnapshotError::ReportNotFound(report_id.to_string()));
    }

    let columns = resolve_columns(describe, results);
    let raw_rows = flatten_fact_map(results, &columns);

    let mut report = ReportData::new(
        report_id,
        metadata
            .and_then(|m| m.name.clone())
            .unwrap_or_else(|| report_id.to_string()),
        metadata
            .and_then(|m| m.report_type.as_ref())
            .and_then(|t| t.type_name.clone())
            .unwrap_or_default(),
        columns,
        raw_rows,
    );

    if let Some(metadata) = metadata {
        report.filters = metadata
            .report_filters
            .iter()
            .map(|f| (f.column.clone(), f.value.clone()))
            .collect();
        report.grouping_fields = metadata.groupings_down.iter().map(|g| g.name.clone()).collect();
        report.summary_fields = metadata.aggregates.clone();
    }

    info!(
        "Parsed report {} ('{}'): {} rows across {} columns",
        report.report_id,
        report.report_name,
        report.total_records,
        report.columns.len()
    );

    Ok(report)
}

/// Column labels in declared order.
///
/// Preference: describe `reportMetadata.detailColumns`, then a top-level
/// describe `detailColumns`, then the run response's `reportMetadata`.
fn resolve_columns(describe: Option<&DescribeResponse>, results: &ReportPayload) -> Vec<String> {
    let candidates = [
        describe
            .and_then(|d| d.report_metadata.as_ref())
            .and_then(|m| m.detail_columns.as_ref()),
        describe.and_then(|d| d.detail_columns.as_ref()),
        results
            .report_metadata
            .as_ref()
            .and_then(|m| m.detail_columns.as_ref()),
    ];

    let Some(declared) = candidates.into_iter().flatten().find(|cols| !cols.is_empty()) else {
        return Vec::new();
    };

    let column_info = describe
        .and_then(|d| d.report_extended_metadata.as_ref())
        .or(results.report_extended_metadata.as_ref())
        .map(|ext| &ext.detail_column_info);

    declared
        .iter()
        .map(|column| match column {
            DetailColumn::Described { label, .. } => label.clone(),
            DetailColumn::Name(name) => column_info
                .and_then(|info| info.get(name))
                .and_then(|info| info.label.clone())
                .unwrap_or_else(|| name.clone()),
        })
        .collect()
}

fn flatten_fact_map(results: &ReportPayload, columns: &[String]) -> Vec<RawRow> {
    let Some(fact_map) = results.fact_map.as_ref() else {
        debug!("Report results carry no factMap; producing zero rows");
        return Vec::new();
    };

    let mut rows = Vec::new();
    let mut synthesized = 0usize;

    for (group_key, entry) in fact_map {
        let Some(group_rows) = entry.rows.as_ref() else {
            continue;
        };
        debug!("Fact-map group {} holds {} rows", group_key, group_rows.len());

        for row in group_rows {
            let mut raw = RawRow::new();
            for (i, cell) in row.data_cells.iter().enumerate() {
                let label = match columns.get(i) {
                    Some(label) => label.clone(),
                    None => {
                        synthesized += 1;
                        format!("Column_{}", i)
                    }
                };
                raw.insert(label, cell.value.clone());
            }
            rows.push(raw);
        }
    }

    if synthesized > 0 {
        debug!(
            "Synthesized {} positional labels for cells beyond the {} declared columns",
            synthesized,
            columns.len()
        );
    }

    rows
}
