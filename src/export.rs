//! Exporter: writes a snapshot as a fixed family of timestamped CSV files.
//!
//! Files are named `{prefix}_{table}_{timestamp}.csv` where the prefix is the
//! report kind and the timestamp is the snapshot's capture time. The output
//! directory must already exist.

use crate::aggregator::{temporal_table, SummaryTable, TemporalBucket, TemporalKey};
use crate::error::Result;
use crate::mapper::Opportunity;
use crate::schema::ReportKind;
use crate::snapshot::PipelineSnapshot;
use crate::utils::format_timestamp;
use csv::Writer;
use log::info;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportManifest {
    pub timestamp: String,
    pub summary: PathBuf,
    pub opportunities: PathBuf,
    pub stages: PathBuf,
    pub regions: PathBuf,
    /// Closed-won exports only.
    pub temporal: Option<PathBuf>,
}

impl ExportManifest {
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths = vec![
            self.summary.as_path(),
            self.opportunities.as_path(),
            self.stages.as_path(),
            self.regions.as_path(),
        ];
        if let Some(temporal) = &self.temporal {
            paths.push(temporal.as_path());
        }
        paths
    }
}

/// Flat CSV view of one opportunity.
#[derive(Debug, Serialize)]
struct OpportunityRow<'a> {
    id: Option<&'a str>,
    name: Option<&'a str>,
    stage_name: Option<&'a str>,
    amount: f64,
    expected_value: Option<f64>,
    expected_income: Option<f64>,
    expected_value_gap: Option<f64>,
    close_date: Option<String>,
    fiscal_quarter: Option<&'a str>,
    fiscal_year: Option<&'a str>,
    account_id: Option<&'a str>,
    owner_id: Option<&'a str>,
    owner_name: Option<&'a str>,
    #[serde(rename = "type")]
    opportunity_type: Option<&'a str>,
    product_line: Option<&'a str>,
    region: Option<&'a str>,
    probability: Option<u32>,
    forecast_category: Option<&'a str>,
    is_closed: bool,
    is_won: bool,
}

impl<'a> From<&'a Opportunity> for OpportunityRow<'a> {
    fn from(o: &'a Opportunity) -> Self {
        Self {
            id: o.id.as_deref(),
            name: o.name.as_deref(),
            stage_name: o.stage_name.as_deref(),
            amount: o.amount,
            expected_value: o.expected_value,
            expected_income: o.expected_income,
            expected_value_gap: o.expected_value_gap,
            close_date: o.close_date.map(|d| d.format("%Y-%m-%d").to_string()),
            fiscal_quarter: o.fiscal_quarter.as_deref(),
            fiscal_year: o.fiscal_year.as_deref(),
            account_id: o.account_id.as_deref(),
            owner_id: o.owner_id.as_deref(),
            owner_name: o.owner_name.as_deref(),
            opportunity_type: o.opportunity_type.as_deref(),
            product_line: o.product_line.as_deref(),
            region: o.region.as_deref(),
            probability: o.probability,
            forecast_category: o.forecast_category.as_deref(),
            is_closed: o.is_closed,
            is_won: o.is_won,
        }
    }
}

#[derive(Debug, Serialize)]
struct TemporalRow<'a> {
    fiscal_year: &'a str,
    fiscal_quarter: &'a str,
    total_amount: f64,
    deal_count: usize,
    opportunity_count: usize,
}

/// Write the CSV family for `snapshot` into `output_dir`.
pub fn export_snapshot(snapshot: &PipelineSnapshot, output_dir: &Path, kind: ReportKind) -> Result<ExportManifest> {
    let timestamp = format_timestamp(snapshot.snapshot_date);
    let path_for = |table: &str| output_dir.join(format!("{}_{}_{}.csv", kind.prefix(), table, timestamp));

    let manifest = ExportManifest {
        summary: path_for("summary"),
        opportunities: path_for("opportunities"),
        stages: path_for("stages"),
        regions: path_for("regions"),
        temporal: match kind {
            ReportKind::ClosedWon => Some(path_for("temporal")),
            ReportKind::Pipeline => None,
        },
        timestamp,
    };

    write_summary(&manifest.summary, snapshot)?;
    write_opportunities(&manifest.opportunities, &snapshot.opportunities, kind)?;
    write_group_table(&manifest.stages, "stage", &snapshot.stage_summary, kind)?;
    write_group_table(&manifest.regions, "region", &snapshot.region_summary, kind)?;

    if let Some(path) = &manifest.temporal {
        let owned;
        let table = match &snapshot.temporal_summary {
            Some(table) => table,
            None => {
                owned = temporal_table(&snapshot.opportunities);
                &owned
            }
        };
        let mut rows: Vec<(&TemporalKey, &TemporalBucket)> = table.iter().collect();
        rows.sort_by(|(a, _), (b, _)| (a.is_unknown(), *a).cmp(&(b.is_unknown(), *b)));
        write_temporal(path, &rows)?;
    }

    for path in manifest.paths() {
        info!("Exported {}", path.display());
    }

    Ok(manifest)
}

fn write_summary(path: &Path, snapshot: &PipelineSnapshot) -> Result<()> {
    let mut header: Vec<String> = [
        "snapshot_date",
        "total_amount",
        "total_count",
        "report_id",
        "report_name",
        "generated_by",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let mut record = vec![
        snapshot.snapshot_date.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        snapshot.total_amount.to_string(),
        snapshot.total_count.to_string(),
        snapshot.report_id.clone().unwrap_or_default(),
        snapshot.report_name.clone().unwrap_or_default(),
        snapshot.generated_by.clone().unwrap_or_default(),
    ];

    for (prefix, table) in [("stage", &snapshot.stage_summary), ("region", &snapshot.region_summary)] {
        for (key, bucket) in table.iter() {
            header.push(format!("{}_{}_amount", prefix, key));
            record.push(bucket.amount.to_string());
        }
        for (key, bucket) in table.iter() {
            header.push(format!("{}_{}_count", prefix, key));
            record.push(bucket.count.to_string());
        }
    }

    let mut writer = Writer::from_path(path)?;
    writer.write_record(&header)?;
    writer.write_record(&record)?;
    writer.flush()?;
    Ok(())
}

fn write_opportunities(path: &Path, opportunities: &[Opportunity], kind: ReportKind) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    let sorted = sort_for_export(opportunities, kind);
    if sorted.is_empty() {
        writer.write_record(OPPORTUNITY_COLUMNS)?;
    }
    for opportunity in sorted {
        writer.serialize(OpportunityRow::from(opportunity))?;
    }
    writer.flush()?;
    Ok(())
}

/// Header of the opportunities file; kept in step with `OpportunityRow`.
const OPPORTUNITY_COLUMNS: [&str; 20] = [
    "id",
    "name",
    "stage_name",
    "amount",
    "expected_value",
    "expected_income",
    "expected_value_gap",
    "close_date",
    "fiscal_quarter",
    "fiscal_year",
    "account_id",
    "owner_id",
    "owner_name",
    "type",
    "product_line",
    "region",
    "probability",
    "forecast_category",
    "is_closed",
    "is_won",
];

fn write_group_table(path: &Path, key_column: &str, table: &SummaryTable, kind: ReportKind) -> Result<()> {
    let mut writer = Writer::from_path(path)?;

    let mut header = vec![key_column, "count", "amount"];
    if kind.is_pipeline() {
        header.extend(["expected_value", "expected_income", "expected_value_gap"]);
    }
    writer.write_record(&header)?;

    for (key, bucket) in table.iter() {
        let mut record = vec![key.clone(), bucket.count.to_string(), bucket.amount.to_string()];
        if kind.is_pipeline() {
            for metric in [bucket.expected_value, bucket.expected_income, bucket.expected_value_gap] {
                record.push(metric.map(|v| v.to_string()).unwrap_or_default());
            }
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_temporal(path: &Path, rows: &[(&TemporalKey, &TemporalBucket)]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(["fiscal_year", "fiscal_quarter", "total_amount", "deal_count", "opportunity_count"])?;
    }
    for (key, bucket) in rows {
        writer.serialize(TemporalRow {
            fiscal_year: &key.fiscal_year,
            fiscal_quarter: &key.fiscal_quarter,
            total_amount: bucket.total_amount,
            deal_count: bucket.deal_count,
            opportunity_count: bucket.opportunity_count,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Export order for the opportunities file.
///
/// Pipeline: fiscal year, fiscal quarter ascending, then expected value gap
/// descending. Closed-won: close date ascending, then amount descending.
/// Missing sort keys go last within their tie group. The sort is stable.
pub fn sort_for_export(opportunities: &[Opportunity], kind: ReportKind) -> Vec<&Opportunity> {
    let mut sorted: Vec<&Opportunity> = opportunities.iter().collect();
    match kind {
        ReportKind::Pipeline => sorted.sort_by(|a, b| {
            nulls_last(a.fiscal_year.as_ref(), b.fiscal_year.as_ref(), |x, y| x.cmp(y))
                .then_with(|| nulls_last(a.fiscal_quarter.as_ref(), b.fiscal_quarter.as_ref(), |x, y| x.cmp(y)))
                .then_with(|| nulls_last(a.expected_value_gap, b.expected_value_gap, |x, y| y.total_cmp(&x)))
        }),
        ReportKind::ClosedWon => sorted.sort_by(|a, b| {
            nulls_last(a.close_date, b.close_date, |x, y| x.cmp(&y)).then_with(|| b.amount.total_cmp(&a.amount))
        }),
    }
    sorted
}

fn nulls_last<T>(a: Option<T>, b: Option<T>, cmp: impl FnOnce(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
