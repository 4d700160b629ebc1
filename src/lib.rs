//! # Pipeline Snapshot
//!
//! Turns a column-indexed opportunity report (a fact-map of cell arrays) into
//! typed records, aggregates them by stage, region, owner and fiscal period,
//! and exports the result as a deterministic family of CSV files.
//!
//! ## Stages
//!
//! - **Report Parser** (`ingestion`): fact-map payload -> labelled rows
//! - **Record Mapper** (`mapper`): labelled row -> [`Opportunity`]
//! - **Aggregator** (`aggregator`): records -> grouping tables
//! - **Snapshot Assembler** (`snapshot`): records + tables -> [`PipelineSnapshot`]
//! - **Exporter** (`export`): snapshot -> CSV files
//!
//! Every stage is a pure transformation; the first failing row aborts the
//! whole snapshot.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pipeline_snapshot::*;
//! use std::path::Path;
//!
//! let source = JsonDirReportSource::new("payloads");
//! let options = SnapshotOptions::default();
//!
//! let snapshot = process_report(&source, "00OIV000001TKQz2AO", ReportKind::Pipeline, &options)?;
//! let manifest = export_snapshot(&snapshot, Path::new("output"), ReportKind::Pipeline)?;
//! println!("wrote {}", manifest.opportunities.display());
//! ```

pub mod aggregator;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod mapper;
pub mod schema;
pub mod service;
pub mod snapshot;
pub mod source;
pub mod utils;

pub use aggregator::{
    aggregate, temporal_table, AggregateBucket, Aggregates, GroupTable, SummaryTable, TemporalBucket,
    TemporalKey, TemporalTable, UNKNOWN_KEY,
};
pub use error::{Result, SnapshotError};
pub use export::{export_snapshot, sort_for_export, ExportManifest};
pub use ingestion::{parse_payloads, parse_report, DescribeResponse, RawRow, ReportData, ReportPayload};
pub use mapper::{map_row, Opportunity, RecordMapper, CLOSED_WON_STAGE};
pub use schema::*;
pub use service::PipelineReportService;
pub use snapshot::PipelineSnapshot;
pub use source::{fetch_report, InMemoryReportSource, JsonDirReportSource, ReportSource};

use log::{debug, info, warn};
use std::path::Path;

pub struct SnapshotProcessor;

impl SnapshotProcessor {
    /// Map, aggregate and assemble an already-parsed report.
    pub fn build(report: &ReportData, kind: ReportKind, options: &SnapshotOptions) -> Result<PipelineSnapshot> {
        check_empty(report, options)?;

        debug!(
            "Mapping {} rows of report {} as {} records",
            report.total_records, report.report_id, kind
        );
        let opportunities = RecordMapper::new(kind, options.amount_policy).map_report(report)?;

        Ok(PipelineSnapshot::assemble(
            report,
            opportunities,
            kind,
            options.generated_by.clone(),
        ))
    }

    pub fn process<S: ReportSource + ?Sized>(
        source: &S,
        report_id: &str,
        kind: ReportKind,
        options: &SnapshotOptions,
    ) -> Result<PipelineSnapshot> {
        info!("Processing {} report {}", kind, report_id);

        let report = fetch_report(source, report_id)?;
        Self::build(&report, kind, options)
    }

    pub fn process_and_export<S: ReportSource + ?Sized>(
        source: &S,
        report_id: &str,
        kind: ReportKind,
        options: &SnapshotOptions,
        output_dir: &Path,
    ) -> Result<(PipelineSnapshot, ExportManifest)> {
        let snapshot = Self::process(source, report_id, kind, options)?;
        let manifest = export_snapshot(&snapshot, output_dir, kind)?;
        Ok((snapshot, manifest))
    }
}

pub fn build_snapshot(report: &ReportData, kind: ReportKind, options: &SnapshotOptions) -> Result<PipelineSnapshot> {
    SnapshotProcessor::build(report, kind, options)
}

pub fn process_report<S: ReportSource + ?Sized>(
    source: &S,
    report_id: &str,
    kind: ReportKind,
    options: &SnapshotOptions,
) -> Result<PipelineSnapshot> {
    SnapshotProcessor::process(source, report_id, kind, options)
}

fn check_empty(report: &ReportData, options: &SnapshotOptions) -> Result<()> {
    if !report.is_empty() {
        return Ok(());
    }
    match options.empty_report {
        EmptyReportPolicy::Warn => {
            warn!("Report {} returned no rows; snapshot will be empty", report.report_id);
            Ok(())
        }
        EmptyReportPolicy::Error => Err(SnapshotError::EmptyReport(report.report_id.clone())),
    }
}
