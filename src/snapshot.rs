//! Snapshot Assembler.

use crate::aggregator::{aggregate, SummaryTable, TemporalTable};
use crate::ingestion::ReportData;
use crate::mapper::Opportunity;
use crate::schema::ReportKind;
use chrono::{Local, NaiveDateTime};
use log::info;

/// Point-in-time aggregation of one report, ready for export.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub kind: ReportKind,
    pub snapshot_date: NaiveDateTime,
    pub opportunities: Vec<Opportunity>,
    pub total_amount: f64,
    pub total_count: usize,
    pub stage_summary: SummaryTable,
    pub region_summary: SummaryTable,
    pub owner_summary: SummaryTable,
    /// Closed-won snapshots only, keyed by (fiscal year, fiscal quarter).
    pub temporal_summary: Option<TemporalTable>,

    pub report_id: Option<String>,
    pub report_name: Option<String>,
    pub generated_by: Option<String>,
}

impl PipelineSnapshot {
    /// Assemble a snapshot stamped with the current local time.
    pub fn assemble(
        report: &ReportData,
        opportunities: Vec<Opportunity>,
        kind: ReportKind,
        generated_by: Option<String>,
    ) -> Self {
        Self::assemble_at(report, opportunities, kind, generated_by, Local::now().naive_local())
    }

    /// Totals are always recomputed from `opportunities`, never taken from the
    /// report's own summary.
    pub fn assemble_at(
        report: &ReportData,
        opportunities: Vec<Opportunity>,
        kind: ReportKind,
        generated_by: Option<String>,
        snapshot_date: NaiveDateTime,
    ) -> Self {
        let aggregates = aggregate(&opportunities, kind);
        let total_amount = opportunities.iter().map(|o| o.amount).sum();
        let total_count = opportunities.len();

        info!(
            "Assembled {} snapshot for report {}: {} opportunities, total amount {:.2}",
            kind, report.report_id, total_count, total_amount
        );

        Self {
            kind,
            snapshot_date,
            opportunities,
            total_amount,
            total_count,
            stage_summary: aggregates.stage,
            region_summary: aggregates.region,
            owner_summary: aggregates.owner,
            temporal_summary: aggregates.temporal,
            report_id: Some(report.report_id.clone()),
            report_name: Some(report.report_name.clone()),
            generated_by,
        }
    }
}
