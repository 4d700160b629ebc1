use crate::error::Result;
use crate::export::ExportManifest;
use crate::schema::{ReportConfig, ReportKind};
use crate::snapshot::PipelineSnapshot;
use crate::source::ReportSource;
use crate::SnapshotProcessor;

/// Runs the configured pipeline and closed-won reports against one source.
pub struct PipelineReportService<S> {
    source: S,
    config: ReportConfig,
}

impl<S: ReportSource> PipelineReportService<S> {
    pub fn new(source: S, config: ReportConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn snapshot(&self, kind: ReportKind) -> Result<PipelineSnapshot> {
        SnapshotProcessor::process(&self.source, self.config.report_id(kind), kind, &self.config.options)
    }

    pub fn pipeline_snapshot(&self) -> Result<PipelineSnapshot> {
        self.snapshot(ReportKind::Pipeline)
    }

    pub fn closed_won_snapshot(&self) -> Result<PipelineSnapshot> {
        self.snapshot(ReportKind::ClosedWon)
    }

    pub fn export(&self, kind: ReportKind) -> Result<ExportManifest> {
        let (_, manifest) = SnapshotProcessor::process_and_export(
            &self.source,
            self.config.report_id(kind),
            kind,
            &self.config.options,
            &self.config.output_dir,
        )?;
        Ok(manifest)
    }

    /// Export the pipeline report, then the closed-won report. The first
    /// failure aborts; files already written for the earlier kind stay.
    pub fn export_all(&self) -> Result<Vec<ExportManifest>> {
        [ReportKind::Pipeline, ReportKind::ClosedWon]
            .into_iter()
            .map(|kind| self.export(kind))
            .collect()
    }
}
