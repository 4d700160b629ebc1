use crate::error::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    #[schemars(
        description = "Open pipeline report. Records carry expected value, expected income and the recomputed expected value gap; they are never closed or won."
    )]
    Pipeline,

    #[schemars(
        description = "Closed-won report. Every record is forced to stage 'Closed Won', flagged closed and won, and carries no expected-value fields."
    )]
    ClosedWon,
}

impl ReportKind {
    /// File-name prefix used by the exporter.
    pub fn prefix(self) -> &'static str {
        match self {
            ReportKind::Pipeline => "pipeline",
            ReportKind::ClosedWon => "closed_won",
        }
    }

    pub fn is_pipeline(self) -> bool {
        matches!(self, ReportKind::Pipeline)
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AmountPolicy {
    #[default]
    #[schemars(
        description = "Non-empty amount cells that cannot be parsed become 0 (or null for optional expected-value fields)."
    )]
    Coerce,

    #[schemars(
        description = "Non-empty amount cells that cannot be parsed abort the snapshot with a numeric coercion error."
    )]
    Strict,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReportPolicy {
    #[default]
    #[schemars(description = "A report with zero rows is logged as a warning and produces an empty snapshot.")]
    Warn,

    #[schemars(description = "A report with zero rows aborts the snapshot with an empty report error.")]
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SnapshotOptions {
    #[serde(default)]
    #[schemars(description = "How unparseable, non-empty amount cells are handled.")]
    pub amount_policy: AmountPolicy,

    #[serde(default)]
    #[schemars(description = "How a report with zero rows is handled.")]
    pub empty_report: EmptyReportPolicy,

    #[serde(default)]
    #[schemars(description = "Free-form author tag stamped on every snapshot (e.g. a user or job name).")]
    pub generated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReportConfig {
    #[schemars(description = "Identifier of the open pipeline report in the remote report service.")]
    pub pipeline_report_id: String,

    #[schemars(description = "Identifier of the closed-won report in the remote report service.")]
    pub closed_won_report_id: String,

    #[schemars(
        description = "Existing directory that receives the exported CSV files. It is never created by the exporter."
    )]
    pub output_dir: PathBuf,

    #[serde(default)]
    #[schemars(description = "Mapping and ingestion options applied to both reports.")]
    pub options: SnapshotOptions,
}

impl ReportConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(file)?;
        Ok(config)
    }

    pub fn report_id(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Pipeline => &self.pipeline_report_id,
            ReportKind::ClosedWon => &self.closed_won_report_id,
        }
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
