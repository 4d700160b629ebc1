//! Where report payloads come from.
//!
//! The remote report service, its sessions and its transport live outside this
//! crate. Anything that can hand back the two raw responses for a report id
//! implements [`ReportSource`].

use crate::error::{Result, SnapshotError};
use crate::ingestion::{parse_report, ReportData};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub trait ReportSource {
    /// Report metadata ("describe" response), if the service provides one.
    fn describe(&self, report_id: &str) -> Result<Option<Value>>;

    /// Report results (fact-map response). `None` means the report is unknown.
    fn results(&self, report_id: &str) -> Result<Option<Value>>;
}

/// Retrieve and parse one report.
pub fn fetch_report<S: ReportSource + ?Sized>(source: &S, report_id: &str) -> Result<ReportData> {
    let results = source
        .results(report_id)?
        .ok_or_else(|| SnapshotError::ReportNotFound(report_id.to_string()))?;
    let describe = source.describe(report_id)?;

    parse_report(report_id, describe.as_ref(), &results)
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryReportSource {
    reports: HashMap<String, (Option<Value>, Value)>,
}

impl InMemoryReportSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, report_id: impl Into<String>, describe: Option<Value>, results: Value) {
        self.reports.insert(report_id.into(), (describe, results));
    }

    pub fn with_report(mut self, report_id: impl Into<String>, describe: Option<Value>, results: Value) -> Self {
        self.insert(report_id, describe, results);
        self
    }
}

impl ReportSource for InMemoryReportSource {
    fn describe(&self, report_id: &str) -> Result<Option<Value>> {
        Ok(self.reports.get(report_id).and_then(|(d, _)| d.clone()))
    }

    fn results(&self, report_id: &str) -> Result<Option<Value>> {
        Ok(self.reports.get(report_id).map(|(_, r)| r.clone()))
    }
}

/// Saved responses on disk: `<dir>/<id>.json` (results) and the optional
/// `<dir>/<id>.describe.json`.
#[derive(Debug, Clone)]
pub struct JsonDirReportSource {
    dir: PathBuf,
}

impl JsonDirReportSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn results_path(&self, report_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", report_id))
    }

    pub fn describe_path(&self, report_id: &str) -> PathBuf {
        self.dir.join(format!("{}.describe.json", report_id))
    }
}

fn read_json_if_present(path: &Path) -> Result<Option<Value>> {
    if !path.is_file() {
        debug!("No payload file at {}", path.display());
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(Some(serde_json::from_reader(reader)?))
}

impl ReportSource for JsonDirReportSource {
    fn describe(&self, report_id: &str) -> Result<Option<Value>> {
        read_json_if_present(&self.describe_path(report_id))
    }

    fn results(&self, report_id: &str) -> Result<Option<Value>> {
        read_json_if_present(&self.results_path(report_id))
    }
}
