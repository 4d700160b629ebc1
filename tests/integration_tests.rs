use chrono::NaiveDate;
use pipeline_snapshot::*;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

const PIPELINE_ID: &str = "00OIV000001TKQz2AO";
const CLOSED_WON_ID: &str = "00OIV00000MagdZ2AR";

#[derive(Debug, Deserialize)]
struct ExportedOpportunity {
    id: Option<String>,
    stage_name: Option<String>,
    amount: f64,
    expected_value_gap: Option<f64>,
    close_date: Option<String>,
    fiscal_quarter: Option<String>,
    fiscal_year: Option<String>,
    region: Option<String>,
    is_closed: bool,
    is_won: bool,
}

fn describe(columns: &[&str]) -> Value {
    let info: serde_json::Map<String, Value> = columns
        .iter()
        .map(|label| {
            (
                label.to_uppercase().replace(' ', "_"),
                json!({ "label": label }),
            )
        })
        .collect();

    json!({
        "reportMetadata": {
            "name": "Opportunity Report",
            "reportType": { "type": "Opportunity" },
            "detailColumns": columns
                .iter()
                .map(|label| label.to_uppercase().replace(' ', "_"))
                .collect::<Vec<_>>(),
            "reportFilters": []
        },
        "reportExtendedMetadata": { "detailColumnInfo": info }
    })
}

fn results(groups: Vec<(&str, Vec<Vec<Value>>)>) -> Value {
    let fact_map: serde_json::Map<String, Value> = groups
        .into_iter()
        .map(|(key, rows)| {
            let rows: Vec<Value> = rows
                .into_iter()
                .map(|cells| {
                    json!({
                        "dataCells": cells.into_iter().map(|v| json!({ "value": v })).collect::<Vec<_>>()
                    })
                })
                .collect();
            (key.to_string(), json!({ "rows": rows }))
        })
        .collect();

    json!({ "factMap": fact_map })
}

const PIPELINE_COLUMNS: [&str; 9] = [
    "Opportunity ID",
    "Opportunity Name",
    "Stage",
    "Amount",
    "Expected Value",
    "Expected Income",
    "Fiscal Period",
    "Region",
    "Owner Name",
];

fn pipeline_source() -> InMemoryReportSource {
    let rows_emea = vec![
        vec![json!("006001"), json!("Acme expansion"), json!("Negotiation"), json!("$1,234.56"), json!(500), json!(200), json!("Q2 2024"), json!(null), json!("Dana Ruiz")],
        vec![json!("006002"), json!("Globex pilot"), json!("Prospecting"), json!(4000), json!("$3,000"), json!("$500"), json!("Q1 2024"), json!("EMEA"), json!("Lee Park")],
        vec![json!("006003"), json!("Initech renewal"), json!("Negotiation"), json!({"amount": 900.0, "currency": null}), json!(800), json!(100), json!("Q2 2024"), json!(""), json!("Dana Ruiz")],
    ];
    let rows_apac = vec![
        vec![json!("006004"), json!("Umbrella upsell"), json!("Proposal"), json!("2,000"), json!(null), json!(null), json!("Q1 2025"), json!("APAC"), json!(null)],
        vec![json!("006005"), json!("Hooli migration"), json!("Proposal"), json!(750.25), json!(1200), json!(1500), json!("Q2 2024"), json!("APAC"), json!("Lee Park")],
    ];

    InMemoryReportSource::new().with_report(
        PIPELINE_ID,
        Some(describe(&PIPELINE_COLUMNS)),
        results(vec![("0!T", rows_emea), ("1!T", rows_apac)]),
    )
}

const CLOSED_WON_COLUMNS: [&str; 6] = [
    "Opportunity ID",
    "Amount",
    "Close Date",
    "Fiscal Period",
    "Region",
    "Owner Name",
];

fn closed_won_source() -> InMemoryReportSource {
    let rows = vec![
        vec![json!("006101"), json!(1500), json!("2024-03-15"), json!("Q1 2024"), json!("EMEA"), json!("Dana Ruiz")],
        vec![json!("006102"), json!("$2,500"), json!("03/20/2024"), json!("Q1 2024"), json!("APAC"), json!("Lee Park")],
        vec![json!("006103"), json!(900), json!("2024-03-15"), json!("Q1 2024"), json!("EMEA"), json!("Lee Park")],
        vec![json!("006104"), json!(4000), json!("2024-05-02"), json!("Q2 2024"), json!(null), json!("Dana Ruiz")],
        vec![json!(null), json!(100), json!(null), json!(null), json!("EMEA"), json!(null)],
    ];

    InMemoryReportSource::new().with_report(
        CLOSED_WON_ID,
        Some(describe(&CLOSED_WON_COLUMNS)),
        results(vec![("T!T", rows)]),
    )
}

fn assert_table_invariants(snapshot: &PipelineSnapshot) {
    assert_eq!(snapshot.total_count, snapshot.opportunities.len());
    let summed: f64 = snapshot.opportunities.iter().map(|o| o.amount).sum();
    assert!((snapshot.total_amount - summed).abs() < 1e-9);

    for table in [&snapshot.stage_summary, &snapshot.region_summary, &snapshot.owner_summary] {
        assert_eq!(table.total_count(), snapshot.total_count);
        assert!((table.total_amount() - snapshot.total_amount).abs() < 1e-6);
    }
}

fn read_opportunities(path: &Path) -> Vec<ExportedOpportunity> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.deserialize().map(|r| r.unwrap()).collect()
}

#[test]
fn test_pipeline_snapshot_end_to_end() {
    let source = pipeline_source();
    let snapshot = process_report(&source, PIPELINE_ID, ReportKind::Pipeline, &SnapshotOptions::default()).unwrap();

    assert_eq!(snapshot.total_count, 5);
    assert_eq!(snapshot.report_id.as_deref(), Some(PIPELINE_ID));
    assert_eq!(snapshot.report_name.as_deref(), Some("Opportunity Report"));
    assert!((snapshot.total_amount - (1234.56 + 4000.0 + 900.0 + 2000.0 + 750.25)).abs() < 1e-6);
    assert_table_invariants(&snapshot);

    // Scenario A: currency string and absent region
    let acme = &snapshot.opportunities[0];
    assert!((acme.amount - 1234.56).abs() < 1e-9);
    assert!(acme.region.is_none());

    // Scenario B: gap is recomputed
    assert_eq!(acme.expected_value_gap, Some(300.0));
    assert!(!acme.is_closed && !acme.is_won);

    // Scenario E: null and empty regions share one bucket
    let unknown = snapshot.region_summary.bucket(UNKNOWN_KEY).unwrap();
    assert_eq!(unknown.count, 2);
    assert!((unknown.amount - 2134.56).abs() < 1e-9);

    let umbrella = &snapshot.opportunities[3];
    assert_eq!(umbrella.expected_value, None);
    assert_eq!(umbrella.expected_value_gap, None);

    let negotiation = snapshot.stage_summary.bucket("Negotiation").unwrap();
    assert_eq!(negotiation.count, 2);
    assert_eq!(negotiation.expected_value, Some(1300.0));
    assert_eq!(negotiation.expected_income, Some(300.0));
    assert_eq!(negotiation.expected_value_gap, Some(1000.0));

    assert_eq!(snapshot.owner_summary.bucket(UNKNOWN_KEY).unwrap().count, 1);
    assert!(snapshot.temporal_summary.is_none());
}

#[test]
fn test_closed_won_snapshot_end_to_end() {
    let source = closed_won_source();
    let snapshot =
        process_report(&source, CLOSED_WON_ID, ReportKind::ClosedWon, &SnapshotOptions::default()).unwrap();

    assert_table_invariants(&snapshot);
    assert_eq!(snapshot.stage_summary.len(), 1);
    assert_eq!(snapshot.stage_summary.bucket(CLOSED_WON_STAGE).unwrap().count, 5);

    // Scenario C: both date layouts land on real calendar dates
    assert_eq!(snapshot.opportunities[0].close_date, NaiveDate::from_ymd_opt(2024, 3, 15));
    assert_eq!(snapshot.opportunities[1].close_date, NaiveDate::from_ymd_opt(2024, 3, 20));

    for opp in &snapshot.opportunities {
        assert!(opp.is_closed && opp.is_won);
        assert!(opp.expected_value.is_none());
    }

    let temporal = snapshot.temporal_summary.as_ref().unwrap();
    let q1 = temporal
        .get(&TemporalKey {
            fiscal_year: "2024".to_string(),
            fiscal_quarter: "Q1".to_string(),
        })
        .unwrap();
    assert_eq!(q1.deal_count, 3);
    assert!((q1.total_amount - 4900.0).abs() < 1e-9);

    let temporal_deals: usize = temporal.iter().map(|(_, b)| b.deal_count).sum();
    assert_eq!(temporal_deals, snapshot.total_count);
}

#[test]
fn test_bad_close_date_aborts_snapshot() {
    // Scenario D
    let rows = vec![
        vec![json!("006201"), json!(10), json!("2024-01-02"), json!("Q1 2024"), json!("EMEA"), json!("Dana Ruiz")],
        vec![json!("006202"), json!(20), json!("not-a-date"), json!("Q1 2024"), json!("EMEA"), json!("Dana Ruiz")],
    ];
    let source = InMemoryReportSource::new().with_report(
        "00O-bad",
        Some(describe(&CLOSED_WON_COLUMNS)),
        results(vec![("T!T", rows)]),
    );

    let dir = tempfile::tempdir().unwrap();
    let result = SnapshotProcessor::process_and_export(
        &source,
        "00O-bad",
        ReportKind::ClosedWon,
        &SnapshotOptions::default(),
        dir.path(),
    );

    match result {
        Err(SnapshotError::DateParse { raw, row, opportunity_id }) => {
            assert_eq!(raw, "not-a-date");
            assert_eq!(row, 1);
            assert_eq!(opportunity_id.as_deref(), Some("006202"));
        }
        other => panic!("expected DateParse, got {other:?}"),
    }

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_mapping_is_idempotent() {
    let report = fetch_report(&pipeline_source(), PIPELINE_ID).unwrap();
    let mapper = RecordMapper::new(ReportKind::Pipeline, AmountPolicy::Coerce);

    for (idx, row) in report.raw_rows.iter().enumerate() {
        assert_eq!(mapper.map_row(idx, row).unwrap(), mapper.map_row(idx, row).unwrap());
    }
}

#[test]
fn test_report_totals_match_rows() {
    let report = fetch_report(&pipeline_source(), PIPELINE_ID).unwrap();
    assert_eq!(report.total_records, report.raw_rows.len());
    assert_eq!(report.columns, PIPELINE_COLUMNS.to_vec());
    assert_eq!(report.report_type, "Opportunity");
}

#[test]
fn test_pipeline_export_round_trip_and_sort_law() {
    let snapshot =
        process_report(&pipeline_source(), PIPELINE_ID, ReportKind::Pipeline, &SnapshotOptions::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let manifest = export_snapshot(&snapshot, dir.path(), ReportKind::Pipeline).unwrap();

    assert!(manifest.temporal.is_none());
    assert_eq!(manifest.paths().len(), 4);
    for path in manifest.paths() {
        assert!(path.exists(), "missing {}", path.display());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("pipeline_"));
        assert!(name.ends_with(&format!("_{}.csv", manifest.timestamp)));
    }

    let rows = read_opportunities(&manifest.opportunities);
    assert_eq!(rows.len(), snapshot.total_count);
    let total: f64 = rows.iter().map(|r| r.amount).sum();
    assert!((total - snapshot.total_amount).abs() < 1e-6);

    let order: Vec<&str> = rows.iter().map(|r| r.id.as_deref().unwrap()).collect();
    assert_eq!(order, vec!["006002", "006003", "006001", "006005", "006004"]);

    for pair in rows.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!((a.fiscal_year.clone(), a.fiscal_quarter.clone()) <= (b.fiscal_year.clone(), b.fiscal_quarter.clone()));
        if a.fiscal_year == b.fiscal_year && a.fiscal_quarter == b.fiscal_quarter {
            if let (Some(x), Some(y)) = (a.expected_value_gap, b.expected_value_gap) {
                assert!(x >= y);
            }
        }
    }

    let acme = rows.iter().find(|r| r.id.as_deref() == Some("006001")).unwrap();
    assert_eq!(acme.stage_name.as_deref(), Some("Negotiation"));
    assert!(acme.region.is_none());
    assert!(!acme.is_closed && !acme.is_won);

    let stages = fs::read_to_string(&manifest.stages).unwrap();
    let mut lines = stages.lines();
    assert_eq!(
        lines.next(),
        Some("stage,count,amount,expected_value,expected_income,expected_value_gap")
    );
    assert_eq!(stages.lines().count(), 1 + snapshot.stage_summary.len());

    let regions = fs::read_to_string(&manifest.regions).unwrap();
    assert!(regions.starts_with("region,count,amount,"));
    assert!(regions.lines().any(|l| l.starts_with("Unknown,2,")));
}

#[test]
fn test_summary_file_flattens_stage_and_region_tables() {
    let snapshot =
        process_report(&pipeline_source(), PIPELINE_ID, ReportKind::Pipeline, &SnapshotOptions::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let manifest = export_snapshot(&snapshot, dir.path(), ReportKind::Pipeline).unwrap();

    let mut reader = csv::Reader::from_path(&manifest.summary).unwrap();
    let headers = reader.headers().unwrap().clone();
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);

    let value = |column: &str| {
        let idx = headers.iter().position(|h| h == column).unwrap();
        records[0].get(idx).unwrap().to_string()
    };

    assert_eq!(&headers[0], "snapshot_date");
    assert_eq!(value("total_count"), "5");
    assert_eq!(value("report_id"), PIPELINE_ID);
    assert_eq!(value("generated_by"), "");
    assert_eq!(value("stage_Negotiation_count"), "2");
    assert_eq!(value("region_Unknown_count"), "2");
    assert_eq!(value("region_APAC_count"), "2");
    assert!((value("total_amount").parse::<f64>().unwrap() - snapshot.total_amount).abs() < 1e-9);

    let expected_columns = 6 + 2 * snapshot.stage_summary.len() + 2 * snapshot.region_summary.len();
    assert_eq!(headers.len(), expected_columns);
    assert!(headers.iter().all(|h| !h.starts_with("owner_")));
}

#[test]
fn test_closed_won_export_family() {
    let snapshot =
        process_report(&closed_won_source(), CLOSED_WON_ID, ReportKind::ClosedWon, &SnapshotOptions::default())
            .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let manifest = export_snapshot(&snapshot, dir.path(), ReportKind::ClosedWon).unwrap();

    assert_eq!(manifest.paths().len(), 5);
    for path in manifest.paths() {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("closed_won_"), "unexpected file {name}");
    }

    let rows = read_opportunities(&manifest.opportunities);
    let order: Vec<Option<&str>> = rows.iter().map(|r| r.id.as_deref()).collect();
    assert_eq!(
        order,
        vec![Some("006101"), Some("006103"), Some("006102"), Some("006104"), None]
    );
    assert_eq!(rows[0].close_date.as_deref(), Some("2024-03-15"));
    assert!(rows.iter().all(|r| r.is_closed && r.is_won));

    let stages = fs::read_to_string(&manifest.stages).unwrap();
    assert_eq!(stages.lines().next(), Some("stage,count,amount"));
    assert!(stages.lines().any(|l| l.starts_with("Closed Won,5,")));

    let temporal_path = manifest.temporal.as_ref().unwrap();
    let mut reader = csv::Reader::from_path(temporal_path).unwrap();
    assert_eq!(
        reader.headers().unwrap().iter().collect::<Vec<_>>(),
        vec!["fiscal_year", "fiscal_quarter", "total_amount", "deal_count", "opportunity_count"]
    );
    let temporal: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    let keys: Vec<(String, String)> = temporal
        .iter()
        .map(|r| (r[0].to_string(), r[1].to_string()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("2024".to_string(), "Q1".to_string()),
            ("2024".to_string(), "Q2".to_string()),
            ("Unknown".to_string(), "Unknown".to_string()),
        ]
    );
    assert_eq!(&temporal[0][3], "3");
    assert_eq!(&temporal[2][4], "0");
}

#[test]
fn test_export_does_not_create_directory() {
    let snapshot =
        process_report(&pipeline_source(), PIPELINE_ID, ReportKind::Pipeline, &SnapshotOptions::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("not-there");

    assert!(export_snapshot(&snapshot, &missing, ReportKind::Pipeline).is_err());
    assert!(!missing.exists());
}

#[test]
fn test_strict_amount_policy_rejects_garbage() {
    let rows = vec![vec![json!("006301"), json!("twelve"), json!("2024-01-02"), json!("Q1 2024"), json!("EMEA"), json!("Dana Ruiz")]];
    let source = InMemoryReportSource::new().with_report(
        "00O-strict",
        Some(describe(&CLOSED_WON_COLUMNS)),
        results(vec![("T!T", rows)]),
    );

    let lenient = process_report(&source, "00O-strict", ReportKind::ClosedWon, &SnapshotOptions::default()).unwrap();
    assert_eq!(lenient.total_amount, 0.0);

    let strict = SnapshotOptions {
        amount_policy: AmountPolicy::Strict,
        ..SnapshotOptions::default()
    };
    let err = process_report(&source, "00O-strict", ReportKind::ClosedWon, &strict).unwrap_err();
    assert!(matches!(err, SnapshotError::NumericCoercion { .. }));
    assert!(err.to_string().contains("twelve"));
}

#[test]
fn test_service_exports_both_reports_from_json_dir() {
    let payloads = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let pipeline = pipeline_source();
    let closed = closed_won_source();
    for (source, id) in [(&pipeline, PIPELINE_ID), (&closed, CLOSED_WON_ID)] {
        let describe = source.describe(id).unwrap().unwrap();
        let results = source.results(id).unwrap().unwrap();
        fs::write(payloads.path().join(format!("{id}.describe.json")), describe.to_string()).unwrap();
        fs::write(payloads.path().join(format!("{id}.json")), results.to_string()).unwrap();
    }

    let config_path = payloads.path().join("config.json");
    fs::write(
        &config_path,
        json!({
            "pipeline_report_id": PIPELINE_ID,
            "closed_won_report_id": CLOSED_WON_ID,
            "output_dir": output.path(),
            "options": { "generated_by": "nightly" }
        })
        .to_string(),
    )
    .unwrap();

    let config = ReportConfig::from_json_file(&config_path).unwrap();
    let service = PipelineReportService::new(JsonDirReportSource::new(payloads.path()), config);

    let snapshot = service.closed_won_snapshot().unwrap();
    assert_eq!(snapshot.generated_by.as_deref(), Some("nightly"));

    let manifests = service.export_all().unwrap();
    assert_eq!(manifests.len(), 2);
    assert!(manifests[0].temporal.is_none());
    assert!(manifests[1].temporal.is_some());

    let written = fs::read_dir(output.path()).unwrap().count();
    assert_eq!(written, 4 + 5);
}

#[test]
fn test_unknown_report_id() {
    let err = process_report(
        &InMemoryReportSource::new(),
        "00O-missing",
        ReportKind::Pipeline,
        &SnapshotOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SnapshotError::ReportNotFound(_)));
}
