use pipeline_snapshot::*;
use std::env;
use std::path::Path;

/// Usage: `cargo run --example snapshot_from_files -- <config.json> <payload-dir>`
///
/// The payload directory holds `<report id>.json` run responses and, optionally,
/// `<report id>.describe.json` describe responses saved from the report service.
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("usage: {} <config.json> <payload-dir>", args[0]);
        println!("\nConfig schema:\n{}", ReportConfig::schema_as_json()?);
        return Ok(());
    }

    let config = ReportConfig::from_json_file(Path::new(&args[1]))?;
    println!("📊 Pipeline snapshot");
    println!("  pipeline report:   {}", config.pipeline_report_id);
    println!("  closed-won report: {}", config.closed_won_report_id);
    println!("  output directory:  {}\n", config.output_dir.display());

    let service = PipelineReportService::new(JsonDirReportSource::new(&args[2]), config);

    for kind in [ReportKind::Pipeline, ReportKind::ClosedWon] {
        let snapshot = service.snapshot(kind)?;
        println!(
            "✅ {}: {} opportunities, total {:.2}",
            kind, snapshot.total_count, snapshot.total_amount
        );

        for (stage, bucket) in snapshot.stage_summary.iter() {
            println!("    {:<24} {:>5} {:>14.2}", stage, bucket.count, bucket.amount);
        }

        if let Some(temporal) = &snapshot.temporal_summary {
            println!("  by fiscal period:");
            for (key, bucket) in temporal.iter() {
                println!(
                    "    {} {:<8} {:>5} {:>14.2}",
                    key.fiscal_year, key.fiscal_quarter, bucket.deal_count, bucket.total_amount
                );
            }
        }

        let manifest = export_snapshot(&snapshot, &service.config().output_dir, kind)?;
        for path in manifest.paths() {
            println!("  wrote {}", path.display());
        }
        println!();
    }

    Ok(())
}
