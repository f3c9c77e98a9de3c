use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;

use covercheck::{
    clean_dataset, load_dataset, logging, Exporter, PipelineConfig, QualityChecker,
    ReconciliationEngine, RunReport,
};

#[derive(Parser, Debug)]
#[command(
    name = "covercheck",
    version,
    about = "Clean, check and reconcile a month of pet insurance broker extracts"
)]
struct Cli {
    /// Directory holding the month's CSV extracts
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving parquet tables, logs and the report
    #[arg(short, long)]
    output: PathBuf,

    /// Amount tolerance in euros for concordance rules
    #[arg(long, default_value_t = covercheck::DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Reference date for billing schedules, ISO format (defaults to today, UTC)
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Log filter, e.g. "debug" or "covercheck=trace" (overrides COVERCHECK_LOG)
    #[arg(long)]
    log: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log.as_deref());

    let as_of = cli.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let config = PipelineConfig::new(cli.input, cli.output, as_of).with_tolerance(cli.tolerance);

    println!("🐾 Covercheck - monthly broker data audit");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load
    println!("\n📂 Loading {}...", config.input_dir.display());
    let raw = load_dataset(&config.input_dir).context("loading input tables")?;
    println!(
        "✓ {} contracts, {} receipts, {} claims, {} tariffs",
        raw.contracts.rows.len(),
        raw.receipts.rows.len(),
        raw.claims.rows.len(),
        raw.tariffs.rows.len()
    );

    // 2. Clean
    println!("\n🧹 Cleaning...");
    let (data, log) = clean_dataset(&raw).context("cleaning tables")?;
    println!("✓ {} cells coerced or missing", log.len());

    // 3. Check
    println!("\n✅ Checking...");
    let mut rules = QualityChecker::new(config.as_of).run(&data, &log);

    // 4. Reconcile
    println!("\n💰 Reconciling...");
    let reconciler = ReconciliationEngine::new(config.as_of).with_tolerance(config.tolerance);
    rules.extend(reconciler.run(&data));

    for rule in &rules {
        let mark = if rule.passed() { "✓" } else { "✗" };
        println!("  {} {}", mark, rule.summary());
    }

    // 5. Report and export
    let report = RunReport::build(&config, &raw, &log, rules);
    println!("\n📦 Exporting to {}...", config.output_dir.display());
    let manifest = Exporter::new(&config.output_dir)
        .export(&data, &log, &report)
        .context("writing artifacts")?;
    println!("✓ {} artifacts + manifest", manifest.artifacts.len());

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📋 {}", report.summary());
    if report.passed() {
        println!("🎉 Month is clean");
    } else {
        println!(
            "⚠️  {} violation(s) to triage ({} critical) - see violations.csv",
            report.total_violations,
            report.critical_violations()
        );
    }

    // Violations are findings for the report, not process failures: only a
    // load, clean or export error changes the exit code.
    Ok(())
}
