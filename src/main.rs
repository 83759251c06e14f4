// CLI: compare an original estimate CSV against a supplement CSV and print
// the analysis; optionally export the full result object as JSON.

use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoLocal;

use estimate_recon::{load_csv, AnalysisConfig, AnalysisEngine, ComparisonAnalysis};

struct CliArgs {
    original: PathBuf,
    supplement: PathBuf,
    config: Option<PathBuf>,
    json_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    let engine = AnalysisEngine::new(config).context("Invalid analysis configuration")?;

    println!("📊 Estimate Supplement Analysis");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading estimates...");
    let original = load_csv(&args.original)?;
    let supplement = load_csv(&args.supplement)?;
    println!(
        "✓ {} original items, {} supplement items",
        original.len(),
        supplement.len()
    );

    println!("\n🔁 Reconciling...");
    let analysis = engine.analyze(&original, &supplement)?;
    print_report(&analysis);

    if let Some(path) = &args.json_out {
        let json = serde_json::to_string_pretty(&analysis)?;
        fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        println!("\n💾 Full analysis written to {:?}", path);
    }

    println!(
        "\n✅ Analysis complete in {}ms",
        analysis.metadata.duration_ms
    );
    Ok(())
}

fn parse_args() -> Result<CliArgs> {
    let argv: Vec<String> = env::args().collect();
    if argv.len() < 3 {
        bail!(
            "Usage: {} <original.csv> <supplement.csv> [--config <config.json>] [--json <out.json>]",
            argv.first().map(String::as_str).unwrap_or("estimate-recon"),
        );
    }

    let mut args = CliArgs {
        original: PathBuf::from(&argv[1]),
        supplement: PathBuf::from(&argv[2]),
        config: None,
        json_out: None,
    };

    let mut i = 3;
    while i < argv.len() {
        match argv[i].as_str() {
            "--config" => {
                let value = argv.get(i + 1).context("--config requires a path")?;
                args.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--json" => {
                let value = argv.get(i + 1).context("--json requires a path")?;
                args.json_out = Some(PathBuf::from(value));
                i += 2;
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    Ok(args)
}

fn print_report(analysis: &ComparisonAnalysis) {
    let r = &analysis.reconciliation;
    println!(
        "✓ {} matched, {} removed, {} new",
        r.matched.len(),
        r.unmatched_original.len(),
        r.new_supplement.len()
    );

    println!("\n💰 Totals by category");
    for subtotal in &analysis.statistics.by_category {
        println!(
            "   {:<10} {:>12} → {:>12}  ({:+})",
            subtotal.category.name(),
            subtotal.original_total,
            subtotal.supplement_total,
            subtotal.net_change,
        );
    }
    let grand = &analysis.statistics.grand_total;
    println!(
        "   {:<10} {:>12} → {:>12}  ({:+})",
        "TOTAL", grand.original_total, grand.supplement_total, grand.net_change,
    );

    let quality = &analysis.statistics.data_quality;
    println!(
        "\n🔎 Data quality: {:.0}% (completeness {:.0}%, consistency {:.0}%)",
        quality.overall * 100.0,
        quality.completeness * 100.0,
        quality.consistency * 100.0,
    );

    if !analysis.discrepancies.is_empty() {
        println!("\n⚠️  Discrepancies ({})", analysis.discrepancies.len());
        for d in analysis.discrepancies.iter().take(10) {
            println!("   [{:?}] {}", d.severity, d.description);
        }
        if analysis.discrepancies.len() > 10 {
            println!("   ... and {} more", analysis.discrepancies.len() - 10);
        }
    }

    println!(
        "\n🚨 Risk: {:.0}/100 ({:?})",
        analysis.risk.score, analysis.risk.level
    );
    for rec in &analysis.risk.recommendations {
        println!("   • {}", rec);
    }
}
