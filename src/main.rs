use anyhow::{Context, Result};
use clap::{Arg, Command};
use community_rollup::diagnostics::{profile_table, render_profile};
use community_rollup::pipeline::{DETAILED_REPORT, QUALITY_REPORT, SIMPLE_REPORT};
use community_rollup::{Config, DateNormalizer, Pipeline, Rollup, Table};
use std::fs;
use std::path::Path;

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("COMMUNITY_ROLLUP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let matches = Command::new("community-rollup")
        .version("0.1")
        .about("Rolls builder sales, CRM and web traffic exports up into one monthly community report")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory, overriding the configured one"),
        )
        .arg(
            Arg::new("profile")
                .short('p')
                .long("profile")
                .value_name("CSV")
                .help("Write a data-exploration profile of a CSV file and exit"),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("failed to load configuration from {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default()
            .save_to_file(config_file)
            .with_context(|| format!("failed to write {}", config_file))?;
        println!(
            "⚠️  Please review the builders and community rules in {}, then run the program again.",
            config_file
        );
        return Ok(());
    };

    let output_dir = matches
        .get_one::<String>("output")
        .cloned()
        .unwrap_or_else(|| config.output_directory.clone());

    if let Some(csv_file) = matches.get_one::<String>("profile") {
        return write_profile(csv_file, &config, &output_dir);
    }

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir))?;
    clean_output_directory(&output_dir)?;

    println!("📂 Reading exports from: {}", config.input_directory);
    println!("📄 Output directory: {} (cleaned)", output_dir);
    println!(
        "🏗️  Builders: {}",
        config
            .builders
            .iter()
            .map(|b| b.builder.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let (rollup, written) = pipeline
        .run(Path::new(&output_dir))
        .context("roll-up failed")?;

    print_summary(&rollup);
    println!("\n✅ Roll-up complete! {} file(s) written to {}", written.len(), output_dir);
    Ok(())
}

fn write_profile(csv_file: &str, config: &Config, output_dir: &str) -> Result<()> {
    println!("🔍 Profiling: {}", csv_file);
    let table = Table::load(Path::new(csv_file))
        .with_context(|| format!("failed to read {}", csv_file))?;
    let profile = profile_table(&table, &DateNormalizer::new(config.date_order));

    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir))?;
    let stem = Path::new(csv_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("table");
    let report_path = Path::new(output_dir).join(format!("profile_{}.md", stem));
    fs::write(&report_path, render_profile(&profile))
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    println!(
        "   ✅ {} rows, {} columns profiled",
        profile.rows,
        profile.columns.len()
    );
    println!("📄 Profile written to: {}", report_path.display());
    Ok(())
}

fn print_summary(rollup: &Rollup) {
    let quality = &rollup.quality;

    println!("\n📊 SUMMARY");
    println!("==========\n");
    println!("📈 Sources:");
    for source in &quality.sources {
        println!(
            "   {:<12} {:>6} loaded, {:>6} kept",
            source.label(),
            source.rows_loaded,
            source.rows_normalized
        );
    }

    let unmatched: usize = quality
        .sources
        .iter()
        .map(|s| s.communities.unmatched.len())
        .sum();
    if unmatched > 0 {
        println!("⚠️  {} unmatched community name(s); see {}", unmatched, QUALITY_REPORT);
    }
    let dropped: usize = quality.reconciliation.iter().map(|r| r.dropped.len()).sum();
    if dropped > 0 {
        println!(
            "⚠️  {} secondary community-month(s) had no sales or target row",
            dropped
        );
    }

    println!(
        "\n🗂️  {}: {} rows x {} metric columns",
        SIMPLE_REPORT,
        rollup.simple.report.len(),
        rollup.simple.report.columns.len()
    );
    println!(
        "🗂️  {}: {} rows x {} metric columns",
        DETAILED_REPORT,
        rollup.detailed.report.len(),
        rollup.detailed.report.columns.len()
    );
    match quality.issue_count() {
        0 => println!("🟢 No data quality issues"),
        n => println!("🟡 {} data quality issue(s) recorded in {}", n, QUALITY_REPORT),
    }
}

fn clean_output_directory(output_dir: &str) -> Result<()> {
    let output_path = Path::new(output_dir);

    if !output_path.exists() {
        return Ok(());
    }

    println!("🧹 Cleaning previous results...");

    for entry in fs::read_dir(output_path)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let previous_output = name == SIMPLE_REPORT
            || name == DETAILED_REPORT
            || name == QUALITY_REPORT
            || (name.starts_with("monthly_") && name.ends_with(".csv"));
        if previous_output && path.is_file() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            println!("   🗑️  Removed file: {}", name);
        }
    }

    Ok(())
}
