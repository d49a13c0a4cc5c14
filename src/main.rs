use clap::Parser;
use wbrcu::app::engine::BenchEngine;
use wbrcu::utils::error::ErrorSeverity;
use wbrcu::utils::{logger, validation::Validate};
use wbrcu::{BenchConfig, CliArgs, LocalStorage, ReportWriter};

fn main() {
    let args = CliArgs::parse();

    if args.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting wbrcu benchmark");
    if let Some(path) = &args.config {
        tracing::info!("📁 Loading configuration from: {}", path.display());
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    if args.verbose {
        tracing::debug!("Bench config: {:?}", config);
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    display_config_summary(&config);

    let engine = BenchEngine::new_with_monitoring(config, monitor_enabled);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No measurements will be taken");
        perform_dry_run(&engine);
        return;
    }

    let report = match engine.run() {
        Ok(report) => report,
        Err(e) => exit_with(e),
    };

    let config = engine.config();
    let storage = LocalStorage::new(config.output_path());
    let writer = ReportWriter::new(storage.clone());

    match writer.write(&report, &config.output.formats) {
        Ok(_) => {
            println!("✅ Benchmark completed: {} results", report.results.len());
            println!("📁 Output saved to: {}", storage.base_path().display());
        }
        Err(e) => exit_with(e),
    }
}

fn exit_with(e: wbrcu::BenchError) -> ! {
    tracing::error!(
        "❌ Benchmark failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

fn display_config_summary(config: &BenchConfig) {
    let implementations: Vec<&str> = config
        .bench
        .implementations
        .iter()
        .map(|k| k.as_str())
        .collect();
    let scenarios: Vec<&str> = config.bench.scenarios.iter().map(|s| s.as_str()).collect();

    println!("📋 Configuration Summary:");
    println!("  Benchmark: {}", config.bench.name);
    println!("  Duration per run: {:?}", config.duration());
    println!("  Max threads: {}", config.max_threads());
    println!("  Implementations: {}", implementations.join(", "));
    println!("  Scenarios: {}", scenarios.join(", "));
    println!("  Output: {} ({})", config.output_path(), config.output.formats.join(", "));
}

fn perform_dry_run(engine: &BenchEngine) {
    println!("🔍 Planned runs:");
    for planned in engine.plan() {
        println!(
            "  {:<15} {:<7} {} run(s)",
            planned.scenario.as_str(),
            planned.implementation.as_str(),
            planned.runs
        );
    }
    println!(
        "⏱️  Estimated measured time: {:?}",
        engine.estimated_duration()
    );
}
