use clap::Parser;
use entity_lookup::core::ConfigProvider;
use entity_lookup::utils::error::{ErrorSeverity, LookupError};
use entity_lookup::utils::monitor::SystemMonitor;
use entity_lookup::utils::{logger, validation::Validate};
use entity_lookup::{LocalStorage, LookupEngine, TomlConfig};

#[derive(Parser)]
#[command(name = "toml-lookup")]
#[command(about = "Entity lookup driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "lookup-config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override the sheet sync setting from config
    #[arg(long)]
    sync: Option<bool>,

    /// Load the source and show the query preview without searching
    #[arg(long)]
    dry_run: bool,
}

fn fail(stage: &str, e: &LookupError) -> ! {
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    let code = match e.severity() {
        ErrorSeverity::Low | ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(code);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    logger::init_cli_logger(args.verbose, config.log_level());

    tracing::info!("🚀 Starting TOML-based entity lookup");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    if let Some(sync) = args.sync {
        config.output.sync_to_sheet = sync;
        tracing::info!("🔧 Sheet sync overridden to: {}", sync);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let engine = match LookupEngine::from_config(config, storage) {
        Ok(engine) => engine.with_monitor(SystemMonitor::new(monitor_enabled)),
        Err(e) => fail("Setup", &e),
    };

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - no searches will be made");
        match engine.preview().await {
            Ok(queries) => {
                println!("📝 Query preview ({} shown):", queries.len());
                for query in queries {
                    println!("  {}", query);
                }
            }
            Err(e) => fail("Preview", &e),
        }
        return Ok(());
    }

    match engine.run().await {
        Ok(report) => {
            println!("✅ Entity lookup completed successfully!");
            println!(
                "  {} rows loaded, {} queries, {} results",
                report.rows_loaded,
                report.queries,
                report.records.len()
            );
            for file in &report.files_written {
                println!("📁 Output saved to: {}", file);
            }
            if report.synced {
                println!("📗 Google Sheet updated");
            }
            if let Some(message) = report.sync_error {
                eprintln!("⚠️ {}", message);
            }
        }
        Err(e) => fail("Lookup", &e),
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!("  Lookup: {}", config.lookup.name);
    if let Some(description) = &config.lookup.description {
        println!("  Description: {}", description);
    }
    match config.source_descriptor() {
        Some(source) => println!("  Source: {:?}", source),
        None => println!("  Source: (none)"),
    }
    println!("  Column: {}", config.source.column);
    println!("  Template: {}", config.query_template());

    let search = config.search_settings();
    println!(
        "  Search: {} ({} concurrent)",
        search.backend, search.concurrent_requests
    );
    println!("  Extraction: {}", config.extraction_settings().backend);
    println!("  Output: {}", config.output_path());
    println!("  Bundle: {}", config.bundle_output());
    println!("  Sync to sheet: {}", config.sync_to_sheet());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}
