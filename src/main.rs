use clap::Parser;
use entity_lookup::utils::error::{ErrorSeverity, LookupError};
use entity_lookup::utils::monitor::SystemMonitor;
use entity_lookup::utils::{logger, validation::Validate};
use entity_lookup::{CliConfig, LocalStorage, LookupEngine};

fn exit_code(e: &LookupError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn report_failure(stage: &str, e: &LookupError) {
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
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    if config.log_json {
        logger::init_json_logger(config.verbose, None);
    } else {
        logger::init_cli_logger(config.verbose, None);
    }

    tracing::info!("Starting entity-lookup CLI");
    tracing::debug!("CLI config: {:?}", config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let monitor_enabled = config.monitor;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let dry_run = config.dry_run;
    let storage = LocalStorage::new(config.output_path.clone());
    let engine = match LookupEngine::from_config(config, storage) {
        Ok(engine) => engine.with_monitor(SystemMonitor::new(monitor_enabled)),
        Err(e) => {
            report_failure("Setup", &e);
            std::process::exit(exit_code(&e).max(1));
        }
    };

    if dry_run {
        match engine.preview().await {
            Ok(queries) => {
                println!("🔍 Query preview:");
                for query in queries {
                    println!("  {}", query);
                }
            }
            Err(e) => {
                report_failure("Preview", &e);
                std::process::exit(exit_code(&e).max(1));
            }
        }
        return Ok(());
    }

    match engine.run().await {
        Ok(report) => {
            println!(
                "✅ Looked up {} entities ({} rows loaded)",
                report.records.len(),
                report.rows_loaded
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
        Err(e) => {
            report_failure("Lookup", &e);
            let code = exit_code(&e);
            if code > 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
