// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use shotdeck_scraper::{Cli, Pipeline, ProgressStore, RunConfiguration, RunSummary, SessionContext};
use std::fs;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set the interrupt flag on Ctrl-C so the run can flush before exiting.
/// A second Ctrl-C exits immediately.
fn watch_for_interrupt() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, finishing the current step and saving progress...");
        warn!("Press Ctrl-C again to quit without saving");
        handle.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Second interrupt, exiting now");
            std::process::exit(130);
        }
    });
    flag
}

async fn run() -> Result<RunSummary> {
    let cli = Cli::parse();
    let config = RunConfiguration::from_env(&cli).context("Invalid configuration")?;

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Could not create output directory {}",
            config.output_dir.display()
        )
    })?;
    info!("Images will be saved to: {}", config.images_dir.display());
    info!(
        "Spreadsheet will be saved to: {}",
        config.spreadsheet_path.display()
    );

    let interrupt = watch_for_interrupt();
    let mut session = SessionContext::launch(&config)
        .await
        .context("Could not start the browser session")?;
    let mut store =
        ProgressStore::new(&config.spreadsheet_path, config.batch_size).with_backup(config.backup_path());

    let outcome = Pipeline::new(&config, &mut session, &mut store)
        .run(&interrupt)
        .await;

    if let Err(e) = session.close().await {
        warn!("Browser did not shut down cleanly: {e}");
    }

    outcome.context("Scrape failed")
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(summary) => {
            println!("\n=== Scrape complete! ===\n");
            println!("{summary}");
            if let Ok(json) = serde_json::to_string(&summary) {
                info!("summary {json}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
