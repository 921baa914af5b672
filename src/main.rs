//! libscout - client-side JavaScript library inventory and exposure scanner.
//!
//! CLI entry point.

use clap::Parser;
use libscout::{Commands, Config, Scanner};
use std::fs;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Set up logging
    let filter = if config.verbose {
        EnvFilter::new("libscout=debug,info")
    } else {
        EnvFilter::new("libscout=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Spawn signal handler to kill Chrome processes on SIGTERM/SIGINT.
    // Without this, Chrome survives after libscout is killed and burns CPU.
    tokio::spawn(async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => {},
                _ = sigint.recv() => {},
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        eprintln!("\nSignal received, killing Chrome processes...");
        libscout::browser::kill_stray_browsers();
        std::process::exit(130);
    });

    match config.command.clone() {
        Commands::Scan(mut scan_config) => {
            scan_config.verbose = scan_config.verbose || config.verbose;
            if let Err(code) = run_scan(scan_config).await {
                return code;
            }
        }
        Commands::Setup(setup_config) => {
            if let Err(code) = run_setup(setup_config).await {
                return code;
            }
        }
    }

    ExitCode::SUCCESS
}

async fn run_scan(scan_config: libscout::ScanConfig) -> Result<(), ExitCode> {
    let target = scan_config.normalized_target();

    let scanner = match Scanner::new(&scan_config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create scanner: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    let report = match scanner.scan(&target).await {
        Ok(r) => r,
        Err(e) => {
            error!("Scan failed: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    scanner.console().print_report(&report);

    // Write JSON to file when requested, regardless of console mode
    if let Some(ref output_path) = scan_config.output {
        let json = serde_json::to_string_pretty(&report).unwrap_or_default();
        if let Err(e) = fs::write(output_path, &json) {
            error!("Failed to write output file: {}", e);
            return Err(ExitCode::FAILURE);
        }
        info!("Report written to: {:?}", output_path);
    }

    let vulnerable = report
        .libraries
        .iter()
        .filter(|l| l.vulnerability_count.unwrap_or(0) > 0)
        .count();
    if vulnerable > 0 && !scan_config.json {
        eprintln!("\n{} libraries with known vulnerabilities found!", vulnerable);
    }

    Ok(())
}

async fn run_setup(setup_config: libscout::SetupConfig) -> Result<(), ExitCode> {
    eprintln!("Setting up Chromium browser...");
    match libscout::browser::download_chrome(setup_config.force).await {
        Ok(path) => {
            eprintln!("Chromium ready at: {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("Setup failed: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}
