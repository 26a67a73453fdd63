//! AirSense telemetry server
//!
//! Run with: cargo run --example airsense_server [CONFIG_PATH]
//!
//! Without an argument the server looks for `config/airsense.toml`, then
//! `airsense.toml`, and falls back to defaults. If the configured MQTT broker
//! cannot be reached, synthetic readings are generated instead.
//!
//! ## Subscribing
//!
//! With websocat:
//!   websocat ws://localhost:8000
//!
//! Every subscriber first receives a `connection` message, then a
//! `sensor_update` with the full latest state whenever a reading arrives.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use airsense_rs::{AppConfig, Pipeline, TelemetryServer};

fn print_usage() {
    eprintln!("Usage: airsense_server [CONFIG_PATH]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  CONFIG_PATH    TOML configuration file (default: config/airsense.toml)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = match args.get(1) {
        Some(path) => match AppConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => AppConfig::load_or_default(&AppConfig::default_paths()),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.logging.directive().parse()?)
                .add_directive("airsense_server=info".parse()?),
        )
        .init();

    let pipeline = Arc::new(Pipeline::new(config.pipeline));
    let producer = pipeline.start().await?;
    println!("Producer: {}", producer);
    println!("Subscribe: ws://{}", config.server.bind_addr);

    let server = TelemetryServer::new(config.server, Arc::clone(&pipeline));

    let stats_pipeline = Arc::clone(&pipeline);
    let stats_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = stats_pipeline.stats().await;
            tracing::info!(
                connections = stats.active_connections,
                sensors = stats.tracked_sensors,
                ingested = stats.counters.readings_ingested,
                rejected = stats.counters.readings_rejected,
                "Pipeline stats"
            );
        }
    });

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await;

    stats_task.abort();
    pipeline.shutdown().await?;
    result?;

    Ok(())
}
