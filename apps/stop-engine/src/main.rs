//! Stop Engine Binary
//!
//! Starts the stop-loss engine over the in-memory simulation adapters.
//! A live deployment replaces the adapter wiring in `build_adapters`
//! with real exchange and market-data transports.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stop-engine
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG_PATH`: Path to the YAML config file (default: config.yaml)
//! - `RUST_LOG`: Log filter override (default: from config)

use std::collections::HashMap;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use stop_engine::adapters::{SimExchange, SimMarketData};
use stop_engine::config::{Config, ProtectionPolicy, load_config};
use stop_engine::engine::StopLossEngine;
use stop_engine::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional; absence is not an error.
    let _ = dotenvy::dotenv();

    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = load_config(config_path.as_deref())?;

    init_telemetry(&config.observability);

    tracing::info!("Starting stop-loss engine");

    let policies = build_policies(&config)?;
    let (market_data, exchange) = build_adapters();

    let shutdown = CancellationToken::new();
    let engine = Arc::new(StopLossEngine::new(
        config.engine.clone(),
        policies,
        market_data,
        exchange,
        shutdown.clone(),
    ));

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run().await })
    };

    await_shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
    runner.await?;

    tracing::info!("Stop-loss engine stopped");
    Ok(())
}

/// Validate and convert all configured symbol policies.
fn build_policies(
    config: &Config,
) -> Result<HashMap<String, ProtectionPolicy>, Box<dyn std::error::Error>> {
    let mut policies = HashMap::new();
    for (symbol, policy_config) in &config.symbols {
        let policy = policy_config
            .to_policy()
            .map_err(|e| format!("symbol {symbol}: {e}"))?;
        tracing::info!(
            symbol = %symbol,
            timeframe = %policy.timeframe,
            bands = policy.ladder.len(),
            "Loaded symbol policy"
        );
        policies.insert(symbol.clone(), policy);
    }
    Ok(policies)
}

/// Build the port adapters the engine runs over.
fn build_adapters() -> (Arc<SimMarketData>, Arc<SimExchange>) {
    (Arc::new(SimMarketData::new()), Arc::new(SimExchange::new()))
}

/// Wait for SIGINT or SIGTERM.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
