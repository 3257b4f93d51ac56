//! CLI command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::broadcast::{Broadcaster, MessageKind};
use crate::config::Config;
use crate::engine::{Scheduler, TradingAgent};
use crate::store::{MemoryStore, Store};
use crate::stream::SyntheticEventSource;

/// Paper trade against the synthetic feed until Ctrl-C or the duration ends
pub async fn run(config: &Config, duration_secs: Option<u64>, seed: Option<u64>) -> Result<()> {
    let mut config = config.clone();
    if let Some(seed) = seed {
        config.paper.seed = Some(seed);
        config.source.seed = Some(seed.wrapping_add(1));
    }

    info!("Starting paper trading agent...");
    info!(
        "Equity: {}, per-trade risk: {}%, max exposure: {}%",
        config.paper.starting_equity, config.risk.max_risk_per_trade_pct, config.risk.max_exposure_pct
    );

    let store = Arc::new(MemoryStore::new());
    let broadcaster = Broadcaster::new();
    let agent = Arc::new(TradingAgent::new(config.clone(), store.clone(), broadcaster.clone()));
    let source = SyntheticEventSource::new(config.source.clone());

    broadcaster.publish(
        MessageKind::SystemStatus,
        &serde_json::json!({ "status": "RUNNING", "mode": "PAPER" }),
    );
    let scheduler = Scheduler::start(agent.clone(), Box::new(source));

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "Session duration elapsed");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            info!("Received shutdown signal");
        }
    }

    scheduler.shutdown().await;
    broadcaster.publish(
        MessageKind::SystemStatus,
        &serde_json::json!({ "status": "STOPPED" }),
    );

    if let Some(path) = &config.store.snapshot_path {
        if let Err(e) = store.save_snapshot(path).await {
            warn!("Failed to save store snapshot to {}: {}", path, e);
        }
    }

    let summary = agent.session_summary().await.context("Failed to build session summary")?;
    println!("\n{}\n", summary);
    Ok(())
}

/// Show the last saved session
pub async fn status(config: &Config) -> Result<()> {
    let Some(path) = &config.store.snapshot_path else {
        println!("No store.snapshot_path configured; nothing to show.");
        return Ok(());
    };
    if !std::path::Path::new(path).exists() {
        println!("No snapshot at {} yet. Run `agent run` first.", path);
        return Ok(());
    }

    let store = MemoryStore::load_snapshot(path)
        .await
        .with_context(|| format!("Failed to load snapshot {}", path))?;

    let open = store.open_positions().await?;
    let closed = store.closed_positions().await?;
    let realized: f64 = closed.iter().map(|p| p.realized_pnl).sum();
    let wins = closed.iter().filter(|p| p.realized_pnl > 0.0).count();

    println!("\n=== AGENT STATUS ({}) ===\n", path);
    println!("Decisions: {}", store.decision_count());
    println!("Orders: {}", store.order_count());
    println!("Closed positions: {} ({} wins), realized P&L {:+.4}", closed.len(), wins, realized);

    println!("\n=== OPEN POSITIONS ===\n");
    if open.is_empty() {
        println!("No open positions.");
    }
    for p in &open {
        println!(
            "{} {:?} entry {:.3e} last {:.3e} P&L {:+.1}% remaining {:.2}",
            p.asset_id,
            p.status,
            p.entry_price,
            p.current_price,
            p.pnl_pct(p.current_price),
            p.tokens_remaining
        );
    }

    println!("\n=== RECENT INCIDENTS ===\n");
    for incident in store.recent_incidents(10).await? {
        println!("[{:?}] {:?}: {}", incident.severity, incident.category, incident.message);
    }

    Ok(())
}

/// Show the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.display_summary());
    Ok(())
}

/// Print conservative-policy issues. Fails when any are found.
pub fn check_config(config: &Config) -> Result<()> {
    let issues = config.issues();
    if issues.is_empty() {
        println!("Configuration OK: no issues found.");
        return Ok(());
    }

    println!("Configuration issues:");
    for issue in &issues {
        println!("  - {}", issue);
    }
    anyhow::bail!("{} configuration issue(s) found", issues.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_config_default_passes() {
        assert!(check_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_check_config_flags_aggressive_risk() {
        let mut config = Config::default();
        config.risk.max_risk_per_trade_pct = 2.0;
        assert!(check_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_status_reads_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        MemoryStore::new().save_snapshot(&path).await.unwrap();

        let mut config = Config::default();
        config.store.snapshot_path = Some(path.to_string_lossy().into_owned());
        assert!(status(&config).await.is_ok());
    }
}
