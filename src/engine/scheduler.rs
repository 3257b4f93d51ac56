//! Task scheduler
//!
//! Spawns the ingest loop, the evaluation drain and one loop per periodic
//! tick. Every task watches the same cancellation token; shutdown cancels
//! it and joins the handles.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::agent::TradingAgent;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::stream::EventSource;

/// Periodic work items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    PositionMonitor,
    AutoHalt,
    RegimeBroadcast,
    EquitySnapshot,
    DailyReset,
    RiskRefresh,
}

impl Tick {
    pub const ALL: [Tick; 6] = [
        Tick::PositionMonitor,
        Tick::AutoHalt,
        Tick::RegimeBroadcast,
        Tick::EquitySnapshot,
        Tick::DailyReset,
        Tick::RiskRefresh,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tick::PositionMonitor => "position_monitor",
            Tick::AutoHalt => "auto_halt",
            Tick::RegimeBroadcast => "regime_broadcast",
            Tick::EquitySnapshot => "equity_snapshot",
            Tick::DailyReset => "daily_reset",
            Tick::RiskRefresh => "risk_refresh",
        }
    }

    pub fn period(&self, config: &SchedulerConfig) -> Duration {
        let secs = match self {
            Tick::PositionMonitor => config.position_monitor_secs,
            Tick::AutoHalt => config.auto_halt_secs,
            Tick::RegimeBroadcast => config.regime_broadcast_secs,
            Tick::EquitySnapshot => config.equity_snapshot_secs,
            Tick::DailyReset => config.daily_reset_secs,
            Tick::RiskRefresh => config.risk_refresh_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// Run one tick against the agent
pub async fn run_tick(agent: &TradingAgent, tick: Tick) -> Result<()> {
    match tick {
        Tick::PositionMonitor => {
            let exits = agent.monitor_positions().await?;
            if exits > 0 {
                debug!(exits, "Position monitor executed exits");
            }
        }
        Tick::AutoHalt => {
            agent.auto_halt_tick().await?;
        }
        Tick::RegimeBroadcast => {
            agent.regime_tick().await;
        }
        Tick::EquitySnapshot => {
            agent.equity_tick().await?;
        }
        Tick::DailyReset => {
            agent.daily_reset_tick().await?;
        }
        Tick::RiskRefresh => {
            agent.risk_refresh_tick().await?;
        }
    }
    Ok(())
}

/// Handle to the running task set
pub struct Scheduler {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn every task. Must be called inside a tokio runtime.
    pub fn start(agent: Arc<TradingAgent>, source: Box<dyn EventSource>) -> Self {
        let token = CancellationToken::new();
        let wake = Arc::new(Notify::new());
        let mut handles = Vec::with_capacity(Tick::ALL.len() + 2);

        handles.push(tokio::spawn(ingest_loop(agent.clone(), source, wake.clone(), token.clone())));
        handles.push(tokio::spawn(drain_loop(agent.clone(), wake, token.clone())));

        for tick in Tick::ALL {
            let period = tick.period(&agent.config().scheduler);
            handles.push(tokio::spawn(periodic_loop(agent.clone(), tick, period, token.clone())));
        }

        info!(tasks = handles.len(), "Scheduler started");
        Self { token, handles }
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn ingest_loop(
    agent: Arc<TradingAgent>,
    mut source: Box<dyn EventSource>,
    wake: Arc<Notify>,
    token: CancellationToken,
) {
    info!(source = source.name(), "Event ingest started");
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = source.next_event() => event,
        };
        let Some(event) = event else {
            info!(source = source.name(), "Event source exhausted");
            break;
        };

        match agent.ingest(event).await {
            Ok(true) => wake.notify_one(),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Event rejected"),
        }
    }
}

async fn drain_loop(agent: Arc<TradingAgent>, wake: Arc<Notify>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = wake.notified() => {
                let evaluated = agent.drain_queue().await;
                if evaluated > 0 {
                    debug!(evaluated, "Evaluation queue drained");
                }
            }
        }
    }
}

async fn periodic_loop(agent: Arc<TradingAgent>, tick: Tick, period: Duration, token: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = run_tick(&agent, tick).await {
                    agent.report_failure(tick.name(), "tick", &e).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{Broadcaster, MessageKind};
    use crate::config::Config;
    use crate::store::{MemoryStore, Store};
    use crate::stream::{ChannelEventSource, Event, EventKind, SyntheticEventSource, SyntheticSourceConfig};

    fn agent(store: Arc<MemoryStore>) -> Arc<TradingAgent> {
        let mut config = Config::default();
        config.paper.seed = Some(3);
        Arc::new(TradingAgent::new(config, store, Broadcaster::new()))
    }

    #[test]
    fn test_default_periods() {
        let config = SchedulerConfig::default();
        let periods: Vec<u64> = Tick::ALL.iter().map(|t| t.period(&config).as_secs()).collect();
        assert_eq!(periods, vec![5, 10, 15, 30, 60, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_events_are_ingested_and_evaluated() {
        let store = Arc::new(MemoryStore::new());
        let agent = agent(store.clone());
        let (tx, source) = ChannelEventSource::new(64);
        let scheduler = Scheduler::start(agent.clone(), Box::new(source));

        tx.send(Event::new(EventKind::Launch, "mint1", "dev", 0.0, 1_000)).await.unwrap();
        tx.send(Event::new(EventKind::Graduation, "mint1", "pool", 0.0, 2_000)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.shutdown().await;

        let summary = agent.session_summary().await.unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(store.recent_decisions(10).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks_fire() {
        let store = Arc::new(MemoryStore::new());
        let agent = agent(store);
        let mut rx = agent.broadcaster().subscribe();
        let (_tx, source) = ChannelEventSource::new(8);
        let scheduler = Scheduler::start(agent.clone(), Box::new(source));

        tokio::time::sleep(Duration::from_secs(31)).await;
        scheduler.shutdown().await;

        let mut kinds = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            kinds.push(msg.kind);
        }
        assert!(kinds.contains(&MessageKind::RegimeUpdate));
        assert!(kinds.contains(&MessageKind::EquityTick));
        assert!(kinds.contains(&MessageKind::RiskUpdate));
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_session_runs_to_completion() {
        let store = Arc::new(MemoryStore::new());
        let agent = agent(store.clone());
        let source = SyntheticEventSource::new(SyntheticSourceConfig {
            seed: Some(5),
            max_events: Some(2_000),
            ..Default::default()
        });
        let scheduler = Scheduler::start(agent.clone(), Box::new(source));

        tokio::time::sleep(Duration::from_secs(200)).await;
        scheduler.shutdown().await;

        let summary = agent.session_summary().await.unwrap();
        assert_eq!(summary.events + summary.rejected_events, 2_000);
        assert!(summary.decisions > 0);
        assert_eq!(summary.decisions as usize, store.decision_count());
    }
}
