//! Trading agent
//!
//! Wires the decision loop together: events feed the aggregator and the
//! asset registry, triggered assets are evaluated into decision cards,
//! TRADE verdicts go through the governor gate into the simulator, and the
//! periodic ticks manage exits, halts, daily rollover and snapshots.
//!
//! The governor mutex is the single mutation point for equity, exposure
//! and halt state. Store failures end the triggering operation but never
//! the task that ran it.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::queue::EvaluationQueue;
use crate::broadcast::{Broadcaster, MessageKind};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::{FeatureAggregator, RegimeFeatures};
use crate::filter::{DecisionCard, DecisionCardBuilder};
use crate::position::{check_exit, ExitReason, ExitSignal, Position};
use crate::risk::{Incident, IncidentCategory, RiskGovernor, RiskLimits, RiskState, Severity};
use crate::store::Store;
use crate::stream::{now_ms, AssetRegistry, AssetUpdate, Event};
use crate::trading::{ExecutionSimulator, ExecutionTelemetry, OrderStatus, SellOutcome};

/// Event-derived market state
pub struct MarketState {
    pub aggregator: FeatureAggregator,
    pub registry: AssetRegistry,
}

#[derive(Debug, Default)]
struct SessionStats {
    events: AtomicU64,
    rejected_events: AtomicU64,
    decisions: AtomicU64,
    trade_verdicts: AtomicU64,
    entries: AtomicU64,
    exits: AtomicU64,
    failed_orders: AtomicU64,
    store_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

/// End-of-session report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub starting_equity: f64,
    pub cash: f64,
    pub nav: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub unrealized_pnl: f64,
    pub events: u64,
    pub rejected_events: u64,
    pub decisions: u64,
    pub trade_verdicts: u64,
    pub entries: u64,
    pub exits: u64,
    pub failed_orders: u64,
    pub open_positions: usize,
    pub closed_positions: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub incidents: usize,
    pub store_failures: u64,
    pub halted: bool,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Session summary")?;
        writeln!(f, "  Equity:     {:.4} -> {:.4} NAV ({:.4} cash)", self.starting_equity, self.nav, self.cash)?;
        writeln!(f, "  P&L:        {:+.4} ({:+.2}%), unrealized {:+.4}", self.total_pnl, self.total_pnl_pct, self.unrealized_pnl)?;
        writeln!(f, "  Events:     {} ingested, {} rejected", self.events, self.rejected_events)?;
        writeln!(f, "  Decisions:  {} ({} TRADE)", self.decisions, self.trade_verdicts)?;
        writeln!(f, "  Orders:     {} entries, {} exits, {} failed", self.entries, self.exits, self.failed_orders)?;
        writeln!(f, "  Positions:  {} open, {} closed", self.open_positions, self.closed_positions)?;
        writeln!(f, "  Win rate:   {:.1}% ({}W/{}L)", self.win_rate, self.wins, self.losses)?;
        writeln!(f, "  Incidents:  {}", self.incidents)?;
        if self.store_failures > 0 {
            writeln!(f, "  Store failures: {}", self.store_failures)?;
        }
        write!(f, "  Status:     {}", if self.halted { "HALTED" } else { "ACTIVE" })
    }
}

/// Decision loop and its periodic tasks
pub struct TradingAgent {
    config: Config,
    market: RwLock<MarketState>,
    queue: EvaluationQueue,
    builder: DecisionCardBuilder,
    governor: Arc<Mutex<RiskGovernor>>,
    simulator: ExecutionSimulator,
    store: Arc<dyn Store>,
    broadcaster: Broadcaster,
    stats: SessionStats,
}

impl TradingAgent {
    pub fn new(config: Config, store: Arc<dyn Store>, broadcaster: Broadcaster) -> Self {
        let governor = Arc::new(Mutex::new(RiskGovernor::new(
            config.paper.starting_equity,
            RiskLimits::from(&config.risk),
            store.clone(),
            now_ms(),
        )));
        let builder = DecisionCardBuilder::new(
            config.filters.clone(),
            config.regime.clone(),
            config.risk.clone(),
            config.exits.clone(),
            store.clone(),
        );
        let simulator = ExecutionSimulator::new(
            config.paper.clone(),
            config.exits.clone(),
            governor.clone(),
            store.clone(),
        );
        let market = MarketState {
            aggregator: FeatureAggregator::new(),
            registry: AssetRegistry::new(config.evaluation.trigger_buy_count),
        };

        Self {
            config,
            market: RwLock::new(market),
            queue: EvaluationQueue::new(),
            builder,
            governor,
            simulator,
            store,
            broadcaster,
            stats: SessionStats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn pending_evaluations(&self) -> usize {
        self.queue.len()
    }

    /// Copy of the current risk state
    pub async fn risk_state(&self) -> RiskState {
        self.governor.lock().await.state().clone()
    }

    /// Fold an event into the market state. Returns true when it queued an
    /// evaluation.
    pub async fn ingest(&self, event: Event) -> Result<bool> {
        if let Err(e) = event.validate() {
            bump(&self.stats.rejected_events);
            return Err(e);
        }
        bump(&self.stats.events);

        let update = {
            let mut market = self.market.write().await;
            let update = market.registry.observe(&event);
            market.aggregator.record_event(&event);
            update
        };

        let queue = match update {
            AssetUpdate::ReachedBuyTrigger => true,
            AssetUpdate::Graduated => self.config.evaluation.evaluate_on_graduation,
            AssetUpdate::None => false,
        };
        if queue && self.queue.push(&event.asset_id) {
            debug!(asset = %event.asset_id, trigger = ?update, "Queued for evaluation");
            return Ok(true);
        }
        Ok(false)
    }

    /// Evaluate every queued asset in FIFO order. A drain already in
    /// progress makes this a no-op.
    pub async fn drain_queue(&self) -> usize {
        let Some(_guard) = self.queue.try_begin_drain() else {
            return 0;
        };

        let mut evaluated = 0;
        while let Some(asset_id) = self.queue.pop() {
            match self.evaluate_asset(&asset_id).await {
                Ok(_) => evaluated += 1,
                Err(e) => self.report_failure("evaluation", &asset_id, &e).await,
            }
        }
        evaluated
    }

    /// Build, persist and broadcast a decision card, executing it on TRADE
    pub async fn evaluate_asset(&self, asset_id: &str) -> Result<DecisionCard> {
        let now = now_ms();
        let open_positions = self.store.open_positions().await?;
        let risk_state = {
            let mut governor = self.governor.lock().await;
            if let Err(e) = governor.refresh_counters(now).await {
                warn!(asset = %asset_id, error = %e, "Risk counters not refreshed, evaluating on last state");
            }
            governor.state().clone()
        };

        let card = {
            let market = self.market.read().await;
            let info = market.registry.info(asset_id);
            self.builder
                .evaluate(&market.aggregator, &info, &risk_state, &open_positions)
                .await?
        };

        bump(&self.stats.decisions);
        self.broadcaster.publish(MessageKind::DecisionCard, &card);

        if card.is_trade() {
            bump(&self.stats.trade_verdicts);
            self.execute_entry(&card).await?;
        }
        Ok(card)
    }

    /// Gate and execute a TRADE card
    async fn execute_entry(&self, card: &DecisionCard) -> Result<Option<Position>> {
        let Some(plan) = card.execution_plan.as_ref() else {
            return Err(Error::Internal(format!("TRADE card {} has no execution plan", card.id)));
        };

        let gate = {
            let mut governor = self.governor.lock().await;
            governor.pre_trade_check(plan.order_size, now_ms()).await?
        };
        if !gate.allowed {
            info!(asset = %card.asset_id, decision = %card.id, reason = %gate.reason, "TRADE verdict blocked at the gate");
            self.broadcaster.publish(MessageKind::RiskUpdate, &gate);
            return Ok(None);
        }

        let outcome = self.simulator.simulate_buy(plan, &card.id).await?;
        self.record_telemetry(&outcome.telemetry).await;

        for order in &outcome.orders {
            if order.status == OrderStatus::Failed {
                bump(&self.stats.failed_orders);
            }
            self.broadcaster.publish(MessageKind::OrderUpdate, order);
        }
        if let Some(position) = &outcome.position {
            bump(&self.stats.entries);
            self.broadcaster.publish(MessageKind::PositionUpdate, position);
        }
        self.publish_risk().await;

        Ok(outcome.position)
    }

    async fn record_telemetry(&self, telemetry: &[ExecutionTelemetry]) {
        if telemetry.is_empty() {
            return;
        }
        let mut market = self.market.write().await;
        for t in telemetry {
            market.aggregator.record_latency(t.latency_ms);
            market.aggregator.record_attempt(t.success);
        }
    }

    /// Mark open positions to market and act on exit signals
    pub async fn monitor_positions(&self) -> Result<usize> {
        let positions = self.store.open_positions().await?;
        let mut exits = 0;

        for mut position in positions {
            let now = now_ms();
            let price = {
                let market = self.market.read().await;
                market.aggregator.last_price(&position.asset_id)
            };
            let Some(price) = price else {
                debug!(position = %position.id, asset = %position.asset_id, "No price for open position");
                continue;
            };

            position.mark_price(price, now);
            let Some(signal) = check_exit(&position, price, &self.config.exits, now) else {
                self.store.upsert_position(&position).await?;
                continue;
            };

            info!(
                position = %position.id,
                asset = %position.asset_id,
                reason = %signal.reason,
                sell_pct = signal.sell_pct,
                pnl_pct = signal.pnl_pct,
                "Exit signal: {}",
                signal.detail
            );

            let outcome = self
                .simulator
                .simulate_sell(position, &signal, price)
                .await?;
            if let Some(t) = outcome.telemetry() {
                self.record_telemetry(&[t]).await;
            }

            match outcome {
                SellOutcome::Filled { order, position, .. } => {
                    exits += 1;
                    bump(&self.stats.exits);
                    self.broadcaster.publish(MessageKind::OrderUpdate, &order);
                    self.broadcaster.publish(MessageKind::PositionUpdate, &position);
                }
                SellOutcome::Failed { order, position, .. } => {
                    // Left open; the next tick re-evaluates with a fresh attempt
                    bump(&self.stats.failed_orders);
                    self.broadcaster.publish(MessageKind::OrderUpdate, &order);
                    self.broadcaster.publish(MessageKind::PositionUpdate, &position);
                }
                SellOutcome::Duplicate { position } => {
                    debug!(position = %position.id, "Exit already in flight");
                }
            }
        }

        self.sync_unrealized().await?;
        Ok(exits)
    }

    /// Operator exit of a whole position at the last observed price.
    /// Works while halted; the kill switch only blocks entries.
    pub async fn close_position(&self, position_id: &str) -> Result<SellOutcome> {
        let position = self
            .store
            .position(position_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?;
        let price = {
            let market = self.market.read().await;
            market.aggregator.last_price(&position.asset_id)
        }
        .unwrap_or(position.current_price);

        let signal = ExitSignal {
            reason: ExitReason::Manual,
            sell_pct: 100.0,
            pnl_pct: position.pnl_pct(price),
            level_gain_pct: None,
            detail: "operator close".to_string(),
        };
        info!(position = %position.id, asset = %position.asset_id, price, "Manual close requested");

        let outcome = self.simulator.simulate_sell(position, &signal, price).await?;
        if let Some(t) = outcome.telemetry() {
            self.record_telemetry(&[t]).await;
        }
        match &outcome {
            SellOutcome::Filled { order, position, .. } => {
                bump(&self.stats.exits);
                self.broadcaster.publish(MessageKind::OrderUpdate, order);
                self.broadcaster.publish(MessageKind::PositionUpdate, position);
            }
            SellOutcome::Failed { order, .. } => {
                bump(&self.stats.failed_orders);
                self.broadcaster.publish(MessageKind::OrderUpdate, order);
            }
            SellOutcome::Duplicate { .. } => {}
        }
        self.publish_risk().await;
        Ok(outcome)
    }

    /// Push the mark-to-market of open positions into the governor
    async fn sync_unrealized(&self) -> Result<f64> {
        let unrealized: f64 = self
            .store
            .open_positions()
            .await?
            .iter()
            .map(|p| p.unrealized_pnl)
            .sum();
        self.governor.lock().await.update_unrealized(unrealized);
        Ok(unrealized)
    }

    /// Drawdown and loss-streak halt check
    pub async fn auto_halt_tick(&self) -> Result<Option<Incident>> {
        let now = now_ms();
        let incident = {
            let mut governor = self.governor.lock().await;
            governor.refresh_counters(now).await?;
            governor.run_auto_halt_checks(now)
        };
        if let Some(incident) = &incident {
            self.record_incident(incident).await?;
            self.publish_risk().await;
        }
        Ok(incident)
    }

    /// Roll the trading day and lift expired halts
    pub async fn daily_reset_tick(&self) -> Result<Option<Incident>> {
        let now = now_ms();
        let incident = {
            let mut governor = self.governor.lock().await;
            if governor.is_new_day(now) {
                governor.reset_daily_counters(now)
            } else {
                governor.resume_if_due(now)
            }
        };
        if let Some(incident) = &incident {
            self.record_incident(incident).await?;
            self.publish_risk().await;
        }
        Ok(incident)
    }

    /// Reload trade counters and loss streak from the store
    pub async fn risk_refresh_tick(&self) -> Result<()> {
        self.governor.lock().await.refresh_counters(now_ms()).await?;
        self.publish_risk().await;
        Ok(())
    }

    /// Broadcast the current market regime
    pub async fn regime_tick(&self) -> RegimeFeatures {
        let regime = {
            let market = self.market.read().await;
            market.aggregator.regime_features(&self.config.regime)
        };
        debug!(regime = %regime.regime, score = regime.score, "{}", regime.reason);
        self.broadcaster.publish(MessageKind::RegimeUpdate, &regime);
        regime
    }

    /// Mark to market and broadcast an equity tick
    pub async fn equity_tick(&self) -> Result<RiskState> {
        self.sync_unrealized().await?;
        let state = self.risk_state().await;
        self.broadcaster.publish(
            MessageKind::EquityTick,
            &serde_json::json!({
                "cash": state.equity,
                "nav": state.nav(),
                "exposure": state.current_exposure,
                "unrealizedPnl": state.unrealized_pnl,
                "todayPnlPct": state.today_pnl_pct,
                "todayDrawdownPct": state.today_drawdown_pct,
            }),
        );
        Ok(state)
    }

    /// Operator halt
    pub async fn activate_kill_switch(&self, reason: &str) -> Result<Incident> {
        let incident = self.governor.lock().await.activate_kill_switch(reason, now_ms(), None);
        self.record_incident(&incident).await?;
        self.publish_risk().await;
        Ok(incident)
    }

    /// Operator resume
    pub async fn deactivate_kill_switch(&self) -> Result<Option<Incident>> {
        let incident = self.governor.lock().await.deactivate_kill_switch(now_ms());
        if let Some(incident) = &incident {
            self.record_incident(incident).await?;
            self.publish_risk().await;
        }
        Ok(incident)
    }

    async fn record_incident(&self, incident: &Incident) -> Result<()> {
        self.broadcaster.publish(MessageKind::Incident, incident);
        self.store.insert_incident(incident).await
    }

    async fn publish_risk(&self) {
        let state = self.risk_state().await;
        self.broadcaster.publish(MessageKind::RiskUpdate, &state);
    }

    /// Log and surface a failed operation. The caller's task carries on.
    pub async fn report_failure(&self, operation: &str, subject: &str, err: &Error) {
        let (severity, category) = if err.is_persistence_failure() {
            bump(&self.stats.store_failures);
            (Severity::Critical, IncidentCategory::Persistence)
        } else {
            (Severity::Warning, IncidentCategory::System)
        };
        error!(operation, subject, error = %err, "Operation failed");

        let incident = Incident::new(
            severity,
            category,
            format!("{} failed for {}: {}", operation, subject, err),
            now_ms(),
        );
        self.broadcaster.publish(MessageKind::Incident, &incident);
        if let Err(e) = self.store.insert_incident(&incident).await {
            warn!(error = %e, "Incident could not be persisted");
        }
    }

    /// Session totals for the operator
    pub async fn session_summary(&self) -> Result<SessionSummary> {
        let state = self.risk_state().await;
        let open = self.store.open_positions().await?;
        let closed = self.store.closed_positions().await?;
        let incidents = self.store.recent_incidents(usize::MAX).await?.len();

        let wins = closed.iter().filter(|p| p.realized_pnl > 0.0).count();
        let losses = closed.len() - wins;
        let starting_equity = self.config.paper.starting_equity;
        let nav = state.nav();
        let total_pnl = nav - starting_equity;

        Ok(SessionSummary {
            starting_equity,
            cash: state.equity,
            nav,
            total_pnl,
            total_pnl_pct: if starting_equity > 0.0 { total_pnl / starting_equity * 100.0 } else { 0.0 },
            unrealized_pnl: state.unrealized_pnl,
            events: read(&self.stats.events),
            rejected_events: read(&self.stats.rejected_events),
            decisions: read(&self.stats.decisions),
            trade_verdicts: read(&self.stats.trade_verdicts),
            entries: read(&self.stats.entries),
            exits: read(&self.stats.exits),
            failed_orders: read(&self.stats.failed_orders),
            open_positions: open.len(),
            closed_positions: closed.len(),
            wins,
            losses,
            win_rate: if closed.is_empty() { 0.0 } else { wins as f64 / closed.len() as f64 * 100.0 },
            incidents,
            store_failures: read(&self.stats.store_failures),
            halted: state.is_halted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Verdict;
    use crate::position::PositionStatus;
    use crate::engine::Scheduler;
    use crate::store::testing::FaultyStore;
    use crate::store::MemoryStore;
    use crate::stream::{ChannelEventSource, EventKind};
    use std::time::Duration;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.paper.failure_rate = 0.0;
        config.paper.latency_ms = 0;
        config.paper.seed = Some(11);
        config
    }

    fn agent_with(store: Arc<dyn Store>) -> TradingAgent {
        TradingAgent::new(test_config(), store, Broadcaster::new())
    }

    const BASE_TS: i64 = 10_000_000;

    /// Busy market plus one organically bought token, "mint1"
    async fn feed_busy_market(agent: &TradingAgent) {
        let launch = Event::new(EventKind::Launch, "mint1", "dev", 0.0, BASE_TS).with_price(1e-5);
        feed_market(agent, launch).await;
    }

    async fn feed_market(agent: &TradingAgent, mint1_launch: Event) {
        let base = BASE_TS;
        for i in 0..12 {
            let asset = format!("other{}", i);
            agent.ingest(Event::new(EventKind::Launch, &asset, "c", 0.0, base + i)).await.unwrap();
            agent.ingest(Event::new(EventKind::Graduation, &asset, "p", 0.0, base + i)).await.unwrap();
        }
        for i in 0..36 {
            let asset = format!("other{}", i % 12);
            agent.ingest(Event::new(EventKind::Buy, &asset, "x", 8.0, base + 100 + i)).await.unwrap();
        }

        agent.ingest(mint1_launch).await.unwrap();
        agent.ingest(Event::new(EventKind::Buy, "mint1", "dev", 0.05, base + 10).with_price(1e-5)).await.unwrap();
        for i in 0..30 {
            let ts = base + 200_000 + i * 1_000;
            agent
                .ingest(Event::new(EventKind::Buy, "mint1", &format!("w{}", i), 0.2, ts).with_price(1.1e-5))
                .await
                .unwrap();
        }
        agent.ingest(Event::new(EventKind::Sell, "mint1", "w0", 0.1, base + 240_000).with_price(1.1e-5)).await.unwrap();
    }

    async fn price_tick(agent: &TradingAgent, price: f64) {
        agent
            .ingest(Event::new(EventKind::Sell, "mint1", "w1", 0.01, 10_250_000).with_price(price))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_event_is_rejected() {
        let agent = agent_with(Arc::new(MemoryStore::new()));
        let bad = Event::new(EventKind::Buy, "", "w", -1.0, 0);
        assert!(agent.ingest(bad).await.is_err());

        let summary = agent.session_summary().await.unwrap();
        assert_eq!(summary.rejected_events, 1);
        assert_eq!(summary.events, 0);
    }

    #[tokio::test]
    async fn test_buy_trigger_queues_once() {
        let agent = agent_with(Arc::new(MemoryStore::new()));
        let trigger = agent.config().evaluation.trigger_buy_count;

        let mut queued = 0;
        for i in 0..trigger * 2 {
            if agent
                .ingest(Event::new(EventKind::Buy, "mint9", &format!("w{}", i), 0.2, 1_000 + i as i64))
                .await
                .unwrap()
            {
                queued += 1;
            }
        }
        assert_eq!(queued, 1);
        assert_eq!(agent.pending_evaluations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trade_then_take_profit_then_stop_loss() {
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(store.clone());
        feed_busy_market(&agent).await;

        let evaluated = agent.drain_queue().await;
        assert_eq!(evaluated, 13);

        let open = store.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].asset_id, "mint1");

        let state = agent.risk_state().await;
        assert!(state.current_exposure > 0.0);
        assert_eq!(state.today_trade_count, 1);

        // +80%: first rung sells half
        price_tick(&agent, 2e-5).await;
        assert_eq!(agent.monitor_positions().await.unwrap(), 1);
        let position = store.position(&open[0].id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::PartiallyClosed);
        assert!(position.take_profit_levels[0].triggered);
        assert!(!position.take_profit_levels[1].triggered);

        // Collapse below the stop
        price_tick(&agent, 0.5e-5).await;
        assert_eq!(agent.monitor_positions().await.unwrap(), 1);
        let position = store.position(&open[0].id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(position.tokens_remaining, 0.0);

        let state = agent.risk_state().await;
        assert!(state.current_exposure.abs() < 1e-12);
        assert_eq!(state.open_position_count, 0);

        let summary = agent.session_summary().await.unwrap();
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.exits, 2);
        assert_eq!(summary.closed_positions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_switch_blocks_entries() {
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(store.clone());
        let incident = agent.activate_kill_switch("operator").await.unwrap();
        assert_eq!(incident.severity, Severity::Critical);

        feed_busy_market(&agent).await;
        agent.drain_queue().await;

        let cards = store.recent_decisions(100).await.unwrap();
        let mint1 = cards.iter().find(|c| c.asset_id == "mint1").unwrap();
        assert_eq!(mint1.verdict, Verdict::Skip);
        assert!(mint1.failed_checks().any(|c| c.name == "risk_limits"));
        assert!(store.open_positions().await.unwrap().is_empty());

        let resumed = agent.deactivate_kill_switch().await.unwrap();
        assert!(resumed.is_some());
        assert_eq!(store.incident_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mint_authority_skips_entry() {
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(store.clone());
        let launch = Event::new(EventKind::Launch, "mint1", "dev", 0.0, BASE_TS)
            .with_price(1e-5)
            .with_authorities(false, true);
        feed_market(&agent, launch).await;
        agent.drain_queue().await;

        let cards = store.recent_decisions(100).await.unwrap();
        let mint1 = cards.iter().find(|c| c.asset_id == "mint1").unwrap();
        assert_eq!(mint1.verdict, Verdict::Skip);
        let failed: Vec<&str> = mint1.failed_checks().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["token_permissions"]);
        assert!(store.open_positions().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_halt_leaves_open_position_to_scheduled_exits() {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(agent_with(store.clone()));
        feed_busy_market(&agent).await;
        agent.drain_queue().await;
        let open = store.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);

        agent.activate_kill_switch("operator").await.unwrap();
        let (tx, source) = ChannelEventSource::new(8);
        let scheduler = Scheduler::start(agent.clone(), Box::new(source));
        tx.send(Event::new(EventKind::Sell, "mint1", "w1", 0.01, 10_250_000).with_price(0.5e-5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        scheduler.shutdown().await;

        let position = store.position(&open[0].id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.exit_reason, Some(ExitReason::StopLoss));

        let state = agent.risk_state().await;
        assert!(state.is_halted);
        assert_eq!(state.open_position_count, 0);
        assert!(state.current_exposure.abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_close_while_halted() {
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(store.clone());
        feed_busy_market(&agent).await;
        agent.drain_queue().await;
        let open = store.open_positions().await.unwrap();
        agent.activate_kill_switch("operator").await.unwrap();

        let outcome = agent.close_position(&open[0].id).await.unwrap();
        let closed = match outcome {
            SellOutcome::Filled { position, .. } => position,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.exit_reason, Some(ExitReason::Manual));
        assert!(agent.risk_state().await.is_halted);

        let again = agent.close_position(&open[0].id).await.unwrap_err();
        assert!(matches!(again, Error::PositionNotFound(_)));
        assert!(matches!(agent.close_position("missing").await, Err(Error::PositionNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_and_halt_during_slow_entry() {
        let store = Arc::new(FaultyStore::new());
        let agent = Arc::new(agent_with(store.clone()));
        feed_busy_market(&agent).await;

        let (_tx, source) = ChannelEventSource::new(8);
        let scheduler = Scheduler::start(agent.clone(), Box::new(source));
        store.position_write_delay_ms.store(7_000, Ordering::Relaxed);

        let drain = tokio::spawn({
            let agent = agent.clone();
            async move { agent.drain_queue().await }
        });
        // Lands while the entry is still being written
        tokio::time::sleep(Duration::from_secs(1)).await;
        agent.activate_kill_switch("operator").await.unwrap();
        assert_eq!(drain.await.unwrap(), 13);

        tokio::time::sleep(Duration::from_secs(12)).await;
        scheduler.shutdown().await;

        assert_eq!(store.open_positions().await.unwrap().len(), 1);
        let state = agent.risk_state().await;
        assert!(state.is_halted);
        assert_eq!(state.open_position_count, 1);
        // Entry cost is exposure, not loss
        assert!(state.today_drawdown_pct > -0.2, "drawdown {}", state.today_drawdown_pct);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_drain() {
        let store = Arc::new(FaultyStore::new());
        store.fail_decisions.store(true, Ordering::Relaxed);
        let agent = agent_with(store.clone());

        for asset in ["a", "b"] {
            agent.ingest(Event::new(EventKind::Graduation, asset, "p", 0.0, 1_000)).await.unwrap();
        }
        assert_eq!(agent.pending_evaluations(), 2);

        assert_eq!(agent.drain_queue().await, 0);
        assert_eq!(agent.pending_evaluations(), 0);

        let summary = agent.session_summary().await.unwrap();
        assert_eq!(summary.store_failures, 2);
        assert_eq!(summary.incidents, 2);

        store.fail_decisions.store(false, Ordering::Relaxed);
        agent.ingest(Event::new(EventKind::Graduation, "c", "p", 0.0, 2_000)).await.unwrap();
        assert_eq!(agent.drain_queue().await, 1);
    }

    #[tokio::test]
    async fn test_regime_and_equity_ticks_broadcast() {
        let agent = agent_with(Arc::new(MemoryStore::new()));
        let mut rx = agent.broadcaster().subscribe();

        let regime = agent.regime_tick().await;
        assert_eq!(regime.score, 0);
        let state = agent.equity_tick().await.unwrap();
        assert_eq!(state.equity, 10.0);

        assert_eq!(rx.recv().await.unwrap().kind, MessageKind::RegimeUpdate);
        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.kind, MessageKind::EquityTick);
        assert_eq!(tick.payload["nav"], 10.0);
    }

    #[tokio::test]
    async fn test_daily_tick_without_rollover_is_quiet() {
        let agent = agent_with(Arc::new(MemoryStore::new()));
        assert!(agent.daily_reset_tick().await.unwrap().is_none());
        assert!(agent.auto_halt_tick().await.unwrap().is_none());
    }
}
