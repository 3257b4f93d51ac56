//! Paper execution simulator
//!
//! Models the order lifecycle with jittered latency, a configurable failure
//! rate and slippage degraded against the estimate. Latency is an async
//! sleep; the governor lock is taken only after it, so simulated orders
//! never stall the periodic tasks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::order::{Order, OrderSide, OrderSource};
use crate::config::{ExitConfig, PaperConfig};
use crate::error::{Error, Result};
use crate::filter::ExecutionPlan;
use crate::position::{ExitSignal, Position, PositionStatus};
use crate::risk::RiskGovernor;
use crate::store::{InsertOutcome, Store};
use crate::stream::now_ms;

/// Probability that a fill is complete
const FULL_FILL_PROBABILITY: f64 = 0.9;

/// Latency and outcome of one simulated submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionTelemetry {
    pub latency_ms: f64,
    pub success: bool,
}

/// Result of an entry
#[derive(Debug, Clone)]
pub struct BuyOutcome {
    /// Every order written for the plan, in slice order
    pub orders: Vec<Order>,
    /// Created when at least one slice filled
    pub position: Option<Position>,
    pub duplicates: u32,
    pub telemetry: Vec<ExecutionTelemetry>,
}

impl BuyOutcome {
    pub fn filled(&self) -> bool {
        self.position.is_some()
    }
}

/// Result of an exit
#[derive(Debug, Clone)]
pub enum SellOutcome {
    Filled {
        order: Order,
        position: Position,
        net_proceeds: f64,
        telemetry: ExecutionTelemetry,
    },
    /// Order failed; the position only records the attempt
    Failed {
        order: Order,
        position: Position,
        telemetry: ExecutionTelemetry,
    },
    /// Same sell already submitted
    Duplicate { position: Position },
}

impl SellOutcome {
    pub fn position(&self) -> &Position {
        match self {
            SellOutcome::Filled { position, .. }
            | SellOutcome::Failed { position, .. }
            | SellOutcome::Duplicate { position } => position,
        }
    }

    pub fn telemetry(&self) -> Option<ExecutionTelemetry> {
        match self {
            SellOutcome::Filled { telemetry, .. } | SellOutcome::Failed { telemetry, .. } => Some(*telemetry),
            SellOutcome::Duplicate { .. } => None,
        }
    }
}

/// Paper trading execution
pub struct ExecutionSimulator {
    paper: PaperConfig,
    exits: ExitConfig,
    rng: StdMutex<StdRng>,
    governor: Arc<Mutex<RiskGovernor>>,
    store: Arc<dyn Store>,
}

impl ExecutionSimulator {
    pub fn new(
        paper: PaperConfig,
        exits: ExitConfig,
        governor: Arc<Mutex<RiskGovernor>>,
        store: Arc<dyn Store>,
    ) -> Self {
        let rng = match paper.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            paper,
            exits,
            rng: StdMutex::new(rng),
            governor,
            store,
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    /// Sleep a jittered latency, returning the simulated milliseconds
    async fn simulate_latency(&self) -> f64 {
        let factor = self.with_rng(|rng| rng.gen_range(0.5..1.5));
        let latency_ms = self.paper.latency_ms as f64 * factor;
        tokio::time::sleep(Duration::from_secs_f64(latency_ms / 1000.0)).await;
        latency_ms
    }

    fn draw_failure(&self, probability: f64) -> bool {
        let p = probability.clamp(0.0, 1.0);
        self.with_rng(|rng| rng.gen_bool(p))
    }

    /// Realized slippage: estimate x multiplier x [0.8, 1.2). A pessimistic
    /// model (multiplier >= 1) never fills better than the estimate.
    fn realized_slippage_bps(&self, estimate_bps: f64) -> f64 {
        let jitter = self.with_rng(|rng| rng.gen_range(0.8..1.2));
        let realized = estimate_bps * self.paper.slippage_multiplier * jitter;
        if self.paper.slippage_multiplier >= 1.0 {
            realized.max(estimate_bps)
        } else {
            realized
        }
    }

    fn fill_ratio(&self) -> f64 {
        self.with_rng(|rng| {
            if rng.gen_bool(FULL_FILL_PROBABILITY) {
                1.0
            } else {
                rng.gen_range(0.5..1.0)
            }
        })
    }

    fn fee(&self, notional: f64) -> f64 {
        notional * self.paper.fee_pct / 100.0
    }

    /// Execute an entry plan, one order per slice
    pub async fn simulate_buy(&self, plan: &ExecutionPlan, decision_id: &str) -> Result<BuyOutcome> {
        let mut outcome = BuyOutcome {
            orders: Vec::new(),
            position: None,
            duplicates: 0,
            telemetry: Vec::new(),
        };

        let mut filled_cost = 0.0;
        let mut filled_fee = 0.0;
        let mut filled_tokens = 0.0;

        for (slice_idx, slice) in plan.slices.iter().copied().enumerate() {
            let now = now_ms();
            let origin = format!("{}:{}", decision_id, slice_idx);
            let mut order = Order::new(
                OrderSide::Buy,
                OrderSource::Entry,
                &plan.asset_id,
                &origin,
                slice,
                plan.reference_price,
                now,
            )
            .with_decision(decision_id);

            if self.store.insert_order(&order).await? == InsertOutcome::Duplicate {
                warn!(asset = %plan.asset_id, decision = %decision_id, slice = slice_idx, "Buy slice already submitted");
                outcome.duplicates += 1;
                continue;
            }
            order.submitted(now_ms());
            self.store.upsert_order(&order).await?;

            let latency_ms = self.simulate_latency().await;

            if self.draw_failure(self.paper.failure_rate) {
                order.fail("simulated execution failure", now_ms());
                self.store.upsert_order(&order).await?;
                info!(asset = %plan.asset_id, slice = slice_idx, latency_ms, "Paper buy FAILED");
                outcome.telemetry.push(ExecutionTelemetry { latency_ms, success: false });
                outcome.orders.push(order);
                break;
            }

            let slippage_bps = self.realized_slippage_bps(plan.estimated_slippage_bps);
            let cost = slice * self.fill_ratio();
            let price = plan.reference_price * (1.0 + slippage_bps / 10_000.0);
            let fee = self.fee(cost);

            order.confirm(cost, price, slippage_bps, fee, now_ms());
            outcome.telemetry.push(ExecutionTelemetry { latency_ms, success: true });
            debug!(asset = %plan.asset_id, slice = slice_idx, cost, price, slippage_bps, "Paper buy slice filled");

            filled_cost += cost;
            filled_fee += fee;
            filled_tokens += cost / price;
            outcome.orders.push(order);
        }

        if filled_tokens <= 0.0 {
            return Ok(outcome);
        }

        let now = now_ms();
        let entry_price = filled_cost / filled_tokens;
        let position = Position::open(
            &plan.asset_id,
            entry_price,
            filled_cost,
            filled_fee,
            filled_tokens,
            &self.exits,
            Some(decision_id.to_string()),
            now,
        );

        {
            // A counter refresh holds this lock while reading the store, so it
            // sees the position and the debited cash together or neither
            let mut governor = self.governor.lock().await;
            if let Err(e) = self.store.upsert_position(&position).await {
                for order in outcome.orders.iter_mut().filter(|o| o.executed_price.is_some()) {
                    self.abandon(order, &e).await;
                }
                return Err(e);
            }
            governor.record_buy(filled_cost, filled_fee);

            for order in outcome.orders.iter_mut().filter(|o| o.executed_price.is_some()) {
                order.position_id = Some(position.id.clone());
                self.store.upsert_order(order).await?;
            }
        }

        info!(
            asset = %plan.asset_id,
            position = %position.id,
            cost = filled_cost,
            fee = filled_fee,
            entry_price,
            "Paper buy CONFIRMED"
        );

        outcome.position = Some(position);
        Ok(outcome)
    }

    /// Mark an order failed after its fill could not be booked
    async fn abandon(&self, order: &mut Order, cause: &Error) {
        order.fail(format!("fill not booked: {}", cause), now_ms());
        if let Err(e) = self.store.upsert_order(order).await {
            warn!(order = %order.id, error = %e, "Failed to mark order abandoned");
        }
    }

    /// Sell `signal.sell_pct` of the remaining tokens at `current_price`
    pub async fn simulate_sell(
        &self,
        mut position: Position,
        signal: &ExitSignal,
        current_price: f64,
    ) -> Result<SellOutcome> {
        let reason = signal.reason;
        let tokens = position.tokens_remaining * (signal.sell_pct.clamp(0.0, 100.0) / 100.0);

        // The attempt is stored before its key is reserved, so a lost write
        // later on never leaves the next tick rebuilding a used key
        position.sell_attempts += 1;
        self.store.upsert_position(&position).await?;

        let origin = format!("{}:{}:{}", position.id, reason, position.sell_attempts);
        let mut order = Order::new(
            OrderSide::Sell,
            OrderSource::from(reason),
            &position.asset_id,
            &origin,
            tokens,
            current_price,
            now_ms(),
        )
        .with_position(&position.id);
        order.retry_count = position.sell_attempts - 1;
        if let Some(decision_id) = &position.decision_id {
            order.decision_id = Some(decision_id.clone());
        }

        if self.store.insert_order(&order).await? == InsertOutcome::Duplicate {
            warn!(position = %position.id, %reason, "Sell already submitted");
            return Ok(SellOutcome::Duplicate { position });
        }
        order.submitted(now_ms());
        self.store.upsert_order(&order).await?;

        let latency_ms = self.simulate_latency().await;

        if self.draw_failure(self.paper.failure_rate / 2.0) {
            order.fail("simulated execution failure", now_ms());
            self.store.upsert_order(&order).await?;
            warn!(position = %position.id, %reason, latency_ms, "Paper sell FAILED");
            return Ok(SellOutcome::Failed {
                order,
                position,
                telemetry: ExecutionTelemetry { latency_ms, success: false },
            });
        }

        let slippage_bps = self.paper.sell_slippage_bps * self.paper.slippage_multiplier * self.with_rng(|rng| rng.gen_range(0.8..1.2));
        let price = (current_price * (1.0 - slippage_bps / 10_000.0)).max(0.0);
        let gross = tokens * price;
        let fee = self.fee(gross);
        let net_proceeds = gross - fee;
        let now = now_ms();

        order.confirm(tokens, price, slippage_bps, fee, now);

        {
            let mut governor = self.governor.lock().await;
            let mut sold = position.clone();
            let released = sold.apply_sell(tokens, net_proceeds, reason, now);
            if let Some(gain_pct) = signal.level_gain_pct {
                sold.mark_level_triggered(gain_pct);
            }
            if let Err(e) = self.store.upsert_position(&sold).await {
                self.abandon(&mut order, &e).await;
                return Err(e);
            }
            governor.record_sell(released, net_proceeds, sold.status == PositionStatus::Closed);
            position = sold;
            self.store.upsert_order(&order).await?;
        }

        info!(
            position = %position.id,
            asset = %position.asset_id,
            %reason,
            tokens,
            net_proceeds,
            status = ?position.status,
            realized_pnl = position.realized_pnl,
            "Paper sell CONFIRMED"
        );

        Ok(SellOutcome::Filled {
            order,
            position,
            net_proceeds,
            telemetry: ExecutionTelemetry { latency_ms, success: true },
        })
    }
}
