//! Order model and paper execution

pub mod order;
pub mod simulator;

pub use order::{idempotency_key, Order, OrderSide, OrderSource, OrderStatus};
pub use simulator::{BuyOutcome, ExecutionSimulator, ExecutionTelemetry, SellOutcome};
