//! Agent orchestration: the evaluation queue, the agent that owns the
//! decision loop, and the scheduler that drives it.

pub mod agent;
pub mod queue;
pub mod scheduler;

pub use agent::{MarketState, SessionSummary, TradingAgent};
pub use queue::EvaluationQueue;
pub use scheduler::{run_tick, Scheduler, Tick};
