//! Entry filtering
//!
//! Fourteen guarded checks feed a single AND-verdict that is recorded as a
//! decision card, with an execution plan and risk impact attached to trades.

pub mod checks;
pub mod decision;
pub mod types;

pub use checks::{run_filters, FilterContext, FILTERS};
pub use decision::{DecisionCardBuilder, LARGE_ORDER_THRESHOLD};
pub use types::{CheckStatus, DecisionCard, ExecutionPlan, FilterCheck, RiskImpact, Route, Verdict};
