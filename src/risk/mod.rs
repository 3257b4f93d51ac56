//! Portfolio risk: the governor, its gate and incident records

pub mod governor;
pub mod incident;

pub use governor::{GateCondition, PreTradeCheck, RiskGovernor, RiskLimits, RiskState, DRAWDOWN_RESUME_MS};
pub use incident::{Incident, IncidentCategory, Severity};
