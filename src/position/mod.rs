//! Position model and exit evaluation

pub mod exit;
pub mod types;

pub use exit::{check_exit, ExitSignal};
pub use types::{ExitReason, Position, PositionStatus, TakeProfitLevel, DUST_FRACTION};
