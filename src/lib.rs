//! Pump.fun Trading Agent Library
//!
//! Decision and risk core for an autonomous pump.fun trading agent: windowed
//! market features, an explainable filter pipeline, a risk governor with a
//! kill switch, a deterministic exit lifecycle and a paper execution model.

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod filter;
pub mod position;
pub mod risk;
pub mod store;
pub mod stream;
pub mod trading;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
