//! Market event ingestion
//!
//! Event contract, pluggable sources, and the asset registry that turns
//! the raw stream into asset descriptors.

pub mod event;
pub mod registry;
pub mod source;
pub mod synthetic;

pub use event::{now_ms, AssetInfo, Event, EventKind};
pub use registry::{AssetRegistry, AssetUpdate};
pub use source::{ChannelEventSource, EventSource};
pub use synthetic::{SyntheticEventSource, SyntheticSourceConfig};
