//! Replug Library
//!
//! Auto-reconnecting USB serial console: device discovery by selector,
//! presence watching, and a terminal relay that survives replug cycles.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::device::DeviceDescriptor;
pub use crate::core::selector::{MatchOutcome, Selector};
pub use crate::core::session::{SessionController, SessionOptions, SessionState};
pub use crate::core::watcher::{PresenceWatcher, WatchOutcome};
pub use crate::domain::config::ReplugConfig;
pub use crate::domain::error::{ReplugError, ReplugResult};
pub use crate::infrastructure::bridge::{BridgeOutcome, TerminalBridge};
