// Domain module - Shared types
pub mod config;
pub mod error;

pub use config::ReplugConfig;
pub use error::{ReplugError, ReplugResult};
