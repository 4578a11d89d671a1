// Core module - Device discovery and session logic
pub mod device;
pub mod selector;
pub mod session;
pub mod watcher;

pub use device::DeviceDescriptor;
pub use selector::{MatchOutcome, Selector};
pub use session::{SessionController, SessionOptions, SessionState};
pub use watcher::{PresenceWatcher, WatchOutcome};
