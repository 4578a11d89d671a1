// Infrastructure module - OS-facing adapters
pub mod bridge;
pub mod config;
pub mod enumerate;
pub mod input;
pub mod logging;
pub mod serial;
pub mod terminal;
pub mod transcript;
