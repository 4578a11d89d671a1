use clap::{ArgGroup, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::selector::Selector;

/// Command line arguments for replug
#[derive(Parser, Debug)]
#[command(
    name = "replug",
    version = env!("CARGO_PKG_VERSION"),
    about = "Serial console for USB devices that survives replugging",
    long_about = "Connects to a USB serial device, relays its output to the terminal, and goes back to waiting whenever the device disconnects, reconnecting as soon as it shows up again.",
    after_help = "Press Control-X to quit an active session (Control-Y with -y)."
)]
#[command(group(ArgGroup::new("selection").args(["serial", "vendor", "port"])))]
pub struct Args {
    /// List matching USB Serial devices and exit
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Connect to the device whose serial number starts with this prefix
    #[arg(short = 's', long, value_name = "SERIAL")]
    pub serial: Option<String>,

    /// Connect to the device whose vendor name starts with this prefix
    #[arg(short = 'n', long, value_name = "VENDOR")]
    pub vendor: Option<String>,

    /// Connect to the device whose path contains this substring
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<String>,

    /// Baud rate (default 115200)
    #[arg(short = 'b', long)]
    pub baud: Option<u32>,

    /// Echo keystrokes locally
    #[arg(short = 'e', long)]
    pub echo: bool,

    /// Use Control-Y to exit rather than Control-X
    #[arg(short = 'y')]
    pub ctrl_y_exit: bool,

    /// Log the session to a file
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format for --list
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    /// The selector built from whichever selection flag was given.
    pub fn selector(&self) -> Option<Selector> {
        if let Some(serial) = &self.serial {
            return Some(Selector::SerialNumber(serial.clone()));
        }
        if let Some(vendor) = &self.vendor {
            return Some(Selector::VendorName(vendor.clone()));
        }
        self.port.clone().map(Selector::DevicePath)
    }
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Text
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
