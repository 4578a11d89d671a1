use serde::{Deserialize, Serialize};

/// Replug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplugConfig {
    /// Monitor loop settings
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Serial line settings
    #[serde(default)]
    pub serial: SerialSettings,
}

/// Settings for the wait/connect cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Presence poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Echo keystrokes locally
    #[serde(default)]
    pub echo: bool,
    /// Letter of the quit control sequence (Control-<letter>)
    #[serde(default = "default_exit_char")]
    pub exit_char: char,
    /// What to do when several devices match at startup
    #[serde(default)]
    pub startup_ambiguous: AmbiguousPolicy,
}

/// Serial line settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: ParityConfig,
    #[serde(default = "default_flow_control")]
    pub flow_control: FlowControlConfig,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    None,
    Odd,
    Even,
}

/// Flow control configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    None,
    Hardware,
    Software,
}

/// Policy for an ambiguous match during startup resolution.
///
/// Mid-wait ambiguity always keeps waiting; this only governs the case
/// where the user asked to connect right now and several devices match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguousPolicy {
    /// Report the ambiguity and exit non-zero
    Fail,
    /// Treat the ambiguity as not-yet-found and keep waiting
    Wait,
}

// Default value functions
fn default_poll_interval_ms() -> u64 {
    500
}

fn default_exit_char() -> char {
    'X'
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_parity() -> ParityConfig {
    ParityConfig::None
}

fn default_flow_control() -> FlowControlConfig {
    FlowControlConfig::None
}

impl Default for ReplugConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            serial: SerialSettings::default(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            echo: false,
            exit_char: default_exit_char(),
            startup_ambiguous: AmbiguousPolicy::default(),
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            flow_control: default_flow_control(),
        }
    }
}

impl Default for AmbiguousPolicy {
    fn default() -> Self {
        Self::Fail
    }
}
