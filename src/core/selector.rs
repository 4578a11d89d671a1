use crate::core::device::DeviceDescriptor;

/// User-supplied matching criterion, fixed for the process lifetime.
///
/// Serial and vendor patterns are case-insensitive prefixes so partial
/// identifiers ("STM", "Teensy") work; the path pattern is a substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Serial number prefix
    SerialNumber(String),
    /// Vendor name prefix
    VendorName(String),
    /// Device path substring
    DevicePath(String),
}

impl Selector {
    /// Qualifier fragment for the waiting status line.
    pub fn qualifiers(&self) -> String {
        match self {
            Selector::SerialNumber(pattern) => format!(" with serial '{}'", pattern),
            Selector::VendorName(pattern) => format!(" with vendor '{}'", pattern),
            Selector::DevicePath(_) => String::new(),
        }
    }
}

/// Result of resolving a selector against one enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Exactly one device satisfies the selector
    Match(DeviceDescriptor),
    /// No device satisfies the selector
    NoMatch,
    /// More than one device satisfies the selector
    Ambiguous(Vec<DeviceDescriptor>),
}

/// Whether one descriptor satisfies the selector.
pub fn matches(device: &DeviceDescriptor, selector: &Selector) -> bool {
    match selector {
        Selector::SerialNumber(pattern) => device
            .serial
            .as_deref()
            .map(|serial| starts_with_ignore_case(serial, pattern))
            .unwrap_or(false),
        Selector::VendorName(pattern) => starts_with_ignore_case(&device.vendor, pattern),
        Selector::DevicePath(pattern) => device.path.contains(pattern.as_str()),
    }
}

/// Resolve `selector` against the devices of one enumeration pass.
///
/// Without a selector, a single attached device is taken as the target;
/// several attached devices are ambiguous.
pub fn select(devices: &[DeviceDescriptor], selector: Option<&Selector>) -> MatchOutcome {
    let matched: Vec<&DeviceDescriptor> = match selector {
        Some(selector) => devices
            .iter()
            .filter(|device| matches(device, selector))
            .collect(),
        None => devices.iter().collect(),
    };

    match matched.as_slice() {
        [] => MatchOutcome::NoMatch,
        [single] => MatchOutcome::Match((*single).clone()),
        many => MatchOutcome::Ambiguous(many.iter().map(|device| (*device).clone()).collect()),
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.to_lowercase().starts_with(&prefix.to_lowercase())
}
