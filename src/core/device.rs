use serde::{Deserialize, Serialize};

/// Snapshot of one attached USB serial device at enumeration time.
///
/// Produced fresh on every enumeration pass and never mutated; identity
/// across polls is the device path plus serial number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// USB vendor string, empty when the device exposes none
    pub vendor: String,
    /// USB serial number, if the device reports one
    pub serial: Option<String>,
    /// OS device path, e.g. /dev/ttyACM0
    pub path: String,
}

impl DeviceDescriptor {
    /// Qualifier fragment for status lines, e.g. ` with vendor 'X' serial 'Y'`.
    pub fn qualifiers(&self) -> String {
        let mut items = Vec::new();
        if !self.vendor.is_empty() {
            items.push(format!("vendor '{}'", self.vendor));
        }
        if let Some(serial) = &self.serial {
            items.push(format!("serial '{}'", serial));
        }
        if items.is_empty() {
            String::new()
        } else {
            format!(" with {}", items.join(" "))
        }
    }

    /// Whether `other` refers to the same physical device across polls.
    pub fn same_device(&self, other: &DeviceDescriptor) -> bool {
        self.path == other.path && self.serial == other.serial
    }
}
