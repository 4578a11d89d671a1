use async_trait::async_trait;
use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashSet;
use tracing::warn;

use crate::core::device::DeviceDescriptor;
use crate::domain::error::ReplugResult;

/// Read-only view of the OS USB serial enumeration facility.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    /// List currently attached USB serial devices.
    async fn enumerate(&self) -> ReplugResult<Vec<DeviceDescriptor>>;
}

/// Enumerator backed by the platform serial subsystem.
pub struct SystemEnumerator;

impl SystemEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceEnumerator for SystemEnumerator {
    async fn enumerate(&self) -> ReplugResult<Vec<DeviceDescriptor>> {
        match serialport::available_ports() {
            Ok(ports) => Ok(descriptors_from_ports(ports)),
            Err(err) if is_fatal_enumeration_error(&err) => Err(err.into()),
            Err(err) => {
                // Devices may legitimately be absent; an unreadable
                // metadata path is the same soft condition.
                warn!("serial enumeration unavailable: {}", err);
                Ok(Vec::new())
            }
        }
    }
}

/// Map raw port listings to descriptors, keeping only USB-backed ports.
///
/// A device without a vendor string is still listed, with an empty
/// vendor field. No two descriptors share a path.
pub fn descriptors_from_ports(ports: Vec<SerialPortInfo>) -> Vec<DeviceDescriptor> {
    let mut seen = HashSet::new();
    let mut devices = Vec::new();
    for port in ports {
        let usb = match port.port_type {
            SerialPortType::UsbPort(usb) => usb,
            _ => continue,
        };
        if !seen.insert(port.port_name.clone()) {
            continue;
        }
        devices.push(DeviceDescriptor {
            vendor: usb.manufacturer.unwrap_or_default(),
            serial: usb.serial_number,
            path: port.port_name,
        });
    }
    devices
}

fn is_fatal_enumeration_error(err: &serialport::Error) -> bool {
    matches!(
        err.kind(),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied)
    )
}
