use async_trait::async_trait;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::info;

use crate::domain::config::{FlowControlConfig, ParityConfig, SerialSettings};
use crate::domain::error::{ReplugError, ReplugResult};

/// Read timeout on the open device stream. Short enough that loss and
/// cancellation are noticed promptly, long enough to avoid busy reads.
pub const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// One exclusive duplex byte stream to an attached device.
///
/// Reads time out with `io::ErrorKind::TimedOut` when no data arrives;
/// dropping the handle closes the stream.
pub trait DeviceConnection: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

/// Capability interface over the OS serial-connection facility.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open an exclusive duplex connection to the device at `path`.
    async fn open(
        &self,
        path: &str,
        settings: &SerialSettings,
    ) -> ReplugResult<Box<dyn DeviceConnection>>;
}

/// Factory opening real serial ports.
pub struct SerialFactory;

impl SerialFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SerialFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for SerialFactory {
    async fn open(
        &self,
        path: &str,
        settings: &SerialSettings,
    ) -> ReplugResult<Box<dyn DeviceConnection>> {
        let builder = serialport::new(path, settings.baud_rate)
            .data_bits(data_bits(settings.data_bits)?)
            .stop_bits(stop_bits(settings.stop_bits)?)
            .parity(parity(settings.parity))
            .flow_control(flow_control(settings.flow_control))
            .timeout(READ_TIMEOUT);

        let port = builder.open()?;
        info!("opened {} at {} baud", path, settings.baud_rate);
        Ok(Box::new(SerialConnection { port }))
    }
}

struct SerialConnection {
    port: Box<dyn SerialPort>,
}

impl DeviceConnection for SerialConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)
    }
}

fn data_bits(bits: u8) -> ReplugResult<serialport::DataBits> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(ReplugError::Config {
            message: format!("Invalid data bits: {}", other),
        }),
    }
}

fn stop_bits(bits: u8) -> ReplugResult<serialport::StopBits> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        other => Err(ReplugError::Config {
            message: format!("Invalid stop bits: {}", other),
        }),
    }
}

fn parity(parity: ParityConfig) -> serialport::Parity {
    match parity {
        ParityConfig::None => serialport::Parity::None,
        ParityConfig::Even => serialport::Parity::Even,
        ParityConfig::Odd => serialport::Parity::Odd,
    }
}

fn flow_control(flow_control: FlowControlConfig) -> serialport::FlowControl {
    match flow_control {
        FlowControlConfig::None => serialport::FlowControl::None,
        FlowControlConfig::Software => serialport::FlowControl::Software,
        FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
    }
}

/// Whether an error means the device went away, as opposed to a fault
/// that retrying cannot fix.
pub fn is_disconnect(err: &ReplugError) -> bool {
    match err {
        ReplugError::Serial(serial_err) => matches!(
            serial_err.kind(),
            serialport::ErrorKind::NoDevice
                | serialport::ErrorKind::Io(io::ErrorKind::NotFound)
                | serialport::ErrorKind::Io(io::ErrorKind::BrokenPipe)
        ),
        ReplugError::Io(io_err) => matches!(
            io_err.kind(),
            io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}
