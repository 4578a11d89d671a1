use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::debug;

use crate::domain::error::ReplugResult;
use crate::infrastructure::input::InputEvent;
use crate::infrastructure::serial::DeviceConnection;
use crate::infrastructure::transcript::Transcript;

/// How one relay session ended. Unexpected faults surface as `Err` from
/// [`TerminalBridge::run`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// The connection failed or the device went away
    DeviceLost,
    /// The quit control byte or cancellation ended the relay
    UserQuit,
}

enum RelayEvent {
    Data(Vec<u8>),
    Lost,
}

const READ_CHUNK: usize = 1024;
/// Pause between device reads; keeps the reader task cooperative.
const READ_PAUSE: Duration = Duration::from_millis(5);
/// Some bootloaders drop keystrokes that arrive back to back.
const WRITE_PACING: Duration = Duration::from_millis(2);

/// Relays bytes between one open device connection and the terminal.
///
/// No reconnection happens here; on any outcome the connection is
/// released and control returns to the caller.
pub struct TerminalBridge {
    echo: bool,
}

impl TerminalBridge {
    pub fn new(echo: bool) -> Self {
        Self { echo }
    }

    /// Relay until the device is lost, the user quits, or a fault occurs.
    ///
    /// Device bytes go verbatim to `out`, except bare LF which is
    /// expanded to CRLF for the raw terminal. Keystrokes go verbatim to
    /// the device, except LF which is sent as CR. The connection is
    /// owned by this call and dropped on every exit path.
    pub async fn run<W>(
        &self,
        connection: Box<dyn DeviceConnection>,
        input: &mut mpsc::UnboundedReceiver<InputEvent>,
        cancel: &mut watch::Receiver<bool>,
        out: &mut W,
        transcript: &Transcript,
    ) -> ReplugResult<BridgeOutcome>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let connection = Arc::new(Mutex::new(connection));
        let (relay_tx, mut relay_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_device(Arc::clone(&connection), relay_tx));

        let mut line_endings = LineEndings::new();
        let mut input_open = true;
        let mut cancel_open = true;
        let outcome = loop {
            tokio::select! {
                // Quit and cancellation win over pending device data.
                biased;
                result = cancel.changed(), if cancel_open => match result {
                    Ok(()) => {
                        if *cancel.borrow() {
                            break BridgeOutcome::UserQuit;
                        }
                    }
                    // Sender gone: nothing can cancel us anymore.
                    Err(_) => cancel_open = false,
                },
                event = input.recv(), if input_open => match event {
                    Some(InputEvent::Quit) => break BridgeOutcome::UserQuit,
                    Some(InputEvent::Bytes(bytes)) => {
                        if self.echo {
                            out.write_all(&local_echo(&bytes)).await?;
                            out.flush().await?;
                        }
                        let outbound = map_outbound(&bytes);
                        let write_failed = {
                            let mut connection = connection.lock().await;
                            connection.write_all(&outbound).is_err()
                        };
                        if write_failed {
                            break BridgeOutcome::DeviceLost;
                        }
                        tokio::time::sleep(WRITE_PACING).await;
                    }
                    None => input_open = false,
                },
                event = relay_rx.recv() => match event {
                    Some(RelayEvent::Data(bytes)) => {
                        out.write_all(&line_endings.expand(&bytes)).await?;
                        out.flush().await?;
                        transcript.raw(&bytes);
                    }
                    Some(RelayEvent::Lost) | None => break BridgeOutcome::DeviceLost,
                },
            }
        };

        reader.abort();
        let _ = reader.await;
        // Last owner; dropping the handle closes the stream.
        drop(connection);
        Ok(outcome)
    }
}

async fn read_device(
    connection: Arc<Mutex<Box<dyn DeviceConnection>>>,
    relay_tx: mpsc::UnboundedSender<RelayEvent>,
) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let result = {
            let mut connection = connection.lock().await;
            connection.read(&mut buf)
        };
        match result {
            Ok(0) => {}
            Ok(n) => {
                if relay_tx.send(RelayEvent::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(ref err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(err) => {
                debug!("device read failed: {}", err);
                let _ = relay_tx.send(RelayEvent::Lost);
                break;
            }
        }
        tokio::time::sleep(READ_PAUSE).await;
    }
}

/// Expands bare LF from the device to CRLF for the raw terminal,
/// tracking the last byte across chunks.
struct LineEndings {
    last: u8,
}

impl LineEndings {
    fn new() -> Self {
        Self { last: 0 }
    }

    fn expand(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut fixed = Vec::with_capacity(bytes.len());
        for &byte in bytes {
            if byte == b'\n' && self.last != b'\r' {
                fixed.push(b'\r');
            }
            fixed.push(byte);
            self.last = byte;
        }
        fixed
    }
}

fn map_outbound(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .map(|&byte| if byte == b'\n' { b'\r' } else { byte })
        .collect()
}

fn local_echo(bytes: &[u8]) -> Vec<u8> {
    let mut echoed = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        echoed.push(byte);
        if byte == b'\r' {
            echoed.push(b'\n');
        }
    }
    echoed
}
