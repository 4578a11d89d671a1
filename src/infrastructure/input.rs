use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::error::{ReplugError, ReplugResult};

/// One keystroke batch or the quit request from the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Bytes(Vec<u8>),
    Quit,
}

/// Control byte for a quit letter, e.g. 'X' -> 0x18.
pub fn control_byte(letter: char) -> ReplugResult<u8> {
    let upper = letter.to_ascii_uppercase();
    if !upper.is_ascii_uppercase() {
        return Err(ReplugError::InvalidInput(format!(
            "exit character must be a letter, got '{}'",
            letter
        )));
    }
    Ok(upper as u8 - b'@')
}

/// Printable letter for a control byte, e.g. 0x18 -> 'X'.
pub fn control_label(byte: u8) -> char {
    (byte + b'@') as char
}

/// Spawn the session-wide terminal input pump.
///
/// A single task reads raw bytes for the whole process lifetime. The
/// quit control byte becomes an [`InputEvent::Quit`] plus a broadcast on
/// the cancellation channel, so the searching loop stops even when no
/// relay is running. All other bytes are forwarded untouched.
pub fn spawn_input_pump<R>(
    reader: R,
    quit_byte: u8,
    cancel: watch::Sender<bool>,
) -> (mpsc::UnboundedReceiver<InputEvent>, JoinHandle<()>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(pump(reader, quit_byte, event_tx, cancel));
    (event_rx, handle)
}

async fn pump<R>(
    mut reader: R,
    quit_byte: u8,
    events: mpsc::UnboundedSender<InputEvent>,
    cancel: watch::Sender<bool>,
) where
    R: AsyncRead + Send + Unpin,
{
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf).await {
            // EOF: piped input ran out; the device side keeps relaying.
            Ok(0) => break,
            Ok(n) => {
                let bytes = &buf[..n];
                match bytes.iter().position(|&b| b == quit_byte) {
                    Some(position) => {
                        if position > 0 {
                            let _ = events.send(InputEvent::Bytes(bytes[..position].to_vec()));
                        }
                        let _ = events.send(InputEvent::Quit);
                        let _ = cancel.send(true);
                        return;
                    }
                    None => {
                        if events.send(InputEvent::Bytes(bytes.to_vec())).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                debug!("terminal input closed: {}", err);
                break;
            }
        }
    }
}
