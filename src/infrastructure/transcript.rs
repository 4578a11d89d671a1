use chrono::Local;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::domain::error::{ReplugError, ReplugResult};

/// Optional session transcript.
///
/// Records status lines and relayed device output into one file, a
/// timestamp per line, carriage returns stripped. Cheap to clone; all
/// clones share the same file and line buffer.
#[derive(Clone, Default)]
pub struct Transcript {
    inner: Option<Arc<Mutex<TranscriptInner>>>,
}

struct TranscriptInner {
    file: File,
    line: Vec<u8>,
}

impl Transcript {
    /// A transcript that records nothing.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Record the session into the file at `path`.
    pub fn to_file(path: &Path) -> ReplugResult<Self> {
        let file = File::create(path).map_err(|err| ReplugError::Config {
            message: format!("Failed to open log file {}: {}", path.display(), err),
        })?;
        Ok(Self {
            inner: Some(Arc::new(Mutex::new(TranscriptInner {
                file,
                line: Vec::new(),
            }))),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Record one complete status line.
    pub fn line(&self, text: &str) {
        self.raw(text.as_bytes());
        self.raw(b"\n");
    }

    /// Record raw relay bytes, buffering until each newline.
    pub fn raw(&self, bytes: &[u8]) {
        let inner = match &self.inner {
            Some(inner) => inner,
            None => return,
        };
        let mut guard = match inner.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        for &byte in bytes {
            match byte {
                b'\r' => {}
                b'\n' => guard.flush_line(),
                _ => {
                    if guard.line.is_empty() {
                        let stamp = timestamp();
                        guard.line.extend_from_slice(stamp.as_bytes());
                    }
                    guard.line.push(byte);
                }
            }
        }
    }
}

impl TranscriptInner {
    fn flush_line(&mut self) {
        if self.line.is_empty() {
            let stamp = timestamp();
            self.line.extend_from_slice(stamp.as_bytes());
        }
        self.line.push(b'\n');
        if let Err(err) = self.file.write_all(&self.line) {
            warn!("transcript write failed: {}", err);
        }
        self.line.clear();
    }
}

fn timestamp() -> String {
    let now = Local::now();
    let fraction = (now.timestamp_subsec_micros() / 100) % 10_000;
    format!("{}.{:04}: ", now.format("%H:%M:%S"), fraction)
}
