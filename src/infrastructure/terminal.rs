use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::IsTerminal;
use tracing::warn;

use crate::domain::error::ReplugResult;

/// Raw-mode hold on the terminal for the session, restored on drop.
///
/// Canonical processing and echo must be off so control bytes reach the
/// device instead of the line editor. Piped stdin skips raw mode.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    pub fn new() -> ReplugResult<Self> {
        if !std::io::stdin().is_terminal() {
            return Ok(Self { active: false });
        }
        enable_raw_mode()?;
        Ok(Self { active: true })
    }

    pub fn is_raw(&self) -> bool {
        self.active
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = disable_raw_mode() {
                warn!("failed to restore terminal mode: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_skips_raw_mode_without_a_tty() {
        // Test runners have no tty on stdin.
        let guard = RawModeGuard::new().unwrap();
        assert!(!guard.is_raw());
    }
}
