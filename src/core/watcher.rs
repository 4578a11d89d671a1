use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::core::device::DeviceDescriptor;
use crate::core::selector::{select, MatchOutcome, Selector};
use crate::domain::error::ReplugResult;
use crate::infrastructure::enumerate::DeviceEnumerator;

/// How one watch pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The selector resolved to exactly one device
    Found(DeviceDescriptor),
    /// The user quit while waiting
    Cancelled,
}

/// Polls device enumeration until the selector resolves to one device.
pub struct PresenceWatcher {
    interval: Duration,
}

impl PresenceWatcher {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Enumerate and match repeatedly until a definite single match.
    ///
    /// NoMatch and Ambiguous both keep waiting: an ambiguous set
    /// mid-wait only means the target is not yet uniquely identifiable.
    /// At least one enumeration happens before any return, the loop
    /// never polls faster than the interval, and cancellation is
    /// honored within one interval.
    pub async fn poll_until_match(
        &self,
        enumerator: &dyn DeviceEnumerator,
        selector: Option<&Selector>,
        cancel: &mut watch::Receiver<bool>,
    ) -> ReplugResult<WatchOutcome> {
        let mut cancel_open = true;
        loop {
            let devices = enumerator.enumerate().await?;
            match select(&devices, selector) {
                MatchOutcome::Match(descriptor) => {
                    return Ok(WatchOutcome::Found(descriptor));
                }
                MatchOutcome::NoMatch => {}
                MatchOutcome::Ambiguous(candidates) => {
                    debug!(
                        "{} devices match, waiting for a unique match",
                        candidates.len()
                    );
                }
            }

            if *cancel.borrow() {
                return Ok(WatchOutcome::Cancelled);
            }

            if cancel_open {
                tokio::select! {
                    result = cancel.changed() => match result {
                        Ok(()) => {
                            if *cancel.borrow() {
                                return Ok(WatchOutcome::Cancelled);
                            }
                        }
                        Err(_) => {
                            // Sender gone: nothing can cancel us anymore.
                            cancel_open = false;
                            tokio::time::sleep(self.interval).await;
                        }
                    },
                    _ = tokio::time::sleep(self.interval) => {}
                }
            } else {
                tokio::time::sleep(self.interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct ScriptedEnumerator {
        responses: Mutex<VecDeque<Vec<DeviceDescriptor>>>,
        calls: AtomicUsize,
    }

    impl ScriptedEnumerator {
        fn new(responses: Vec<Vec<DeviceDescriptor>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeviceEnumerator for ScriptedEnumerator {
        async fn enumerate(&self) -> ReplugResult<Vec<DeviceDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.pop_front().unwrap_or_default())
        }
    }

    struct FailingEnumerator;

    #[async_trait]
    impl DeviceEnumerator for FailingEnumerator {
        async fn enumerate(&self) -> ReplugResult<Vec<DeviceDescriptor>> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }
    }

    fn teensy() -> DeviceDescriptor {
        DeviceDescriptor {
            vendor: "Teensyduino".to_string(),
            serial: Some("21973".to_string()),
            path: "/dev/ttyACM1".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_on_fourth_poll_not_earlier() {
        let interval = Duration::from_millis(500);
        let enumerator =
            ScriptedEnumerator::new(vec![vec![], vec![], vec![], vec![teensy()]]);
        let watcher = PresenceWatcher::new(interval);
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let selector = Selector::VendorName("Teensy".to_string());

        let started = Instant::now();
        let outcome = watcher
            .poll_until_match(&enumerator, Some(&selector), &mut cancel)
            .await
            .unwrap();

        assert_eq!(outcome, WatchOutcome::Found(teensy()));
        assert_eq!(enumerator.calls(), 4);
        // Three full intervals pass before the fourth enumeration.
        assert!(started.elapsed() >= interval * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_match_still_enumerates_once() {
        let enumerator = ScriptedEnumerator::new(vec![vec![teensy()]]);
        let watcher = PresenceWatcher::new(Duration::from_millis(500));
        let (_cancel_tx, mut cancel) = watch::channel(false);

        let started = Instant::now();
        let outcome = watcher
            .poll_until_match(&enumerator, None, &mut cancel)
            .await
            .unwrap();

        assert_eq!(outcome, WatchOutcome::Found(teensy()));
        assert_eq!(enumerator.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_within_one_interval() {
        let interval = Duration::from_secs(1);
        let enumerator = ScriptedEnumerator::new(Vec::new());
        let watcher = PresenceWatcher::new(interval);
        let (cancel_tx, mut cancel) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = cancel_tx.send(true);
        });

        let started = Instant::now();
        let outcome = watcher
            .poll_until_match(&enumerator, None, &mut cancel)
            .await
            .unwrap();

        assert_eq!(outcome, WatchOutcome::Cancelled);
        assert_eq!(enumerator.calls(), 1);
        assert!(started.elapsed() < interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_sleep_still_enumerates() {
        let enumerator = ScriptedEnumerator::new(Vec::new());
        let watcher = PresenceWatcher::new(Duration::from_millis(500));
        let (cancel_tx, mut cancel) = watch::channel(false);
        cancel_tx.send(true).unwrap();

        let outcome = watcher
            .poll_until_match(&enumerator, None, &mut cancel)
            .await
            .unwrap();

        assert_eq!(outcome, WatchOutcome::Cancelled);
        assert_eq!(enumerator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambiguity_keeps_waiting() {
        // A second board of the same type attached mid-wait is not fatal;
        // the watcher resolves once the set narrows to one.
        let twin = DeviceDescriptor {
            vendor: "Teensyduino".to_string(),
            serial: Some("40000".to_string()),
            path: "/dev/ttyACM2".to_string(),
        };
        let enumerator =
            ScriptedEnumerator::new(vec![vec![teensy(), twin], vec![teensy()]]);
        let watcher = PresenceWatcher::new(Duration::from_millis(500));
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let selector = Selector::VendorName("Teensy".to_string());

        let outcome = watcher
            .poll_until_match(&enumerator, Some(&selector), &mut cancel)
            .await
            .unwrap();

        assert_eq!(outcome, WatchOutcome::Found(teensy()));
        assert_eq!(enumerator.calls(), 2);
    }

    #[tokio::test]
    async fn test_enumeration_error_propagates() {
        let watcher = PresenceWatcher::new(Duration::from_millis(500));
        let (_cancel_tx, mut cancel) = watch::channel(false);

        let result = watcher
            .poll_until_match(&FailingEnumerator, None, &mut cancel)
            .await;

        assert!(result.is_err());
    }
}
