use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::core::device::DeviceDescriptor;
use crate::core::selector::{select, MatchOutcome, Selector};
use crate::core::watcher::{PresenceWatcher, WatchOutcome};
use crate::domain::config::{AmbiguousPolicy, SerialSettings};
use crate::domain::error::{ReplugError, ReplugResult};
use crate::infrastructure::bridge::{BridgeOutcome, TerminalBridge};
use crate::infrastructure::enumerate::DeviceEnumerator;
use crate::infrastructure::input::{control_label, InputEvent};
use crate::infrastructure::serial::{is_disconnect, ConnectionFactory};
use crate::infrastructure::transcript::Transcript;

/// Session lifecycle state.
///
/// `Disconnecting` is transient: it emits the disconnect status and
/// collapses straight back to `Searching`. The retry policy is the
/// state cycle itself - infinite, interval-paced, cancellable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the target device to appear
    Searching,
    /// Relaying to the resolved device
    Connected(DeviceDescriptor),
    /// Device just vanished; about to resume searching
    Disconnecting(String),
}

/// Everything one process-lifetime session runs with.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub selector: Option<Selector>,
    pub serial: SerialSettings,
    pub poll_interval: Duration,
    pub echo: bool,
    pub quit_byte: u8,
    pub startup_ambiguous: AmbiguousPolicy,
}

/// How one connection attempt ended, as seen by the state loop.
enum Attached {
    Lost,
    OpenFailed,
    Quit,
}

/// Top-level state machine driving the wait/connect/reconnect cycle.
///
/// Owns the selector and all policy; the watcher and bridge report
/// outcomes and this controller alone decides transient versus fatal.
pub struct SessionController {
    enumerator: Arc<dyn DeviceEnumerator>,
    factory: Arc<dyn ConnectionFactory>,
    options: SessionOptions,
    transcript: Transcript,
}

impl SessionController {
    pub fn new(
        enumerator: Arc<dyn DeviceEnumerator>,
        factory: Arc<dyn ConnectionFactory>,
        options: SessionOptions,
        transcript: Transcript,
    ) -> Self {
        Self {
            enumerator,
            factory,
            options,
            transcript,
        }
    }

    /// Run until the user quits (`Ok`) or an unrecoverable fault (`Err`).
    pub async fn run<W>(
        &self,
        input: &mut mpsc::UnboundedReceiver<InputEvent>,
        cancel: &mut watch::Receiver<bool>,
        out: &mut W,
    ) -> ReplugResult<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let watcher = PresenceWatcher::new(self.options.poll_interval);
        let mut state = self.startup_state().await?;

        loop {
            state = match state {
                SessionState::Searching => {
                    self.emit(
                        out,
                        &format!(
                            "Waiting for USB Serial Device{} ...",
                            self.selector_qualifiers()
                        ),
                    )
                    .await?;
                    let found = watcher
                        .poll_until_match(
                            self.enumerator.as_ref(),
                            self.options.selector.as_ref(),
                            cancel,
                        )
                        .await?;
                    match found {
                        WatchOutcome::Found(descriptor) => SessionState::Connected(descriptor),
                        WatchOutcome::Cancelled => return Ok(()),
                    }
                }
                SessionState::Connected(descriptor) => {
                    match self.attach(&descriptor, input, cancel, out).await? {
                        Attached::Lost => SessionState::Disconnecting(descriptor.path.clone()),
                        Attached::OpenFailed => SessionState::Searching,
                        Attached::Quit => return Ok(()),
                    }
                }
                SessionState::Disconnecting(path) => {
                    self.emit(out, &format!("USB Serial device @{} disconnected.", path))
                        .await?;
                    self.emit(out, "").await?;
                    info!("device lost, resuming search");
                    SessionState::Searching
                }
            };
        }
    }

    /// One connected episode: announce, open, relay, classify the end.
    async fn attach<W>(
        &self,
        descriptor: &DeviceDescriptor,
        input: &mut mpsc::UnboundedReceiver<InputEvent>,
        cancel: &mut watch::Receiver<bool>,
        out: &mut W,
    ) -> ReplugResult<Attached>
    where
        W: AsyncWrite + Unpin + Send,
    {
        // Keystrokes buffered while searching never reach the device.
        while input.try_recv().is_ok() {}

        self.emit(
            out,
            &format!(
                "USB Serial device{} connected @{}",
                descriptor.qualifiers(),
                descriptor.path
            ),
        )
        .await?;
        self.emit(
            out,
            &format!(
                "Use Control-{} to exit.",
                control_label(self.options.quit_byte)
            ),
        )
        .await?;

        let connection = match self
            .factory
            .open(&descriptor.path, &self.options.serial)
            .await
        {
            Ok(connection) => connection,
            Err(err) if is_disconnect(&err) => {
                // The device vanished between match and open.
                self.emit(out, &format!("Unable to open port '{}'", descriptor.path))
                    .await?;
                debug!("open failed on {}: {}", descriptor.path, err);
                return Ok(Attached::OpenFailed);
            }
            Err(err) => return Err(err),
        };

        // Boards that never echo back get their input mirrored locally.
        let echo = self.options.echo || descriptor.vendor.starts_with("Synthetos");
        let bridge = TerminalBridge::new(echo);
        match bridge
            .run(connection, input, cancel, out, &self.transcript)
            .await?
        {
            BridgeOutcome::DeviceLost => Ok(Attached::Lost),
            BridgeOutcome::UserQuit => Ok(Attached::Quit),
        }
    }

    /// Resolve the state to start in from one enumeration pass.
    ///
    /// Unlike mid-wait ambiguity, several matches when the user asked to
    /// connect right now are surfaced, unless the policy says to wait.
    async fn startup_state(&self) -> ReplugResult<SessionState> {
        let devices = self.enumerator.enumerate().await?;
        match select(&devices, self.options.selector.as_ref()) {
            MatchOutcome::Match(descriptor) => Ok(SessionState::Connected(descriptor)),
            MatchOutcome::NoMatch => Ok(SessionState::Searching),
            MatchOutcome::Ambiguous(candidates) => match self.options.startup_ambiguous {
                AmbiguousPolicy::Fail => Err(ReplugError::Ambiguous {
                    count: candidates.len(),
                }),
                AmbiguousPolicy::Wait => Ok(SessionState::Searching),
            },
        }
    }

    fn selector_qualifiers(&self) -> String {
        self.options
            .selector
            .as_ref()
            .map(Selector::qualifiers)
            .unwrap_or_default()
    }

    /// Status lines end in CRLF because the terminal may be raw.
    async fn emit<W>(&self, out: &mut W, line: &str) -> ReplugResult<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\r\n").await?;
        out.flush().await?;
        self.transcript.line(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex as StdMutex;

    use crate::infrastructure::serial::DeviceConnection;

    struct ScriptedEnumerator {
        responses: StdMutex<VecDeque<Vec<DeviceDescriptor>>>,
        fallback: Vec<DeviceDescriptor>,
    }

    impl ScriptedEnumerator {
        fn new(responses: Vec<Vec<DeviceDescriptor>>) -> Self {
            Self {
                responses: StdMutex::new(responses.into_iter().collect()),
                fallback: Vec::new(),
            }
        }

        fn with_fallback(responses: Vec<Vec<DeviceDescriptor>>, fallback: Vec<DeviceDescriptor>) -> Self {
            Self {
                responses: StdMutex::new(responses.into_iter().collect()),
                fallback,
            }
        }
    }

    #[async_trait]
    impl DeviceEnumerator for ScriptedEnumerator {
        async fn enumerate(&self) -> ReplugResult<Vec<DeviceDescriptor>> {
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.pop_front().unwrap_or_else(|| self.fallback.clone()))
        }
    }

    enum FactoryStep {
        Connect(Vec<io::Result<Vec<u8>>>),
        Gone,
    }

    struct ScriptedFactory {
        steps: StdMutex<VecDeque<FactoryStep>>,
    }

    impl ScriptedFactory {
        fn new(steps: Vec<FactoryStep>) -> Self {
            Self {
                steps: StdMutex::new(steps.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl ConnectionFactory for ScriptedFactory {
        async fn open(
            &self,
            _path: &str,
            _settings: &SerialSettings,
        ) -> ReplugResult<Box<dyn DeviceConnection>> {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(FactoryStep::Connect(reads)) => Ok(Box::new(ScriptedConnection {
                    reads: reads.into_iter().collect(),
                })),
                Some(FactoryStep::Gone) | None => Err(serialport::Error::new(
                    serialport::ErrorKind::NoDevice,
                    "device gone",
                )
                .into()),
            }
        }
    }

    struct ScriptedConnection {
        reads: VecDeque<io::Result<Vec<u8>>>,
    }

    impl DeviceConnection for ScriptedConnection {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(err)) => Err(err),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            }
        }

        fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    fn teensy() -> DeviceDescriptor {
        DeviceDescriptor {
            vendor: "Teensyduino".to_string(),
            serial: Some("21973".to_string()),
            path: "/dev/ttyACM1".to_string(),
        }
    }

    fn options(selector: Option<Selector>, policy: AmbiguousPolicy) -> SessionOptions {
        SessionOptions {
            selector,
            serial: SerialSettings::default(),
            poll_interval: Duration::from_millis(10),
            echo: false,
            quit_byte: 0x18,
            startup_ambiguous: policy,
        }
    }

    fn controller(
        enumerator: ScriptedEnumerator,
        factory: ScriptedFactory,
        opts: SessionOptions,
    ) -> SessionController {
        SessionController::new(
            Arc::new(enumerator),
            Arc::new(factory),
            opts,
            Transcript::disabled(),
        )
    }

    fn unplugged() -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
    }

    async fn run_session(
        controller: &SessionController,
        driver: impl std::future::Future<Output = ()>,
    ) -> (ReplugResult<()>, String) {
        let (_input_tx, mut input) = mpsc::unbounded_channel();
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let mut out = Vec::new();

        let result = tokio::time::timeout(Duration::from_secs(5), async {
            let (result, ()) = tokio::join!(
                controller.run(&mut input, &mut cancel, &mut out),
                driver
            );
            result
        })
        .await
        .expect("session hung");

        (result, String::from_utf8_lossy(&out).to_string())
    }

    #[tokio::test]
    async fn test_disconnect_reconnect_cycle() {
        // Present at startup, relays one line, device lost, found again
        // after one empty poll, then the user quits.
        let enumerator = ScriptedEnumerator::with_fallback(
            vec![vec![teensy()], vec![], vec![teensy()]],
            vec![teensy()],
        );
        let factory = ScriptedFactory::new(vec![
            FactoryStep::Connect(vec![Ok(b"hello\n".to_vec()), unplugged()]),
            FactoryStep::Connect(Vec::new()),
        ]);
        let selector = Selector::VendorName("Teensy".to_string());
        let controller = controller(
            enumerator,
            factory,
            options(Some(selector), AmbiguousPolicy::Fail),
        );

        let (input_tx, mut input) = mpsc::unbounded_channel();
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let mut out = Vec::new();

        let result = tokio::time::timeout(Duration::from_secs(5), async {
            let (result, ()) = tokio::join!(
                controller.run(&mut input, &mut cancel, &mut out),
                async {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    let _ = input_tx.send(InputEvent::Quit);
                }
            );
            result
        })
        .await
        .expect("session hung");

        assert!(result.is_ok());
        let output = String::from_utf8_lossy(&out);

        assert!(output.contains(
            "USB Serial device with vendor 'Teensyduino' serial '21973' connected @/dev/ttyACM1\r\n"
        ));
        assert!(output.contains("Use Control-X to exit.\r\n"));
        assert!(output.contains("hello\r\n"));
        assert!(output.contains("USB Serial device @/dev/ttyACM1 disconnected.\r\n"));
        assert!(output.contains("Waiting for USB Serial Device with vendor 'Teensy' ...\r\n"));

        // Lost then re-found: the connected line appears twice.
        assert_eq!(
            output.matches("connected @/dev/ttyACM1").count(),
            2,
            "output was: {}",
            output
        );
        // The disconnected line precedes the waiting line.
        let lost = output.find("disconnected.").unwrap();
        let waiting = output.find("Waiting for").unwrap();
        assert!(lost < waiting);
    }

    #[tokio::test]
    async fn test_cancel_while_searching_exits_cleanly() {
        let enumerator = ScriptedEnumerator::new(Vec::new());
        let factory = ScriptedFactory::new(Vec::new());
        let controller = controller(enumerator, factory, options(None, AmbiguousPolicy::Fail));

        let (_input_tx, mut input) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel) = watch::channel(false);
        let mut out = Vec::new();

        let result = tokio::time::timeout(Duration::from_secs(5), async {
            let (result, ()) = tokio::join!(
                controller.run(&mut input, &mut cancel, &mut out),
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let _ = cancel_tx.send(true);
                }
            );
            result
        })
        .await
        .expect("session hung");

        assert!(result.is_ok());
        let output = String::from_utf8_lossy(&out);
        // Printed once per Searching entry, not once per poll.
        assert_eq!(output.matches("Waiting for USB Serial Device").count(), 1);
        assert!(output.contains("Waiting for USB Serial Device ...\r\n"));
    }

    #[tokio::test]
    async fn test_startup_ambiguity_fails_by_default() {
        let twin = DeviceDescriptor {
            vendor: "Teensyduino".to_string(),
            serial: Some("40000".to_string()),
            path: "/dev/ttyACM2".to_string(),
        };
        let enumerator = ScriptedEnumerator::new(vec![vec![teensy(), twin]]);
        let factory = ScriptedFactory::new(Vec::new());
        let controller = controller(enumerator, factory, options(None, AmbiguousPolicy::Fail));

        let (result, output) = run_session(&controller, async {}).await;

        assert!(matches!(result, Err(ReplugError::Ambiguous { count: 2 })));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_startup_ambiguity_can_wait() {
        let twin = DeviceDescriptor {
            vendor: "Teensyduino".to_string(),
            serial: Some("40000".to_string()),
            path: "/dev/ttyACM2".to_string(),
        };
        let enumerator = ScriptedEnumerator::with_fallback(
            vec![vec![teensy(), twin], vec![teensy()]],
            vec![teensy()],
        );
        let factory = ScriptedFactory::new(vec![FactoryStep::Connect(Vec::new())]);
        let controller = controller(enumerator, factory, options(None, AmbiguousPolicy::Wait));

        let (input_tx, mut input) = mpsc::unbounded_channel();
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let mut out = Vec::new();

        let result = tokio::time::timeout(Duration::from_secs(5), async {
            let (result, ()) = tokio::join!(
                controller.run(&mut input, &mut cancel, &mut out),
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    let _ = input_tx.send(InputEvent::Quit);
                }
            );
            result
        })
        .await
        .expect("session hung");

        assert!(result.is_ok());
        let output = String::from_utf8_lossy(&out);
        assert!(output.contains("Waiting for USB Serial Device ...\r\n"));
        assert!(output.contains("connected @/dev/ttyACM1"));
    }

    #[tokio::test]
    async fn test_open_failure_resumes_search_without_disconnect_line() {
        let enumerator = ScriptedEnumerator::with_fallback(
            vec![vec![teensy()], vec![teensy()]],
            vec![teensy()],
        );
        let factory = ScriptedFactory::new(vec![
            FactoryStep::Gone,
            FactoryStep::Connect(Vec::new()),
        ]);
        let selector = Selector::SerialNumber("21973".to_string());
        let controller = controller(
            enumerator,
            factory,
            options(Some(selector), AmbiguousPolicy::Fail),
        );

        let (input_tx, mut input) = mpsc::unbounded_channel();
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let mut out = Vec::new();

        let result = tokio::time::timeout(Duration::from_secs(5), async {
            let (result, ()) = tokio::join!(
                controller.run(&mut input, &mut cancel, &mut out),
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    let _ = input_tx.send(InputEvent::Quit);
                }
            );
            result
        })
        .await
        .expect("session hung");

        assert!(result.is_ok());
        let output = String::from_utf8_lossy(&out);
        assert!(output.contains("Unable to open port '/dev/ttyACM1'\r\n"));
        assert!(output.contains("Waiting for USB Serial Device with serial '21973' ...\r\n"));
        assert!(!output.contains("disconnected."));
    }

    #[tokio::test]
    async fn test_fatal_open_error_terminates() {
        struct DeniedFactory;

        #[async_trait]
        impl ConnectionFactory for DeniedFactory {
            async fn open(
                &self,
                _path: &str,
                _settings: &SerialSettings,
            ) -> ReplugResult<Box<dyn DeviceConnection>> {
                Err(serialport::Error::new(
                    serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied),
                    "permission denied",
                )
                .into())
            }
        }

        let enumerator = ScriptedEnumerator::new(vec![vec![teensy()]]);
        let controller = SessionController::new(
            Arc::new(enumerator),
            Arc::new(DeniedFactory),
            options(None, AmbiguousPolicy::Fail),
            Transcript::disabled(),
        );

        let (result, _) = run_session(&controller, async {}).await;
        assert!(matches!(result, Err(ReplugError::Serial(_))));
    }
}
