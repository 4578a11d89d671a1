use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::cli::args::Args;
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::core::selector::matches;
use crate::core::session::{SessionController, SessionOptions};
use crate::domain::config::ReplugConfig;
use crate::domain::error::ReplugResult;
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::enumerate::{DeviceEnumerator, SystemEnumerator};
use crate::infrastructure::input::{control_byte, spawn_input_pump};
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::SerialFactory;
use crate::infrastructure::terminal::RawModeGuard;
use crate::infrastructure::transcript::Transcript;

/// Execute the parsed command line.
pub async fn execute(args: Args) -> ReplugResult<()> {
    init_logging(args.verbose);

    let config_manager = ConfigManager::new()?;
    let config = match &args.config {
        Some(path) => config_manager.load_config_from_path(path)?,
        None => config_manager.load_config()?,
    };

    let enumerator = Arc::new(SystemEnumerator::new());

    if args.list {
        return list_devices(&args, enumerator.as_ref()).await;
    }

    monitor(args, config, enumerator).await
}

/// `-l`: print every matching attached device and exit.
async fn list_devices(args: &Args, enumerator: &dyn DeviceEnumerator) -> ReplugResult<()> {
    let writer = ConsoleWriter::new(args.output);
    let selector = args.selector();

    let devices: Vec<_> = enumerator
        .enumerate()
        .await?
        .into_iter()
        .filter(|device| selector.as_ref().map_or(true, |s| matches(device, s)))
        .collect();

    writer.write_devices(&devices)?;
    Ok(())
}

/// The interactive session: wait, connect, relay, repeat.
async fn monitor(
    args: Args,
    config: ReplugConfig,
    enumerator: Arc<SystemEnumerator>,
) -> ReplugResult<()> {
    let mut serial = config.serial.clone();
    if let Some(baud) = args.baud {
        serial.baud_rate = baud;
    }

    let exit_char = if args.ctrl_y_exit {
        'Y'
    } else {
        config.monitor.exit_char
    };
    let quit_byte = control_byte(exit_char)?;

    let options = SessionOptions {
        selector: args.selector(),
        serial,
        poll_interval: Duration::from_millis(config.monitor.poll_interval_ms),
        echo: args.echo || config.monitor.echo,
        quit_byte,
        startup_ambiguous: config.monitor.startup_ambiguous,
    };

    let transcript = match &args.log {
        Some(path) => Transcript::to_file(path)?,
        None => Transcript::disabled(),
    };

    let raw_guard = RawModeGuard::new()?;
    debug!(raw = raw_guard.is_raw(), "terminal prepared");

    let (cancel_tx, mut cancel) = watch::channel(false);
    let (mut input, pump) = spawn_input_pump(tokio::io::stdin(), quit_byte, cancel_tx);

    let factory = Arc::new(SerialFactory::new());
    let controller = SessionController::new(enumerator, factory, options, transcript);

    let mut out = tokio::io::stdout();
    let result = controller.run(&mut input, &mut cancel, &mut out).await;

    pump.abort();
    drop(raw_guard);
    result
}
