use clap::Parser;
use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use keisaku::cli::Cli;
use keisaku::controller::{ChannelPorts, Disposition, OperatorEvent, SessionController};
use keisaku::types::IngestConfig;
use keisaku::upload::{S3Config, S3Uploader};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Restores the terminal on drop, including on panic.
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn enable() -> Self {
        match enable_raw_mode() {
            Ok(()) => Self { enabled: true },
            Err(e) => {
                log::warn!("could not enable raw mode ({}), keystrokes need Enter", e);
                Self { enabled: false }
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            let _ = disable_raw_mode();
        }
    }
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        // raw mode needs explicit carriage returns
        .format(|buf, record| writeln!(buf, "[{}] {}\r", record.level(), record.args()))
        .init();
}

/// Blocking keystroke reader feeding the controller's event channel. The
/// channel closing means the driver is gone; just stop reading.
fn read_operator_keys(events: mpsc::Sender<OperatorEvent>) {
    loop {
        let event = match crossterm::event::read() {
            Ok(event) => event,
            Err(e) => {
                log::error!("operator input unavailable: {}", e);
                break;
            }
        };
        let Event::Key(key) = event else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let operator_event = match key.code {
            KeyCode::Char('c') if ctrl => Some(OperatorEvent::Abort),
            KeyCode::Char('d') if ctrl => Some(OperatorEvent::Abort),
            KeyCode::Char('s') => Some(OperatorEvent::Start),
            KeyCode::Char('c') => Some(OperatorEvent::Stop),
            _ => None,
        };
        if let Some(operator_event) = operator_event {
            if events.blocking_send(operator_event).is_err() {
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    // The GUI streams to this machine; the operator has to paste the
    // address into its networking widget.
    let bind_host = match cli.bind {
        Some(addr) => addr,
        None => match local_ip_address::local_ip() {
            Ok(addr) => addr,
            Err(e) => {
                log::warn!("could not discover a LAN address ({}), binding all interfaces", e);
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            }
        },
    };
    log::info!("UDP server running on the following IP, copy & paste it into the acquisition GUI networking widget:");
    log::info!("{}", bind_host);

    let ports = ChannelPorts {
        time_series: cli.time_series_port,
        focus: cli.focus_port,
        auxiliary: cli.aux_port,
        band_power: cli.band_power_port,
    };
    let config = IngestConfig {
        channel_count: cli.channels,
        aux_mode: cli.aux_mode,
    };
    let uploader = Arc::new(S3Uploader::new(
        S3Config::from_env(cli.bucket, cli.s3_endpoint),
        cli.archive_dir.clone(),
        cli.gui_recordings_dir.clone(),
    ));
    let mut controller = SessionController::new(
        cli.archive_dir,
        bind_host,
        ports,
        config,
        uploader,
        cli.max_session_secs.map(Duration::from_secs),
    );

    let raw_mode = RawModeGuard::enable();
    let (event_tx, mut event_rx) = mpsc::channel(8);
    tokio::task::spawn_blocking(move || read_operator_keys(event_tx));
    log::info!("press 's' to start a session, 'c' to stop and upload, Ctrl-C to abort");

    loop {
        let event = if let Some(deadline) = controller.session_deadline() {
            tokio::select! {
                received = event_rx.recv() => received.unwrap_or(OperatorEvent::Abort),
                _ = tokio::time::sleep_until(deadline) => {
                    log::warn!("session exceeded the configured maximum duration, forcing stop");
                    OperatorEvent::Stop
                }
            }
        } else {
            event_rx.recv().await.unwrap_or(OperatorEvent::Abort)
        };

        if controller.handle_event(event).await == Disposition::Exit {
            break;
        }
    }

    // restore the terminal, then exit without waiting on the blocking
    // keystroke reader
    drop(raw_mode);
    std::process::exit(0);
}
