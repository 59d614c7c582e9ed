use crate::types::AuxMode;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "keisaku",
    version,
    about = "Session-scoped UDP telemetry logger for OpenBCI-style acquisition GUIs",
    long_about = "Listens for time-series, focus and auxiliary telemetry datagrams from an\n\
                  acquisition GUI, appends each stream to a session CSV, and uploads the\n\
                  finished session to object storage.\n\
                  Keys: 's' starts a session, 'c' stops it and uploads, Ctrl-C aborts."
)]
pub struct Cli {
    /// Port receiving time-series EEG datagrams
    #[arg(long, default_value_t = 12345)]
    pub time_series_port: u16,

    /// Port receiving focus datagrams
    #[arg(long, default_value_t = 12346)]
    pub focus_port: u16,

    /// Port receiving auxiliary digital-pin datagrams
    #[arg(long, default_value_t = 12347)]
    pub aux_port: u16,

    /// Enable band-power logging on this port
    #[arg(long)]
    pub band_power_port: Option<u16>,

    /// Local address to bind listeners on (default: the discovered LAN address)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// EEG channel count of the acquisition montage
    #[arg(long, default_value_t = 8)]
    pub channels: usize,

    /// Auxiliary transport, decides the digital-read heuristic
    #[arg(long, value_enum, default_value_t = AuxMode::Dongle)]
    pub aux_mode: AuxMode,

    /// Directory where session archives are written
    #[arg(long, default_value = "sessions_archive", env = "KEISAKU_ARCHIVE_DIR")]
    pub archive_dir: PathBuf,

    /// Destination bucket for session uploads
    #[arg(long, default_value = "keisaku", env = "KEISAKU_BUCKET")]
    pub bucket: String,

    /// S3-compatible endpoint (default: https://s3.<region>.amazonaws.com)
    #[arg(long, env = "KEISAKU_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Acquisition GUI recordings directory; today's newest GUI session is
    /// uploaded alongside the session data when set
    #[arg(long, env = "KEISAKU_GUI_RECORDINGS")]
    pub gui_recordings_dir: Option<PathBuf>,

    /// Force-stop a session after this many seconds (safety net; uses the
    /// same stop-and-upload path as the 'c' key)
    #[arg(long)]
    pub max_session_secs: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
