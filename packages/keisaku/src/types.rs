// Common types for the ingestion pipeline

use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors that can occur while receiving, decoding or persisting telemetry
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// The four logical telemetry channels streamed by the acquisition GUI.
///
/// Each kind owns one UDP port while a session is active and one CSV file
/// inside the session directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    TimeSeries,
    BandPower,
    Auxiliary,
    Focus,
}

impl StreamKind {
    /// Human-readable name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            StreamKind::TimeSeries => "TimeSeries",
            StreamKind::BandPower => "BandPower",
            StreamKind::Auxiliary => "Auxillary",
            StreamKind::Focus => "Focus",
        }
    }

    /// File name inside the session directory. `auxillary.csv` keeps its
    /// historical spelling; it is part of the on-disk and upload-key contract.
    pub fn file_name(&self) -> &'static str {
        match self {
            StreamKind::TimeSeries => "timeSeries.csv",
            StreamKind::BandPower => "bandPower.csv",
            StreamKind::Auxiliary => "auxillary.csv",
            StreamKind::Focus => "focus.csv",
        }
    }

    /// CSV header row. Column count is fixed per kind; every appended row
    /// is expected to match it.
    pub fn header(&self, channel_count: usize) -> String {
        match self {
            StreamKind::TimeSeries => {
                let mut cols = vec!["time".to_string()];
                for i in 1..=channel_count {
                    cols.push(format!("channel_{}", i));
                }
                cols.join(",")
            }
            StreamKind::BandPower => {
                let mut cols = vec!["time".to_string()];
                for i in 1..=channel_count {
                    for band in ["Delta", "Theta", "Alpha", "Beta", "Gamma"] {
                        cols.push(format!("channel_{}_{}", i, band));
                    }
                }
                cols.join(",")
            }
            StreamKind::Auxiliary => "time,shallow,deep".to_string(),
            StreamKind::Focus => "time,focused".to_string(),
        }
    }
}

/// How the auxiliary digital pins reach the acquisition GUI. Decides the
/// heuristic that separates digital-pin datagrams from accelerometer
/// datagrams sharing the same port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AuxMode {
    /// USB dongle: digital datagrams always carry exactly five pin values
    Dongle,
    /// WiFi shield: digital datagrams carry only strict 0/1 values
    WifiShield,
}

/// Read-only per-session configuration, computed once at startup.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// EEG channel count of the acquisition montage (header width)
    pub channel_count: usize,
    pub aux_mode: AuxMode,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_count: 8,
            aux_mode: AuxMode::Dongle,
        }
    }
}

/// Wire envelope shared by every channel's datagrams.
///
/// `data`'s shape is channel-specific: flat float array (time-series,
/// auxiliary), nested float array (band-power), single float (focus).
#[derive(Debug, Deserialize)]
pub struct Packet<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: T,
}

/// One scalar cell of a CSV row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Float(v) => write!(f, "{}", v),
        }
    }
}

/// One timestamped tuple of scalars appended to a stream file. The first
/// field is always the millisecond receipt timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<Field>);

impl Row {
    /// Comma-separated serialization, no quoting. Values never contain
    /// commas.
    pub fn csv_line(&self) -> String {
        self.0
            .iter()
            .map(|field| field.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
