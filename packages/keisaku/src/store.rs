// Session store
//
// Owns the on-disk session layout:
// `<archive>/<YYYY_M_D>/Session_<k>/{timeSeries,auxillary,focus[,bandPower]}.csv`.
// Headers are written exactly once at creation; rows are appended with a
// fresh handle per call so a crash never leaves a stream file half-written
// beyond its last complete row.

use crate::types::{IngestConfig, IngestError, IngestResult, Row, StreamKind};
use chrono::{Datelike, NaiveDate};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Date directory name, no zero padding: `2026_8_7`.
pub fn date_dir_name(date: NaiveDate) -> String {
    format!("{}_{}_{}", date.year(), date.month(), date.day())
}

/// Resolve the next session directory for `today` under `base`.
///
/// Returns the absolute path and the relative `<date>/<Session_k>`
/// identifier used as the upload key prefix. `k` is one more than the
/// number of existing `Session_*` directories; sequence numbers are never
/// reused, even for incomplete earlier sessions. Called once per session
/// start.
pub fn next_session_dir(base: &Path, today: NaiveDate) -> IngestResult<(PathBuf, String)> {
    let date_name = date_dir_name(today);
    let date_dir = base.join(&date_name);
    fs::create_dir_all(&date_dir)?;

    let existing = fs::read_dir(&date_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with("Session_"))
                .unwrap_or(false)
        })
        .count();

    let session_name = format!("Session_{}", existing + 1);
    Ok((
        date_dir.join(&session_name),
        format!("{}/{}", date_name, session_name),
    ))
}

/// Append-only writer for one session's stream files.
pub struct SessionStore {
    session_dir: PathBuf,
    rel_path: String,
    streams: Vec<StreamKind>,
}

impl SessionStore {
    /// Create the session directory and write each enabled stream's header.
    ///
    /// This is the one fatal failure of session start: no directory, no
    /// session.
    pub fn create(
        base: &Path,
        today: NaiveDate,
        config: &IngestConfig,
        streams: &[StreamKind],
    ) -> IngestResult<Self> {
        let (session_dir, rel_path) = next_session_dir(base, today)?;
        fs::create_dir_all(&session_dir)?;

        for kind in streams {
            let path = session_dir.join(kind.file_name());
            fs::write(&path, format!("{}\n", kind.header(config.channel_count)))?;
        }

        Ok(Self {
            session_dir,
            rel_path,
            streams: streams.to_vec(),
        })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Relative `<date>/<Session_k>` identifier handed to the uploader.
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    pub fn streams(&self) -> &[StreamKind] {
        &self.streams
    }

    /// Append one row to a stream file. Opens in append mode and closes per
    /// call; row durability over write throughput.
    pub fn append(&self, kind: StreamKind, row: &Row) -> IngestResult<()> {
        let path = self.session_dir.join(kind.file_name());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(IngestError::Io)?;
        writeln!(file, "{}", row.csv_line())?;
        Ok(())
    }
}
