// Upload collaborator
//
// Takes a completed session's relative `<date>/<Session_k>` identifier,
// ensures the destination bucket exists and uploads every file under the
// matching directory, preserving relative paths as the key suffix. Invoked
// at most once per session, after every listener has stopped.

use crate::sigv4::{self, Credentials};
use async_trait::async_trait;
use chrono::{Local, Utc};
use reqwest::Method;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub type UploadResult<T> = Result<T, UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("credentials missing: {0}")]
    Credentials(&'static str),

    #[error("invalid object URL: {0}")]
    Endpoint(String),

    #[error("session directory not found: {0}")]
    SessionNotFound(String),

    #[error("bucket {bucket} unavailable: {reason}")]
    Bucket { bucket: String, reason: String },

    #[error("upload of {key} failed: {reason}")]
    Put { key: String, reason: String },

    #[error("no acquisition GUI recordings found for today")]
    NoGuiRecordings,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// External boundary to off-machine storage. The controller only ever sees
/// this trait; failures surface to the operator but never resurrect the
/// session.
#[async_trait]
pub trait SessionUploader: Send + Sync {
    /// Upload a completed session directory, identified by its relative
    /// `<date>/<Session_k>` path.
    async fn upload(&self, session_rel: &str) -> UploadResult<()>;
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Config {
    /// Region and credentials come from the environment; bucket and
    /// endpoint from the CLI. Missing credentials are caught at upload
    /// time so an operator can record (and abort) without cloud setup.
    pub fn from_env(bucket: String, endpoint: Option<String>) -> Self {
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let endpoint =
            endpoint.unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", region));
        Self {
            endpoint,
            region,
            bucket,
            access_key_id: std::env::var("KEISAKU_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("KEISAKU_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

/// S3-compatible REST client, SigV4 signed, path-style URLs. Works against
/// AWS or a MinIO-style endpoint.
pub struct S3Uploader {
    config: S3Config,
    client: reqwest::Client,
    archive_dir: PathBuf,
    gui_recordings_dir: Option<PathBuf>,
}

impl S3Uploader {
    pub fn new(
        config: S3Config,
        archive_dir: PathBuf,
        gui_recordings_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            archive_dir,
            gui_recordings_dir,
        }
    }

    fn credentials(&self) -> UploadResult<Credentials> {
        if self.config.access_key_id.is_empty() {
            return Err(UploadError::Credentials("KEISAKU_ACCESS_KEY_ID is not set"));
        }
        if self.config.secret_access_key.is_empty() {
            return Err(UploadError::Credentials(
                "KEISAKU_SECRET_ACCESS_KEY is not set",
            ));
        }
        Ok(Credentials {
            access_key_id: self.config.access_key_id.clone(),
            secret_access_key: self.config.secret_access_key.clone(),
        })
    }

    fn url(&self, path: &str) -> UploadResult<reqwest::Url> {
        let raw = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path);
        raw.parse().map_err(|_| UploadError::Endpoint(raw))
    }

    async fn send_signed(
        &self,
        method: Method,
        url: reqwest::Url,
        body: Vec<u8>,
    ) -> UploadResult<reqwest::Response> {
        let credentials = self.credentials()?;
        let payload_hash = sigv4::sha256_hex(&body);
        let mut request = self.client.request(method.clone(), url.clone());
        for (name, value) in sigv4::sign(
            method.as_str(),
            &url,
            &self.config.region,
            &credentials,
            &payload_hash,
            Utc::now(),
        ) {
            request = request.header(name, value);
        }
        Ok(request.body(body).send().await?)
    }

    /// Create the destination bucket; "already owned" is success.
    async fn ensure_bucket(&self) -> UploadResult<()> {
        log::info!("ensuring bucket {} exists", self.config.bucket);
        let url = self.url(&self.config.bucket)?;
        let response = self.send_signed(Method::PUT, url, Vec::new()).await?;
        if response.status().is_success() {
            log::info!("created bucket {}", self.config.bucket);
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if body.contains("BucketAlreadyOwnedByYou") || body.contains("BucketAlreadyExists") {
            log::info!("bucket {} already exists, starting upload", self.config.bucket);
            return Ok(());
        }
        Err(UploadError::Bucket {
            bucket: self.config.bucket.clone(),
            reason: format!("{}: {}", status, body),
        })
    }

    async fn put_file(&self, key: &str, path: &Path) -> UploadResult<()> {
        let body = tokio::fs::read(path).await?;
        let url = self.url(&format!("{}/{}", self.config.bucket, key))?;
        let response = self.send_signed(Method::PUT, url, body).await?;
        if !response.status().is_success() {
            let status = response.status();
            let reason = response.text().await.unwrap_or_default();
            return Err(UploadError::Put {
                key: key.to_string(),
                reason: format!("{}: {}", status, reason),
            });
        }
        log::info!("uploaded {}", key);
        Ok(())
    }

    async fn put_session_files(&self, session_rel: &str) -> UploadResult<()> {
        let session_dir = self.archive_dir.join(session_rel);
        if !session_dir.is_dir() {
            return Err(UploadError::SessionNotFound(session_rel.to_string()));
        }

        log::info!("uploading data CSVs from {}", session_dir.display());
        for entry in WalkDir::new(&session_dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&session_dir).unwrap_or(entry.path());
            let key = format!("{}/{}", session_rel, rel.display());
            self.put_file(&key, entry.path()).await?;
        }
        Ok(())
    }

    /// Upload the raw recording files the acquisition GUI wrote for the
    /// same session, under `<session>/GUI_RAW_FILES/`. The GUI names its
    /// folders `OpenBCISession_YYYY-MM-DD_hh-mm-ss`; today's newest wins.
    async fn put_gui_recordings(&self, recordings_dir: &Path, session_rel: &str) -> UploadResult<()> {
        let today = Local::now().format("%Y-%m-%d").to_string();
        let (newest, multiple) = newest_gui_session(recordings_dir, &today)?;
        if multiple {
            log::warn!("multiple GUI sessions found today, only uploading latest data streams");
        }

        for entry in WalkDir::new(&newest).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let key = format!(
                "{}/GUI_RAW_FILES/{}",
                session_rel,
                entry.file_name().to_string_lossy()
            );
            self.put_file(&key, entry.path()).await?;
        }
        Ok(())
    }
}

/// Today's newest GUI session folder under `recordings_dir`, plus whether
/// more than one matched.
fn newest_gui_session(recordings_dir: &Path, today: &str) -> UploadResult<(PathBuf, bool)> {
    let mut sessions: Vec<PathBuf> = std::fs::read_dir(recordings_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.contains(today))
                    .unwrap_or(false)
        })
        .collect();
    sessions.sort();

    let multiple = sessions.len() > 1;
    sessions
        .pop()
        .map(|newest| (newest, multiple))
        .ok_or(UploadError::NoGuiRecordings)
}

#[async_trait]
impl SessionUploader for S3Uploader {
    async fn upload(&self, session_rel: &str) -> UploadResult<()> {
        self.ensure_bucket().await?;
        self.put_session_files(session_rel).await?;
        if let Some(recordings_dir) = self.gui_recordings_dir.clone() {
            self.put_gui_recordings(&recordings_dir, session_rel).await?;
        }
        Ok(())
    }
}
