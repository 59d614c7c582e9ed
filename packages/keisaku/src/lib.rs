pub mod cli;
pub mod controller;
pub mod decode;
pub mod listener;
mod sigv4;
pub mod store;
pub mod types;
pub mod upload;

pub use controller::{
    transition, ChannelPorts, Disposition, Effect, OperatorEvent, Phase, SessionController,
};
pub use listener::ChannelListener;
pub use store::{next_session_dir, SessionStore};
pub use types::{
    AuxMode, Field, IngestConfig, IngestError, IngestResult, Packet, Row, StreamKind,
};
pub use upload::{S3Config, S3Uploader, SessionUploader, UploadError, UploadResult};
