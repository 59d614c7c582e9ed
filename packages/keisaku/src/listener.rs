// Channel listener
//
// One bound UDP endpoint per logical channel for the lifetime of an active
// session. The receive loop stamps each datagram with its receipt time,
// decodes it and appends the resulting row. Decode and append failures are
// logged and the loop keeps receiving; only the stop signal or a socket
// error ends it.

use crate::decode;
use crate::store::SessionStore;
use crate::types::{IngestConfig, IngestError, IngestResult, StreamKind};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const RECV_BUFFER_SIZE: usize = 8192;

pub struct ChannelListener {
    kind: StreamKind,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChannelListener {
    /// Bind `addr` and start the receive loop. A bind failure is isolated
    /// to this channel; the caller decides whether the session proceeds.
    pub async fn start(
        kind: StreamKind,
        addr: SocketAddr,
        store: Arc<SessionStore>,
        config: Arc<IngestConfig>,
    ) -> IngestResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| IngestError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;
        log::info!("started {} listener on {}", kind.label(), local_addr);

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            receive_loop(kind, socket, store, config, task_cancel).await;
            log::info!("{} socket closed", kind.label());
        });

        Ok(Self {
            kind,
            local_addr,
            cancel,
            task: Some(task),
        })
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop receiving and release the socket. Idempotent and non-throwing;
    /// safe to call repeatedly or after the loop already ended. A datagram
    /// in flight finishes its decode and append before the task exits.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("error closing {} listener: {}", self.kind.label(), e);
            }
        }
    }
}

impl Drop for ChannelListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop(
    kind: StreamKind,
    socket: UdpSocket,
    store: Arc<SessionStore>,
    config: Arc<IngestConfig>,
    cancel: CancellationToken,
) {
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            received = socket.recv_from(&mut buffer) => {
                match received {
                    Ok((len, _peer)) => {
                        let ts_ms = Utc::now().timestamp_millis();
                        handle_datagram(kind, &config, &store, &buffer[..len], ts_ms);
                    }
                    Err(e) => {
                        log::error!("{} receive error: {}", kind.label(), e);
                        break;
                    }
                }
            }
        }
    }
}

fn handle_datagram(
    kind: StreamKind,
    config: &IngestConfig,
    store: &SessionStore,
    payload: &[u8],
    ts_ms: i64,
) {
    match decode::decode(kind, config, payload, ts_ms) {
        Ok(Some(row)) => {
            log::debug!(
                "{}:: raw: {} parsed: {}",
                kind.label(),
                String::from_utf8_lossy(payload),
                row.csv_line()
            );
            // one lost row must not stop the listener
            if let Err(e) = store.append(kind, &row) {
                log::error!("{} append failed: {}", kind.label(), e);
            }
        }
        Ok(None) => {
            log::debug!("{} datagram discarded", kind.label());
        }
        Err(e) => {
            log::error!("{} decode failed: {}", kind.label(), e);
        }
    }
}
