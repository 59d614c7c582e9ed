// Session controller
//
// Operator-facing lifecycle: Idle, Active, Closing. Transitions are a pure
// function from (phase, event) to (phase, effect); the driver owns the
// store, the listeners and the uploader and executes the effects. Exactly
// one session per process invocation by design.

use crate::listener::ChannelListener;
use crate::store::SessionStore;
use crate::types::{IngestConfig, IngestResult, StreamKind};
use crate::upload::SessionUploader;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorEvent {
    Start,
    Stop,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    OpenSession,
    CloseSession { upload: bool },
}

/// What the driver should do after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Exit,
}

/// Pure transition table. Start while Active and Stop while Idle are
/// no-ops, not errors; Abort wins in any phase and never uploads.
pub fn transition(phase: Phase, event: OperatorEvent) -> (Phase, Option<Effect>) {
    match (phase, event) {
        (Phase::Idle, OperatorEvent::Start) => (Phase::Active, Some(Effect::OpenSession)),
        (Phase::Active, OperatorEvent::Stop) => {
            (Phase::Closing, Some(Effect::CloseSession { upload: true }))
        }
        (_, OperatorEvent::Abort) => (Phase::Closing, Some(Effect::CloseSession { upload: false })),
        (phase, _) => (phase, None),
    }
}

/// UDP port assignment per logical channel. Band power is disabled unless a
/// port is supplied.
#[derive(Debug, Clone)]
pub struct ChannelPorts {
    pub time_series: u16,
    pub focus: u16,
    pub auxiliary: u16,
    pub band_power: Option<u16>,
}

impl Default for ChannelPorts {
    fn default() -> Self {
        Self {
            time_series: 12345,
            focus: 12346,
            auxiliary: 12347,
            band_power: None,
        }
    }
}

impl ChannelPorts {
    fn bindings(&self) -> Vec<(StreamKind, u16)> {
        let mut bindings = vec![
            (StreamKind::TimeSeries, self.time_series),
            (StreamKind::Focus, self.focus),
            (StreamKind::Auxiliary, self.auxiliary),
        ];
        if let Some(port) = self.band_power {
            bindings.push((StreamKind::BandPower, port));
        }
        bindings
    }

    pub fn streams(&self) -> Vec<StreamKind> {
        self.bindings().into_iter().map(|(kind, _)| kind).collect()
    }
}

/// Effect-executing driver around the transition table.
pub struct SessionController {
    archive_dir: PathBuf,
    bind_host: IpAddr,
    ports: ChannelPorts,
    config: Arc<IngestConfig>,
    uploader: Arc<dyn SessionUploader>,
    max_session: Option<Duration>,

    phase: Phase,
    store: Option<Arc<SessionStore>>,
    listeners: Vec<ChannelListener>,
    deadline: Option<Instant>,
}

impl SessionController {
    pub fn new(
        archive_dir: PathBuf,
        bind_host: IpAddr,
        ports: ChannelPorts,
        config: IngestConfig,
        uploader: Arc<dyn SessionUploader>,
        max_session: Option<Duration>,
    ) -> Self {
        Self {
            archive_dir,
            bind_host,
            ports,
            config: Arc::new(config),
            uploader,
            max_session,
            phase: Phase::Idle,
            store: None,
            listeners: Vec::new(),
            deadline: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Safety-net stop time for the current session, if one is configured
    /// and a session is active.
    pub fn session_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Bound addresses of the running listeners.
    pub fn listener_addrs(&self) -> Vec<(StreamKind, SocketAddr)> {
        self.listeners
            .iter()
            .map(|listener| (listener.kind(), listener.local_addr()))
            .collect()
    }

    pub fn session_dir(&self) -> Option<PathBuf> {
        self.store
            .as_ref()
            .map(|store| store.session_dir().to_path_buf())
    }

    /// Process one operator event. Events arrive serially; this is the only
    /// writer of the phase.
    pub async fn handle_event(&mut self, event: OperatorEvent) -> Disposition {
        let (next, effect) = transition(self.phase, event);
        self.phase = next;

        match effect {
            None => {
                log::debug!("ignoring {:?} while {:?}", event, self.phase);
                Disposition::Continue
            }
            Some(Effect::OpenSession) => {
                log::info!("starting session");
                if let Err(e) = self.open_session().await {
                    // no session directory, no session; stay Idle
                    log::error!("failed to start session: {}", e);
                    self.phase = Phase::Idle;
                }
                Disposition::Continue
            }
            Some(Effect::CloseSession { upload }) => {
                self.close_session(upload).await;
                self.phase = Phase::Idle;
                Disposition::Exit
            }
        }
    }

    async fn open_session(&mut self) -> IngestResult<()> {
        let streams = self.ports.streams();
        let store = Arc::new(SessionStore::create(
            &self.archive_dir,
            chrono::Local::now().date_naive(),
            &self.config,
            &streams,
        )?);
        log::info!("recording to {}", store.session_dir().display());

        // a bind failure never rolls back the whole session
        for (kind, port) in self.ports.bindings() {
            let addr = SocketAddr::new(self.bind_host, port);
            match ChannelListener::start(kind, addr, Arc::clone(&store), Arc::clone(&self.config))
                .await
            {
                Ok(listener) => self.listeners.push(listener),
                Err(e) => log::error!("{} listener failed to start: {}", kind.label(), e),
            }
        }

        self.store = Some(store);
        self.deadline = self
            .max_session
            .map(|duration| Instant::now() + duration);
        Ok(())
    }

    async fn close_session(&mut self, upload: bool) {
        if !self.listeners.is_empty() {
            log::info!("shutting down listeners");
        }
        for listener in &mut self.listeners {
            listener.stop().await;
        }
        self.listeners.clear();
        self.deadline = None;

        let store = self.store.take();
        if !upload {
            log::info!("aborting session and closing without uploading data");
            return;
        }
        let Some(store) = store else {
            return;
        };

        log::info!("uploading session data to cloud");
        match self.uploader.upload(store.rel_path()).await {
            Ok(()) => log::info!("successfully uploaded session data"),
            Err(e) => {
                // data stays on disk for manual re-upload
                log::error!("error uploading session data: {}", e);
            }
        }
    }
}
