// End-to-end ingestion tests over loopback UDP with a throwaway archive
// directory and a mock uploader.

use async_trait::async_trait;
use keisaku::controller::{ChannelPorts, Disposition, OperatorEvent, Phase, SessionController};
use keisaku::listener::ChannelListener;
use keisaku::store::SessionStore;
use keisaku::types::{IngestConfig, StreamKind};
use keisaku::upload::{SessionUploader, UploadResult};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UdpSocket;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Default)]
struct MockUploader {
    calls: Mutex<Vec<String>>,
}

impl MockUploader {
    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionUploader for MockUploader {
    async fn upload(&self, session_rel: &str) -> UploadResult<()> {
        self.calls.lock().unwrap().push(session_rel.to_string());
        Ok(())
    }
}

async fn sender() -> UdpSocket {
    UdpSocket::bind((LOOPBACK, 0)).await.unwrap()
}

/// Appends are asynchronous with respect to the sender; poll until the file
/// holds the expected number of complete lines.
async fn wait_for_lines(path: &Path, count: usize) -> String {
    for _ in 0..500 {
        if let Ok(content) = std::fs::read_to_string(path) {
            if content.ends_with('\n') && content.lines().count() >= count {
                return content;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reached {} lines", path.display(), count);
}

fn test_config() -> IngestConfig {
    IngestConfig {
        channel_count: 3,
        ..Default::default()
    }
}

fn ephemeral_ports() -> ChannelPorts {
    ChannelPorts {
        time_series: 0,
        focus: 0,
        auxiliary: 0,
        band_power: None,
    }
}

fn addr_of(controller: &SessionController, kind: StreamKind) -> SocketAddr {
    controller
        .listener_addrs()
        .into_iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, addr)| addr)
        .expect("listener not running")
}

#[tokio::test]
async fn time_series_datagram_lands_in_csv() {
    let tmp = TempDir::new().unwrap();
    let config = Arc::new(test_config());
    let streams = [StreamKind::TimeSeries];
    let store = Arc::new(
        SessionStore::create(
            tmp.path(),
            chrono::Local::now().date_naive(),
            &config,
            &streams,
        )
        .unwrap(),
    );

    let mut listener = ChannelListener::start(
        StreamKind::TimeSeries,
        SocketAddr::new(LOOPBACK, 0),
        Arc::clone(&store),
        Arc::clone(&config),
    )
    .await
    .unwrap();

    sender()
        .await
        .send_to(br#"{"type":"eeg","data":[0.1,0.2,0.3]}"#, listener.local_addr())
        .await
        .unwrap();

    let path = store.session_dir().join("timeSeries.csv");
    let content = wait_for_lines(&path, 2).await;
    listener.stop().await;

    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "time,channel_1,channel_2,channel_3");
    let (ts, values) = lines[1].split_once(',').unwrap();
    ts.parse::<i64>().unwrap();
    assert_eq!(values, "0.1,0.2,0.3");
}

#[tokio::test]
async fn auxiliary_datagram_keeps_only_the_input_pins() {
    let tmp = TempDir::new().unwrap();
    let config = Arc::new(test_config());
    let streams = [StreamKind::Auxiliary];
    let store = Arc::new(
        SessionStore::create(
            tmp.path(),
            chrono::Local::now().date_naive(),
            &config,
            &streams,
        )
        .unwrap(),
    );

    let mut listener = ChannelListener::start(
        StreamKind::Auxiliary,
        SocketAddr::new(LOOPBACK, 0),
        Arc::clone(&store),
        Arc::clone(&config),
    )
    .await
    .unwrap();

    sender()
        .await
        .send_to(br#"{"type":"auxiliary","data":[1,0,1,0,1]}"#, listener.local_addr())
        .await
        .unwrap();

    let path = store.session_dir().join("auxillary.csv");
    let content = wait_for_lines(&path, 2).await;
    listener.stop().await;

    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "time,shallow,deep");
    let (_, pins) = lines[1].split_once(',').unwrap();
    assert_eq!(pins, "1,0");
}

#[tokio::test]
async fn malformed_datagram_leaves_listener_healthy() {
    let tmp = TempDir::new().unwrap();
    let config = Arc::new(test_config());
    let streams = [StreamKind::Focus];
    let store = Arc::new(
        SessionStore::create(
            tmp.path(),
            chrono::Local::now().date_naive(),
            &config,
            &streams,
        )
        .unwrap(),
    );

    let mut listener = ChannelListener::start(
        StreamKind::Focus,
        SocketAddr::new(LOOPBACK, 0),
        Arc::clone(&store),
        Arc::clone(&config),
    )
    .await
    .unwrap();

    let socket = sender().await;
    socket
        .send_to(b"definitely not json", listener.local_addr())
        .await
        .unwrap();
    socket
        .send_to(br#"{"type":"focus","data":2.9}"#, listener.local_addr())
        .await
        .unwrap();

    let path = store.session_dir().join("focus.csv");
    let content = wait_for_lines(&path, 2).await;
    listener.stop().await;

    // only the well-formed datagram produced a row
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(",2"));
}

#[tokio::test]
async fn full_session_lifecycle_uploads_once() {
    let tmp = TempDir::new().unwrap();
    let uploader = Arc::new(MockUploader::default());
    let mut controller = SessionController::new(
        tmp.path().to_path_buf(),
        LOOPBACK,
        ephemeral_ports(),
        test_config(),
        Arc::clone(&uploader) as Arc<dyn SessionUploader>,
        None,
    );

    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(controller.handle_event(OperatorEvent::Start).await, Disposition::Continue);
    assert_eq!(controller.phase(), Phase::Active);
    assert_eq!(controller.listener_addrs().len(), 3);

    // a second start is ignored
    assert_eq!(controller.handle_event(OperatorEvent::Start).await, Disposition::Continue);
    assert_eq!(controller.listener_addrs().len(), 3);

    let session_dir = controller.session_dir().unwrap();
    sender()
        .await
        .send_to(
            br#"{"type":"eeg","data":[0.5,0.6,0.7]}"#,
            addr_of(&controller, StreamKind::TimeSeries),
        )
        .await
        .unwrap();
    wait_for_lines(&session_dir.join("timeSeries.csv"), 2).await;

    assert_eq!(controller.handle_event(OperatorEvent::Stop).await, Disposition::Exit);
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(uploader.call_count(), 1);

    let uploaded_rel = uploader.calls.lock().unwrap()[0].clone();
    assert!(session_dir.ends_with(&uploaded_rel));

    // stop again: no-op, no second upload
    assert_eq!(controller.handle_event(OperatorEvent::Stop).await, Disposition::Continue);
    assert_eq!(uploader.call_count(), 1);
}

#[tokio::test]
async fn abort_never_touches_the_uploader() {
    let tmp = TempDir::new().unwrap();
    let uploader = Arc::new(MockUploader::default());
    let mut controller = SessionController::new(
        tmp.path().to_path_buf(),
        LOOPBACK,
        ephemeral_ports(),
        test_config(),
        Arc::clone(&uploader) as Arc<dyn SessionUploader>,
        None,
    );

    controller.handle_event(OperatorEvent::Start).await;
    let session_dir = controller.session_dir().unwrap();

    assert_eq!(controller.handle_event(OperatorEvent::Abort).await, Disposition::Exit);
    assert_eq!(uploader.call_count(), 0);
    // appended data stays on disk
    assert!(session_dir.join("timeSeries.csv").exists());
}

#[tokio::test]
async fn bind_failure_leaves_other_channels_running() {
    let tmp = TempDir::new().unwrap();
    // occupy a port so the time-series listener cannot bind it
    let occupied = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    let ports = ChannelPorts {
        time_series: occupied.local_addr().unwrap().port(),
        focus: 0,
        auxiliary: 0,
        band_power: None,
    };

    let uploader = Arc::new(MockUploader::default());
    let mut controller = SessionController::new(
        tmp.path().to_path_buf(),
        LOOPBACK,
        ports,
        test_config(),
        Arc::clone(&uploader) as Arc<dyn SessionUploader>,
        None,
    );

    controller.handle_event(OperatorEvent::Start).await;
    assert_eq!(controller.phase(), Phase::Active);

    let running: Vec<StreamKind> = controller
        .listener_addrs()
        .into_iter()
        .map(|(kind, _)| kind)
        .collect();
    assert!(!running.contains(&StreamKind::TimeSeries));
    assert!(running.contains(&StreamKind::Focus));
    assert!(running.contains(&StreamKind::Auxiliary));

    controller.handle_event(OperatorEvent::Stop).await;
    assert_eq!(uploader.call_count(), 1);
}
