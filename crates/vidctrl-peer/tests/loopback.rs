use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use vidctrl_frame::{AnnotationMode, DrcLevel, StatsReport};
use vidctrl_peer::{
    ConnectionState, ControlServer, ControlSession, MediaPipeline, ProbeKind, ProbeReply,
    ServerConfig, SessionConfig, SessionEvent, SharedStats,
};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
struct RecordingPipeline {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingPipeline {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }

    async fn wait_for(&self, count: usize) -> Vec<String> {
        timeout(WAIT, async {
            loop {
                let calls = self.calls();
                if calls.len() >= count {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pipeline calls should arrive")
    }
}

impl MediaPipeline for RecordingPipeline {
    fn set_dest_host(&mut self, host: IpAddr) {
        self.push(format!("dest {host}"));
    }

    fn set_resolution_framerate(&mut self, width: u16, height: u16, framerate: u16) {
        self.push(format!("res {width}x{height}@{framerate}"));
    }

    fn pause(&mut self) {
        self.push("pause".to_string());
    }

    fn resume(&mut self) {
        self.push("resume".to_string());
    }

    fn set_target_bitrate(&mut self, bitrate: u32) {
        self.push(format!("bitrate {bitrate}"));
    }

    fn set_annotation_mode(&mut self, mode: AnnotationMode) {
        self.push(format!("annotate {}", mode.bits()));
    }

    fn set_drc_level(&mut self, level: DrcLevel) {
        self.push(format!("drc {level:?}"));
    }
}

struct RunningServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<vidctrl_peer::Result<()>>,
}

impl RunningServer {
    async fn start(port: u16, pipeline: RecordingPipeline, stats: SharedStats) -> Self {
        let config = ServerConfig {
            bind_host: "127.0.0.1".to_string(),
            control_port: port,
            ..ServerConfig::default()
        };
        let mut server = ControlServer::bind(&config, pipeline, stats)
            .await
            .expect("server should bind");
        let addr = server.local_addr();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
        });
        Self { addr, stop, task }
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.task
            .await
            .expect("server task joins")
            .expect("server shuts down cleanly");
    }
}

fn session_config(port: u16) -> SessionConfig {
    SessionConfig {
        host: "127.0.0.1".to_string(),
        control_port: port,
        reconnect_delay: Duration::from_millis(50),
        probe_interval: Duration::from_millis(50),
        ..SessionConfig::default()
    }
}

async fn wait_for_status(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    wanted: fn(&ConnectionState) -> bool,
) -> ConnectionState {
    timeout(WAIT, async {
        loop {
            match events.recv().await.expect("session still running") {
                SessionEvent::StatusChanged(state) if wanted(&state) => return state,
                _ => {}
            }
        }
    })
    .await
    .expect("status should change")
}

#[tokio::test]
async fn connect_replays_parameters_and_probes_stats() {
    let pipeline = RecordingPipeline::default();
    let stats = SharedStats::new();
    stats.record(8.0, 1.0, 2.0);
    let server = RunningServer::start(0, pipeline.clone(), stats).await;

    let (handle, mut events, task) = ControlSession::spawn(session_config(server.addr.port()));
    assert!(!handle
        .resolution_changed(640, 480)
        .await
        .expect("session alive"));
    assert!(!handle.framerate_changed(25).await.expect("session alive"));
    handle.connect().await.expect("session alive");

    wait_for_status(&mut events, ConnectionState::is_connected).await;
    assert_eq!(
        pipeline.wait_for(4).await,
        vec!["dest 127.0.0.1", "bitrate 1000000", "res 640x480@25", "resume"]
    );

    let probe = timeout(WAIT, async {
        loop {
            if let Some(SessionEvent::ProbeCompleted(result)) = events.recv().await {
                return result;
            }
        }
    })
    .await
    .expect("probe should complete");
    assert_eq!(
        probe.reply,
        ProbeReply::Stats(StatsReport {
            latency: 8.0,
            queue0: 1.0,
            queue1: 2.0,
        })
    );

    handle.shutdown().await.expect("session alive");
    task.await.expect("task joins").expect("clean shutdown");
    server.stop().await;
}

#[tokio::test]
async fn ping_probes_complete_repeatedly() {
    let server = RunningServer::start(0, RecordingPipeline::default(), SharedStats::new()).await;

    let config = SessionConfig {
        probe: ProbeKind::Ping,
        ..session_config(server.addr.port())
    };
    let (handle, mut events, task) = ControlSession::spawn(config);
    handle.connect().await.expect("session alive");

    let pongs = timeout(WAIT, async {
        let mut pongs = 0;
        while pongs < 3 {
            if let Some(SessionEvent::ProbeCompleted(result)) = events.recv().await {
                assert_eq!(result.reply, ProbeReply::Pong);
                pongs += 1;
            }
        }
        pongs
    })
    .await
    .expect("pongs should arrive");
    assert_eq!(pongs, 3);

    handle.shutdown().await.expect("session alive");
    task.await.expect("task joins").expect("clean shutdown");
    server.stop().await;
}

#[tokio::test]
async fn intents_reach_pipeline_while_connected() {
    let pipeline = RecordingPipeline::default();
    let server = RunningServer::start(0, pipeline.clone(), SharedStats::new()).await;

    let (handle, mut events, task) = ControlSession::spawn(session_config(server.addr.port()));
    handle.connect().await.expect("session alive");
    wait_for_status(&mut events, ConnectionState::is_connected).await;
    pipeline.wait_for(4).await;

    assert!(handle.pause().await.expect("session alive"));
    assert!(handle
        .set_drc_level(DrcLevel::Medium)
        .await
        .expect("session alive"));
    assert!(handle
        .set_target_bitrate(2_000_000)
        .await
        .expect("session alive"));

    let calls = pipeline.wait_for(7).await;
    assert_eq!(
        &calls[4..],
        &["pause", "drc Medium", "bitrate 2000000"]
    );

    handle.shutdown().await.expect("session alive");
    task.await.expect("task joins").expect("clean shutdown");
    server.stop().await;
}

#[tokio::test]
async fn session_reconnects_after_server_restart() {
    let pipeline = RecordingPipeline::default();
    let server = RunningServer::start(0, pipeline.clone(), SharedStats::new()).await;
    let port = server.addr.port();

    let (handle, mut events, task) = ControlSession::spawn(session_config(port));
    handle.connect().await.expect("session alive");
    wait_for_status(&mut events, ConnectionState::is_connected).await;
    assert!(handle.pause().await.expect("session alive"));

    server.stop().await;
    let state = wait_for_status(&mut events, |s| {
        matches!(s, ConnectionState::Disconnected { .. })
    })
    .await;
    assert!(state.reason().is_some());

    let restarted_pipeline = RecordingPipeline::default();
    let restarted = RunningServer::start(port, restarted_pipeline.clone(), SharedStats::new()).await;
    wait_for_status(&mut events, ConnectionState::is_connected).await;

    // The cached pause is replayed instead of resume.
    assert_eq!(
        restarted_pipeline.wait_for(4).await,
        vec!["dest 127.0.0.1", "bitrate 1000000", "res 320x240@30", "pause"]
    );

    handle.shutdown().await.expect("session alive");
    task.await.expect("task joins").expect("clean shutdown");
    restarted.stop().await;
}

#[tokio::test]
async fn set_endpoint_reconnects_immediately() {
    let pipeline = RecordingPipeline::default();
    let server = RunningServer::start(0, pipeline.clone(), SharedStats::new()).await;

    let (handle, mut events, task) = ControlSession::spawn(session_config(server.addr.port()));
    handle.connect().await.expect("session alive");
    wait_for_status(&mut events, ConnectionState::is_connected).await;

    handle
        .set_endpoint("127.0.0.1", true)
        .await
        .expect("session alive");
    let state = wait_for_status(&mut events, |s| {
        matches!(s, ConnectionState::Disconnected { .. })
    })
    .await;
    assert_eq!(state.reason(), Some("connect to new ip address"));
    wait_for_status(&mut events, ConnectionState::is_connected).await;

    let calls = timeout(WAIT, async {
        loop {
            let calls = pipeline.calls();
            let dests = calls.iter().filter(|c| c.starts_with("dest")).count();
            if dests == 2 && calls.last().map(String::as_str) == Some("resume") {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second connection should replay parameters");
    assert_eq!(
        &calls[calls.len() - 4..],
        &["dest 127.0.0.1", "bitrate 1000000", "res 320x240@30", "resume"]
    );

    handle.shutdown().await.expect("session alive");
    task.await.expect("task joins").expect("clean shutdown");
    server.stop().await;
}
