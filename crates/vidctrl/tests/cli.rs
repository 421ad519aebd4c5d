#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Child, ChildStdout, Command, Output, Stdio};

use serde_json::Value;

fn vidctrl() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vidctrl"));
    cmd.args(["--log-level", "error", "--format", "json"]);
    for var in ["VIDCTRL_HOST", "VIDCTRL_PORT", "VIDCTRL_LOG_LEVEL"] {
        cmd.env_remove(var);
    }
    cmd
}

/// A `vidctrl server` on an ephemeral loopback port, killed on drop.
struct Server {
    child: Child,
    // Held open so later server output never hits a closed pipe.
    _stdout: BufReader<ChildStdout>,
    port: u16,
}

impl Server {
    fn start() -> Self {
        let mut child = vidctrl()
            .args(["server", "--bind", "127.0.0.1", "--port", "0"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("server should start");

        let stdout = child.stdout.take().expect("stdout is piped");
        let mut stdout = BufReader::new(stdout);
        let mut line = String::new();
        stdout
            .read_line(&mut line)
            .expect("server should announce its address");
        let record: Value = serde_json::from_str(&line).expect("listening record is json");
        assert_eq!(record["event"], "listening");
        let port = record["addr"]
            .as_str()
            .and_then(|addr| addr.rsplit(':').next())
            .and_then(|port| port.parse().ok())
            .expect("addr carries a port");

        Self {
            child,
            _stdout: stdout,
            port,
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout lines are json"))
        .collect()
}

#[test]
fn version_prints_name_and_version() {
    let output = vidctrl().arg("version").output().expect("version runs");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("vidctrl {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn send_to_closed_port_is_a_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
        listener.local_addr().expect("local addr").port()
    };

    let output = vidctrl()
        .args(["send", "127.0.0.1", "--port", &port.to_string(), "ping"])
        .output()
        .expect("send runs");
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to connect"));
}

#[test]
fn send_ping_and_stats_get_replies() {
    let server = Server::start();
    let port = server.port.to_string();

    let output = vidctrl()
        .args(["send", "127.0.0.1", "--port", &port, "ping"])
        .output()
        .expect("send runs");
    assert!(output.status.success(), "{output:?}");
    let records = json_lines(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["event"], "reply");
    assert_eq!(records[0]["message"], "pong");
    assert!(records[0]["rtt_ms"].is_number());

    let output = vidctrl()
        .args(["send", "127.0.0.1", "--port", &port, "stats"])
        .output()
        .expect("send runs");
    assert!(output.status.success(), "{output:?}");
    let records = json_lines(&output);
    assert_eq!(records[0]["message"], "stats_response");
    assert_eq!(records[0]["latency"], 0.0);
}

#[test]
fn send_command_without_reply_reports_sent() {
    let server = Server::start();

    let output = vidctrl()
        .args([
            "send",
            "127.0.0.1",
            "--port",
            &server.port.to_string(),
            "drc",
            "high",
        ])
        .output()
        .expect("send runs");
    assert!(output.status.success(), "{output:?}");
    let records = json_lines(&output);
    assert_eq!(records[0]["event"], "sent");
    assert_eq!(records[0]["message"], "set_drc_level");
}

#[test]
fn client_connects_and_reports_probes() {
    let server = Server::start();

    let output = vidctrl()
        .args([
            "client",
            "127.0.0.1",
            "--port",
            &server.port.to_string(),
            "--probe",
            "ping",
            "--probe-interval",
            "50ms",
            "--count",
            "2",
        ])
        .output()
        .expect("client runs");
    assert!(output.status.success(), "{output:?}");

    let records = json_lines(&output);
    let states: Vec<_> = records
        .iter()
        .filter(|r| r["event"] == "status")
        .map(|r| r["state"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(states, vec!["connecting", "connected"]);

    let probes: Vec<_> = records.iter().filter(|r| r["event"] == "probe").collect();
    assert_eq!(probes.len(), 2);
    assert!(probes.iter().all(|p| p["message"] == "pong"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let output = vidctrl().arg("teleport").output().expect("runs");
    assert_eq!(output.status.code(), Some(2));
}
