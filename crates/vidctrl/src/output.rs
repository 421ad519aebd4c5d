use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use vidctrl_frame::{Message, StatsReport};
use vidctrl_peer::{ConnectionState, ProbeReply, ProbeResult};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One line of command output. Fields that do not apply are omitted.
#[derive(Debug, Default, Serialize)]
pub struct Record {
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue0: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue1: Option<f32>,
    pub timestamp: String,
}

impl Record {
    fn new(event: &'static str) -> Self {
        Self {
            event,
            timestamp: now_unix_seconds(),
            ..Self::default()
        }
    }

    pub fn status(state: &ConnectionState) -> Self {
        Self {
            state: Some(state.name()),
            reason: state.reason().map(str::to_string),
            ..Self::new("status")
        }
    }

    pub fn probe(result: &ProbeResult) -> Self {
        let record = Self {
            rtt_ms: Some(millis(result.rtt)),
            ..Self::new("probe")
        };
        match result.reply {
            ProbeReply::Pong => Self {
                message: Some("pong"),
                ..record
            },
            ProbeReply::Stats(report) => Self {
                message: Some("stats_response"),
                ..record.with_stats(report)
            },
        }
    }

    pub fn listening(addr: SocketAddr) -> Self {
        Self {
            addr: Some(addr.to_string()),
            ..Self::new("listening")
        }
    }

    pub fn sent(message: &Message, addr: SocketAddr) -> Self {
        Self {
            addr: Some(addr.to_string()),
            message: Some(message.kind().name()),
            ..Self::new("sent")
        }
    }

    pub fn reply(message: &Message, rtt: Duration, addr: SocketAddr) -> Self {
        let record = Self {
            addr: Some(addr.to_string()),
            message: Some(message.kind().name()),
            rtt_ms: Some(millis(rtt)),
            ..Self::new("reply")
        };
        match message {
            Message::StatsResponse(report) => record.with_stats(*report),
            _ => record,
        }
    }

    fn with_stats(self, report: StatsReport) -> Self {
        Self {
            latency: Some(report.latency),
            queue0: Some(report.queue0),
            queue1: Some(report.queue1),
            ..self
        }
    }

    fn columns(&self) -> Vec<(&'static str, String)> {
        let mut columns = vec![("EVENT", self.event.to_string())];
        if let Some(state) = self.state {
            columns.push(("STATE", state.to_string()));
        }
        if let Some(reason) = &self.reason {
            columns.push(("REASON", reason.clone()));
        }
        if let Some(addr) = &self.addr {
            columns.push(("ADDR", addr.clone()));
        }
        if let Some(message) = self.message {
            columns.push(("MESSAGE", message.to_string()));
        }
        if let Some(rtt) = self.rtt_ms {
            columns.push(("RTT_MS", format!("{rtt:.3}")));
        }
        for (name, value) in [
            ("LATENCY", self.latency),
            ("QUEUE0", self.queue0),
            ("QUEUE1", self.queue1),
        ] {
            if let Some(value) = value {
                columns.push((name, format!("{value:.2}")));
            }
        }
        columns
    }
}

pub fn print_record(record: &Record, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let (header, row): (Vec<_>, Vec<_>) = record.columns().into_iter().unzip();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(header)
                .add_row(row);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = record
                .columns()
                .into_iter()
                .map(|(name, value)| format!("{}={value}", name.to_ascii_lowercase()))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
