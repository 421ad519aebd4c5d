mod client;
mod send;
mod server;
mod version;

use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use vidctrl_frame::DrcLevel;
use vidctrl_peer::ProbeKind;
use vidctrl_transport::DEFAULT_CONTROL_PORT;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hold a control session to a producer and report status and probes.
    Client(ClientArgs),
    /// Run the producer end of the control channel.
    Server(ServerArgs),
    /// Send one control message and print the reply, if any.
    ///
    /// The producer serves a single controller; connecting replaces it.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Producer host or IP address.
    #[arg(env = "VIDCTRL_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Producer control port.
    #[arg(long, env = "VIDCTRL_PORT", default_value_t = DEFAULT_CONTROL_PORT)]
    pub port: u16,

    #[arg(long, env = "VIDCTRL_WIDTH", default_value_t = 320)]
    pub width: u16,

    #[arg(long, env = "VIDCTRL_HEIGHT", default_value_t = 240)]
    pub height: u16,

    #[arg(long, env = "VIDCTRL_FRAMERATE", default_value_t = 30)]
    pub framerate: u16,

    /// Encoder target in bits per second.
    #[arg(long, env = "VIDCTRL_BITRATE", default_value_t = 1_000_000)]
    pub bitrate: u32,

    /// Annotation flag bits to request on connect.
    #[arg(long, value_name = "BITS")]
    pub annotate: Option<u16>,

    /// DRC level to request on connect.
    #[arg(long, value_enum)]
    pub drc: Option<DrcArg>,

    /// Ask the producer to stay paused.
    #[arg(long)]
    pub paused: bool,

    /// Probe message sent on every interval.
    #[arg(long, value_enum, default_value = "stats")]
    pub probe: ProbeArg,

    /// Interval between probes (e.g. 1s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "1s")]
    pub probe_interval: String,

    /// Delay before reconnecting after a disconnect.
    #[arg(long, value_name = "DURATION", default_value = "1500ms")]
    pub reconnect_delay: String,

    /// Give up a connect attempt after this long.
    #[arg(long, value_name = "DURATION", default_value = "10s")]
    pub connect_timeout: String,

    /// Exit after this many completed probes.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, env = "VIDCTRL_SERVER_HOST", default_value = "0.0.0.0")]
    pub bind: String,

    /// Control port. Use 0 for an ephemeral port.
    #[arg(long, env = "VIDCTRL_PORT", default_value_t = DEFAULT_CONTROL_PORT)]
    pub port: u16,

    /// MTU of the media path; sets the RTP payload size.
    #[arg(long, env = "VIDCTRL_SERVER_MTU", default_value_t = 1500)]
    pub mtu: u16,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Producer host or IP address.
    #[arg(env = "VIDCTRL_HOST")]
    pub host: String,

    /// Producer control port.
    #[arg(long, env = "VIDCTRL_PORT", default_value_t = DEFAULT_CONTROL_PORT)]
    pub port: u16,

    /// How long to wait for the connection and any reply.
    #[arg(long, value_name = "DURATION", default_value = "5s")]
    pub timeout: String,

    #[command(subcommand)]
    pub message: SendMessage,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SendMessage {
    Pause,
    Resume,
    /// Measure round-trip time.
    Ping,
    /// Fetch the producer's averaged pipeline stats.
    Stats,
    Resolution {
        width: u16,
        height: u16,
        framerate: u16,
    },
    /// Encoder target in bits per second.
    Bitrate { bitrate: u32 },
    /// Annotation flag bits.
    Annotate { bits: u16 },
    Drc {
        #[arg(value_enum)]
        level: DrcArg,
    },
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum DrcArg {
    Off,
    Low,
    Medium,
    High,
}

impl From<DrcArg> for DrcLevel {
    fn from(arg: DrcArg) -> Self {
        match arg {
            DrcArg::Off => DrcLevel::Off,
            DrcArg::Low => DrcLevel::Low,
            DrcArg::Medium => DrcLevel::Medium,
            DrcArg::High => DrcLevel::High,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ProbeArg {
    Ping,
    Stats,
}

impl From<ProbeArg> for ProbeKind {
    fn from(arg: ProbeArg) -> Self {
        match arg {
            ProbeArg::Ping => ProbeKind::Ping,
            ProbeArg::Stats => ProbeKind::Stats,
        }
    }
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Client(args) => client::run(args, format),
        Command::Server(args) => server::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Every session runs on one thread; state is only touched from its task.
fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))
}

/// Parses `5s`, `500ms` or a bare number of seconds.
fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
