use std::net::IpAddr;

use tracing::info;
use vidctrl_frame::{AnnotationMode, DrcLevel};
use vidctrl_peer::{ControlServer, MediaPipeline, ServerConfig, SharedStats};

use crate::cmd::{runtime, ServerArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

/// Stand-in pipeline: tracks the requested stream state and logs changes.
#[derive(Debug)]
struct LoggingPipeline {
    payload_size: u16,
    dest: Option<IpAddr>,
    paused: bool,
}

impl LoggingPipeline {
    fn new(payload_size: u16) -> Self {
        Self {
            payload_size,
            dest: None,
            paused: true,
        }
    }
}

impl MediaPipeline for LoggingPipeline {
    fn set_dest_host(&mut self, host: IpAddr) {
        self.dest = Some(host);
        info!(%host, payload_size = self.payload_size, "rtp destination set");
    }

    fn set_resolution_framerate(&mut self, width: u16, height: u16, framerate: u16) {
        self.paused = false;
        info!(width, height, framerate, "capture parameters changed");
    }

    fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            info!("stream paused");
        }
    }

    fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            info!(dest = ?self.dest, "stream resumed");
        }
    }

    fn set_target_bitrate(&mut self, bitrate: u32) {
        info!(bitrate, "encoder target bitrate");
    }

    fn set_annotation_mode(&mut self, mode: AnnotationMode) {
        info!(bits = mode.bits(), "annotation mode");
    }

    fn set_drc_level(&mut self, level: DrcLevel) {
        info!(?level, "drc level");
    }

    fn client_disconnected(&mut self) {
        let dest = self.dest.take();
        info!(?dest, "controller went away");
        self.pause();
    }
}

pub fn run(args: ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ServerConfig {
        bind_host: args.bind,
        control_port: args.port,
        mtu: args.mtu,
    };
    let pipeline = LoggingPipeline::new(config.rtp_payload_size());

    runtime()?.block_on(async move {
        let mut server = ControlServer::bind(&config, pipeline, SharedStats::new())
            .await
            .map_err(|err| peer_error("bind failed", err))?;
        print_record(&Record::listening(server.local_addr()), format);

        server
            .run_until(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("interrupted");
            })
            .await
            .map_err(|err| peer_error("server failed", err))?;
        Ok(SUCCESS)
    })
}
