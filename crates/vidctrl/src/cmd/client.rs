use tracing::{info, warn};
use vidctrl_frame::AnnotationMode;
use vidctrl_peer::{ControlSession, SessionConfig, SessionEvent, StreamParams};

use crate::cmd::{parse_duration, runtime, ClientArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

pub fn run(args: ClientArgs, format: OutputFormat) -> CliResult<i32> {
    let count = args.count;
    let config = session_config(args)?;
    info!(
        host = %config.host,
        port = config.control_port,
        probe = ?config.probe,
        "starting control session"
    );

    runtime()?.block_on(async move {
        let (handle, mut events, task) = ControlSession::spawn(config);
        handle
            .connect()
            .await
            .map_err(|err| peer_error("session start failed", err))?;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut probes = 0usize;

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("interrupted");
                    break;
                }
                event = events.recv() => match event {
                    Some(SessionEvent::StatusChanged(state)) => {
                        print_record(&Record::status(&state), format);
                    }
                    Some(SessionEvent::ProbeCompleted(result)) => {
                        print_record(&Record::probe(&result), format);
                        probes += 1;
                        if count.is_some_and(|limit| probes >= limit) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        if let Err(err) = handle.shutdown().await {
            warn!(error = %err, "session already stopped");
        }
        match task.await {
            Ok(result) => result.map_err(|err| peer_error("session failed", err))?,
            Err(err) => {
                return Err(CliError::new(
                    INTERNAL,
                    format!("session task failed: {err}"),
                ))
            }
        }
        Ok(SUCCESS)
    })
}

fn session_config(args: ClientArgs) -> CliResult<SessionConfig> {
    Ok(SessionConfig {
        connect_timeout: parse_duration(&args.connect_timeout)?,
        reconnect_delay: parse_duration(&args.reconnect_delay)?,
        probe_interval: parse_duration(&args.probe_interval)?,
        probe: args.probe.into(),
        params: StreamParams {
            width: args.width,
            height: args.height,
            framerate: args.framerate,
            target_bitrate: args.bitrate,
            annotation: args.annotate.map(AnnotationMode::from_bits),
            drc: args.drc.map(Into::into),
            paused: args.paused,
        },
        host: args.host,
        control_port: args.port,
    })
}
