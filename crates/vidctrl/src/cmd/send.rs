use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_util::codec::Framed;
use tracing::debug;
use vidctrl_frame::{AnnotationMode, ControlCodec, Message};

use crate::cmd::{parse_duration, runtime, SendArgs, SendMessage};
use crate::exit::{frame_error, io_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_record, OutputFormat, Record};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait = parse_duration(&args.timeout)?;
    let message = build_message(&args.message);
    let target = format!("{}:{}", args.host, args.port);

    runtime()?.block_on(async move {
        let stream = timeout(wait, TcpStream::connect((args.host.as_str(), args.port)))
            .await
            .map_err(|_| CliError::new(TIMEOUT, format!("connect to {target} timed out")))?
            .map_err(|err| io_error(&format!("failed to connect to {target}"), err))?;
        stream
            .set_nodelay(true)
            .map_err(|err| io_error("failed to set TCP_NODELAY", err))?;
        let peer = stream
            .peer_addr()
            .map_err(|err| io_error("failed to read peer address", err))?;

        let mut framed = Framed::new(stream, ControlCodec::new());
        let sent_at = Instant::now();
        framed
            .send(message.clone())
            .await
            .map_err(|err| frame_error("send failed", err))?;
        debug!(kind = %message.kind(), %peer, "sent");

        if !expects_reply(&message) {
            print_record(&Record::sent(&message, peer), format);
            return Ok(SUCCESS);
        }

        let reply = loop {
            let next = timeout(wait, framed.next()).await.map_err(|_| {
                CliError::new(TIMEOUT, format!("no reply from {target} within {wait:?}"))
            })?;
            match next {
                Some(Ok(reply)) if is_reply_to(&message, &reply) => break reply,
                Some(Ok(other)) => debug!(kind = %other.kind(), "ignoring unrelated message"),
                Some(Err(err)) => return Err(frame_error("receive failed", err)),
                None => {
                    return Err(CliError::new(
                        FAILURE,
                        format!("{target} closed the connection before replying"),
                    ))
                }
            }
        };

        print_record(&Record::reply(&reply, sent_at.elapsed(), peer), format);
        Ok(SUCCESS)
    })
}

fn build_message(message: &SendMessage) -> Message {
    match *message {
        SendMessage::Pause => Message::Pause,
        SendMessage::Resume => Message::Resume,
        SendMessage::Ping => Message::Ping,
        SendMessage::Stats => Message::StatsRequest,
        SendMessage::Resolution {
            width,
            height,
            framerate,
        } => Message::SetResolutionFramerate {
            width,
            height,
            framerate,
        },
        SendMessage::Bitrate { bitrate } => Message::SetTargetBitrate(bitrate),
        SendMessage::Annotate { bits } => {
            Message::SetAnnotationMode(AnnotationMode::from_bits(bits))
        }
        SendMessage::Drc { level } => Message::SetDrcLevel(level.into()),
    }
}

fn expects_reply(message: &Message) -> bool {
    matches!(message, Message::Ping | Message::StatsRequest)
}

fn is_reply_to(request: &Message, reply: &Message) -> bool {
    matches!(
        (request, reply),
        (Message::Ping, Message::Pong) | (Message::StatsRequest, Message::StatsResponse(_))
    )
}
