use std::fmt;
use std::ops::BitOr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Size of the big-endian length prefix in front of every frame.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Default limit on unframed bytes a reader will hold: 50,000.
pub const DEFAULT_MAX_BUFFERED: usize = 50_000;

/// Message kind tag, the first byte of every frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    SetResolutionFramerate = 0,
    Pause = 1,
    Resume = 2,
    StatsRequest = 3,
    StatsResponse = 4,
    SetAnnotationMode = 5,
    SetDrcLevel = 6,
    SetTargetBitrate = 7,
    Ping = 8,
    Pong = 9,
}

impl MessageKind {
    /// Payload size in bytes for this kind (excluding the kind byte).
    pub const fn payload_len(self) -> usize {
        match self {
            Self::SetResolutionFramerate => 6,
            Self::Pause | Self::Resume | Self::StatsRequest | Self::Ping | Self::Pong => 0,
            Self::StatsResponse => 12,
            Self::SetAnnotationMode => 2,
            Self::SetDrcLevel => 1,
            Self::SetTargetBitrate => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::SetResolutionFramerate => "set_resolution_framerate",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::StatsRequest => "stats_request",
            Self::StatsResponse => "stats_response",
            Self::SetAnnotationMode => "set_annotation_mode",
            Self::SetDrcLevel => "set_drc_level",
            Self::SetTargetBitrate => "set_target_bitrate",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => Self::SetResolutionFramerate,
            1 => Self::Pause,
            2 => Self::Resume,
            3 => Self::StatsRequest,
            4 => Self::StatsResponse,
            5 => Self::SetAnnotationMode,
            6 => Self::SetDrcLevel,
            7 => Self::SetTargetBitrate,
            8 => Self::Ping,
            9 => Self::Pong,
            other => return Err(FrameError::UnknownKind(other)),
        })
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Camera annotation flags, carried as a 16-bit set.
///
/// Bit values follow the camera firmware's annotate flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AnnotationMode(u16);

impl AnnotationMode {
    pub const NONE: Self = Self(0);
    pub const TEXT: Self = Self(1);
    pub const CUSTOM_TEXT: Self = Self(2);
    pub const TIME: Self = Self(4);
    pub const DATE: Self = Self(8);
    pub const SHUTTER: Self = Self(16);
    pub const GAIN: Self = Self(32);
    pub const LENS: Self = Self(64);
    pub const CAF: Self = Self(128);
    pub const MOTION: Self = Self(256);
    pub const FRAME_NUMBER: Self = Self(512);
    pub const BLACK_BACKGROUND: Self = Self(1024);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AnnotationMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Dynamic range compression strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DrcLevel {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl TryFrom<u8> for DrcLevel {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(FrameError::InvalidDrcLevel(other)),
        }
    }
}

/// Averaged pipeline health figures carried by a stats response.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsReport {
    pub latency: f32,
    pub queue0: f32,
    pub queue1: f32,
}

/// A decoded control message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SetResolutionFramerate {
        width: u16,
        height: u16,
        framerate: u16,
    },
    Pause,
    Resume,
    StatsRequest,
    StatsResponse(StatsReport),
    SetAnnotationMode(AnnotationMode),
    SetDrcLevel(DrcLevel),
    SetTargetBitrate(u32),
    Ping,
    Pong,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::SetResolutionFramerate { .. } => MessageKind::SetResolutionFramerate,
            Self::Pause => MessageKind::Pause,
            Self::Resume => MessageKind::Resume,
            Self::StatsRequest => MessageKind::StatsRequest,
            Self::StatsResponse(_) => MessageKind::StatsResponse,
            Self::SetAnnotationMode(_) => MessageKind::SetAnnotationMode,
            Self::SetDrcLevel(_) => MessageKind::SetDrcLevel,
            Self::SetTargetBitrate(_) => MessageKind::SetTargetBitrate,
            Self::Ping => MessageKind::Ping,
            Self::Pong => MessageKind::Pong,
        }
    }

    /// Total wire size including the length prefix.
    pub fn wire_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + 1 + self.kind().payload_len()
    }

    /// Encode this message into the wire format.
    ///
    /// ```text
    /// ┌──────────────┬──────────┬──────────────────────────┐
    /// │ Length (2B)  │ Kind     │ Payload                  │
    /// │ big-endian   │ (1B)     │ (Length - 1 bytes, BE)   │
    /// └──────────────┴──────────┴──────────────────────────┘
    /// ```
    pub fn encode(&self, dst: &mut BytesMut) {
        let kind = self.kind();
        dst.reserve(self.wire_size());
        // Payloads are at most 12 bytes, so this never truncates.
        dst.put_u16((1 + kind.payload_len()) as u16);
        dst.put_u8(kind as u8);

        match *self {
            Self::SetResolutionFramerate {
                width,
                height,
                framerate,
            } => {
                dst.put_u16(width);
                dst.put_u16(height);
                dst.put_u16(framerate);
            }
            Self::StatsResponse(report) => {
                dst.put_f32(report.latency);
                dst.put_f32(report.queue0);
                dst.put_f32(report.queue1);
            }
            Self::SetAnnotationMode(mode) => dst.put_u16(mode.bits()),
            Self::SetDrcLevel(level) => dst.put_u8(level as u8),
            Self::SetTargetBitrate(bitrate) => dst.put_u32(bitrate),
            Self::Pause | Self::Resume | Self::StatsRequest | Self::Ping | Self::Pong => {}
        }
    }

    /// Encode into a standalone buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a frame body (kind byte followed by payload).
    ///
    /// Bytes past the payload size of the kind are ignored.
    pub fn decode(body: &[u8]) -> Result<Self> {
        match body.split_first() {
            Some((&tag, payload)) => Self::decode_parts(tag, payload),
            None => Err(FrameError::EmptyFrame),
        }
    }

    fn decode_parts(tag: u8, mut payload: &[u8]) -> Result<Self> {
        let kind = MessageKind::try_from(tag)?;
        let expected = kind.payload_len();
        if payload.len() < expected {
            return Err(FrameError::Truncated {
                kind: kind.name(),
                expected,
                actual: payload.len(),
            });
        }

        let message = match kind {
            MessageKind::SetResolutionFramerate => Self::SetResolutionFramerate {
                width: payload.get_u16(),
                height: payload.get_u16(),
                framerate: payload.get_u16(),
            },
            MessageKind::Pause => Self::Pause,
            MessageKind::Resume => Self::Resume,
            MessageKind::StatsRequest => Self::StatsRequest,
            MessageKind::StatsResponse => Self::StatsResponse(StatsReport {
                latency: payload.get_f32(),
                queue0: payload.get_f32(),
                queue1: payload.get_f32(),
            }),
            MessageKind::SetAnnotationMode => {
                Self::SetAnnotationMode(AnnotationMode::from_bits(payload.get_u16()))
            }
            MessageKind::SetDrcLevel => Self::SetDrcLevel(DrcLevel::try_from(payload.get_u8())?),
            MessageKind::SetTargetBitrate => Self::SetTargetBitrate(payload.get_u32()),
            MessageKind::Ping => Self::Ping,
            MessageKind::Pong => Self::Pong,
        };
        Ok(message)
    }
}

/// One reassembled frame: the kind byte and the bytes that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Parse the typed message carried by this frame.
    pub fn message(&self) -> Result<Message> {
        Message::decode_parts(self.kind, &self.payload)
    }

    /// The total wire size of this frame (prefix + kind + payload).
    pub fn wire_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + 1 + self.payload.len()
    }
}

/// Configuration for frame reassembly.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum unframed bytes held by a reader. Default: 50,000.
    pub max_buffered: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::SetResolutionFramerate {
                width: 640,
                height: 480,
                framerate: 30,
            },
            Message::Pause,
            Message::Resume,
            Message::StatsRequest,
            Message::StatsResponse(StatsReport {
                latency: 12.5,
                queue0: 0.1,
                queue1: f32::MIN_POSITIVE,
            }),
            Message::SetAnnotationMode(AnnotationMode::TIME | AnnotationMode::DATE),
            Message::SetDrcLevel(DrcLevel::Medium),
            Message::SetTargetBitrate(2_500_000),
            Message::Ping,
            Message::Pong,
        ]
    }

    #[test]
    fn every_kind_survives_encode_decode() {
        for message in sample_messages() {
            let wire = message.to_bytes();
            assert_eq!(wire.len(), message.wire_size());
            let decoded = Message::decode(&wire[LENGTH_PREFIX_SIZE..]).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn pause_is_three_bytes() {
        assert_eq!(Message::Pause.to_bytes().as_ref(), &[0x00, 0x01, 0x01]);
    }

    #[test]
    fn resolution_framerate_layout_is_big_endian() {
        let wire = Message::SetResolutionFramerate {
            width: 640,
            height: 480,
            framerate: 30,
        }
        .to_bytes();
        assert_eq!(
            wire.as_ref(),
            &[0x00, 0x07, 0x00, 0x02, 0x80, 0x01, 0xE0, 0x00, 0x1E]
        );
    }

    #[test]
    fn target_bitrate_layout() {
        let wire = Message::SetTargetBitrate(1_000_000).to_bytes();
        assert_eq!(wire.as_ref(), &[0x00, 0x05, 0x07, 0x00, 0x0F, 0x42, 0x40]);
    }

    #[test]
    fn stats_response_preserves_float_bits() {
        let report = StatsReport {
            latency: f32::from_bits(0x4049_0FDB),
            queue0: -0.0,
            queue1: 1.0e-30,
        };
        let wire = Message::StatsResponse(report).to_bytes();
        assert_eq!(wire[0..2], [0x00, 0x0D]);
        match Message::decode(&wire[LENGTH_PREFIX_SIZE..]).unwrap() {
            Message::StatsResponse(decoded) => {
                assert_eq!(decoded.latency.to_bits(), report.latency.to_bits());
                assert_eq!(decoded.queue0.to_bits(), report.queue0.to_bits());
                assert_eq!(decoded.queue1.to_bits(), report.queue1.to_bits());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_empty_body() {
        assert!(matches!(Message::decode(&[]), Err(FrameError::EmptyFrame)));
    }

    #[test]
    fn decode_unknown_kind() {
        assert!(matches!(
            Message::decode(&[0x2A]),
            Err(FrameError::UnknownKind(0x2A))
        ));
    }

    #[test]
    fn decode_truncated_payload() {
        let err = Message::decode(&[MessageKind::SetTargetBitrate as u8, 0x00, 0x01]).unwrap_err();
        match err {
            FrameError::Truncated {
                kind,
                expected,
                actual,
            } => {
                assert_eq!(kind, "set_target_bitrate");
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let body = [MessageKind::Resume as u8, 0xFF, 0xFF];
        assert_eq!(Message::decode(&body).unwrap(), Message::Resume);

        let body = [MessageKind::SetDrcLevel as u8, 0x03, 0x99];
        assert_eq!(
            Message::decode(&body).unwrap(),
            Message::SetDrcLevel(DrcLevel::High)
        );
    }

    #[test]
    fn decode_invalid_drc_level() {
        let body = [MessageKind::SetDrcLevel as u8, 0x04];
        assert!(matches!(
            Message::decode(&body),
            Err(FrameError::InvalidDrcLevel(4))
        ));
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(MessageKind::SetResolutionFramerate as u8, 0);
        assert_eq!(MessageKind::StatsResponse as u8, 4);
        assert_eq!(MessageKind::SetTargetBitrate as u8, 7);
        assert_eq!(MessageKind::Pong as u8, 9);
        for tag in 0..=9u8 {
            assert_eq!(MessageKind::try_from(tag).unwrap() as u8, tag);
        }
        assert!(MessageKind::try_from(10).is_err());
    }

    #[test]
    fn annotation_flags_combine() {
        let mode = AnnotationMode::TEXT | AnnotationMode::BLACK_BACKGROUND;
        assert_eq!(mode.bits(), 1025);
        assert!(mode.contains(AnnotationMode::TEXT));
        assert!(!mode.contains(AnnotationMode::GAIN));
        assert!(AnnotationMode::NONE.is_empty());
    }

    #[test]
    fn frame_message_and_wire_size() {
        let frame = Frame::new(MessageKind::SetAnnotationMode as u8, vec![0x00, 0x0C]);
        assert_eq!(frame.wire_size(), 5);
        assert_eq!(
            frame.message().unwrap(),
            Message::SetAnnotationMode(AnnotationMode::TIME | AnnotationMode::DATE)
        );
    }
}
