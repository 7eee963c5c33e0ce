//! HTTP/2 frame model.
//!
//! Wire-level constants, the 9-byte frame header codec (RFC 9113 Section
//! 4.1), and the typed [`Frame`] events the reader hands to the decoder.
//! Header-block payloads arrive here already decompressed; HPACK itself is
//! pluggable (see [`crate::headers::HeaderDecoder`]).

use bytes::{BufMut, Bytes, BytesMut};

use crate::headers::Headers;
use crate::settings::Settings;

/// Frame header size (9 bytes per RFC 9113).
pub const FRAME_HEADER_SIZE: usize = 9;

/// Default maximum frame size (16KB per RFC 9113).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// Upper bound for SETTINGS_MAX_FRAME_SIZE (2^24 - 1).
pub const MAX_FRAME_SIZE_UPPER_BOUND: u32 = 16_777_215;

/// Largest flow-control window (2^31 - 1, RFC 9113 Section 6.9.1).
pub const MAX_WINDOW_SIZE: u32 = 0x7fff_ffff;

/// Default priority weight assigned when a HEADERS frame carries no
/// priority fields (RFC 9113 Section 5.3.5).
pub const DEFAULT_PRIORITY_WEIGHT: u16 = 16;

/// Frame type identifiers per RFC 9113.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        match ft {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(v) => v,
        }
    }
}

/// Frame flags.
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1; // Same value, different context (SETTINGS/PING)
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// HTTP/2 error codes per RFC 9113 Section 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl From<u32> for ErrorCode {
    fn from(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::ProtocolError,
        }
    }
}

/// Parsed frame header.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse a frame header from bytes.
    /// Returns None if the buffer is short or a reserved bit is set.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let length = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32);
        let frame_type = FrameType::from(buf[3]);
        let flags = buf[4];

        // RFC 9113 Section 4.1: the high bit of the stream id is reserved
        // and must be 0.
        if (buf[5] & 0x80) != 0 {
            return None;
        }

        let stream_id = ((buf[5] as u32 & 0x7f) << 24)
            | ((buf[6] as u32) << 16)
            | ((buf[7] as u32) << 8)
            | (buf[8] as u32);

        Some(Self {
            length,
            frame_type,
            flags,
            stream_id,
        })
    }

    /// Serialize frame header to bytes.
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8((self.length >> 16) as u8);
        buf.put_u8((self.length >> 8) as u8);
        buf.put_u8(self.length as u8);
        buf.put_u8(self.frame_type.into());
        buf.put_u8(self.flags);
        // Stream ID is a 31-bit unsigned integer, high bit reserved.
        buf.put_u32(self.stream_id & 0x7fff_ffff);
    }
}

/// A fully parsed inbound frame event.
///
/// This is what the frame reader produces and the dispatch core consumes.
/// HEADERS and PUSH_PROMISE only surface once their CONTINUATION sequence is
/// complete and the header block has been decoded.
#[derive(Debug, Clone)]
pub enum Frame {
    Data {
        stream_id: u32,
        data: Bytes,
        /// Padding octets including the pad-length octet itself, so
        /// `data.len() + padding` is always the wire payload length.
        padding: usize,
        end_of_stream: bool,
    },
    Headers {
        stream_id: u32,
        headers: Headers,
        /// Priority fields, when the PRIORITY flag was set.
        priority: Option<PrioritySpec>,
        padding: usize,
        end_of_stream: bool,
    },
    Priority {
        stream_id: u32,
        dependency: u32,
        weight: u16,
        exclusive: bool,
    },
    RstStream {
        stream_id: u32,
        error_code: ErrorCode,
    },
    Settings {
        settings: Settings,
    },
    SettingsAck,
    Ping {
        data: [u8; 8],
    },
    PingAck {
        data: [u8; 8],
    },
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
        headers: Headers,
        padding: usize,
    },
    GoAway {
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Unknown {
        frame_type: u8,
        stream_id: u32,
        flags: u8,
        payload: Bytes,
    },
}

/// Priority fields carried by a HEADERS or PRIORITY frame.
#[derive(Debug, Clone, Copy)]
pub struct PrioritySpec {
    pub dependency: u32,
    /// Weight in 1..=256 (wire octet plus one).
    pub weight: u16,
    pub exclusive: bool,
}
