//! Outbound plumbing: the write context handed through every decode pass,
//! and the control-frame serializer.
//!
//! The decoder produces a handful of outbound frames of its own (SETTINGS
//! acks, PING acks, WINDOW_UPDATEs). They are buffered in a [`Context`] with
//! an explicit flush boundary, mirroring a transport that separates queueing
//! a write from handing it to the socket. Everything written before a frame
//! is flushed ahead of it, which is what guarantees a SETTINGS ack precedes
//! any write the application issues from its settings callback.

use bytes::{BufMut, Bytes, BytesMut};

use crate::frame::{flags, ErrorCode, FrameHeader, FrameType, FRAME_HEADER_SIZE};
use crate::settings::Settings;

/// Per-read-pass transport context collecting outbound bytes.
#[derive(Debug, Default)]
pub struct Context {
    pending: BytesMut,
    flushed: BytesMut,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue serialized frame bytes for the transport.
    pub fn write(&mut self, frame: &[u8]) {
        self.pending.extend_from_slice(frame);
    }

    /// Make everything queued so far eligible for the transport.
    pub fn flush(&mut self) {
        self.flushed.extend_from_slice(&self.pending);
        self.pending.clear();
    }

    /// Whether writes are queued but not yet flushed.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain the flushed bytes for the transport to send.
    pub fn take_output(&mut self) -> Bytes {
        self.flushed.split().freeze()
    }
}

/// Serializes the control frames the decoding side emits.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameWriter;

impl FrameWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write a SETTINGS frame with the given parameters.
    pub fn write_settings(&self, ctx: &mut Context, settings: &Settings) {
        let pairs = settings.to_wire();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + pairs.len() * 6);
        FrameHeader {
            length: (pairs.len() * 6) as u32,
            frame_type: FrameType::Settings,
            flags: 0,
            stream_id: 0,
        }
        .serialize(&mut buf);
        for (id, value) in pairs {
            buf.put_u16(id);
            buf.put_u32(value);
        }
        ctx.write(&buf);
    }

    /// Write an empty SETTINGS frame with the ACK flag set.
    pub fn write_settings_ack(&self, ctx: &mut Context) {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE);
        FrameHeader {
            length: 0,
            frame_type: FrameType::Settings,
            flags: flags::ACK,
            stream_id: 0,
        }
        .serialize(&mut buf);
        ctx.write(&buf);
    }

    /// Write a PING frame echoing the opaque payload.
    pub fn write_ping(&self, ctx: &mut Context, ack: bool, data: [u8; 8]) {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 8);
        FrameHeader {
            length: 8,
            frame_type: FrameType::Ping,
            flags: if ack { flags::ACK } else { 0 },
            stream_id: 0,
        }
        .serialize(&mut buf);
        buf.extend_from_slice(&data);
        ctx.write(&buf);
    }

    /// Write a WINDOW_UPDATE for a stream, or the connection for id 0.
    pub fn write_window_update(&self, ctx: &mut Context, stream_id: u32, increment: u32) {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);
        FrameHeader {
            length: 4,
            frame_type: FrameType::WindowUpdate,
            flags: 0,
            stream_id,
        }
        .serialize(&mut buf);
        buf.put_u32(increment & 0x7fff_ffff);
        ctx.write(&buf);
    }

    /// Write a RST_STREAM frame.
    pub fn write_rst_stream(&self, ctx: &mut Context, stream_id: u32, error_code: ErrorCode) {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);
        FrameHeader {
            length: 4,
            frame_type: FrameType::RstStream,
            flags: 0,
            stream_id,
        }
        .serialize(&mut buf);
        buf.put_u32(error_code as u32);
        ctx.write(&buf);
    }

    /// Write a GOAWAY frame.
    pub fn write_go_away(
        &self,
        ctx: &mut Context,
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: &[u8],
    ) {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 8 + debug_data.len());
        FrameHeader {
            length: (8 + debug_data.len()) as u32,
            frame_type: FrameType::GoAway,
            flags: 0,
            stream_id: 0,
        }
        .serialize(&mut buf);
        buf.put_u32(last_stream_id & 0x7fff_ffff);
        buf.put_u32(error_code as u32);
        buf.extend_from_slice(debug_data);
        ctx.write(&buf);
    }
}
