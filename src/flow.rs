//! Inbound and outbound flow-control accounting (RFC 9113 Sections 5.2
//! and 6.9).
//!
//! The inbound side is the heart of the decoder's DATA discipline: every
//! flow-controlled frame decrements the windows exactly once on receipt, and
//! bytes only flow back to the peer when the application reports them
//! processed. Receipt and consumption are deliberately split so applications
//! can buffer large bodies without the window being replenished behind their
//! back.

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::{connection_error, stream_error, Error, Result};
use crate::frame::{ErrorCode, MAX_WINDOW_SIZE};
use crate::stream::StreamState;
use crate::writer::{Context, FrameWriter};

/// Initial flow-control window per RFC 9113 Section 6.9.2.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;

/// Window and unconsumed-byte accounting for one flow-controlled entity
/// (the connection, or a single stream).
#[derive(Debug)]
pub(crate) struct InboundFlow {
    /// Bytes the peer may still send before we grant more.
    window: i64,
    /// Received bytes the application has not yet reported processed.
    unconsumed: u32,
    /// Processed bytes not yet returned to the peer via WINDOW_UPDATE.
    pending_return: u32,
}

impl InboundFlow {
    pub(crate) fn new(window: u32) -> Self {
        Self {
            window: i64::from(window),
            unconsumed: 0,
            pending_return: 0,
        }
    }

    /// Account for a received flow-controlled payload. Returns the window
    /// after the decrement; negative means the peer overran its window.
    fn receive(&mut self, n: u32) -> i64 {
        self.window -= i64::from(n);
        if self.window >= 0 {
            self.unconsumed += n;
        }
        self.window
    }

    /// Mark `n` received bytes as processed. Returns false when more bytes
    /// are returned than were ever received.
    fn consume(&mut self, n: u32) -> bool {
        match self.unconsumed.checked_sub(n) {
            Some(rest) => {
                self.unconsumed = rest;
                self.pending_return += n;
                true
            }
            None => false,
        }
    }

    /// Take the accumulated replenishment once it reaches half the initial
    /// window, restoring the window by the same amount.
    fn take_due_update(&mut self, initial_window: u32) -> Option<u32> {
        if self.pending_return == 0 || u64::from(self.pending_return) * 2 < u64::from(initial_window)
        {
            return None;
        }
        let increment = self.pending_return;
        self.pending_return = 0;
        self.window += i64::from(increment);
        Some(increment)
    }

    /// Retroactive adjustment when SETTINGS_INITIAL_WINDOW_SIZE changes
    /// (RFC 9113 Section 6.9.2). The window may go negative.
    fn adjust(&mut self, delta: i64) {
        self.window += delta;
    }

    pub(crate) fn unconsumed(&self) -> u32 {
        self.unconsumed
    }

    pub(crate) fn window(&self) -> i64 {
        self.window
    }
}

/// Accounts for inbound flow-controlled frames and replenishes the peer's
/// send windows as the application consumes data.
pub trait LocalFlowController {
    /// Initial window size granted to newly created streams.
    fn initial_window_size(&self) -> u32;

    /// Change the initial window and retroactively adjust every existing
    /// stream by the delta.
    fn set_initial_window_size(&mut self, conn: &mut Connection, new: u32) -> Result<()>;

    /// Account for one DATA frame. Called exactly once per frame, before
    /// any listener runs; the sole point where windows decrease.
    fn receive_flow_controlled_frame(
        &mut self,
        ctx: &mut Context,
        conn: &mut Connection,
        stream_id: u32,
        data: &Bytes,
        padding: usize,
        end_of_stream: bool,
    ) -> Result<()>;

    /// Bytes received on the stream that the application has not yet
    /// reported processed.
    fn unconsumed_bytes(&self, conn: &Connection, stream_id: u32) -> u32;

    /// Return `n` processed bytes to the stream and connection windows,
    /// possibly emitting WINDOW_UPDATE frames.
    fn consume_bytes(
        &mut self,
        ctx: &mut Context,
        conn: &mut Connection,
        stream_id: u32,
        n: u32,
    ) -> Result<()>;
}

/// Credits outbound windows from peer WINDOW_UPDATEs and peer SETTINGS.
pub trait RemoteFlowController {
    fn initial_window_size(&self) -> u32;

    /// Apply the peer's SETTINGS_INITIAL_WINDOW_SIZE, adjusting every
    /// existing stream's send window by the delta.
    fn set_initial_window_size(&mut self, conn: &mut Connection, new: u32) -> Result<()>;

    /// Apply a WINDOW_UPDATE increment for the stream, or for the
    /// connection when `stream_id` is 0. Zero increments and window
    /// overflow are errors, stream-scoped except on stream 0.
    fn increment_window_size(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        increment: u32,
    ) -> Result<()>;

    /// Current send window for the stream, or the connection for id 0.
    fn window_size(&self, conn: &Connection, stream_id: u32) -> i64;
}

/// Default inbound flow controller bound to a frame writer.
///
/// WINDOW_UPDATE frames are batched: a window is replenished once the
/// application has consumed at least half of it.
pub struct DefaultLocalFlowController {
    writer: FrameWriter,
    connection_flow: InboundFlow,
    initial_window: u32,
}

impl DefaultLocalFlowController {
    pub fn new(writer: FrameWriter) -> Self {
        Self {
            writer,
            connection_flow: InboundFlow::new(DEFAULT_INITIAL_WINDOW_SIZE),
            initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
        }
    }
}

impl LocalFlowController for DefaultLocalFlowController {
    fn initial_window_size(&self) -> u32 {
        self.initial_window
    }

    fn set_initial_window_size(&mut self, conn: &mut Connection, new: u32) -> Result<()> {
        let delta = i64::from(new) - i64::from(self.initial_window);
        self.initial_window = new;
        conn.local_initial_window = new;
        // The connection window is excluded from retroactive adjustment
        // (RFC 9113 Section 6.9.2 applies to stream windows only).
        for stream in conn.streams_mut() {
            stream.inbound.adjust(delta);
        }
        Ok(())
    }

    fn receive_flow_controlled_frame(
        &mut self,
        _ctx: &mut Context,
        conn: &mut Connection,
        stream_id: u32,
        data: &Bytes,
        padding: usize,
        _end_of_stream: bool,
    ) -> Result<()> {
        let n = (data.len() + padding) as u32;
        if self.connection_flow.receive(n) < 0 {
            return Err(connection_error(
                ErrorCode::FlowControlError,
                "connection flow-control window exceeded",
            ));
        }
        let stream = conn
            .stream_mut(stream_id)
            .ok_or_else(|| Error::Internal(format!("flow accounting for unknown stream {}", stream_id)))?;
        if stream.inbound.receive(n) < 0 {
            return Err(stream_error(
                stream_id,
                ErrorCode::FlowControlError,
                format!("stream {} flow-control window exceeded", stream_id),
            ));
        }
        Ok(())
    }

    fn unconsumed_bytes(&self, conn: &Connection, stream_id: u32) -> u32 {
        conn.stream(stream_id)
            .map(|s| s.inbound.unconsumed())
            .unwrap_or(0)
    }

    fn consume_bytes(
        &mut self,
        ctx: &mut Context,
        conn: &mut Connection,
        stream_id: u32,
        n: u32,
    ) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let initial_window = self.initial_window;
        let stream = conn
            .stream_mut(stream_id)
            .ok_or_else(|| Error::Internal(format!("consuming bytes for unknown stream {}", stream_id)))?;
        if !stream.inbound.consume(n) {
            return Err(Error::Internal(format!(
                "returning {} bytes to stream {} exceeds the {} unconsumed",
                n,
                stream_id,
                stream.inbound.unconsumed()
            )));
        }
        // No point granting more window to a stream the peer is done with.
        let stream_update = if stream.state() == StreamState::Closed {
            None
        } else {
            stream.inbound.take_due_update(initial_window)
        };
        if let Some(increment) = stream_update {
            self.writer.write_window_update(ctx, stream_id, increment);
            ctx.flush();
        }

        if !self.connection_flow.consume(n) {
            return Err(Error::Internal(format!(
                "returning {} bytes to the connection exceeds the {} unconsumed",
                n,
                self.connection_flow.unconsumed()
            )));
        }
        if let Some(increment) = self.connection_flow.take_due_update(initial_window) {
            self.writer.write_window_update(ctx, 0, increment);
            ctx.flush();
        }
        Ok(())
    }
}

/// Default outbound flow controller.
pub struct DefaultRemoteFlowController {
    connection_window: i64,
    initial_window: u32,
}

impl DefaultRemoteFlowController {
    pub fn new() -> Self {
        Self {
            connection_window: i64::from(DEFAULT_INITIAL_WINDOW_SIZE),
            initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
        }
    }
}

impl Default for DefaultRemoteFlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteFlowController for DefaultRemoteFlowController {
    fn initial_window_size(&self) -> u32 {
        self.initial_window
    }

    fn set_initial_window_size(&mut self, conn: &mut Connection, new: u32) -> Result<()> {
        let delta = i64::from(new) - i64::from(self.initial_window);
        self.initial_window = new;
        conn.remote_initial_window = new;
        for stream in conn.streams_mut() {
            stream.send_window += delta;
        }
        Ok(())
    }

    fn increment_window_size(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        increment: u32,
    ) -> Result<()> {
        if stream_id == 0 {
            if increment == 0 {
                return Err(connection_error(
                    ErrorCode::ProtocolError,
                    "connection WINDOW_UPDATE increment must be positive",
                ));
            }
            self.connection_window += i64::from(increment);
            if self.connection_window > i64::from(MAX_WINDOW_SIZE) {
                return Err(connection_error(
                    ErrorCode::FlowControlError,
                    "connection flow-control window overflow",
                ));
            }
            return Ok(());
        }

        if increment == 0 {
            return Err(stream_error(
                stream_id,
                ErrorCode::ProtocolError,
                format!("stream {} WINDOW_UPDATE increment must be positive", stream_id),
            ));
        }
        let stream = conn
            .stream_mut(stream_id)
            .ok_or_else(|| Error::Internal(format!("window increment for unknown stream {}", stream_id)))?;
        stream.send_window += i64::from(increment);
        if stream.send_window > i64::from(MAX_WINDOW_SIZE) {
            return Err(stream_error(
                stream_id,
                ErrorCode::FlowControlError,
                format!("stream {} flow-control window overflow", stream_id),
            ));
        }
        Ok(())
    }

    fn window_size(&self, conn: &Connection, stream_id: u32) -> i64 {
        if stream_id == 0 {
            self.connection_window
        } else {
            conn.stream(stream_id).map(|s| s.send_window).unwrap_or(0)
        }
    }
}
