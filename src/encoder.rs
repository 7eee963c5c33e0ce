//! The outbound encoder seam the decoder coordinates with.
//!
//! The decoder only touches the write half for three things: acknowledging
//! SETTINGS and PING, applying the peer's SETTINGS to outbound bookkeeping,
//! and draining the FIFO of our own unacknowledged SETTINGS. SETTINGS apply
//! asymmetrically: what the peer sends binds our outbound side immediately,
//! while what we send binds theirs only once they ack it, one FIFO entry
//! per ack (RFC 9113 Section 6.5.3).

use std::collections::VecDeque;

use crate::connection::Connection;
use crate::error::Result;
use crate::flow::{DefaultRemoteFlowController, RemoteFlowController};
use crate::frame::DEFAULT_MAX_FRAME_SIZE;
use crate::reader::DEFAULT_HEADER_TABLE_SIZE;
use crate::settings::Settings;
use crate::writer::{Context, FrameWriter};

/// Write-side collaborator consumed by the decoder.
pub trait ConnectionEncoder {
    /// Write a SETTINGS frame and queue it as awaiting acknowledgement.
    fn write_settings(&mut self, ctx: &mut Context, settings: Settings) -> Result<()>;

    /// Write an empty SETTINGS frame with the ACK flag.
    fn write_settings_ack(&mut self, ctx: &mut Context) -> Result<()>;

    /// Write a PING frame, echoing `data`.
    fn write_ping(&mut self, ctx: &mut Context, ack: bool, data: [u8; 8]) -> Result<()>;

    /// Apply the peer's SETTINGS to the outbound side.
    fn remote_settings(&mut self, conn: &mut Connection, settings: &Settings) -> Result<()>;

    /// Pop the oldest SETTINGS we sent that the peer has now acknowledged.
    fn poll_sent_settings(&mut self) -> Option<Settings>;

    /// The outbound flow controller, credited by inbound WINDOW_UPDATEs.
    fn flow_controller(&mut self) -> &mut dyn RemoteFlowController;

    /// The control-frame serializer this encoder writes with.
    fn frame_writer(&self) -> FrameWriter;
}

/// Default encoder: a frame writer, the pending-settings FIFO, and the
/// outbound policy knobs the peer's SETTINGS retune.
pub struct DefaultConnectionEncoder {
    writer: FrameWriter,
    pending_settings: VecDeque<Settings>,
    remote_flow: Box<dyn RemoteFlowController>,
    max_frame_size: u32,
    header_table_size: u32,
    max_header_list_size: u32,
}

impl DefaultConnectionEncoder {
    pub fn new() -> Self {
        Self {
            writer: FrameWriter::new(),
            pending_settings: VecDeque::new(),
            remote_flow: Box::new(DefaultRemoteFlowController::new()),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            max_header_list_size: u32::MAX,
        }
    }

    /// Largest frame payload the peer accepts.
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Header-table budget the peer granted our HPACK encoder.
    pub fn header_table_size(&self) -> u32 {
        self.header_table_size
    }

    /// Header-list bound the peer asked us to honor.
    pub fn max_header_list_size(&self) -> u32 {
        self.max_header_list_size
    }

    /// SETTINGS written but not yet acknowledged by the peer.
    pub fn num_pending_settings(&self) -> usize {
        self.pending_settings.len()
    }
}

impl Default for DefaultConnectionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionEncoder for DefaultConnectionEncoder {
    fn write_settings(&mut self, ctx: &mut Context, settings: Settings) -> Result<()> {
        self.writer.write_settings(ctx, &settings);
        self.pending_settings.push_back(settings);
        Ok(())
    }

    fn write_settings_ack(&mut self, ctx: &mut Context) -> Result<()> {
        self.writer.write_settings_ack(ctx);
        Ok(())
    }

    fn write_ping(&mut self, ctx: &mut Context, ack: bool, data: [u8; 8]) -> Result<()> {
        self.writer.write_ping(ctx, ack, data);
        Ok(())
    }

    fn remote_settings(&mut self, conn: &mut Connection, settings: &Settings) -> Result<()> {
        if let Some(push) = settings.enable_push {
            conn.remote_mut().set_allow_push(push);
        }
        if let Some(max) = settings.max_concurrent_streams {
            conn.local_mut().set_max_active_streams(max);
        }
        if let Some(size) = settings.header_table_size {
            self.header_table_size = size;
        }
        if let Some(size) = settings.max_header_list_size {
            self.max_header_list_size = size;
        }
        if let Some(size) = settings.max_frame_size {
            self.max_frame_size = size;
        }
        if let Some(size) = settings.initial_window_size {
            self.remote_flow.set_initial_window_size(conn, size)?;
        }
        tracing::debug!("applied remote settings");
        Ok(())
    }

    fn poll_sent_settings(&mut self) -> Option<Settings> {
        self.pending_settings.pop_front()
    }

    fn flow_controller(&mut self) -> &mut dyn RemoteFlowController {
        self.remote_flow.as_mut()
    }

    fn frame_writer(&self) -> FrameWriter {
        self.writer
    }
}
