//! The application-facing frame event listener.

use bytes::Bytes;

use crate::error::Result;
use crate::frame::ErrorCode;
use crate::headers::Headers;
use crate::settings::Settings;
use crate::writer::Context;

/// Receives validated inbound frame events from the decoder.
///
/// Every method has a no-op default so implementations only override what
/// they care about. Callbacks run synchronously on the decode path; errors
/// returned here surface from `decode_frame` unchanged (the DATA path
/// additionally rebalances flow control before re-raising).
#[allow(clippy::too_many_arguments)]
pub trait FrameListener {
    /// A DATA frame passed state and flow-control checks.
    ///
    /// Returns the number of bytes (payload plus padding) the application
    /// has processed immediately. Bytes not reported here stay unconsumed
    /// and must later be returned through the flow controller's
    /// `consume_bytes`, or the peer's send window never recovers.
    fn on_data_read(
        &mut self,
        _ctx: &mut Context,
        _stream_id: u32,
        data: &Bytes,
        padding: usize,
        _end_of_stream: bool,
    ) -> Result<usize> {
        Ok(data.len() + padding)
    }

    /// A HEADERS frame opened a stream or delivered trailers. Priority
    /// fields default to dependency 0, weight 16, non-exclusive when the
    /// frame carried none.
    fn on_headers_read(
        &mut self,
        _ctx: &mut Context,
        _stream_id: u32,
        _headers: &Headers,
        _dependency: u32,
        _weight: u16,
        _exclusive: bool,
        _padding: usize,
        _end_of_stream: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn on_priority_read(
        &mut self,
        _ctx: &mut Context,
        _stream_id: u32,
        _dependency: u32,
        _weight: u16,
        _exclusive: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn on_rst_stream_read(
        &mut self,
        _ctx: &mut Context,
        _stream_id: u32,
        _error_code: ErrorCode,
    ) -> Result<()> {
        Ok(())
    }

    /// The peer's SETTINGS were applied and acknowledged.
    fn on_settings_read(&mut self, _ctx: &mut Context, _settings: &Settings) -> Result<()> {
        Ok(())
    }

    /// The peer acknowledged our oldest outstanding SETTINGS, which have
    /// just been applied locally.
    fn on_settings_ack_read(&mut self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    /// A PING arrived; the echoing ack is already queued.
    fn on_ping_read(&mut self, _ctx: &mut Context, _data: [u8; 8]) -> Result<()> {
        Ok(())
    }

    fn on_ping_ack_read(&mut self, _ctx: &mut Context, _data: [u8; 8]) -> Result<()> {
        Ok(())
    }

    /// A promised stream was verified and reserved.
    fn on_push_promise_read(
        &mut self,
        _ctx: &mut Context,
        _stream_id: u32,
        _promised_stream_id: u32,
        _headers: &Headers,
        _padding: usize,
    ) -> Result<()> {
        Ok(())
    }

    fn on_go_away_read(
        &mut self,
        _ctx: &mut Context,
        _last_stream_id: u32,
        _error_code: ErrorCode,
        _debug_data: &Bytes,
    ) -> Result<()> {
        Ok(())
    }

    fn on_window_update_read(
        &mut self,
        _ctx: &mut Context,
        _stream_id: u32,
        _increment: u32,
    ) -> Result<()> {
        Ok(())
    }

    /// An unrecognized frame type. Never an error at the protocol layer;
    /// extensions are free to inspect the payload.
    fn on_unknown_frame(
        &mut self,
        _ctx: &mut Context,
        _frame_type: u8,
        _stream_id: u32,
        _flags: u8,
        _payload: &Bytes,
    ) -> Result<()> {
        Ok(())
    }
}
