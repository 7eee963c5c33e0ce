//! The stream lifecycle seam.
//!
//! The decoder never closes streams directly; it asks the lifecycle manager
//! so embedders can hook teardown (pending-write cleanup, metrics, channel
//! shutdown) into the transition. The default simply walks the registry's
//! state machine.

use crate::connection::Connection;

/// Closes streams on behalf of the decoder.
pub trait LifecycleManager {
    /// The peer finished its side of the stream (END_STREAM observed).
    fn close_remote_side(&mut self, conn: &mut Connection, stream_id: u32);

    /// Close both sides of the stream (RST_STREAM observed).
    fn close_stream(&mut self, conn: &mut Connection, stream_id: u32);
}

/// Default lifecycle manager delegating to the connection registry.
#[derive(Debug, Default)]
pub struct DefaultLifecycleManager;

impl LifecycleManager for DefaultLifecycleManager {
    fn close_remote_side(&mut self, conn: &mut Connection, stream_id: u32) {
        tracing::debug!(stream_id, "closing remote side");
        conn.close_stream_remote_side(stream_id);
    }

    fn close_stream(&mut self, conn: &mut Connection, stream_id: u32) {
        tracing::debug!(stream_id, "closing stream");
        conn.close_stream(stream_id);
    }
}
