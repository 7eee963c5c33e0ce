//! Per-stream state (RFC 9113 Section 5.1).

use crate::error::{connection_error, Result};
use crate::flow::InboundFlow;
use crate::frame::{ErrorCode, DEFAULT_PRIORITY_WEIGHT};

/// Stream states from the RFC 9113 Section 5.1 state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// Whether the stream counts against SETTINGS_MAX_CONCURRENT_STREAMS.
    /// Idle and reserved streams do not (RFC 9113 Section 5.1.2).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote
        )
    }
}

/// Dependency, weight and exclusivity recorded for a stream.
///
/// Weight is the logical value in 1..=256, not the wire octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub dependency: u32,
    pub weight: u16,
    pub exclusive: bool,
}

impl Default for Priority {
    fn default() -> Self {
        Self {
            dependency: 0,
            weight: DEFAULT_PRIORITY_WEIGHT,
            exclusive: false,
        }
    }
}

/// A single HTTP/2 stream.
#[derive(Debug)]
pub struct Stream {
    id: u32,
    state: StreamState,
    priority: Priority,
    reset_sent: bool,
    reset_received: bool,
    /// Created by the local endpoint (outbound) rather than the peer.
    local: bool,
    /// Inbound flow-control window and unconsumed-byte accounting.
    pub(crate) inbound: InboundFlow,
    /// Outbound flow-control window, credited by peer WINDOW_UPDATEs.
    pub(crate) send_window: i64,
}

impl Stream {
    pub(crate) fn new(
        id: u32,
        state: StreamState,
        local: bool,
        local_window: u32,
        send_window: u32,
    ) -> Self {
        Self {
            id,
            state,
            priority: Priority::default(),
            reset_sent: false,
            reset_received: false,
            local,
            inbound: InboundFlow::new(local_window),
            send_window: i64::from(send_window),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Whether we have emitted RST_STREAM for this stream.
    pub fn is_reset_sent(&self) -> bool {
        self.reset_sent
    }

    /// Latch that RST_STREAM was emitted locally. Further inbound frames for
    /// the stream are ignored, except PRIORITY.
    pub fn set_reset_sent(&mut self) {
        self.reset_sent = true;
    }

    /// Whether the peer reset this stream.
    pub fn is_reset_received(&self) -> bool {
        self.reset_received
    }

    pub(crate) fn set_reset_received(&mut self) {
        self.reset_received = true;
    }

    pub(crate) fn is_local(&self) -> bool {
        self.local
    }

    /// Activate the stream on receipt (or emission) of HEADERS.
    ///
    /// RFC 9113 Section 5.1: Idle streams open fully or half-closed in the
    /// creator's direction; reserved streams always come up half-closed.
    pub(crate) fn open(&mut self, half_closed: bool) -> Result<StreamState> {
        self.state = match self.state {
            StreamState::Idle => {
                if !half_closed {
                    StreamState::Open
                } else if self.local {
                    StreamState::HalfClosedLocal
                } else {
                    StreamState::HalfClosedRemote
                }
            }
            StreamState::ReservedLocal => StreamState::HalfClosedRemote,
            StreamState::ReservedRemote => StreamState::HalfClosedLocal,
            other => {
                return Err(connection_error(
                    ErrorCode::ProtocolError,
                    format!("attempting to open stream {} in state {:?}", self.id, other),
                ))
            }
        };
        Ok(self.state)
    }

    /// The peer finished its side. Open streams fall to half-closed-remote,
    /// a duplicate END_STREAM is ignored, and anything else has no remote
    /// half left and closes outright. Returns the resulting state.
    pub(crate) fn close_remote_side(&mut self) -> StreamState {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedRemote => StreamState::HalfClosedRemote,
            _ => StreamState::Closed,
        };
        self.state
    }

    /// Mark a freshly created stream as promised by the peer.
    pub(crate) fn reserve_remote(&mut self) {
        self.state = StreamState::ReservedRemote;
    }

    /// Close both sides.
    pub(crate) fn close(&mut self) {
        self.state = StreamState::Closed;
    }
}
