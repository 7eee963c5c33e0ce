//! Connection-wide state: the stream registry, per-direction endpoint
//! policy, and the GOAWAY latches.
//!
//! The registry is pre-seeded with stream 0, the connection control stream,
//! so frames addressed to it resolve like any other lookup. Closed streams
//! stay in the registry with state `Closed`; the state machine needs to tell
//! "closed" apart from "never existed" (RFC 9113 Section 5.1).

use std::collections::HashMap;

use crate::error::{connection_error, stream_error, Error, Result};
use crate::flow::DEFAULT_INITIAL_WINDOW_SIZE;
use crate::frame::{ErrorCode, PrioritySpec};
use crate::stream::{Priority, Stream, StreamState};

/// Per-direction stream policy and creation bookkeeping.
#[derive(Debug)]
pub struct Endpoint {
    /// This endpoint is the server side of the connection.
    server: bool,
    next_stream_id: u32,
    last_stream_created: u32,
    max_active_streams: u32,
    allow_push: bool,
    active: u32,
}

impl Endpoint {
    fn new(server: bool) -> Self {
        Self {
            server,
            // Clients create odd stream ids, servers even (RFC 9113
            // Section 5.1.1).
            next_stream_id: if server { 2 } else { 1 },
            last_stream_created: 0,
            max_active_streams: u32::MAX,
            // Pushing defaults to enabled toward clients only.
            allow_push: !server,
            active: 0,
        }
    }

    fn is_valid_stream_id(&self, id: u32) -> bool {
        id != 0 && (id % 2 == 0) == self.server
    }

    /// Highest stream id this endpoint has created.
    pub fn last_stream_created(&self) -> u32 {
        self.last_stream_created
    }

    /// Bound on concurrently active streams created by this endpoint.
    pub fn max_active_streams(&self) -> u32 {
        self.max_active_streams
    }

    pub fn set_max_active_streams(&mut self, max: u32) {
        self.max_active_streams = max;
    }

    /// Whether PUSH_PROMISE toward this endpoint is permitted.
    pub fn allow_push(&self) -> bool {
        self.allow_push
    }

    pub fn set_allow_push(&mut self, allow: bool) {
        self.allow_push = allow;
    }

    /// Streams created by this endpoint currently counting against
    /// `max_active_streams`.
    pub fn num_active_streams(&self) -> u32 {
        self.active
    }

    fn record_created(&mut self, id: u32) {
        self.last_stream_created = id;
        self.next_stream_id = id + 2;
    }
}

/// The shared connection state both halves of a codec operate on. This crate
/// only decodes, but the registry and latches are direction-agnostic.
#[derive(Debug)]
pub struct Connection {
    server: bool,
    streams: HashMap<u32, Stream>,
    local: Endpoint,
    remote: Endpoint,
    goaway_sent: Option<u32>,
    goaway_received: Option<u32>,
    /// Inbound window granted to newly created streams.
    pub(crate) local_initial_window: u32,
    /// Outbound window newly created streams start with.
    pub(crate) remote_initial_window: u32,
}

impl Connection {
    /// Create connection state for a server or client endpoint.
    pub fn new(server: bool) -> Self {
        let mut streams = HashMap::new();
        // The connection control stream. Never opened, never closed.
        streams.insert(
            0,
            Stream::new(
                0,
                StreamState::Idle,
                false,
                DEFAULT_INITIAL_WINDOW_SIZE,
                DEFAULT_INITIAL_WINDOW_SIZE,
            ),
        );
        Self {
            server,
            streams,
            local: Endpoint::new(server),
            remote: Endpoint::new(!server),
            goaway_sent: None,
            goaway_received: None,
            local_initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
            remote_initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
        }
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    pub fn local(&self) -> &Endpoint {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut Endpoint {
        &mut self.local
    }

    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut Endpoint {
        &mut self.remote
    }

    pub fn stream(&self, id: u32) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn stream_mut(&mut self, id: u32) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    /// Look up a stream that the peer must have established already.
    pub fn require_stream(&self, id: u32) -> Result<&Stream> {
        self.streams.get(&id).ok_or_else(|| {
            connection_error(ErrorCode::ProtocolError, format!("stream does not exist {}", id))
        })
    }

    pub fn require_stream_mut(&mut self, id: u32) -> Result<&mut Stream> {
        self.streams.get_mut(&id).ok_or_else(|| {
            connection_error(ErrorCode::ProtocolError, format!("stream does not exist {}", id))
        })
    }

    /// Create a locally initiated stream in `Idle` state. The outbound half
    /// registers its streams here before writing HEADERS for them.
    pub fn create_local_stream(&mut self, id: u32) -> Result<&mut Stream> {
        if !self.local.is_valid_stream_id(id) {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                format!("invalid local stream id {}", id),
            ));
        }
        self.insert_idle_stream(id, true)
    }

    /// Create a peer-initiated stream in `Idle` state.
    pub fn create_remote_stream(&mut self, id: u32) -> Result<&mut Stream> {
        if !self.remote.is_valid_stream_id(id) {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                format!("invalid remote stream id {}", id),
            ));
        }
        self.insert_idle_stream(id, false)
    }

    /// Reserve a promised stream in `ReservedRemote`, inheriting the parent
    /// stream's priority (RFC 9113 Section 6.6).
    pub fn reserve_push_stream(&mut self, promised_id: u32, parent_id: u32) -> Result<()> {
        if self.server {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                "client cannot reserve a push stream",
            ));
        }
        if !self.local.allow_push() {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                "server push not allowed to this endpoint",
            ));
        }
        if !self.remote.is_valid_stream_id(promised_id) {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                format!("invalid promised stream id {}", promised_id),
            ));
        }
        let parent_priority = self.require_stream(parent_id)?.priority();

        let stream = self.insert_idle_stream(promised_id, false)?;
        stream.set_priority(Priority {
            dependency: parent_id,
            weight: parent_priority.weight,
            exclusive: false,
        });
        stream.reserve_remote();
        Ok(())
    }

    /// Transition a stream out of `Idle`/`Reserved*` on HEADERS, enforcing
    /// the creator endpoint's concurrency bound.
    pub fn open_stream(&mut self, id: u32, half_closed: bool) -> Result<StreamState> {
        let stream = self.streams.get_mut(&id).ok_or_else(|| {
            Error::Internal(format!("open of unregistered stream {}", id))
        })?;
        if stream.state().is_active() {
            return stream.open(half_closed);
        }

        let endpoint = if stream.is_local() {
            &mut self.local
        } else {
            &mut self.remote
        };
        if endpoint.active >= endpoint.max_active_streams {
            return Err(stream_error(
                id,
                ErrorCode::RefusedStream,
                "maximum active streams violated for this endpoint",
            ));
        }
        let state = stream.open(half_closed)?;
        endpoint.active += 1;
        Ok(state)
    }

    /// The peer finished its side of the stream.
    pub fn close_stream_remote_side(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        let Some(stream) = self.streams.get_mut(&id) else {
            return;
        };
        let was_active = stream.state().is_active();
        let state = stream.close_remote_side();
        if was_active && !state.is_active() {
            self.deactivate(id);
        }
    }

    /// Close both sides of the stream. The entry stays in the registry so
    /// later frames are seen as `Closed` rather than unknown.
    pub fn close_stream(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        let Some(stream) = self.streams.get_mut(&id) else {
            return;
        };
        let was_active = stream.state().is_active();
        stream.close();
        if was_active {
            self.deactivate(id);
        }
    }

    fn deactivate(&mut self, id: u32) {
        let is_local = self
            .streams
            .get(&id)
            .map(|s| s.is_local())
            .unwrap_or(false);
        let endpoint = if is_local { &mut self.local } else { &mut self.remote };
        endpoint.active = endpoint.active.saturating_sub(1);
    }

    /// Record a priority triple, creating the dependency parent in `Idle`
    /// when it does not exist yet.
    pub fn set_priority(&mut self, id: u32, spec: PrioritySpec) -> Result<()> {
        if spec.dependency == id {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                format!("stream {} cannot depend on itself", id),
            ));
        }
        if spec.dependency != 0 && !self.streams.contains_key(&spec.dependency) {
            let local_parent = self.local.is_valid_stream_id(spec.dependency);
            self.insert_idle_stream(spec.dependency, local_parent)?;
        }
        let stream = self.streams.get_mut(&id).ok_or_else(|| {
            Error::Internal(format!("priority for unregistered stream {}", id))
        })?;
        stream.set_priority(Priority {
            dependency: spec.dependency,
            weight: spec.weight,
            exclusive: spec.exclusive,
        });
        Ok(())
    }

    fn insert_idle_stream(&mut self, id: u32, local: bool) -> Result<&mut Stream> {
        let endpoint = if local { &mut self.local } else { &mut self.remote };
        if self.streams.contains_key(&id) {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                format!("stream {} already exists", id),
            ));
        }
        if id <= endpoint.last_stream_created {
            // An id at or below the creation high-water mark was used and
            // closed before; it cannot come back.
            return Err(Error::ClosedStreamCreation {
                stream_id: id,
                message: format!(
                    "stream {} is behind the latest created stream {}",
                    id, endpoint.last_stream_created
                ),
            });
        }
        endpoint.record_created(id);
        let stream = Stream::new(
            id,
            StreamState::Idle,
            local,
            self.local_initial_window,
            self.remote_initial_window,
        );
        Ok(self.streams.entry(id).or_insert(stream))
    }

    /// Latch that the peer told us to go away. Repeat GOAWAYs only update
    /// the recorded last-stream-id.
    pub fn set_goaway_received(&mut self, last_stream_id: u32) {
        tracing::debug!(last_stream_id, "GOAWAY received");
        self.goaway_received = Some(last_stream_id);
    }

    pub fn goaway_received(&self) -> bool {
        self.goaway_received.is_some()
    }

    pub fn goaway_received_last_stream_id(&self) -> Option<u32> {
        self.goaway_received
    }

    /// Latch that we sent GOAWAY; recorded by the outbound half.
    pub fn set_goaway_sent(&mut self, last_stream_id: u32) {
        self.goaway_sent = Some(last_stream_id);
    }

    pub fn goaway_sent(&self) -> bool {
        self.goaway_sent.is_some()
    }

    pub fn goaway_sent_last_stream_id(&self) -> Option<u32> {
        self.goaway_sent
    }

    /// Iterate over every registered stream except the connection control
    /// stream. Used for retroactive window adjustments.
    pub(crate) fn streams_mut(&mut self) -> impl Iterator<Item = &mut Stream> {
        self.streams.values_mut().filter(|s| s.id() != 0)
    }
}
