//! The inbound dispatch core.
//!
//! [`ConnectionDecoder`] drives the frame reader, gates the connection
//! preface, validates every frame against connection and stream state, and
//! dispatches the survivors to the application listener. Frames are either
//! delivered, silently ignored, failed with a stream error, or failed with
//! a connection error; which one is the whole game.
//!
//! Two predicates shape most handlers. A frame is *ignored* when we have
//! sent GOAWAY and the stream was created past the advertised cutoff, or
//! when we have already reset the stream ourselves (PRIORITY excepted).
//! And once the peer's own GOAWAY has been received, any further inbound
//! frame other than GOAWAY or an unknown type is a connection error.

use bytes::{Bytes, BytesMut};

use crate::connection::Connection;
use crate::error::{connection_error, stream_error, Error, Result};
use crate::flow::{DefaultLocalFlowController, LocalFlowController};
use crate::frame::{ErrorCode, Frame, PrioritySpec, DEFAULT_PRIORITY_WEIGHT};
use crate::headers::Headers;
use crate::lifecycle::LifecycleManager;
use crate::listener::FrameListener;
use crate::reader::FrameReader;
use crate::settings::Settings;
use crate::stream::{Stream, StreamState};
use crate::verify::{AlwaysVerify, PromisedRequestVerifier};
use crate::writer::Context;
use crate::encoder::ConnectionEncoder;

/// Whether the first SETTINGS frame has been seen yet. Flips to `Running`
/// exactly once, before that same SETTINGS frame is handled, so
/// `preface_received()` is already true inside any nested callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchMode {
    AwaitingPreface,
    Running,
}

/// Decodes inbound HTTP/2 frames and dispatches them to a listener.
pub struct ConnectionDecoder {
    connection: Connection,
    lifecycle: Box<dyn LifecycleManager>,
    encoder: Box<dyn ConnectionEncoder>,
    frame_reader: Box<dyn FrameReader>,
    listener: Box<dyn FrameListener>,
    request_verifier: Box<dyn PromisedRequestVerifier>,
    flow: Box<dyn LocalFlowController>,
    mode: DispatchMode,
}

/// Builder for [`ConnectionDecoder`].
#[derive(Default)]
pub struct DecoderBuilder {
    connection: Option<Connection>,
    lifecycle: Option<Box<dyn LifecycleManager>>,
    encoder: Option<Box<dyn ConnectionEncoder>>,
    frame_reader: Option<Box<dyn FrameReader>>,
    listener: Option<Box<dyn FrameListener>>,
    request_verifier: Option<Box<dyn PromisedRequestVerifier>>,
    flow_controller: Option<Box<dyn LocalFlowController>>,
}

impl DecoderBuilder {
    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn lifecycle_manager(mut self, lifecycle: impl LifecycleManager + 'static) -> Self {
        self.lifecycle = Some(Box::new(lifecycle));
        self
    }

    pub fn encoder(mut self, encoder: impl ConnectionEncoder + 'static) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }

    pub fn frame_reader(mut self, reader: impl FrameReader + 'static) -> Self {
        self.frame_reader = Some(Box::new(reader));
        self
    }

    pub fn listener(mut self, listener: impl FrameListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn request_verifier(mut self, verifier: impl PromisedRequestVerifier + 'static) -> Self {
        self.request_verifier = Some(Box::new(verifier));
        self
    }

    pub fn flow_controller(mut self, flow: impl LocalFlowController + 'static) -> Self {
        self.flow_controller = Some(Box::new(flow));
        self
    }

    pub fn build(self) -> Result<ConnectionDecoder> {
        let connection = require(self.connection, "connection")?;
        let lifecycle = require(self.lifecycle, "lifecycle manager")?;
        let encoder = require(self.encoder, "encoder")?;
        let frame_reader = require(self.frame_reader, "frame reader")?;
        let listener = require(self.listener, "listener")?;
        let request_verifier = self
            .request_verifier
            .unwrap_or_else(|| Box::new(AlwaysVerify));
        // When no inbound flow controller is supplied, install the default
        // bound to the encoder's frame writer.
        let flow = self
            .flow_controller
            .unwrap_or_else(|| Box::new(DefaultLocalFlowController::new(encoder.frame_writer())));

        Ok(ConnectionDecoder {
            connection,
            lifecycle,
            encoder,
            frame_reader,
            listener,
            request_verifier,
            flow,
            mode: DispatchMode::AwaitingPreface,
        })
    }
}

fn require<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| Error::Internal(format!("{} is required", name)))
}

impl ConnectionDecoder {
    pub fn builder() -> DecoderBuilder {
        DecoderBuilder::default()
    }

    /// Drive one read pass: decode every complete frame in `input` and
    /// dispatch it. Outbound frames produced along the way (acks, window
    /// updates) accumulate in `ctx`.
    pub fn decode_frame(&mut self, ctx: &mut Context, input: &mut BytesMut) -> Result<()> {
        while let Some(frame) = self.frame_reader.read_frame(input)? {
            self.dispatch(ctx, frame)?;
        }
        Ok(())
    }

    /// Whether the peer's first SETTINGS frame has been accepted.
    pub fn preface_received(&self) -> bool {
        self.mode == DispatchMode::Running
    }

    /// Snapshot of the settings currently governing our inbound side.
    pub fn local_settings(&self) -> Settings {
        let mut settings = Settings::new();
        settings.initial_window_size = Some(self.flow.initial_window_size());
        settings.max_concurrent_streams = Some(self.connection.remote().max_active_streams());
        settings.header_table_size = Some(self.frame_reader.max_header_table_size());
        settings.max_frame_size = Some(self.frame_reader.max_frame_size());
        settings.max_header_list_size = Some(self.frame_reader.max_header_list_size());
        if !self.connection.is_server() {
            // Only a client endpoint may advertise ENABLE_PUSH.
            settings.enable_push = Some(self.connection.local().allow_push());
        }
        settings
    }

    /// Apply the present fields of `settings` to the inbound side. Also the
    /// path taken when the peer acknowledges settings we sent.
    pub fn apply_local_settings(&mut self, settings: &Settings) -> Result<()> {
        if let Some(push) = settings.enable_push {
            if self.connection.is_server() {
                return Err(connection_error(
                    ErrorCode::ProtocolError,
                    "server sending SETTINGS frame with ENABLE_PUSH specified",
                ));
            }
            self.connection.local_mut().set_allow_push(push);
        }
        if let Some(max) = settings.max_concurrent_streams {
            self.connection.remote_mut().set_max_active_streams(max);
        }
        if let Some(size) = settings.header_table_size {
            self.frame_reader.set_max_header_table_size(size)?;
        }
        if let Some(size) = settings.max_header_list_size {
            self.frame_reader.set_max_header_list_size(size)?;
        }
        if let Some(size) = settings.max_frame_size {
            self.frame_reader.set_max_frame_size(size)?;
        }
        if let Some(size) = settings.initial_window_size {
            self.flow
                .set_initial_window_size(&mut self.connection, size)?;
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn listener(&self) -> &dyn FrameListener {
        self.listener.as_ref()
    }

    pub fn flow_controller(&self) -> &dyn LocalFlowController {
        self.flow.as_ref()
    }

    pub fn flow_controller_mut(&mut self) -> &mut dyn LocalFlowController {
        self.flow.as_mut()
    }

    /// Release the frame reader's buffers.
    pub fn close(&mut self) {
        self.frame_reader.close();
    }

    fn dispatch(&mut self, ctx: &mut Context, frame: Frame) -> Result<()> {
        match self.mode {
            DispatchMode::AwaitingPreface => match frame {
                Frame::Settings { .. } => {
                    // Install the running dispatcher before handling so the
                    // flip is observable from inside the listener callback.
                    self.mode = DispatchMode::Running;
                    tracing::debug!("connection preface received");
                    self.handle(ctx, frame)
                }
                // A peer may GOAWAY before its SETTINGS, and unknown frame
                // types must be ignored wherever they appear.
                Frame::GoAway { .. } | Frame::Unknown { .. } => self.handle(ctx, frame),
                _ => Err(connection_error(
                    ErrorCode::ProtocolError,
                    "received non-SETTINGS as first frame",
                )),
            },
            DispatchMode::Running => self.handle(ctx, frame),
        }
    }

    fn handle(&mut self, ctx: &mut Context, frame: Frame) -> Result<()> {
        match frame {
            Frame::Data {
                stream_id,
                data,
                padding,
                end_of_stream,
            } => self.on_data(ctx, stream_id, data, padding, end_of_stream),
            Frame::Headers {
                stream_id,
                headers,
                priority,
                padding,
                end_of_stream,
            } => self.on_headers(ctx, stream_id, headers, priority, padding, end_of_stream),
            Frame::Priority {
                stream_id,
                dependency,
                weight,
                exclusive,
            } => self.on_priority(ctx, stream_id, dependency, weight, exclusive),
            Frame::RstStream {
                stream_id,
                error_code,
            } => self.on_rst_stream(ctx, stream_id, error_code),
            Frame::Settings { settings } => self.on_settings(ctx, settings),
            Frame::SettingsAck => self.on_settings_ack(ctx),
            Frame::Ping { data } => self.on_ping(ctx, data),
            Frame::PingAck { data } => self.on_ping_ack(ctx, data),
            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                headers,
                padding,
            } => self.on_push_promise(ctx, stream_id, promised_stream_id, headers, padding),
            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => self.on_go_away(ctx, last_stream_id, error_code, debug_data),
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => self.on_window_update(ctx, stream_id, increment),
            Frame::Unknown {
                frame_type,
                stream_id,
                flags,
                payload,
            } => self.on_unknown(ctx, frame_type, stream_id, flags, payload),
        }
    }

    fn on_data(
        &mut self,
        ctx: &mut Context,
        stream_id: u32,
        data: Bytes,
        padding: usize,
        end_of_stream: bool,
    ) -> Result<()> {
        let (state, should_ignore) = {
            let stream = self.connection.require_stream(stream_id)?;
            (stream.state(), self.should_ignore_frame(Some(stream), false))
        };
        // Raised below, after flow control has been applied; the window
        // must account for the frame even when the connection is doomed.
        let goaway_error = self.verify_goaway_not_received().err();

        let state_error = match state {
            StreamState::Open | StreamState::HalfClosedLocal => None,
            // Data after the remote endpoint half-closed is always fatal to
            // the stream, ignored or not.
            StreamState::HalfClosedRemote => Some(stream_error(
                stream_id,
                ErrorCode::StreamClosed,
                format!("stream {} in unexpected state: {:?}", stream_id, state),
            )),
            StreamState::Closed => (!should_ignore).then(|| {
                stream_error(
                    stream_id,
                    ErrorCode::StreamClosed,
                    format!("stream {} in unexpected state: {:?}", stream_id, state),
                )
            }),
            _ => (!should_ignore).then(|| {
                stream_error(
                    stream_id,
                    ErrorCode::ProtocolError,
                    format!("stream {} in unexpected state: {:?}", stream_id, state),
                )
            }),
        };

        let full_bytes = data.len() + padding;
        let mut unconsumed = self.flow.unconsumed_bytes(&self.connection, stream_id);

        let delivery: Result<usize> = (|| {
            // The sole window-accounting entry point. Runs for every DATA
            // frame, including ones about to be ignored or failed.
            self.flow.receive_flow_controlled_frame(
                ctx,
                &mut self.connection,
                stream_id,
                &data,
                padding,
                end_of_stream,
            )?;
            unconsumed = self.flow.unconsumed_bytes(&self.connection, stream_id);

            if let Some(error) = goaway_error {
                return Err(error);
            }
            if should_ignore {
                tracing::debug!(stream_id, "ignoring DATA frame");
                return Ok(full_bytes);
            }
            if let Some(error) = state_error {
                return Err(error);
            }

            // The listener reports how many bytes it processed on the spot.
            self.listener
                .on_data_read(ctx, stream_id, &data, padding, end_of_stream)
        })();

        let (bytes_to_return, failure) = match delivery {
            Ok(processed) => (processed as i64, None),
            Err(error) => {
                // The listener may have consumed part of the frame before
                // failing; only the remainder goes back in the finalizer.
                let now = self.flow.unconsumed_bytes(&self.connection, stream_id);
                let delta = i64::from(unconsumed) - i64::from(now);
                (full_bytes as i64 - delta, Some(error))
            }
        };

        let mut result = match failure {
            Some(error) => Err(error),
            None => Ok(()),
        };
        if bytes_to_return > 0 {
            if let Err(consume_error) = self.flow.consume_bytes(
                ctx,
                &mut self.connection,
                stream_id,
                bytes_to_return as u32,
            ) {
                if result.is_ok() {
                    result = Err(consume_error);
                } else {
                    tracing::warn!(stream_id, error = %consume_error, "error returning bytes during failure cleanup");
                }
            }
        }
        if end_of_stream {
            self.lifecycle
                .close_remote_side(&mut self.connection, stream_id);
        }
        result
    }

    fn on_headers(
        &mut self,
        ctx: &mut Context,
        stream_id: u32,
        headers: Headers,
        priority: Option<PrioritySpec>,
        padding: usize,
        end_of_stream: bool,
    ) -> Result<()> {
        // A plain HEADERS frame carries the default priority.
        let priority = priority.unwrap_or(PrioritySpec {
            dependency: 0,
            weight: DEFAULT_PRIORITY_WEIGHT,
            exclusive: false,
        });

        let state = {
            let stream = self.connection.stream(stream_id);
            self.verify_goaway_not_received()?;
            if self.should_ignore_frame(stream, false) {
                tracing::debug!(stream_id, "ignoring HEADERS frame");
                return Ok(());
            }
            stream.map(|s| s.state())
        };

        match state {
            None => {
                self.connection.create_remote_stream(stream_id)?;
                self.connection.open_stream(stream_id, end_of_stream)?;
            }
            Some(StreamState::ReservedRemote) | Some(StreamState::Idle) => {
                self.connection.open_stream(stream_id, end_of_stream)?;
            }
            // Trailers are allowed while the remote side is still sending.
            Some(StreamState::Open) | Some(StreamState::HalfClosedLocal) => {}
            Some(closed @ (StreamState::HalfClosedRemote | StreamState::Closed)) => {
                return Err(stream_error(
                    stream_id,
                    ErrorCode::StreamClosed,
                    format!("stream {} in unexpected state: {:?}", stream_id, closed),
                ));
            }
            Some(other) => {
                return Err(connection_error(
                    ErrorCode::ProtocolError,
                    format!("stream {} in unexpected state: {:?}", stream_id, other),
                ));
            }
        }

        self.listener.on_headers_read(
            ctx,
            stream_id,
            &headers,
            priority.dependency,
            priority.weight,
            priority.exclusive,
            padding,
            end_of_stream,
        )?;

        self.connection.set_priority(stream_id, priority)?;

        if end_of_stream {
            self.lifecycle
                .close_remote_side(&mut self.connection, stream_id);
        }
        Ok(())
    }

    fn on_priority(
        &mut self,
        ctx: &mut Context,
        stream_id: u32,
        dependency: u32,
        weight: u16,
        exclusive: bool,
    ) -> Result<()> {
        let exists = {
            let stream = self.connection.stream(stream_id);
            self.verify_goaway_not_received()?;
            // PRIORITY stays meaningful for streams we reset ourselves.
            if self.should_ignore_frame(stream, true) {
                tracing::debug!(stream_id, "ignoring PRIORITY frame");
                return Ok(());
            }
            stream.is_some()
        };

        let applied: Result<()> = (|| {
            if !exists {
                // A PRIORITY frame may be the first thing we hear about a
                // stream; it is created idle.
                self.connection.create_remote_stream(stream_id)?;
            }
            // May implicitly create the dependency parent, so it runs
            // before the listener is notified.
            self.connection.set_priority(
                stream_id,
                PrioritySpec {
                    dependency,
                    weight,
                    exclusive,
                },
            )
        })();
        match applied {
            Err(Error::ClosedStreamCreation { stream_id, .. }) => {
                // The stream or its parent closed under us. A late PRIORITY
                // for it is benign.
                tracing::debug!(stream_id, "priority for closed stream ignored");
            }
            Err(other) => return Err(other),
            Ok(()) => {}
        }

        self.listener
            .on_priority_read(ctx, stream_id, dependency, weight, exclusive)
    }

    fn on_rst_stream(
        &mut self,
        ctx: &mut Context,
        stream_id: u32,
        error_code: ErrorCode,
    ) -> Result<()> {
        let state = self.connection.require_stream(stream_id)?.state();
        self.verify_goaway_not_received()?;
        if state == StreamState::Closed {
            // RST_STREAM for a closed stream is a no-op.
            return Ok(());
        }

        self.connection
            .require_stream_mut(stream_id)?
            .set_reset_received();
        self.listener.on_rst_stream_read(ctx, stream_id, error_code)?;
        self.lifecycle.close_stream(&mut self.connection, stream_id);
        Ok(())
    }

    fn on_settings(&mut self, ctx: &mut Context, settings: Settings) -> Result<()> {
        self.verify_goaway_not_received()?;
        self.encoder
            .remote_settings(&mut self.connection, &settings)?;

        // Acknowledge before the listener runs, so any write the listener
        // issues follows the ack on the wire.
        self.encoder.write_settings_ack(ctx)?;
        ctx.flush();

        self.listener.on_settings_read(ctx, &settings)
    }

    fn on_settings_ack(&mut self, ctx: &mut Context) -> Result<()> {
        self.verify_goaway_not_received()?;
        // Apply the oldest outstanding local settings. This is the
        // synchronization point between the endpoints.
        if let Some(settings) = self.encoder.poll_sent_settings() {
            self.apply_local_settings(&settings)?;
            tracing::debug!("applied acknowledged local settings");
        }
        self.listener.on_settings_ack_read(ctx)
    }

    fn on_ping(&mut self, ctx: &mut Context, data: [u8; 8]) -> Result<()> {
        self.verify_goaway_not_received()?;
        // Echo the opaque payload back. The bytes are copied before the
        // deferred write; the reader's buffer is gone once we return.
        self.encoder.write_ping(ctx, true, data)?;
        ctx.flush();

        self.listener.on_ping_read(ctx, data)
    }

    fn on_ping_ack(&mut self, ctx: &mut Context, data: [u8; 8]) -> Result<()> {
        self.verify_goaway_not_received()?;
        self.listener.on_ping_ack_read(ctx, data)
    }

    fn on_push_promise(
        &mut self,
        ctx: &mut Context,
        stream_id: u32,
        promised_stream_id: u32,
        headers: Headers,
        padding: usize,
    ) -> Result<()> {
        let parent_state = {
            let parent = self.connection.require_stream(stream_id)?;
            self.verify_goaway_not_received()?;
            if self.should_ignore_frame(Some(parent), false) {
                tracing::debug!(stream_id, "ignoring PUSH_PROMISE frame");
                return Ok(());
            }
            parent.state()
        };

        match parent_state {
            StreamState::Open | StreamState::HalfClosedLocal => {}
            other => {
                return Err(connection_error(
                    ErrorCode::ProtocolError,
                    format!(
                        "stream {} in unexpected state for receiving push promise: {:?}",
                        stream_id, other
                    ),
                ));
            }
        }

        // Three separate checks so the failure names the violated policy.
        if !self
            .request_verifier
            .is_authoritative(&self.connection, &headers)
        {
            return Err(stream_error(
                promised_stream_id,
                ErrorCode::ProtocolError,
                format!(
                    "promised request on stream {} for promised stream {} is not authoritative",
                    stream_id, promised_stream_id
                ),
            ));
        }
        if !self.request_verifier.is_cacheable(&headers) {
            return Err(stream_error(
                promised_stream_id,
                ErrorCode::ProtocolError,
                format!(
                    "promised request on stream {} for promised stream {} is not known to be cacheable",
                    stream_id, promised_stream_id
                ),
            ));
        }
        if !self.request_verifier.is_safe(&headers) {
            return Err(stream_error(
                promised_stream_id,
                ErrorCode::ProtocolError,
                format!(
                    "promised request on stream {} for promised stream {} is not known to be safe",
                    stream_id, promised_stream_id
                ),
            ));
        }

        self.connection
            .reserve_push_stream(promised_stream_id, stream_id)?;

        self.listener
            .on_push_promise_read(ctx, stream_id, promised_stream_id, &headers, padding)
    }

    fn on_go_away(
        &mut self,
        ctx: &mut Context,
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: Bytes,
    ) -> Result<()> {
        // Runs even when a GOAWAY was already received; peers may send
        // several, each narrowing the last-stream id.
        self.connection.set_goaway_received(last_stream_id);
        self.listener
            .on_go_away_read(ctx, last_stream_id, error_code, &debug_data)
    }

    fn on_window_update(&mut self, ctx: &mut Context, stream_id: u32, increment: u32) -> Result<()> {
        let (state, should_ignore) = {
            let stream = self.connection.require_stream(stream_id)?;
            self.verify_goaway_not_received()?;
            (stream.state(), self.should_ignore_frame(Some(stream), false))
        };
        if state == StreamState::Closed || should_ignore {
            tracing::debug!(stream_id, "ignoring WINDOW_UPDATE frame");
            return Ok(());
        }

        // Credit the outbound side; increment legality is its policy.
        self.encoder.flow_controller().increment_window_size(
            &mut self.connection,
            stream_id,
            increment,
        )?;

        self.listener.on_window_update_read(ctx, stream_id, increment)
    }

    fn on_unknown(
        &mut self,
        ctx: &mut Context,
        frame_type: u8,
        stream_id: u32,
        flags: u8,
        payload: Bytes,
    ) -> Result<()> {
        self.listener
            .on_unknown_frame(ctx, frame_type, stream_id, flags, &payload)
    }

    /// Whether a frame for `stream` should be silently dropped: after we
    /// send GOAWAY, streams past the cutoff no longer exist as far as the
    /// application is concerned; after we send RST_STREAM, the peer may
    /// legitimately still be flushing frames it had in flight.
    fn should_ignore_frame(&self, stream: Option<&Stream>, allow_after_reset: bool) -> bool {
        if matches!(stream, Some(s) if s.id() == 0) {
            // The connection control stream is never ignored.
            return false;
        }
        if self.connection.goaway_sent() {
            match stream {
                None => return true,
                Some(s) if self.connection.remote().last_stream_created() <= s.id() => {
                    return true
                }
                _ => {}
            }
        }
        matches!(stream, Some(s) if !allow_after_reset && s.is_reset_sent())
    }

    /// Once the peer has said GOAWAY, anything further from it is a
    /// protocol violation.
    fn verify_goaway_not_received(&self) -> Result<()> {
        if self.connection.goaway_received() {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                "received frames after receiving GO_AWAY",
            ));
        }
        Ok(())
    }
}
