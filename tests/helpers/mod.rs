//! Shared test fixtures: wire-frame builders, a recording listener, and a
//! scripted flow controller for byte-accounting assertions.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::{BufMut, Bytes, BytesMut};

use shade::{
    stream_error, Connection, ConnectionDecoder, ConnectionEncoder, Context,
    DefaultConnectionEncoder, DefaultFrameReader, DefaultLifecycleManager, ErrorCode, flags,
    FrameHeader, FrameListener, FrameType, HeaderDecoder, Headers, LocalFlowController, Result,
    Settings, DEFAULT_INITIAL_WINDOW_SIZE,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .try_init();
}

// ---------------------------------------------------------------------------
// Wire-frame builders (the peer's side of the conversation)

pub fn raw_frame(frame_type: u8, frame_flags: u8, stream_id: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    FrameHeader {
        length: payload.len() as u32,
        frame_type: FrameType::from(frame_type),
        flags: frame_flags,
        stream_id,
    }
    .serialize(&mut buf);
    buf.extend_from_slice(payload);
    buf
}

pub fn settings_frame(pairs: &[(u16, u32)]) -> BytesMut {
    let mut payload = BytesMut::new();
    for (id, value) in pairs {
        payload.put_u16(*id);
        payload.put_u32(*value);
    }
    raw_frame(0x4, 0, 0, &payload)
}

pub fn settings_ack_frame() -> BytesMut {
    raw_frame(0x4, flags::ACK, 0, &[])
}

pub fn data_frame(stream_id: u32, payload: &[u8], end_of_stream: bool) -> BytesMut {
    let frame_flags = if end_of_stream { flags::END_STREAM } else { 0 };
    raw_frame(0x0, frame_flags, stream_id, payload)
}

pub fn headers_frame(stream_id: u32, pairs: &[(&str, &str)], end_of_stream: bool) -> BytesMut {
    let mut frame_flags = flags::END_HEADERS;
    if end_of_stream {
        frame_flags |= flags::END_STREAM;
    }
    raw_frame(0x1, frame_flags, stream_id, &encode_block(pairs))
}

pub fn headers_frame_with_priority(
    stream_id: u32,
    pairs: &[(&str, &str)],
    dependency: u32,
    weight_octet: u8,
    exclusive: bool,
) -> BytesMut {
    let mut payload = BytesMut::new();
    let raw = if exclusive { dependency | 0x8000_0000 } else { dependency };
    payload.put_u32(raw);
    payload.put_u8(weight_octet);
    payload.extend_from_slice(&encode_block(pairs));
    raw_frame(0x1, flags::END_HEADERS | flags::PRIORITY, stream_id, &payload)
}

pub fn priority_frame(stream_id: u32, dependency: u32, weight_octet: u8, exclusive: bool) -> BytesMut {
    let mut payload = BytesMut::new();
    let raw = if exclusive { dependency | 0x8000_0000 } else { dependency };
    payload.put_u32(raw);
    payload.put_u8(weight_octet);
    raw_frame(0x2, 0, stream_id, &payload)
}

pub fn rst_stream_frame(stream_id: u32, error_code: u32) -> BytesMut {
    let mut payload = BytesMut::new();
    payload.put_u32(error_code);
    raw_frame(0x3, 0, stream_id, &payload)
}

pub fn push_promise_frame(stream_id: u32, promised_stream_id: u32, pairs: &[(&str, &str)]) -> BytesMut {
    let mut payload = BytesMut::new();
    payload.put_u32(promised_stream_id);
    payload.extend_from_slice(&encode_block(pairs));
    raw_frame(0x5, flags::END_HEADERS, stream_id, &payload)
}

pub fn ping_frame(data: [u8; 8], ack: bool) -> BytesMut {
    raw_frame(0x6, if ack { flags::ACK } else { 0 }, 0, &data)
}

pub fn goaway_frame(last_stream_id: u32, error_code: u32) -> BytesMut {
    let mut payload = BytesMut::new();
    payload.put_u32(last_stream_id);
    payload.put_u32(error_code);
    raw_frame(0x7, 0, 0, &payload)
}

pub fn window_update_frame(stream_id: u32, increment: u32) -> BytesMut {
    let mut payload = BytesMut::new();
    payload.put_u32(increment);
    raw_frame(0x8, 0, stream_id, &payload)
}

/// Header block format understood by [`StubHeaderDecoder`]: length-prefixed
/// name/value pairs.
pub fn encode_block(pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut block = Vec::new();
    for (name, value) in pairs {
        block.push(name.len() as u8);
        block.extend_from_slice(name.as_bytes());
        block.push(value.len() as u8);
        block.extend_from_slice(value.as_bytes());
    }
    block
}

/// Split a flushed output buffer back into frames.
pub fn parse_output(mut out: Bytes) -> Vec<(FrameType, u8, u32, Bytes)> {
    let mut frames = Vec::new();
    while !out.is_empty() {
        let header = FrameHeader::parse(&out).expect("malformed output frame header");
        let total = 9 + header.length as usize;
        let payload = out.slice(9..total);
        frames.push((header.frame_type, header.flags, header.stream_id, payload));
        out = out.slice(total..);
    }
    frames
}

// ---------------------------------------------------------------------------
// Header decoding stub

pub struct StubHeaderDecoder;

impl HeaderDecoder for StubHeaderDecoder {
    fn decode(&mut self, block: &[u8]) -> Result<Headers> {
        let mut headers = Headers::new();
        let mut rest = block;
        while !rest.is_empty() {
            let name_len = rest[0] as usize;
            let name = std::str::from_utf8(&rest[1..1 + name_len]).unwrap();
            rest = &rest[1 + name_len..];
            let value_len = rest[0] as usize;
            let value = std::str::from_utf8(&rest[1..1 + value_len]).unwrap();
            rest = &rest[1 + value_len..];
            headers.add(name, value);
        }
        Ok(headers)
    }
}

// ---------------------------------------------------------------------------
// Recording listener

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Data {
        stream_id: u32,
        len: usize,
        padding: usize,
        end_of_stream: bool,
    },
    Headers {
        stream_id: u32,
        dependency: u32,
        weight: u16,
        exclusive: bool,
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
    Settings,
    SettingsAck,
    Ping([u8; 8]),
    PingAck([u8; 8]),
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
    },
    GoAway {
        last_stream_id: u32,
        error_code: ErrorCode,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Unknown {
        frame_type: u8,
        stream_id: u32,
    },
}

#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<Event>>>);

impl EventLog {
    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }
}

/// Listener that records every callback, with a couple of behavior knobs
/// for failure-path tests.
#[derive(Default)]
pub struct RecordingListener {
    pub log: EventLog,
    /// Fail `on_data_read` with a stream error of this code.
    pub data_error: Option<ErrorCode>,
    /// Report only this many bytes as immediately processed.
    pub data_processed: Option<usize>,
    /// Write a PING from inside `on_settings_read`, to probe write ordering
    /// against the SETTINGS ack.
    pub ping_on_settings: bool,
}

impl RecordingListener {
    pub fn new() -> (Self, EventLog) {
        let listener = Self::default();
        let log = listener.log.clone();
        (listener, log)
    }
}

impl FrameListener for RecordingListener {
    fn on_data_read(
        &mut self,
        _ctx: &mut Context,
        stream_id: u32,
        data: &Bytes,
        padding: usize,
        end_of_stream: bool,
    ) -> Result<usize> {
        self.log.push(Event::Data {
            stream_id,
            len: data.len(),
            padding,
            end_of_stream,
        });
        if let Some(code) = self.data_error {
            return Err(stream_error(stream_id, code, "listener failure"));
        }
        Ok(self.data_processed.unwrap_or(data.len() + padding))
    }

    fn on_headers_read(
        &mut self,
        _ctx: &mut Context,
        stream_id: u32,
        _headers: &Headers,
        dependency: u32,
        weight: u16,
        exclusive: bool,
        _padding: usize,
        end_of_stream: bool,
    ) -> Result<()> {
        self.log.push(Event::Headers {
            stream_id,
            dependency,
            weight,
            exclusive,
            end_of_stream,
        });
        Ok(())
    }

    fn on_priority_read(
        &mut self,
        _ctx: &mut Context,
        stream_id: u32,
        dependency: u32,
        weight: u16,
        exclusive: bool,
    ) -> Result<()> {
        self.log.push(Event::Priority {
            stream_id,
            dependency,
            weight,
            exclusive,
        });
        Ok(())
    }

    fn on_rst_stream_read(
        &mut self,
        _ctx: &mut Context,
        stream_id: u32,
        error_code: ErrorCode,
    ) -> Result<()> {
        self.log.push(Event::RstStream {
            stream_id,
            error_code,
        });
        Ok(())
    }

    fn on_settings_read(&mut self, ctx: &mut Context, _settings: &Settings) -> Result<()> {
        self.log.push(Event::Settings);
        if self.ping_on_settings {
            ctx.write(&ping_frame([9; 8], false));
            ctx.flush();
        }
        Ok(())
    }

    fn on_settings_ack_read(&mut self, _ctx: &mut Context) -> Result<()> {
        self.log.push(Event::SettingsAck);
        Ok(())
    }

    fn on_ping_read(&mut self, _ctx: &mut Context, data: [u8; 8]) -> Result<()> {
        self.log.push(Event::Ping(data));
        Ok(())
    }

    fn on_ping_ack_read(&mut self, _ctx: &mut Context, data: [u8; 8]) -> Result<()> {
        self.log.push(Event::PingAck(data));
        Ok(())
    }

    fn on_push_promise_read(
        &mut self,
        _ctx: &mut Context,
        stream_id: u32,
        promised_stream_id: u32,
        _headers: &Headers,
        _padding: usize,
    ) -> Result<()> {
        self.log.push(Event::PushPromise {
            stream_id,
            promised_stream_id,
        });
        Ok(())
    }

    fn on_go_away_read(
        &mut self,
        _ctx: &mut Context,
        last_stream_id: u32,
        error_code: ErrorCode,
        _debug_data: &Bytes,
    ) -> Result<()> {
        self.log.push(Event::GoAway {
            last_stream_id,
            error_code,
        });
        Ok(())
    }

    fn on_window_update_read(
        &mut self,
        _ctx: &mut Context,
        stream_id: u32,
        increment: u32,
    ) -> Result<()> {
        self.log.push(Event::WindowUpdate {
            stream_id,
            increment,
        });
        Ok(())
    }

    fn on_unknown_frame(
        &mut self,
        _ctx: &mut Context,
        frame_type: u8,
        stream_id: u32,
        _flags: u8,
        _payload: &Bytes,
    ) -> Result<()> {
        self.log.push(Event::Unknown {
            frame_type,
            stream_id,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted flow controller

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowCall {
    Receive {
        stream_id: u32,
        len: usize,
        padding: usize,
        end_of_stream: bool,
    },
    Consume {
        stream_id: u32,
        n: u32,
    },
}

#[derive(Clone, Default)]
pub struct FlowCallLog(Rc<RefCell<Vec<FlowCall>>>);

impl FlowCallLog {
    pub fn calls(&self) -> Vec<FlowCall> {
        self.0.borrow().clone()
    }
}

/// Flow controller whose `unconsumed_bytes` answers come from a script, so
/// tests can model an application consuming bytes mid-callback.
pub struct ScriptedFlowController {
    pub log: FlowCallLog,
    unconsumed_script: RefCell<VecDeque<u32>>,
}

impl ScriptedFlowController {
    pub fn new(unconsumed_script: &[u32]) -> (Self, FlowCallLog) {
        let controller = Self {
            log: FlowCallLog::default(),
            unconsumed_script: RefCell::new(unconsumed_script.iter().copied().collect()),
        };
        let log = controller.log.clone();
        (controller, log)
    }
}

impl LocalFlowController for ScriptedFlowController {
    fn initial_window_size(&self) -> u32 {
        DEFAULT_INITIAL_WINDOW_SIZE
    }

    fn set_initial_window_size(&mut self, _conn: &mut Connection, _new: u32) -> Result<()> {
        Ok(())
    }

    fn receive_flow_controlled_frame(
        &mut self,
        _ctx: &mut Context,
        _conn: &mut Connection,
        stream_id: u32,
        data: &Bytes,
        padding: usize,
        end_of_stream: bool,
    ) -> Result<()> {
        self.log.0.borrow_mut().push(FlowCall::Receive {
            stream_id,
            len: data.len(),
            padding,
            end_of_stream,
        });
        Ok(())
    }

    fn unconsumed_bytes(&self, _conn: &Connection, _stream_id: u32) -> u32 {
        let mut script = self.unconsumed_script.borrow_mut();
        script.pop_front().unwrap_or(0)
    }

    fn consume_bytes(
        &mut self,
        _ctx: &mut Context,
        _conn: &mut Connection,
        stream_id: u32,
        n: u32,
    ) -> Result<()> {
        self.log.0.borrow_mut().push(FlowCall::Consume { stream_id, n });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decoder assembly

pub fn build_decoder(server: bool, listener: RecordingListener) -> ConnectionDecoder {
    ConnectionDecoder::builder()
        .connection(Connection::new(server))
        .encoder(DefaultConnectionEncoder::new())
        .frame_reader(DefaultFrameReader::new(Box::new(StubHeaderDecoder)))
        .lifecycle_manager(DefaultLifecycleManager)
        .listener(listener)
        .build()
        .unwrap()
}

pub fn build_decoder_with_flow(
    server: bool,
    listener: RecordingListener,
    flow: ScriptedFlowController,
) -> ConnectionDecoder {
    ConnectionDecoder::builder()
        .connection(Connection::new(server))
        .encoder(DefaultConnectionEncoder::new())
        .frame_reader(DefaultFrameReader::new(Box::new(StubHeaderDecoder)))
        .lifecycle_manager(DefaultLifecycleManager)
        .listener(listener)
        .flow_controller(flow)
        .build()
        .unwrap()
}

/// Feed one or more wire frames through the decoder.
pub fn decode(
    decoder: &mut ConnectionDecoder,
    ctx: &mut Context,
    frames: &[BytesMut],
) -> Result<()> {
    let mut input = BytesMut::new();
    for frame in frames {
        input.extend_from_slice(frame);
    }
    decoder.decode_frame(ctx, &mut input)
}

/// Drive the SETTINGS handshake so the decoder leaves the preface gate, and
/// discard the resulting ack bytes.
pub fn handshake(decoder: &mut ConnectionDecoder, ctx: &mut Context) {
    decode(decoder, ctx, &[settings_frame(&[])]).unwrap();
    let _ = ctx.take_output();
}

/// Seed the pending-settings FIFO the way the outbound half would when
/// writing SETTINGS of its own.
pub fn encoder_with_pending(pending: Vec<Settings>) -> DefaultConnectionEncoder {
    let mut encoder = DefaultConnectionEncoder::new();
    let mut scratch = Context::new();
    for settings in pending {
        encoder.write_settings(&mut scratch, settings).unwrap();
    }
    encoder
}
