//! Frame reading: turns wire bytes into typed [`Frame`] events.
//!
//! The reader owns the inbound framing concerns the dispatch core should
//! never see: header parsing, length and padding validation, priority
//! fields, CONTINUATION reassembly (RFC 9113 Section 6.10), and handing the
//! completed header block to the configured [`HeaderDecoder`]. It is
//! sans-IO: feed it a buffer, get back at most one event per call, with
//! partial frames left in place until more bytes arrive.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{connection_error, Result};
use crate::frame::{
    flags, ErrorCode, Frame, FrameHeader, FrameType, PrioritySpec, DEFAULT_MAX_FRAME_SIZE,
    FRAME_HEADER_SIZE, MAX_FRAME_SIZE_UPPER_BOUND,
};
use crate::headers::{HeaderDecoder, Headers};
use crate::settings::Settings;

/// Default SETTINGS_HEADER_TABLE_SIZE (RFC 9113 Section 6.5.2).
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4_096;

/// Produces typed frame events from inbound bytes.
///
/// The configuration accessors cover the two inbound policies SETTINGS can
/// retune: the header table and the frame-size limit.
pub trait FrameReader {
    /// Read at most one complete frame from `input`, consuming its bytes.
    /// Returns `None` when the buffer holds no complete frame (or the frame
    /// is swallowed into an in-progress header block).
    fn read_frame(&mut self, input: &mut BytesMut) -> Result<Option<Frame>>;

    fn max_header_table_size(&self) -> u32;
    fn set_max_header_table_size(&mut self, max: u32) -> Result<()>;

    fn max_header_list_size(&self) -> u32;
    fn set_max_header_list_size(&mut self, max: u32) -> Result<()>;

    fn max_frame_size(&self) -> u32;
    fn set_max_frame_size(&mut self, max: u32) -> Result<()>;

    /// Release any partially accumulated state.
    fn close(&mut self);
}

/// Header-block accumulation across CONTINUATION frames.
enum PendingHeaders {
    Headers {
        stream_id: u32,
        priority: Option<PrioritySpec>,
        padding: usize,
        end_of_stream: bool,
        fragments: BytesMut,
    },
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
        padding: usize,
        fragments: BytesMut,
    },
}

impl PendingHeaders {
    fn stream_id(&self) -> u32 {
        match self {
            PendingHeaders::Headers { stream_id, .. }
            | PendingHeaders::PushPromise { stream_id, .. } => *stream_id,
        }
    }
}

/// Default frame reader with a pluggable header-block decoder.
pub struct DefaultFrameReader {
    header_decoder: Box<dyn HeaderDecoder>,
    max_header_table_size: u32,
    max_header_list_size: u32,
    max_frame_size: u32,
    pending: Option<PendingHeaders>,
}

impl DefaultFrameReader {
    pub fn new(header_decoder: Box<dyn HeaderDecoder>) -> Self {
        Self {
            header_decoder,
            max_header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            max_header_list_size: u32::MAX,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            pending: None,
        }
    }

    fn decode_headers(&mut self, block: &[u8]) -> Result<Headers> {
        let headers = self.header_decoder.decode(block)?;
        if headers.header_list_size() as u64 > u64::from(self.max_header_list_size) {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                format!(
                    "header list size {} exceeds maximum of {}",
                    headers.header_list_size(),
                    self.max_header_list_size
                ),
            ));
        }
        Ok(headers)
    }

    fn finish_pending(&mut self, pending: PendingHeaders) -> Result<Frame> {
        match pending {
            PendingHeaders::Headers {
                stream_id,
                priority,
                padding,
                end_of_stream,
                fragments,
            } => Ok(Frame::Headers {
                stream_id,
                headers: self.decode_headers(&fragments)?,
                priority,
                padding,
                end_of_stream,
            }),
            PendingHeaders::PushPromise {
                stream_id,
                promised_stream_id,
                padding,
                fragments,
            } => Ok(Frame::PushPromise {
                stream_id,
                promised_stream_id,
                headers: self.decode_headers(&fragments)?,
                padding,
            }),
        }
    }

    fn read_data(&mut self, header: &FrameHeader, payload: Bytes) -> Result<Frame> {
        require_stream_frame(header, "DATA")?;
        let end_of_stream = header.flags & flags::END_STREAM != 0;
        let (data, padding) = strip_padding(header, payload)?;
        Ok(Frame::Data {
            stream_id: header.stream_id,
            data,
            padding,
            end_of_stream,
        })
    }

    fn read_headers(&mut self, header: &FrameHeader, payload: Bytes) -> Result<Option<Frame>> {
        require_stream_frame(header, "HEADERS")?;
        let end_of_stream = header.flags & flags::END_STREAM != 0;
        let (mut fragment, padding) = strip_padding(header, payload)?;

        let priority = if header.flags & flags::PRIORITY != 0 {
            Some(read_priority_fields(header.stream_id, &mut fragment)?)
        } else {
            None
        };

        if header.flags & flags::END_HEADERS != 0 {
            return Ok(Some(Frame::Headers {
                stream_id: header.stream_id,
                headers: self.decode_headers(&fragment)?,
                priority,
                padding,
                end_of_stream,
            }));
        }

        self.pending = Some(PendingHeaders::Headers {
            stream_id: header.stream_id,
            priority,
            padding,
            end_of_stream,
            fragments: BytesMut::from(&fragment[..]),
        });
        Ok(None)
    }

    fn read_priority(&mut self, header: &FrameHeader, mut payload: Bytes) -> Result<Frame> {
        require_stream_frame(header, "PRIORITY")?;
        if header.length != 5 {
            return Err(connection_error(
                ErrorCode::FrameSizeError,
                format!("invalid PRIORITY frame length: {}", header.length),
            ));
        }
        let spec = read_priority_fields(header.stream_id, &mut payload)?;
        Ok(Frame::Priority {
            stream_id: header.stream_id,
            dependency: spec.dependency,
            weight: spec.weight,
            exclusive: spec.exclusive,
        })
    }

    fn read_rst_stream(&mut self, header: &FrameHeader, mut payload: Bytes) -> Result<Frame> {
        require_stream_frame(header, "RST_STREAM")?;
        if header.length != 4 {
            return Err(connection_error(
                ErrorCode::FrameSizeError,
                format!("invalid RST_STREAM frame length: {}", header.length),
            ));
        }
        Ok(Frame::RstStream {
            stream_id: header.stream_id,
            error_code: ErrorCode::from(payload.get_u32()),
        })
    }

    fn read_settings(&mut self, header: &FrameHeader, mut payload: Bytes) -> Result<Frame> {
        require_connection_frame(header, "SETTINGS")?;
        if header.flags & flags::ACK != 0 {
            if header.length != 0 {
                return Err(connection_error(
                    ErrorCode::FrameSizeError,
                    "SETTINGS ack frame must have an empty payload",
                ));
            }
            return Ok(Frame::SettingsAck);
        }
        if header.length % 6 != 0 {
            return Err(connection_error(
                ErrorCode::FrameSizeError,
                format!("invalid SETTINGS frame length: {}", header.length),
            ));
        }
        let mut settings = Settings::new();
        while payload.remaining() >= 6 {
            let id = payload.get_u16();
            let value = payload.get_u32();
            settings.put(id, value)?;
        }
        Ok(Frame::Settings { settings })
    }

    fn read_push_promise(&mut self, header: &FrameHeader, payload: Bytes) -> Result<Option<Frame>> {
        require_stream_frame(header, "PUSH_PROMISE")?;
        let (mut fragment, padding) = strip_padding(header, payload)?;
        if fragment.remaining() < 4 {
            return Err(connection_error(
                ErrorCode::FrameSizeError,
                "PUSH_PROMISE frame missing promised stream id",
            ));
        }
        let raw = fragment.get_u32();
        if raw & 0x8000_0000 != 0 {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                "reserved bit set in promised stream id",
            ));
        }
        let promised_stream_id = raw;
        if promised_stream_id == 0 {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                "promised stream id must not be 0",
            ));
        }

        if header.flags & flags::END_HEADERS != 0 {
            return Ok(Some(Frame::PushPromise {
                stream_id: header.stream_id,
                promised_stream_id,
                headers: self.decode_headers(&fragment)?,
                padding,
            }));
        }

        self.pending = Some(PendingHeaders::PushPromise {
            stream_id: header.stream_id,
            promised_stream_id,
            padding,
            fragments: BytesMut::from(&fragment[..]),
        });
        Ok(None)
    }

    fn read_ping(&mut self, header: &FrameHeader, payload: Bytes) -> Result<Frame> {
        require_connection_frame(header, "PING")?;
        if header.length != 8 {
            return Err(connection_error(
                ErrorCode::FrameSizeError,
                format!("invalid PING frame length: {}", header.length),
            ));
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(&payload);
        if header.flags & flags::ACK != 0 {
            Ok(Frame::PingAck { data })
        } else {
            Ok(Frame::Ping { data })
        }
    }

    fn read_go_away(&mut self, header: &FrameHeader, mut payload: Bytes) -> Result<Frame> {
        require_connection_frame(header, "GOAWAY")?;
        if header.length < 8 {
            return Err(connection_error(
                ErrorCode::FrameSizeError,
                format!("invalid GOAWAY frame length: {}", header.length),
            ));
        }
        let last_stream_id = payload.get_u32() & 0x7fff_ffff;
        let error_code = ErrorCode::from(payload.get_u32());
        Ok(Frame::GoAway {
            last_stream_id,
            error_code,
            debug_data: payload,
        })
    }

    fn read_window_update(&mut self, header: &FrameHeader, mut payload: Bytes) -> Result<Frame> {
        if header.length != 4 {
            return Err(connection_error(
                ErrorCode::FrameSizeError,
                format!("invalid WINDOW_UPDATE frame length: {}", header.length),
            ));
        }
        // Zero increments are passed through; their legality is flow-control
        // policy, not framing.
        Ok(Frame::WindowUpdate {
            stream_id: header.stream_id,
            increment: payload.get_u32() & 0x7fff_ffff,
        })
    }

    fn read_continuation(&mut self, header: &FrameHeader, payload: Bytes) -> Result<Option<Frame>> {
        require_stream_frame(header, "CONTINUATION")?;
        let Some(mut pending) = self.pending.take() else {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                "CONTINUATION frame without preceding HEADERS",
            ));
        };
        if pending.stream_id() != header.stream_id {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                format!(
                    "CONTINUATION for stream {} while stream {} headers are in progress",
                    header.stream_id,
                    pending.stream_id()
                ),
            ));
        }
        match &mut pending {
            PendingHeaders::Headers { fragments, .. }
            | PendingHeaders::PushPromise { fragments, .. } => {
                fragments.extend_from_slice(&payload);
            }
        }
        if header.flags & flags::END_HEADERS != 0 {
            return self.finish_pending(pending).map(Some);
        }
        self.pending = Some(pending);
        Ok(None)
    }
}

impl FrameReader for DefaultFrameReader {
    fn read_frame(&mut self, input: &mut BytesMut) -> Result<Option<Frame>> {
        // Frames swallowed into an in-progress header block produce no
        // event; keep consuming until one surfaces or the bytes run out.
        loop {
            if input.len() < FRAME_HEADER_SIZE {
                return Ok(None);
            }
            let header = FrameHeader::parse(&input[..FRAME_HEADER_SIZE]).ok_or_else(|| {
                connection_error(ErrorCode::ProtocolError, "invalid frame header")
            })?;
            if header.length > self.max_frame_size {
                return Err(connection_error(
                    ErrorCode::FrameSizeError,
                    format!(
                        "frame length {} exceeds maximum of {}",
                        header.length, self.max_frame_size
                    ),
                ));
            }
            let frame_len = FRAME_HEADER_SIZE + header.length as usize;
            if input.len() < frame_len {
                return Ok(None);
            }
            input.advance(FRAME_HEADER_SIZE);
            let payload = input.split_to(header.length as usize).freeze();

            // A header block in progress admits nothing but its
            // CONTINUATIONs (RFC 9113 Section 6.10).
            if self.pending.is_some() && header.frame_type != FrameType::Continuation {
                return Err(connection_error(
                    ErrorCode::ProtocolError,
                    format!(
                        "received {:?} frame while a header block is in progress",
                        header.frame_type
                    ),
                ));
            }

            let frame = match header.frame_type {
                FrameType::Data => Some(self.read_data(&header, payload)?),
                FrameType::Headers => self.read_headers(&header, payload)?,
                FrameType::Priority => Some(self.read_priority(&header, payload)?),
                FrameType::RstStream => Some(self.read_rst_stream(&header, payload)?),
                FrameType::Settings => Some(self.read_settings(&header, payload)?),
                FrameType::PushPromise => self.read_push_promise(&header, payload)?,
                FrameType::Ping => Some(self.read_ping(&header, payload)?),
                FrameType::GoAway => Some(self.read_go_away(&header, payload)?),
                FrameType::WindowUpdate => Some(self.read_window_update(&header, payload)?),
                FrameType::Continuation => self.read_continuation(&header, payload)?,
                FrameType::Unknown(frame_type) => Some(Frame::Unknown {
                    frame_type,
                    stream_id: header.stream_id,
                    flags: header.flags,
                    payload,
                }),
            };
            if let Some(frame) = frame {
                return Ok(Some(frame));
            }
        }
    }

    fn max_header_table_size(&self) -> u32 {
        self.max_header_table_size
    }

    fn set_max_header_table_size(&mut self, max: u32) -> Result<()> {
        self.max_header_table_size = max;
        self.header_decoder.set_max_table_size(max)
    }

    fn max_header_list_size(&self) -> u32 {
        self.max_header_list_size
    }

    fn set_max_header_list_size(&mut self, max: u32) -> Result<()> {
        self.max_header_list_size = max;
        Ok(())
    }

    fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    fn set_max_frame_size(&mut self, max: u32) -> Result<()> {
        if !(DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_UPPER_BOUND).contains(&max) {
            return Err(connection_error(
                ErrorCode::ProtocolError,
                format!("invalid MAX_FRAME_SIZE value: {}", max),
            ));
        }
        self.max_frame_size = max;
        Ok(())
    }

    fn close(&mut self) {
        self.pending = None;
    }
}

fn require_stream_frame(header: &FrameHeader, name: &str) -> Result<()> {
    if header.stream_id == 0 {
        return Err(connection_error(
            ErrorCode::ProtocolError,
            format!("{} frame must be associated with a stream", name),
        ));
    }
    Ok(())
}

fn require_connection_frame(header: &FrameHeader, name: &str) -> Result<()> {
    if header.stream_id != 0 {
        return Err(connection_error(
            ErrorCode::ProtocolError,
            format!("{} frame must be on the connection stream", name),
        ));
    }
    Ok(())
}

/// Strip PADDED framing, returning the remaining payload and the padding
/// total. The pad-length octet itself counts as padding so the caller's
/// `data + padding` matches the wire payload length.
fn strip_padding(header: &FrameHeader, mut payload: Bytes) -> Result<(Bytes, usize)> {
    if header.flags & flags::PADDED == 0 {
        return Ok((payload, 0));
    }
    if payload.remaining() < 1 {
        return Err(connection_error(
            ErrorCode::FrameSizeError,
            "padded frame missing pad length",
        ));
    }
    let pad_len = payload.get_u8() as usize;
    if pad_len > payload.remaining() {
        return Err(connection_error(
            ErrorCode::ProtocolError,
            "padding exceeds payload size",
        ));
    }
    let data = payload.split_to(payload.remaining() - pad_len);
    Ok((data, pad_len + 1))
}

/// Read the 5 priority octets of a HEADERS or PRIORITY frame.
fn read_priority_fields(stream_id: u32, payload: &mut Bytes) -> Result<PrioritySpec> {
    if payload.remaining() < 5 {
        return Err(connection_error(
            ErrorCode::FrameSizeError,
            "frame too short for priority fields",
        ));
    }
    let raw = payload.get_u32();
    let exclusive = raw & 0x8000_0000 != 0;
    let dependency = raw & 0x7fff_ffff;
    // The wire octet is weight minus one (RFC 9113 Section 6.3).
    let weight = u16::from(payload.get_u8()) + 1;
    if dependency == stream_id {
        return Err(connection_error(
            ErrorCode::ProtocolError,
            format!("stream {} cannot depend on itself", stream_id),
        ));
    }
    Ok(PrioritySpec {
        dependency,
        weight,
        exclusive,
    })
}
