//! # Shade
//!
//! Sans-IO HTTP/2 inbound connection decoder.
//!
//! Shade consumes the raw byte stream of an established HTTP/2 connection,
//! parses and validates frames against the RFC 9113 connection and stream
//! state machines, applies inbound flow control, and dispatches typed
//! events to an application [`FrameListener`]. It performs no I/O of its
//! own: bytes come in through [`ConnectionDecoder::decode_frame`], and the
//! frames it emits in response (SETTINGS and PING acks, WINDOW_UPDATEs)
//! accumulate in a [`Context`] for the transport to drain.
//!
//! HPACK is pluggable rather than built in: the frame reader hands
//! reassembled header blocks to the [`HeaderDecoder`] it was constructed
//! with.
//!
//! ## Usage
//!
//! ```no_run
//! use bytes::BytesMut;
//! use shade::{
//!     ConnectionDecoder, Connection, Context, DefaultConnectionEncoder,
//!     DefaultFrameReader, DefaultLifecycleManager, FrameListener, HeaderDecoder,
//! };
//!
//! struct MyListener;
//! impl FrameListener for MyListener {}
//!
//! # fn hpack_decoder() -> Box<dyn HeaderDecoder> { unimplemented!() }
//! # fn example() -> shade::Result<()> {
//! let mut decoder = ConnectionDecoder::builder()
//!     .connection(Connection::new(true))
//!     .encoder(DefaultConnectionEncoder::new())
//!     .frame_reader(DefaultFrameReader::new(hpack_decoder()))
//!     .lifecycle_manager(DefaultLifecycleManager)
//!     .listener(MyListener)
//!     .build()?;
//!
//! let mut ctx = Context::new();
//! let mut input = BytesMut::new(); // bytes from the transport
//! decoder.decode_frame(&mut ctx, &mut input)?;
//! let outbound = ctx.take_output(); // hand back to the transport
//! # Ok(())
//! # }
//! ```

// Core state
pub mod connection;
pub mod error;
pub mod stream;

// Frame plumbing
pub mod frame;
pub mod headers;
pub mod reader;
pub mod settings;
pub mod writer;

// Decode path
pub mod decoder;
pub mod flow;
pub mod listener;

// Collaborator seams
pub mod encoder;
pub mod lifecycle;
pub mod verify;

// Re-exports for convenient access
pub use connection::{Connection, Endpoint};
pub use decoder::{ConnectionDecoder, DecoderBuilder};
pub use encoder::{ConnectionEncoder, DefaultConnectionEncoder};
pub use error::{connection_error, stream_error, Error, Result};
pub use flow::{
    DefaultLocalFlowController, DefaultRemoteFlowController, LocalFlowController,
    RemoteFlowController, DEFAULT_INITIAL_WINDOW_SIZE,
};
pub use frame::{flags, ErrorCode, Frame, FrameHeader, FrameType, PrioritySpec};
pub use headers::{HeaderDecoder, Headers};
pub use lifecycle::{DefaultLifecycleManager, LifecycleManager};
pub use listener::FrameListener;
pub use reader::{DefaultFrameReader, FrameReader};
pub use settings::Settings;
pub use stream::{Priority, Stream, StreamState};
pub use verify::{AlwaysVerify, PromisedRequestVerifier};
pub use writer::{Context, FrameWriter};
