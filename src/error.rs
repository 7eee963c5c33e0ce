//! Error types for the shade crate.
//!
//! HTTP/2 distinguishes errors that terminate the whole connection from
//! errors that terminate a single stream (RFC 9113 Section 5.4). Both carry
//! an [`ErrorCode`] that the caller turns into a GOAWAY or RST_STREAM frame.

use crate::frame::ErrorCode;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding inbound HTTP/2 frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection error. The caller must emit GOAWAY and tear down the
    /// connection (RFC 9113 Section 5.4.1).
    #[error("connection error ({code:?}): {message}")]
    Connection { code: ErrorCode, message: String },

    /// Stream error. Only the identified stream is affected; the caller
    /// must emit RST_STREAM for it (RFC 9113 Section 5.4.2).
    #[error("stream {stream_id} error ({code:?}): {message}")]
    Stream {
        stream_id: u32,
        code: ErrorCode,
        message: String,
    },

    /// Attempted to create a stream that has already been created and
    /// closed. Treated as a connection PROTOCOL_ERROR everywhere except the
    /// PRIORITY handler, which tolerates late priority updates.
    #[error("closed stream creation for stream {stream_id}: {message}")]
    ClosedStreamCreation { stream_id: u32, message: String },

    /// Internal contract violation or listener-originated failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Create a connection error.
pub fn connection_error(code: ErrorCode, message: impl Into<String>) -> Error {
    Error::Connection {
        code,
        message: message.into(),
    }
}

/// Create a stream error for the given stream.
pub fn stream_error(stream_id: u32, code: ErrorCode, message: impl Into<String>) -> Error {
    Error::Stream {
        stream_id,
        code,
        message: message.into(),
    }
}

impl Error {
    /// Whether this error terminates the whole connection rather than a
    /// single stream.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, Error::Stream { .. })
    }

    /// The HTTP/2 error code to report to the peer.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Error::Connection { code, .. } | Error::Stream { code, .. } => *code,
            Error::ClosedStreamCreation { .. } => ErrorCode::ProtocolError,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// The affected stream id, if this is a stream-level error.
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            Error::Stream { stream_id, .. } => Some(*stream_id),
            _ => None,
        }
    }
}
