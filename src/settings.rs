//! SETTINGS parameter set (RFC 9113 Section 6.5).
//!
//! Every field is optional: a SETTINGS frame only carries the parameters the
//! sender wants to change, and unknown identifiers are ignored.

use crate::error::{connection_error, Result};
use crate::frame::{ErrorCode, DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_UPPER_BOUND, MAX_WINDOW_SIZE};

/// SETTINGS parameter identifiers per RFC 9113 Section 6.5.2.
pub mod ids {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// One endpoint's SETTINGS parameters. Absent fields were not transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: Option<u32>,
    pub enable_push: Option<bool>,
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: Option<u32>,
    pub max_frame_size: Option<u32>,
    pub max_header_list_size: Option<u32>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Ingest one wire identifier/value pair, validating value ranges.
    /// Unknown identifiers (including GREASE) are ignored per RFC 9113
    /// Section 6.5.2.
    pub fn put(&mut self, id: u16, value: u32) -> Result<()> {
        match id {
            ids::HEADER_TABLE_SIZE => self.header_table_size = Some(value),
            ids::ENABLE_PUSH => match value {
                0 => self.enable_push = Some(false),
                1 => self.enable_push = Some(true),
                other => {
                    return Err(connection_error(
                        ErrorCode::ProtocolError,
                        format!("invalid ENABLE_PUSH value: {}", other),
                    ))
                }
            },
            ids::MAX_CONCURRENT_STREAMS => self.max_concurrent_streams = Some(value),
            ids::INITIAL_WINDOW_SIZE => {
                if value > MAX_WINDOW_SIZE {
                    return Err(connection_error(
                        ErrorCode::FlowControlError,
                        format!("invalid INITIAL_WINDOW_SIZE value: {}", value),
                    ));
                }
                self.initial_window_size = Some(value);
            }
            ids::MAX_FRAME_SIZE => {
                if !(DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_UPPER_BOUND).contains(&value) {
                    return Err(connection_error(
                        ErrorCode::ProtocolError,
                        format!("invalid MAX_FRAME_SIZE value: {}", value),
                    ));
                }
                self.max_frame_size = Some(value);
            }
            ids::MAX_HEADER_LIST_SIZE => self.max_header_list_size = Some(value),
            _ => {}
        }
        Ok(())
    }

    /// Wire identifier/value pairs in ascending identifier order.
    pub fn to_wire(&self) -> Vec<(u16, u32)> {
        let mut pairs = Vec::new();
        if let Some(v) = self.header_table_size {
            pairs.push((ids::HEADER_TABLE_SIZE, v));
        }
        if let Some(v) = self.enable_push {
            pairs.push((ids::ENABLE_PUSH, u32::from(v)));
        }
        if let Some(v) = self.max_concurrent_streams {
            pairs.push((ids::MAX_CONCURRENT_STREAMS, v));
        }
        if let Some(v) = self.initial_window_size {
            pairs.push((ids::INITIAL_WINDOW_SIZE, v));
        }
        if let Some(v) = self.max_frame_size {
            pairs.push((ids::MAX_FRAME_SIZE, v));
        }
        if let Some(v) = self.max_header_list_size {
            pairs.push((ids::MAX_HEADER_LIST_SIZE, v));
        }
        pairs
    }
}
