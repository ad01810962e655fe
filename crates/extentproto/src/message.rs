//! Message header for the extent protocol.
//!
//! ## Wire Format
//!
//! Every unit on the socket is one or two newline-terminated lines:
//!
//! ```text
//! Line 0: header   {"code":3,"length":27,"status":0}
//! Line 1: payload  ["aGVsbG8g","d29ybGQ="]      (only when length > 0)
//! ```
//!
//! `length` is the byte count of the payload line without its newline. The
//! receiver uses it to decide whether a payload line follows and as a sizing
//! hint; the payload itself is recovered by reading the next line.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Message codes (the `code` header field).
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgCode {
    /// Response to any request. Never sent as a request.
    Reply = 1,
    /// Fetch contents for an ordered list of hashes.
    GetExtents = 2,
    /// Store an ordered list of content chunks.
    PutExtents = 3,
    /// Ask whether a single hash is present.
    PollExtent = 4,
}

impl MsgCode {
    /// Parse a raw header code. Unknown codes, including negative or
    /// out-of-range integers, are `None` rather than an error: the server
    /// logs them and keeps the connection open.
    pub fn from_code(value: i64) -> Option<Self> {
        match value {
            1 => Some(MsgCode::Reply),
            2 => Some(MsgCode::GetExtents),
            3 => Some(MsgCode::PutExtents),
            4 => Some(MsgCode::PollExtent),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MsgCode::Reply => "reply",
            MsgCode::GetExtents => "get_extents",
            MsgCode::PutExtents => "put_extents",
            MsgCode::PollExtent => "poll_extent",
        }
    }
}

impl fmt::Display for MsgCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message status (the `status` header field).
///
/// `affirmative` is the same value as `ok`; see [`MsgStatus::AFFIRMATIVE`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MsgStatus {
    /// Placeholder carried by requests.
    None = 0,
    Ok = 1,
    Negative = 2,
    Error = 3,
}

impl MsgStatus {
    /// A "yes" answer to a query.
    pub const AFFIRMATIVE: MsgStatus = MsgStatus::Ok;

    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(MsgStatus::None),
            1 => Ok(MsgStatus::Ok),
            2 => Ok(MsgStatus::Negative),
            3 => Ok(MsgStatus::Error),
            other => Err(WireError::InvalidStatus(other)),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn is_ok(&self) -> bool {
        *self == MsgStatus::Ok
    }
}

impl From<MsgStatus> for u8 {
    fn from(status: MsgStatus) -> Self {
        status.to_u8()
    }
}

impl TryFrom<u8> for MsgStatus {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        MsgStatus::from_u8(value)
    }
}

impl fmt::Display for MsgStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgStatus::None => "none",
            MsgStatus::Ok => "ok",
            MsgStatus::Negative => "negative",
            MsgStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// The header line of every protocol unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Raw code, kept unparsed so unknown codes survive header decoding.
    pub code: i64,
    /// Byte count of the payload line that follows (0 if none).
    pub length: u64,
    pub status: MsgStatus,
}

impl Message {
    pub fn new(code: MsgCode, length: u64, status: MsgStatus) -> Self {
        Self {
            code: code.code(),
            length,
            status,
        }
    }

    /// The parsed code, if it is one we know.
    pub fn kind(&self) -> Option<MsgCode> {
        MsgCode::from_code(self.code)
    }

    pub fn has_payload(&self) -> bool {
        self.length > 0
    }

    /// Serialize to a single JSON line (without the trailing newline).
    pub fn to_line(&self) -> String {
        // Three integer fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a header line.
    pub fn from_line(line: &str) -> Result<Self, WireError> {
        serde_json::from_str(line).map_err(WireError::MalformedHeader)
    }
}

/// Errors on the wire: transport failures and protocol violations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("malformed header: {0}")]
    MalformedHeader(#[source] serde_json::Error),
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
    #[error("invalid status: {0}")]
    InvalidStatus(u8),
    #[error("header announced {0} payload bytes but the peer closed the connection")]
    MissingPayload(u64),
    #[error("payload contains a line break and cannot be framed")]
    UnframeablePayload,
    #[error("connection closed by peer")]
    Closed,
    #[error("an earlier exchange was abandoned before its reply arrived; the stream is out of sync")]
    Abandoned,
}
