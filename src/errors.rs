use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Io(#[from] io::Error),
    #[error("operation timed out")]
    Timeout,
    #[error("could not send full payload ({sent} of {expected} bytes)")]
    ShortWrite { sent: usize, expected: usize },
    #[error("connection closed by remote")]
    ConnectionClosed,
    #[error("could not resolve {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("server needs an address")]
    MissingAddress,

    #[error("cannot handle split packets")]
    UnsupportedSplitPacket,
    #[error("invalid rcon frame size {0}")]
    InvalidFrameSize(i32),

    #[error("truncated data: needed {needed} bytes, {remaining} left")]
    TruncatedData { needed: usize, remaining: usize },
    #[error("bad response header {found:#04x}, expected {expected:#04x}")]
    BadHeader { expected: u8, found: u8 },
    #[error("bad {field} value {value:#04x}")]
    BadEnumValue { field: &'static str, value: u8 },
    #[error("could not parse stats output: {0}")]
    BadStats(String),

    #[error("invalid response id from server: expected {expected}, got {found}")]
    InvalidResponseId { expected: i32, found: i32 },
    #[error("invalid response type from server: expected {expected}, got {found}")]
    InvalidResponseType { expected: i32, found: i32 },
    #[error("invalid response trailer from server")]
    InvalidResponseTrailer,
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("rcon is not initialized")]
    RconNotInitialized,
    #[error("server is not initialized")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, Error>;
