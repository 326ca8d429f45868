//! # Error Types
//!
//! This module defines the error taxonomy shared by the protocol codec,
//! the control session driver, and the test engine. All protocol and I/O
//! failures funnel into the single [`Error`] enum so that the session
//! driver can log one value with session context and unwind; `anyhow` is
//! used only at the binary boundary in `main`.
//!
//! Only [`Error::Busy`] ever produces a client-visible frame
//! (`SRV_QUEUE("9987")`); every other variant simply closes the control
//! connection, matching the client's reconnect-or-fail expectation.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the NDT control protocol and test engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The first byte of a frame header is not a known message type.
    ///
    /// A first byte above `MSG_EXTENDED_LOGIN` (11) almost always means an
    /// HTTP request (e.g. a WebSocket upgrade) hit the binary control
    /// port. The session logs and terminates; no frame is sent back.
    #[error("illegal message header: first byte {0:#04x} is not a message type")]
    IllegalHeader(u8),

    /// The first frame of the session is not an EXTENDED_LOGIN.
    ///
    /// Covers the legacy binary-body MSG_LOGIN (type 2), which this
    /// server deliberately does not implement.
    #[error("unsupported login message type {0}")]
    UnsupportedLogin(u8),

    /// A JSON body failed to parse, parsed to the `null` literal, or is
    /// missing a required field.
    #[error("invalid JSON message body: {0}")]
    InvalidJson(String),

    /// The client's test mask does not advertise TEST_STATUS.
    #[error("client does not advertise TEST_STATUS")]
    NoTestStatus,

    /// An outgoing body exceeds the 16-bit length field.
    #[error("message body too long: {0} bytes exceed the 65535-byte frame limit")]
    BodyTooLong(usize),

    /// A read, write, or accept exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The underlying transport reported EOF or a reset.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The admission gate refused the session.
    #[error("server busy: admission cap reached")]
    Busy,

    /// A frame arrived whose type does not match the protocol's next
    /// expected type.
    #[error("unexpected frame type {got} (expected {expected})")]
    UnexpectedFrame { expected: u8, got: u8 },

    /// Any other transport fault.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify an I/O error from a read path, mapping clean EOF and
    /// resets onto [`Error::PeerClosed`].
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                Error::PeerClosed
            }
            _ => Error::Io(err),
        }
    }
}
