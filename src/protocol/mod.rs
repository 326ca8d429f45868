//! # NDT Control Protocol
//!
//! Types and framing for the NDT control channel. The wire unit is a
//! typed, length-prefixed frame:
//!
//! ```text
//! byte  offset  meaning
//!  0    0       message type (0-11)
//!  1    1..2    body length, big-endian 16-bit unsigned
//!  2    3..     body (exactly length bytes)
//! ```
//!
//! Bodies are either raw bytes or JSON. Most messages wrap their payload
//! as `{"msg": "<text>"}`; the S2C result and the extended login carry
//! richer JSON objects. The single exception to framing is the kickoff:
//! the 13 ASCII bytes `"123456 654321"` written raw right after login.
//!
//! The codec itself lives in [`codec`]; this module holds the message
//! types, the test-mask bits, the queue-state strings, and the parsed
//! [`Login`] record.

use crate::error::{Error, Result};
use serde::Deserialize;

pub mod codec;

pub use codec::Codec;

/// Control-channel message types. The discriminants are the wire
/// contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Communication link failure.
    CommFailure = 0,
    /// Queue management.
    SrvQueue = 1,
    /// Legacy binary login (rejected by this server).
    Login = 2,
    /// Announces test parameters.
    TestPrepare = 3,
    /// Starts a test.
    TestStart = 4,
    /// A message exchanged during a test.
    TestMsg = 5,
    /// Terminates a test.
    TestFinalize = 6,
    /// An error during a test.
    MsgError = 7,
    /// Final test results.
    Results = 8,
    /// Ends the session.
    Logout = 9,
    /// Client liveness signal while queued.
    Waiting = 10,
    /// JSON login.
    ExtendedLogin = 11,
}

impl MessageType {
    /// Decode a wire byte. `None` for bytes above
    /// [`MessageType::ExtendedLogin`], the `IllegalHeader` path, which
    /// in practice means an HTTP request probed the binary port.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::CommFailure),
            1 => Some(Self::SrvQueue),
            2 => Some(Self::Login),
            3 => Some(Self::TestPrepare),
            4 => Some(Self::TestStart),
            5 => Some(Self::TestMsg),
            6 => Some(Self::TestFinalize),
            7 => Some(Self::MsgError),
            8 => Some(Self::Results),
            9 => Some(Self::Logout),
            10 => Some(Self::Waiting),
            11 => Some(Self::ExtendedLogin),
            _ => None,
        }
    }

    /// The wire byte for this message type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CommFailure => "COMM_FAILURE",
            Self::SrvQueue => "SRV_QUEUE",
            Self::Login => "MSG_LOGIN",
            Self::TestPrepare => "TEST_PREPARE",
            Self::TestStart => "TEST_START",
            Self::TestMsg => "TEST_MSG",
            Self::TestFinalize => "TEST_FINALIZE",
            Self::MsgError => "MSG_ERROR",
            Self::Results => "MSG_RESULTS",
            Self::Logout => "MSG_LOGOUT",
            Self::Waiting => "MSG_WAITING",
            Self::ExtendedLogin => "MSG_EXTENDED_LOGIN",
        };
        f.write_str(name)
    }
}

// Test identifiers, advertised by the client as a 16-bit mask.

/// Middle-box test.
pub const TEST_MID: u16 = 1;
/// Single-stream upload test.
pub const TEST_C2S: u16 = 2;
/// Single-stream download test.
pub const TEST_S2C: u16 = 4;
/// Simple firewall test.
pub const TEST_SFW: u16 = 8;
/// Client supports queue status messages; required by this server.
pub const TEST_STATUS: u16 = 16;
/// Client will send metadata.
pub const TEST_META: u16 = 32;
/// Multi-stream upload test.
pub const TEST_C2S_EXT: u16 = 64;
/// Multi-stream download test.
pub const TEST_S2C_EXT: u16 = 128;

// Queue states sent in SRV_QUEUE bodies.

/// The test can start now.
pub const SRV_QUEUE_TEST_STARTS_NOW: &str = "0";
/// Asks the client to confirm it is still alive.
pub const SRV_QUEUE_HEARTBEAT: &str = "9990";
/// The session must be terminated.
pub const SRV_QUEUE_SERVER_FAULT: &str = "9977";
/// The server is busy.
pub const SRV_QUEUE_SERVER_BUSY: &str = "9987";
/// The server is busy and expects to stay busy for more than 60 s.
pub const SRV_QUEUE_SERVER_BUSY_60S: &str = "9999";

/// The unframed hello written right after a successful login.
pub const KICKOFF: &str = "123456 654321";

/// One control-channel frame. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded message type.
    pub msg_type: MessageType,
    /// Raw body bytes; at most 65535 of them.
    pub body: Vec<u8>,
}

impl Frame {
    /// The body interpreted as UTF-8, lossily.
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tests: String,
}

/// The parsed login record. Created once per session after the first
/// valid frame and immutable thereafter.
#[derive(Debug, Clone)]
pub struct Login {
    /// Client version string.
    pub version: String,
    /// Advertised test mask.
    pub tests: u16,
    /// True when the login arrived as MSG_EXTENDED_LOGIN. The legacy
    /// binary variant is rejected, so on a live session this is always
    /// true; the field records which wire form was seen.
    pub is_extended: bool,
}

impl Login {
    /// Parse the body of an EXTENDED_LOGIN frame.
    pub fn from_extended_body(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| Error::InvalidJson(e.to_string()))?;
        if value.is_null() {
            return Err(Error::InvalidJson("received literal 'null'".into()));
        }
        let parsed: LoginBody = serde_json::from_value(value)
            .map_err(|e| Error::InvalidJson(e.to_string()))?;
        let tests: u16 = parsed
            .tests
            .parse()
            .map_err(|_| Error::InvalidJson(format!("bad tests field '{}'", parsed.tests)))?;
        if tests & TEST_STATUS == 0 {
            return Err(Error::NoTestStatus);
        }
        Ok(Self {
            version: parsed.msg,
            tests,
            is_extended: true,
        })
    }

    /// True when `test` (one of the `TEST_*` bits) was advertised.
    pub fn wants(&self, test: u16) -> bool {
        self.tests & test != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trips_all_wire_values() {
        for byte in 0u8..=11 {
            let t = MessageType::from_byte(byte).unwrap();
            assert_eq!(t.as_byte(), byte);
        }
        assert!(MessageType::from_byte(12).is_none());
        assert!(MessageType::from_byte(b'G').is_none());
    }

    #[test]
    fn login_parses_version_and_mask() {
        let login =
            Login::from_extended_body(br#"{"msg": "4.0.0.1", "tests": "63"}"#).unwrap();
        assert_eq!(login.version, "4.0.0.1");
        assert_eq!(login.tests, 63);
        assert!(login.is_extended);
        assert!(login.wants(TEST_STATUS));
        assert!(login.wants(TEST_MID));
        assert!(!login.wants(TEST_META));
    }

    #[test]
    fn login_requires_status_bit() {
        let err = Login::from_extended_body(br#"{"msg": "x", "tests": "4"}"#).unwrap_err();
        assert!(matches!(err, Error::NoTestStatus));
    }

    #[test]
    fn login_rejects_null_and_garbage() {
        assert!(matches!(
            Login::from_extended_body(b"null").unwrap_err(),
            Error::InvalidJson(_)
        ));
        assert!(matches!(
            Login::from_extended_body(b"{not json").unwrap_err(),
            Error::InvalidJson(_)
        ));
        assert!(matches!(
            Login::from_extended_body(br#"{"msg": "x", "tests": "abc"}"#).unwrap_err(),
            Error::InvalidJson(_)
        ));
    }
}
