//! Frame-level reading and writing over a deadlined conduit.
//!
//! The codec is generic over the underlying endpoint so that sessions
//! run on real TCP streams while unit tests drive it through in-memory
//! pipes.

use crate::error::{Error, Result};
use crate::net::DeadlineStream;
use crate::protocol::{Frame, Login, MessageType};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

#[derive(Serialize)]
struct SimpleMsg<'a> {
    msg: &'a str,
}

/// Reader/writer for typed, length-prefixed NDT frames.
#[derive(Debug)]
pub struct Codec<S> {
    stream: DeadlineStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Codec<S> {
    /// Layer a codec over a deadlined conduit.
    pub fn new(stream: DeadlineStream<S>) -> Self {
        Self { stream }
    }

    /// The underlying conduit, e.g. to adjust its timeout.
    pub fn stream_mut(&mut self) -> &mut DeadlineStream<S> {
        &mut self.stream
    }

    /// Read one frame: 3-byte header, then exactly `length` body bytes.
    ///
    /// A first byte above `MSG_EXTENDED_LOGIN` is an
    /// [`Error::IllegalHeader`]; it almost certainly means an HTTP
    /// request (WebSocket upgrade attempt) reached the binary control
    /// port, and the caller is expected to terminate the session.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let mut header = [0u8; 3];
        self.stream.read_exact(&mut header).await?;

        let msg_type =
            MessageType::from_byte(header[0]).ok_or(Error::IllegalHeader(header[0]))?;
        let length = u16::from_be_bytes([header[1], header[2]]) as usize;
        trace!("Read frame header: type {}, length {}", msg_type, length);

        let mut body = vec![0u8; length];
        self.stream.read_exact(&mut body).await?;
        Ok(Frame { msg_type, body })
    }

    /// Read one frame whose body is a JSON `{"msg": …}` wrapper; returns
    /// the message type and the unwrapped string.
    pub async fn read_json_frame(&mut self) -> Result<(MessageType, String)> {
        let frame = self.read_frame().await?;
        let value: serde_json::Value = serde_json::from_slice(&frame.body)
            .map_err(|e| Error::InvalidJson(e.to_string()))?;
        if value.is_null() {
            return Err(Error::InvalidJson("received literal 'null'".into()));
        }
        let msg = value
            .get("msg")
            .and_then(|m| m.as_str())
            .ok_or_else(|| Error::InvalidJson("missing string field 'msg'".into()))?;
        Ok((frame.msg_type, msg.to_owned()))
    }

    /// Write one frame: type byte, big-endian length, body, flush.
    pub async fn write_frame(&mut self, msg_type: MessageType, body: &[u8]) -> Result<()> {
        if body.len() > u16::MAX as usize {
            return Err(Error::BodyTooLong(body.len()));
        }
        trace!("Write frame: type {}, length {}", msg_type, body.len());
        let header = [
            msg_type.as_byte(),
            (body.len() >> 8) as u8,
            (body.len() & 0xff) as u8,
        ];
        self.stream.write_all(&header).await?;
        self.stream.write_all(body).await?;
        self.stream.flush().await
    }

    /// Serialize `{"msg": msg}` and write it as a frame of `msg_type`.
    pub async fn write_json_frame(&mut self, msg_type: MessageType, msg: &str) -> Result<()> {
        let body = serde_json::to_vec(&SimpleMsg { msg })
            .map_err(|e| Error::InvalidJson(e.to_string()))?;
        self.write_frame(msg_type, &body).await
    }

    /// Write raw, unframed bytes and flush. Only the kickoff hello uses
    /// this path.
    pub async fn write_raw(&mut self, data: &str) -> Result<()> {
        self.stream.write_all(data.as_bytes()).await?;
        self.stream.flush().await
    }

    /// Read the session's login frame.
    ///
    /// The frame must be MSG_EXTENDED_LOGIN. Anything else fails with
    /// [`Error::UnsupportedLogin`] and the session closes; that includes
    /// the legacy binary MSG_LOGIN, which this server does not implement.
    pub async fn read_login(&mut self) -> Result<Login> {
        let frame = self.read_frame().await?;
        if frame.msg_type != MessageType::ExtendedLogin {
            return Err(Error::UnsupportedLogin(frame.msg_type.as_byte()));
        }
        let login = Login::from_extended_body(&frame.body)?;
        debug!("Read login: version {}, test suite {}", login.version, login.tests);
        Ok(login)
    }
}
