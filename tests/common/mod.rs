//! Shared harness for the integration tests: an in-process server on an
//! ephemeral port and a minimal scripted NDT client speaking the framed
//! control protocol over a real TCP socket.

#![allow(dead_code)]

use anyhow::{bail, Result};
use ndt_server::nettests::s2c::S2cConfig;
use ndt_server::{AdmissionGate, NdtServer, ServerConfig, SessionConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// An in-process server bound to an ephemeral control port, with blast
/// windows shortened so tests stay fast.
pub struct TestServer {
    pub addr: SocketAddr,
    pub gate: Arc<AdmissionGate>,
    pub shutdown: CancellationToken,
}

impl TestServer {
    pub async fn start(max_active: usize) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_active,
            session: SessionConfig {
                s2c: S2cConfig {
                    port: 0,
                    duration: Duration::from_millis(300),
                    ..S2cConfig::default()
                },
            },
        };
        let server = NdtServer::new(config);
        let gate = Arc::clone(server.gate());
        let shutdown = server.shutdown_token();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener).await });

        Self {
            addr,
            gate,
            shutdown,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A scripted client driving the framed control protocol byte by byte.
pub struct ScriptedClient {
    stream: TcpStream,
}

impl ScriptedClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
        })
    }

    /// Send an EXTENDED_LOGIN frame with the given version and decimal
    /// test mask.
    pub async fn login(&mut self, version: &str, tests: &str) -> Result<()> {
        let body = format!(r#"{{"msg": "{}", "tests": "{}"}}"#, version, tests);
        self.send_frame(11, body.as_bytes()).await
    }

    /// Read the unframed 13-byte kickoff hello.
    pub async fn read_kickoff(&mut self) -> Result<String> {
        let mut buf = [0u8; 13];
        self.stream.read_exact(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Read one frame, returning its type byte and raw body.
    pub async fn read_frame(&mut self) -> Result<(u8, Vec<u8>)> {
        let mut header = [0u8; 3];
        self.stream.read_exact(&mut header).await?;
        let len = u16::from_be_bytes([header[1], header[2]]) as usize;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await?;
        Ok((header[0], body))
    }

    /// Read one frame and unwrap its `{"msg": …}` body.
    pub async fn read_wrapped(&mut self) -> Result<(u8, String)> {
        let (msg_type, body) = self.read_frame().await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        match value.get("msg").and_then(|m| m.as_str()) {
            Some(msg) => Ok((msg_type, msg.to_owned())),
            None => bail!("frame body has no string 'msg' field: {value}"),
        }
    }

    /// Write one raw frame.
    pub async fn send_frame(&mut self, msg_type: u8, body: &[u8]) -> Result<()> {
        let mut wire = Vec::with_capacity(3 + body.len());
        wire.push(msg_type);
        wire.extend_from_slice(&(body.len() as u16).to_be_bytes());
        wire.extend_from_slice(body);
        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Write a frame wrapping `msg` as `{"msg": …}`.
    pub async fn send_wrapped(&mut self, msg_type: u8, msg: &str) -> Result<()> {
        let body = serde_json::json!({ "msg": msg }).to_string();
        self.send_frame(msg_type, body.as_bytes()).await
    }

    /// Write arbitrary bytes, bypassing framing.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// True once the server has closed the connection without sending
    /// further data. A reset counts as closed.
    pub async fn at_eof(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(self.stream.read(&mut buf).await, Ok(0) | Err(_))
    }
}

/// Connect to a data port and read until EOF, returning the byte count.
pub async fn drain_data_stream(addr: SocketAddr) -> i64 {
    let mut conn = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 8192];
    let mut total = 0i64;
    loop {
        match conn.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => total += n as i64,
        }
    }
    total
}
