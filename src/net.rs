//! # Deadlined Byte Conduit
//!
//! Wrappers that bound every socket operation with a deadline so that no
//! layer above has to scatter timeout logic through its control flow.
//!
//! [`DeadlineStream`] wraps any full-duplex byte endpoint and applies a
//! per-operation timeout (default 10 s) to each read, write, and flush.
//! [`DeadlineListener`] wraps a TCP listener with an absolute deadline
//! fixed at construction, after which pending accepts fail.
//!
//! Both are generic enough for production sockets and in-memory test
//! endpoints (`tokio::io::duplex`).

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Default per-operation timeout for reads, writes, and accepts.
pub const DEFAULT_TIMEOUT: Duration = crate::defaults::IO_TIMEOUT;

/// A byte stream whose every operation carries a deadline of `now + T`.
///
/// There are no automatic retries: a deadline that passes surfaces as
/// [`Error::Timeout`] and the caller decides what to do. A stuck peer is
/// therefore bounded by `T` on each blocking operation.
#[derive(Debug)]
pub struct DeadlineStream<S> {
    inner: S,
    timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> DeadlineStream<S> {
    /// Wrap `inner` with the default 10-second per-operation timeout.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Current per-operation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replace the per-operation timeout.
    ///
    /// # Panics
    ///
    /// Panics on a zero duration: a conduit without a bound defeats the
    /// purpose of this type, so that is treated as a programmer error.
    pub fn set_timeout(&mut self, timeout: Duration) {
        assert!(!timeout.is_zero(), "conduit timeout must be positive");
        self.timeout = timeout;
    }

    /// Read up to `buf.len()` bytes under the deadline.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match tokio::time::timeout(self.timeout, self.inner.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(Error::from_read(e)),
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    /// Fill `buf` completely under the deadline.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.inner.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::from_read(e)),
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    /// Write all of `buf` under the deadline.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.inner.write_all(buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    /// Flush buffered bytes under the deadline.
    pub async fn flush(&mut self) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.inner.flush()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    /// Shut down the write side, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.inner.shutdown()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    /// Access the wrapped endpoint.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

/// A TCP listener whose pending accepts fail once an absolute deadline,
/// fixed at construction, has passed.
#[derive(Debug)]
pub struct DeadlineListener {
    inner: TcpListener,
    deadline: Instant,
}

impl DeadlineListener {
    /// Bind `addr` with accepts allowed until `now + window`.
    ///
    /// Pass port 0 in `addr` to let the kernel choose an ephemeral port;
    /// [`DeadlineListener::local_addr`] reports the port actually bound.
    pub async fn bind(addr: SocketAddr, window: Duration) -> Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Self {
            inner,
            deadline: Instant::now() + window,
        })
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Access the wrapped listener, e.g. for socket options.
    pub fn get_ref(&self) -> &TcpListener {
        &self.inner
    }

    /// Accept one connection within the remaining deadline budget.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout(Duration::ZERO));
        }
        match tokio::time::timeout(remaining, self.inner.accept()).await {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout(remaining)),
        }
    }
}
