//! # Throughput Test Engine
//!
//! The measurement tests coordinated by the control session driver:
//!
//! - [`s2c`]: server-to-client download blast over 1 or N freshly
//!   accepted streams.
//! - [`c2s`]: client-to-server upload absorber.
//! - [`middlebox`]: short small-segment blast used to detect interfering
//!   middleboxes.
//! - [`meta`]: client metadata exchange.
//!
//! Each test owns the ephemeral listener it opens and releases it when
//! the test returns. Worker tasks report to their driver through a single
//! `mpsc` channel of `i64`: positive values are byte counts, `-1` is a
//! worker-exit sentinel.

use crate::error::Result;
use crate::net::DeadlineListener;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

pub mod c2s;
pub mod meta;
pub mod middlebox;
pub mod s2c;

/// Sentinel posted on a test's completion channel when a worker exits.
pub(crate) const WORKER_DONE: i64 = -1;

/// Bytes moved over a measured interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// Total payload bytes transferred across all streams.
    pub bytes: i64,
    /// Wall-clock time the transfer took.
    pub elapsed: Duration,
}

impl ThroughputSample {
    /// Throughput in kilobits per second.
    pub fn kbps(&self) -> f64 {
        8.0 * self.bytes as f64 / 1000.0 / self.elapsed.as_secs_f64()
    }
}

/// Bind a data listener for a test. Port 0 asks the kernel for an
/// ephemeral port; the returned port is the one actually bound and is
/// what the test must announce in TEST_PREPARE.
pub(crate) async fn bind_data_listener(
    port: u16,
    window: Duration,
) -> Result<(DeadlineListener, u16)> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = DeadlineListener::bind(addr, window).await?;
    let bound = listener.local_addr()?.port();
    Ok((listener, bound))
}
