//! # NDT Measurement Server
//!
//! Server side of the Network Diagnostic Tool (NDT) protocol: a TCP
//! control channel carrying typed, length-prefixed frames, a per-session
//! state machine that negotiates a JSON login and sequences the tests,
//! and a throughput test engine measuring the server-to-client and
//! client-to-server directions over freshly accepted data streams.

pub mod cli;
pub mod error;
pub mod gate;
pub mod logging;
pub mod net;
pub mod nettests;
pub mod payload;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tcpinfo;

pub use error::{Error, Result};
pub use gate::{AdmissionGate, AdmissionPermit};
pub use net::{DeadlineListener, DeadlineStream};
pub use payload::PayloadGenerator;
pub use protocol::{Codec, Frame, Login, MessageType};
pub use server::{NdtServer, ServerConfig};
pub use session::{ControlSession, SessionConfig};

/// The current version of the server crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Well-known NDT control port
    pub const CONTROL_PORT: u16 = 3001;

    /// Reference data port for the S2C tests
    pub const S2C_PORT: u16 = 3010;

    /// Stream count for the multi-stream test variants
    pub const PARALLEL_STREAMS: usize = 3;

    /// Per-operation socket deadline
    pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

    /// Length of a throughput blast or absorb window
    pub const TEST_DURATION: Duration = Duration::from_secs(10);

    /// Size of each random payload block in the blast tests
    pub const BLAST_BLOCK_SIZE: usize = 8192;

    /// Length of the middle-box write window
    pub const MIDDLEBOX_DURATION: Duration = Duration::from_secs(5);

    /// Segment size clamped onto the middle-box listener
    pub const MIDDLEBOX_MSS: u32 = 1456;

    /// Send buffer size forced on the middle-box stream
    pub const MIDDLEBOX_SEND_BUFFER: usize = 8192;

    /// Cap on concurrently running test sessions
    pub const MAX_ACTIVE_TESTS: usize = 32;
}
