//! # Command-Line Interface
//!
//! Flag parsing with `clap`'s derive API and the conversion from the
//! user-facing [`Args`] into the internal [`ServerConfig`]. The defaults
//! mirror the protocol reference: control port 3001, S2C data port 3010,
//! three parallel streams for the extended tests, and an admission cap
//! of 32 concurrent sessions.

use crate::defaults;
use crate::nettests::s2c::S2cConfig;
use crate::server::ServerConfig;
use crate::session::SessionConfig;
use clap::Parser;
use std::path::PathBuf;

/// NDT measurement server.
///
/// Accepts NDT control connections, negotiates the JSON login, and runs
/// the advertised throughput tests (server-to-client download in single-
/// and multi-stream form, plus the metadata exchange), reporting the
/// measured rates back over the control channel.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Interface to bind the control listener on
    #[arg(long, default_value = "127.0.0.1", help_heading = "Network")]
    pub host: String,

    /// Control port
    #[arg(short = 'p', long, default_value_t = defaults::CONTROL_PORT, help_heading = "Network")]
    pub port: u16,

    /// Data port for the S2C tests (0 picks an ephemeral port; the port
    /// actually bound is always the one announced to the client)
    #[arg(long, default_value_t = defaults::S2C_PORT, help_heading = "Network")]
    pub s2c_port: u16,

    /// Parallel stream count for the multi-stream test variants
    #[arg(long, default_value_t = defaults::PARALLEL_STREAMS, help_heading = "Tests")]
    pub streams: usize,

    /// Maximum number of sessions allowed to run tests concurrently
    #[arg(long, default_value_t = defaults::MAX_ACTIVE_TESTS, help_heading = "Tests")]
    pub max_active: usize,

    /// Silence the user-facing output on stdout
    ///
    /// Diagnostic logs on stderr (or the log file) are unaffected.
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    pub quiet: bool,

    /// Increase diagnostic log verbosity
    ///
    /// Can be used multiple times: -v for debug, -vv for trace.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Write detailed diagnostics to a rolling log file instead of stderr
    #[arg(long, help_heading = "Output and Logging")]
    pub log_file: Option<PathBuf>,
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            max_active: args.max_active,
            session: SessionConfig {
                s2c: S2cConfig {
                    port: args.s2c_port,
                    streams: args.streams,
                    ..S2cConfig::default()
                },
            },
        }
    }
}
