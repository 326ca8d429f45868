//! # NDT Server - Main Entry Point
//!
//! Wires the ambient pieces together and hands off to the library:
//!
//! 1. **Parse arguments**: command-line flags control logging and the
//!    server configuration.
//! 2. **Initialize logging**: a detailed diagnostic layer (stderr or a
//!    rolling log file) plus a colorized user-facing stdout layer.
//! 3. **Run the server**: bind the control port and serve sessions until
//!    Ctrl-C cancels the shutdown token.
//!
//! The process exits 0 on a clean shutdown; a failure to bind the main
//! listener (or any other fatal server error) propagates out of `main`
//! as a non-zero exit.

use anyhow::Result;
use clap::Parser;
use ndt_server::{cli::Args, logging::ConsoleFormatter, NdtServer, ServerConfig};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Verbosity applies to both the detailed layer and stdout:
    // default INFO, -v DEBUG, -vv and more TRACE.
    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // Detailed diagnostics go to a rolling file when requested,
    // otherwise to stderr. The appender guard must outlive the server or
    // file logging silently stops.
    let guard;
    let detailed_layer;
    if let Some(ref path) = args.log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let name = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("ndt-server.log"));
        let appender = tracing_appender::rolling::daily(dir, name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        detailed_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    } else {
        detailed_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    }

    // Clean, colorized session activity on stdout unless --quiet.
    let stdout_layer = if args.quiet {
        None
    } else {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ConsoleFormatter)
                .with_filter(log_level),
        )
    };

    tracing_subscriber::registry()
        .with(detailed_layer)
        .with(stdout_layer)
        .init();
    let _log_guard = guard;

    info!("starting ndt-server {}", ndt_server::VERSION);

    let config = ServerConfig::from(&args);
    let server = NdtServer::new(config);

    // Ctrl-C arms the shutdown token; the accept loop notices and
    // returns Ok, which is the normal-exit path.
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;
    info!("ndt-server stopped");
    Ok(())
}
