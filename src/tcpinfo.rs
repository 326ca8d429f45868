//! Kernel TCP statistics and segment-size control.
//!
//! Best-effort access to the kernel's per-connection TCP counters
//! (`TCP_INFO`) and to the maximum-segment-size option (`TCP_MAXSEG`)
//! used by the middle-box test. Both are Linux-only; on other platforms
//! the snapshot is an empty JSON object and the MSS clamp reports
//! unsupported, which the middle-box test notes in its result body.

use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};

/// Snapshot the kernel TCP counters for `stream` as a JSON object.
///
/// Returns `{}` when the counters are unavailable; this never fails the
/// calling test.
#[cfg(target_os = "linux")]
pub fn snapshot(stream: &TcpStream) -> Value {
    use std::os::unix::io::AsRawFd;

    let mut info: libc::tcp_info = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::tcp_info>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_INFO,
            &mut info as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return serde_json::json!({});
    }
    serde_json::json!({
        "state": info.tcpi_state,
        "rtt": info.tcpi_rtt,
        "rttvar": info.tcpi_rttvar,
        "snd_mss": info.tcpi_snd_mss,
        "rcv_mss": info.tcpi_rcv_mss,
        "snd_cwnd": info.tcpi_snd_cwnd,
        "total_retrans": info.tcpi_total_retrans,
    })
}

/// Snapshot the kernel TCP counters for `stream` as a JSON object.
///
/// This platform exposes no `TCP_INFO`; the snapshot is always empty.
#[cfg(not(target_os = "linux"))]
pub fn snapshot(_stream: &TcpStream) -> Value {
    serde_json::json!({})
}

/// Force the TCP maximum segment size on a listener's socket so that
/// connections accepted from it inherit the clamped MSS.
///
/// Returns `true` when the option was applied, `false` on platforms
/// without `TCP_MAXSEG`.
#[cfg(target_os = "linux")]
pub fn set_mss(listener: &TcpListener, mss: u32) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let value = mss as libc::c_int;
    let rc = unsafe {
        libc::setsockopt(
            listener.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_MAXSEG,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(true)
}

/// Force the TCP maximum segment size on a listener's socket.
///
/// No-op on this platform; the middle-box test documents the missing
/// clamp in its result body.
#[cfg(not(target_os = "linux"))]
pub fn set_mss(_listener: &TcpListener, _mss: u32) -> std::io::Result<bool> {
    Ok(false)
}
