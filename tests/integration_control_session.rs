//! End-to-end control sessions against an in-process server: the
//! scripted client walks the full handshake and the S2C download tests.

mod common;

use anyhow::Result;
use common::{drain_data_stream, ScriptedClient, TestServer};

// Frame type bytes as the client sees them on the wire.
const SRV_QUEUE: u8 = 1;
const MSG_LOGIN: u8 = 2;
const TEST_PREPARE: u8 = 3;
const TEST_START: u8 = 4;
const TEST_MSG: u8 = 5;
const TEST_FINALIZE: u8 = 6;
const MSG_RESULTS: u8 = 8;
const MSG_LOGOUT: u8 = 9;

/// Scenario: STATUS|S2C login, one download stream, full transcript
/// through logout.
#[tokio::test]
async fn happy_path_single_stream_s2c() -> Result<()> {
    let server = TestServer::start(32).await;
    let mut client = ScriptedClient::connect(server.addr).await?;

    client.login("4.0.0.1", "20").await?;
    assert_eq!(client.read_kickoff().await?, "123456 654321");

    let (msg_type, queue) = client.read_wrapped().await?;
    assert_eq!((msg_type, queue.as_str()), (SRV_QUEUE, "0"));

    let (msg_type, version) = client.read_wrapped().await?;
    assert_eq!(msg_type, MSG_LOGIN);
    assert!(version.starts_with("v3.7.0 ("));

    let (msg_type, list) = client.read_wrapped().await?;
    assert_eq!((msg_type, list.as_str()), (MSG_LOGIN, "4"));

    let (msg_type, prepare) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_PREPARE);
    let port: u16 = prepare.parse()?;
    let drain = tokio::spawn(drain_data_stream(([127, 0, 0, 1], port).into()));

    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_START);

    let (msg_type, body) = client.read_frame().await?;
    assert_eq!(msg_type, TEST_MSG);
    let result: serde_json::Value = serde_json::from_slice(&body)?;
    let kbps: f64 = result["ThroughputValue"].as_str().unwrap().parse()?;
    let total: i64 = result["TotalSentByte"].as_str().unwrap().parse()?;
    assert!(kbps > 0.0);
    assert_eq!(result["UnsentDataAmount"], "0");

    client.send_wrapped(TEST_MSG, "1042.7").await?;
    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_FINALIZE);

    let (msg_type, results) = client.read_wrapped().await?;
    assert_eq!(msg_type, MSG_RESULTS);
    assert_eq!(results, "web100_supported: 0\n");

    let (msg_type, logout) = client.read_wrapped().await?;
    assert_eq!((msg_type, logout.as_str()), (MSG_LOGOUT, ""));

    assert!(client.at_eof().await);
    assert_eq!(drain.await?, total);
    Ok(())
}

/// Scenario: STATUS|S2C_EXT login; three parallel streams feed one
/// aggregate result, and the TEST_PREPARE body carries the extended
/// parameter tail.
#[tokio::test]
async fn multi_stream_s2c_ext() -> Result<()> {
    let server = TestServer::start(32).await;
    let mut client = ScriptedClient::connect(server.addr).await?;

    client.login("4.0.0.1", "144").await?;
    client.read_kickoff().await?;

    let (_, queue) = client.read_wrapped().await?;
    assert_eq!(queue, "0");
    let _version = client.read_wrapped().await?;

    let (_, list) = client.read_wrapped().await?;
    assert_eq!(list, "128");

    let (msg_type, prepare) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_PREPARE);
    let mut parts = prepare.split(' ');
    let port: u16 = parts.next().unwrap().parse()?;
    assert_eq!(
        parts.collect::<Vec<_>>(),
        vec!["10000.0", "1", "500.0", "0.0", "3"]
    );

    let addr: std::net::SocketAddr = ([127, 0, 0, 1], port).into();
    let drains: Vec<_> = (0..3)
        .map(|_| tokio::spawn(drain_data_stream(addr)))
        .collect();

    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_START);

    let (msg_type, body) = client.read_frame().await?;
    assert_eq!(msg_type, TEST_MSG);
    let result: serde_json::Value = serde_json::from_slice(&body)?;
    let total: i64 = result["TotalSentByte"].as_str().unwrap().parse()?;

    client.send_wrapped(TEST_MSG, "998.0").await?;
    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_FINALIZE);

    let _results = client.read_wrapped().await?;
    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, MSG_LOGOUT);

    let mut drained = 0;
    for handle in drains {
        drained += handle.await?;
    }
    assert_eq!(drained, total);
    assert!(total > 0);
    Ok(())
}

/// Mutual exclusion between S2C and S2C_EXT is the client's problem: a
/// client that advertises both gets both, extended first.
#[tokio::test]
async fn s2c_and_s2c_ext_both_run_when_advertised() -> Result<()> {
    let server = TestServer::start(32).await;
    let mut client = ScriptedClient::connect(server.addr).await?;

    // STATUS|S2C|S2C_EXT = 16 + 4 + 128.
    client.login("4.0.0.1", "148").await?;
    client.read_kickoff().await?;
    let _queue = client.read_wrapped().await?;
    let _version = client.read_wrapped().await?;

    let (_, list) = client.read_wrapped().await?;
    assert_eq!(list, "128 4");

    // Round one: the extended test with three streams.
    let (msg_type, prepare) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_PREPARE);
    let port: u16 = prepare.split(' ').next().unwrap().parse()?;
    let addr: std::net::SocketAddr = ([127, 0, 0, 1], port).into();
    let drains: Vec<_> = (0..3)
        .map(|_| tokio::spawn(drain_data_stream(addr)))
        .collect();
    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_START);
    let (msg_type, _) = client.read_frame().await?;
    assert_eq!(msg_type, TEST_MSG);
    client.send_wrapped(TEST_MSG, "1.0").await?;
    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_FINALIZE);
    for handle in drains {
        handle.await?;
    }

    // Round two: the single-stream test on a fresh listener.
    let (msg_type, prepare) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_PREPARE);
    assert!(!prepare.contains(' '));
    let port: u16 = prepare.parse()?;
    let drain = tokio::spawn(drain_data_stream(([127, 0, 0, 1], port).into()));
    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_START);
    let (msg_type, _) = client.read_frame().await?;
    assert_eq!(msg_type, TEST_MSG);
    client.send_wrapped(TEST_MSG, "2.0").await?;
    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, TEST_FINALIZE);
    drain.await?;

    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, MSG_RESULTS);
    let (msg_type, _) = client.read_wrapped().await?;
    assert_eq!(msg_type, MSG_LOGOUT);
    assert!(client.at_eof().await);
    Ok(())
}
