//! TCP transport against an in-process device server.

mod common;

use beamline_daq::transport::{ConnectionState, TcpTransport, Transport};
use beamline_daq::DaqError;
use common::{DeviceServer, ServerReply, I0, RING};
use std::time::Duration;

async fn connected(server: &DeviceServer) -> TcpTransport {
    let mut transport = TcpTransport::new(server.host(), server.port());
    transport.connect().await.unwrap();
    transport
}

#[tokio::test]
async fn get_and_list_over_socket() {
    let server = DeviceServer::beamline().await;
    let mut transport = connected(&server).await;

    assert_eq!(transport.get(RING).await.unwrap(), 350.5);
    assert_eq!(
        transport.list_pvs(Some("BL02:DET:*")).await.unwrap(),
        vec![I0.to_string(), "BL02:DET:IT".to_string()]
    );
    transport.ping().await.unwrap();

    assert_eq!(
        server.received(),
        vec!["GET:BL02:RING:CURRENT", "LIST:BL02:DET:*", "PING"]
    );
}

#[tokio::test]
async fn put_and_move_encode_values() {
    let server = DeviceServer::beamline().await;
    let mut transport = connected(&server).await;

    transport.put("BL02:SHUTTER:CMD", 1.0).await.unwrap();
    transport.move_motor("BL02:SAMPLE:X", -12.5).await.unwrap();
    assert_eq!(transport.status("BL02:SAMPLE:X").await.unwrap(), "MOVING");
    assert_eq!(transport.status("BL02:SAMPLE:X").await.unwrap(), "IDLE");
    assert_eq!(transport.get("BL02:SAMPLE:X.RBV").await.unwrap(), -12.5);

    let received = server.received();
    assert_eq!(received[0], "PUT:BL02:SHUTTER:CMD:1");
    assert_eq!(received[1], "MOVE:BL02:SAMPLE:X:-12.5");
}

#[tokio::test]
async fn monitor_verbs_are_plain_requests() {
    let server = DeviceServer::beamline().await;
    let mut transport = connected(&server).await;

    transport.monitor_start(I0, 250).await.unwrap();
    transport.monitor_stop().await.unwrap();
    assert_eq!(server.received(), vec!["MONITOR:BL02:DET:I0:250", "STOP"]);
}

#[tokio::test]
async fn server_errors_carry_their_code() {
    let server = DeviceServer::beamline().await;
    let mut transport = connected(&server).await;

    let err = transport.get("BL02:NOPE").await.unwrap_err();
    assert!(matches!(
        err,
        DaqError::ProtocolFailure { ref code, .. } if code == "UNKNOWN_PV"
    ));
    // The connection stays usable after an ERR reply.
    assert_eq!(transport.get(RING).await.unwrap(), 350.5);
}

#[tokio::test]
async fn malformed_and_non_numeric_replies() {
    let server = DeviceServer::start(|line| match line {
        "GET:A:GARBAGE" => ServerReply::line("GARBAGE"),
        "GET:A:TEXT" => ServerReply::line("OK:abc"),
        _ => ServerReply::line(""),
    })
    .await;
    let mut transport = connected(&server).await;

    let err = transport.get("A:GARBAGE").await.unwrap_err();
    assert_eq!(err.protocol_code(), Some("INVALID"));

    let err = transport.get("A:TEXT").await.unwrap_err();
    assert!(matches!(err, DaqError::MalformedValue(ref p) if p == "abc"));

    let err = transport.get("A:EMPTY").await.unwrap_err();
    assert_eq!(err.protocol_code(), Some("EMPTY"));
}

#[tokio::test]
async fn peer_closing_mid_response_is_a_connection_failure() {
    let server = DeviceServer::start(|_| ServerReply::Hangup(b"OK:35".to_vec())).await;
    let mut transport = connected(&server).await;

    let err = transport.get(RING).await.unwrap_err();
    assert!(matches!(err, DaqError::ConnectionFailure(_)), "got {err:?}");
}

#[tokio::test]
async fn closed_connection_without_reply_fails() {
    let server = DeviceServer::start(|_| ServerReply::Close).await;
    let mut transport = connected(&server).await;

    let err = transport.get(RING).await.unwrap_err();
    assert!(matches!(err, DaqError::ConnectionFailure(_)), "got {err:?}");
    // The lifecycle only changes through connect/disconnect.
    assert_eq!(transport.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn silent_server_times_out() {
    let server = DeviceServer::start(|_| ServerReply::Silent).await;
    let mut transport = TcpTransport::new(server.host(), server.port())
        .with_timeout(Duration::from_millis(200));
    transport.connect().await.unwrap();

    let err = transport.get(RING).await.unwrap_err();
    assert!(
        matches!(err, DaqError::OperationTimedOut(t) if t == Duration::from_millis(200)),
        "got {err:?}"
    );
}

#[tokio::test]
async fn reconnect_after_timeout_starts_a_clean_session() {
    let mut sim = common::beamline();
    let mut first = true;
    let server = DeviceServer::start(move |line| {
        if std::mem::take(&mut first) {
            ServerReply::Silent
        } else {
            sim(line)
        }
    })
    .await;
    let mut transport = TcpTransport::new(server.host(), server.port())
        .with_timeout(Duration::from_millis(200));
    transport.connect().await.unwrap();

    let err = transport.get(I0).await.unwrap_err();
    assert!(matches!(err, DaqError::OperationTimedOut(_)), "got {err:?}");
    let err = transport.get(RING).await.unwrap_err();
    assert!(matches!(err, DaqError::ConnectionFailure(_)), "got {err:?}");

    transport.connect().await.unwrap();
    assert!(!transport.is_broken());
    assert_eq!(transport.get(RING).await.unwrap(), 350.5);
    assert_eq!(server.received(), vec!["GET:BL02:DET:I0", "GET:BL02:RING:CURRENT"]);
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut transport = TcpTransport::new("127.0.0.1", port);
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, DaqError::ConnectionFailure(_)), "got {err:?}");
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn lifecycle_connect_disconnect_reconnect() {
    let server = DeviceServer::beamline().await;
    let mut transport = TcpTransport::new(server.host(), server.port());

    assert!(matches!(transport.get(RING).await, Err(DaqError::NotConnected)));

    transport.connect().await.unwrap();
    transport.connect().await.unwrap();
    assert_eq!(transport.state(), ConnectionState::Connected);

    transport.disconnect();
    transport.disconnect();
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(matches!(transport.get(RING).await, Err(DaqError::NotConnected)));

    transport.connect().await.unwrap();
    assert_eq!(transport.get(RING).await.unwrap(), 350.5);

    transport.quit().await.unwrap();
    assert!(!transport.is_connected());
}
