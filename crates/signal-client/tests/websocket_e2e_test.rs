//! End-to-end tests against a real tokio-tungstenite server on 127.0.0.1

mod harness;

use futures::{SinkExt, StreamExt};
use harness::{init_logging, HEARTBEAT_FRAME, IDENTITY_FRAME};
use signal_client::{
    ClientConfig, ClientOutcome, DispatchEnd, ReconnectConfig, ShutdownReason, ShutdownSignal,
    SignalClient,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(10);

fn fast_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        address: addr.to_string(),
        heartbeat_interval_ms: 200,
        handshake_timeout_ms: 2000,
        close_timeout_ms: 1000,
        reconnect: ReconnectConfig {
            base_delay_ms: 100,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Reserve a free port with nothing listening on it
async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn accept_one(listener: &TcpListener) -> WebSocketStream<tokio::net::TcpStream> {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("client never dialed")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_text(ws: &mut WebSocketStream<tokio::net::TcpStream>) -> String {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no frame from client")
            .expect("client hung up")
            .unwrap();
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

#[tokio::test]
async fn test_client_waits_for_server_then_announces() {
    init_logging();
    let addr = free_addr().await;
    let client = SignalClient::websocket(fast_config(addr)).unwrap();
    let shutdown = ShutdownSignal::new();
    let run = tokio::spawn(client.run(shutdown.listener()));

    // Nothing listening yet: client keeps retrying
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(!run.is_finished());

    let listener = TcpListener::bind(addr).await.unwrap();
    let mut ws = accept_one(&listener).await;

    assert_eq!(next_text(&mut ws).await, IDENTITY_FRAME);
    assert_eq!(next_text(&mut ws).await, HEARTBEAT_FRAME);

    ws.send(Message::Text(r#"{"type":"offer","data":"v=0"}"#.to_string()))
        .await
        .unwrap();
    ws.send(Message::Text("garbage".to_string())).await.unwrap();

    shutdown.trigger(ShutdownReason::Interrupt);

    // Keep reading so the server answers the close handshake
    let server = tokio::spawn(async move {
        let mut saw_close = false;
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Close(Some(frame)) = msg {
                assert_eq!(u16::from(frame.code), 1000);
                saw_close = true;
            }
        }
        saw_close
    });

    let outcome = tokio::time::timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert!(outcome.is_interrupt());
    assert!(matches!(outcome, ClientOutcome::Interrupted { .. }));
    assert!(server.await.unwrap());
}

#[tokio::test]
async fn test_server_close_ends_client() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = SignalClient::websocket(fast_config(addr)).unwrap();
    let shutdown = ShutdownSignal::new();
    let run = tokio::spawn(client.run(shutdown.listener()));

    let mut ws = accept_one(&listener).await;
    assert_eq!(next_text(&mut ws).await, IDENTITY_FRAME);

    ws.close(None).await.unwrap();
    tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });

    let outcome = tokio::time::timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert!(matches!(
        outcome,
        ClientOutcome::ConnectionLost(DispatchEnd::PeerClosed(_))
            | ClientOutcome::ConnectionLost(DispatchEnd::ReadFailed(_))
    ));
}
