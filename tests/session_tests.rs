//! End-to-end tests for chat sessions
//!
//! These tests run a real server on an ephemeral port and talk to it over
//! real sockets: raw TCP streams standing in for foreign clients, and the
//! crate's own `Client` for the full round trip.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use wirechat::{ClientBuilder, ClientState, Event, Server, ServerBuilder, ServerState};

const WAIT: Duration = Duration::from_secs(5);

/// Start a server on an ephemeral loopback port with its events captured
async fn started_server() -> (Server, SocketAddr, mpsc::UnboundedReceiver<Event>) {
    let mut server = ServerBuilder::new()
        .with_bind_host("127.0.0.1")
        .with_port(0)
        .build()
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    server.on_event(move |event| {
        let _ = tx.send(event);
    });

    server.start().await.unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr, rx)
}

/// Connect a raw TCP client and wait until the server has registered it
async fn raw_client(
    addr: SocketAddr,
    events: &mut mpsc::UnboundedReceiver<Event>,
) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let stream = TcpStream::connect(addr).await.unwrap();
    wait_for_event(events, |e| matches!(e, Event::PeerConnected { .. })).await;
    let (read_half, write_half) = stream.into_split();
    (BufReader::new(read_half), write_half)
}

/// Receive events until one matches, panicking after the timeout
async fn wait_for_event<F>(events: &mut mpsc::UnboundedReceiver<Event>, pred: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Read one line, without its terminator, panicking after the timeout
async fn read_line_from(reader: &mut BufReader<OwnedReadHalf>) -> String {
    let mut line = String::new();
    let n = timeout(WAIT, reader.read_line(&mut line))
        .await
        .expect("timed out reading line")
        .unwrap();
    assert!(n > 0, "unexpected EOF");
    line.trim_end_matches('\n').to_string()
}

#[tokio::test]
async fn test_single_client_round_trip() {
    let (mut server, addr, mut events) = started_server().await;
    let (mut reader, mut writer) = raw_client(addr, &mut events).await;

    // Operator broadcasts; the client receives the line verbatim.
    assert_eq!(server.broadcast("hello").unwrap(), 1);
    assert_eq!(read_line_from(&mut reader).await, "hello");

    // The client speaks; the server surfaces exactly that line.
    writer.write_all(b"hi\n").await.unwrap();
    let event = wait_for_event(&mut events, |e| {
        matches!(e, Event::MessageReceived { .. })
    })
    .await;
    match event {
        Event::MessageReceived { line, .. } => assert_eq!(line, "hi"),
        other => panic!("unexpected event: {:?}", other),
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_reaches_all_clients() {
    let (mut server, addr, mut events) = started_server().await;
    let (mut reader_a, _writer_a) = raw_client(addr, &mut events).await;
    let (mut reader_b, _writer_b) = raw_client(addr, &mut events).await;

    assert_eq!(server.peer_count(), 2);
    assert_eq!(server.broadcast("ping").unwrap(), 2);

    assert_eq!(read_line_from(&mut reader_a).await, "ping");
    assert_eq!(read_line_from(&mut reader_b).await, "ping");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_order_is_preserved() {
    let (mut server, addr, mut events) = started_server().await;
    let (mut reader, _writer) = raw_client(addr, &mut events).await;

    for line in ["one", "two", "three"] {
        server.broadcast(line).unwrap();
    }

    assert_eq!(read_line_from(&mut reader).await, "one");
    assert_eq!(read_line_from(&mut reader).await, "two");
    assert_eq!(read_line_from(&mut reader).await, "three");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_clean_disconnect_deregisters_without_disturbing_others() {
    let (mut server, addr, mut events) = started_server().await;
    let (reader_a, writer_a) = raw_client(addr, &mut events).await;
    let (mut reader_b, _writer_b) = raw_client(addr, &mut events).await;

    assert_eq!(server.peer_count(), 2);

    // Client A goes away cleanly.
    drop(reader_a);
    drop(writer_a);
    wait_for_event(&mut events, |e| matches!(e, Event::PeerDisconnected { .. })).await;
    assert_eq!(server.peer_count(), 1);

    // B still gets broadcasts, and the accept loop still accepts.
    assert_eq!(server.broadcast("still here").unwrap(), 1);
    assert_eq!(read_line_from(&mut reader_b).await, "still here");

    let (mut reader_c, _writer_c) = raw_client(addr, &mut events).await;
    assert_eq!(server.broadcast("newcomer too").unwrap(), 2);
    assert_eq!(read_line_from(&mut reader_b).await, "newcomer too");
    assert_eq!(read_line_from(&mut reader_c).await, "newcomer too");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_empty_line_broadcast() {
    let (mut server, addr, mut events) = started_server().await;
    let (mut reader, _writer) = raw_client(addr, &mut events).await;

    server.broadcast("").unwrap();
    assert_eq!(read_line_from(&mut reader).await, "");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_crate_client_end_to_end() {
    let (mut server, addr, mut server_events) = started_server().await;

    let mut client = ClientBuilder::new()
        .with_host(addr.ip().to_string())
        .with_port(addr.port())
        .build()
        .unwrap();

    let (client_tx, mut client_events) = mpsc::unbounded_channel();
    client.on_event(move |event| {
        let _ = client_tx.send(event);
    });

    client.connect().await.unwrap();
    assert_eq!(client.state(), ClientState::Connected);
    wait_for_event(&mut server_events, |e| {
        matches!(e, Event::PeerConnected { .. })
    })
    .await;

    // Client to server.
    client.send("hi").unwrap();
    let event = wait_for_event(&mut server_events, |e| {
        matches!(e, Event::MessageReceived { .. })
    })
    .await;
    match event {
        Event::MessageReceived { line, .. } => assert_eq!(line, "hi"),
        other => panic!("unexpected event: {:?}", other),
    }

    // Server to client.
    server.broadcast("hello").unwrap();
    let event = wait_for_event(&mut client_events, |e| {
        matches!(e, Event::MessageReceived { .. })
    })
    .await;
    match event {
        Event::MessageReceived { line, .. } => assert_eq!(line, "hello"),
        other => panic!("unexpected event: {:?}", other),
    }

    client.stop().unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_server_stop_closes_client_connections() {
    let (mut server, addr, mut events) = started_server().await;
    let (mut reader, _writer) = raw_client(addr, &mut events).await;

    server.stop().await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);

    // The client observes EOF rather than hanging.
    let mut line = String::new();
    let n = timeout(WAIT, reader.read_line(&mut line))
        .await
        .expect("read did not unblock on server stop")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_client_observes_server_going_away() {
    let (mut server, addr, mut server_events) = started_server().await;

    let mut client = ClientBuilder::new()
        .with_host(addr.ip().to_string())
        .with_port(addr.port())
        .build()
        .unwrap();

    let (client_tx, mut client_events) = mpsc::unbounded_channel();
    client.on_event(move |event| {
        let _ = client_tx.send(event);
    });

    client.connect().await.unwrap();
    wait_for_event(&mut server_events, |e| {
        matches!(e, Event::PeerConnected { .. })
    })
    .await;

    server.stop().await.unwrap();

    wait_for_event(&mut client_events, |e| {
        matches!(e, Event::PeerDisconnected { .. })
    })
    .await;
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test]
async fn test_sequential_clients_all_receive() {
    let (mut server, addr, mut events) = started_server().await;

    let mut readers = Vec::new();
    for _ in 0..5 {
        let (reader, writer) = raw_client(addr, &mut events).await;
        readers.push((reader, writer));
    }

    assert_eq!(server.peer_count(), 5);
    assert_eq!(server.broadcast("everyone").unwrap(), 5);

    for (reader, _writer) in readers.iter_mut() {
        assert_eq!(read_line_from(reader).await, "everyone");
    }

    server.stop().await.unwrap();
}
