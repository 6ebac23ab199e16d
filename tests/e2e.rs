//! End-to-end scenarios driving the sans-io [`Session`] directly with
//! synthetic byte streams (no real socket needed for these), plus one
//! `tokio::test` exercising the full async driver
//! (`wsclient_core::net::drive`) over an in-memory duplex pipe.

use base64::prelude::*;
use sha1::{Digest, Sha1};

use wsclient_core::callbacks::{CloseOutcome, Handlers};
use wsclient_core::config::ClientConfig;
use wsclient_core::error::TimeoutKind;
use wsclient_core::frame::{close_code, OpCode};
use wsclient_core::message::Message;
use wsclient_core::session::{Session, State};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

fn accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

fn handshake_response(key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_value(key)
    )
    .into_bytes()
}

fn wire_frame(fin: bool, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(((fin as u8) << 7) | opcode.as_u8());
    let len = payload.len();
    if len < 126 {
        out.push(len as u8);
    } else if len < 65536 {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

#[derive(Default)]
struct Recorder {
    connected: bool,
    messages: Vec<Message>,
    frame_data: Vec<Vec<u8>>,
    pings: Vec<Vec<u8>>,
    pong_timeouts: u32,
    timeouts: Vec<TimeoutKind>,
    closes: Vec<CloseOutcome>,
}

impl Handlers for Recorder {
    fn on_connect(&mut self) {
        self.connected = true;
    }
    fn on_message(&mut self, message: Message) {
        self.messages.push(message);
    }
    fn on_frame_data(&mut self, data: &[u8]) {
        self.frame_data.push(data.to_vec());
    }
    fn on_ping(&mut self, payload: &[u8]) {
        self.pings.push(payload.to_vec());
    }
    fn on_pong_timeout(&mut self) {
        self.pong_timeouts += 1;
    }
    fn on_timeout(&mut self, kind: TimeoutKind) {
        self.timeouts.push(kind);
    }
    fn on_close(&mut self, outcome: CloseOutcome) {
        self.closes.push(outcome);
    }
}

fn connected_session() -> Session<Recorder> {
    let mut session = Session::new("example.com", 80, false, "/", ClientConfig::default(), Recorder::default());
    session.enable_message_accumulation(true);
    session.begin_connecting();
    let _ = session.begin_handshake();
    let key = session.handshake_key().unwrap().to_string();
    session.feed(&handshake_response(&key)).unwrap();
    assert_eq!(session.state(), State::Connected);
    session
}

/// S1: hello world: connect, receive one unmasked TEXT frame, then
/// locally close and have the server echo the CLOSE.
#[test]
fn s1_hello_world() {
    let mut session = connected_session();
    assert!(session.handlers_mut().connected);

    session.feed(&wire_frame(true, OpCode::Text, b"Hello")).unwrap();
    assert_eq!(session.handlers_mut().messages, vec![Message::Text("Hello".into())]);

    let out = session.close().unwrap();
    assert_eq!(session.state(), State::ClosingSent);
    assert!(!out.is_empty());

    let mut close_payload = close_code::NORMAL.to_be_bytes().to_vec();
    close_payload.extend_from_slice(b"");
    session.feed(&wire_frame(true, OpCode::Close, &close_payload)).unwrap();

    assert_eq!(session.state(), State::Closed);
    let outcome = &session.handlers_mut().closes[0];
    assert_eq!(outcome.status, Some(close_code::NORMAL));
    assert!(outcome.was_clean);
}

/// S2: a fragmented TEXT message with a PING interleaved between
/// fragments; the PING must be observed and auto-answered without
/// disturbing the in-progress message.
#[test]
fn s2_fragmented_message_with_interleaved_ping() {
    let mut session = connected_session();

    let mut wire = Vec::new();
    wire.extend(wire_frame(false, OpCode::Text, b"Hel"));
    wire.extend(wire_frame(true, OpCode::Ping, b"p"));
    wire.extend(wire_frame(true, OpCode::Continue, b"lo"));

    let out = session.feed(&wire).unwrap();

    assert_eq!(session.handlers_mut().pings, vec![b"p".to_vec()]);
    assert_eq!(session.handlers_mut().messages, vec![Message::Text("Hello".into())]);
    assert_eq!(session.handlers_mut().frame_data, vec![b"Hel".to_vec(), b"lo".to_vec()]);
    // The auto-pong must have gone out.
    assert!(!out.is_empty());
}

/// S3: client-side fragmentation: with `max_frame_size=3`, sending
/// "Hello" produces two frames, `TEXT fin=0 "Hel"` then `CONT fin=1
/// "lo"`, each independently masked.
#[test]
fn s3_client_side_fragmentation() {
    let mut config = ClientConfig::default();
    config.web_socket_config.max_frame_size = Some(3);
    let mut session = Session::new("example.com", 80, false, "/", config, Recorder::default());
    session.begin_connecting();
    let _ = session.begin_handshake();
    let key = session.handshake_key().unwrap().to_string();
    session.feed(&handshake_response(&key)).unwrap();

    let out = session.send_message(&Message::Text("Hello".into())).unwrap();

    let mut parser = wsclient_core::parser::FrameParser::new();
    let events = parser.feed(&out);
    let headers: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            wsclient_core::parser::ParserEvent::FrameBegin(h) => Some(*h),
            _ => None,
        })
        .collect();

    assert_eq!(headers.len(), 2);
    assert!(!headers[0].fin);
    assert_eq!(headers[0].opcode, OpCode::Text);
    assert_eq!(headers[0].payload_len, 3);
    assert!(headers[1].fin);
    assert_eq!(headers[1].opcode, OpCode::Continue);
    assert_eq!(headers[1].payload_len, 2);
    assert_ne!(headers[0].mask_key, headers[1].mask_key);
}

/// S4: a CONT frame with no message open is a protocol error; the
/// client closes with 1002 (clean, since this test doesn't simulate the
/// server's echo).
#[test]
fn s4_cont_without_open_message() {
    let mut session = connected_session();
    let out = session.feed(&wire_frame(true, OpCode::Continue, b"x")).unwrap();
    assert_eq!(session.state(), State::Closed);
    assert!(!out.is_empty());
    assert_eq!(session.handlers_mut().closes[0].status, Some(close_code::PROTOCOL_ERROR));
    assert!(!session.handlers_mut().closes[0].was_clean);
}

/// S5: pong timeout: a PING is sent, no matching PONG arrives, the
/// session reports `on_pong_timeout` exactly once and stays CONNECTED.
#[test]
fn s5_pong_timeout_does_not_close_session() {
    let mut session = connected_session();
    session.send_ping(b"ping-payload".to_vec()).unwrap();
    session.on_pong_timeout();
    assert_eq!(session.handlers_mut().pong_timeouts, 1);
    assert_eq!(session.state(), State::Connected);

    // A second timeout with no intervening ping is a no-op (no ping in flight).
    session.on_pong_timeout();
    assert_eq!(session.handlers_mut().pong_timeouts, 1);
}

/// S6: a BINARY frame of exactly 65,536 bytes forces the 64-bit length
/// encoding (9-byte header) and must be surfaced whole.
#[test]
fn s6_length_boundary_65536_bytes() {
    let mut session = connected_session();
    let payload = vec![0x5Au8; 65536];
    session.feed(&wire_frame(true, OpCode::Binary, &payload)).unwrap();
    match &session.handlers_mut().messages[..] {
        [Message::Binary(data)] => assert_eq!(data.len(), 65536),
        other => panic!("expected one binary message, got {other:?}"),
    }
}

/// The RFC 6455 worked example for the accept-key derivation.
#[test]
fn handshake_accept_matches_rfc6455_worked_example() {
    assert_eq!(
        accept_value("dGhlIHNhbXBsZSBub25jZQ=="),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}

/// Property 5: ill-formed UTF-8 in a text message triggers close 1007.
#[test]
fn malformed_utf8_text_triggers_close_1007() {
    let mut session = connected_session();
    session.feed(&wire_frame(true, OpCode::Text, &[0xC0, 0xAF])).unwrap();
    assert_eq!(session.handlers_mut().closes[0].status, Some(close_code::INVALID_PAYLOAD));
}

/// Property 6: RSV1 set with no negotiated extension triggers close 1002.
#[test]
fn rsv1_set_triggers_close_1002() {
    let mut session = connected_session();
    let bad_frame = [0b1100_0001u8, 0x00]; // rsv1 + fin + text opcode, zero-length
    session.feed(&bad_frame).unwrap();
    assert_eq!(session.handlers_mut().closes[0].status, Some(close_code::PROTOCOL_ERROR));
}

/// Exercises the full tokio-driven async path (`net::drive`) over an
/// in-memory duplex pipe standing in for a socket: handshake, a message,
/// and a `close_threadsafe`-initiated clean close.
#[tokio::test]
async fn async_driver_end_to_end_over_duplex() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wsclient_core::net;

    let (client_io, mut server_io) = tokio::io::duplex(8192);
    let (client_read, mut client_write) = tokio::io::split(client_io);

    let mut session = Session::new("example.com", 80, false, "/", ClientConfig::default(), Recorder::default());
    session.enable_message_accumulation(true);
    session.begin_connecting();
    let handshake_bytes = session.begin_handshake();
    let key = session.handshake_key().unwrap().to_string();

    // `net::connect` writes the handshake request before handing off to
    // `drive`; replicate that here since we're driving a duplex pipe
    // directly instead of going through `connect`.
    client_write.write_all(&handshake_bytes).await.unwrap();

    let (inbox_tx, inbox_rx) = tokio::sync::mpsc::unbounded_channel::<net::Inbox>();
    let handle = net::SessionHandle::from(inbox_tx);

    // Stand in for the server: read the handshake request, answer with a
    // valid 101 response, then push one TEXT frame.
    let server_task = tokio::spawn(async move {
        let mut buf = vec![0u8; handshake_bytes.len()];
        server_io.read_exact(&mut buf).await.unwrap();
        server_io.write_all(&handshake_response(&key)).await.unwrap();
        server_io
            .write_all(&wire_frame(true, OpCode::Text, b"Hello"))
            .await
            .unwrap();

        // Wait for the client's outbound message, then its CLOSE, and echo it.
        let mut inbound = vec![0u8; 4096];
        loop {
            let n = server_io.read(&mut inbound).await.unwrap();
            if n == 0 {
                break;
            }
            let mut parser = wsclient_core::parser::FrameParser::new();
            let events = parser.feed(&inbound[..n]);
            let saw_close = events
                .iter()
                .any(|e| matches!(e, wsclient_core::parser::ParserEvent::FrameBegin(h) if h.opcode == OpCode::Close));
            if saw_close {
                let mut payload = close_code::NORMAL.to_be_bytes().to_vec();
                payload.extend_from_slice(b"bye");
                server_io
                    .write_all(&wire_frame(true, OpCode::Close, &payload))
                    .await
                    .unwrap();
                break;
            }
        }
    });

    let drive_task = tokio::spawn(net::drive(session, client_read, client_write, ClientConfig::default(), inbox_rx));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.send_threadsafe(Message::Text("echo me".into())).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.close_threadsafe(close_code::NORMAL, "bye").unwrap();

    server_task.await.unwrap();
    drive_task.await.unwrap();
}

/// Forwards timeout/close notifications over a channel, since the
/// `Handlers` impl is moved into the `Session` that `net::drive` consumes
/// and can't be inspected afterward.
struct TimeoutWatcher(tokio::sync::mpsc::UnboundedSender<(Option<TimeoutKind>, Option<CloseOutcome>)>);

impl Handlers for TimeoutWatcher {
    fn on_timeout(&mut self, kind: TimeoutKind) {
        let _ = self.0.send((Some(kind), None));
    }
    fn on_close(&mut self, outcome: CloseOutcome) {
        let _ = self.0.send((None, Some(outcome)));
    }
}

/// A stalled write past `send_timeout` fires `on_timeout(Send)` and closes
/// the session as abnormal, per the "no writable progress" timer.
#[tokio::test]
async fn send_timeout_fires_on_stalled_write() {
    use tokio::io::AsyncWriteExt;
    use wsclient_core::net;

    let (client_io, mut server_io) = tokio::io::duplex(64);
    let (client_read, mut client_write) = tokio::io::split(client_io);

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut session = Session::new("example.com", 80, false, "/", ClientConfig::default(), TimeoutWatcher(events_tx));
    session.begin_connecting();
    let handshake_bytes = session.begin_handshake();
    let key = session.handshake_key().unwrap().to_string();
    client_write.write_all(&handshake_bytes).await.unwrap();

    server_io.write_all(&handshake_response(&key)).await.unwrap();

    let mut config = ClientConfig::default();
    config.send_timeout = std::time::Duration::from_millis(20);

    let (inbox_tx, inbox_rx) = tokio::sync::mpsc::unbounded_channel::<net::Inbox>();
    let handle = net::SessionHandle::from(inbox_tx);
    let drive_task = tokio::spawn(net::drive(session, client_read, client_write, config, inbox_rx));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // `server_io` never reads again, so the duplex pipe's small buffer
    // fills and this write stalls until `send_timeout` trips it.
    let big = Message::Binary(vec![0u8; 1 << 20]);
    handle.send_threadsafe(big).unwrap();

    let mut saw_send_timeout = false;
    let mut saw_abnormal_close = false;
    while let Some((timeout, close)) = events_rx.recv().await {
        if matches!(timeout, Some(TimeoutKind::Send)) {
            saw_send_timeout = true;
        }
        if let Some(outcome) = close {
            saw_abnormal_close = !outcome.was_clean;
        }
    }
    assert!(saw_send_timeout, "expected on_timeout(Send) to fire");
    assert!(saw_abnormal_close, "expected the session to close unclean after the stalled write");

    drive_task.await.unwrap();
}
