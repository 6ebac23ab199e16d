//! The session controller: owns the handshake, the lifecycle state
//! machine, the close handshake, and callback dispatch. This is the
//! sans-io heart of the engine: `feed`/`begin_handshake`/`close*` never
//! touch a socket, they only consume bytes and produce bytes plus
//! callback invocations; `net.rs` is what actually drives a transport.
//!
//! Grounded on `read.rs::poll_messages`'s ping/pong/close dispatch shape
//! and `server.rs`'s connection-acceptance structure, restructured
//! client-side around an explicit lifecycle state table, plus
//! `close_immediately`/`close_with_status`/`user_state` operations
//! carried over from a C WebSocket client's callback surface.

use std::any::Any;

use log::{debug, info, warn};

use crate::assembler::{AssemblerEvent, MessageAssembler};
use crate::callbacks::{CloseOutcome, Handlers};
use crate::config::ClientConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::frame::close_code;
use crate::handshake::{self, HandshakeRequest};
use crate::message::Message;
use crate::sender::{self, MaskKeySource, RandomMaskKeys};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Dns,
    Connecting,
    Handshaking,
    Connected,
    ClosingSent,
    ClosingRecv,
    Closed,
}

/// Drives one WebSocket connection's protocol state, independent of any
/// transport or runtime.
pub struct Session<H: Handlers> {
    state: State,
    config: ClientConfig,
    handshake_request: Option<HandshakeRequest>,
    handshake_buf: Vec<u8>,
    assembler: MessageAssembler,
    keys: Box<dyn MaskKeySource + Send>,
    handlers: H,
    user_state: Option<Box<dyn Any + Send>>,
    ping_inflight: Option<Vec<u8>>,
    accumulate_messages: bool,
    close_sent: bool,
    close_recv: bool,
}

impl<H: Handlers> Session<H> {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        use_tls: bool,
        path: impl Into<String>,
        config: ClientConfig,
        handlers: H,
    ) -> Self {
        let host = host.into();
        let path = path.into();
        let max_message_size = config.web_socket_config.max_message_size;
        let default_port = if use_tls { 443 } else { 80 };
        let host_header = if port == default_port { host } else { format!("{host}:{port}") };
        let mut request = HandshakeRequest::new(host_header, path);
        request.origin = config.origin.clone();
        request.subprotocols = config.subprotocols.clone();
        request.extra_headers = config.extra_headers().to_vec();

        Self {
            state: State::Init,
            config,
            handshake_request: Some(request),
            handshake_buf: Vec::new(),
            assembler: MessageAssembler::new(max_message_size),
            keys: Box::new(RandomMaskKeys),
            handlers,
            user_state: None,
            ping_inflight: None,
            accumulate_messages: false,
            close_sent: false,
            close_recv: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The `Sec-WebSocket-Key` this session will send (or already sent)
    /// with its opening handshake. `None` once the handshake response has
    /// been validated and the request is no longer retained.
    pub fn handshake_key(&self) -> Option<&str> {
        self.handshake_request.as_ref().map(|r| r.key.as_str())
    }

    /// Only materializes message-level accumulation when the caller
    /// actually wants whole-message callbacks.
    pub fn enable_message_accumulation(&mut self, enabled: bool) {
        self.accumulate_messages = enabled;
        self.assembler.set_accumulate(enabled);
    }

    pub fn user_state(&self) -> Option<&(dyn Any + Send)> {
        self.user_state.as_deref()
    }

    pub fn set_user_state(&mut self, state: Box<dyn Any + Send>) {
        self.user_state = Some(state);
    }

    pub fn handlers_mut(&mut self) -> &mut H {
        &mut self.handlers
    }

    /// Transport reports the DNS/connect phase has started. Pure
    /// bookkeeping; the transport owns the actual resolution.
    pub fn begin_connecting(&mut self) {
        self.state = State::Connecting;
    }

    /// Transport finished connecting (TCP/TLS up): render and return the
    /// HTTP upgrade request bytes, and move to HANDSHAKING.
    pub fn begin_handshake(&mut self) -> Vec<u8> {
        self.state = State::Handshaking;
        let request = self.handshake_request.as_ref().expect("handshake request always present before CLOSED");
        let bytes = request.render();
        debug!("sending handshake request ({} bytes)", bytes.len());
        bytes
    }

    /// Feeds newly-received transport bytes. Returns bytes the caller
    /// must write back to the transport (auto-pong, close echoes; the
    /// handshake request is NOT included here, see `begin_handshake`).
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        match self.state {
            State::Handshaking => self.feed_handshake(bytes),
            State::Connected | State::ClosingSent | State::ClosingRecv => self.feed_frames(bytes),
            State::Closed => Ok(Vec::new()),
            _ => Err(Error::Internal("feed called before the transport connected".into())),
        }
    }

    fn feed_handshake(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.handshake_buf.extend_from_slice(bytes);
        let request = self.handshake_request.take().expect("handshake request present while HANDSHAKING");

        match handshake::parse_response(&self.handshake_buf, &request) {
            Ok(None) => {
                self.handshake_request = Some(request);
                Ok(Vec::new())
            }
            Ok(Some((_response, consumed))) => {
                let leftover = self.handshake_buf.split_off(consumed);
                self.handshake_buf.clear();
                self.state = State::Connected;
                info!("handshake complete, session connected");
                self.handlers.on_connect();
                self.feed_frames(&leftover)
            }
            Err(e) => {
                warn!("handshake failed: {e}");
                self.state = State::Closed;
                self.handlers.on_error(&e);
                self.handlers.on_close(CloseOutcome {
                    status: None,
                    reason: String::new(),
                    was_clean: false,
                });
                Err(e)
            }
        }
    }

    fn feed_frames(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for event in self.assembler.process(bytes) {
            match event {
                AssemblerEvent::MessageBegin(opcode) => self.handlers.on_frame_begin(opcode),
                AssemblerEvent::FrameData(chunk) => self.handlers.on_frame_data(&chunk),
                AssemblerEvent::FrameEnd => self.handlers.on_frame_end(),
                AssemblerEvent::Message { opcode, payload } => {
                    if self.accumulate_messages {
                        if let Ok(message) = Message::from_parts(opcode, payload) {
                            self.handlers.on_message(message);
                        }
                    }
                }
                AssemblerEvent::Ping(payload) => {
                    self.handlers.on_ping(&payload);
                    sender::send_pong(&payload, &mut *self.keys, &mut out)?;
                }
                AssemblerEvent::Pong(payload) => {
                    if self.ping_inflight.as_deref() == Some(payload.as_slice()) {
                        self.ping_inflight = None;
                    }
                    self.handlers.on_pong(&payload);
                }
                AssemblerEvent::Close(info) => {
                    let was_clean = self.on_peer_close(info.status, &info.reason, &mut out)?;
                    self.handlers.on_close(CloseOutcome {
                        status: info.status,
                        reason: info.reason,
                        was_clean,
                    });
                }
                AssemblerEvent::Error(e) => {
                    self.handle_protocol_error(e, &mut out)?;
                }
            }
        }
        Ok(out)
    }

    fn on_peer_close(&mut self, status: Option<u16>, reason: &str, out: &mut Vec<u8>) -> Result<bool> {
        self.close_recv = true;
        match self.state {
            State::ClosingSent => {
                // We sent first; peer's CLOSE completes the handshake.
                self.state = State::Closed;
                Ok(true)
            }
            _ => {
                self.state = State::ClosingRecv;
                let echo_status = status.unwrap_or(close_code::NORMAL);
                sender::send_close(Some(echo_status), reason, &mut *self.keys, out)?;
                self.close_sent = true;
                self.state = State::Closed;
                Ok(true)
            }
        }
    }

    fn handle_protocol_error(&mut self, error: Error, out: &mut Vec<u8>) -> Result<()> {
        let status = match error {
            Error::Protocol(ProtocolError::InvalidUtf8) => close_code::INVALID_PAYLOAD,
            Error::MessageTooBig => close_code::MESSAGE_TOO_BIG,
            _ => close_code::PROTOCOL_ERROR,
        };
        warn!("protocol error, closing: {error}");
        self.handlers.on_error(&error);
        if !self.close_sent {
            sender::send_close(Some(status), "", &mut *self.keys, out)?;
            self.close_sent = true;
        }
        let was_clean = self.close_recv;
        self.state = State::Closed;
        self.handlers.on_close(CloseOutcome {
            status: Some(status),
            reason: String::new(),
            was_clean,
        });
        Ok(())
    }

    /// Reports a message-too-big condition raised by the caller (e.g. the
    /// transport enforcing its own cap before handing bytes to `feed`).
    pub fn fail_message_too_big(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.handlers.on_error(&Error::MessageTooBig);
        if !self.close_sent {
            sender::send_close(Some(close_code::MESSAGE_TOO_BIG), "", &mut *self.keys, &mut out)?;
            self.close_sent = true;
        }
        let was_clean = self.close_recv;
        self.state = State::Closed;
        self.handlers.on_close(CloseOutcome {
            status: Some(close_code::MESSAGE_TOO_BIG),
            reason: String::new(),
            was_clean,
        });
        Ok(out)
    }

    /// Sends a whole text/binary message as a single (or, if it exceeds
    /// `max_frame_size`, fragmented) masked message.
    pub fn send_message(&mut self, message: &Message) -> Result<Vec<u8>> {
        if !matches!(self.state, State::Connected) {
            return Err(Error::SendOverflow);
        }
        let payload = message.as_binary();
        let max_frame_size = self.config.web_socket_config.max_frame_size.unwrap_or(0);
        let mut out = Vec::new();
        if max_frame_size == 0 || (payload.len() as u64) <= max_frame_size {
            sender::send_message(message.opcode(), &payload, &mut *self.keys, &mut out)?;
        } else {
            let mut fragmenter = sender::MessageSender::new();
            fragmenter.msg_begin(message.opcode())?;
            let chunks: Vec<&[u8]> = payload.chunks(max_frame_size as usize).collect();
            let (last, rest) = chunks.split_last().expect("non-empty: payload exceeds max_frame_size");
            for chunk in rest {
                fragmenter.msg_frame_send(chunk, &mut *self.keys, &mut out)?;
            }
            fragmenter.msg_end(last, &mut *self.keys, &mut out)?;
        }
        Ok(out)
    }

    /// Sends a PING with an application-supplied payload (≤ 125 bytes),
    /// arming pong-timeout bookkeeping.
    pub fn send_ping(&mut self, payload: Vec<u8>) -> Result<Vec<u8>> {
        if !matches!(self.state, State::Connected) {
            return Err(Error::SendOverflow);
        }
        let mut out = Vec::new();
        sender::send_ping(&payload, &mut *self.keys, &mut out)?;
        self.ping_inflight = Some(payload);
        Ok(out)
    }

    /// Called by the session driver when `pong_timeout` elapses with no
    /// matching PONG. Does not itself close the session unless the user's
    /// `on_pong_timeout` handler requests it.
    pub fn on_pong_timeout(&mut self) {
        if self.ping_inflight.take().is_some() {
            self.handlers.on_pong_timeout();
        }
    }

    /// Normal close: status 1000, empty reason.
    pub fn close(&mut self) -> Result<Vec<u8>> {
        self.close_with_status(close_code::NORMAL, "")
    }

    /// Locally-initiated close handshake with an explicit status/reason.
    /// Corresponds to `libws.h`'s `ws_close_with_status_reason`.
    pub fn close_with_status(&mut self, status: u16, reason: &str) -> Result<Vec<u8>> {
        if matches!(self.state, State::Closed) {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        if !self.close_sent {
            sender::send_close(Some(status), reason, &mut *self.keys, &mut out)?;
            self.close_sent = true;
        }
        self.state = State::ClosingSent;
        Ok(out)
    }

    /// Tears the session down without attempting a close handshake.
    /// Corresponds to `libws.h`'s `ws_close_immediately`.
    pub fn close_immediately(&mut self, reason: &str) {
        self.state = State::Closed;
        self.handlers.on_close(CloseOutcome {
            status: None,
            reason: reason.to_string(),
            was_clean: false,
        });
    }

    /// Called by the driver on transport EOF or a fatal transport error
    /// while the session was not already cleanly closed.
    pub fn on_transport_eof(&mut self) {
        if matches!(self.state, State::Closed) {
            return;
        }
        let was_clean = self.close_sent && self.close_recv;
        self.state = State::Closed;
        self.handlers.on_close(CloseOutcome {
            status: Some(close_code::ABNORMAL),
            reason: String::new(),
            was_clean,
        });
    }
}
