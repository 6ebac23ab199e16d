//! Client and per-connection configuration.
//!
//! Grounded on the original `config.rs` (the `ClientConfig`/
//! `WebSocketConfig` split, and `WebSocketConfig::default()`'s scale),
//! extended with header/subprotocol/timeout/rate-limit fields that a
//! single-connection-server use case never needed.

use std::time::Duration;

use crate::error::Error;

/// How the transport should treat TLS. `AllowSelfSigned` is a
/// development-mode escape hatch for self-signed certs during local
/// testing; production code should use `Verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Plain `ws://`, no TLS.
    #[default]
    Off,
    /// `wss://` with full certificate verification against the bundled
    /// `webpki-roots` trust anchors.
    Verify,
    /// `wss://` but trusting any server certificate. Never use this
    /// outside of local development.
    AllowSelfSigned,
}

/// Frame/message size ceilings, separate from the handshake/header
/// configuration since they govern the running connection rather than
/// its setup.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConfig {
    pub max_frame_size: Option<u64>,
    pub max_message_size: Option<u64>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: Some(16 << 20),
            max_message_size: Some(64 << 20),
        }
    }
}

/// Header names that callers may never override directly, because the
/// handshake logic owns them. Checked case-insensitively, per RFC 6455
/// §4.1's header list and `libws.h`'s equivalent guard around
/// user-supplied extra headers.
const PROTOCOL_CRITICAL_HEADERS: &[&str] = &[
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-accept",
    "sec-websocket-protocol",
    "sec-websocket-extensions",
];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub web_socket_config: WebSocketConfig,
    pub tls_policy: TlsPolicy,
    pub origin: Option<String>,
    pub subprotocols: Vec<String>,
    extra_headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub recv_timeout: Duration,
    pub send_timeout: Duration,
    pub pong_timeout: Duration,
    pub read_rate: Option<u32>,
    pub read_burst: u32,
    pub write_rate: Option<u32>,
    pub write_burst: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            web_socket_config: WebSocketConfig::default(),
            tls_policy: TlsPolicy::default(),
            origin: None,
            subprotocols: Vec::new(),
            extra_headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            recv_timeout: Duration::from_secs(60),
            send_timeout: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(10),
            read_rate: None,
            read_burst: 0,
            write_rate: None,
            write_burst: 0,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Result<Self, Error> {
        let protocol = protocol.into();
        if self.subprotocols.contains(&protocol) {
            return Err(Error::DuplicateSubprotocol(protocol));
        }
        self.subprotocols.push(protocol);
        Ok(self)
    }

    pub fn with_tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.tls_policy = policy;
        self
    }

    /// Adds a header to be sent with the opening handshake. Rejects
    /// protocol-critical header names (`Host`, `Upgrade`, `Connection`,
    /// any `Sec-WebSocket-*`) since the handshake logic owns those.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        if PROTOCOL_CRITICAL_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(&name)) {
            return Err(Error::ProtocolCriticalHeader(
                PROTOCOL_CRITICAL_HEADERS
                    .iter()
                    .find(|h| h.eq_ignore_ascii_case(&name))
                    .unwrap(),
            ));
        }
        self.extra_headers.push((name, value.into()));
        Ok(())
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }
}
