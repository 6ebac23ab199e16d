//! The client-side opening handshake (RFC 6455 §4).
//!
//! The server-role version of this file only ever read a raw
//! `Sec-WebSocket-Key` line by hand with `str::find`/`lines` and wrote
//! back a templated response. This engine is a client, so the
//! request/response roles are reversed; the accept-key derivation
//! (`SHA1(key + GUID)`, base64-encoded) is the one piece of that logic
//! that carries over unchanged (`generate_websocket_accept_value`), and
//! the response is now parsed with `httparse` rather than ad hoc string
//! scanning, since a client must additionally check the status line and
//! tolerate a response spread across several reads.

use base64::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_HEADERS: usize = 32;

/// Draws a fresh, random 16-byte `Sec-WebSocket-Key`, base64-encoded, as
/// RFC 6455 §4.1 requires ("a randomly selected 16-byte value... base64
/// encoded").
pub fn generate_key() -> String {
    let mut rng = StdRng::from_rng(rand::thread_rng());
    let mut raw = [0u8; 16];
    rng.fill(&mut raw);
    BASE64_STANDARD.encode(raw)
}

fn accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Everything needed to build and later validate one handshake.
pub struct HandshakeRequest {
    pub key: String,
    pub host: String,
    pub path: String,
    pub origin: Option<String>,
    pub subprotocols: Vec<String>,
    pub extra_headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: generate_key(),
            host: host.into(),
            path: path.into(),
            origin: None,
            subprotocols: Vec::new(),
            extra_headers: Vec::new(),
        }
    }

    /// Renders the HTTP/1.1 upgrade request, per RFC 6455 §4.1/§4.2.1.
    pub fn render(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("GET {} HTTP/1.1\r\n", self.path));
        out.push_str(&format!("Host: {}\r\n", self.host));
        out.push_str("Upgrade: websocket\r\n");
        out.push_str("Connection: Upgrade\r\n");
        out.push_str(&format!("Sec-WebSocket-Key: {}\r\n", self.key));
        out.push_str("Sec-WebSocket-Version: 13\r\n");
        if let Some(origin) = &self.origin {
            out.push_str(&format!("Origin: {}\r\n", origin));
        }
        if !self.subprotocols.is_empty() {
            out.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", self.subprotocols.join(", ")));
        }
        for (name, value) in &self.extra_headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub subprotocol: Option<String>,
}

/// Parses and validates a server response against the request that
/// produced it. `buf` may contain trailing bytes past the header block
/// (the start of the first WebSocket frame, if the server pipelined one);
/// the number of bytes the header block consumed is returned alongside.
///
/// Returns `Ok(None)` when `buf` doesn't yet hold a complete header
/// block, so the caller can feed more bytes and retry.
pub fn parse_response(buf: &[u8], request: &HandshakeRequest) -> Result<Option<(HandshakeResponse, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);

    let consumed = match response.parse(buf)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    match response.code {
        Some(101) => {}
        Some(code) => return Err(Error::HandshakeHttpStatus(code.to_string())),
        None => return Err(Error::IncompleteHttpResponse),
    }

    let header_value = |name: &str| -> Option<&str> {
        response
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .and_then(|h| std::str::from_utf8(h.value).ok())
    };

    let upgrade = header_value("Upgrade").ok_or(Error::HandshakeMissingHeader("Upgrade"))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::HandshakeMissingHeader("Upgrade"));
    }

    let connection = header_value("Connection").ok_or(Error::HandshakeMissingHeader("Connection"))?;
    if !connection.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")) {
        return Err(Error::HandshakeMissingHeader("Connection"));
    }

    let accept = header_value("Sec-WebSocket-Accept").ok_or(Error::HandshakeMissingHeader("Sec-WebSocket-Accept"))?;
    if accept != accept_value(&request.key) {
        return Err(Error::HandshakeBadAccept);
    }

    if header_value("Sec-WebSocket-Extensions").is_some() {
        return Err(Error::HandshakeExtensionNotSupported);
    }

    let subprotocol = match header_value("Sec-WebSocket-Protocol") {
        Some(proto) => {
            if !request.subprotocols.iter().any(|p| p == proto) {
                return Err(Error::HandshakeSubprotocolNotOffered);
            }
            Some(proto.to_string())
        }
        None => None,
    };

    Ok(Some((HandshakeResponse { subprotocol }, consumed)))
}
