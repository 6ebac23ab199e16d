use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::time::error::Elapsed;

/// The sub-reason for a [`Error::Protocol`] failure, per RFC 6455's framing
/// rules. Each variant maps to a specific wire-level validity check.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("a reserved bit was set with no negotiated extension")]
    RsvSet,
    #[error("invalid opcode")]
    BadOpcode,
    #[error("control frame payload larger than 125 bytes")]
    ControlTooBig,
    #[error("control frame was fragmented (fin=0)")]
    ControlFragmented,
    #[error("frame from server was masked")]
    ServerMasked,
    #[error("64-bit payload length had its high bit set")]
    LenHighBit,
    #[error("received a data frame while a message was already open")]
    UnexpectedCont,
    #[error("received a continuation frame with no message open")]
    MissingCont,
    #[error("text message payload was not valid UTF-8")]
    InvalidUtf8,
    #[error("close frame carried a reserved/disallowed status code")]
    CloseReservedStatus,
}

/// Which timer fired. See `Session`'s timer bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Connect,
    Recv,
    Send,
    Pong,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeoutKind::Connect => "connect",
            TimeoutKind::Recv => "recv",
            TimeoutKind::Send => "send",
            TimeoutKind::Pong => "pong",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    #[error("IO Error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("TLS failure: {0}")]
    TlsFailure(String),

    #[error("server responded with unexpected HTTP status: {0}")]
    HandshakeHttpStatus(String),

    #[error("handshake response missing required header: {0}")]
    HandshakeMissingHeader(&'static str),

    #[error("Sec-WebSocket-Accept did not match the expected value")]
    HandshakeBadAccept,

    #[error("server negotiated an extension we never offered")]
    HandshakeExtensionNotSupported,

    #[error("server negotiated a subprotocol we never offered")]
    HandshakeSubprotocolNotOffered,

    #[error("attempted to set a protocol-critical header: {0}")]
    ProtocolCriticalHeader(&'static str),

    #[error("{0}")]
    Protocol(ProtocolError),

    #[error("message exceeded the configured maximum size")]
    MessageTooBig,

    #[error("send attempted after the close handshake was started")]
    SendOverflow,

    #[error("{0} timed out")]
    Timeout(TimeoutKind),

    #[error("{source}")]
    TimeoutElapsed {
        #[from]
        source: Elapsed,
    },

    #[error("transport reached end of file")]
    TransportEof,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("{source}")]
    URLParseError {
        #[from]
        source: url::ParseError,
    },

    #[error("invalid scheme in WebSocket URL (expected ws:// or wss://)")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: httparse::Error,
    },

    #[error("incomplete HTTP response")]
    IncompleteHttpResponse,

    #[error("duplicate subprotocol offered: {0}")]
    DuplicateSubprotocol(String),
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Error::Protocol(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
