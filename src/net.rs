//! The tokio transport driver that turns the sans-io session into a
//! running connection.
//!
//! `session.rs` is sans-io on purpose: it never touches a socket. This
//! module is what `server.rs`/`stream.rs` did for the accept-a-connection
//! side, generalized to the client-connect side: open a TCP (optionally
//! TLS, via `tokio-rustls`/`webpki-roots`, mirroring a `Plain`/`Secure`
//! stream split) stream, drive `Session::feed`/`begin_handshake` off it,
//! arm the recv/pong timers, and expose the single thread-safe contract
//! (`SessionHandle::send_threadsafe`/`close_threadsafe`) backed by an
//! mpsc inbox the session task drains.

use std::io;
use std::net::ToSocketAddrs as _;
use std::sync::Arc;

use log::{debug, warn};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::callbacks::Handlers;
use crate::config::{ClientConfig, TlsPolicy};
use crate::error::{Error, Result, TimeoutKind};
use crate::message::Message;
use crate::rate_limit::TokenBucket;
use crate::session::{Session, State};

/// Either a plain or TLS-wrapped TCP stream.
enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    fn split(self) -> (ReadHalf<Stream>, WriteHalf<Stream>) {
        tokio::io::split(self)
    }
}

impl tokio::io::AsyncRead for Stream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => std::pin::Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for Stream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => std::pin::Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => std::pin::Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => std::pin::Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => std::pin::Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Accepts any certificate without validation. Only reachable via
/// `TlsPolicy::AllowSelfSigned`, an explicit opt-in for self-signed
/// development endpoints.
#[derive(Debug)]
struct AcceptAnyCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn tls_connector(policy: TlsPolicy) -> TlsConnector {
    let config = match policy {
        TlsPolicy::AllowSelfSigned => rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth(),
        _ => {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
    };
    TlsConnector::from(Arc::new(config))
}

/// A request a foreign thread wants the session task to perform, the
/// only cross-thread contract this crate allows. Public so embedders
/// driving a custom transport via [`drive`] can feed their own inbox.
pub enum Inbox {
    Send(Message),
    Ping(Vec<u8>),
    Close(u16, String),
}

/// A handle that may be cloned and sent to other threads: send/ping/close
/// calls enqueue onto an inbox drained by the task that owns the session.
#[derive(Clone)]
pub struct SessionHandle {
    inbox: mpsc::UnboundedSender<Inbox>,
}

impl From<mpsc::UnboundedSender<Inbox>> for SessionHandle {
    /// Wraps an inbox sender obtained alongside a [`drive`] call into a
    /// cloneable handle, for callers driving a custom transport.
    fn from(inbox: mpsc::UnboundedSender<Inbox>) -> Self {
        Self { inbox }
    }
}

impl SessionHandle {
    pub fn send_threadsafe(&self, message: Message) -> Result<()> {
        self.inbox
            .send(Inbox::Send(message))
            .map_err(|_| Error::Internal("session task is gone".into()))
    }

    pub fn ping_threadsafe(&self, payload: Vec<u8>) -> Result<()> {
        self.inbox
            .send(Inbox::Ping(payload))
            .map_err(|_| Error::Internal("session task is gone".into()))
    }

    pub fn close_threadsafe(&self, status: u16, reason: impl Into<String>) -> Result<()> {
        self.inbox
            .send(Inbox::Close(status, reason.into()))
            .map_err(|_| Error::Internal("session task is gone".into()))
    }
}

fn host_port(host: &str, port: u16, use_tls: bool) -> Result<(String, u16)> {
    let _ = use_tls;
    Ok((host.to_string(), port))
}

/// Resolves `host:port` up front via the blocking stdlib resolver on a
/// worker thread, so the session can report a DNS state distinct from
/// CONNECTING even though `tokio::net` would otherwise resolve lazily
/// inside `TcpStream::connect`.
async fn resolve(host: &str, port: u16) -> Result<std::net::SocketAddr> {
    let owned = format!("{host}:{port}");
    tokio::task::spawn_blocking(move || {
        owned
            .to_socket_addrs()
            .map_err(|e| Error::DnsFailure(e.to_string()))?
            .next()
            .ok_or_else(|| Error::DnsFailure(format!("no addresses for {owned}")))
    })
    .await
    .map_err(|e| Error::Internal(e.to_string()))?
}

/// Connects to `ws(s)://host:port/path` and drives the session to
/// completion, dispatching every event to `handlers` on this task.
/// Returns once the session reaches `CLOSED`. Mirrors the shape of
/// `start_server_with_config` but for the client-connect path.
pub async fn connect<H: Handlers + 'static>(
    host: &str,
    port: u16,
    path: &str,
    use_tls: bool,
    config: ClientConfig,
    handlers: H,
) -> Result<SessionHandle> {
    let (host, port) = host_port(host, port, use_tls)?;
    let mut session = Session::new(host.clone(), port, use_tls, path.to_string(), config.clone(), handlers);
    // The `Handlers` trait can't tell us whether `on_message` was overridden,
    // so accumulation is on unconditionally here; a `NoopHandlers`/streaming-only
    // consumer just pays for a buffer it never reads.
    session.enable_message_accumulation(true);

    session.begin_connecting();
    let addr = tokio::time::timeout(config.connect_timeout, resolve(&host, port))
        .await
        .map_err(|_| Error::Timeout(TimeoutKind::Connect))??;

    let tcp = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(TimeoutKind::Connect))??;
    tcp.set_nodelay(true).ok();

    let stream = if use_tls {
        let connector = tls_connector(config.tls_policy);
        let server_name = ServerName::try_from(host.clone())
            .map_err(|_| Error::TlsFailure("invalid server name".into()))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::TlsFailure(e.to_string()))?;
        Stream::Tls(Box::new(tls))
    } else {
        Stream::Plain(tcp)
    };

    let (read_half, mut write_half) = stream.split();

    let handshake_bytes = session.begin_handshake();
    match write_with_deadline(&mut write_half, &handshake_bytes, config.send_timeout).await {
        Ok(()) => {}
        Err(SendFailure::TimedOut) => return Err(Error::Timeout(TimeoutKind::Send)),
        Err(SendFailure::TransportClosed) => return Err(Error::TransportEof),
    }

    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<Inbox>();
    let handle = SessionHandle { inbox: inbox_tx };

    tokio::spawn(drive(session, read_half, write_half, config, inbox_rx));

    Ok(handle)
}

/// Writes `out` within `send_timeout`, the "send queue non-empty with no
/// writable progress" timer made concrete for a transport with no queue
/// of its own: a single stalled `write_all` call is exactly that state.
async fn write_with_deadline<W: tokio::io::AsyncWrite + Unpin>(
    write_half: &mut W,
    out: &[u8],
    send_timeout: std::time::Duration,
) -> std::result::Result<(), SendFailure> {
    match tokio::time::timeout(send_timeout, write_half.write_all(out)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(SendFailure::TransportClosed),
        Err(_) => Err(SendFailure::TimedOut),
    }
}

enum SendFailure {
    TimedOut,
    TransportClosed,
}

/// Drives an already-handshaking [`Session`] against any
/// `AsyncRead + AsyncWrite` halves until it reaches `CLOSED`. [`connect`]
/// is a thin wrapper over this for a real TCP/TLS socket; exposed
/// directly so embedders can plug in their own transport (an in-memory
/// pipe, a WASM socket shim, ...) instead of being hardwired to
/// `tokio::net`.
pub async fn drive<H, R, W>(
    mut session: Session<H>,
    mut read_half: R,
    mut write_half: W,
    config: ClientConfig,
    mut inbox_rx: mpsc::UnboundedReceiver<Inbox>,
) where
    H: Handlers,
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let now = std::time::Instant::now();
    let mut read_rate = config.read_rate.map(|rate| TokenBucket::new(config.read_burst.max(rate), rate, now));
    let mut write_rate = config.write_rate.map(|rate| TokenBucket::new(config.write_burst.max(rate), rate, now));
    let mut recv_deadline = Instant::now() + config.recv_timeout;
    let mut pong_deadline: Option<Instant> = None;
    let mut buf = [0u8; 16 * 1024];

    loop {
        if matches!(session.state(), State::Closed) {
            break;
        }

        tokio::select! {
            biased;

            n = read_half.read(&mut buf) => {
                match n {
                    Ok(0) => {
                        session.on_transport_eof();
                        break;
                    }
                    Ok(n) => {
                        recv_deadline = Instant::now() + config.recv_timeout;
                        // Token-bucket accounting only; rate limiting lives in
                        // the transport and never blocks the sans-io core.
                        if let Some(bucket) = read_rate.as_mut() {
                            bucket.try_take(n as u32, std::time::Instant::now());
                        }
                        match session.feed(&buf[..n]) {
                            Ok(out) => {
                                if !out.is_empty() {
                                    match write_with_deadline(&mut write_half, &out, config.send_timeout).await {
                                        Ok(()) => {}
                                        Err(SendFailure::TimedOut) => {
                                            session.handlers_mut().on_timeout(TimeoutKind::Send);
                                            session.on_transport_eof();
                                            break;
                                        }
                                        Err(SendFailure::TransportClosed) => {
                                            session.on_transport_eof();
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("session feed error: {e}");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("read error: {e}");
                        session.on_transport_eof();
                        break;
                    }
                }
            }

            maybe_msg = inbox_rx.recv() => {
                let written = match maybe_msg {
                    Some(Inbox::Send(message)) => match session.send_message(&message) {
                        Ok(out) => {
                            if let Some(bucket) = write_rate.as_mut() {
                                bucket.try_take(out.len() as u32, std::time::Instant::now());
                            }
                            Some(out)
                        }
                        Err(e) => {
                            warn!("dropped outbound message: {e}");
                            session.handlers_mut().on_error(&e);
                            None
                        }
                    },
                    Some(Inbox::Ping(payload)) => match session.send_ping(payload) {
                        Ok(out) => {
                            pong_deadline = Some(Instant::now() + config.pong_timeout);
                            Some(out)
                        }
                        Err(e) => {
                            warn!("dropped outbound ping: {e}");
                            session.handlers_mut().on_error(&e);
                            None
                        }
                    },
                    Some(Inbox::Close(status, reason)) => match session.close_with_status(status, &reason) {
                        Ok(out) => Some(out),
                        Err(e) => {
                            warn!("dropped close request: {e}");
                            session.handlers_mut().on_error(&e);
                            None
                        }
                    },
                    None => break,
                };

                if let Some(out) = written {
                    match write_with_deadline(&mut write_half, &out, config.send_timeout).await {
                        Ok(()) => {}
                        Err(SendFailure::TimedOut) => {
                            session.handlers_mut().on_timeout(TimeoutKind::Send);
                            session.on_transport_eof();
                            break;
                        }
                        Err(SendFailure::TransportClosed) => {
                            session.on_transport_eof();
                            break;
                        }
                    }
                }
            }

            _ = sleep_until(recv_deadline) => {
                debug!("recv_timeout elapsed");
                session.handlers_mut().on_timeout(TimeoutKind::Recv);
                session.on_transport_eof();
                break;
            }

            _ = async { sleep_until(pong_deadline.unwrap()).await }, if pong_deadline.is_some() => {
                session.handlers_mut().on_timeout(TimeoutKind::Pong);
                session.on_pong_timeout();
                pong_deadline = None;
            }
        }
    }
}

/// Convenience wrapper parsing a `ws://`/`wss://` URL the way
/// `construct_http_request` did, then delegating to [`connect`].
pub async fn connect_url<H: Handlers + 'static>(
    url: &str,
    config: ClientConfig,
    handlers: H,
) -> Result<SessionHandle> {
    let parsed = url::Url::parse(url)?;
    let use_tls = match parsed.scheme() {
        "ws" => false,
        "wss" => true,
        _ => return Err(Error::InvalidSchemeURL),
    };
    let host = parsed.host_str().ok_or(Error::URLNoHost)?.to_string();
    let port = parsed.port().unwrap_or(if use_tls { 443 } else { 80 });
    let path = if parsed.query().is_some() {
        format!("{}?{}", parsed.path(), parsed.query().unwrap())
    } else {
        parsed.path().to_string()
    };
    connect(&host, port, &path, use_tls, config, handlers).await
}
