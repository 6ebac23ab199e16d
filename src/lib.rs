//! A client-side implementation of the [WebSocket Protocol (RFC
//! 6455)](https://datatracker.ietf.org/doc/html/rfc6455): a sans-io
//! framing/handshake/session engine plus a tokio-driven transport.
//!
//! The protocol core (`mask`, `header`, `parser`, `assembler`, `sender`,
//! `handshake`, `session`) never touches a socket: it consumes byte
//! slices and produces byte buffers plus callback invocations. [`net`]
//! drives that core against a real `tokio::net::TcpStream`, optionally
//! wrapped in TLS via `tokio-rustls`.
//!
//! A minimal client looks like:
//!
//! ```no_run
//! use wsclient_core::callbacks::Handlers;
//! use wsclient_core::config::ClientConfig;
//! use wsclient_core::message::Message;
//!
//! struct Echo;
//! impl Handlers for Echo {
//!     fn on_message(&mut self, message: Message) {
//!         println!("got: {message:?}");
//!     }
//! }
//!
//! # async fn run() -> wsclient_core::error::Result<()> {
//! let handle = wsclient_core::net::connect_url(
//!     "ws://echo.example.com/",
//!     ClientConfig::default(),
//!     Echo,
//! ).await?;
//! handle.send_threadsafe(Message::Text("hello".into()))?;
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod header;
pub mod mask;
pub mod message;
pub mod net;
pub mod parser;
pub mod rate_limit;
pub mod sender;
pub mod session;
