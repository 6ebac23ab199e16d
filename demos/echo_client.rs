//! Connects to a WebSocket echo server, sends a few messages, and prints
//! whatever comes back. Run against any RFC 6455 echo endpoint:
//!
//! ```text
//! cargo run --example echo_client -- ws://127.0.0.1:9002
//! ```

use std::time::Duration;

use wsclient_core::callbacks::{CloseOutcome, Handlers};
use wsclient_core::config::ClientConfig;
use wsclient_core::message::Message;

struct PrintingHandlers;

impl Handlers for PrintingHandlers {
    fn on_connect(&mut self) {
        log::info!("connected");
    }

    fn on_message(&mut self, message: Message) {
        match message {
            Message::Text(text) => println!("text: {text}"),
            Message::Binary(data) => println!("binary: {} bytes", data.len()),
        }
    }

    fn on_close(&mut self, outcome: CloseOutcome) {
        log::info!(
            "closed: status={:?} reason={:?} clean={}",
            outcome.status,
            outcome.reason,
            outcome.was_clean
        );
    }

    fn on_error(&mut self, error: &wsclient_core::error::Error) {
        log::warn!("error: {error}");
    }
}

#[tokio::main]
async fn main() -> wsclient_core::error::Result<()> {
    env_logger::init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9002".to_string());

    let config = ClientConfig::default()
        .with_subprotocol("echo")
        .expect("a single subprotocol never collides with itself");

    let handle = wsclient_core::net::connect_url(&url, config, PrintingHandlers).await?;

    for i in 0..3 {
        handle.send_threadsafe(Message::Text(format!("hello #{i}")))?;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    handle.close_threadsafe(1000, "done")?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
