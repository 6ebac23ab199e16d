//! Opens many concurrent connections against a local echo server, sends a
//! fixed number of round-trip messages on each, and reports the average
//! per-message latency. Not wired into the workspace as a `[[bin]]` (no
//! harness example does either); run it ad hoc against a running server:
//!
//! ```text
//! rustc --edition 2021 -L target/debug/deps --extern wsclient_core=... benchmarking/load_generator.rs
//! ```

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use wsclient_core::callbacks::Handlers;
use wsclient_core::config::ClientConfig;
use wsclient_core::message::Message;

struct Echoed {
    connected: Option<mpsc::UnboundedSender<()>>,
    replies: mpsc::UnboundedSender<()>,
}

impl Handlers for Echoed {
    fn on_connect(&mut self) {
        if let Some(tx) = self.connected.take() {
            let _ = tx.send(());
        }
    }

    fn on_message(&mut self, _message: Message) {
        let _ = self.replies.send(());
    }
}

#[tokio::main]
async fn main() {
    let url = "ws://127.0.0.1:9002";
    let connection_count = 100;
    let message_count = 1000;
    let message_size = 16384;

    let (durations_tx, mut durations_rx) = mpsc::unbounded_channel();

    for _ in 0..connection_count {
        let durations_tx = durations_tx.clone();
        tokio::spawn(async move {
            let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
            let (replies_tx, mut replies_rx) = mpsc::unbounded_channel();
            let handlers = Echoed { connected: Some(connected_tx), replies: replies_tx };
            let handle = wsclient_core::net::connect_url(url, ClientConfig::default(), handlers)
                .await
                .expect("connect");
            connected_rx.recv().await.expect("handshake completes");

            let payload = vec![b'a'; message_size];
            let start = Instant::now();

            for _ in 0..message_count {
                handle
                    .send_threadsafe(Message::Binary(payload.clone()))
                    .expect("session still running");
                replies_rx.recv().await.expect("echo reply");
            }

            let _ = durations_tx.send(start.elapsed());
        });
    }

    drop(durations_tx);

    let mut total_duration = Duration::new(0, 0);
    let mut completed = 0u32;
    while let Some(duration) = durations_rx.recv().await {
        total_duration += duration;
        completed += 1;
    }

    let avg_latency = total_duration / (completed * message_count as u32).max(1);
    println!("connections completed: {completed}/{connection_count}");
    println!("average latency: {avg_latency:?}");
}
