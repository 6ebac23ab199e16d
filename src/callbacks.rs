//! The session's event handler surface.
//!
//! The original C library (`libws.h`) exposes this as a family of
//! `ws_set_onXXX_cb(ws_t, fn_ptr, void *arg)` registrations, one
//! function pointer and one opaque user pointer per event kind
//! (`ws_set_onconnect_cb`, `ws_set_onmsg_cb`, `ws_set_onmsg_frame_cb`,
//! `ws_set_onping_cb`, and so on), each with a documented default
//! (`ws_default_msg_begin_cb` etc.) that runs when nothing is registered.
//! Rust has no opaque-pointer-plus-function-pointer idiom; the natural
//! translation is a single trait with a default (mostly no-op) method per
//! event, so implementors override only the callbacks they care about,
//! the same "most defaults are fine" shape libws.h offers via its
//! per-callback defaults, minus the manual `void *arg` threading.

use crate::error::{Error, TimeoutKind};
use crate::frame::OpCode;
use crate::message::Message;

/// How the session ended. Every terminal error reaches the user exactly
/// once via `on_close(status, reason, was_clean)`.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub status: Option<u16>,
    pub reason: String,
    /// True only when both peers sent and received a CLOSE frame before
    /// the transport closed.
    pub was_clean: bool,
}

/// Implemented by callers of [`crate::session::Session`] to observe
/// connection lifecycle, framing, and message events. Every method has a
/// no-op default; override only what you need.
pub trait Handlers: Send {
    /// The opening handshake completed and the session is ready to send
    /// and receive. Corresponds to `ws_set_onconnect_cb`.
    fn on_connect(&mut self) {}

    /// A complete, reassembled message arrived. Only invoked when message
    /// accumulation is enabled on the `Session` (the `net` driver turns
    /// this on by default; a hand-driven `Session` must opt in itself via
    /// `enable_message_accumulation`). Corresponds to `ws_set_onmsg_cb`.
    fn on_message(&mut self, _message: Message) {}

    /// A new frame started. Corresponds to `ws_set_onmsg_frame_cb`'s
    /// `WS_FRAME_STATE_BEGIN` case (frame-level streaming API, always
    /// invoked regardless of whether message accumulation is on).
    fn on_frame_begin(&mut self, _opcode: OpCode) {}

    /// A chunk of the current frame's payload is available.
    fn on_frame_data(&mut self, _data: &[u8]) {}

    /// The current frame ended.
    fn on_frame_end(&mut self) {}

    /// A PING was received (and already auto-answered with a PONG by the
    /// session; this is purely observational, mirroring
    /// `ws_set_onping_cb`).
    fn on_ping(&mut self, _payload: &[u8]) {}

    /// A PONG was received. Corresponds to `ws_set_onpong_cb`.
    fn on_pong(&mut self, _payload: &[u8]) {}

    /// A PONG wasn't received within the configured pong timeout.
    /// Corresponds to `ws_onpong_default_cb`'s documented "no pong"
    /// escalation path.
    fn on_pong_timeout(&mut self) {}

    /// The close handshake finished (either side-initiated) and the
    /// session is now closed.
    fn on_close(&mut self, _outcome: CloseOutcome) {}

    /// The transport became writable again after backpressure. No direct
    /// libws.h equivalent (that library's eventloop integration handled
    /// this internally); exposed here since the transport is abstracted.
    fn on_writable(&mut self) {}

    /// A timer fired. Corresponds to `ws_handle_marshall_timer_cb`'s
    /// dispatch, generalized over which timer (connect, recv, send, pong).
    fn on_timeout(&mut self, _which: TimeoutKind) {}

    /// A fatal or protocol-level error occurred; the session will close.
    fn on_error(&mut self, _error: &Error) {}
}

/// A `Handlers` implementation that does nothing, for callers who only
/// want to drive the state machine and inspect return values rather than
/// install callbacks.
#[derive(Default)]
pub struct NoopHandlers;

impl Handlers for NoopHandlers {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        connects: u32,
    }

    impl Handlers for Counting {
        fn on_connect(&mut self) {
            self.connects += 1;
        }
    }

    #[test]
    fn default_methods_are_overridable_selectively() {
        let mut h = Counting { connects: 0 };
        h.on_connect();
        h.on_ping(b"x"); // default no-op, must not panic
        assert_eq!(h.connects, 1);
    }

    #[test]
    fn noop_handlers_accepts_every_event_without_panicking() {
        let mut h = NoopHandlers;
        h.on_connect();
        h.on_frame_begin(OpCode::Text);
        h.on_frame_data(b"abc");
        h.on_frame_end();
        h.on_ping(b"");
        h.on_pong(b"");
        h.on_pong_timeout();
        h.on_close(CloseOutcome {
            status: None,
            reason: String::new(),
            was_clean: false,
        });
        h.on_writable();
        h.on_timeout(TimeoutKind::Recv);
    }
}
