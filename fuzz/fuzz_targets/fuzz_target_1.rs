#![no_main]

use libfuzzer_sys::fuzz_target;
use wsclient_core::handshake::{parse_response, HandshakeRequest};
use wsclient_core::parser::FrameParser;

/// Feeds arbitrary bytes through both the incremental frame parser and the
/// handshake response parser. Neither touches a socket, so there's no setup
/// beyond the input bytes themselves.
///
/// The first byte picks a split point: everything before it is chewed on as
/// a (possibly truncated) handshake response, everything after as wire
/// frame bytes fed to the parser in small chunks to exercise the
/// byte-at-a-time resumption path. Both parsers must return a value or a
/// typed error for any input and never panic.
fuzz_target!(|data: &[u8]| {
    let split = data.first().copied().unwrap_or(0) as usize % (data.len() + 1);
    let (head, tail) = data.split_at(split);

    let request = HandshakeRequest::new("example.com", "/");
    let _ = parse_response(head, &request);

    let mut parser = FrameParser::new();
    for chunk in tail.chunks(3) {
        let _ = parser.feed(chunk);
    }
});
