//! RFC 6455 §5.2 frame header encode/decode.
//!
//! `read.rs`/`write.rs` read the header with blocking
//! `read_exact` calls straight off a `BufReader`. The sans-io parser needs
//! an incremental decoder instead: `decode` is handed whatever bytes are
//! currently available and reports either `NeedMore(n)` (at least `n` more
//! bytes are required before it can make progress), `Ok` (a complete
//! header plus how many bytes it consumed), or a `ProtocolError`.

use crate::error::ProtocolError;
use crate::frame::{Header, OpCode};

pub enum Decoded {
    NeedMore(usize),
    Ok { header: Header, consumed: usize },
    Err(ProtocolError),
}

/// Attempts to decode a header from the start of `buf`. Never consumes
/// more than 14 bytes (the largest possible header: 2 + 8 extended length
/// + 4 mask key).
pub fn decode(buf: &[u8]) -> Decoded {
    if buf.len() < 2 {
        return Decoded::NeedMore(2 - buf.len());
    }

    let b0 = buf[0];
    let b1 = buf[1];

    let fin = b0 & 0b1000_0000 != 0;
    let rsv1 = b0 & 0b0100_0000 != 0;
    let rsv2 = b0 & 0b0010_0000 != 0;
    let rsv3 = b0 & 0b0001_0000 != 0;

    let opcode = match OpCode::from_byte(b0 & 0b0000_1111) {
        Ok(op) => op,
        Err(_) => return Decoded::Err(ProtocolError::BadOpcode),
    };

    if rsv1 || rsv2 || rsv3 {
        return Decoded::Err(ProtocolError::RsvSet);
    }

    if opcode.is_control() && !fin {
        return Decoded::Err(ProtocolError::ControlFragmented);
    }

    let masked = b1 & 0b1000_0000 != 0;
    let len_field = b1 & 0b0111_1111;

    if opcode.is_control() && len_field > 125 {
        return Decoded::Err(ProtocolError::ControlTooBig);
    }

    let mut pos = 2usize;
    let payload_len: u64 = match len_field {
        0..=125 => len_field as u64,
        126 => {
            if buf.len() < pos + 2 {
                return Decoded::NeedMore(pos + 2 - buf.len());
            }
            let v = u16::from_be_bytes([buf[pos], buf[pos + 1]]) as u64;
            pos += 2;
            v
        }
        127 => {
            if buf.len() < pos + 8 {
                return Decoded::NeedMore(pos + 8 - buf.len());
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[pos..pos + 8]);
            pos += 8;
            let v = u64::from_be_bytes(raw);
            if v & 0x8000_0000_0000_0000 != 0 {
                return Decoded::Err(ProtocolError::LenHighBit);
            }
            v
        }
        _ => unreachable!("7-bit field"),
    };

    let mask_key = if masked {
        if buf.len() < pos + 4 {
            return Decoded::NeedMore(pos + 4 - buf.len());
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[pos..pos + 4]);
        pos += 4;
        Some(key)
    } else {
        None
    };

    Decoded::Ok {
        header: Header {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            masked,
            payload_len,
            mask_key,
        },
        consumed: pos,
    }
}

/// Encodes a header (client-side: always masked) into `out`, per RFC 6455
/// §5.2's smallest-applicable length encoding.
pub fn encode(fin: bool, opcode: OpCode, mask_key: [u8; 4], payload_len: u64, out: &mut Vec<u8>) {
    let first_byte = ((fin as u8) << 7) | opcode.as_u8();
    out.push(first_byte);

    if payload_len < 126 {
        out.push(0b1000_0000 | payload_len as u8);
    } else if payload_len < 65536 {
        out.push(0b1000_0000 | 126);
        out.extend_from_slice(&(payload_len as u16).to_be_bytes());
    } else {
        out.push(0b1000_0000 | 127);
        out.extend_from_slice(&payload_len.to_be_bytes());
    }

    out.extend_from_slice(&mask_key);
}

/// The largest a header can ever be: 1 (flags/opcode) + 1 (mask bit/len) +
/// 8 (extended 64-bit length) + 4 (mask key).
pub const MAX_HEADER_LEN: usize = 14;

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(buf: &[u8]) -> Header {
        match decode(buf) {
            Decoded::Ok { header, consumed } => {
                assert_eq!(consumed, buf.len());
                header
            }
            Decoded::NeedMore(n) => panic!("unexpected need-more({n})"),
            Decoded::Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    #[test]
    fn encode_decode_roundtrip_small() {
        let mut buf = Vec::new();
        encode(true, OpCode::Text, [1, 2, 3, 4], 5, &mut buf);
        assert_eq!(buf.len(), 6); // 2-byte header + 4-byte mask
        let header = decode_all(&buf);
        assert!(header.fin);
        assert_eq!(header.opcode, OpCode::Text);
        assert_eq!(header.payload_len, 5);
        assert_eq!(header.mask_key, Some([1, 2, 3, 4]));
    }

    #[test]
    fn encode_decode_roundtrip_16bit_len() {
        let mut buf = Vec::new();
        encode(false, OpCode::Binary, [9, 9, 9, 9], 1000, &mut buf);
        assert_eq!(buf.len(), 8); // 1+1+2+4
        let header = decode_all(&buf);
        assert!(!header.fin);
        assert_eq!(header.payload_len, 1000);
    }

    #[test]
    fn encode_decode_roundtrip_64bit_len() {
        let mut buf = Vec::new();
        encode(true, OpCode::Binary, [0, 0, 0, 0], 65536, &mut buf);
        assert_eq!(buf.len(), 14); // 1+1+8+4
        let header = decode_all(&buf);
        assert_eq!(header.payload_len, 65536);
    }

    #[test]
    fn decode_reports_need_more_incrementally() {
        let mut buf = Vec::new();
        encode(true, OpCode::Binary, [1, 1, 1, 1], 70000, &mut buf);
        for n in 0..buf.len() {
            match decode(&buf[..n]) {
                Decoded::NeedMore(_) => {}
                other => panic!("expected need-more at {n} bytes, got a result"),
            }
        }
        assert!(matches!(decode(&buf), Decoded::Ok { .. }));
    }

    #[test]
    fn rejects_rsv_bits() {
        let buf = [0b1100_0001, 0x00];
        assert!(matches!(decode(&buf), Decoded::Err(ProtocolError::RsvSet)));
    }

    #[test]
    fn rejects_fragmented_control_frame() {
        let buf = [0b0000_1001, 0x00]; // ping, fin=0
        assert!(matches!(
            decode(&buf),
            Decoded::Err(ProtocolError::ControlFragmented)
        ));
    }

    #[test]
    fn rejects_oversized_control_payload() {
        let buf = [0b1000_1001, 126]; // ping, len=126
        assert!(matches!(
            decode(&buf),
            Decoded::Err(ProtocolError::ControlTooBig)
        ));
    }

    #[test]
    fn rejects_64bit_len_high_bit() {
        let mut buf = vec![0b1000_0010, 127];
        buf.extend_from_slice(&[0x80, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            decode(&buf),
            Decoded::Err(ProtocolError::LenHighBit)
        ));
    }

    #[test]
    fn rejects_bad_opcode() {
        let buf = [0b1000_0011, 0x00]; // opcode 3 is reserved
        assert!(matches!(decode(&buf), Decoded::Err(ProtocolError::BadOpcode)));
    }
}
