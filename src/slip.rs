//! SLIP framing for protocol messages over a byte stream.
//!
//! Every message travels as one SLIP packet:
//!
//! ```text
//! [0xC0] escaped payload bytes [0xC0]
//! ```
//!
//! Payload bytes equal to the delimiter or the escape byte are replaced by
//! two-byte escape sequences (`ESC ESC_END` / `ESC ESC_ESC`). Decoding is
//! deliberately forgiving: garbage before the opening delimiter is skipped
//! and corrupt input degrades to an empty packet rather than an error, so
//! the session loop treats it as "no request received".

use bytes::BytesMut;

/// Packet delimiter byte.
pub const END: u8 = 0xC0;
/// Escape byte.
pub const ESC: u8 = 0xDB;
/// Escaped stand-in for a payload delimiter byte.
pub const ESC_END: u8 = 0xDC;
/// Escaped stand-in for a payload escape byte.
pub const ESC_ESC: u8 = 0xDD;

/// Encode a payload as a single SLIP packet.
///
/// The empty payload encodes to exactly `[END, END]`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(END);

    for &byte in payload {
        match byte {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            _ => out.push(byte),
        }
    }

    out.push(END);
    out
}

/// Decode the first SLIP packet found in `input`.
///
/// Scans forward to the first delimiter, then unescapes bytes until the
/// next delimiter or the end of input. Input with no delimiter at all
/// yields an empty payload; malformed escape sequences are dropped.
pub fn decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();

    let Some(start) = input.iter().position(|&b| b == END) else {
        return out;
    };

    let mut i = start + 1;
    while i < input.len() && input[i] != END {
        if input[i] == ESC {
            i += 1;
            match input.get(i) {
                Some(&ESC_END) => out.push(END),
                Some(&ESC_ESC) => out.push(ESC),
                _ => {} // unknown escape, drop it
            }
        } else {
            out.push(input[i]);
        }
        i += 1;
    }

    out
}

/// Incremental packet reassembler for a TCP-style byte stream.
///
/// Feed read chunks via [`SlipReassembler::feed`], then drain complete
/// packets with [`SlipReassembler::next_packet`]. Bytes before an opening
/// delimiter are discarded; empty packets (adjacent delimiters) are skipped.
#[derive(Debug, Default)]
pub struct SlipReassembler {
    buf: BytesMut,
}

impl SlipReassembler {
    /// Create a reassembler with an empty buffer.
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Append freshly read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete non-empty packet payload, if any.
    ///
    /// Returns `None` when the buffer holds no complete packet yet; the
    /// partial tail stays buffered for the next [`feed`](Self::feed).
    pub fn next_packet(&mut self) -> Option<Vec<u8>> {
        loop {
            // Drop leading noise so the buffer starts at a delimiter.
            match self.buf.iter().position(|&b| b == END) {
                Some(0) => {}
                Some(start) => {
                    let _ = self.buf.split_to(start);
                }
                None => {
                    self.buf.clear();
                    return None;
                }
            }

            // Need a closing delimiter to have a complete packet.
            let close = self.buf[1..].iter().position(|&b| b == END)? + 1;

            let packet = self.buf.split_to(close + 1);
            let payload = decode(&packet);
            if !payload.is_empty() {
                return Some(payload);
            }
            // Adjacent delimiters, keep scanning.
        }
    }

    /// Returns true if partial data is waiting for more bytes.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}
