//! pkt-line framing helpers shared by the upload-pack and receive-pack
//! handlers (§4.6).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::types::{PKT_LINE_END_MARKER, TransportProtocol};


/// Reads one pkt-line from `bytes`, returning `(bytes_consumed, payload)`.
/// A flush pkt (`0000`) yields `(4, empty)`; malformed input yields `(0, empty)`.
pub fn read_pkt_line(bytes: &mut Bytes) -> (usize, Bytes) {
    if bytes.len() < 4 {
        return (0, Bytes::new());
    }

    let pkt_length_bytes = bytes.copy_to_bytes(4);
    let pkt_length_str = match core::str::from_utf8(&pkt_length_bytes) {
        Ok(s) => s,
        Err(_) => {
            tracing::warn!("invalid utf-8 in pkt-line length: {:?}", pkt_length_bytes);
            return (0, Bytes::new());
        }
    };

    let pkt_length = match usize::from_str_radix(pkt_length_str, 16) {
        Ok(len) => len,
        Err(_) => {
            tracing::warn!("invalid hex pkt-line length: {:?}", pkt_length_str);
            return (0, Bytes::new());
        }
    };

    if pkt_length == 0 {
        return (4, Bytes::new());
    }
    if pkt_length < 4 {
        tracing::warn!("pkt-line length {} below minimum of 4", pkt_length);
        return (0, Bytes::new());
    }

    let data_length = pkt_length - 4;
    if bytes.len() < data_length {
        tracing::warn!("pkt-line wants {} bytes, only {} available", data_length, bytes.len());
        return (0, Bytes::new());
    }

    (pkt_length, bytes.copy_to_bytes(data_length))
}

pub fn add_pkt_line_string(stream: &mut BytesMut, line: String) {
    let length = line.len() + 4;
    stream.put(Bytes::from(format!("{length:04x}")));
    stream.put(line.as_bytes());
}

pub fn read_until_white_space(bytes: &mut Bytes) -> String {
    let mut buf = Vec::new();
    while bytes.has_remaining() {
        let c = bytes.get_u8();
        if c.is_ascii_whitespace() || c == 0 {
            break;
        }
        buf.push(c);
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// ref-advertisement pkt-line stream, with the `# service=...` header when
/// the transport is HTTP (the smart-http "dumb client" marker, RFC-ish).
pub fn build_smart_reply(transport: TransportProtocol, ref_list: &[String], service: String) -> BytesMut {
    let mut stream = BytesMut::new();
    if transport == TransportProtocol::Http {
        add_pkt_line_string(&mut stream, format!("# service={service}\n"));
        stream.put(&PKT_LINE_END_MARKER[..]);
    }
    for line in ref_list {
        add_pkt_line_string(&mut stream, line.clone());
    }
    stream.put(&PKT_LINE_END_MARKER[..]);
    stream
}

pub fn search_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
