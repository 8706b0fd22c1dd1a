//! Client side of the Smart HTTP protocol, used by the sync data flow
//! (§4.6 "Client side", §3 sync ingress).

use bytes::Bytes;

use super::pktline::{add_pkt_line_string, read_pkt_line, read_until_white_space};
use super::types::ProtocolError;

#[derive(Debug, Clone)]
pub struct DiscoveredRefs {
    pub refs: Vec<(String, String)>,
    pub capabilities: String,
}

/// Parses an `info/refs` advertisement response body (§4.6).
pub fn parse_ref_advertisement(body: &[u8]) -> Result<DiscoveredRefs, ProtocolError> {
    let mut bytes = Bytes::copy_from_slice(body);
    let mut refs = Vec::new();
    let mut capabilities = String::new();
    let mut first = true;

    loop {
        let (taken, line) = read_pkt_line(&mut bytes);
        if taken == 0 {
            break;
        }
        if line.is_empty() {
            if first {
                continue;
            }
            break;
        }
        if line.starts_with(b"# service=") {
            continue;
        }

        let mut line = line;
        let sha = read_until_white_space(&mut line);
        let rest = String::from_utf8_lossy(&line).to_string();
        let (name, caps) = match rest.find('\0') {
            Some(pos) => (rest[..pos].to_string(), rest[pos + 1..].to_string()),
            None => (rest.trim_end().to_string(), String::new()),
        };
        if first && !caps.is_empty() {
            capabilities = caps.trim_end().to_string();
        }
        first = false;
        refs.push((name.trim_end().to_string(), sha));
    }

    Ok(DiscoveredRefs { refs, capabilities })
}

/// Builds an upload-pack request body requesting `wants`, asserting `haves`.
pub fn build_fetch_request(wants: &[String], haves: &[String]) -> Vec<u8> {
    let mut stream = bytes::BytesMut::new();
    for (i, want) in wants.iter().enumerate() {
        if i == 0 {
            add_pkt_line_string(&mut stream, format!("want {want} {}\n", super::types::COMMON_CAP_LIST));
        } else {
            add_pkt_line_string(&mut stream, format!("want {want}\n"));
        }
    }
    stream.extend_from_slice(super::types::PKT_LINE_END_MARKER);
    for have in haves {
        add_pkt_line_string(&mut stream, format!("have {have}\n"));
    }
    add_pkt_line_string(&mut stream, "done\n".to_string());
    stream.to_vec()
}

/// Result of a fetch-pack round trip handed back to the sync caller.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub refs: Vec<(String, String)>,
    pub pack_bytes: Vec<u8>,
}

/// Splits an upload-pack response into its ACK/NAK negotiation lines and the
/// trailing packfile bytes (after the `PACK\n` marker this crate's server
/// emits ahead of the pack stream).
pub fn split_negotiation_and_pack(response: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    const MARKER: &[u8] = b"PACK\n";
    let pos = response
        .windows(MARKER.len())
        .position(|w| w == MARKER)
        .ok_or_else(|| ProtocolError::InvalidRequest("missing PACK marker in upload-pack response".into()))?;
    Ok(response[pos + MARKER.len() + 4..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_ref_advertisement_with_capabilities() {
        let mut stream = bytes::BytesMut::new();
        add_pkt_line_string(&mut stream, "# service=git-upload-pack\n".to_string());
        stream.extend_from_slice(super::super::types::PKT_LINE_END_MARKER);
        add_pkt_line_string(&mut stream, format!("{} HEAD\0multi_ack_detailed\n", "a".repeat(40)));
        add_pkt_line_string(&mut stream, format!("{} refs/heads/main\n", "a".repeat(40)));
        stream.extend_from_slice(super::super::types::PKT_LINE_END_MARKER);

        let parsed = parse_ref_advertisement(&stream).unwrap();
        assert_eq!(parsed.refs.len(), 2);
        assert!(parsed.capabilities.contains("multi_ack_detailed"));
    }

    #[test]
    fn build_fetch_request_includes_capabilities_on_first_want() {
        let request = build_fetch_request(&["a".repeat(40)], &[]);
        let text = String::from_utf8_lossy(&request);
        assert!(text.contains("want"));
        assert!(text.contains("done"));
    }
}
