//! Discovery messages: probe (viewer -> multicast group) and reply
//! (streamer -> probe source) advertising the streamer's WebSocket port.

use crate::protocol::PROTOCOL_VERSION;

/// Leading magic of a discovery probe.
pub const PROBE_MAGIC: [u8; 4] = *b"LKNQ";
/// Leading magic of a discovery reply.
pub const REPLY_MAGIC: [u8; 4] = *b"LKNA";

const PROBE_LEN: usize = 5;
const REPLY_LEN: usize = 7;

/// Encode a discovery probe: magic + protocol version.
pub fn encode_probe() -> [u8; PROBE_LEN] {
    let mut out = [0u8; PROBE_LEN];
    out[..4].copy_from_slice(&PROBE_MAGIC);
    out[4] = PROTOCOL_VERSION;
    out
}

/// Encode a discovery reply: magic + protocol version + WebSocket port (LE).
pub fn encode_reply(stream_port: u16) -> [u8; REPLY_LEN] {
    let mut out = [0u8; REPLY_LEN];
    out[..4].copy_from_slice(&REPLY_MAGIC);
    out[4] = PROTOCOL_VERSION;
    out[5..7].copy_from_slice(&stream_port.to_le_bytes());
    out
}

/// Parse a probe (streamer side).
pub fn parse_probe(bytes: &[u8]) -> Result<(), AnnounceError> {
    if bytes.len() < PROBE_LEN {
        return Err(AnnounceError::TooShort);
    }
    if bytes[..4] != PROBE_MAGIC {
        return Err(AnnounceError::BadMagic);
    }
    if bytes[4] != PROTOCOL_VERSION {
        return Err(AnnounceError::Version);
    }
    Ok(())
}

/// Parse a reply (viewer side). Returns the advertised WebSocket port.
pub fn parse_reply(bytes: &[u8]) -> Result<u16, AnnounceError> {
    if bytes.len() < REPLY_LEN {
        return Err(AnnounceError::TooShort);
    }
    if bytes[..4] != REPLY_MAGIC {
        return Err(AnnounceError::BadMagic);
    }
    if bytes[4] != PROTOCOL_VERSION {
        return Err(AnnounceError::Version);
    }
    Ok(u16::from_le_bytes([bytes[5], bytes[6]]))
}

/// Error parsing a discovery message. Invalid messages are ignored by both
/// sides; discovery simply waits for the next one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnnounceError {
    #[error("message too short")]
    TooShort,
    #[error("unrecognized magic")]
    BadMagic,
    #[error("protocol version mismatch")]
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_parses() {
        assert_eq!(parse_probe(&encode_probe()), Ok(()));
    }

    #[test]
    fn reply_roundtrip() {
        assert_eq!(parse_reply(&encode_reply(6144)), Ok(6144));
        assert_eq!(parse_reply(&encode_reply(u16::MAX)), Ok(u16::MAX));
    }

    #[test]
    fn short_messages_rejected() {
        assert_eq!(parse_probe(&[]), Err(AnnounceError::TooShort));
        assert_eq!(parse_reply(&encode_reply(6144)[..5]), Err(AnnounceError::TooShort));
    }

    #[test]
    fn probe_is_not_a_reply() {
        let mut buf = [0u8; REPLY_LEN];
        buf[..PROBE_LEN].copy_from_slice(&encode_probe());
        assert_eq!(parse_reply(&buf), Err(AnnounceError::BadMagic));
    }

    #[test]
    fn version_mismatch_rejected() {
        let mut reply = encode_reply(6144);
        reply[4] = PROTOCOL_VERSION + 1;
        assert_eq!(parse_reply(&reply), Err(AnnounceError::Version));
    }
}
