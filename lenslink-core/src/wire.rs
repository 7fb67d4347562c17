//! Framing: 4-byte magic + two f32 LE coefficients at fixed offsets, then an
//! opaque trailing payload this core never reads.

use crate::protocol::DistortionParameters;

/// Leading magic of a parameter frame.
pub const FRAME_MAGIC: [u8; 4] = *b"LENS";
/// Minimum frame length: magic + k1 + k2.
pub const MIN_FRAME_LEN: usize = 12;

const K1_OFFSET: usize = 4;
const K2_OFFSET: usize = 8;

/// One message as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEnvelope {
    /// Out-of-band control text. Carried through; not interpreted here.
    Text(String),
    /// Binary payload; only these may update distortion parameters.
    Binary(Vec<u8>),
}

/// Result of decoding one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedUnit {
    Parameters(DistortionParameters),
    /// Control text, passed through untouched.
    Control(String),
}

/// Encode a parameter frame: magic + k1 + k2, little-endian.
pub fn encode_frame(params: &DistortionParameters) -> Vec<u8> {
    let mut out = Vec::with_capacity(MIN_FRAME_LEN);
    out.extend_from_slice(&FRAME_MAGIC);
    out.extend_from_slice(&params.k1.to_le_bytes());
    out.extend_from_slice(&params.k2.to_le_bytes());
    out
}

/// Decode one envelope. Binary payloads may carry opaque trailing bytes (the
/// video slice) after the parameter header; only the fixed offsets are read.
/// Never panics on malformed input.
pub fn decode_frame(envelope: &FrameEnvelope) -> Result<DecodedUnit, FrameDecodeError> {
    match envelope {
        FrameEnvelope::Text(s) => Ok(DecodedUnit::Control(s.clone())),
        FrameEnvelope::Binary(bytes) => {
            if bytes.len() < MIN_FRAME_LEN {
                return Err(FrameDecodeError::TooShort);
            }
            if bytes[..FRAME_MAGIC.len()] != FRAME_MAGIC {
                return Err(FrameDecodeError::InvalidFormat);
            }
            let k1 = f32::from_le_bytes([
                bytes[K1_OFFSET],
                bytes[K1_OFFSET + 1],
                bytes[K1_OFFSET + 2],
                bytes[K1_OFFSET + 3],
            ]);
            let k2 = f32::from_le_bytes([
                bytes[K2_OFFSET],
                bytes[K2_OFFSET + 1],
                bytes[K2_OFFSET + 2],
                bytes[K2_OFFSET + 3],
            ]);
            // A non-finite coefficient would poison the shader uniforms.
            if !k1.is_finite() || !k2.is_finite() {
                return Err(FrameDecodeError::InvalidFormat);
            }
            Ok(DecodedUnit::Parameters(DistortionParameters { k1, k2 }))
        }
    }
}

/// Error decoding a frame. One bad frame is dropped; the session survives.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("frame shorter than parameter header")]
    TooShort,
    #[error("invalid frame format")]
    InvalidFormat,
}
