//! LensLink protocol reference implementation.
//! Host-driven: no I/O; host passes events and receives actions.

pub mod announce;
pub mod core;
pub mod protocol;
pub mod wire;

pub use protocol::{
    ConnectionEvent, DistortionParameters, Endpoint, SessionId, TransportKind, DEFAULT_STREAM_PORT,
    PROTOCOL_VERSION,
};
pub use self::core::{Action, ConnectionState, LinkCore, PendingTransport};
pub use wire::{decode_frame, encode_frame, DecodedUnit, FrameDecodeError, FrameEnvelope};
