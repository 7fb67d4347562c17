//! LensLink protocol: version, session identity, endpoints, consumer events.

use std::fmt;
use std::net::SocketAddr;

/// Current protocol version. Used in discovery probe and reply.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default WebSocket port the streamer listens on.
pub const DEFAULT_STREAM_PORT: u16 = 6144;

/// Session ID: random, minted once per `start` call. Tags log lines so one
/// logical session can be followed across components; never sent on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SessionId([u8; 16]);

impl SessionId {
    /// Mint a fresh random session ID.
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// How an endpoint was obtained: the wired debug channel reachable without
/// discovery, or a wireless address resolved on the local subnet.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TransportKind {
    Wired,
    Wireless,
}

/// One candidate transport address. Immutable; compared by value so retries
/// toward the same address can be de-duplicated.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Endpoint {
    pub kind: TransportKind,
    pub addr: SocketAddr,
}

impl Endpoint {
    /// The wired channel: loopback at the preferred port.
    pub fn wired(port: u16) -> Self {
        Endpoint {
            kind: TransportKind::Wired,
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }

    /// A wireless endpoint resolved by LAN discovery.
    pub fn wireless(addr: SocketAddr) -> Self {
        Endpoint {
            kind: TransportKind::Wireless,
            addr,
        }
    }

    /// WebSocket URL for this endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

/// Radial lens-distortion correction coefficients. The renderer applies the
/// default pair until the first parameter frame arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionParameters {
    pub k1: f32,
    pub k2: f32,
}

impl Default for DistortionParameters {
    fn default() -> Self {
        DistortionParameters { k1: 0.25, k2: 0.05 }
    }
}

/// Everything the consumer ever learns from a session, delivered in the
/// order produced. Exactly one `Connected` per successful open; exactly one
/// of `Disconnected`/`Error` per session, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected(String),
    Error(String),
    FrameDecoded(DistortionParameters),
}
