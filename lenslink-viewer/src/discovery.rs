//! LAN discovery: multicast a probe, await a unicast reply, resolve the
//! streamer's WebSocket address from the reply source and advertised port.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use lenslink_core::announce;
use tokio::net::UdpSocket;

/// Multicast group streamers listen on for probes.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 71, 71);
/// How long to wait for a streamer reply before giving up.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Send one probe to `dest` and wait for a reply. Returns the WebSocket
/// address built from the reply source and the advertised port. Messages
/// that fail to parse (foreign traffic, version mismatch) are ignored while
/// the window stays open.
pub async fn locate(dest: SocketAddr) -> std::io::Result<SocketAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_multicast_ttl_v4(1)?;
    socket.send_to(&announce::encode_probe(), dest).await?;

    let wait = async {
        let mut buf = [0u8; 64];
        loop {
            let (n, from) = socket.recv_from(&mut buf).await?;
            if let Ok(port) = announce::parse_reply(&buf[..n]) {
                return Ok(SocketAddr::new(from.ip(), port));
            }
        }
    };
    match tokio::time::timeout(REPLY_TIMEOUT, wait).await {
        Ok(resolved) => resolved,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "no discovery reply",
        )),
    }
}
