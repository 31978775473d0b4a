//! Finds the address phones should use to reach this machine.
//!
//! The relay usually binds `0.0.0.0`, which is no use to a phone.  To find
//! the LAN address, a UDP socket is "connected" to a public address.  UDP
//! connect sends no packet; it only makes the OS pick a route, and the
//! socket's local address is then the address of the outgoing interface.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::net::UdpSocket;
use tracing::warn;

/// Reported when no outgoing interface can be determined.
pub const FALLBACK_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Any routable address works; nothing is ever sent to it.
const ROUTE_TARGET: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 80));

/// The address to advertise for a listener bound to `host`.
///
/// A specific bind address is advertised as-is; a wildcard bind is resolved
/// to the LAN interface address, or [`FALLBACK_IP`].
pub async fn advertised_ip(host: IpAddr) -> IpAddr {
    if host.is_unspecified() {
        lan_ip_via(ROUTE_TARGET).await
    } else {
        host
    }
}

/// Source address the OS would use to reach `target`, or [`FALLBACK_IP`].
pub async fn lan_ip_via(target: SocketAddr) -> IpAddr {
    match route_source(target).await {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => {
            warn!("no outgoing interface found; advertising {FALLBACK_IP}");
            FALLBACK_IP
        }
        Err(e) => {
            warn!("could not determine LAN address ({e}); advertising {FALLBACK_IP}");
            FALLBACK_IP
        }
    }
}

async fn route_source(target: SocketAddr) -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(target).await?;
    Ok(socket.local_addr()?.ip())
}
