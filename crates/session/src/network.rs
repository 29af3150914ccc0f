//! Local network helpers for subprocess sessions.

use std::net::{IpAddr, Ipv4Addr, TcpListener, UdpSocket};

/// The address other hosts can reach this machine on.
///
/// Connecting a UDP socket sends nothing but makes the OS pick the
/// outbound interface, whose address is then read back. Falls back to the
/// loopback address on hosts without a route.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

/// `count` distinct free ports.
pub fn free_ports(count: u16) -> std::io::Result<Vec<u16>> {
    // Hold all listeners until every port is chosen so none repeats.
    let listeners = (0..count)
        .map(|_| TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)))
        .collect::<std::io::Result<Vec<_>>>()?;
    listeners
        .iter()
        .map(|l| l.local_addr().map(|a| a.port()))
        .collect()
}
