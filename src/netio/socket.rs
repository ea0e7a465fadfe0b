// SPDX-License-Identifier: Apache-2.0 OR MIT
//! UDP socket creation and option plumbing.
//!
//! Sockets are built and configured with `socket2`, then converted into
//! `std::net::UdpSocket` for datagram I/O. Raw libc setsockopt is used only
//! where no safe wrapper exists.

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};

use crate::logging::{Facility, Logger};

/// Whether the kernel will give us an IPv4 UDP socket.
pub fn probe_ipv4() -> bool {
    Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).is_ok()
}

/// Whether the kernel will give us an IPv6 UDP socket.
pub fn probe_ipv6() -> bool {
    Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).is_ok()
}

/// Open, configure, and bind one UDP socket on `addr`.
///
/// Returns `Ok(None)` when the address family is unsupported or the bind
/// fails; bind failure is logged and the interface is skipped, it is not
/// fatal (an address may be mid-renumber, and broadcast binds routinely
/// collide). Socket creation and nonblocking-setup failures are real
/// resource problems and propagate as errors.
///
/// `SO_REUSEADDR` is set before bind so that a set of overlapping binds
/// (wildcard plus per-interface) all succeed; `turn_off_reuse` clears it
/// again immediately after bind so other processes cannot steal the port.
/// During discovery the caller instead clears it across all sockets once
/// every bind has completed.
pub fn open_socket(
    addr: SocketAddr,
    bcast: bool,
    turn_off_reuse: bool,
    logger: &Logger,
) -> Result<Option<UdpSocket>> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let sock = match Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)) {
        Ok(s) => s,
        Err(e) if e.raw_os_error() == Some(libc::EAFNOSUPPORT) => {
            logger.debug(
                Facility::Netio,
                &format!("address family of {} not supported by kernel", addr),
            );
            return Ok(None);
        }
        Err(e) => {
            return Err(e).context(format!("failed to create UDP socket for {}", addr));
        }
    };

    sock.set_reuse_address(true)
        .context("failed to set SO_REUSEADDR")?;

    match addr {
        SocketAddr::V4(_) => {
            // Time packets want the low-delay queue; failure is harmless
            if let Err(e) = set_ip_tos_lowdelay(sock.as_raw_fd()) {
                logger.warning(
                    Facility::Netio,
                    &format!("failed to set IPTOS_LOWDELAY on {}: {}", addr, e),
                );
            }
        }
        SocketAddr::V6(_) => {
            // Keep v4 traffic off v6 sockets; the v4 entries handle it
            if let Err(e) = sock.set_only_v6(true) {
                logger.warning(
                    Facility::Netio,
                    &format!("failed to set IPV6_V6ONLY on {}: {}", addr, e),
                );
            }
        }
    }

    if bcast {
        sock.set_broadcast(true)
            .context(format!("failed to enable SO_BROADCAST on {}", addr))?;
    }

    if let Err(e) = sock.bind(&SockAddr::from(addr)) {
        // Broadcast binds collide with the per-interface socket on some
        // systems and transient addresses vanish mid-discovery; neither
        // deserves more than a notice.
        if bcast || e.raw_os_error() == Some(libc::EADDRNOTAVAIL) {
            logger.notice(
                Facility::Netio,
                &format!("bind {} failed, skipping: {}", addr, e),
            );
        } else {
            logger.error(
                Facility::Netio,
                &format!("bind {} failed, skipping: {}", addr, e),
            );
        }
        return Ok(None);
    }

    sock.set_nonblocking(true)
        .context(format!("failed to set {} nonblocking", addr))?;

    if turn_off_reuse {
        if let Err(e) = sock.set_reuse_address(false) {
            logger.warning(
                Facility::Netio,
                &format!("failed to clear SO_REUSEADDR on {}: {}", addr, e),
            );
        }
    }

    Ok(Some(sock.into()))
}

/// Flip `SO_REUSEADDR` on an already-bound socket.
pub fn set_reuseaddr(sock: &UdpSocket, on: bool, logger: &Logger) {
    if let Err(e) = SockRef::from(sock).set_reuse_address(on) {
        logger.warning(
            Facility::Netio,
            &format!(
                "failed to turn SO_REUSEADDR {} on fd {}: {}",
                if on { "on" } else { "off" },
                sock.as_raw_fd(),
                e
            ),
        );
    }
}

/// Set `IP_TOS` to low delay. No safe wrapper covers this uniformly, so it
/// goes through libc directly.
fn set_ip_tos_lowdelay(fd: RawFd) -> std::io::Result<()> {
    const IPTOS_LOWDELAY: libc::c_int = 0x10;
    let result = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_IP,
            libc::IP_TOS,
            &IPTOS_LOWDELAY as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if result < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Join a multicast group through an already-bound socket.
///
/// For IPv4 the local interface is named by its address, for IPv6 by its
/// index (0 means "kernel's choice").
pub fn join_multicast(sock: &UdpSocket, group: IpAddr, local: IpAddr, if_index: u32) -> Result<()> {
    let sref = SockRef::from(sock);
    match (group, local) {
        (IpAddr::V4(group), IpAddr::V4(local)) => sref
            .join_multicast_v4(&group, &local)
            .context(format!("failed to join multicast group {}", group)),
        (IpAddr::V6(group), _) => sref
            .join_multicast_v6(&group, if_index)
            .context(format!("failed to join multicast group {}", group)),
        _ => Err(anyhow::anyhow!(
            "multicast group {} and local address {} family mismatch",
            group,
            local
        )),
    }
}

/// Leave a multicast group previously joined on this socket.
pub fn leave_multicast(sock: &UdpSocket, group: IpAddr, local: IpAddr, if_index: u32) -> Result<()> {
    let sref = SockRef::from(sock);
    match (group, local) {
        (IpAddr::V4(group), IpAddr::V4(local)) => sref
            .leave_multicast_v4(&group, &local)
            .context(format!("failed to leave multicast group {}", group)),
        (IpAddr::V6(group), _) => sref
            .leave_multicast_v6(&group, if_index)
            .context(format!("failed to leave multicast group {}", group)),
        _ => Err(anyhow::anyhow!(
            "multicast group {} and local address {} family mismatch",
            group,
            local
        )),
    }
}

/// Apply a TTL (v4) or hop limit (v6) ahead of a send, picking the
/// multicast variant when the destination is a group address.
pub fn set_packet_ttl(sock: &UdpSocket, dest: IpAddr, ttl: u32) -> std::io::Result<()> {
    let sref = SockRef::from(sock);
    match dest {
        IpAddr::V4(ip) if ip.is_multicast() => sref.set_multicast_ttl_v4(ttl),
        IpAddr::V4(_) => sref.set_ttl(ttl),
        IpAddr::V6(ip) if ip.is_multicast() => sref.set_multicast_hops_v6(ttl),
        IpAddr::V6(_) => sref.set_unicast_hops_v6(ttl),
    }
}

/// Local source address the kernel would use to reach `dest`, found by
/// connecting an unbound UDP socket and reading back its local address.
/// `None` when no route exists.
pub fn local_address_for(dest: SocketAddr) -> Option<IpAddr> {
    let domain = match dest {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let sock = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).ok()?;
    sock.connect(&SockAddr::from(dest)).ok()?;
    sock.local_addr().ok()?.as_socket().map(|sa| sa.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{CaptureSink, Severity};
    use std::sync::Arc;

    fn test_logger() -> (Logger, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        (Logger::with_sink(sink.clone()), sink)
    }

    #[test]
    fn test_family_probes() {
        // IPv4 is universally available on test systems
        assert!(probe_ipv4());
    }

    #[test]
    fn test_open_socket_loopback_ephemeral() {
        let (logger, _) = test_logger();
        let sock = open_socket("127.0.0.1:0".parse().unwrap(), false, false, &logger)
            .unwrap()
            .unwrap();
        let local = sock.local_addr().unwrap();
        assert_eq!(local.ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_ne!(local.port(), 0);
    }

    #[test]
    fn test_reuse_cleared_after_bind_blocks_rebinding() {
        let (logger, sink) = test_logger();
        let first = open_socket("127.0.0.1:0".parse().unwrap(), false, true, &logger)
            .unwrap()
            .unwrap();
        let taken = first.local_addr().unwrap();

        // SO_REUSEADDR was cleared on the holder, so a second bind on the
        // same port is refused and reported as a skip, not an error return
        let second = open_socket(taken, false, false, &logger).unwrap();
        assert!(second.is_none());
        assert!(sink.count_at_least(Severity::Error) >= 1);
    }

    #[test]
    fn test_local_address_for_loopback() {
        let local = local_address_for("127.0.0.1:123".parse().unwrap());
        assert_eq!(local, Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_set_packet_ttl_on_bound_socket() {
        let (logger, _) = test_logger();
        let sock = open_socket("127.0.0.1:0".parse().unwrap(), false, false, &logger)
            .unwrap()
            .unwrap();
        set_packet_ttl(&sock, "127.0.0.2".parse().unwrap(), 3).unwrap();
        set_packet_ttl(&sock, "224.0.1.1".parse().unwrap(), 3).unwrap();
    }
}
