// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Interface records: one entry per local address the daemon listens on,
//! plus the two synthetic wildcard entries created before discovery.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use pnet::datalink::NetworkInterface;
use pnet::ipnetwork::IpNetwork;

/// Index of an interface record in the I/O context table.
pub type InterfaceId = usize;

/// Interface capability and state flags
pub mod interface_flags {
    /// Interface is administratively and operationally up
    pub const UP: u32 = 0x1;
    /// Interface supports broadcast
    pub const BROADCAST: u32 = 0x2;
    /// Interface supports multicast
    pub const MULTICAST: u32 = 0x4;
    /// Loopback interface
    pub const LOOPBACK: u32 = 0x8;
    /// Point-to-point link (no broadcast address)
    pub const POINTTOPOINT: u32 = 0x10;
    /// A broadcast reception socket is open on this interface
    pub const BCAST_OPEN: u32 = 0x20;
    /// This entry's socket has joined at least one multicast group
    pub const MCAST_OPEN: u32 = 0x40;
}

use interface_flags as flags;

/// Names given to the synthetic wildcard entries.
pub const WILDCARD_V4_NAME: &str = "v4wildcard";
pub const WILDCARD_V6_NAME: &str = "v6wildcard";

/// One local address the daemon has (or will have) a socket on.
#[derive(Debug)]
pub struct Interface {
    /// Position in the interface table; stable for the context lifetime
    pub id: InterfaceId,
    /// OS interface name (may carry a ':' alias suffix)
    pub name: String,
    /// Unicast address and bound port
    pub addr: SocketAddr,
    /// Network prefix length of `addr` (0 for wildcards)
    pub prefix_len: u8,
    /// Broadcast address, or a joined multicast group stuffed into a
    /// wildcard entry when no per-interface socket could be opened
    pub bcast: Option<SocketAddr>,
    /// Capability and state bits (`interface_flags`)
    pub flags: u32,
    /// OS interface index (0 for wildcards)
    pub if_index: u32,
    /// Bound but deliberately not listening
    pub ignore_packets: bool,
    /// Last TTL/hop limit applied to the unicast socket
    pub last_ttl: Option<u32>,
    /// Multicast groups joined through this entry
    pub num_mcasts: u32,
    /// Unicast socket, once opened
    pub socket: Option<UdpSocket>,
    /// Broadcast reception socket, when acting as a broadcast client
    pub bcast_sock: Option<UdpSocket>,
    pub received: u64,
    pub sent: u64,
    pub notsent: u64,
}

impl Interface {
    fn empty(id: InterfaceId, name: String, addr: SocketAddr) -> Self {
        Interface {
            id,
            name,
            addr,
            prefix_len: 0,
            bcast: None,
            flags: 0,
            if_index: 0,
            ignore_packets: false,
            last_ttl: None,
            num_mcasts: 0,
            socket: None,
            bcast_sock: None,
            received: 0,
            sent: 0,
            notsent: 0,
        }
    }

    /// Blank table slot, filled in by the caller before use.
    pub(crate) fn placeholder(id: InterfaceId) -> Self {
        Self::empty(
            id,
            "unused".to_string(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        )
    }

    /// Synthetic IPv4 wildcard entry: 0.0.0.0, bound but ignored.
    pub fn wildcard_v4(id: InterfaceId, port: u16) -> Self {
        let mut iface = Self::empty(
            id,
            WILDCARD_V4_NAME.to_string(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        );
        iface.flags = flags::UP | flags::BROADCAST;
        iface.ignore_packets = true;
        iface
    }

    /// Synthetic IPv6 wildcard entry: ::, bound but ignored.
    pub fn wildcard_v6(id: InterfaceId, port: u16) -> Self {
        let mut iface = Self::empty(
            id,
            WILDCARD_V6_NAME.to_string(),
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
        );
        iface.flags = flags::UP;
        iface.ignore_packets = true;
        iface
    }

    /// Build an entry from one address of an enumerated OS interface.
    pub fn from_os(
        id: InterfaceId,
        ni: &NetworkInterface,
        net: &IpNetwork,
        port: u16,
    ) -> Self {
        let mut iface = Self::empty(id, ni.name.clone(), SocketAddr::new(net.ip(), port));
        iface.prefix_len = net.prefix();
        iface.if_index = ni.index;

        if ni.is_up() {
            iface.flags |= flags::UP;
        }
        if ni.is_loopback() {
            iface.flags |= flags::LOOPBACK;
        }
        if ni.is_point_to_point() {
            iface.flags |= flags::POINTTOPOINT;
        }
        if ni.is_multicast() {
            iface.flags |= flags::MULTICAST;
        }
        // Point-to-point links have a peer address where the broadcast
        // address would be; never treat them as broadcast-capable.
        if ni.is_broadcast() && !ni.is_point_to_point() {
            iface.flags |= flags::BROADCAST;
            if let IpNetwork::V4(v4) = net {
                iface.bcast = Some(SocketAddr::new(IpAddr::V4(v4.broadcast()), port));
            }
        }

        iface
    }

    pub fn is_wildcard(&self) -> bool {
        self.addr.ip().is_unspecified()
    }

    pub fn is_loopback(&self) -> bool {
        self.flags & flags::LOOPBACK != 0
    }

    pub fn is_up(&self) -> bool {
        self.flags & flags::UP != 0
    }

    pub fn is_broadcast_capable(&self) -> bool {
        self.flags & flags::BROADCAST != 0
    }

    pub fn is_multicast_capable(&self) -> bool {
        self.flags & flags::MULTICAST != 0
    }

    /// True when `ip` falls inside this entry's network prefix. Family
    /// mismatch is never a match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr.ip(), ip) {
            (IpAddr::V4(local), IpAddr::V4(remote)) => {
                let bits = u32::from(self.prefix_len).min(32);
                if bits == 0 {
                    return false;
                }
                let mask = if bits == 32 { u32::MAX } else { !(u32::MAX >> bits) };
                (u32::from(local) & mask) == (u32::from(remote) & mask)
            }
            (IpAddr::V6(local), IpAddr::V6(remote)) => {
                let bits = u32::from(self.prefix_len).min(128);
                if bits == 0 {
                    return false;
                }
                let mask = if bits == 128 {
                    u128::MAX
                } else {
                    !(u128::MAX >> bits)
                };
                (u128::from(local) & mask) == (u128::from(remote) & mask)
            }
            _ => false,
        }
    }
}

/// Listening policy for a discovered interface.
///
/// Loopback is always usable. When a single interface is configured, only
/// exact name matches pass. Alias entries (names with ':') are rejected
/// unless virtual-address listening is enabled.
pub fn interface_acceptable(
    name: &str,
    loopback: bool,
    only_interface: Option<&str>,
    listen_virtual: bool,
) -> bool {
    if loopback {
        return true;
    }
    if let Some(only) = only_interface {
        return name == only;
    }
    if !listen_virtual && name.contains(':') {
        return false;
    }
    true
}
