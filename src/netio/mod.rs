// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Interface and socket manager.
//!
//! `IoContext` owns one interface record per usable local address (plus
//! two synthetic wildcard entries), the UDP sockets bound to them, the
//! remote-address bookkeeping, registered reference clock descriptors, and
//! the receive/transmit statistics. All mutation goes through `&mut self`;
//! only the buffer pool is shared with other threads.

pub mod interface;
pub mod recv;
pub mod refclock;
pub mod send;
pub mod socket;

use anyhow::{bail, Context, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::Config;
use crate::logging::{Facility, Logger};
use crate::recvbuf::RecvBufPool;

use interface::{interface_acceptable, interface_flags as ifflags, Interface, InterfaceId};
use recv::ReadOutcome;
use refclock::{ClockId, ClockIo, ClockRegistry};
use send::ErrorCache;

/// What a remote-address record stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrKind {
    /// A bound local unicast address
    Unicast,
    /// A broadcast address we listen on
    Broadcast,
    /// A multicast group we have joined
    Multicast,
}

/// Maps an address back to the interface record responsible for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAddress {
    pub addr: IpAddr,
    pub iface: InterfaceId,
    pub kind: AddrKind,
}

/// Receive/transmit counters, reset together with `time_reset`.
#[derive(Debug, Clone, PartialEq)]
pub struct IoStats {
    pub packets_received: u64,
    pub packets_ignored: u64,
    pub packets_dropped: u64,
    pub packets_sent: u64,
    pub packets_notsent: u64,
    /// Poll passes, whether or not any descriptor was ready
    pub handler_calls: u64,
    /// Packets handled across all passes (queued or consumed in place)
    pub handler_pkts: u64,
    pub time_reset: SystemTime,
}

impl IoStats {
    fn new(now: SystemTime) -> Self {
        IoStats {
            packets_received: 0,
            packets_ignored: 0,
            packets_dropped: 0,
            packets_sent: 0,
            packets_notsent: 0,
            handler_calls: 0,
            handler_pkts: 0,
            time_reset: now,
        }
    }
}

enum Watched {
    Net { iface: InterfaceId, bcast: bool },
    Clock { fd: RawFd },
}

/// The I/O core: interface table, sockets, clocks, counters.
pub struct IoContext {
    interfaces: Vec<Interface>,
    wild_v4: Option<InterfaceId>,
    wild_v6: Option<InterfaceId>,
    nwilds: usize,
    remote_addrs: Vec<RemoteAddress>,
    clocks: ClockRegistry,
    pool: Arc<RecvBufPool>,
    stats: IoStats,
    error_cache: ErrorCache,
    port: u16,
    only_interface: Option<String>,
    listen_virtual: bool,
    enable_ipv4: bool,
    enable_ipv6: bool,
    logger: Logger,
}

impl IoContext {
    pub fn new(cfg: &Config, pool: Arc<RecvBufPool>, logger: Logger) -> Self {
        IoContext {
            interfaces: Vec::new(),
            wild_v4: None,
            wild_v6: None,
            nwilds: 0,
            remote_addrs: Vec::new(),
            clocks: ClockRegistry::new(),
            pool,
            stats: IoStats::new(SystemTime::now()),
            error_cache: ErrorCache::new(),
            port: cfg.port,
            only_interface: cfg.interface.clone(),
            listen_virtual: cfg.listen_virtual,
            enable_ipv4: cfg.enable_ipv4,
            enable_ipv6: cfg.enable_ipv6,
            logger,
        }
    }

    /// Probe kernel address-family support, synthesize the wildcard
    /// entries, enumerate OS interfaces, and bind one socket per usable
    /// address. Addresses excluded by the interface policy are bound too,
    /// with their traffic discarded on arrival. Returns the number of
    /// entries actually listening.
    ///
    /// `SO_REUSEADDR` stays on across the whole bind sweep so overlapping
    /// binds succeed, then is cleared on every socket afterwards.
    pub fn discover_and_bind(&mut self) -> Result<usize> {
        self.enable_ipv4 = self.enable_ipv4 && socket::probe_ipv4();
        self.enable_ipv6 = self.enable_ipv6 && socket::probe_ipv6();
        if !self.enable_ipv4 && !self.enable_ipv6 {
            bail!("no usable address family");
        }

        self.create_wildcards()?;

        for ni in pnet::datalink::interfaces() {
            for net in &ni.ips {
                let ip = net.ip();
                match ip {
                    IpAddr::V4(_) if !self.enable_ipv4 => continue,
                    IpAddr::V6(_) if !self.enable_ipv6 => continue,
                    _ => {}
                }
                // An all-zero address here means the lease is gone (DHCP
                // teardown); binding it would shadow the real wildcard
                if ip.is_unspecified() {
                    self.logger.notice(
                        Facility::Netio,
                        &format!("ignoring wildcard address on {}", ni.name),
                    );
                    continue;
                }
                let acceptable = interface_acceptable(
                    &ni.name,
                    ni.is_loopback(),
                    self.only_interface.as_deref(),
                    self.listen_virtual,
                );
                if self.interfaces.iter().any(|i| i.addr.ip() == ip) {
                    self.logger.debug(
                        Facility::Netio,
                        &format!("duplicate address {} on {}, skipping", ip, ni.name),
                    );
                    continue;
                }

                let id = self.interfaces.len();
                let mut iface = Interface::from_os(id, &ni, net, self.port);
                // Filtered-out addresses still get a bound socket so the
                // port cannot be claimed by another process; their traffic
                // is read and discarded
                iface.ignore_packets = !acceptable;
                match socket::open_socket(iface.addr, false, false, &self.logger)? {
                    Some(sock) => {
                        // With port 0 the kernel chose; record reality
                        if let Ok(local) = sock.local_addr() {
                            iface.addr.set_port(local.port());
                            if let Some(b) = iface.bcast.as_mut() {
                                b.set_port(local.port());
                            }
                        }
                        iface.socket = Some(sock);
                        if iface.ignore_packets {
                            self.logger.notice(
                                Facility::Netio,
                                &format!(
                                    "bound {} ({}) but not listening",
                                    iface.addr, iface.name
                                ),
                            );
                        } else {
                            self.logger.notice(
                                Facility::Netio,
                                &format!("listening on {} ({})", iface.addr, iface.name),
                            );
                        }
                        self.remote_addrs.push(RemoteAddress {
                            addr: iface.addr.ip(),
                            iface: id,
                            kind: AddrKind::Unicast,
                        });
                        self.interfaces.push(iface);
                    }
                    None => continue,
                }
            }
        }

        // Bind sweep done: stop advertising the ports as shareable
        for iface in &self.interfaces {
            if let Some(sock) = iface.socket.as_ref() {
                socket::set_reuseaddr(sock, false, &self.logger);
            }
            if let Some(sock) = iface.bcast_sock.as_ref() {
                socket::set_reuseaddr(sock, false, &self.logger);
            }
        }

        // Wildcards and filtered-out entries never listen
        let listening = self
            .interfaces
            .iter()
            .filter(|i| !i.ignore_packets)
            .count();
        if listening == 0 {
            self.logger.error(
                Facility::Netio,
                "no usable interface found, only wildcards are bound",
            );
        } else {
            self.logger.info(
                Facility::Netio,
                &format!(
                    "bound {} interface addresses ({} wildcards) on port {}",
                    listening, self.nwilds, self.port
                ),
            );
        }
        Ok(listening)
    }

    /// The wildcard entries exist before any discovered interface, are
    /// bound so nothing else can squat on the port, and never listen.
    fn create_wildcards(&mut self) -> Result<()> {
        if self.enable_ipv4 {
            let id = self.interfaces.len();
            let mut iface = Interface::wildcard_v4(id, self.port);
            match socket::open_socket(iface.addr, false, false, &self.logger)? {
                Some(sock) => {
                    if let Ok(local) = sock.local_addr() {
                        iface.addr.set_port(local.port());
                    }
                    iface.socket = Some(sock);
                }
                None => self.logger.error(
                    Facility::Netio,
                    &format!("unable to bind v4 wildcard {}", iface.addr),
                ),
            }
            self.interfaces.push(iface);
            self.wild_v4 = Some(id);
            self.nwilds += 1;
        }
        if self.enable_ipv6 {
            let id = self.interfaces.len();
            let mut iface = Interface::wildcard_v6(id, self.port);
            match socket::open_socket(iface.addr, false, false, &self.logger)? {
                Some(sock) => {
                    if let Ok(local) = sock.local_addr() {
                        iface.addr.set_port(local.port());
                    }
                    iface.socket = Some(sock);
                }
                None => self.logger.error(
                    Facility::Netio,
                    &format!("unable to bind v6 wildcard {}", iface.addr),
                ),
            }
            self.interfaces.push(iface);
            self.wild_v6 = Some(id);
            self.nwilds += 1;
        }
        Ok(())
    }

    /// Local unicast addresses we are bound to. The protocol engine uses
    /// this as its own-address deny list.
    pub fn self_addresses(&self) -> Vec<IpAddr> {
        self.interfaces
            .iter()
            .filter(|i| !i.is_wildcard())
            .map(|i| i.addr.ip())
            .collect()
    }

    /// Open a broadcast reception socket on every broadcast-capable
    /// interface. Zero openable interfaces is reported as an error; the
    /// caller keeps running on unicast.
    pub fn enable_broadcast_client(&mut self) {
        let mut opened = 0usize;
        for idx in 0..self.interfaces.len() {
            let (baddr, name) = {
                let iface = &self.interfaces[idx];
                // Filtered-out entries hold the port but never listen,
                // for broadcasts either
                if !iface.is_broadcast_capable()
                    || iface.bcast_sock.is_some()
                    || iface.ignore_packets
                {
                    continue;
                }
                match iface.bcast {
                    Some(b) => (b, iface.name.clone()),
                    None => continue,
                }
            };
            // Broadcast binds must not leave a reuse window behind
            match socket::open_socket(baddr, true, true, &self.logger) {
                Ok(Some(sock)) => {
                    let iface = &mut self.interfaces[idx];
                    iface.bcast_sock = Some(sock);
                    iface.flags |= ifflags::BCAST_OPEN;
                    self.remote_addrs.push(RemoteAddress {
                        addr: baddr.ip(),
                        iface: idx,
                        kind: AddrKind::Broadcast,
                    });
                    self.logger.notice(
                        Facility::Netio,
                        &format!("listening for broadcasts on {} ({})", baddr, name),
                    );
                    opened += 1;
                }
                Ok(None) => {}
                Err(e) => self.logger.error(
                    Facility::Netio,
                    &format!("broadcast socket on {} failed: {:#}", name, e),
                ),
            }
        }
        if opened == 0 {
            self.logger.error(
                Facility::Netio,
                "unable to listen for broadcasts, no broadcast-capable interfaces",
            );
        }
    }

    /// Close every broadcast reception socket and drop the records.
    pub fn disable_broadcast_client(&mut self) {
        for idx in 0..self.interfaces.len() {
            let iface = &mut self.interfaces[idx];
            if iface.bcast_sock.take().is_some() {
                iface.flags &= !ifflags::BCAST_OPEN;
                self.logger.notice(
                    Facility::Netio,
                    &format!("stopped broadcast listening on {}", iface.name),
                );
            }
        }
        self.remote_addrs.retain(|r| r.kind != AddrKind::Broadcast);
    }

    /// Join a multicast group: bind a dedicated reception socket to the
    /// group address, or fall back to the wildcard socket when that bind
    /// is impossible, recording the group in the wildcard's `bcast` slot.
    pub fn multicast_add(&mut self, group: IpAddr) -> Result<()> {
        if !group.is_multicast() {
            bail!("{} is not a multicast address", group);
        }
        if self
            .remote_addrs
            .iter()
            .any(|r| r.kind == AddrKind::Multicast && r.addr == group)
        {
            self.logger.warning(
                Facility::Netio,
                &format!("multicast group {} already joined", group),
            );
            return Ok(());
        }

        let gaddr = SocketAddr::new(group, self.port);
        match socket::open_socket(gaddr, false, true, &self.logger)? {
            Some(sock) => {
                socket::join_multicast(&sock, group, unspecified_of(group), 0)?;
                let mut actual = gaddr;
                if let Ok(local) = sock.local_addr() {
                    actual.set_port(local.port());
                }
                let id = self.claim_slot();
                let iface = &mut self.interfaces[id];
                iface.name = "mcast".to_string();
                iface.addr = actual;
                iface.flags = ifflags::UP | ifflags::MULTICAST | ifflags::MCAST_OPEN;
                iface.ignore_packets = false;
                iface.num_mcasts = 1;
                iface.socket = Some(sock);
                self.remote_addrs.push(RemoteAddress {
                    addr: group,
                    iface: id,
                    kind: AddrKind::Multicast,
                });
                self.logger.notice(
                    Facility::Netio,
                    &format!("joined multicast group {} on {}", group, actual),
                );
            }
            None => {
                // No socket on the group address; receive through the
                // wildcard and remember the group there
                let wid = self
                    .wildcard_for(group)
                    .context("no wildcard interface for multicast fallback")?;
                let iface = &mut self.interfaces[wid];
                let sock = iface
                    .socket
                    .as_ref()
                    .context("wildcard interface has no socket")?;
                socket::join_multicast(sock, group, unspecified_of(group), 0)?;
                iface.bcast = Some(gaddr);
                iface.flags |= ifflags::MCAST_OPEN;
                iface.num_mcasts += 1;
                self.remote_addrs.push(RemoteAddress {
                    addr: group,
                    iface: wid,
                    kind: AddrKind::Multicast,
                });
                self.logger.notice(
                    Facility::Netio,
                    &format!("joined multicast group {} via wildcard", group),
                );
            }
        }
        Ok(())
    }

    /// Leave a multicast group and retire the dedicated entry (the slot is
    /// reused by the next join) or unhook it from the wildcard.
    pub fn multicast_del(&mut self, group: IpAddr) -> Result<()> {
        if !group.is_multicast() {
            bail!("{} is not a multicast address", group);
        }
        let mut found = false;
        for idx in 0..self.interfaces.len() {
            let iface = &mut self.interfaces[idx];
            if iface.flags & ifflags::MCAST_OPEN == 0 {
                continue;
            }
            let dedicated = iface.addr.ip() == group;
            let stuffed = iface.bcast.map(|b| b.ip()) == Some(group) && iface.is_wildcard();
            if !dedicated && !stuffed {
                continue;
            }
            if let Some(sock) = iface.socket.as_ref() {
                if let Err(e) = socket::leave_multicast(sock, group, unspecified_of(group), 0) {
                    self.logger
                        .error(Facility::Netio, &format!("{:#}", e));
                }
            }
            iface.num_mcasts = iface.num_mcasts.saturating_sub(1);
            if iface.num_mcasts == 0 {
                iface.flags &= !ifflags::MCAST_OPEN;
            }
            if dedicated {
                // Retire the slot for reuse
                iface.socket = None;
                iface.flags = 0;
                iface.bcast = None;
            } else {
                iface.bcast = None;
            }
            found = true;
        }
        self.remote_addrs
            .retain(|r| !(r.kind == AddrKind::Multicast && r.addr == group));
        if found {
            self.logger
                .notice(Facility::Netio, &format!("left multicast group {}", group));
        } else {
            self.logger.warning(
                Facility::Netio,
                &format!("multicast group {} was not joined", group),
            );
        }
        Ok(())
    }

    fn wildcard_for(&self, addr: IpAddr) -> Option<InterfaceId> {
        match addr {
            IpAddr::V4(_) => self.wild_v4,
            IpAddr::V6(_) => self.wild_v6,
        }
    }

    /// Reuse a retired table slot or grow the table.
    fn claim_slot(&mut self) -> InterfaceId {
        if let Some(id) = self
            .interfaces
            .iter()
            .position(|i| !i.is_wildcard() && i.socket.is_none() && i.flags == 0)
        {
            return id;
        }
        let id = self.interfaces.len();
        self.interfaces.push(Interface::placeholder(id));
        id
    }

    /// One zero-timeout poll over every watched descriptor, draining each
    /// ready one. Returns the number of packets queued or consumed. Poll
    /// failure is logged (with a per-descriptor probe on `EBADF` to name
    /// the stale one) and never propagated.
    pub fn poll_and_receive(&mut self, now: SystemTime) -> usize {
        // Counted against handler_pkts as a load diagnostic, so every
        // invocation counts, not just the ones that find work
        self.stats.handler_calls += 1;

        let mut watch: Vec<(RawFd, Watched)> = Vec::new();
        for iface in &self.interfaces {
            if let Some(sock) = iface.socket.as_ref() {
                watch.push((
                    sock.as_raw_fd(),
                    Watched::Net {
                        iface: iface.id,
                        bcast: false,
                    },
                ));
            }
            if let Some(sock) = iface.bcast_sock.as_ref() {
                watch.push((
                    sock.as_raw_fd(),
                    Watched::Net {
                        iface: iface.id,
                        bcast: true,
                    },
                ));
            }
        }
        for fd in self.clocks.fds() {
            watch.push((fd, Watched::Clock { fd }));
        }

        let fds: Vec<RawFd> = watch.iter().map(|(fd, _)| *fd).collect();
        let ready = match recv::poll_ready(&fds) {
            Ok(ready) => ready,
            Err(errno) => {
                self.logger
                    .error(Facility::Netio, &format!("poll failed: {}", errno));
                if errno == nix::errno::Errno::EBADF {
                    for &fd in &fds {
                        if !recv::fd_is_valid(fd) {
                            self.logger.error(
                                Facility::Netio,
                                &format!("watched descriptor {} is stale", fd),
                            );
                        }
                    }
                }
                return 0;
            }
        };
        if ready.is_empty() {
            return 0;
        }

        let mut handled = 0usize;
        for fd in ready {
            let Some((_, watched)) = watch.iter().find(|(wfd, _)| *wfd == fd) else {
                continue;
            };
            match watched {
                Watched::Net { iface, bcast } => {
                    handled += self.drain_net_fd(*iface, *bcast, now);
                }
                Watched::Clock { fd } => {
                    handled += self.drain_clock_fd(*fd, now);
                }
            }
        }
        self.stats.handler_pkts += handled as u64;
        handled
    }

    fn drain_net_fd(&mut self, id: InterfaceId, bcast: bool, now: SystemTime) -> usize {
        let mut handled = 0usize;
        loop {
            let iface = &mut self.interfaces[id];
            let sock = if bcast {
                iface.bcast_sock.as_ref()
            } else {
                iface.socket.as_ref()
            };
            let Some(sock) = sock else { break };
            let outcome = recv::read_network_packet(
                sock,
                id,
                iface.ignore_packets,
                &self.pool,
                now,
                &self.logger,
            );
            match outcome {
                ReadOutcome::Queued => {
                    iface.received += 1;
                    self.stats.packets_received += 1;
                    handled += 1;
                }
                ReadOutcome::Ignored => {
                    self.stats.packets_ignored += 1;
                }
                // Keep reading so the backlog clears in one pass even
                // while every datagram is being discarded
                ReadOutcome::Dropped => {
                    self.stats.packets_dropped += 1;
                }
                // Network reads are never consumed in place
                ReadOutcome::Consumed | ReadOutcome::Empty | ReadOutcome::Failed => break,
            }
        }
        handled
    }

    fn drain_clock_fd(&mut self, fd: RawFd, now: SystemTime) -> usize {
        let mut handled = 0usize;
        loop {
            let Some(io) = self.clocks.find_by_fd_mut(fd) else { break };
            match recv::read_refclock_packet(io, &self.pool, now, &self.logger) {
                ReadOutcome::Queued | ReadOutcome::Consumed => {
                    self.stats.packets_received += 1;
                    handled += 1;
                }
                ReadOutcome::Ignored => {
                    self.stats.packets_ignored += 1;
                }
                ReadOutcome::Dropped => {
                    self.stats.packets_dropped += 1;
                }
                ReadOutcome::Empty | ReadOutcome::Failed => break,
            }
        }
        handled
    }

    /// Send a datagram out of interface `iface`. See [`send::send_packet`]
    /// for TTL caching and error dedup.
    pub fn send_packet(&mut self, dest: SocketAddr, iface: InterfaceId, ttl: u32, payload: &[u8]) {
        if iface >= self.interfaces.len() {
            self.stats.packets_notsent += 1;
            return;
        }
        let entry = &mut self.interfaces[iface];
        let (sent0, notsent0) = (entry.sent, entry.notsent);
        send::send_packet(entry, dest, ttl, payload, &mut self.error_cache, &self.logger);
        self.stats.packets_sent += entry.sent - sent0;
        self.stats.packets_notsent += entry.notsent - notsent0;
    }

    /// Pick the interface that traffic to `addr` would leave from: route
    /// lookup via a connected probe socket, exact match on the resulting
    /// source address, wildcard of the family as the fallback. Total once
    /// the wildcards exist.
    pub fn find_interface(&self, addr: SocketAddr) -> Option<InterfaceId> {
        if let Some(local) = socket::local_address_for(addr) {
            if let Some(iface) = self
                .interfaces
                .iter()
                .find(|i| !i.ignore_packets && i.addr.ip() == local)
            {
                return Some(iface.id);
            }
        }
        self.wildcard_for(addr.ip())
    }

    /// Pick the interface a broadcast or multicast datagram from `addr`
    /// plausibly arrived on. Total once the wildcards exist.
    pub fn find_bcast_interface(&self, addr: SocketAddr) -> Option<InterfaceId> {
        let ip = addr.ip();

        // Addresses we explicitly listen on resolve directly
        if let Some(rec) = self
            .remote_addrs
            .iter()
            .find(|r| r.kind != AddrKind::Unicast && r.addr == ip)
        {
            return Some(rec.iface);
        }

        for iface in &self.interfaces {
            if iface.is_wildcard() || iface.ignore_packets || !iface.is_up() {
                continue;
            }
            if iface.is_loopback() {
                continue;
            }
            let same_family = matches!(
                (iface.addr.ip(), ip),
                (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_))
            );
            if !same_family {
                continue;
            }
            if ip.is_multicast() {
                if iface.is_multicast_capable() {
                    return Some(iface.id);
                }
                continue;
            }
            if iface.bcast.map(|b| b.ip()) == Some(ip) {
                return Some(iface.id);
            }
            if iface.is_broadcast_capable() && iface.contains(ip) {
                return Some(iface.id);
            }
        }
        self.wildcard_for(ip)
    }

    /// Find a local interface carrying all of `required_flags` suitable as
    /// the source for `addr`. For IPv6 multicast, link-local groups prefer
    /// a link-local source address and wider scopes prefer a global one.
    pub fn find_local_cast_interface(
        &self,
        addr: IpAddr,
        required_flags: u32,
    ) -> Option<InterfaceId> {
        let mut fallback = None;
        for iface in &self.interfaces {
            if iface.is_wildcard() || iface.ignore_packets || !iface.is_up() {
                continue;
            }
            if iface.flags & required_flags != required_flags {
                continue;
            }
            match (iface.addr.ip(), addr) {
                (IpAddr::V4(_), IpAddr::V4(_)) => return Some(iface.id),
                (IpAddr::V6(local), IpAddr::V6(group)) => {
                    let want_link_local = group.is_multicast() && (group.segments()[0] & 0xf) <= 2;
                    let is_link_local = (local.segments()[0] & 0xffc0) == 0xfe80;
                    if want_link_local == is_link_local {
                        return Some(iface.id);
                    }
                    fallback.get_or_insert(iface.id);
                }
                _ => {}
            }
        }
        fallback
    }

    /// Register a reference clock descriptor with the poll set.
    pub fn register_clock_io(&mut self, io: ClockIo) -> Result<()> {
        let clock = io.clock;
        let fd = io.fd;
        self.clocks
            .register(io)
            .map_err(|_| anyhow::anyhow!("descriptor {} already registered", fd))?;
        self.logger.info(
            Facility::Refclock,
            &format!("watching clock {} on fd {}", clock, fd),
        );
        Ok(())
    }

    /// Remove a clock descriptor from the poll set, handing it back so the
    /// driver can close the fd.
    pub fn unregister_clock_io(&mut self, clock: ClockId) -> Option<ClockIo> {
        let removed = self.clocks.unregister(clock);
        if removed.is_some() {
            self.logger.info(
                Facility::Refclock,
                &format!("stopped watching clock {}", clock),
            );
        }
        removed
    }

    pub fn stats(&self) -> IoStats {
        self.stats.clone()
    }

    pub fn clear_stats(&mut self, now: SystemTime) {
        self.stats = IoStats::new(now);
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn remote_addresses(&self) -> &[RemoteAddress] {
        &self.remote_addrs
    }

    pub fn pool(&self) -> &Arc<RecvBufPool> {
        &self.pool
    }

    /// Close every socket and forget every clock descriptor. Clock fds are
    /// owned by their drivers and stay open.
    pub fn shutdown(&mut self) {
        for iface in &mut self.interfaces {
            iface.socket = None;
            iface.bcast_sock = None;
            iface.flags &= !(ifflags::BCAST_OPEN | ifflags::MCAST_OPEN);
        }
        self.clocks.clear();
        self.remote_addrs.clear();
        self.logger
            .notice(Facility::Netio, "I/O context shut down, sockets closed");
    }
}

fn unspecified_of(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}
