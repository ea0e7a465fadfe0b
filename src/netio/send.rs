// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Transmit path: per-interface TTL caching and send-error log dedup.

use std::net::SocketAddr;

use crate::logging::{Facility, Logger};
use crate::netio::interface::Interface;
use crate::netio::socket::set_packet_ttl;

/// Slots in the send-error dedup ring.
pub const ERROR_CACHE_SIZE: usize = 8;

/// Small ring of destinations whose last send failed.
///
/// A destination already in the ring means its failure has been reported;
/// repeats are suppressed until a send to it succeeds again. When the ring
/// is full the oldest entry is overwritten, so a long-failing destination
/// can resurface in the log, which is acceptable.
#[derive(Debug, Default)]
pub struct ErrorCache {
    slots: [Option<SocketAddr>; ERROR_CACHE_SIZE],
    next: usize,
}

impl ErrorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, dest: SocketAddr) -> bool {
        self.slots.iter().any(|s| *s == Some(dest))
    }

    /// Record a failed destination. Returns true when this is a new entry,
    /// i.e. the failure should be logged.
    pub fn note_failure(&mut self, dest: SocketAddr) -> bool {
        if self.contains(dest) {
            return false;
        }
        self.slots[self.next] = Some(dest);
        self.next = (self.next + 1) % ERROR_CACHE_SIZE;
        true
    }

    /// Forget a destination after a successful send. Returns true when it
    /// was cached, i.e. a recovery notice should be logged.
    pub fn note_success(&mut self, dest: SocketAddr) -> bool {
        let mut was_cached = false;
        for slot in self.slots.iter_mut() {
            if *slot == Some(dest) {
                *slot = None;
                was_cached = true;
            }
        }
        was_cached
    }
}

/// A momentary kernel condition, not a dead destination. Such a failure
/// gets a counter increment and nothing else.
fn transient_send_error(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock || e.raw_os_error() == Some(libc::ENOBUFS)
}

/// Send one datagram out of `iface`'s unicast socket.
///
/// A nonzero `ttl` differing from the last one applied to this interface
/// is set on the socket first (multicast and unicast variants picked by
/// destination). Counters on the interface record the outcome; hard
/// failures go through the dedup cache so a dead route logs once, and the
/// first success after a failure logs a recovery notice. Transient errors
/// (`EWOULDBLOCK`, `ENOBUFS`) only bump the not-sent counter.
pub fn send_packet(
    iface: &mut Interface,
    dest: SocketAddr,
    ttl: u32,
    payload: &[u8],
    cache: &mut ErrorCache,
    logger: &Logger,
) {
    let Some(sock) = iface.socket.as_ref() else {
        iface.notsent += 1;
        return;
    };

    if ttl > 0 && iface.last_ttl != Some(ttl) {
        match set_packet_ttl(sock, dest.ip(), ttl) {
            Ok(()) => iface.last_ttl = Some(ttl),
            Err(e) => logger.error(
                Facility::Netio,
                &format!("failed to set ttl {} on {}: {}", ttl, iface.name, e),
            ),
        }
    }

    match sock.send_to(payload, dest) {
        Ok(_) => {
            iface.sent += 1;
            if cache.note_success(dest) {
                logger.notice(
                    Facility::Netio,
                    &format!("sending to {} works again", dest),
                );
            }
        }
        Err(e) => {
            iface.notsent += 1;
            if transient_send_error(&e) {
                return;
            }
            if cache.note_failure(dest) {
                logger.error(
                    Facility::Netio,
                    &format!("send to {} via {} failed: {}", dest, iface.name, e),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{CaptureSink, Severity};
    use crate::netio::interface::Interface;
    use crate::netio::socket::open_socket;
    use std::sync::Arc;

    fn dest(n: u8) -> SocketAddr {
        SocketAddr::new(format!("10.0.0.{}", n).parse().unwrap(), 123)
    }

    #[test]
    fn test_error_cache_dedup() {
        let mut cache = ErrorCache::new();
        assert!(cache.note_failure(dest(1)));
        assert!(!cache.note_failure(dest(1)));
        assert!(cache.contains(dest(1)));
        assert!(cache.note_failure(dest(2)));
    }

    #[test]
    fn test_error_cache_recovery() {
        let mut cache = ErrorCache::new();
        cache.note_failure(dest(1));
        assert!(cache.note_success(dest(1)));
        // Already cleared: no second recovery notice
        assert!(!cache.note_success(dest(1)));
        // And the next failure is reportable again
        assert!(cache.note_failure(dest(1)));
    }

    #[test]
    fn test_error_cache_eviction_reopens_logging() {
        let mut cache = ErrorCache::new();
        assert!(cache.note_failure(dest(1)));
        for n in 2..=(ERROR_CACHE_SIZE as u8 + 1) {
            assert!(cache.note_failure(dest(n)));
        }
        // dest(1) was the oldest entry and has been overwritten
        assert!(!cache.contains(dest(1)));
        assert!(cache.note_failure(dest(1)));
    }

    #[test]
    fn test_transient_errors_stay_out_of_the_cache() {
        let wouldblock = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        assert!(transient_send_error(&wouldblock));
        let nobufs = std::io::Error::from_raw_os_error(libc::ENOBUFS);
        assert!(transient_send_error(&nobufs));
        let refused = std::io::Error::from_raw_os_error(libc::ECONNREFUSED);
        assert!(!transient_send_error(&refused));
    }

    #[test]
    fn test_send_without_socket_counts_notsent() {
        let (logger, _sink) = capture_logger();
        let mut iface = Interface::wildcard_v4(0, 0);
        let mut cache = ErrorCache::new();
        send_packet(&mut iface, dest(1), 0, b"x", &mut cache, &logger);
        assert_eq!(iface.notsent, 1);
        assert_eq!(iface.sent, 0);
    }

    #[test]
    fn test_send_over_loopback_counts_and_caches_ttl() {
        let (logger, _sink) = capture_logger();
        let mut iface = Interface::wildcard_v4(0, 0);
        iface.socket = Some(
            open_socket("127.0.0.1:0".parse().unwrap(), false, false, &logger)
                .unwrap()
                .unwrap(),
        );
        let receiver = open_socket("127.0.0.1:0".parse().unwrap(), false, false, &logger)
            .unwrap()
            .unwrap();
        let target = receiver.local_addr().unwrap();

        let mut cache = ErrorCache::new();
        send_packet(&mut iface, target, 7, b"tick", &mut cache, &logger);
        assert_eq!(iface.sent, 1);
        assert_eq!(iface.last_ttl, Some(7));

        let mut buf = [0u8; 16];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"tick");
    }

    #[test]
    fn test_failed_send_logs_once() {
        let (logger, sink) = capture_logger();
        let mut iface = Interface::wildcard_v4(0, 0);
        iface.socket = Some(
            open_socket("127.0.0.1:0".parse().unwrap(), false, false, &logger)
                .unwrap()
                .unwrap(),
        );

        // Port 0 destination is always rejected by sendto
        let bad: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut cache = ErrorCache::new();
        send_packet(&mut iface, bad, 0, b"x", &mut cache, &logger);
        send_packet(&mut iface, bad, 0, b"x", &mut cache, &logger);

        assert_eq!(iface.notsent, 2);
        assert_eq!(sink.count_at_least(Severity::Error), 1);
    }

    fn capture_logger() -> (Logger, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        (Logger::with_sink(sink.clone()), sink)
    }
}
