// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Receive-buffer pool.
//!
//! Fixed-size datagram buffers cycle between a free list and a full list
//! (arrival queue). The pool grows in bulk when the free list runs dry and
//! never shrinks; buffers are recycled, not freed. Both lists live under a
//! single mutex; the counters are atomics updated inside the critical
//! section so readers never take the lock.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::logging::{Facility, Logger};
use crate::netio::interface::InterfaceId;
use crate::netio::refclock::ClockId;

/// Payload capacity of one receive buffer, in bytes.
pub const RX_BUFF_SIZE: usize = 1000;

/// Buffers preallocated at pool creation.
pub const RECV_INIT: usize = 10;

/// Buffers added per growth step when the free list is empty.
pub const RECV_INC: usize = 5;

/// Which receive path filled a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Freshly reset, not yet filled
    None,
    /// Network datagram for the protocol engine
    Protocol,
    /// Reference clock sample
    Clock,
}

/// One receive buffer.
///
/// Checked-out buffers are owned (`Box<RecvBuf>`), so a buffer can only be
/// on one list, or held by exactly one owner, at a time.
#[derive(Debug)]
pub struct RecvBuf {
    /// Raw datagram or clock sample bytes
    pub payload: [u8; RX_BUFF_SIZE],
    /// Valid length within `payload`
    pub len: usize,
    /// Arrival timestamp
    pub recv_time: SystemTime,
    /// Descriptor the data arrived on
    pub fd: RawFd,
    /// Datagram source address (network buffers only)
    pub src_addr: Option<SocketAddr>,
    /// Receiving interface (network buffers only)
    pub dst_iface: Option<InterfaceId>,
    /// Originating reference clock (clock buffers only)
    pub src_clock: Option<ClockId>,
    /// Which consumer should process this buffer
    pub receiver: Receiver,
    /// Use count; exactly 1 while checked out
    pub(crate) used: u8,
}

impl RecvBuf {
    fn new() -> Self {
        RecvBuf {
            payload: [0u8; RX_BUFF_SIZE],
            len: 0,
            recv_time: SystemTime::UNIX_EPOCH,
            fd: -1,
            src_addr: None,
            dst_iface: None,
            src_clock: None,
            receiver: Receiver::None,
            used: 0,
        }
    }

    /// Clear header fields before reuse. Payload bytes are left stale; `len`
    /// bounds what is valid.
    fn reset(&mut self) {
        self.len = 0;
        self.recv_time = SystemTime::UNIX_EPOCH;
        self.fd = -1;
        self.src_addr = None;
        self.dst_iface = None;
        self.src_clock = None;
        self.receiver = Receiver::None;
    }
}

struct PoolInner {
    free: VecDeque<Box<RecvBuf>>,
    full: VecDeque<Box<RecvBuf>>,
}

/// Shared buffer pool. `&self` throughout; wrap in `Arc` to share with the
/// receive actor.
pub struct RecvBufPool {
    inner: Mutex<PoolInner>,
    free_count: AtomicUsize,
    full_count: AtomicUsize,
    total_count: AtomicUsize,
    growth_events: AtomicUsize,
    /// Growth ceiling; `None` means unbounded
    max_buffers: Option<usize>,
    logger: Logger,
}

impl RecvBufPool {
    /// Create a pool with `initial` buffers on the free list and no growth
    /// ceiling.
    pub fn new(initial: usize, logger: Logger) -> Self {
        Self::build(initial, None, logger)
    }

    /// Create a pool whose total size never exceeds `max`. Used to exercise
    /// allocation-exhaustion behavior without exhausting real memory.
    pub fn with_limit(initial: usize, max: usize, logger: Logger) -> Self {
        Self::build(initial, Some(max), logger)
    }

    fn build(initial: usize, max_buffers: Option<usize>, logger: Logger) -> Self {
        let initial = match max_buffers {
            Some(max) => initial.min(max),
            None => initial,
        };
        let mut free = VecDeque::with_capacity(initial);
        for _ in 0..initial {
            free.push_back(Box::new(RecvBuf::new()));
        }
        RecvBufPool {
            inner: Mutex::new(PoolInner {
                free,
                full: VecDeque::new(),
            }),
            free_count: AtomicUsize::new(initial),
            full_count: AtomicUsize::new(0),
            total_count: AtomicUsize::new(initial),
            growth_events: AtomicUsize::new(0),
            max_buffers,
            logger,
        }
    }

    /// Take a buffer off the free list, growing the pool by [`RECV_INC`] if
    /// the list is empty. Returns `None` only when the growth ceiling is
    /// reached.
    pub fn acquire_free(&self) -> Option<Box<RecvBuf>> {
        let mut inner = self.inner.lock().unwrap();

        if inner.free.is_empty() {
            let total = self.total_count.load(Ordering::Relaxed);
            let room = match self.max_buffers {
                Some(max) => max.saturating_sub(total),
                None => RECV_INC,
            };
            let step = RECV_INC.min(room);
            if step == 0 {
                drop(inner);
                self.logger.critical(
                    Facility::BufferPool,
                    &format!("buffer pool exhausted ({} buffers, ceiling reached)", total),
                );
                return None;
            }
            for _ in 0..step {
                inner.free.push_back(Box::new(RecvBuf::new()));
            }
            self.free_count.fetch_add(step, Ordering::Relaxed);
            self.total_count.fetch_add(step, Ordering::Relaxed);
            self.growth_events.fetch_add(1, Ordering::Relaxed);
            self.logger.info(
                Facility::BufferPool,
                &format!(
                    "free list empty, added {} buffers (total {})",
                    step,
                    total + step
                ),
            );
        }

        let mut buf = inner.free.pop_front()?;
        self.free_count.fetch_sub(1, Ordering::Relaxed);
        buf.reset();
        buf.used = 1;
        Some(buf)
    }

    /// Append a filled buffer to the arrival queue. Arrival order is
    /// preserved strictly.
    pub fn publish_full(&self, buf: Box<RecvBuf>) {
        let mut inner = self.inner.lock().unwrap();
        inner.full.push_back(buf);
        self.full_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop the oldest buffer off the arrival queue. An empty queue also
    /// forces the full counter back to zero, healing any drift.
    pub fn consume_full(&self) -> Option<Box<RecvBuf>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.full.pop_front() {
            Some(buf) => {
                self.full_count.fetch_sub(1, Ordering::Relaxed);
                Some(buf)
            }
            None => {
                let stale = self.full_count.swap(0, Ordering::Relaxed);
                if stale != 0 {
                    drop(inner);
                    self.logger.warning(
                        Facility::BufferPool,
                        &format!("full counter read {} with empty arrival queue, reset", stale),
                    );
                }
                None
            }
        }
    }

    /// Return a buffer to the free list. A use count other than 1 indicates
    /// a construction or recycling bug and is logged, not fatal; the buffer
    /// still lands on the free list exactly once.
    pub fn release(&self, mut buf: Box<RecvBuf>) {
        if buf.used != 1 {
            self.logger.warning(
                Facility::BufferPool,
                &format!("buffer released with use count {}", buf.used),
            );
        }
        buf.used = 0;
        let mut inner = self.inner.lock().unwrap();
        inner.free.push_back(buf);
        self.free_count.fetch_add(1, Ordering::Relaxed);
    }

    /// True if the arrival queue is non-empty. Lock-free.
    pub fn has_full(&self) -> bool {
        self.full_count.load(Ordering::Relaxed) > 0
    }

    pub fn free_count(&self) -> usize {
        self.free_count.load(Ordering::Relaxed)
    }

    pub fn full_count(&self) -> usize {
        self.full_count.load(Ordering::Relaxed)
    }

    pub fn total_count(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Buffers currently held by callers (neither free nor queued).
    pub fn checked_out(&self) -> usize {
        let total = self.total_count.load(Ordering::Relaxed);
        let free = self.free_count.load(Ordering::Relaxed);
        let full = self.full_count.load(Ordering::Relaxed);
        total.saturating_sub(free + full)
    }

    /// Number of bulk growth steps taken since creation.
    pub fn growth_events(&self) -> usize {
        self.growth_events.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{CaptureSink, Severity};
    use std::sync::Arc;

    fn test_pool(initial: usize) -> RecvBufPool {
        RecvBufPool::new(initial, test_logger().0)
    }

    fn test_logger() -> (Logger, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        (Logger::with_sink(sink.clone()), sink)
    }

    #[test]
    fn test_preallocation() {
        let pool = test_pool(RECV_INIT);
        assert_eq!(pool.free_count(), RECV_INIT);
        assert_eq!(pool.full_count(), 0);
        assert_eq!(pool.total_count(), RECV_INIT);
        assert_eq!(pool.checked_out(), 0);
        assert!(!pool.has_full());
    }

    #[test]
    fn test_buffer_conservation() {
        // Every buffer is always on exactly one list or checked out; the
        // counters account for all of them through a full cycle.
        let pool = test_pool(4);

        let a = pool.acquire_free().unwrap();
        let b = pool.acquire_free().unwrap();
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.checked_out(), 2);
        assert_eq!(pool.total_count(), 4);

        pool.publish_full(a);
        assert_eq!(pool.full_count(), 1);
        assert_eq!(pool.checked_out(), 1);

        let a = pool.consume_full().unwrap();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.full_count(), 0);
        assert_eq!(pool.checked_out(), 0);
        assert_eq!(pool.total_count(), 4);
    }

    #[test]
    fn test_growth_in_bulk() {
        let pool = test_pool(2);
        let _a = pool.acquire_free().unwrap();
        let _b = pool.acquire_free().unwrap();
        assert_eq!(pool.growth_events(), 0);

        // Free list empty: next acquire grows by RECV_INC, then succeeds
        let _c = pool.acquire_free().unwrap();
        assert_eq!(pool.growth_events(), 1);
        assert_eq!(pool.total_count(), 2 + RECV_INC);
        assert_eq!(pool.free_count(), RECV_INC - 1);
    }

    #[test]
    fn test_arrival_order_is_fifo() {
        let pool = test_pool(5);
        for tag in 1..=3usize {
            let mut buf = pool.acquire_free().unwrap();
            buf.len = tag;
            pool.publish_full(buf);
        }

        for expect in 1..=3usize {
            let buf = pool.consume_full().unwrap();
            assert_eq!(buf.len, expect);
            pool.release(buf);
        }
        assert!(pool.consume_full().is_none());
    }

    #[test]
    fn test_exhaustion_under_growth_cap() {
        let (logger, sink) = test_logger();
        let pool = RecvBufPool::with_limit(2, 4, logger);

        let mut held = Vec::new();
        while let Some(buf) = pool.acquire_free() {
            held.push(buf);
            assert!(held.len() <= 4, "pool exceeded its ceiling");
        }
        assert_eq!(held.len(), 4);
        assert_eq!(pool.total_count(), 4);
        assert!(sink.count_at_least(Severity::Critical) >= 1);

        // Releasing makes acquisition possible again
        pool.release(held.pop().unwrap());
        assert!(pool.acquire_free().is_some());
    }

    #[test]
    fn test_use_count_drift_warns_but_frees_once() {
        let (logger, sink) = test_logger();
        let pool = RecvBufPool::new(2, logger);

        let mut buf = pool.acquire_free().unwrap();
        buf.used = 3;
        let free_before = pool.free_count();
        pool.release(buf);

        assert_eq!(pool.free_count(), free_before + 1);
        assert_eq!(sink.count_at_least(Severity::Warning), 1);
        let entries = sink.entries();
        assert!(entries[0].message.contains("use count 3"));
    }

    #[test]
    fn test_full_counter_self_heals() {
        let (logger, sink) = test_logger();
        let pool = RecvBufPool::new(2, logger);

        // Simulate counter drift without a queued buffer
        pool.full_count.store(2, Ordering::Relaxed);
        assert!(pool.has_full());
        assert!(pool.consume_full().is_none());
        assert_eq!(pool.full_count(), 0);
        assert_eq!(sink.count_at_least(Severity::Warning), 1);
    }

    #[test]
    fn test_steady_state_reuses_buffers() {
        // Scenario: arrivals and the drain loop alternate; after warmup the
        // pool never grows again.
        let pool = test_pool(3);

        for _ in 0..50 {
            let mut buf = pool.acquire_free().unwrap();
            buf.len = 48;
            buf.receiver = Receiver::Protocol;
            pool.publish_full(buf);

            let buf = pool.consume_full().unwrap();
            assert_eq!(buf.len, 48);
            pool.release(buf);
        }
        assert_eq!(pool.growth_events(), 0);
        assert_eq!(pool.total_count(), 3);
    }

    #[test]
    fn test_acquire_resets_header_fields() {
        let pool = test_pool(1);
        let mut buf = pool.acquire_free().unwrap();
        buf.len = 99;
        buf.fd = 7;
        buf.receiver = Receiver::Clock;
        pool.release(buf);

        let buf = pool.acquire_free().unwrap();
        assert_eq!(buf.len, 0);
        assert_eq!(buf.fd, -1);
        assert_eq!(buf.receiver, Receiver::None);
        assert_eq!(buf.used, 1);
    }
}
