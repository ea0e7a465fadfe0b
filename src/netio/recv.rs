// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Receive path: zero-timeout readiness poll and the network/refclock
//! datagram readers.
//!
//! The poll never blocks; idle waiting belongs to the caller. A ready
//! descriptor with no buffer available still gets its datagrams read and
//! discarded so the descriptor stops reporting ready and the socket queue
//! cannot wedge the poll loop.

use std::net::UdpSocket;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::time::SystemTime;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::logging::{Facility, Logger};
use crate::netio::interface::InterfaceId;
use crate::netio::refclock::{ClockInput, ClockIo};
use crate::recvbuf::{Receiver, RecvBufPool, RX_BUFF_SIZE};

/// Outcome of one read attempt on a ready descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A buffer was filled and queued for the consumer
    Queued,
    /// Data arrived on a bound-but-ignored entry and was discarded
    Ignored,
    /// No buffer was available; one datagram was read and discarded
    Dropped,
    /// A clock direct-input hook consumed the sample in place
    Consumed,
    /// Nothing (left) to read
    Empty,
    /// The read itself failed
    Failed,
}

/// One zero-timeout poll over `watch`. Returns the descriptors that are
/// readable (or in an error state, which a read will surface).
pub fn poll_ready(watch: &[RawFd]) -> Result<Vec<RawFd>, nix::errno::Errno> {
    if watch.is_empty() {
        return Ok(Vec::new());
    }
    let mut fds: Vec<PollFd> = watch
        .iter()
        .map(|&fd| {
            // Fds in the watch list stay open until removed from it
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            PollFd::new(borrowed, PollFlags::POLLIN)
        })
        .collect();

    let n = poll(&mut fds, PollTimeout::ZERO)?;
    if n == 0 {
        return Ok(Vec::new());
    }

    Ok(fds
        .iter()
        .filter(|pfd| {
            pfd.revents()
                .map(|r| {
                    r.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP)
                })
                .unwrap_or(false)
        })
        .map(|pfd| pfd.as_fd().as_raw_fd())
        .collect())
}

/// Zero-byte read probe: false only for a stale descriptor (`EBADF`).
/// Used to name the culprit after a poll failure.
pub fn fd_is_valid(fd: RawFd) -> bool {
    let r = unsafe { libc::read(fd, std::ptr::null_mut(), 0) };
    if r >= 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() != Some(libc::EBADF)
}

/// Read one datagram from a ready network socket.
///
/// With no buffer available the datagram is still consumed (into a stack
/// scratch buffer) and counted as dropped. Data on an ignored entry is
/// consumed and counted as ignored. `WouldBlock` means the descriptor is
/// drained; a zero-length datagram is swallowed the same way.
pub fn read_network_packet(
    sock: &UdpSocket,
    iface_id: InterfaceId,
    ignore: bool,
    pool: &RecvBufPool,
    now: SystemTime,
    logger: &Logger,
) -> ReadOutcome {
    let Some(mut buf) = pool.acquire_free() else {
        let mut scratch = [0u8; RX_BUFF_SIZE];
        match sock.recv_from(&mut scratch) {
            Ok((0, _)) => return ReadOutcome::Empty,
            Ok((n, from)) => {
                logger.debug(
                    Facility::Netio,
                    &format!("no free buffers, dropped {} bytes from {}", n, from),
                );
                return ReadOutcome::Dropped;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return ReadOutcome::Empty,
            Err(_) => return ReadOutcome::Failed,
        }
    };

    match sock.recv_from(&mut buf.payload) {
        // Zero-length datagrams carry nothing worth queueing
        Ok((0, _)) => {
            pool.release(buf);
            ReadOutcome::Empty
        }
        Ok((n, from)) => {
            if ignore {
                pool.release(buf);
                return ReadOutcome::Ignored;
            }
            buf.len = n;
            buf.recv_time = now;
            buf.fd = sock.as_raw_fd();
            buf.src_addr = Some(from);
            buf.dst_iface = Some(iface_id);
            buf.receiver = Receiver::Protocol;
            pool.publish_full(buf);
            ReadOutcome::Queued
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            pool.release(buf);
            ReadOutcome::Empty
        }
        Err(e) => {
            pool.release(buf);
            logger.error(
                Facility::Netio,
                &format!("recvfrom on fd {} failed: {}", sock.as_raw_fd(), e),
            );
            ReadOutcome::Failed
        }
    }
}

/// Read one sample from a ready reference clock descriptor.
///
/// Reads are capped to the clock's frame size when it declares one. A
/// registered direct-input hook sees the filled buffer first and may
/// consume it in place, skipping the arrival queue.
pub fn read_refclock_packet(
    io: &mut ClockIo,
    pool: &RecvBufPool,
    now: SystemTime,
    logger: &Logger,
) -> ReadOutcome {
    let cap = if io.frame_size > 0 {
        io.frame_size.min(RX_BUFF_SIZE)
    } else {
        RX_BUFF_SIZE
    };

    let Some(mut buf) = pool.acquire_free() else {
        let mut scratch = [0u8; RX_BUFF_SIZE];
        let n = raw_read(io.fd, &mut scratch[..cap]);
        if n > 0 {
            logger.debug(
                Facility::Refclock,
                &format!("no free buffers, dropped {} bytes from clock {}", n, io.clock),
            );
            return ReadOutcome::Dropped;
        }
        return ReadOutcome::Empty;
    };

    let n = raw_read(io.fd, &mut buf.payload[..cap]);
    if n < 0 {
        pool.release(buf);
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            return ReadOutcome::Empty;
        }
        logger.error(
            Facility::Refclock,
            &format!("read from clock {} (fd {}) failed: {}", io.clock, io.fd, err),
        );
        return ReadOutcome::Failed;
    }
    if n == 0 {
        pool.release(buf);
        return ReadOutcome::Empty;
    }

    buf.len = n as usize;
    buf.recv_time = now;
    buf.fd = io.fd;
    buf.src_clock = Some(io.clock);
    buf.receiver = Receiver::Clock;

    if let Some(hook) = io.direct_input.as_mut() {
        if hook(&buf) == ClockInput::Consumed {
            pool.release(buf);
            return ReadOutcome::Consumed;
        }
    }

    pool.publish_full(buf);
    ReadOutcome::Queued
}

fn raw_read(fd: RawFd, buf: &mut [u8]) -> isize {
    unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::CaptureSink;
    use crate::netio::socket::open_socket;
    use crate::recvbuf::RecvBuf;
    use std::sync::Arc;

    fn test_logger() -> Logger {
        Logger::with_sink(Arc::new(CaptureSink::new()))
    }

    fn nonblocking_pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as RawFd; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe {
            let fl = libc::fcntl(fds[0], libc::F_GETFL);
            libc::fcntl(fds[0], libc::F_SETFL, fl | libc::O_NONBLOCK);
        }
        (fds[0], fds[1])
    }

    fn loopback_pair(logger: &Logger) -> (UdpSocket, UdpSocket) {
        let a = open_socket("127.0.0.1:0".parse().unwrap(), false, false, logger)
            .unwrap()
            .unwrap();
        let b = open_socket("127.0.0.1:0".parse().unwrap(), false, false, logger)
            .unwrap()
            .unwrap();
        (a, b)
    }

    fn wait_ready(fd: RawFd) {
        // Loopback delivery is fast but not instantaneous
        for _ in 0..100 {
            if !poll_ready(&[fd]).unwrap().is_empty() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        panic!("descriptor never became ready");
    }

    #[test]
    fn test_poll_reports_ready_descriptor() {
        let logger = test_logger();
        let (rx, tx) = loopback_pair(&logger);
        assert!(poll_ready(&[rx.as_raw_fd()]).unwrap().is_empty());

        tx.send_to(b"ping", rx.local_addr().unwrap()).unwrap();
        wait_ready(rx.as_raw_fd());
        assert_eq!(
            poll_ready(&[rx.as_raw_fd()]).unwrap(),
            vec![rx.as_raw_fd()]
        );
    }

    #[test]
    fn test_read_queues_packet_with_metadata() {
        let logger = test_logger();
        let (rx, tx) = loopback_pair(&logger);
        let pool = RecvBufPool::new(4, logger.clone());

        tx.send_to(b"sample", rx.local_addr().unwrap()).unwrap();
        wait_ready(rx.as_raw_fd());

        let now = SystemTime::now();
        let outcome = read_network_packet(&rx, 3, false, &pool, now, &logger);
        assert_eq!(outcome, ReadOutcome::Queued);

        let buf = pool.consume_full().unwrap();
        assert_eq!(&buf.payload[..buf.len], b"sample");
        assert_eq!(buf.recv_time, now);
        assert_eq!(buf.fd, rx.as_raw_fd());
        assert_eq!(buf.src_addr, Some(tx.local_addr().unwrap()));
        assert_eq!(buf.dst_iface, Some(3));
        assert_eq!(buf.receiver, Receiver::Protocol);
        pool.release(buf);

        // Descriptor is drained now
        assert_eq!(
            read_network_packet(&rx, 3, false, &pool, now, &logger),
            ReadOutcome::Empty
        );
    }

    #[test]
    fn test_read_on_ignored_entry_discards() {
        let logger = test_logger();
        let (rx, tx) = loopback_pair(&logger);
        let pool = RecvBufPool::new(2, logger.clone());

        tx.send_to(b"x", rx.local_addr().unwrap()).unwrap();
        wait_ready(rx.as_raw_fd());

        let outcome =
            read_network_packet(&rx, 0, true, &pool, SystemTime::now(), &logger);
        assert_eq!(outcome, ReadOutcome::Ignored);
        assert_eq!(pool.free_count(), 2);
        assert!(!pool.has_full());
    }

    #[test]
    fn test_zero_length_datagram_released_quietly() {
        let logger = test_logger();
        let (rx, tx) = loopback_pair(&logger);
        let pool = RecvBufPool::new(2, logger.clone());

        tx.send_to(b"", rx.local_addr().unwrap()).unwrap();
        wait_ready(rx.as_raw_fd());

        let outcome =
            read_network_packet(&rx, 0, false, &pool, SystemTime::now(), &logger);
        assert_eq!(outcome, ReadOutcome::Empty);
        assert!(!pool.has_full());
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_no_buffer_drains_one_datagram() {
        let logger = test_logger();
        let (rx, tx) = loopback_pair(&logger);
        // Ceiling equal to initial size: acquisition fails immediately
        let pool = RecvBufPool::with_limit(1, 1, logger.clone());
        let _held = pool.acquire_free().unwrap();

        tx.send_to(b"lost", rx.local_addr().unwrap()).unwrap();
        wait_ready(rx.as_raw_fd());

        let outcome =
            read_network_packet(&rx, 0, false, &pool, SystemTime::now(), &logger);
        assert_eq!(outcome, ReadOutcome::Dropped);

        // The datagram was consumed; the descriptor is quiet again
        assert!(poll_ready(&[rx.as_raw_fd()]).unwrap().is_empty());
    }

    #[test]
    fn test_refclock_read_frame_size_and_queue() {
        let logger = test_logger();
        let pool = RecvBufPool::new(2, logger.clone());

        let (read_fd, write_fd) = nonblocking_pipe();

        let wrote = unsafe {
            libc::write(write_fd, b"abcdefgh".as_ptr() as *const libc::c_void, 8)
        };
        assert_eq!(wrote, 8);

        let mut io = ClockIo {
            clock: 5,
            fd: read_fd,
            frame_size: 4,
            direct_input: None,
        };
        let outcome = read_refclock_packet(&mut io, &pool, SystemTime::now(), &logger);
        assert_eq!(outcome, ReadOutcome::Queued);

        let buf = pool.consume_full().unwrap();
        assert_eq!(buf.len, 4);
        assert_eq!(&buf.payload[..4], b"abcd");
        assert_eq!(buf.src_clock, Some(5));
        assert_eq!(buf.receiver, Receiver::Clock);
        pool.release(buf);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    #[test]
    fn test_refclock_direct_input_consumes() {
        let logger = test_logger();
        let pool = RecvBufPool::new(2, logger.clone());

        let (read_fd, write_fd) = nonblocking_pipe();
        unsafe {
            libc::write(write_fd, b"pps".as_ptr() as *const libc::c_void, 3);
        }

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_hook = seen.clone();
        let mut io = ClockIo {
            clock: 1,
            fd: read_fd,
            frame_size: 0,
            direct_input: Some(Box::new(move |buf: &RecvBuf| {
                seen_hook.lock().unwrap().extend_from_slice(&buf.payload[..buf.len]);
                ClockInput::Consumed
            })),
        };

        let outcome = read_refclock_packet(&mut io, &pool, SystemTime::now(), &logger);
        assert_eq!(outcome, ReadOutcome::Consumed);
        assert_eq!(seen.lock().unwrap().as_slice(), b"pps");
        // Consumed samples never reach the arrival queue
        assert!(!pool.has_full());
        assert_eq!(pool.free_count(), 2);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    #[test]
    fn test_fd_validity_probe() {
        let logger = test_logger();
        let (rx, _tx) = loopback_pair(&logger);
        assert!(fd_is_valid(rx.as_raw_fd()));
        assert!(!fd_is_valid(-1));
    }
}
