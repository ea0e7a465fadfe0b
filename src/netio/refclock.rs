// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Reference clock descriptor registration.
//!
//! Local hardware clocks (GPS receivers, PPS sources) deliver samples over
//! ordinary file descriptors. Each registered descriptor is watched by the
//! same readiness poll as the network sockets; samples flow through the
//! same buffer pool tagged with the originating clock.

use std::os::fd::RawFd;

use crate::recvbuf::RecvBuf;

/// Identifier of a registered reference clock (driver unit number).
pub type ClockId = u32;

/// What a clock's direct-input hook decided about a filled sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockInput {
    /// Hand the buffer to the arrival queue as usual
    Queue,
    /// The hook processed the sample in place; recycle the buffer
    Consumed,
}

/// Hook invoked with a filled sample buffer before it is queued.
pub type DirectInputFn = Box<dyn FnMut(&RecvBuf) -> ClockInput + Send>;

/// One registered clock descriptor.
///
/// The descriptor must be nonblocking; the receive path drains it until
/// it reports nothing left.
pub struct ClockIo {
    pub clock: ClockId,
    pub fd: RawFd,
    /// Bytes per sample; reads are capped to this when nonzero
    pub frame_size: usize,
    /// Optional short-circuit consumer for time-critical drivers
    pub direct_input: Option<DirectInputFn>,
}

impl std::fmt::Debug for ClockIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockIo")
            .field("clock", &self.clock)
            .field("fd", &self.fd)
            .field("frame_size", &self.frame_size)
            .field("direct_input", &self.direct_input.is_some())
            .finish()
    }
}

/// Registered clock descriptors, keyed by fd.
#[derive(Debug, Default)]
pub struct ClockRegistry {
    entries: Vec<ClockIo>,
}

impl ClockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clock descriptor to the watch set. Refused when the fd is
    /// already registered.
    pub fn register(&mut self, io: ClockIo) -> Result<(), ClockIo> {
        if self.entries.iter().any(|e| e.fd == io.fd) {
            return Err(io);
        }
        self.entries.push(io);
        Ok(())
    }

    /// Remove the descriptor for `clock`, returning it so the caller can
    /// close the fd. `None` if the clock was never registered.
    pub fn unregister(&mut self, clock: ClockId) -> Option<ClockIo> {
        let pos = self.entries.iter().position(|e| e.clock == clock)?;
        Some(self.entries.remove(pos))
    }

    pub fn find_by_fd_mut(&mut self, fd: RawFd) -> Option<&mut ClockIo> {
        self.entries.iter_mut().find(|e| e.fd == fd)
    }

    pub fn fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.entries.iter().map(|e| e.fd)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(clock: ClockId, fd: RawFd) -> ClockIo {
        ClockIo {
            clock,
            fd,
            frame_size: 0,
            direct_input: None,
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let mut reg = ClockRegistry::new();
        reg.register(clock(0, 10)).unwrap();
        reg.register(clock(1, 11)).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.fds().collect::<Vec<_>>(), vec![10, 11]);

        let removed = reg.unregister(0).unwrap();
        assert_eq!(removed.fd, 10);
        assert_eq!(reg.len(), 1);
        assert!(reg.unregister(0).is_none());
    }

    #[test]
    fn test_duplicate_fd_refused() {
        let mut reg = ClockRegistry::new();
        reg.register(clock(0, 10)).unwrap();
        assert!(reg.register(clock(1, 10)).is_err());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_find_by_fd() {
        let mut reg = ClockRegistry::new();
        reg.register(clock(3, 42)).unwrap();
        assert_eq!(reg.find_by_fd_mut(42).unwrap().clock, 3);
        assert!(reg.find_by_fd_mut(7).is_none());
    }
}
