// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging facilities (component identifiers)

use serde::{Deserialize, Serialize};

/// Logging facility - identifies which component generated the log message
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facility {
    /// Daemon startup, configuration, outer loop
    Daemon = 0,
    /// Interface discovery, socket lifecycle, poll loop, send path
    Netio = 1,
    /// Receive-buffer pool allocation and recycling
    BufferPool = 2,
    /// Reference clock descriptor registration and reads
    Refclock = 3,
    /// Statistics reporting
    Stats = 4,
    /// Test harness and fixtures
    Test = 5,

    /// Fallback for uncategorized messages
    Unknown = 255,
}

impl Facility {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Facility::Daemon => "Daemon",
            Facility::Netio => "Netio",
            Facility::BufferPool => "BufferPool",
            Facility::Refclock => "Refclock",
            Facility::Stats => "Stats",
            Facility::Test => "Test",
            Facility::Unknown => "Unknown",
        }
    }

    /// Create from u8 value (returns Unknown if invalid)
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Facility::Daemon,
            1 => Facility::Netio,
            2 => Facility::BufferPool,
            3 => Facility::Refclock,
            4 => Facility::Stats,
            5 => Facility::Test,
            _ => Facility::Unknown,
        }
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
