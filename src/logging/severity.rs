// SPDX-License-Identifier: Apache-2.0 OR MIT
// Severity levels for logging (RFC 5424 syslog-style)

use serde::{Deserialize, Serialize};

/// Log severity levels (0-7, lower is more severe)
///
/// The daemon historically reported through syslog, so the full RFC 5424
/// ladder is kept even though most messages land on Error/Info/Debug.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// System unusable (I/O context cannot be constructed)
    Emergency = 0,
    /// Immediate action required (all interfaces lost)
    Alert = 1,
    /// Critical conditions (buffer pool exhaustion)
    Critical = 2,
    /// Error conditions (bind failure, receive error, send failure)
    Error = 3,
    /// Warning conditions (use-count drift, duplicate multicast join)
    Warning = 4,
    /// Significant normal condition (interface listening, broadcast client up)
    Notice = 5,
    /// Informational (startup summary, stats interval)
    Info = 6,
    /// Debug-level messages (per-packet traces)
    Debug = 7,
}

impl Severity {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    /// Create from u8 value (returns None if invalid)
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Severity::Emergency),
            1 => Some(Severity::Alert),
            2 => Some(Severity::Critical),
            3 => Some(Severity::Error),
            4 => Some(Severity::Warning),
            5 => Some(Severity::Notice),
            6 => Some(Severity::Info),
            7 => Some(Severity::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    /// Case-insensitive parse, used by the CLI `--log-level` flag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emergency" => Ok(Severity::Emergency),
            "alert" => Ok(Severity::Alert),
            "critical" => Ok(Severity::Critical),
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "notice" => Ok(Severity::Notice),
            "info" => Ok(Severity::Info),
            "debug" => Ok(Severity::Debug),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Emergency < Severity::Alert);
        assert!(Severity::Error < Severity::Warning);
        assert!(Severity::Notice < Severity::Info);
        assert!(Severity::Info < Severity::Debug);
    }

    #[test]
    fn test_severity_from_u8() {
        assert_eq!(Severity::from_u8(0), Some(Severity::Emergency));
        assert_eq!(Severity::from_u8(7), Some(Severity::Debug));
        assert_eq!(Severity::from_u8(8), None);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("error".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("DEBUG".parse::<Severity>(), Ok(Severity::Debug));
        assert!("verbose".parse::<Severity>().is_err());
    }
}
