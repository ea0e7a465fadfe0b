// SPDX-License-Identifier: Apache-2.0 OR MIT
//! UDP time-service I/O core: a recycling receive-buffer pool and a
//! multi-interface socket manager.
//!
//! The crate binds one UDP socket per usable local address (plus wildcard
//! catch-alls that never listen), polls them without blocking, and queues
//! arriving datagrams in fixed-size pooled buffers for a protocol engine
//! to drain. Reference clock descriptors share the same poll set and
//! buffer pool.

pub mod config;
pub mod logging;
pub mod netio;
pub mod recvbuf;

pub use config::{Config, ConfigError};
pub use logging::{Facility, Logger, Severity};
pub use netio::{AddrKind, IoContext, IoStats, RemoteAddress};
pub use recvbuf::{Receiver, RecvBuf, RecvBufPool, RECV_INC, RECV_INIT, RX_BUFF_SIZE};
