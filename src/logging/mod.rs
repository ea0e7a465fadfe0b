// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging subsystem: severity/facility taxonomy and the logger handle

mod facility;
mod logger;
mod severity;

pub use facility::Facility;
pub use logger::{CaptureSink, LogEntry, LogSink, Logger, StderrSink};
pub use severity::Severity;
