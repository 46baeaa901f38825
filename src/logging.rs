//! # Logging Channel
//!
//! The engine never logs through a global. The orchestrator and every
//! executor receive a [`LogHandle`]: a cheap, clonable handle that filters by
//! [`LogLevel`], tags messages with a subject (run, node or node copy) and
//! forwards to a shared [`LogChannel`].
//!
//! Two channels ship with the crate:
//!
//! - [`TracingLogChannel`] (default) forwards to the `tracing` crate.
//! - [`MemoryLogChannel`] buffers lines and snapshots, for embedding and tests.
//!
//! [`init_tracing`] installs a `tracing-subscriber` formatter; call it once at
//! the outermost entry point.

use crate::config::LogLevel;
use crate::error::{EngineError, Result};
use crate::metrics::{MetricsSnapshot, SnapshotType};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

/// Destination for engine log lines and metric snapshots.
pub trait LogChannel: Send + Sync {
  /// Records one log line. `level` has already passed the handle's filter.
  fn log(&self, level: LogLevel, subject: &str, message: &str);

  /// Records one metric snapshot.
  fn snapshot(&self, snapshot: MetricsSnapshot);
}

/// Forwards log lines to `tracing` and snapshots to `trace!` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogChannel;

impl LogChannel for TracingLogChannel {
  fn log(&self, level: LogLevel, subject: &str, message: &str) {
    match level {
      LogLevel::Nothing => {}
      LogLevel::Error => error!(subject, "{}", message),
      LogLevel::Minimal | LogLevel::Basic => info!(subject, "{}", message),
      LogLevel::Detailed | LogLevel::Debug => debug!(subject, "{}", message),
      LogLevel::RowLevel => trace!(subject, "{}", message),
    }
  }

  fn snapshot(&self, snapshot: MetricsSnapshot) {
    trace!(
      metric = %snapshot.metric,
      snapshot = ?snapshot.snapshot,
      subject = snapshot.subject.as_deref().unwrap_or(""),
      value = snapshot.value,
      "metric snapshot"
    );
  }
}

/// A buffered log line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
  /// Level the line was logged at.
  pub level: LogLevel,
  /// Subject that logged it.
  pub subject: String,
  /// Message text.
  pub message: String,
}

/// Buffers everything in memory.
#[derive(Debug, Default)]
pub struct MemoryLogChannel {
  lines: Mutex<Vec<LogLine>>,
  snapshots: Mutex<Vec<MetricsSnapshot>>,
}

impl MemoryLogChannel {
  /// Creates an empty channel.
  pub fn new() -> Self {
    Self::default()
  }

  /// Copy of every buffered line.
  pub fn lines(&self) -> Vec<LogLine> {
    self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Copy of every buffered snapshot.
  pub fn snapshots(&self) -> Vec<MetricsSnapshot> {
    self
      .snapshots
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  /// Returns `true` if any line from `subject` contains `needle`.
  pub fn contains(&self, subject: &str, needle: &str) -> bool {
    self
      .lines
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .iter()
      .any(|line| line.subject == subject && line.message.contains(needle))
  }
}

impl LogChannel for MemoryLogChannel {
  fn log(&self, level: LogLevel, subject: &str, message: &str) {
    self
      .lines
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(LogLine {
        level,
        subject: subject.to_string(),
        message: message.to_string(),
      });
  }

  fn snapshot(&self, snapshot: MetricsSnapshot) {
    self
      .snapshots
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(snapshot);
  }
}

/// Level-filtering, subject-tagging handle onto a [`LogChannel`].
#[derive(Clone)]
pub struct LogHandle {
  channel: Arc<dyn LogChannel>,
  subject: Arc<str>,
  level: LogLevel,
  gather_metrics: bool,
}

impl fmt::Debug for LogHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LogHandle")
      .field("subject", &self.subject)
      .field("level", &self.level)
      .field("gather_metrics", &self.gather_metrics)
      .finish()
  }
}

impl LogHandle {
  /// Creates a handle.
  ///
  /// # Arguments
  ///
  /// * `channel` - Destination of every line and snapshot.
  /// * `subject` - Tag attached to every line.
  /// * `level` - Lines above this level are dropped.
  /// * `gather_metrics` - Whether snapshots are forwarded at all.
  pub fn new(channel: Arc<dyn LogChannel>, subject: impl Into<String>, level: LogLevel, gather_metrics: bool) -> Self {
    Self {
      channel,
      subject: Arc::from(subject.into()),
      level,
      gather_metrics,
    }
  }

  /// Handle with the same channel and settings but another subject.
  pub fn child(&self, subject: impl Into<String>) -> Self {
    Self {
      channel: Arc::clone(&self.channel),
      subject: Arc::from(subject.into()),
      level: self.level,
      gather_metrics: self.gather_metrics,
    }
  }

  /// Subject tag of this handle.
  pub fn subject(&self) -> &str {
    &self.subject
  }

  /// Threshold of this handle.
  pub fn level(&self) -> LogLevel {
    self.level
  }

  /// Returns `true` when lines at `level` are forwarded.
  #[inline]
  pub fn is_enabled(&self, level: LogLevel) -> bool {
    self.level.enabled(level)
  }

  /// Returns `true` when snapshots are forwarded.
  pub fn gathers_metrics(&self) -> bool {
    self.gather_metrics
  }

  /// Logs `message` at `level` if enabled.
  pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
    if self.is_enabled(level) {
      self.channel.log(level, &self.subject, message.as_ref());
    }
  }

  /// Logs at [`LogLevel::Error`].
  pub fn error(&self, message: impl AsRef<str>) {
    self.log(LogLevel::Error, message);
  }

  /// Logs at [`LogLevel::Minimal`].
  pub fn minimal(&self, message: impl AsRef<str>) {
    self.log(LogLevel::Minimal, message);
  }

  /// Logs at [`LogLevel::Basic`].
  pub fn basic(&self, message: impl AsRef<str>) {
    self.log(LogLevel::Basic, message);
  }

  /// Logs at [`LogLevel::Detailed`].
  pub fn detailed(&self, message: impl AsRef<str>) {
    self.log(LogLevel::Detailed, message);
  }

  /// Logs at [`LogLevel::Debug`].
  pub fn debug(&self, message: impl AsRef<str>) {
    self.log(LogLevel::Debug, message);
  }

  /// Logs at [`LogLevel::RowLevel`].
  pub fn row_level(&self, message: impl AsRef<str>) {
    self.log(LogLevel::RowLevel, message);
  }

  /// Emits a snapshot if metrics gathering is on.
  pub fn snap(&self, metric: &str, snapshot: SnapshotType, subject: Option<&str>, value: Option<i64>) {
    if self.gather_metrics {
      self
        .channel
        .snapshot(MetricsSnapshot::new(metric, snapshot, subject, value));
    }
  }

  /// Emits a `START` snapshot.
  pub fn snap_start(&self, metric: &str, subject: Option<&str>) {
    self.snap(metric, SnapshotType::Start, subject, None);
  }

  /// Emits a `STOP` snapshot.
  pub fn snap_stop(&self, metric: &str, subject: Option<&str>) {
    self.snap(metric, SnapshotType::Stop, subject, None);
  }
}

/// Installs a global `tracing-subscriber` formatter filtered at `level`.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] if a global subscriber is already
/// installed.
pub fn init_tracing(level: LogLevel) -> Result<()> {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(level.filter_directive()));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .try_init()
    .map_err(|e| EngineError::Configuration(format!("cannot install tracing subscriber: {}", e)))
}
