//! Run-wide cooperative cancellation flag.
//!
//! One [`StopSignal`] exists per run. Every Row Set and every executor loop
//! observes it; only the orchestrator's run control raises it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A single atomically read/written boolean shared by everything in one run.
///
/// Cloning is cheap and every clone observes the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
  stopped: Arc<AtomicBool>,
}

impl StopSignal {
  /// Creates a new, un-raised signal.
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns `true` once the signal has been raised.
  #[inline]
  pub fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::Acquire)
  }

  /// Raises the signal.
  ///
  /// Returns `true` only for the call that actually flipped the flag, so the
  /// caller can tell the first stop request apart from repeats.
  pub fn raise(&self) -> bool {
    !self.stopped.swap(true, Ordering::AcqRel)
  }
}
