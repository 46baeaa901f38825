//! # Row Set
//!
//! A bounded FIFO queue of records between exactly one producer copy and one
//! consumer copy. Capacity is the only backpressure mechanism: `put` suspends
//! while the buffer is full, `get` suspends while it is empty and the writer
//! has not signalled done. Both wake up and give up once the run-wide
//! [`StopSignal`] is raised.
//!
//! The internal lock is never held across an `.await`.

use crate::schema::RowSchema;
use crate::signal::StopSignal;
use crate::value::Record;
use std::collections::VecDeque;
use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Default capacity of a Row Set, in records.
pub const DEFAULT_ROW_SET_CAPACITY: usize = 10_000;

/// One side of a Row Set: a node name and a copy index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
  /// Node name.
  pub node: String,
  /// Copy index, starting at 0.
  pub copy: usize,
}

impl Endpoint {
  /// Creates an endpoint.
  pub fn new(node: impl Into<String>, copy: usize) -> Self {
    Self {
      node: node.into(),
      copy,
    }
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.node, self.copy)
  }
}

/// A schema-tagged record as stored in a Row Set.
pub type Row = (Arc<RowSchema>, Record);

#[derive(Default)]
struct Inner {
  queue: VecDeque<Row>,
  schema: Option<Arc<RowSchema>>,
}

/// Bounded, thread-safe FIFO queue between one producer and one consumer.
pub struct RowSet {
  name: String,
  origin: Endpoint,
  destination: Endpoint,
  capacity: usize,
  inner: Mutex<Inner>,
  done: AtomicBool,
  stop: StopSignal,
  not_empty: Notify,
  not_full: Notify,
  high_water: AtomicUsize,
}

impl fmt::Debug for RowSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RowSet")
      .field("name", &self.name)
      .field("capacity", &self.capacity)
      .field("len", &self.len())
      .field("done", &self.is_done())
      .finish()
  }
}

impl RowSet {
  /// Creates an empty Row Set.
  ///
  /// # Arguments
  ///
  /// * `origin` - The producer copy.
  /// * `destination` - The consumer copy.
  /// * `capacity` - Maximum number of buffered records; values below 1 are
  ///   raised to 1.
  /// * `stop` - The run-wide stop signal.
  pub fn new(origin: Endpoint, destination: Endpoint, capacity: usize, stop: StopSignal) -> Self {
    let capacity = capacity.max(1);
    Self {
      name: format!("{} - {}", origin, destination),
      origin,
      destination,
      capacity,
      inner: Mutex::new(Inner {
        queue: VecDeque::with_capacity(capacity.min(1024)),
        schema: None,
      }),
      done: AtomicBool::new(false),
      stop,
      not_empty: Notify::new(),
      not_full: Notify::new(),
      high_water: AtomicUsize::new(0),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Display name, `"origin.copy - destination.copy"`.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The producer copy.
  pub fn origin(&self) -> &Endpoint {
    &self.origin
  }

  /// The consumer copy.
  pub fn destination(&self) -> &Endpoint {
    &self.destination
  }

  /// Maximum number of buffered records.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Number of buffered records.
  pub fn len(&self) -> usize {
    self.lock().queue.len()
  }

  /// Returns `true` when no record is buffered.
  pub fn is_empty(&self) -> bool {
    self.lock().queue.is_empty()
  }

  /// Returns `true` once the writer has signalled end of stream.
  pub fn is_done(&self) -> bool {
    self.done.load(Ordering::Acquire)
  }

  /// Schema of the most recently written record.
  pub fn schema(&self) -> Option<Arc<RowSchema>> {
    self.lock().schema.clone()
  }

  /// Largest number of records ever buffered at once.
  pub fn high_water(&self) -> usize {
    self.high_water.load(Ordering::Relaxed)
  }

  /// Appends a record without waiting.
  ///
  /// Returns the record back if the buffer is full.
  pub fn try_put(&self, schema: &Arc<RowSchema>, record: Record) -> Result<(), Record> {
    let depth = {
      let mut inner = self.lock();
      if inner.queue.len() >= self.capacity {
        return Err(record);
      }
      let same = inner
        .schema
        .as_ref()
        .is_some_and(|current| Arc::ptr_eq(current, schema));
      if !same {
        inner.schema = Some(Arc::clone(schema));
      }
      inner.queue.push_back((Arc::clone(schema), record));
      inner.queue.len()
    };
    self.high_water.fetch_max(depth, Ordering::Relaxed);
    self.not_empty.notify_one();
    Ok(())
  }

  /// Appends a record, suspending while the buffer is full.
  ///
  /// Returns `false` if the run was stopped before the record could be
  /// buffered; the record is dropped in that case.
  pub async fn put(&self, schema: &Arc<RowSchema>, record: Record) -> bool {
    let mut record = record;
    loop {
      let mut notified = pin!(self.not_full.notified());
      notified.as_mut().enable();

      if self.stop.is_stopped() {
        return false;
      }
      match self.try_put(schema, record) {
        Ok(()) => return true,
        Err(back) => record = back,
      }
      notified.await;
    }
  }

  /// Removes the oldest record without waiting.
  pub fn try_get(&self) -> Option<Row> {
    let row = self.lock().queue.pop_front();
    if row.is_some() {
      self.not_full.notify_one();
    }
    row
  }

  /// Removes the oldest record, suspending while the buffer is empty and the
  /// writer is not done.
  ///
  /// Returns `None` once the buffer is drained and done has been signalled,
  /// or as soon as the run is stopped.
  pub async fn get(&self) -> Option<Row> {
    loop {
      let mut notified = pin!(self.not_empty.notified());
      notified.as_mut().enable();

      if self.stop.is_stopped() {
        return None;
      }
      if let Some(row) = self.try_get() {
        return Some(row);
      }
      if self.is_done() {
        // A final put may have landed between the empty check and the flag.
        return self.try_get();
      }
      notified.await;
    }
  }

  /// Signals end of stream. Idempotent; wakes every waiter.
  pub fn mark_done(&self) {
    self.done.store(true, Ordering::Release);
    self.wake();
  }

  /// Wakes every task suspended in `put` or `get` so it re-checks its
  /// conditions.
  pub fn wake(&self) {
    self.not_empty.notify_waiters();
    self.not_full.notify_waiters();
  }
}
