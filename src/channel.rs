use crate::error::{PipelineError, Result};
use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A fixed-capacity FIFO channel with blocking and non-blocking access
///
/// Items live in a crossbeam `ArrayQueue`; callers that cannot make progress
/// park on a condition variable instead of spinning. The mutex guards no data,
/// it only orders the "is it full/empty" check against the wakeup so that a
/// parked caller never misses the notification that would release it.
pub struct BoundedChannel<T> {
    name: &'static str,
    queue: ArrayQueue<T>,
    lock: Mutex<()>,
    not_full: Condvar,
    not_empty: Condvar,
    put_waits: AtomicU64,
    get_waits: AtomicU64,
    parked_putters: AtomicUsize,
    parked_getters: AtomicUsize,
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items
    pub fn new(name: &'static str, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::ConfigError(format!(
                "channel '{name}' must have a capacity of at least 1"
            )));
        }

        Ok(Self {
            name,
            queue: ArrayQueue::new(capacity),
            lock: Mutex::new(()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            put_waits: AtomicU64::new(0),
            get_waits: AtomicU64::new(0),
            parked_putters: AtomicUsize::new(0),
            parked_getters: AtomicUsize::new(0),
        })
    }

    /// Enqueue an item, suspending while the channel is full
    pub fn put(&self, mut item: T) {
        loop {
            match self.queue.push(item) {
                Ok(()) => {
                    self.wake(&self.not_empty);
                    return;
                }
                Err(rejected) => {
                    item = rejected;
                    let mut guard = self.lock.lock();
                    if self.queue.is_full() {
                        self.put_waits.fetch_add(1, Ordering::Relaxed);
                        self.parked_putters.fetch_add(1, Ordering::SeqCst);
                        self.not_full.wait(&mut guard);
                        self.parked_putters.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    /// Enqueue an item only if there is room, handing it back otherwise
    pub fn try_put(&self, item: T) -> std::result::Result<(), T> {
        self.queue.push(item)?;
        self.wake(&self.not_empty);
        Ok(())
    }

    /// Dequeue the oldest item, suspending while the channel is empty
    pub fn get(&self) -> T {
        loop {
            if let Some(item) = self.queue.pop() {
                self.wake(&self.not_full);
                return item;
            }

            let mut guard = self.lock.lock();
            if self.queue.is_empty() {
                self.get_waits.fetch_add(1, Ordering::Relaxed);
                self.parked_getters.fetch_add(1, Ordering::SeqCst);
                self.not_empty.wait(&mut guard);
                self.parked_getters.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Dequeue the oldest item if one is available, never suspending
    pub fn try_get(&self) -> Option<T> {
        let item = self.queue.pop()?;
        self.wake(&self.not_full);
        Some(item)
    }

    fn wake(&self, condvar: &Condvar) {
        let _guard = self.lock.lock();
        condvar.notify_one();
    }

    /// Name used in diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of items currently buffered
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Current fill level as a percentage (0-100)
    pub fn utilization(&self) -> u32 {
        ((self.len() * 100) / self.capacity()).min(100) as u32
    }

    /// Point-in-time view of the channel for diagnostics
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            name: self.name,
            len: self.len(),
            capacity: self.capacity(),
            utilization: self.utilization(),
            put_waits: self.put_waits.load(Ordering::Relaxed),
            get_waits: self.get_waits.load(Ordering::Relaxed),
            parked_putters: self.parked_putters.load(Ordering::SeqCst),
            parked_getters: self.parked_getters.load(Ordering::SeqCst),
        }
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Snapshot of a channel's occupancy and suspension counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    pub name: &'static str,
    pub len: usize,
    pub capacity: usize,
    pub utilization: u32,
    /// Times a put found the channel full and parked
    pub put_waits: u64,
    /// Times a get found the channel empty and parked
    pub get_waits: u64,
    /// Callers parked in `put` right now
    pub parked_putters: usize,
    /// Callers parked in `get` right now
    pub parked_getters: usize,
}

impl fmt::Display for ChannelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} ({}%), put waits {}, get waits {}, parked put/get {}/{}",
            self.name,
            self.len,
            self.capacity,
            self.utilization,
            self.put_waits,
            self.get_waits,
            self.parked_putters,
            self.parked_getters
        )
    }
}
