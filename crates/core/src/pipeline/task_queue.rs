use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// What a consumer gets from [`BoundedTaskQueue::wait_for_task`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Task<T> {
    Process(T),
    /// The queue is closed and drained; the consumer should exit.
    Stop,
}

/// Rejected admission. The item is handed back, never dropped.
#[derive(Clone, PartialEq, Eq)]
pub enum AddError<T> {
    Full(T),
    Closed(T),
}

impl<T> AddError<T> {
    pub fn into_inner(self) -> T {
        match self {
            AddError::Full(item) | AddError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for AddError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddError::Full(_) => f.write_str("Full(..)"),
            AddError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for AddError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddError::Full(_) => f.write_str("task queue is full"),
            AddError::Closed(_) => f.write_str("task queue is closed"),
        }
    }
}

impl<T> std::error::Error for AddError<T> {}

struct QueueState<T> {
    items: VecDeque<T>,
    open: bool,
}

/// Thread-safe FIFO mailbox with a fixed capacity and graceful close.
///
/// Every admitted item is delivered to exactly one consumer. After
/// [`close`](Self::close) nothing more is admitted; consumers drain what is
/// left and then each receives [`Task::Stop`].
pub struct BoundedTaskQueue<T> {
    state: Mutex<QueueState<T>>,
    task_available: Condvar,
    space_available: Condvar,
    capacity: usize,
}

impl<T> BoundedTaskQueue<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                open: true,
            }),
            task_available: Condvar::new(),
            space_available: Condvar::new(),
            capacity,
        }
    }

    /// Admits `item` without blocking.
    pub fn try_add(&self, item: T) -> Result<(), AddError<T>> {
        let mut state = self.lock();
        if !state.open {
            return Err(AddError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(AddError::Full(item));
        }
        self.push(&mut state, item);
        Ok(())
    }

    /// Admits `item`, blocking while the queue is full.
    ///
    /// Fails only if the queue is or becomes closed.
    pub fn add(&self, item: T) -> Result<(), AddError<T>> {
        let mut state = self.lock();
        while state.open && state.items.len() >= self.capacity {
            state = self
                .space_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if !state.open {
            return Err(AddError::Closed(item));
        }
        self.push(&mut state, item);
        Ok(())
    }

    /// Like [`add`](Self::add), but gives up with [`AddError::Full`] after `timeout`.
    pub fn add_timeout(&self, item: T, timeout: Duration) -> Result<(), AddError<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.open && state.items.len() >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Err(AddError::Full(item));
            }
            state = self
                .space_available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if !state.open {
            return Err(AddError::Closed(item));
        }
        self.push(&mut state, item);
        Ok(())
    }

    /// Blocks until an item is available or the queue is closed and empty.
    pub fn wait_for_task(&self) -> Task<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.space_available.notify_one();
                return Task::Process(item);
            }
            if !state.open {
                return Task::Stop;
            }
            state = self
                .task_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stops admission and wakes every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.open {
            return;
        }
        state.open = false;
        drop(state);
        self.task_available.notify_all();
        self.space_available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        !self.lock().open
    }

    fn push(&self, state: &mut QueueState<T>, item: T) {
        state.items.push_back(item);
        self.task_available.notify_one();
    }

    // No operation leaves the state half-updated, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
