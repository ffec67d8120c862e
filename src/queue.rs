//! Fixed-capacity queue of fixed-size items with separate FIFO waiter
//! lists for senders and receivers (§4.6).
//!
//! Storage is caller-owned (`&'a mut [T]`), an idiomatic stand-in for
//! the original's `capacity × item_size` byte buffer that keeps the
//! ring logic generic without `unsafe` byte copies. Blocking methods
//! take an explicit `&mut Kernel`, the same convention as
//! [`crate::sem::Semaphore`] — host-testable without the port, with
//! the `kernel` module supplying the global instance and the
//! pend/yield half of a blocking call.

use crate::config::MAX_TASKS;
use crate::error::{self, Error};
use crate::ring::IdRing;
use crate::scheduler::Kernel;
use crate::task::TaskState;

/// A fixed-capacity ring of `T`, backed by caller-owned storage.
/// `storage.len()` is the queue's capacity.
pub struct Queue<'a, T> {
    buf: &'a mut [T],
    head: usize,
    tail: usize,
    count: usize,
    rx_waiters: IdRing<MAX_TASKS>,
    tx_waiters: IdRing<MAX_TASKS>,
}

impl<'a, T: Copy> Queue<'a, T> {
    pub fn new(storage: &'a mut [T]) -> Self {
        debug_assert!(!storage.is_empty(), "queue storage must be non-empty");
        Queue {
            buf: storage,
            head: 0,
            tail: 0,
            count: 0,
            rx_waiters: IdRing::new(),
            tx_waiters: IdRing::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.buf.len()
    }

    fn enqueue(&mut self, item: T) {
        self.buf[self.tail] = item;
        self.tail = (self.tail + 1) % self.buf.len();
        self.count += 1;
    }

    fn dequeue(&mut self) -> T {
        let item = self.buf[self.head];
        self.head = (self.head + 1) % self.buf.len();
        self.count -= 1;
        item
    }

    /// Non-blocking send. On success, returns whether a receiver was
    /// woken (the caller must then let it run).
    pub(crate) fn try_send_locked(&mut self, k: &mut Kernel, item: T) -> Result<bool, ()> {
        if self.is_full() {
            return Err(());
        }
        self.enqueue(item);
        Ok(match self.rx_waiters.pop() {
            Some(w) => {
                k.make_ready(w);
                true
            }
            None => false,
        })
    }

    /// Non-blocking receive. On success, returns the item and whether
    /// a sender was woken.
    pub(crate) fn try_recv_locked(&mut self, k: &mut Kernel) -> Result<(T, bool), ()> {
        if self.is_empty() {
            return Err(());
        }
        let item = self.dequeue();
        let woken = match self.tx_waiters.pop() {
            Some(w) => {
                k.make_ready(w);
                true
            }
            None => false,
        };
        Ok((item, woken))
    }

    /// Parks `me` on the tx waiter FIFO and marks it Blocked. Expects
    /// the caller to have already re-checked that the queue is full.
    pub(crate) fn park_sender(&mut self, k: &mut Kernel, me: u8) {
        if !self.tx_waiters.try_push(me) {
            error::report(Error::ReadyOverflow);
            return;
        }
        k.tasks[me as usize].state = TaskState::Blocked;
    }

    /// Parks `me` on the rx waiter FIFO and marks it Blocked. Expects
    /// the caller to have already re-checked that the queue is empty.
    pub(crate) fn park_receiver(&mut self, k: &mut Kernel, me: u8) {
        if !self.rx_waiters.try_push(me) {
            error::report(Error::ReadyOverflow);
            return;
        }
        k.tasks[me as usize].state = TaskState::Blocked;
    }
}
