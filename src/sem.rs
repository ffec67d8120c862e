//! Binary semaphore: a single availability bit plus a FIFO waiter list.
//!
//! Blocking methods take an explicit `&mut Kernel` so the class itself
//! stays free of any global/port dependency — host-testable in
//! isolation. The `kernel` module's public wrappers supply the global
//! kernel instance and handle the pend/yield half of a blocking call.

use crate::config::MAX_TASKS;
use crate::ring::IdRing;
use crate::scheduler::Kernel;
use crate::task::TaskState;

/// A binary semaphore. `bit = 1` implies the waiter FIFO is empty, and
/// vice versa — the two states are mutually exclusive by construction.
pub struct Semaphore {
    available: bool,
    waiters: IdRing<MAX_TASKS>,
}

impl Semaphore {
    pub const fn new(initially_available: bool) -> Self {
        Semaphore {
            available: initially_available,
            waiters: IdRing::new(),
        }
    }

    /// Non-blocking take: clears the bit and succeeds if it was set.
    pub fn try_take(&mut self) -> bool {
        if self.available {
            self.available = false;
            true
        } else {
            false
        }
    }

    /// Blocking take. Returns `true` if the caller must now pend a
    /// switch and yield to the scheduler (i.e. it blocked); `false` if
    /// it acquired the semaphore immediately.
    pub(crate) fn take_locked(&mut self, k: &mut Kernel, me: u8) -> bool {
        if self.try_take() {
            return false;
        }
        if !self.waiters.try_push(me) {
            crate::error::report(crate::error::Error::ReadyOverflow);
            return false;
        }
        k.tasks[me as usize].state = TaskState::Blocked;
        true
    }

    /// Give logic shared by the task-context and ISR-context callers:
    /// if a waiter is pending, pop and ready it (the bit is never set
    /// in this path — ownership passes directly); otherwise set the
    /// bit. Returns whether a waiter was woken (the caller must then
    /// yield or pend a switch).
    pub(crate) fn give_locked(&mut self, k: &mut Kernel) -> bool {
        if let Some(w) = self.waiters.pop() {
            k.make_ready(w);
            true
        } else {
            self.available = true;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_take_succeeds_once_then_fails() {
        let mut sem = Semaphore::new(true);
        assert!(sem.try_take());
        assert!(!sem.try_take());
    }

    #[test]
    fn give_sets_bit_with_no_waiters() {
        let mut k = Kernel::new();
        let mut sem = Semaphore::new(false);
        let woken = sem.give_locked(&mut k);
        assert!(!woken);
        assert!(sem.try_take());
    }

    #[test]
    fn double_give_collapses_to_available() {
        let mut k = Kernel::new();
        let mut sem = Semaphore::new(false);
        sem.give_locked(&mut k);
        sem.give_locked(&mut k);
        assert!(sem.try_take());
        assert!(!sem.try_take());
    }

    #[test]
    fn blocked_take_parks_caller_on_waiter_fifo() {
        let mut k = Kernel::new();
        let mut sem = Semaphore::new(false);
        let blocked = sem.take_locked(&mut k, 3);
        assert!(blocked);
        assert_eq!(k.tasks[3].state, TaskState::Blocked);
    }

    #[test]
    fn give_wakes_blocked_waiter_without_setting_bit() {
        let mut k = Kernel::new();
        k.tasks[2].state = TaskState::Blocked;
        let mut sem = Semaphore::new(false);
        sem.take_locked(&mut k, 2);
        let woken = sem.give_locked(&mut k);
        assert!(woken);
        assert_eq!(k.tasks[2].state, TaskState::Ready);
        // Ownership passed directly; the bit was never set.
        assert!(!sem.try_take());
    }

    #[test]
    fn fifo_order_across_three_waiters() {
        let mut k = Kernel::new();
        let mut sem = Semaphore::new(false);
        assert!(sem.take_locked(&mut k, 0));
        assert!(sem.take_locked(&mut k, 1));
        assert!(sem.take_locked(&mut k, 2));

        sem.give_locked(&mut k);
        assert_eq!(k.tasks[0].state, TaskState::Ready);
        sem.give_locked(&mut k);
        assert_eq!(k.tasks[1].state, TaskState::Ready);
        sem.give_locked(&mut k);
        assert_eq!(k.tasks[2].state, TaskState::Ready);
    }
}
