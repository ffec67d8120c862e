//! Error taxonomy and the last-error hook.
//!
//! Invariant violations (bugs in the kernel or the port) never unwind or
//! return to the caller; they are reported through [`report`] and recorded
//! in a single well-known location, mirroring the original `hrt_error`
//! hook. Only legitimate caller-input failures (`create_task` with bad
//! arguments, `try_take`/`try_send`/`try_recv` against a full/empty
//! object) are returned as `Result`/`Option` values.

use core::sync::atomic::{AtomicU8, Ordering};

/// Kernel error taxonomy. `None` is reserved for "no error recorded".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Error {
    InvalidId = 1,
    InvalidNextId = 2,
    SpNull = 3,
    TcbNull = 4,
    InvalidTask = 5,
    NoSlot = 6,
    InvalidPrio = 7,
    ReadyOverflow = 8,
    ReadyUnderflow = 9,
    InvalidIdFromReady = 10,
    StackUnderflowInit = 11,
    StackRange = 12,
    StackAlign = 13,
    InvalidRamRange = 14,
    DupReady = 15,
}

static LAST_ERROR: AtomicU8 = AtomicU8::new(0);

/// Records a fatal invariant violation. Expected to be called with
/// preemption masked. With the `stall-on-error` feature enabled, spins
/// forever after recording — matching the original's
/// `HRT_STALL_ON_ERROR` build flag.
pub fn report(code: Error) {
    LAST_ERROR.store(code as u8, Ordering::Relaxed);

    #[cfg(feature = "stall-on-error")]
    loop {
        core::sync::atomic::compiler_fence(Ordering::SeqCst);
    }
}

/// Returns the last recorded fatal error, if any, without clearing it.
pub fn last_error() -> Option<Error> {
    match LAST_ERROR.load(Ordering::Relaxed) {
        0 => None,
        1 => Some(Error::InvalidId),
        2 => Some(Error::InvalidNextId),
        3 => Some(Error::SpNull),
        4 => Some(Error::TcbNull),
        5 => Some(Error::InvalidTask),
        6 => Some(Error::NoSlot),
        7 => Some(Error::InvalidPrio),
        8 => Some(Error::ReadyOverflow),
        9 => Some(Error::ReadyUnderflow),
        10 => Some(Error::InvalidIdFromReady),
        11 => Some(Error::StackUnderflowInit),
        12 => Some(Error::StackRange),
        13 => Some(Error::StackAlign),
        14 => Some(Error::InvalidRamRange),
        15 => Some(Error::DupReady),
        _ => None,
    }
}

/// Clears the last recorded error. Primarily useful for tests.
#[cfg(test)]
pub(crate) fn clear() {
    LAST_ERROR.store(0, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_and_read_back() {
        clear();
        assert_eq!(last_error(), None);
        report(Error::DupReady);
        assert_eq!(last_error(), Some(Error::DupReady));
        clear();
    }

    #[test]
    fn last_write_wins() {
        clear();
        report(Error::ReadyOverflow);
        report(Error::TcbNull);
        assert_eq!(last_error(), Some(Error::TcbNull));
        clear();
    }
}
