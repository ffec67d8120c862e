//! The port contract (§4.7): the architecture adaptation boundary.
//!
//! A `Port` owns everything machine-specific — stack frame layout, the
//! tick source, critical sections, and the actual context switch. It
//! never calls scheduler policy itself; it only invokes the core's
//! `Kernel::schedule`/`Kernel::tick` hooks and the pend/yield glue in
//! the `kernel` module.

use crate::config::TickSource;

/// The task trampoline's signature. Every prepared stack frame's
/// program counter points here, never directly at the task's own
/// entry function (see §4.4).
pub type Trampoline = extern "C" fn() -> !;

/// Architecture adaptation, implemented once per supported target.
pub trait Port {
    /// Builds an initial machine-stack frame inside
    /// `[stack_base, stack_base + stack_words)` such that a
    /// context-restore executes `trampoline` in the task's own stack.
    /// Returns the prepared stack pointer.
    fn prepare_task_stack(
        stack_base: *mut u32,
        stack_words: usize,
        trampoline: Trampoline,
    ) -> *mut u32;

    /// Arms a periodic tick source at `tick_hz` using `core_hz` if
    /// `src` is `Internal`; a no-op for `External`.
    fn start_tick(tick_hz: u32, core_hz: u32, src: TickSource);

    /// ISR-safe request that a context switch happen at the next safe
    /// point.
    fn pend_context_switch();

    /// Task-context cooperative hop into the scheduler. Returns once
    /// this task has been switched back in.
    fn yield_to_scheduler();

    /// Called once from `kernel::start()`. Primes the first task's
    /// stack pointer, enables interrupts, pends the first switch, and
    /// never returns.
    fn enter_scheduler(first_sp: *mut u32) -> !;

    /// Low-power wait for any interrupt or event.
    fn idle_wait();

    /// Enters a nestable critical section that masks preemption.
    fn crit_enter();

    /// Exits a nestable critical section; the outermost exit restores
    /// the mask saved by the matching outermost `crit_enter`.
    fn crit_exit();
}
