//! Top-level kernel: the single global [`Kernel`] instance, the task
//! trampoline, and the public API surface (§6) that glues the
//! port-free scheduling core to the [`Port`].
//!
//! Every function here masks preemption for the whole of its kernel
//! state access via [`with_kernel`], then performs the pend/yield half
//! of a blocking call *outside* the critical section, mirroring the
//! original's `hrt_port_crit_enter/exit` ... `hrt__pend_context_switch`
//! ... `hrt_port_yield_to_scheduler` sequencing.

use crate::arch::cortex_m4::CortexM4;
use crate::config::{Config, Policy, TaskAttr, TickSource, IDLE_STACK_WORDS, IDLE_TASK_ID};
use crate::error::Error;
use crate::port::Port;
use crate::queue::Queue;
use crate::scheduler::Kernel;
use crate::sem::Semaphore;
use crate::task::TaskEntry;

type ActivePort = CortexM4;

/// The single kernel instance. Accessed only through [`with_kernel`],
/// which masks preemption around every read or write.
static mut KERNEL: Kernel = Kernel::new();

/// Raw pointer mirror of `KERNEL`, set once by [`init`]. Exists so the
/// naked `PendSV` handler (which cannot hold a Rust reference across
/// its asm block) can reach kernel state without reaching past the
/// port boundary into scheduler internals.
#[no_mangle]
pub static mut KERNEL_PTR: *mut Kernel = core::ptr::null_mut();

/// The idle task's own stack, a genuine task-table slot (§4.2) rather
/// than a special case in the scheduler.
static mut IDLE_STACK: [u32; IDLE_STACK_WORDS] = [0; IDLE_STACK_WORDS];

#[inline]
fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    ActivePort::crit_enter();
    let r = unsafe { f(&mut *core::ptr::addr_of_mut!(KERNEL)) };
    ActivePort::crit_exit();
    r
}

/// Requeues the current task (RR semantics) and hops to the scheduler.
/// Shared by every blocking operation's "a waiter was woken, let it
/// run" tail, and by the public `yield_now`.
fn requeue_self_and_switch() {
    with_kernel(|k| k.yield_current());
    ActivePort::pend_context_switch();
    ActivePort::yield_to_scheduler();
}

/// The port's initial stack frame points here, never at a task's own
/// entry function (§4.4). Reads `(entry, arg)` from the current TCB,
/// calls it, and — if it ever returns — keeps the task Ready forever
/// on a self-pending loop rather than reclaiming the slot.
extern "C" fn task_trampoline() -> ! {
    let (entry, arg) = with_kernel(|k| {
        let id = k
            .current_id()
            .expect("trampoline entered with no current task");
        let t = &k.tasks[id as usize];
        (
            t.entry.expect("scheduled task has no entry function"),
            t.arg,
        )
    });
    entry(arg);
    loop {
        ActivePort::pend_context_switch();
        ActivePort::idle_wait();
    }
}

/// Must be called exactly once, before any other kernel API.
pub fn init(config: Config) {
    let cfg = config.normalized();
    unsafe {
        KERNEL = Kernel::new();
        KERNEL_PTR = core::ptr::addr_of_mut!(KERNEL);
    }
    with_kernel(|k| k.apply_config(cfg));

    with_kernel(|k| {
        let stack_base = unsafe { core::ptr::addr_of_mut!(IDLE_STACK) } as *mut u32;
        let idle = &mut k.tasks[IDLE_TASK_ID as usize];
        idle.init(
            idle_task_entry,
            core::ptr::null_mut(),
            stack_base,
            IDLE_STACK_WORDS,
            0,
            0,
        );
        idle.sp = ActivePort::prepare_task_stack(stack_base, IDLE_STACK_WORDS, idle_task_trampoline);
    });

    ActivePort::start_tick(cfg.tick_hz, cfg.core_hz, cfg.tick_src);
}

extern "C" fn idle_task_entry(_arg: *mut ()) {
    loop {
        ActivePort::idle_wait();
    }
}

/// The idle task never returns from its entry, so its trampoline is
/// just `idle_task_entry` run directly — no pend-and-wait tail needed.
extern "C" fn idle_task_trampoline() -> ! {
    idle_task_entry(core::ptr::null_mut());
    unreachable!("idle task entry never returns")
}

/// Creates a task. `stack` must be at least `MIN_STACK_WORDS` (64)
/// words and owned for the task's lifetime.
pub fn create_task(
    entry: TaskEntry,
    arg: *mut (),
    stack: &'static mut [u32],
    attr: Option<TaskAttr>,
) -> Result<u8, Error> {
    let stack_base = stack.as_mut_ptr();
    let stack_words = stack.len();
    with_kernel(|k| {
        let id = k.create_task_raw(entry, arg, stack_base, stack_words, attr)?;
        let sp = ActivePort::prepare_task_stack(stack_base, stack_words, task_trampoline);
        k.tasks[id as usize].sp = sp;
        Ok(id)
    })
}

/// Enters the scheduler. Never returns on this preemptive port.
pub fn start() -> ! {
    let idle_sp = with_kernel(|k| k.tasks[IDLE_TASK_ID as usize].sp);
    ActivePort::enter_scheduler(idle_sp)
}

/// Delays the calling task by at least `ms` milliseconds (≥ 1 tick).
pub fn sleep(ms: u32) {
    with_kernel(|k| k.sleep_current(ms));
    ActivePort::pend_context_switch();
    ActivePort::yield_to_scheduler();
}

/// Requeues the calling task at its priority's tail and picks the
/// next highest-priority ready task.
pub fn yield_now() {
    requeue_self_and_switch();
}

/// The monotonic tick counter. Wraps at `u32::MAX`.
pub fn tick_now() -> u32 {
    with_kernel(|k| k.tick_now())
}

/// Takes effect at the next scheduling point.
pub fn set_policy(p: Policy) {
    with_kernel(|k| k.set_policy(p));
}

/// Affects only tasks created after this call.
pub fn set_default_timeslice(t: u16) {
    with_kernel(|k| k.set_default_timeslice(t));
}

/// The port's internal periodic-timer interrupt entry. A no-op if the
/// kernel is configured for an External tick source, even though a
/// misconfigured port firing SysTick anyway must not double-advance
/// time.
pub(crate) fn tick_from_port() {
    let need_switch = with_kernel(|k| {
        if k.tick_src == TickSource::External {
            return false;
        }
        k.tick();
        k.needs_reschedule()
    });
    if need_switch {
        ActivePort::pend_context_switch();
    }
}

/// ISR-callable external-tick entry (§6). A no-op when the kernel is
/// configured for an Internal tick source, so a stray external tick
/// call cannot double-advance time.
pub fn tick_from_isr() {
    let need_switch = with_kernel(|k| {
        k.tick_from_isr();
        k.needs_reschedule()
    });
    if need_switch {
        ActivePort::pend_context_switch();
    }
}

/// The scheduler's context-switch point, called only from the port's
/// `PendSV`-equivalent handler.
pub(crate) fn schedule_from_port(old_sp: *mut u32) -> *mut u32 {
    with_kernel(|k| k.schedule(old_sp))
}

impl Semaphore {
    /// Blocking take. Returns once the semaphore has been acquired,
    /// whether immediately or after being given to by another task.
    pub fn take(&mut self) {
        let blocked = with_kernel(|k| {
            let me = k.current_id().unwrap_or(IDLE_TASK_ID);
            self.take_locked(k, me)
        });
        if blocked {
            ActivePort::pend_context_switch();
            ActivePort::yield_to_scheduler();
        }
    }

    /// Task-context give: wakes the FIFO-head waiter if any, else sets
    /// the availability bit. Yields afterward so a freshly woken
    /// higher-priority waiter can preempt immediately.
    pub fn give(&mut self) {
        let woken = with_kernel(|k| self.give_locked(k));
        if woken {
            requeue_self_and_switch();
        }
    }

    /// ISR-context give. Never yields; pends a switch and reports
    /// whether one is needed.
    pub fn give_from_isr(&mut self) -> bool {
        let woken = with_kernel(|k| self.give_locked(k));
        if woken {
            ActivePort::pend_context_switch();
        }
        woken
    }
}

impl<'a, T: Copy> Queue<'a, T> {
    /// Non-blocking send (task context). Yields if it woke a receiver.
    pub fn try_send(&mut self, item: T) -> bool {
        match with_kernel(|k| self.try_send_locked(k, item)) {
            Ok(woken) => {
                if woken {
                    requeue_self_and_switch();
                }
                true
            }
            Err(()) => false,
        }
    }

    /// Non-blocking receive (task context). Yields if it woke a sender.
    pub fn try_recv(&mut self) -> Option<T> {
        match with_kernel(|k| self.try_recv_locked(k)) {
            Ok((item, woken)) => {
                if woken {
                    requeue_self_and_switch();
                }
                Some(item)
            }
            Err(()) => None,
        }
    }

    /// ISR-context send. Never yields; reports whether a switch is
    /// needed and pends one itself.
    pub fn try_send_from_isr(&mut self, item: T) -> bool {
        match with_kernel(|k| self.try_send_locked(k, item)) {
            Ok(woken) => {
                if woken {
                    ActivePort::pend_context_switch();
                }
                true
            }
            Err(()) => false,
        }
    }

    /// ISR-context receive. Never yields.
    pub fn try_recv_from_isr(&mut self) -> Option<T> {
        match with_kernel(|k| self.try_recv_locked(k)) {
            Ok((item, woken)) => {
                if woken {
                    ActivePort::pend_context_switch();
                }
                Some(item)
            }
            Err(()) => None,
        }
    }

    /// Blocking send: retries `try_send`-equivalent logic, parking on
    /// the tx waiter FIFO when the queue stays full after a
    /// critical-section re-check.
    pub fn send(&mut self, item: T) {
        loop {
            let outcome = with_kernel(|k| {
                if !self.is_full() {
                    let woken = self
                        .try_send_locked(k, item)
                        .expect("re-checked non-full under the same critical section");
                    return Ok(woken);
                }
                let me = k.current_id().unwrap_or(IDLE_TASK_ID);
                self.park_sender(k, me);
                Err(())
            });
            match outcome {
                Ok(woken) => {
                    if woken {
                        requeue_self_and_switch();
                    }
                    return;
                }
                Err(()) => {
                    ActivePort::pend_context_switch();
                    ActivePort::yield_to_scheduler();
                }
            }
        }
    }

    /// Blocking receive: symmetric with [`Queue::send`].
    pub fn recv(&mut self) -> T {
        loop {
            let outcome = with_kernel(|k| {
                if !self.is_empty() {
                    let (item, woken) = self
                        .try_recv_locked(k)
                        .expect("re-checked non-empty under the same critical section");
                    return Ok((item, woken));
                }
                let me = k.current_id().unwrap_or(IDLE_TASK_ID);
                self.park_receiver(k, me);
                Err(())
            });
            match outcome {
                Ok((item, woken)) => {
                    if woken {
                        requeue_self_and_switch();
                    }
                    return item;
                }
                Err(()) => {
                    ActivePort::pend_context_switch();
                    ActivePort::yield_to_scheduler();
                }
            }
        }
    }
}
