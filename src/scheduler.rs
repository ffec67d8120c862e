//! The kernel state: task table, per-priority ready queues, and the
//! pure fixed-priority selection/scheduling logic.
//!
//! Every method here is free of port dependencies — no critical-section
//! entry, no assembly, no memory-mapped registers — so the scheduling
//! logic itself is host-testable. The `kernel` module glues this to the
//! `Port` and owns the single global instance used at runtime.

use crate::config::{Config, Policy, TaskAttr, IDLE_TASK_ID, MAX_PRIO, MAX_TASKS};
use crate::error::{self, Error};
use crate::ring::IdRing;
use crate::task::{Tcb, TaskEntry, TaskState};

/// The kernel's task table, ready queues, and scheduling state.
pub struct Kernel {
    pub(crate) tasks: [Tcb; MAX_TASKS],
    pub(crate) ready: [IdRing<MAX_TASKS>; MAX_PRIO],
    pub(crate) current: Option<u8>,
    pub(crate) tick: u32,
    pub(crate) policy: Policy,
    pub(crate) default_slice: u16,
    pub(crate) tick_hz: u32,
    pub(crate) core_hz: u32,
    pub(crate) tick_src: crate::config::TickSource,
    pub(crate) needs_reschedule: bool,
}

impl Kernel {
    pub const fn new() -> Self {
        const EMPTY_RING: IdRing<MAX_TASKS> = IdRing::new();
        Kernel {
            tasks: [
                Tcb::empty(),
                Tcb::empty(),
                Tcb::empty(),
                Tcb::empty(),
                Tcb::empty(),
                Tcb::empty(),
                Tcb::empty(),
                Tcb::empty(),
            ],
            ready: [EMPTY_RING; MAX_PRIO],
            current: None,
            tick: 0,
            policy: Policy::PriorityRoundRobin,
            default_slice: 5,
            tick_hz: 1000,
            core_hz: 0,
            tick_src: crate::config::TickSource::Internal,
            needs_reschedule: false,
        }
    }

    pub(crate) fn apply_config(&mut self, cfg: Config) {
        self.policy = cfg.policy;
        self.default_slice = cfg.default_slice;
        self.tick_hz = cfg.tick_hz;
        self.core_hz = cfg.core_hz;
        self.tick_src = cfg.tick_src;
    }

    pub fn tick_now(&self) -> u32 {
        self.tick
    }

    pub fn current_id(&self) -> Option<u8> {
        self.current
    }

    pub fn set_policy(&mut self, p: Policy) {
        self.policy = p;
    }

    pub fn set_default_timeslice(&mut self, t: u16) {
        self.default_slice = t;
    }

    /// Finds the first `Unused` slot below the reserved idle id.
    fn find_free_slot(&self) -> Option<u8> {
        self.tasks[..IDLE_TASK_ID as usize]
            .iter()
            .position(|t| t.state == TaskState::Unused)
            .map(|i| i as u8)
    }

    fn push_ready(&mut self, priority: u8, id: u8) {
        let class = &mut self.ready[priority as usize];
        if !class.try_push(id) {
            error::report(Error::ReadyOverflow);
        }
    }

    /// Creates a task and places it in `Ready` at the tail of its
    /// priority's class. Does not touch the port (no stack frame is
    /// prepared here); the `kernel` module's `create_task` wraps this
    /// with `Port::prepare_task_stack` once the slot is reserved.
    pub fn create_task_raw(
        &mut self,
        entry: TaskEntry,
        arg: *mut (),
        stack_base: *mut u32,
        stack_words: usize,
        attr: Option<TaskAttr>,
    ) -> Result<u8, Error> {
        if !Tcb::is_valid_creation_request(stack_base, stack_words) {
            return Err(Error::InvalidTask);
        }

        let (priority, timeslice_cfg) = match attr {
            Some(a) => (a.priority, a.timeslice),
            None => (1, self.default_slice),
        };
        if priority as usize >= MAX_PRIO {
            return Err(Error::InvalidPrio);
        }

        let id = self.find_free_slot().ok_or(Error::NoSlot)?;
        self.tasks[id as usize].init(entry, arg, stack_base, stack_words, priority, timeslice_cfg);
        self.push_ready(priority, id);
        Ok(id)
    }

    /// Transitions a non-Ready task to Ready, resets its slice, and
    /// enqueues it at its priority's tail. Readying an already-Ready
    /// task is a fatal invariant violation (it would create a duplicate
    /// ready-queue entry); it is reported and otherwise ignored.
    pub fn make_ready(&mut self, id: u8) {
        let t = &mut self.tasks[id as usize];
        if t.state == TaskState::Ready {
            error::report(Error::DupReady);
            return;
        }
        t.state = TaskState::Ready;
        t.slice_left = t.timeslice_cfg;
        let priority = t.priority;
        self.push_ready(priority, id);
    }

    /// Re-enqueues a still-Ready task at its priority's tail without
    /// touching slice or state. Used by the tick's slice-expiry path,
    /// where the actual requeue happens at the next safe point.
    pub(crate) fn requeue_no_reset(&mut self, id: u8) {
        let t = &self.tasks[id as usize];
        if t.state == TaskState::Ready {
            let priority = t.priority;
            self.push_ready(priority, id);
        }
    }

    /// Scans priority classes from 0 upward and pops the head of the
    /// first non-empty one; `None` if every class is empty (caller
    /// falls back to idle).
    fn pick_next_ready(&mut self) -> Option<u8> {
        for class in self.ready.iter_mut() {
            if let Some(id) = class.pop() {
                return Some(id);
            }
        }
        None
    }

    /// The scheduler's context-switch point: saves `old_sp` into the
    /// outgoing task, requeues it if still Ready, picks the next Ready
    /// task (idle if none), marks it Current, and returns its saved
    /// stack pointer. Bounded `O(MaxPrio)`, never allocates or blocks.
    pub fn schedule(&mut self, old_sp: *mut u32) -> *mut u32 {
        if let Some(cur) = self.current {
            self.tasks[cur as usize].sp = old_sp;
            self.requeue_no_reset(cur);
        }

        let next = self.pick_next_ready().unwrap_or(IDLE_TASK_ID);
        self.current = Some(next);
        self.needs_reschedule = false;
        self.tasks[next as usize].sp
    }

    /// Task-context yield: if running and still Ready, refresh its
    /// slice (RR semantics), then flag that a switch is needed. Does
    /// not enqueue `cur` itself — `schedule`'s `requeue_no_reset` is
    /// the single owner of that push, performed once control actually
    /// reaches the context-switch point.
    pub fn yield_current(&mut self) {
        if let Some(cur) = self.current {
            let t = &mut self.tasks[cur as usize];
            if t.state == TaskState::Ready {
                t.slice_left = t.timeslice_cfg;
            }
        }
        self.needs_reschedule = true;
    }

    pub fn needs_reschedule(&self) -> bool {
        self.needs_reschedule
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
