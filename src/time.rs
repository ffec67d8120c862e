//! Tick-driven time accounting: the monotonic counter, sleep wakeups,
//! and round-robin slice accounting.

use crate::config::{Policy, TickSource};
use crate::scheduler::Kernel;
use crate::task::TaskState;

/// Converts a millisecond duration to ticks, rounding up, with a floor
/// of one tick (so `sleep(0)` still yields at least one quantum) and a
/// saturating ceiling at `u32::MAX`.
pub const fn ms_to_ticks(ms: u32, tick_hz: u32) -> u32 {
    if ms == 0 || tick_hz == 0 {
        return 1;
    }
    let ticks = (ms as u64 * tick_hz as u64 + 999) / 1000;
    if ticks == 0 {
        1
    } else if ticks > u32::MAX as u64 {
        u32::MAX
    } else {
        ticks as u32
    }
}

impl Kernel {
    /// The tick entry: advances the monotonic counter, wakes sleepers
    /// whose deadline has passed, and accounts the current task's
    /// round-robin slice. Never switches directly; only flags that a
    /// switch is needed, matching the port's tick-handler contract
    /// (mask preemption around the call, then pend a switch).
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        let now = self.tick;

        let mut changed = false;
        for id in 0..self.tasks.len() {
            if self.tasks[id].state == TaskState::Sleep {
                let wake = self.tasks[id].wake_tick;
                if (wake.wrapping_sub(now) as i32) <= 0 {
                    self.make_ready(id as u8);
                    changed = true;
                }
            }
        }

        if let Some(cur) = self.current {
            let t = &mut self.tasks[cur as usize];
            if t.state == TaskState::Ready
                && matches!(self.policy, Policy::RoundRobin | Policy::PriorityRoundRobin)
                && t.timeslice_cfg > 0
                && t.slice_left > 0
            {
                t.slice_left -= 1;
                if t.slice_left == 0 {
                    // Reload now so the task rotates again next time
                    // it's requeued, rather than staying starved at
                    // zero forever; `requeue_no_reset` deliberately
                    // leaves slice untouched at the actual requeue.
                    t.slice_left = t.timeslice_cfg;
                    changed = true;
                }
            }
        }

        if changed {
            self.needs_reschedule = true;
        }
    }

    /// The external-mode tick entry. A no-op when the kernel is
    /// configured for an Internal tick source, so an errant external
    /// tick call cannot double-advance time.
    pub fn tick_from_isr(&mut self) {
        if self.tick_src == TickSource::External {
            self.tick();
        }
    }

    /// Puts the current task to sleep for at least `ms` milliseconds.
    pub fn sleep_current(&mut self, ms: u32) {
        let ticks = ms_to_ticks(ms, self.tick_hz);
        if let Some(cur) = self.current {
            let now = self.tick;
            let t = &mut self.tasks[cur as usize];
            t.wake_tick = now.wrapping_add(ticks);
            t.state = TaskState::Sleep;
        }
        self.needs_reschedule = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskAttr;
    use crate::scheduler::tests::stack;

    extern "C" fn noop(_arg: *mut ()) {}

    #[test]
    fn ms_to_ticks_rounds_up_and_floors_at_one() {
        assert_eq!(ms_to_ticks(10, 1000), 10);
        assert_eq!(ms_to_ticks(0, 1000), 1);
        assert_eq!(ms_to_ticks(1, 1000), 1);
        assert_eq!(ms_to_ticks(1500, 1000), 2);
        assert_eq!(ms_to_ticks(10, 0), 1);
    }

    #[test]
    fn tick_advances_by_exactly_one() {
        let mut k = Kernel::new();
        assert_eq!(k.tick_now(), 0);
        k.tick();
        assert_eq!(k.tick_now(), 1);
        k.tick();
        assert_eq!(k.tick_now(), 2);
    }

    #[test]
    fn sleep_then_tick_wakes_after_deadline() {
        let mut k = Kernel::new();
        let mut s = stack();
        let id = k
            .create_task_raw(
                noop,
                core::ptr::null_mut(),
                s.as_mut_ptr(),
                64,
                Some(TaskAttr::new(0, 0)),
            )
            .unwrap();
        k.schedule(core::ptr::null_mut());
        assert_eq!(k.current_id(), Some(id));

        k.sleep_current(10);
        assert_eq!(k.tasks[id as usize].state, TaskState::Sleep);

        for _ in 0..9 {
            k.tick();
            assert_eq!(k.tasks[id as usize].state, TaskState::Sleep);
        }
        k.tick();
        assert_eq!(k.tasks[id as usize].state, TaskState::Ready);
    }

    #[test]
    fn sleep_accuracy_five_times_at_1khz() {
        let mut k = Kernel::new();
        let mut s = stack();
        let id = k
            .create_task_raw(noop, core::ptr::null_mut(), s.as_mut_ptr(), 64, None)
            .unwrap();
        k.schedule(core::ptr::null_mut());
        assert_eq!(k.current_id(), Some(id));

        let mut elapsed = 0u32;
        for _ in 0..5 {
            k.sleep_current(10);
            while k.tasks[id as usize].state == TaskState::Sleep {
                k.tick();
                elapsed += 1;
            }
        }
        assert!(elapsed >= 50);
    }

    #[test]
    fn fifo_wake_order_for_equal_priority_sleepers() {
        let mut k = Kernel::new();
        let mut s1 = stack();
        let mut s2 = stack();
        let mut s3 = stack();
        let a = k
            .create_task_raw(noop, core::ptr::null_mut(), s1.as_mut_ptr(), 64, None)
            .unwrap();
        let b = k
            .create_task_raw(noop, core::ptr::null_mut(), s2.as_mut_ptr(), 64, None)
            .unwrap();
        let c = k
            .create_task_raw(noop, core::ptr::null_mut(), s3.as_mut_ptr(), 64, None)
            .unwrap();

        k.tasks[a as usize].state = TaskState::Sleep;
        k.tasks[a as usize].wake_tick = 1;
        k.tasks[b as usize].state = TaskState::Sleep;
        k.tasks[b as usize].wake_tick = 2;
        k.tasks[c as usize].state = TaskState::Sleep;
        k.tasks[c as usize].wake_tick = 3;

        let mut order: [Option<u8>; 3] = [None; 3];
        let mut next_slot = 0usize;
        for _ in 0..3 {
            k.tick();
            for id in [a, b, c] {
                let already_recorded = order[..next_slot].contains(&Some(id));
                if k.tasks[id as usize].state == TaskState::Ready && !already_recorded {
                    order[next_slot] = Some(id);
                    next_slot += 1;
                }
            }
        }
        assert_eq!(order, [Some(a), Some(b), Some(c)]);
    }

    #[test]
    fn tick_wraparound_wakes_exactly_once() {
        let mut k = Kernel::new();
        let mut s = stack();
        let id = k
            .create_task_raw(noop, core::ptr::null_mut(), s.as_mut_ptr(), 64, None)
            .unwrap();
        k.schedule(core::ptr::null_mut());
        assert_eq!(k.current_id(), Some(id));

        k.tick = 0xFFFF_FFF0;
        k.sleep_current(10);
        assert_eq!(k.tasks[id as usize].wake_tick, 0xFFFF_FFFA);

        let mut wakes = 0;
        for _ in 0..32 {
            let was_sleep = k.tasks[id as usize].state == TaskState::Sleep;
            k.tick();
            if was_sleep && k.tasks[id as usize].state == TaskState::Ready {
                wakes += 1;
            }
        }
        assert_eq!(wakes, 1);
        // 32 ticks from 0xFFFFFFF0 wraps the monotonic counter past u32::MAX.
        assert_eq!(k.tick_now(), 16);
    }

    /// A CPU-bound round-robin task that never sleeps, yields, or
    /// blocks must keep rotating every time its slice expires, not
    /// just once. Reproduces the starvation the maintainer flagged:
    /// without reloading `slice_left` on expiry, the guard at the top
    /// of this function (`slice_left > 0`) permanently stops the
    /// decrement after the first rotation, so the second peer never
    /// gets a second turn.
    #[test]
    fn rr_slice_reloads_on_every_expiry_so_peers_keep_rotating() {
        let mut k = Kernel::new();
        k.policy = Policy::RoundRobin;
        let mut sa = stack();
        let mut sb = stack();
        let a = k
            .create_task_raw(
                noop,
                core::ptr::null_mut(),
                sa.as_mut_ptr(),
                64,
                Some(TaskAttr::new(1, 2)),
            )
            .unwrap();
        let b = k
            .create_task_raw(
                noop,
                core::ptr::null_mut(),
                sb.as_mut_ptr(),
                64,
                Some(TaskAttr::new(1, 2)),
            )
            .unwrap();

        k.schedule(core::ptr::null_mut());
        assert_eq!(k.current_id(), Some(a));

        let mut order = [None; 4];
        for slot in order.iter_mut() {
            // Run the current task's 2-tick slice to expiry, then let
            // the scheduler requeue it and pick the next peer.
            k.tick();
            k.tick();
            k.schedule(core::ptr::null_mut());
            *slot = k.current_id();
        }
        assert_eq!(order, [Some(b), Some(a), Some(b), Some(a)]);
    }
}
