//! A small preemptive fixed-priority real-time kernel core for ARM
//! Cortex-M, in the spirit of FreeRTOS/ChibiOS but trimmed to the
//! primitives a single-core firmware actually needs: fixed-priority
//! scheduling with optional round-robin, a monotonic tick, binary
//! semaphores, and fixed-capacity queues.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │               Application Tasks                           │
//! ├────────────────────────────────────────────────────────────┤
//! │            Kernel API (kernel.rs)                          │
//! │     init() · create_task() · start() · sleep() · yield()   │
//! ├──────────────┬───────────────┬───────────────┬────────────┤
//! │  Scheduler   │   Time        │  Semaphore    │   Queue    │
//! │  scheduler.rs│   time.rs     │  sem.rs        │  queue.rs  │
//! │  ─ schedule()│   ─ tick()    │  ─ take/give   │  ─ send/recv│
//! ├──────────────┴───────────────┴───────────────┴────────────┤
//! │                 Task Model (task.rs) · ring.rs              │
//! ├────────────────────────────────────────────────────────────┤
//! │              Port Contract (port.rs)                        │
//! ├────────────────────────────────────────────────────────────┤
//! │          Cortex-M4 Port (arch/cortex_m4.rs)                 │
//! │     PendSV · SysTick · Context Switch · Stack Init          │
//! ├────────────────────────────────────────────────────────────┤
//! │            ARM Cortex-M4 Hardware (Thumb-2)                  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory model
//!
//! - No heap, no `alloc` — `core` only.
//! - Fixed-size task table: `[Tcb; MAX_TASKS]`.
//! - Caller-provided, statically-allocated per-task stacks.
//! - Critical sections are a nestable BASEPRI mask on the port side.
//!
//! The scheduling core (`scheduler`, `time`, `sem`, `queue`, `ring`,
//! `task`, `config`, `error`) has no dependency on the port or on any
//! architecture and is exercised directly by the `#[cfg(test)]` suites
//! in each module; `arch` and `kernel`'s static instance only build
//! for a real target.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod queue;
pub mod ring;
pub mod scheduler;
pub mod sem;
pub mod task;
pub mod time;

pub mod port;

#[cfg(target_os = "none")]
pub mod arch;
#[cfg(target_os = "none")]
pub mod kernel;
