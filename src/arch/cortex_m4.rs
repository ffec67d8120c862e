//! # Cortex-M4 Port
//!
//! Hardware-specific half of the kernel: initial stack frame layout,
//! the PendSV-driven context switch, SysTick-driven ticking, and
//! BASEPRI-masked critical sections.
//!
//! ## Context switch
//!
//! On exception entry the hardware auto-stacks R0-R3, R12, LR, PC and
//! xPSR onto the active stack. `PendSV` manually saves/restores
//! R4-R11, completing the save/restore pair, and returns via an
//! explicit `EXC_RETURN` value rather than `bx lr` — by the time the
//! handler reaches its tail, `lr` has been clobbered by the `bl`s to
//! the Rust scheduling hooks, so only the literal `EXC_RETURN` is
//! trustworthy there.
//!
//! ## Interrupt priorities
//!
//! SysTick is set one step above PendSV so a tick can still pend a
//! switch without PendSV preempting other application ISRs.

use core::arch::asm;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::register::basepri;

use crate::config::TickSource;
use crate::kernel;
use crate::port::{Port, Trampoline};

const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
const ICSR_PENDSVSET: u32 = 1 << 28;

/// Logical priority handed to application ISRs that are allowed to
/// call kernel APIs; anything at or below this BASEPRI value is
/// masked by a critical section, same convention as the original's
/// `HARDRT_MAX_SYSCALL_IRQ_PRIO`.
const MAX_SYSCALL_IRQ_PRIO: u8 = 5;
const NVIC_PRIO_BITS: u8 = 4;

#[inline]
const fn prio_to_basepri(prio: u8) -> u8 {
    (prio << (8 - NVIC_PRIO_BITS)) & 0xFF
}

static BASEPRI_PREV: AtomicU32 = AtomicU32::new(0);
static CS_NEST: AtomicU32 = AtomicU32::new(0);

pub struct CortexM4;

impl Port for CortexM4 {
    fn prepare_task_stack(
        stack_base: *mut u32,
        stack_words: usize,
        trampoline: Trampoline,
    ) -> *mut u32 {
        unsafe {
            let stack_end = stack_base.add(stack_words);
            // 8-byte align per AAPCS.
            let mut sp = ((stack_end as usize) & !0x7usize) as *mut u32;

            let mut push = |val: u32| {
                sp = sp.sub(1);
                core::ptr::write(sp, val);
            };

            // Auto-stacked exception frame (xPSR, PC, LR, R12, R3..R0).
            push(0x0100_0000); // xPSR: Thumb bit set
            push(trampoline as usize as u32); // PC
            push(0xFFFF_FFFD); // LR: EXC_RETURN, unused (trampoline never returns)
            push(0); // R12
            push(0); // R3
            push(0); // R2
            push(0); // R1
            push(0); // R0

            // Manually-saved R4-R11, zero-initialized.
            for _ in 0..8 {
                push(0);
            }

            sp
        }
    }

    fn start_tick(tick_hz: u32, core_hz: u32, src: TickSource) {
        unsafe {
            let mut shpr3 = core::ptr::read_volatile(SHPR3);
            // PendSV lowest, SysTick one step above so it can still pend.
            shpr3 = (shpr3 & !(0xFFu32 << 16)) | (0xF0u32 << 16);
            shpr3 = (shpr3 & !(0xFFu32 << 24)) | (0xE0u32 << 24);
            core::ptr::write_volatile(SHPR3, shpr3);
        }

        if src == TickSource::External || tick_hz == 0 || core_hz == 0 {
            return;
        }

        let mut reload = core_hz / tick_hz;
        if reload == 0 {
            reload = 1;
        }
        if reload > 0x00FF_FFFF {
            reload = 0x00FF_FFFF;
        }
        reload -= 1;

        let mut syst = unsafe { cortex_m::Peripherals::steal() }.SYST;
        syst.set_reload(reload);
        syst.clear_current();
        syst.set_clock_source(SystClkSource::Core);
        syst.enable_interrupt();
        syst.enable_counter();
    }

    #[inline]
    fn pend_context_switch() {
        unsafe {
            core::ptr::write_volatile(ICSR, ICSR_PENDSVSET);
        }
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    #[inline]
    fn yield_to_scheduler() {
        // The switch happens on exception return; execution just
        // continues here once this task is resumed.
        Self::pend_context_switch();
    }

    fn enter_scheduler(first_sp: *mut u32) -> ! {
        unsafe {
            asm!("msr psp, {0}", in(reg) first_sp, options(nomem, nostack, preserves_flags));
        }
        cortex_m::interrupt::enable();
        Self::pend_context_switch();
        loop {
            Self::idle_wait();
        }
    }

    #[inline]
    fn idle_wait() {
        cortex_m::asm::wfi();
    }

    #[inline]
    fn crit_enter() {
        let prev = basepri::read();
        if CS_NEST.load(Ordering::Relaxed) == 0 {
            BASEPRI_PREV.store(prev as u32, Ordering::Relaxed);
            basepri::write(prio_to_basepri(MAX_SYSCALL_IRQ_PRIO));
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
        }
        CS_NEST.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn crit_exit() {
        if CS_NEST.load(Ordering::Relaxed) == 0 {
            return;
        }
        if CS_NEST.fetch_sub(1, Ordering::Relaxed) == 1 {
            basepri::write(BASEPRI_PREV.load(Ordering::Relaxed) as u8);
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
        }
    }
}

/// PendSV exception handler: the actual context switch.
///
/// # Safety
/// Naked, called only by the NVIC with the exact Cortex-M exception
/// entry convention in force.
#[no_mangle]
#[naked]
pub unsafe extern "C" fn PendSV() {
    asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        switch = sym do_context_switch,
        options(noreturn)
    );
}

/// Called from `PendSV` with the saved PSP in `r0`. Returns the new
/// task's PSP in `r0`.
///
/// # Safety
/// Called only from the `PendSV` asm block above.
#[no_mangle]
unsafe extern "C" fn do_context_switch(old_sp: *mut u32) -> *mut u32 {
    kernel::schedule_from_port(old_sp)
}

/// SysTick exception handler: the internal tick source entry point.
#[no_mangle]
pub extern "C" fn SysTick() {
    kernel::tick_from_port();
}
