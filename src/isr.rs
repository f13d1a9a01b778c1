//! The suspend primitives (`set_event`, `wait_for_event`) and the system
//! tick interrupt entry point: the glue between [`crate::context`]'s raw
//! push/pop/switch primitive and [`crate::kernel::Kernel`]'s scheduling
//! decisions.
//!
//! Grounded on the original implementation's `rtos_setEvent` /
//! `rtos_waitForEvent` / the system-tick `ISR`, each a naked function that
//! brackets a call into an ordinary, non-naked decision function with the
//! context push/switch/pop. A Rust `#[unsafe(naked)]` function is stricter
//! than AVR-GCC's: its body must be a single `naked_asm!` call, so unlike
//! the original, no plain Rust statement can sit between the asm
//! fragments — every decision the original interleaves with its asm
//! macros is made inside the `call`ed trampoline functions below instead.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::arch::naked_asm;

use crate::context::{pop_context_full, push_context_full, push_context_without_r24r25};
use crate::event::EventMask;
use crate::kernel::Kernel;
use crate::Time;

/// Post `vec` into the posted-event vector of every suspended task, release
/// whoever is now due, and preempt the active task if the release
/// outranks it.
///
/// Callable from ordinary task code, not just from an ISR — this is the
/// "pseudo software interrupt" the original implementation describes:
/// a plain `call`, but one that may return into a different task than the
/// one that made it.
#[unsafe(naked)]
pub unsafe extern "C" fn set_event(vec: EventMask) {
    naked_asm!(
        "cli",
        push_context_full!(),
        "call {set_event_trampoline}",
        "tst r24",
        "breq 1f",
        "in r24, 0x3d",
        "in r25, 0x3e",
        "call {enter_switch}",
        "out 0x3e, r25",
        "out 0x3d, r24",
        "1:",
        pop_context_full!(),
        "reti",
        set_event_trampoline = sym set_event_trampoline,
        enter_switch = sym enter_critical_switch,
    )
}

/// Suspend the calling task until `mask` is satisfied (`all`: every
/// non-timer bit, else any bit) or `timeout` ticks pass, and return the
/// event vector that woke it.
///
/// Unlike `set_event`, this unconditionally switches away: the calling
/// task never "falls through" without surrendering the CPU, even if its
/// own wait condition happens to already be satisfied.
#[unsafe(naked)]
pub unsafe extern "C" fn wait_for_event(mask: EventMask, all: bool, timeout: Time) -> EventMask {
    naked_asm!(
        "cli",
        push_context_without_r24r25!(),
        "call {wait_event_trampoline}",
        "in r24, 0x3d",
        "in r25, 0x3e",
        "call {enter_switch}",
        "out 0x3e, r25",
        "out 0x3d, r24",
        pop_context_full!(),
        "reti",
        wait_event_trampoline = sym wait_event_trampoline,
        enter_switch = sym enter_critical_switch,
    )
}

extern "C" fn set_event_trampoline(vec: EventMask) -> bool {
    Kernel::current().set_event_logic(vec)
}

extern "C" fn wait_event_trampoline(mask: EventMask, all: bool, timeout: Time) {
    Kernel::current().wait_logic(mask, all, timeout)
}

/// Called once a trampoline has decided a switch is happening (`dispatch_next`
/// has already run): save `old_sp` into whichever task was just left
/// running, stage a pending wakeup's return code if the entering task has
/// one, and return the stack pointer value to load.
///
/// This single function replaces both the original's `SWITCH_CONTEXT` and
/// `PUSH_RET_CODE_OF_CONTEXT_SWITCH` macros — a Rust naked function cannot
/// interleave ordinary statements with its asm the way the original's
/// naked C functions could, so the pointer-chasing and the byte-staging
/// that the original does through its global "C to asm" scratch variables
/// both collapse into one ordinary function call instead.
#[doc(hidden)]
pub extern "C" fn enter_critical_switch(old_sp: *mut u8) -> *mut u8 {
    let kernel = Kernel::current();

    let leaving = kernel.task(kernel.previous_active());
    // SAFETY: `old_sp` was read from the live `SPL:SPH` pair immediately
    // after the full context was pushed onto it; nothing has touched that
    // stack since.
    unsafe { leaving.set_stack(old_sp) };

    let entering = kernel.task(kernel.active());
    let posted = entering.posted_event_vec.get();
    if posted == 0 {
        return entering.stack();
    }
    entering.posted_event_vec.set(0);

    let sp = entering.stack();
    // SAFETY: `sp` names two free bytes below the entering task's prepared
    // or previously-saved frame; staging them here is exactly equivalent
    // to two more `push`es, landing the low byte where `pop r24` (the
    // second of the next two pops) will find it.
    unsafe {
        sp.write_volatile((posted & 0x00ff) as u8);
        sp.offset(-1).write_volatile(((posted & 0xff00) >> 8) as u8);
        sp.offset(-2)
    }
}

/// Generate the naked system-tick interrupt entry point bound to
/// `$vector`, the `#[no_mangle]` symbol name of the hardware vector this
/// kernel's time base is wired to.
///
/// A macro, not a plain function, because the push/switch/pop sequence
/// must be the *entire* body of a naked function, and the vector name
/// itself is a per-board configuration choice (see the crate's
/// configuration notes) rather than something this crate can hardcode.
#[macro_export]
macro_rules! bind_tick_isr {
    ($vector:ident) => {
        #[unsafe(no_mangle)]
        #[unsafe(naked)]
        unsafe extern "avr-interrupt" fn $vector() {
            core::arch::naked_asm!(
                $crate::context::push_context_full!(),
                "call {on_tick_trampoline}",
                "tst r24",
                "breq 1f",
                "in r24, 0x3d",
                "in r25, 0x3e",
                "call {enter_switch}",
                "out 0x3e, r25",
                "out 0x3d, r24",
                "1:",
                $crate::context::pop_context_full!(),
                "reti",
                on_tick_trampoline = sym $crate::isr::on_tick_trampoline,
                enter_switch = sym $crate::isr::enter_critical_switch,
            )
        }
    };
}

#[doc(hidden)]
pub extern "C" fn on_tick_trampoline() -> bool {
    Kernel::current().on_tick()
}

/// Generate a naked entry point for one of the two optional user interrupt
/// sources, bound to `$vector`, posting `$event_bit` (one of
/// [`crate::EVT_ISR_USER_00`] / [`crate::EVT_ISR_USER_01`]) exactly as
/// [`set_event`] would.
///
/// Reuses `set_event`'s own body by tail-jumping into it with the event
/// bit already loaded into the argument registers, the same trick the
/// original implementation uses to let its two optional user ISRs share
/// `rtos_setEvent`'s code instead of duplicating it.
#[macro_export]
macro_rules! bind_user_isr {
    ($vector:ident, $event_bit:expr) => {
        #[unsafe(no_mangle)]
        #[unsafe(naked)]
        unsafe extern "avr-interrupt" fn $vector() {
            core::arch::naked_asm!(
                "ldi r24, {lo}",
                "ldi r25, {hi}",
                "jmp {set_event}",
                lo = const ($event_bit as u16) & 0xff,
                hi = const (($event_bit as u16) >> 8) & 0xff,
                set_event = sym $crate::set_event,
            )
        }
    };
}

// End of File
