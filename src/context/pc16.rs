//! Stack seeding for AVR parts with a 2-byte program counter (flash up to
//! 128 KiB): `atmega328p`, `atmega32u4`, and most other classic parts.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::stack_pusher::StackPusher;
use crate::task::TaskEntryFn;

/// Seed a never-yet-run task's stack so its first resume pops exactly the
/// same shape [`pop_context_full`](crate::context::pop_context_full) always
/// pops, minus the `r24`/`r25` pair that `wait_for_event`'s return-code
/// staging supplies on first use.
///
/// Layout, shallowest (nearest `top`) to deepest: a guard return address of
/// `0x0000` (the reset vector — see the crate's top-level docs on why a
/// task function returning is a controller reset, not a panic), the task's
/// entry point, then `r0`, `SREG` (`0x80`, global interrupts enabled),
/// `r1` (the AVR ABI's zero register), `r2..=r23`, `r26..=r31`, `r24`,
/// `r25`, all zeroed. `r24`/`r25` are seeded here (rather than left for a
/// release to stage) because a task's very first activation is dispatched
/// straight out of the ready queue by `Kernel::start`, with no staging
/// pass in between — its first resume must already present the same
/// 33-byte shape every later resume does. Everything below that is filled
/// with the unused-stack pattern.
///
/// # Safety
///
/// `top` and `base` must bound the same, exclusively-owned stack buffer,
/// with `top` one byte past its last usable address.
pub(crate) unsafe fn prepare_stack(
    entry_fn: TaskEntryFn,
    top: *mut u8,
    base: *mut u8,
) -> *mut u8 {
    // SAFETY: forwarded from the caller's obligation.
    let mut pusher = unsafe { StackPusher::new(top, base) };

    pusher.push_pc16(0x0000);
    pusher.push_pc16(entry_fn as usize as u16);

    pusher.push_u8(0); // r0
    pusher.push_u8(0x80); // SREG: I-bit set, everything else clear
    pusher.push_u8(0); // r1
    for _ in 2..=23 {
        pusher.push_u8(0);
    }
    for _ in 26..=31 {
        pusher.push_u8(0);
    }
    pusher.push_u8(0); // r24
    pusher.push_u8(0); // r25

    pusher.fill_remainder_with_pattern();
    pusher.current()
}

// End of File
