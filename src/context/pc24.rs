//! Stack seeding for AVR parts with a 3-byte program counter (flash over
//! 128 KiB): `atmega2560`, `atmega2561`, `atmega1280`, `atmega1281`.
//!
//! See [`pc16`](super::pc16) for the byte-by-byte layout; the only
//! difference is one extra program-counter byte on each of the two pushed
//! return addresses.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::stack_pusher::StackPusher;
use crate::task::TaskEntryFn;

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

    pusher.push_pc24(0x00_0000);
    pusher.push_pc24(entry_fn as usize as u32);

    pusher.push_u8(0); // r0
    pusher.push_u8(0x80); // SREG
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
