//! Holds the [`TaskDescriptor`] type and methods

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::Cell;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::Stack;
use crate::Time;

/// The function signature for a task entry function.
///
/// Tasks run forever and take no arguments; returning from one is a
/// programming error handled by a guard return address rather than by Rust
/// panic machinery (see the crate's top-level docs).
pub type TaskEntryFn = fn() -> !;

/// Everything the kernel needs to know about one task: its saved context,
/// its static scheduling parameters, and its dynamic wait/timer state.
///
/// One descriptor exists per application task, plus one for the implicit
/// idle task (see [`Kernel`](crate::Kernel)).
pub struct TaskDescriptor {
    /// The saved stack pointer for this task when it is not running.
    ///
    /// Read and written directly by the naked context-switch asm, so this
    /// field stays first for cheap addressing — mirroring the original's
    /// remark that the stack pointer "should come first" in the task
    /// struct.
    pub(crate) stack: AtomicPtr<u8>,
    /// The task's entry point. Read only once, when its stack is prepared.
    entry_fn: TaskEntryFn,
    /// The base of the task's statically-owned stack buffer.
    stack_base: *mut u8,
    /// The size in bytes of the task's stack buffer.
    stack_size: usize,
    /// Priority class in `[0, P)`. Higher value, higher priority.
    prio_class: u8,
    /// The absolute system-time value at which the absolute-timer bit
    /// should fire for this task.
    pub(crate) time_due_at: Cell<Time>,
    /// Ticks remaining until the delay-timer bit fires; 0 when inactive.
    pub(crate) cnt_delay: Cell<Time>,
    /// Events posted while this task was suspended; delivered to it (and
    /// cleared) on resume.
    pub(crate) posted_event_vec: Cell<u16>,
    /// The bits this task is currently waiting on. Constant while the task
    /// is suspended; cleared when it becomes ready.
    pub(crate) event_mask: Cell<u16>,
    /// `true`: any bit in `posted & mask` releases the task. `false`: all
    /// non-timer bits of `mask` must be posted, or any timer bit fires.
    pub(crate) wait_for_any_event: Cell<bool>,
    /// Maximum consecutive ticks this task may stay active before yielding
    /// to a same-priority peer. Zero disables round-robin for this task.
    #[cfg(feature = "round-robin")]
    pub(crate) time_round_robin: Time,
    /// Countdown reloaded from `time_round_robin`.
    #[cfg(feature = "round-robin")]
    pub(crate) cnt_round_robin: Cell<Time>,
    /// Saturating count of missed absolute deadlines.
    pub(crate) cnt_overrun: Cell<u8>,
}

impl TaskDescriptor {
    /// The minimum stack size the kernel will accept for a task, in bytes.
    pub const MIN_STACK_SIZE: usize = 50;

    /// Create a new task descriptor.
    #[cfg(feature = "round-robin")]
    pub const fn new<const N: usize>(
        entry_fn: TaskEntryFn,
        prio_class: u8,
        round_robin_slice: Time,
        stack: &Stack<N>,
    ) -> TaskDescriptor {
        assert!(N >= Self::MIN_STACK_SIZE);
        TaskDescriptor {
            entry_fn,
            stack: AtomicPtr::new(stack.top()),
            stack_base: stack.base(),
            stack_size: N,
            prio_class,
            time_due_at: Cell::new(0),
            cnt_delay: Cell::new(0),
            posted_event_vec: Cell::new(0),
            event_mask: Cell::new(0),
            wait_for_any_event: Cell::new(true),
            time_round_robin: round_robin_slice,
            cnt_round_robin: Cell::new(0),
            cnt_overrun: Cell::new(0),
        }
    }

    /// Create a new task descriptor.
    #[cfg(not(feature = "round-robin"))]
    pub const fn new<const N: usize>(
        entry_fn: TaskEntryFn,
        prio_class: u8,
        stack: &Stack<N>,
    ) -> TaskDescriptor {
        assert!(N >= Self::MIN_STACK_SIZE);
        TaskDescriptor {
            entry_fn,
            stack: AtomicPtr::new(stack.top()),
            stack_base: stack.base(),
            stack_size: N,
            prio_class,
            time_due_at: Cell::new(0),
            cnt_delay: Cell::new(0),
            posted_event_vec: Cell::new(0),
            event_mask: Cell::new(0),
            wait_for_any_event: Cell::new(true),
            cnt_overrun: Cell::new(0),
        }
    }

    /// Build the implicit idle task descriptor.
    ///
    /// The idle task has no entry function of its own: it is driven directly
    /// by [`Kernel::start`](crate::Kernel::start) repeatedly invoking the
    /// application's `loop` body, and its stack/timer fields are never
    /// touched.
    pub const fn idle() -> TaskDescriptor {
        fn unreachable_idle_entry() -> ! {
            loop {}
        }
        TaskDescriptor {
            entry_fn: unreachable_idle_entry,
            stack: AtomicPtr::new(core::ptr::null_mut()),
            stack_base: core::ptr::null_mut(),
            stack_size: 0,
            prio_class: 0,
            time_due_at: Cell::new(0),
            cnt_delay: Cell::new(0),
            posted_event_vec: Cell::new(0),
            event_mask: Cell::new(0),
            wait_for_any_event: Cell::new(true),
            #[cfg(feature = "round-robin")]
            time_round_robin: 0,
            #[cfg(feature = "round-robin")]
            cnt_round_robin: Cell::new(0),
            cnt_overrun: Cell::new(0),
        }
    }

    /// The task's entry point.
    pub(crate) const fn entry_fn(&self) -> TaskEntryFn {
        self.entry_fn
    }

    /// The priority class this task belongs to.
    pub(crate) const fn prio_class(&self) -> u8 {
        self.prio_class
    }

    /// The current stack pointer for this task.
    pub(crate) fn stack(&self) -> *mut u8 {
        self.stack.load(Ordering::Relaxed)
    }

    /// The base (lowest address) of this task's stack buffer.
    pub(crate) const fn stack_base(&self) -> *mut u8 {
        self.stack_base
    }

    /// Set the current stack pointer for this task.
    ///
    /// # Safety
    ///
    /// The task will execute using the stack given, so it must point into a
    /// valid, fully prepared AVR stack frame for this task.
    pub(crate) unsafe fn set_stack(&self, new_stack: *mut u8) {
        self.stack.store(new_stack, Ordering::Relaxed)
    }

    /// Count the prefix of this task's stack buffer still holding the
    /// unused-stack fill pattern (`0x29`), from the bottom of the buffer
    /// upward.
    ///
    /// Advisory only: a genuine stack value that happens to equal the
    /// pattern makes this overcount the reserve.
    pub(crate) fn stack_reserve(&self) -> u16 {
        if self.stack_base.is_null() {
            return 0;
        }
        let mut count: u16 = 0;
        // SAFETY: `stack_base` points at `stack_size` bytes owned by this
        // task's `Stack` for the lifetime of the program.
        unsafe {
            while (count as usize) < self.stack_size
                && *self.stack_base.add(count as usize)
                    == crate::stack_pusher::UNUSED_STACK_PATTERN
            {
                count += 1;
            }
        }
        count
    }
}

/// SAFETY: every field is either fixed at construction or wrapped in
/// `Cell`/`AtomicPtr`; all mutation happens with interrupts globally
/// disabled (see [`crate::Kernel`]), so concurrent access from the one CPU
/// core is never actually concurrent.
unsafe impl Sync for TaskDescriptor {}

// End of File
