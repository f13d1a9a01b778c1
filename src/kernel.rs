//! The scheduling engine: ready queues, the suspended-task set, the system
//! clock, and the public operations an application uses to bring the
//! kernel up and inspect it.
//!
//! All of the decision logic here is plain, host-testable Rust: it only
//! manipulates indices into [`TaskDescriptor`]s and the fixed-capacity
//! queue arrays below. The asm-touching half of a context switch —
//! preparing a stack and actually moving the CPU onto it — lives in
//! [`crate::context`] and is driven from [`crate::isr`].
//!
//! Grounded on the teacher's `Scheduler` (the one global instance reached
//! through a pointer set once at start-of-day, `#[repr(C)]` fields read
//! directly by asm) and on the original implementation's
//! `checkForTaskActivation` / `onTimerTic` / `rtos_initRTOS`.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::event::{self, EventMask};
use crate::task::TaskDescriptor;
use crate::{EVT_ABS_TIMER, EVT_DELAY_TIMER, Time};

/// Maximum number of distinct priority classes a [`Kernel`] supports.
pub const MAX_PRIO_CLASSES: usize = 8;
/// Maximum number of tasks that may share one priority class.
pub const MAX_TASKS_PER_CLASS: usize = 8;
/// Maximum number of tasks (application tasks plus the implicit idle task)
/// a [`Kernel`] supports.
pub const MAX_TASKS: usize = 16;

#[cfg(feature = "time-u16")]
type AtomicTime = core::sync::atomic::AtomicU16;
#[cfg(feature = "time-u8")]
type AtomicTime = core::sync::atomic::AtomicU8;

/// The system clock, in ticks since `start()`. Wraps silently; every
/// consumer compares against it with wrapping, signed-subtraction
/// arithmetic (see [`event::store_resume_condition`]).
static SYSTEM_TIME: AtomicTime = AtomicTime::new(0);

/// Set once, by [`Kernel::start`]; read by the naked primitives in
/// [`crate::isr`] and by [`now`].
static KERNEL_PTR: AtomicPtr<Kernel> = AtomicPtr::new(core::ptr::null_mut());

/// The current value of the system clock.
pub fn now() -> Time {
    SYSTEM_TIME.load(Ordering::Relaxed)
}

/// The kernel's ready queues, suspended set, and task table.
///
/// An application builds exactly one `Kernel` as a `'static`, hands it the
/// slice of [`TaskDescriptor`]s it controls (application tasks first, the
/// implicit idle task last — see [`TaskDescriptor::idle`]), and calls
/// [`Kernel::start`] once.
pub struct Kernel {
    /// Application tasks followed by the implicit idle task.
    tasks: &'static [TaskDescriptor],
    /// `ready[class]` holds the indices, in FIFO order, of tasks in that
    /// priority class waiting for the CPU. The currently active task is
    /// never present in any `ready` queue.
    ready: UnsafeCell<[[u8; MAX_TASKS_PER_CLASS]; MAX_PRIO_CLASSES]>,
    /// `ready_len[class]` is the number of valid entries at the front of
    /// `ready[class]`.
    ready_len: UnsafeCell<[u8; MAX_PRIO_CLASSES]>,
    /// Indices of tasks waiting on an event/timeout, in no particular
    /// order.
    suspended: UnsafeCell<[u8; MAX_TASKS]>,
    suspended_len: Cell<u8>,
    /// Index into `tasks` of the task currently on the CPU.
    active: Cell<u8>,
    /// Index into `tasks` of whoever was active immediately before the
    /// most recent [`Kernel::dispatch_next`] — i.e. whose live stack
    /// pointer `enter_critical_switch` must capture `old_sp` into.
    previous_active: Cell<u8>,
}

impl Kernel {
    /// Build a new kernel over `tasks` (application tasks first, the
    /// implicit idle task last).
    pub const fn new(tasks: &'static [TaskDescriptor]) -> Kernel {
        assert!(!tasks.is_empty(), "a kernel needs at least the idle task");
        assert!(tasks.len() <= MAX_TASKS, "more tasks than MAX_TASKS allows");
        Kernel {
            tasks,
            ready: UnsafeCell::new([[0; MAX_TASKS_PER_CLASS]; MAX_PRIO_CLASSES]),
            ready_len: UnsafeCell::new([0; MAX_PRIO_CLASSES]),
            suspended: UnsafeCell::new([0; MAX_TASKS]),
            suspended_len: Cell::new(0),
            active: Cell::new(0),
            previous_active: Cell::new(0),
        }
    }

    /// The kernel instance installed by the most recent [`Kernel::start`].
    ///
    /// # Panics
    ///
    /// Panics if called before `start()`.
    pub(crate) fn current() -> &'static Kernel {
        let ptr = KERNEL_PTR.load(Ordering::Acquire);
        // SAFETY: only ever set to a `&'static Kernel` by `start`, never
        // cleared.
        unsafe { ptr.as_ref() }.expect("Kernel::current called before Kernel::start")
    }

    fn idle_index(&self) -> u8 {
        (self.tasks.len() - 1) as u8
    }

    pub(crate) fn task(&self, idx: u8) -> &TaskDescriptor {
        &self.tasks[idx as usize]
    }

    /// The index of the task currently on the CPU.
    pub(crate) fn active(&self) -> u8 {
        self.active.get()
    }

    /// The index of whoever was active immediately before the most recent
    /// switch. Only meaningful for the duration of `enter_critical_switch`.
    pub(crate) fn previous_active(&self) -> u8 {
        self.previous_active.get()
    }

    /// Prepare every application task's stack, place every application task
    /// in its priority class's ready queue, enable the system tick, and
    /// hand control to `idle_body` — which must never return.
    ///
    /// If an application task outranks the idle task, the very first
    /// context switch happens inside this call, and `idle_body` only ever
    /// runs once every application task is itself suspended.
    pub fn start(&'static self, enable_tick_irq: impl FnOnce(), idle_body: fn() -> !) -> ! {
        for idx in 0..self.idle_index() {
            let task = self.task(idx);
            // SAFETY: each task's stack buffer is exclusively owned by its
            // descriptor, and no task has run yet.
            let prepared =
                unsafe { crate::context::prepare_stack(task.entry_fn(), task.stack(), task.stack_base()) };
            // SAFETY: `prepared` points at a freshly seeded, valid frame.
            unsafe { task.set_stack(prepared) };
            self.ready_push(task.prio_class(), idx);
        }

        self.active.set(self.idle_index());
        KERNEL_PTR.store(self as *const Kernel as *mut Kernel, Ordering::Release);

        critical_section::with(|_cs| enable_tick_irq());

        if let Some((_, first)) = self.highest_ready() {
            self.ready_remove(self.task(first).prio_class(), first);
            self.active.set(first);
            // SAFETY: `first`'s stack was just prepared above; nothing has
            // touched the CPU's own stack yet, so abandoning it here is
            // sound.
            unsafe { crate::context::first_switch(self.task(first).stack()) }
        }

        idle_body()
    }

    /// Broadcast `vec` to every suspended task's `posted_event_vec`, then
    /// run the scan-and-release phase. Returns whether the newly-released
    /// set (if any) outranks the currently active task and a switch is
    /// needed.
    pub(crate) fn set_event_logic(&self, vec: EventMask) -> bool {
        for i in 0..self.suspended_len.get() {
            let idx = self.suspended_at(i);
            let task = self.task(idx);
            task.posted_event_vec.set(task.posted_event_vec.get() | vec);
        }
        self.scan_suspended_for_activation();
        self.preempts_active()
    }

    /// Unconditionally suspend the active task on `mask`/`all`/`timeout`
    /// and dispatch whatever runs next. Always switches, even if the
    /// active task's own resume condition is already satisfied.
    pub(crate) fn wait_logic(&self, mask: EventMask, all: bool, timeout: Time) {
        let current = self.active.get();
        debug_assert!(
            current != self.idle_index(),
            "the idle task must never call wait_for_event"
        );
        let task = self.task(current);
        event::store_resume_condition(task, mask, all, timeout, now());
        self.suspend(current);
        self.scan_suspended_for_activation();
        self.dispatch_next();
    }

    /// Advance the system clock by one tick, post timer events, run the
    /// scan-and-release phase, and (with the `round-robin` feature) rotate
    /// the active task if its slice has expired. Returns whether a switch
    /// is needed.
    pub(crate) fn on_tick(&self) -> bool {
        SYSTEM_TIME.fetch_add(1, Ordering::Relaxed);
        let time = now();
        self.post_timer_events(time);
        self.scan_suspended_for_activation();

        #[cfg(feature = "round-robin")]
        let rotated = self.tick_round_robin();
        #[cfg(not(feature = "round-robin"))]
        let rotated = false;

        if rotated {
            self.dispatch_next();
            true
        } else if self.preempts_active() {
            self.dispatch_next();
            true
        } else {
            false
        }
    }

    /// The saturating overrun count for task `idx`, optionally resetting it
    /// to zero.
    ///
    /// `idx` is the position of the task in the slice passed to
    /// [`Kernel::new`]; the implicit idle task has no overrun counter of its
    /// own but is harmless to query (it always reads zero).
    pub fn get_task_overrun_counter(&self, idx: u8, reset: bool) -> u8 {
        let task = self.task(idx);
        let count = task.cnt_overrun.get();
        if reset {
            task.cnt_overrun.set(0);
        }
        count
    }

    /// The advisory stack-reserve diagnostic for task `idx`, in bytes still
    /// holding the unused-stack fill pattern.
    pub fn get_stack_reserve(&self, idx: u8) -> u16 {
        self.task(idx).stack_reserve()
    }

    fn post_timer_events(&self, time: Time) {
        for i in 0..self.suspended_len.get() {
            let idx = self.suspended_at(i);
            let task = self.task(idx);
            let mask = task.event_mask.get();

            if mask & EVT_DELAY_TIMER != 0 {
                let remaining = task.cnt_delay.get();
                if remaining > 0 {
                    let remaining = remaining - 1;
                    task.cnt_delay.set(remaining);
                    if remaining == 0 {
                        task.posted_event_vec
                            .set(task.posted_event_vec.get() | EVT_DELAY_TIMER);
                    }
                }
            }

            if mask & EVT_ABS_TIMER != 0 && task.time_due_at.get() == time {
                task.posted_event_vec
                    .set(task.posted_event_vec.get() | EVT_ABS_TIMER);
            }
        }
    }

    /// Move every suspended task whose wait predicate now holds into its
    /// ready queue. This is the *only* place the suspended set's
    /// membership changes outside of [`Kernel::suspend`] itself — see the
    /// crate's design notes on why timer posting must never mutate the
    /// suspended set directly.
    fn scan_suspended_for_activation(&self) {
        let mut i = 0;
        while i < self.suspended_len.get() {
            let idx = self.suspended_at(i);
            let task = self.task(idx);
            if event::is_released(task) {
                task.event_mask.set(0);
                self.suspended_remove_at(i);
                self.ready_push(task.prio_class(), idx);
            } else {
                i += 1;
            }
        }
    }

    #[cfg(feature = "round-robin")]
    fn tick_round_robin(&self) -> bool {
        let current = self.active.get();
        if current == self.idle_index() {
            return false;
        }
        let task = self.task(current);
        if task.time_round_robin == 0 {
            return false;
        }
        let remaining = task.cnt_round_robin.get();
        let remaining = if remaining == 0 {
            task.time_round_robin
        } else {
            remaining
        };
        let remaining = remaining - 1;
        if remaining == 0 {
            task.cnt_round_robin.set(task.time_round_robin);
            self.ready_push(task.prio_class(), current);
            true
        } else {
            task.cnt_round_robin.set(remaining);
            false
        }
    }

    /// Does the highest-ready class strictly outrank the active task?
    fn preempts_active(&self) -> bool {
        match self.highest_ready() {
            Some((prio, _)) => prio > self.task(self.active.get()).prio_class(),
            None => false,
        }
    }

    /// Pick whatever should run next (highest-ready, or idle if nothing is
    /// ready) and make it active.
    fn dispatch_next(&self) {
        let next = match self.highest_ready() {
            Some((_, idx)) => {
                self.ready_remove(self.task(idx).prio_class(), idx);
                idx
            }
            None => self.idle_index(),
        };
        self.previous_active.set(self.active.get());
        self.active.set(next);
    }

    /// `(priority, task index)` of the head of the highest non-empty ready
    /// queue, searching from the highest class down.
    fn highest_ready(&self) -> Option<(u8, u8)> {
        // SAFETY: single-core, always called with interrupts globally
        // disabled by the naked primitives in `crate::isr`.
        let lens = unsafe { &*self.ready_len.get() };
        for class in (0..MAX_PRIO_CLASSES).rev() {
            if lens[class] > 0 {
                // SAFETY: as above.
                let ready = unsafe { &*self.ready.get() };
                return Some((class as u8, ready[class][0]));
            }
        }
        None
    }

    fn ready_push(&self, class: u8, idx: u8) {
        // SAFETY: as in `highest_ready`.
        let lens = unsafe { &mut *self.ready_len.get() };
        let ready = unsafe { &mut *self.ready.get() };
        let len = lens[class as usize] as usize;
        assert!(len < MAX_TASKS_PER_CLASS, "too many ready tasks in one priority class");
        ready[class as usize][len] = idx;
        lens[class as usize] = (len + 1) as u8;
    }

    fn ready_remove(&self, class: u8, idx: u8) {
        // SAFETY: as in `highest_ready`.
        let lens = unsafe { &mut *self.ready_len.get() };
        let ready = unsafe { &mut *self.ready.get() };
        let len = lens[class as usize] as usize;
        let slice = &mut ready[class as usize][..len];
        let pos = slice.iter().position(|&t| t == idx).expect("task not in its ready queue");
        slice[pos..].rotate_left(1);
        lens[class as usize] = (len - 1) as u8;
    }

    fn suspend(&self, idx: u8) {
        // SAFETY: as in `highest_ready`.
        let suspended = unsafe { &mut *self.suspended.get() };
        let len = self.suspended_len.get() as usize;
        assert!(len < MAX_TASKS, "too many suspended tasks");
        suspended[len] = idx;
        self.suspended_len.set((len + 1) as u8);
    }

    fn suspended_at(&self, i: u8) -> u8 {
        // SAFETY: as in `highest_ready`.
        unsafe { &*self.suspended.get() }[i as usize]
    }

    fn suspended_remove_at(&self, i: u8) {
        // SAFETY: as in `highest_ready`.
        let suspended = unsafe { &mut *self.suspended.get() };
        let len = self.suspended_len.get() as usize;
        suspended[i as usize..len].rotate_left(1);
        self.suspended_len.set((len - 1) as u8);
    }
}

/// SAFETY: every field is either set once at construction (`tasks`) or
/// accessed only with interrupts globally disabled on this single core
/// (`Cell`/`UnsafeCell` fields).
unsafe impl Sync for Kernel {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stack;

    #[cfg(not(feature = "round-robin"))]
    fn task(entry: crate::TaskEntryFn, prio: u8, stack: &Stack<64>) -> TaskDescriptor {
        TaskDescriptor::new(entry, prio, stack)
    }

    #[cfg(feature = "round-robin")]
    fn task(entry: crate::TaskEntryFn, prio: u8, stack: &Stack<64>) -> TaskDescriptor {
        TaskDescriptor::new(entry, prio, 0, stack)
    }

    fn never() -> ! {
        loop {}
    }

    #[test]
    fn dispatch_prefers_strictly_higher_priority() {
        let s0 = Stack::<64>::new();
        let s1 = Stack::<64>::new();
        let low = task(never, 0, &s0);
        let high = task(never, 1, &s1);
        let idle = TaskDescriptor::idle();
        let tasks: &'static [TaskDescriptor] =
            Box::leak(vec![low, high, idle].into_boxed_slice());
        let kernel = Kernel::new(tasks);

        kernel.ready_push(0, 0);
        kernel.ready_push(1, 1);
        kernel.active.set(2); // idle

        assert!(kernel.preempts_active());
        kernel.dispatch_next();
        assert_eq!(kernel.active(), 1);
    }

    #[test]
    fn scan_moves_released_tasks_from_suspended_to_ready() {
        let s0 = Stack::<64>::new();
        let waiter = task(never, 0, &s0);
        let idle = TaskDescriptor::idle();
        let tasks: &'static [TaskDescriptor] = Box::leak(vec![waiter, idle].into_boxed_slice());
        let kernel = Kernel::new(tasks);

        kernel.task(0).event_mask.set(0x0001);
        kernel.task(0).wait_for_any_event.set(true);
        kernel.suspend(0);
        assert_eq!(kernel.suspended_len.get(), 1);

        kernel.task(0).posted_event_vec.set(0x0001);
        kernel.scan_suspended_for_activation();

        assert_eq!(kernel.suspended_len.get(), 0);
        assert_eq!(kernel.highest_ready(), Some((0, 0)));
    }

    #[test]
    fn delay_timeout_releases_after_exactly_n_plus_one_ticks() {
        let s0 = Stack::<64>::new();
        let waiter = task(never, 0, &s0);
        let idle = TaskDescriptor::idle();
        let tasks: &'static [TaskDescriptor] = Box::leak(vec![waiter, idle].into_boxed_slice());
        let kernel = Kernel::new(tasks);

        event::store_resume_condition(kernel.task(0), EVT_DELAY_TIMER, true, 2, now());
        kernel.suspend(0);

        // Ticks 1 and 2 merely decrement; tick 3 posts and releases.
        kernel.post_timer_events(now());
        kernel.scan_suspended_for_activation();
        assert_eq!(kernel.suspended_len.get(), 1);

        for _ in 0..3 {
            kernel.post_timer_events(now());
        }
        kernel.scan_suspended_for_activation();
        assert_eq!(kernel.suspended_len.get(), 0);
    }

    #[cfg(feature = "round-robin")]
    #[test]
    fn round_robin_requeues_active_task_on_slice_expiry() {
        let s0 = Stack::<64>::new();
        let s1 = Stack::<64>::new();
        let a = task(never, 0, &s0);
        let b = TaskDescriptor::new(never, 0, 2, &s1);
        let idle = TaskDescriptor::idle();
        let tasks: &'static [TaskDescriptor] = Box::leak(vec![a, b, idle].into_boxed_slice());
        let kernel = Kernel::new(tasks);

        kernel.active.set(1);
        assert!(!kernel.tick_round_robin());
        assert!(kernel.tick_round_robin());
        assert_eq!(kernel.highest_ready(), Some((0, 1)));
    }
}

// End of File
