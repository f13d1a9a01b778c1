//! The event-and-timer wait engine: the wait predicate and the
//! resume-condition helper shared by `wait_for_event` and task
//! initialization.
//!
//! Grounded directly on the original implementation's
//! `checkForTaskActivation` release test and `storeResumeCondition`, since
//! the teacher crate's round-robin-only scheduler has no event engine of its
//! own to generalize.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::task::TaskDescriptor;
use crate::{EVT_ABS_TIMER, EVT_DELAY_TIMER, Time};

/// A bit vector of event bits: the four reserved timer/ISR bits plus twelve
/// application-defined bits.
pub type EventMask = u16;

/// The bitwise-or of both timer event bits.
const TIMER_EVT_MASK: EventMask = EVT_ABS_TIMER | EVT_DELAY_TIMER;

/// Does `task`'s current `posted_event_vec` satisfy its wait predicate?
///
/// In "any" mode, any posted bit releases the task. In "all" mode, every
/// non-timer bit of the mask must be posted — but either timer bit in the
/// mask is an OR short-circuit even in "all" mode, since timer bits are
/// timeouts, not mandatory conditions. This asymmetry must not be refactored
/// into a uniform "all bits match" test.
pub(crate) fn is_released(task: &TaskDescriptor) -> bool {
    let posted = task.posted_event_vec.get();
    let mask = task.event_mask.get();

    if task.wait_for_any_event.get() {
        posted != 0
    } else {
        ((posted ^ mask) & !TIMER_EVT_MASK) == 0 || (posted & mask & TIMER_EVT_MASK) != 0
    }
}

/// Record the resume condition (`mask`, `all`, `timeout`) a task is about to
/// suspend on, given the current system `time`.
///
/// If `mask` contains the absolute-timer bit, `task.time_due_at` advances by
/// `timeout` (wrapping); if the new due time is not strictly in the future,
/// the saturating overrun counter increments and the task is instead made
/// due on the very next tick. Otherwise the delay counter is loaded from
/// `timeout + 1` (the `+1` absorbs the sub-tick phase uncertainty between
/// this call and the next tick), falling back to `timeout` unchanged if that
/// sum wraps to zero.
pub(crate) fn store_resume_condition(
    task: &TaskDescriptor,
    mask: EventMask,
    all: bool,
    timeout: Time,
    time: Time,
) {
    debug_assert!(
        mask & TIMER_EVT_MASK != TIMER_EVT_MASK,
        "a wait mask must not set both timer bits at once"
    );

    if mask & EVT_ABS_TIMER != 0 {
        let new_due_at = task.time_due_at.get().wrapping_add(timeout);
        task.time_due_at.set(new_due_at);

        if is_in_past_or_now(new_due_at, time) {
            let overrun = task.cnt_overrun.get();
            task.cnt_overrun.set(overrun.saturating_add(1));
            task.time_due_at.set(time.wrapping_add(1));
        }
    } else {
        let bumped = timeout.wrapping_add(1);
        task.cnt_delay.set(if bumped != 0 { bumped } else { timeout });
    }

    task.event_mask.set(mask);
    task.wait_for_any_event.set(!all);
}

/// Cyclic "is `due_at` not strictly after `time`" test, using signed
/// subtraction against half the type's range — the standard cyclic-clock
/// overrun test. `due_at` and `time` must be the same width or this breaks.
fn is_in_past_or_now(due_at: Time, time: Time) -> bool {
    (due_at.wrapping_sub(time) as SignedTime) <= 0
}

#[cfg(feature = "time-u16")]
type SignedTime = i16;
#[cfg(feature = "time-u8")]
type SignedTime = i8;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stack;

    fn make_task() -> (TaskDescriptor, Stack<64>) {
        // Two-step construction avoids the descriptor outliving its stack;
        // tests only need the timer/event fields, never an actual context.
        let stack = Stack::<64>::new();
        (task_for(&stack), stack)
    }

    #[cfg(not(feature = "round-robin"))]
    fn task_for(stack: &Stack<64>) -> TaskDescriptor {
        fn entry() -> ! {
            loop {}
        }
        TaskDescriptor::new(entry, 0, stack)
    }

    #[cfg(feature = "round-robin")]
    fn task_for(stack: &Stack<64>) -> TaskDescriptor {
        fn entry() -> ! {
            loop {}
        }
        TaskDescriptor::new(entry, 0, 0, stack)
    }

    #[test]
    fn any_mode_releases_on_first_bit() {
        let (task, _stack) = make_task();
        task.event_mask.set(0x0003);
        task.wait_for_any_event.set(true);
        task.posted_event_vec.set(0x0001);
        assert!(is_released(&task));
    }

    #[test]
    fn any_mode_not_released_when_nothing_posted() {
        let (task, _stack) = make_task();
        task.event_mask.set(0x0003);
        task.wait_for_any_event.set(true);
        task.posted_event_vec.set(0);
        assert!(!is_released(&task));
    }

    #[test]
    fn all_mode_requires_every_non_timer_bit() {
        let (task, _stack) = make_task();
        task.event_mask.set(0x0003);
        task.wait_for_any_event.set(false);
        task.posted_event_vec.set(0x0001);
        assert!(!is_released(&task));
        task.posted_event_vec.set(0x0003);
        assert!(is_released(&task));
    }

    #[test]
    fn all_mode_timer_bit_short_circuits() {
        let (task, _stack) = make_task();
        task.event_mask.set(0x0001 | EVT_DELAY_TIMER);
        task.wait_for_any_event.set(false);
        // Only the timer bit fired; the application bit never arrived.
        task.posted_event_vec.set(EVT_DELAY_TIMER);
        assert!(is_released(&task));
    }

    #[test]
    fn delay_timeout_zero_absorbs_sub_tick_phase() {
        let (task, _stack) = make_task();
        store_resume_condition(&task, EVT_DELAY_TIMER, true, 0, 0);
        assert_eq!(task.cnt_delay.get(), 1);
    }

    #[test]
    fn delay_timeout_adds_one_tick_of_slack() {
        let (task, _stack) = make_task();
        store_resume_condition(&task, EVT_DELAY_TIMER, true, 5, 0);
        assert_eq!(task.cnt_delay.get(), 6);
    }

    #[test]
    fn absolute_timer_advances_and_detects_overrun() {
        let (task, _stack) = make_task();
        task.time_due_at.set(10);
        // The next tick is already 20: the requested due time (10 + 5 = 15)
        // is in the past.
        store_resume_condition(&task, EVT_ABS_TIMER, true, 5, 20);
        assert_eq!(task.cnt_overrun.get(), 1);
        assert_eq!(task.time_due_at.get(), 21);
    }

    #[test]
    fn absolute_timer_cadence_without_overrun() {
        let (task, _stack) = make_task();
        task.time_due_at.set(100);
        store_resume_condition(&task, EVT_ABS_TIMER, true, 50, 120);
        assert_eq!(task.cnt_overrun.get(), 0);
        assert_eq!(task.time_due_at.get(), 150);
    }
}

// End of File
