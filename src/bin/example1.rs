#![no_std]
#![no_main]

use corertos::{EVT_DELAY_TIMER, Kernel, Stack, TaskDescriptor, wait_for_event};

corertos::bind_tick_isr!(TIMER1_COMPA);

static RABBIT_STACK: Stack<256> = Stack::new();
static HAMSTER_STACK: Stack<256> = Stack::new();

static TASKS: [TaskDescriptor; 3] = [
    TaskDescriptor::new(rabbits, 1, &RABBIT_STACK),
    TaskDescriptor::new(hamsters, 0, &HAMSTER_STACK),
    TaskDescriptor::idle(),
];

static KERNEL: Kernel = Kernel::new(&TASKS);

#[unsafe(no_mangle)]
pub extern "C" fn main() -> ! {
    defmt::info!("starting up");
    KERNEL.start(
        || {
            // SAFETY: interrupts are globally disabled for the duration of
            // `start`'s setup; arming the timer here can't race a tick.
            // A real board support crate configures Timer1 CTC mode and its
            // compare-match interrupt enable bit in place of this comment.
        },
        || loop {
            defmt::trace!("idle");
        },
    )
}

fn rabbits() -> ! {
    loop {
        defmt::info!("rabbit! back in 5 ticks");
        unsafe { wait_for_event(EVT_DELAY_TIMER, true, 5) };
    }
}

fn hamsters() -> ! {
    loop {
        defmt::info!("hamster! back in 10 ticks");
        unsafe { wait_for_event(EVT_DELAY_TIMER, true, 10) };
    }
}

// End of File
