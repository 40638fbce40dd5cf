//! Minimal hardware abstraction used by the board drivers.
//!
//! Boards only ever drive digital lines and wait for short, bounded pulses, so
//! two traits are enough. Targets implement them over their GPIO and timer
//! services; the hosted build ships a simulated pin and a spin delay.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Minimum clock width of the 74HC374 latch at 4.5 V.
pub const LATCH_MIN_PULSE_NS: u32 = 24;

/// A push-pull digital output line.
pub trait OutputPin {
    fn set_level(&mut self, high: bool);
}

/// Calibrated short delay.
pub trait DelayNs {
    /// Blocks for at least `ns` nanoseconds.
    fn delay_ns(&mut self, ns: u32);
}

/// Boxed pin as stored by the boards.
pub type Pin = Box<dyn OutputPin + Send>;

/// Boxed delay as stored by the relay board.
pub type Delay = Box<dyn DelayNs + Send>;

/// Busy-wait delay on the host monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let deadline = Instant::now() + Duration::from_nanos(u64::from(ns));
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

/// In-memory pin. Clones share state, so one clone can be handed to a board
/// while another observes what the board drives.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPin {
    level: Arc<AtomicBool>,
    rising_edges: Arc<AtomicU32>,
}

impl SimulatedPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }

    /// Number of low-to-high transitions seen so far.
    pub fn rising_edges(&self) -> u32 {
        self.rising_edges.load(Ordering::Acquire)
    }

    pub fn boxed(&self) -> Pin {
        Box::new(self.clone())
    }
}

impl OutputPin for SimulatedPin {
    fn set_level(&mut self, high: bool) {
        let was_high = self.level.swap(high, Ordering::AcqRel);
        if high && !was_high {
            self.rising_edges.fetch_add(1, Ordering::AcqRel);
        }
    }
}
