//! 32 switched outputs behind four 8-bit 74HC374 latches sharing one data bus.

use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::{
    config::RelayConfig,
    hal::{Delay, DelayNs, OutputPin, Pin},
    timeline::RELAY_CHANNELS,
    Result, StagelightError,
};

pub const RELAY_GROUPS: usize = RELAY_CHANNELS as usize / 8;

/// Desired output bits per latch group plus their dirty flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LatchState {
    bits: [u8; RELAY_GROUPS],
    dirty: [bool; RELAY_GROUPS],
}

/// Output lines and pulse timing for the latch bus.
pub struct RelayBus {
    pub data: [Pin; 8],
    pub chip_select: [Pin; RELAY_GROUPS],
    pub delay: Delay,
}

pub struct RelayBoard {
    latch: Mutex<LatchState>,
    bus: Mutex<RelayBus>,
    pulse_ns: u32,
}

impl RelayBoard {
    /// Every group starts dirty at 0, so the first tick latches a known state.
    pub fn new(config: &RelayConfig, mut bus: RelayBus) -> Self {
        for cs in bus.chip_select.iter_mut() {
            cs.set_level(false);
        }
        Self {
            latch: Mutex::new(LatchState {
                bits: [0; RELAY_GROUPS],
                dirty: [true; RELAY_GROUPS],
            }),
            bus: Mutex::new(bus),
            pulse_ns: config.latch_pulse_ns,
        }
    }

    /// Requests relay `idx` (0-31) on for any positive `value`, off otherwise.
    pub fn set_output(&self, idx: usize, value: i32) -> Result<()> {
        if idx >= RELAY_CHANNELS as usize {
            return Err(StagelightError::InvalidOutput {
                board: "relay",
                index: idx,
            });
        }
        let group = idx / 8;
        let mask = 1u8 << (idx % 8);

        let mut latch = self.lock_latch()?;
        if value > 0 {
            latch.bits[group] |= mask;
        } else {
            latch.bits[group] &= !mask;
        }
        latch.dirty[group] = true;
        Ok(())
    }

    /// Pushes every dirty group onto the bus and clocks it into its latch.
    /// Returns how many groups were latched.
    pub fn on_tick(&self) -> Result<usize> {
        let snapshot = {
            let mut latch = self.lock_latch()?;
            let snapshot = *latch;
            latch.dirty = [false; RELAY_GROUPS];
            snapshot
        };

        let mut latched = 0;
        let mut bus = self.lock_bus()?;
        for (group, &bits) in snapshot.bits.iter().enumerate() {
            if !snapshot.dirty[group] {
                continue;
            }
            for (bit, line) in bus.data.iter_mut().enumerate() {
                line.set_level(bits & (1 << bit) != 0);
            }
            bus.chip_select[group].set_level(true);
            bus.delay.delay_ns(self.pulse_ns);
            bus.chip_select[group].set_level(false);

            trace!(group, bits, "relay group latched");
            latched += 1;
        }
        Ok(latched)
    }

    /// Requested bits per group, whether latched yet or not.
    pub fn pending(&self) -> Result<[u8; RELAY_GROUPS]> {
        Ok(self.lock_latch()?.bits)
    }

    pub fn is_set(&self, idx: usize) -> Result<bool> {
        let bits = self.pending()?;
        Ok(bits
            .get(idx / 8)
            .is_some_and(|group| group & (1 << (idx % 8)) != 0))
    }

    fn lock_latch(&self) -> Result<MutexGuard<'_, LatchState>> {
        self.latch
            .lock()
            .map_err(|_| StagelightError::msg("relay latch state has been poisoned"))
    }

    fn lock_bus(&self) -> Result<MutexGuard<'_, RelayBus>> {
        self.bus
            .lock()
            .map_err(|_| StagelightError::msg("relay bus has been poisoned"))
    }
}

impl std::fmt::Debug for RelayBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayBoard")
            .field("pulse_ns", &self.pulse_ns)
            .finish()
    }
}
