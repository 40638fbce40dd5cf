//! Eight-channel phase-control (TRIAC) dimmer synchronised to the mains
//! zero crossing.
//!
//! Two contexts touch the board: the periodic tick (which also carries the
//! player's `set_output` calls) and the zero-crossing edge. Per-channel fade
//! state sits behind a short critical section; the crossing bookkeeping is
//! integer-only and lock-free so the edge handler never waits.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Mutex, MutexGuard,
};

use tracing::{info, warn};

use crate::{
    config::{MainsSource, TimingConfig},
    hal::{OutputPin, Pin},
    timeline::DIMMER_CHANNELS,
    Result, StagelightError,
};

pub const TRIAC_CHANNELS: usize = DIMMER_CHANNELS as usize;

/// Fade state of one dimmer channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputState {
    pub value: i32,
    pub from: i32,
    pub to: i32,
    pub start_time: u32,
    pub duration: u32,
}

impl OutputState {
    /// Starts a new fade from the current value.
    pub fn set(&mut self, to: i32, start_time: u32, duration: u32) {
        self.from = self.value;
        self.to = to;
        self.start_time = start_time;
        self.duration = duration;
    }

    /// Recomputes `value` for storyboard time `time`.
    pub fn update(&mut self, time: u32) {
        if self.duration == 0 {
            self.value = if time >= self.start_time {
                self.to
            } else {
                self.from
            };
            return;
        }

        let duration = i64::from(self.duration);
        let elapsed = (i64::from(time) - i64::from(self.start_time)).clamp(0, duration);
        let delta = i64::from(self.to) - i64::from(self.from);
        self.value = self.from + (delta * elapsed / duration) as i32;
    }
}

/// Output lines driven by the board.
pub struct TriacPins {
    pub gates: [Pin; TRIAC_CHANNELS],
    pub heartbeat: Pin,
}

#[derive(Debug, Clone, Copy)]
struct CrossingTiming {
    ticks_per_second: u32,
    crossings_per_second: u32,
    nominal_ticks: u32,
    max_delta: u32,
    gate_ticks: u32,
    mains: MainsSource,
}

pub struct TriacBoard {
    timing: CrossingTiming,
    states: Mutex<[OutputState; TRIAC_CHANNELS]>,
    pins: Mutex<TriacPins>,
    ticks_since_crossing: AtomicU32,
    last_crossing_ticks: AtomicU32,
    crossings: AtomicU32,
    input_stable: AtomicBool,
    reported_stable: AtomicBool,
    heartbeat: AtomicBool,
}

impl TriacBoard {
    pub fn new(config: &TimingConfig, pins: TriacPins) -> Self {
        Self {
            timing: CrossingTiming {
                ticks_per_second: config.ticks_per_second,
                crossings_per_second: config.crossings_per_second,
                nominal_ticks: config.nominal_ticks_per_crossing(),
                max_delta: config.max_crossing_delta(),
                gate_ticks: config.gate_ticks(),
                mains: config.mains,
            },
            states: Mutex::new([OutputState::default(); TRIAC_CHANNELS]),
            pins: Mutex::new(pins),
            ticks_since_crossing: AtomicU32::new(0),
            last_crossing_ticks: AtomicU32::new(0),
            crossings: AtomicU32::new(0),
            input_stable: AtomicBool::new(false),
            reported_stable: AtomicBool::new(false),
            heartbeat: AtomicBool::new(false),
        }
    }

    /// Requests a fade of channel `idx` towards `value` (0-100).
    pub fn set_output(&self, idx: usize, value: i32, start_time: u32, duration: u32) -> Result<()> {
        let mut states = self.lock_states()?;
        let state = states
            .get_mut(idx)
            .ok_or(StagelightError::InvalidOutput {
                board: "triac",
                index: idx,
            })?;
        state.set(value, start_time, duration);
        Ok(())
    }

    /// Zero-crossing edge handler.
    pub fn zero_crossing(&self) {
        let last = self.ticks_since_crossing.swap(0, Ordering::AcqRel);
        self.last_crossing_ticks.store(last, Ordering::Release);

        let stable = last.abs_diff(self.timing.nominal_ticks) < self.timing.max_delta;
        self.input_stable.store(stable, Ordering::Release);

        let count = self.crossings.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= self.timing.crossings_per_second {
            self.crossings.store(0, Ordering::Release);
            self.heartbeat.fetch_xor(true, Ordering::AcqRel);
        }
    }

    /// Per-tick update: advances fades to storyboard time `time` and drives the
    /// gate lines relative to the last zero crossing.
    pub fn on_tick(&self, time: u32) -> Result<()> {
        let ticks = self.ticks_since_crossing.fetch_add(1, Ordering::AcqRel) + 1;
        if self.timing.mains == MainsSource::Simulated && ticks >= self.timing.nominal_ticks {
            self.zero_crossing();
        }

        let stable = self.input_is_stable();
        if self.reported_stable.swap(stable, Ordering::AcqRel) != stable {
            if stable {
                info!(frequency = self.measured_frequency(), "mains input stable");
            } else {
                warn!(
                    last_crossing_ticks = self.last_crossing_ticks(),
                    "mains input unstable, dimmer outputs forced off"
                );
            }
        }

        let mut pins = self.lock_pins()?;
        pins.heartbeat.set_level(self.heartbeat.load(Ordering::Acquire));

        if !stable {
            for gate in pins.gates.iter_mut() {
                gate.set_level(false);
            }
            return Ok(());
        }

        let ticks = self.ticks_since_crossing.load(Ordering::Acquire);
        let half_cycle = self.last_crossing_ticks.load(Ordering::Acquire);
        let values = {
            let mut states = self.lock_states()?;
            let mut values = [0; TRIAC_CHANNELS];
            for (state, value) in states.iter_mut().zip(values.iter_mut()) {
                state.update(time);
                *value = state.value;
            }
            values
        };

        for (gate, value) in pins.gates.iter_mut().zip(values) {
            gate.set_level(self.gate_level(ticks, half_cycle, value));
        }
        Ok(())
    }

    fn gate_level(&self, ticks: u32, half_cycle: u32, value: i32) -> bool {
        let value = value.clamp(0, 100) as u32;
        if value == 0 {
            return false;
        }
        let low_ticks = half_cycle * (100 - value) / 100;
        match self.timing.mains {
            // Holding the line high approximates the average power without discrete pulses.
            MainsSource::Simulated => ticks > low_ticks,
            MainsSource::External => ticks >= low_ticks && ticks <= low_ticks + self.timing.gate_ticks,
        }
    }

    pub fn input_is_stable(&self) -> bool {
        self.input_stable.load(Ordering::Acquire)
    }

    /// Fails with [`StagelightError::HardwareInputUnstable`] while the mains
    /// signal is out of tolerance.
    pub fn check_input(&self) -> Result<()> {
        if self.input_is_stable() {
            Ok(())
        } else {
            Err(StagelightError::HardwareInputUnstable {
                last_crossing_ticks: self.last_crossing_ticks(),
            })
        }
    }

    pub fn last_crossing_ticks(&self) -> u32 {
        self.last_crossing_ticks.load(Ordering::Acquire)
    }

    /// Line frequency derived from the last half-cycle, 0 before the first crossing.
    pub fn measured_frequency(&self) -> f32 {
        let last = self.last_crossing_ticks();
        if last == 0 {
            return 0.0;
        }
        self.timing.ticks_per_second as f32 / (last as f32 * 2.0)
    }

    pub fn heartbeat(&self) -> bool {
        self.heartbeat.load(Ordering::Acquire)
    }

    /// Current value of every channel.
    pub fn values(&self) -> Result<[i32; TRIAC_CHANNELS]> {
        let snapshot = *self.lock_states()?;
        Ok(snapshot.map(|s| s.value))
    }

    pub fn state(&self, idx: usize) -> Result<Option<OutputState>> {
        let states = self.lock_states()?;
        Ok(states.get(idx).copied())
    }

    fn lock_states(&self) -> Result<MutexGuard<'_, [OutputState; TRIAC_CHANNELS]>> {
        self.states
            .lock()
            .map_err(|_| StagelightError::msg("triac output state has been poisoned"))
    }

    fn lock_pins(&self) -> Result<MutexGuard<'_, TriacPins>> {
        self.pins
            .lock()
            .map_err(|_| StagelightError::msg("triac pins have been poisoned"))
    }
}

impl std::fmt::Debug for TriacBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriacBoard")
            .field("timing", &self.timing)
            .field("input_stable", &self.input_is_stable())
            .field("last_crossing_ticks", &self.last_crossing_ticks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedPin;

    struct Probe {
        gates: Vec<SimulatedPin>,
        heartbeat: SimulatedPin,
    }

    fn board(mains: MainsSource) -> (TriacBoard, Probe) {
        let gates: Vec<SimulatedPin> = (0..TRIAC_CHANNELS).map(|_| SimulatedPin::new()).collect();
        let heartbeat = SimulatedPin::new();
        let pins = TriacPins {
            gates: std::array::from_fn(|i| gates[i].boxed()),
            heartbeat: heartbeat.boxed(),
        };
        let config = TimingConfig {
            mains,
            ..TimingConfig::default()
        };
        (TriacBoard::new(&config, pins), Probe { gates, heartbeat })
    }

    #[test]
    fn linear_fade_is_clamped() {
        let mut state = OutputState::default();
        state.set(100, 0, 100);

        state.update(0);
        assert_eq!(state.value, 0);
        state.update(50);
        assert_eq!(state.value, 50);
        state.update(100);
        assert_eq!(state.value, 100);
        state.update(150);
        assert_eq!(state.value, 100);
    }

    #[test]
    fn fade_starts_from_current_value() {
        let mut state = OutputState::default();
        state.set(80, 0, 0);
        state.update(0);
        state.set(20, 1000, 300);

        state.update(999);
        assert_eq!(state.value, 80);
        state.update(1100);
        assert_eq!(state.value, 60);
        state.update(1300);
        assert_eq!(state.value, 20);
    }

    #[test]
    fn step_waits_for_start_time() {
        let mut state = OutputState::default();
        state.set(70, 500, 0);

        state.update(499);
        assert_eq!(state.value, 0);
        state.update(500);
        assert_eq!(state.value, 70);
    }

    #[test]
    fn outputs_stay_off_until_mains_is_stable() {
        let (board, probe) = board(MainsSource::Simulated);
        board.set_output(0, 100, 0, 0).unwrap();

        for _ in 0..99 {
            board.on_tick(0).unwrap();
            assert!(!probe.gates[0].is_high());
        }
        assert!(!board.input_is_stable());

        board.on_tick(0).unwrap();
        assert!(board.input_is_stable());
        assert_eq!(board.last_crossing_ticks(), 100);
        assert!((board.measured_frequency() - 50.0).abs() < f32::EPSILON);

        board.on_tick(0).unwrap();
        assert!(probe.gates[0].is_high());
    }

    #[test]
    fn simulated_mode_holds_line_high_after_phase_delay() {
        let (board, probe) = board(MainsSource::Simulated);
        for _ in 0..100 {
            board.on_tick(0).unwrap();
        }
        board.set_output(2, 25, 0, 0).unwrap();

        let mut high_ticks = 0;
        for _ in 0..100 {
            board.on_tick(0).unwrap();
            if probe.gates[2].is_high() {
                high_ticks += 1;
            }
        }
        // High for ticks 76..=99; the crossing tick itself resets the phase.
        assert_eq!(high_ticks, 24);
        assert!(!probe.gates[1].is_high());
    }

    #[test]
    fn external_mode_fires_a_short_gate_pulse() {
        let (board, probe) = board(MainsSource::External);
        for _ in 0..100 {
            board.on_tick(0).unwrap();
        }
        board.zero_crossing();
        assert!(board.input_is_stable());
        board.set_output(0, 60, 0, 0).unwrap();

        let mut high_at = Vec::new();
        for _ in 0..100 {
            board.on_tick(0).unwrap();
            let ticks = board.ticks_since_crossing.load(Ordering::Acquire);
            if probe.gates[0].is_high() {
                high_at.push(ticks);
            }
        }
        assert_eq!(high_at, vec![40, 41]);
        assert_eq!(probe.gates[0].rising_edges(), 1);
    }

    #[test]
    fn unstable_crossing_forces_outputs_off() {
        let (board, probe) = board(MainsSource::External);
        for _ in 0..100 {
            board.on_tick(0).unwrap();
        }
        board.zero_crossing();
        board.set_output(0, 100, 0, 0).unwrap();
        board.on_tick(0).unwrap();
        assert!(probe.gates[0].is_high());

        for _ in 0..40 {
            board.on_tick(0).unwrap();
        }
        board.zero_crossing();
        assert!(!board.input_is_stable());
        assert!(matches!(
            board.check_input(),
            Err(StagelightError::HardwareInputUnstable {
                last_crossing_ticks: 41
            })
        ));

        board.on_tick(0).unwrap();
        assert!(!probe.gates[0].is_high());
    }

    #[test]
    fn heartbeat_toggles_once_per_second_of_crossings() {
        let (board, probe) = board(MainsSource::Simulated);
        for _ in 0..(100 * 100) {
            board.on_tick(0).unwrap();
        }
        assert!(board.heartbeat());
        assert!(probe.heartbeat.is_high());

        for _ in 0..(100 * 100) {
            board.on_tick(0).unwrap();
        }
        assert!(!board.heartbeat());
    }

    #[test]
    fn rejects_unknown_channel() {
        let (board, _) = board(MainsSource::Simulated);
        assert!(matches!(
            board.set_output(8, 10, 0, 0),
            Err(StagelightError::InvalidOutput { index: 8, .. })
        ));
        assert!(matches!(
            board.set_output(264, 10, 0, 0),
            Err(StagelightError::InvalidOutput { index: 264, .. })
        ));
    }

    #[test]
    fn tick_advances_fades() {
        let (board, _) = board(MainsSource::Simulated);
        board.set_output(4, 100, 0, 100).unwrap();
        board.on_tick(50).unwrap();
        // Fades only advance once the mains input is stable.
        assert_eq!(board.values().unwrap()[4], 0);

        for _ in 0..100 {
            board.on_tick(50).unwrap();
        }
        assert_eq!(board.values().unwrap()[4], 50);
    }
}
