use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{hal::LATCH_MIN_PULSE_NS, Result, StagelightError};

/// Top-level configuration structure for the rig.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timing: TimingConfig,
    pub player: PlayerConfig,
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that cannot drive the boards.
    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;
        self.player.validate()?;
        self.relay.validate()
    }
}

/// Where zero-crossing edges come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainsSource {
    /// Synthesise an edge every nominal half-cycle from the tick counter.
    #[default]
    Simulated,
    /// Edges are delivered by an interrupt calling `TriacBoard::zero_crossing`.
    External,
}

/// Tick rate and mains synchronisation settings for the phase-control board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub ticks_per_second: u32,
    /// Zero crossings per second; twice the line frequency.
    pub crossings_per_second: u32,
    pub stability_tolerance_percent: u32,
    /// Gate pulse width as a percentage of the nominal half-cycle.
    pub gate_percent: u32,
    pub mains: MainsSource,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 10_000,
            crossings_per_second: 100,
            stability_tolerance_percent: 20,
            gate_percent: 1,
            mains: MainsSource::Simulated,
        }
    }
}

impl TimingConfig {
    pub fn nominal_ticks_per_crossing(&self) -> u32 {
        self.ticks_per_second / self.crossings_per_second.max(1)
    }

    pub fn max_crossing_delta(&self) -> u32 {
        self.nominal_ticks_per_crossing() * self.stability_tolerance_percent / 100
    }

    pub fn gate_ticks(&self) -> u32 {
        self.nominal_ticks_per_crossing() * self.gate_percent / 100
    }

    fn validate(&self) -> Result<()> {
        if self.ticks_per_second == 0 || self.crossings_per_second == 0 {
            return Err(StagelightError::InvalidConfig(
                "tick and crossing rates must be non-zero",
            ));
        }
        if self.nominal_ticks_per_crossing() == 0 {
            return Err(StagelightError::InvalidConfig(
                "tick rate must exceed the crossing rate",
            ));
        }
        Ok(())
    }
}

/// How many due entries the player applies per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Apply at most one buffered entry per tick.
    Single,
    /// Apply every buffered entry whose time has arrived.
    #[default]
    AllDue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Lookahead slots; one slot always stays empty.
    pub buffer_capacity: usize,
    pub drain_policy: DrainPolicy,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10,
            drain_policy: DrainPolicy::AllDue,
        }
    }
}

impl PlayerConfig {
    fn validate(&self) -> Result<()> {
        if self.buffer_capacity < 2 {
            return Err(StagelightError::InvalidConfig(
                "play buffer needs at least two slots",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub latch_pulse_ns: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { latch_pulse_ns: 48 }
    }
}

impl RelayConfig {
    fn validate(&self) -> Result<()> {
        if self.latch_pulse_ns < LATCH_MIN_PULSE_NS {
            return Err(StagelightError::InvalidConfig(
                "latch pulse is shorter than the latch minimum clock width",
            ));
        }
        Ok(())
    }
}
