use std::sync::Arc;

use crate::{
    config::AppConfig,
    hal::{Delay, Pin, SimulatedPin, SpinDelay},
    player::StoryboardPlayer,
    relay::{RelayBoard, RelayBus, RELAY_GROUPS},
    storyboard::Storyboard,
    triac::{TriacBoard, TriacPins, TRIAC_CHANNELS},
    Result,
};

/// Converts scheduler ticks into elapsed milliseconds without drift.
#[derive(Debug, Clone)]
pub struct TickClock {
    ticks_per_second: u32,
    ticks: u64,
    elapsed_ms: u64,
}

impl TickClock {
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            ticks_per_second: ticks_per_second.max(1),
            ticks: 0,
            elapsed_ms: 0,
        }
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
        self.elapsed_ms = 0;
    }

    /// Counts one tick and returns the whole milliseconds it completed.
    pub fn advance(&mut self) -> u32 {
        self.ticks += 1;
        let elapsed_ms = self.ticks * 1000 / u64::from(self.ticks_per_second);
        let delta = elapsed_ms - self.elapsed_ms;
        self.elapsed_ms = elapsed_ms;
        delta as u32
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }
}

/// Observer side of a simulated rig's output lines.
#[derive(Debug, Clone)]
pub struct SimulatedOutputs {
    pub gates: [SimulatedPin; TRIAC_CHANNELS],
    pub heartbeat: SimulatedPin,
    pub data: [SimulatedPin; 8],
    pub chip_select: [SimulatedPin; RELAY_GROUPS],
}

impl SimulatedOutputs {
    fn new() -> Self {
        Self {
            gates: std::array::from_fn(|_| SimulatedPin::new()),
            heartbeat: SimulatedPin::new(),
            data: std::array::from_fn(|_| SimulatedPin::new()),
            chip_select: std::array::from_fn(|_| SimulatedPin::new()),
        }
    }

    fn triac_pins(&self) -> TriacPins {
        TriacPins {
            gates: std::array::from_fn(|i| self.gates[i].boxed()),
            heartbeat: self.heartbeat.boxed(),
        }
    }

    fn relay_bus(&self) -> RelayBus {
        RelayBus {
            data: std::array::from_fn(|i| self.data[i].boxed()),
            chip_select: std::array::from_fn(|i| self.chip_select[i].boxed()),
            delay: Box::new(SpinDelay),
        }
    }
}

/// Composition root: owns the player and shares the boards with whatever
/// context delivers zero-crossing edges.
#[derive(Debug)]
pub struct ShowRig {
    player: StoryboardPlayer,
    triac: Arc<TriacBoard>,
    relay: Arc<RelayBoard>,
    clock: TickClock,
}

impl ShowRig {
    /// Wires the rig to caller-provided output lines.
    pub fn new(
        config: &AppConfig,
        storyboard: Storyboard,
        triac_pins: TriacPins,
        relay_data: [Pin; 8],
        relay_chip_select: [Pin; RELAY_GROUPS],
        delay: Delay,
    ) -> Result<Self> {
        config.validate()?;
        let triac = Arc::new(TriacBoard::new(&config.timing, triac_pins));
        let relay = Arc::new(RelayBoard::new(
            &config.relay,
            RelayBus {
                data: relay_data,
                chip_select: relay_chip_select,
                delay,
            },
        ));
        Ok(Self::assemble(config, storyboard, triac, relay))
    }

    /// Builds a rig on simulated pins and returns their observer clones.
    pub fn simulated(config: &AppConfig, storyboard: Storyboard) -> Result<(Self, SimulatedOutputs)> {
        config.validate()?;
        let outputs = SimulatedOutputs::new();
        let triac = Arc::new(TriacBoard::new(&config.timing, outputs.triac_pins()));
        let relay = Arc::new(RelayBoard::new(&config.relay, outputs.relay_bus()));
        Ok((Self::assemble(config, storyboard, triac, relay), outputs))
    }

    fn assemble(
        config: &AppConfig,
        storyboard: Storyboard,
        triac: Arc<TriacBoard>,
        relay: Arc<RelayBoard>,
    ) -> Self {
        let player = StoryboardPlayer::new(storyboard, triac.clone(), relay.clone(), &config.player);
        Self {
            player,
            triac,
            relay,
            clock: TickClock::new(config.timing.ticks_per_second),
        }
    }

    pub fn player(&self) -> &StoryboardPlayer {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut StoryboardPlayer {
        &mut self.player
    }

    /// Shared handle for the zero-crossing interrupt context.
    pub fn triac(&self) -> Arc<TriacBoard> {
        self.triac.clone()
    }

    pub fn relay(&self) -> Arc<RelayBoard> {
        self.relay.clone()
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// One scheduler tick.
    pub fn tick(&mut self) -> Result<()> {
        let delta_ms = self.clock.advance();
        self.player.tick(delta_ms)
    }

    /// Alternates background work and ticks for `ticks` scheduler ticks.
    pub fn run_for(&mut self, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.player.main_loop()?;
            self.tick()?;
        }
        Ok(())
    }
}
