//! Core library for the Stagelight rig.
//!
//! Storyboards of timed keyframes are played back across eight phase-control
//! (TRIAC) dimmer channels and 32 latched relay channels. The crate holds the
//! keyframe data model, the lookahead player, both board drivers and a small
//! hardware abstraction so the same code runs on simulated pins and on a
//! target's GPIO.

pub mod config;
pub mod error;
pub mod hal;
pub mod player;
pub mod relay;
pub mod rig;
pub mod show;
pub mod storyboard;
pub mod timeline;
pub mod triac;

pub use config::{AppConfig, DrainPolicy, MainsSource, PlayerConfig, RelayConfig, TimingConfig};
pub use error::{Result, StagelightError};
pub use hal::{DelayNs, OutputPin, SimulatedPin, SpinDelay, LATCH_MIN_PULSE_NS};
pub use player::{PlayStatus, StoryboardPlayer};
pub use relay::{RelayBoard, RelayBus};
pub use rig::{ShowRig, SimulatedOutputs, TickClock};
pub use show::{LoadReport, Rejection, ShowDescription, TimelineDescription};
pub use storyboard::Storyboard;
pub use timeline::{Channel, ChannelKind, Timeline, TimelineEntry};
pub use triac::{OutputState, TriacBoard, TriacPins};
