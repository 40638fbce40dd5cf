//! Storyboard playback.
//!
//! The player keeps a small circular lookahead buffer of merged
//! `(channel, entry)` pairs. The background loop refills it from the
//! storyboard's k-way merge ([`StoryboardPlayer::main_loop`]) while the
//! periodic tick only drains entries whose time has come, so the per-tick cost
//! does not depend on the channel count.

use std::{cmp::Ordering, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    config::{DrainPolicy, PlayerConfig},
    relay::RelayBoard,
    storyboard::Storyboard,
    timeline::{Channel, ChannelKind, TimelineEntry},
    triac::TriacBoard,
    Result, StagelightError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayStatus {
    #[default]
    Stopped,
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlayBufferEntry {
    channel: Channel,
    entry: TimelineEntry,
    /// Storyboard cycle the entry was merged in.
    cycle: u64,
}

#[derive(Debug)]
pub struct StoryboardPlayer {
    storyboard: Storyboard,
    triac: Arc<TriacBoard>,
    relay: Arc<RelayBoard>,
    status: PlayStatus,
    drain_policy: DrainPolicy,
    buffer: Vec<Option<PlayBufferEntry>>,
    head: usize,
    tail: usize,
    /// Time of the newest buffered entry within its cycle.
    head_time: u32,
    /// Time of the last applied entry within the current cycle.
    tail_time: u32,
    head_cycle: u64,
    tail_cycle: u64,
    storyboard_time: u32,
}

impl StoryboardPlayer {
    pub fn new(
        storyboard: Storyboard,
        triac: Arc<TriacBoard>,
        relay: Arc<RelayBoard>,
        config: &PlayerConfig,
    ) -> Self {
        let mut player = Self {
            storyboard,
            triac,
            relay,
            status: PlayStatus::Stopped,
            drain_policy: config.drain_policy,
            buffer: vec![None; config.buffer_capacity.max(2)],
            head: 0,
            tail: 0,
            head_time: 0,
            tail_time: 0,
            head_cycle: 0,
            tail_cycle: 0,
            storyboard_time: 0,
        };
        player.stop();
        player
    }

    pub fn status(&self) -> PlayStatus {
        self.status
    }

    pub fn storyboard(&self) -> &Storyboard {
        &self.storyboard
    }

    /// Milliseconds into the current cycle.
    pub fn storyboard_time(&self) -> u32 {
        self.storyboard_time
    }

    /// Number of entries waiting in the lookahead buffer.
    pub fn buffered(&self) -> usize {
        (self.head + self.buffer.len() - self.tail) % self.buffer.len()
    }

    /// Replaces the storyboard wholesale. Playback stops first.
    pub fn load(&mut self, storyboard: Storyboard) {
        self.stop();
        self.storyboard = storyboard;
        info!(
            timelines = self.storyboard.timelines_count(),
            duration_ms = self.storyboard.duration(),
            "storyboard loaded"
        );
    }

    /// Starts or resumes playback.
    pub fn play(&mut self) -> Result<()> {
        if self.status == PlayStatus::Playing {
            return Ok(());
        }
        if self.storyboard.duration() == 0 {
            warn!("refusing to play a zero-length storyboard");
            self.stop();
            return Err(StagelightError::EmptyShow);
        }

        self.fill_play_buffer()?;
        self.status = PlayStatus::Playing;
        info!(time_ms = self.storyboard_time, "playing");
        Ok(())
    }

    /// Freezes time; buffer and position are kept so `play` resumes.
    pub fn pause(&mut self) {
        if self.status == PlayStatus::Playing {
            self.status = PlayStatus::Paused;
            info!(time_ms = self.storyboard_time, "paused");
        }
    }

    /// Drops buffered entries and rewinds to the start of the storyboard.
    pub fn stop(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.head_time = 0;
        self.tail_time = 0;
        self.head_cycle = 0;
        self.tail_cycle = 0;
        self.storyboard_time = 0;
        self.buffer.fill(None);
        self.storyboard.reset();
        if self.status != PlayStatus::Stopped {
            info!("stopped");
        }
        self.status = PlayStatus::Stopped;
    }

    /// Background work: keeps the lookahead buffer full while playing.
    pub fn main_loop(&mut self) -> Result<()> {
        if self.status == PlayStatus::Playing {
            self.fill_play_buffer()?;
        }
        Ok(())
    }

    /// Tops up the lookahead buffer, wrapping into the next cycle when every
    /// timeline is exhausted. Two exhausted passes in a row with nothing
    /// enqueued in between mean there is nothing to play: playback stops and
    /// [`StagelightError::EmptyShow`] is returned.
    pub fn fill_play_buffer(&mut self) -> Result<usize> {
        let capacity = self.buffer.len();
        let last_free = (self.tail + capacity - 1) % capacity;

        let mut filled = 0;
        let mut cycle_was_reset = false;
        while self.head != last_free {
            let Some((channel, entry)) = self.storyboard.next_timeline_and_entry(self.head_time)
            else {
                if cycle_was_reset {
                    warn!("no entry found for two cycles, stopping");
                    self.stop();
                    return Err(StagelightError::EmptyShow);
                }
                cycle_was_reset = true;
                self.storyboard.reset();
                self.head_time = 0;
                self.head_cycle += 1;
                continue;
            };

            self.buffer[self.head] = Some(PlayBufferEntry {
                channel,
                entry,
                cycle: self.head_cycle,
            });
            self.head_time = entry.time;
            self.head = (self.head + 1) % capacity;
            filled += 1;
            cycle_was_reset = false;
        }

        if filled > 0 {
            debug!(filled, head_time = self.head_time, "play buffer refilled");
        }
        Ok(filled)
    }

    /// Periodic tick: advances storyboard time by `delta_ms` while playing,
    /// applies due entries, then lets both boards drive their outputs.
    pub fn tick(&mut self, delta_ms: u32) -> Result<()> {
        if self.status == PlayStatus::Playing {
            let duration = self.storyboard.duration();
            let elapsed = u64::from(self.storyboard_time) + u64::from(delta_ms);
            let new_time = (elapsed % u64::from(duration.max(1))) as u32;

            if elapsed >= u64::from(duration) {
                // Finish the old cycle before starting the new one.
                self.storyboard_time = duration;
                self.execute_play_buffer()?;
                self.tail_time = 0;
                self.tail_cycle += 1;
            }

            self.storyboard_time = new_time;
            self.execute_play_buffer()?;
        }

        self.triac.on_tick(self.storyboard_time)?;
        self.relay.on_tick()?;
        Ok(())
    }

    /// Applies buffered entries that are due, oldest first, stopping at the
    /// first one that is not. Returns how many were applied.
    ///
    /// An entry of the current cycle is due once `tail_time <= time <=
    /// storyboard_time`. Entries of a later cycle wait for the wrap; entries
    /// left over from an earlier cycle are late and go out immediately.
    pub fn execute_play_buffer(&mut self) -> Result<usize> {
        let mut applied = 0;
        while self.tail != self.head {
            let Some(pending) = self.buffer[self.tail] else {
                break;
            };
            let time = pending.entry.time;
            let current_cycle = pending.cycle == self.tail_cycle;
            let due = match pending.cycle.cmp(&self.tail_cycle) {
                Ordering::Less => true,
                Ordering::Equal => time >= self.tail_time && time <= self.storyboard_time,
                Ordering::Greater => false,
            };
            if !due {
                break;
            }

            self.apply_timeline_entry(pending.channel, &pending.entry)?;
            if current_cycle {
                self.tail_time = time;
            }
            self.buffer[self.tail] = None;
            self.tail = (self.tail + 1) % self.buffer.len();
            applied += 1;

            if self.drain_policy == DrainPolicy::Single {
                break;
            }
        }
        Ok(applied)
    }

    /// Routes an entry to the board that owns `channel`.
    pub fn apply_timeline_entry(&self, channel: Channel, entry: &TimelineEntry) -> Result<()> {
        debug!(
            channel = channel.id(),
            time = entry.time,
            value = entry.value,
            duration = entry.duration,
            "applying entry"
        );
        match channel.kind() {
            ChannelKind::Dimmer(idx) => {
                self.triac
                    .set_output(idx, entry.value, entry.time, entry.duration)
            }
            ChannelKind::Relay(idx) => self.relay.set_output(idx, entry.value),
        }
    }
}
