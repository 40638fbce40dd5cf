use serde::{Deserialize, Serialize};

use crate::{Result, StagelightError};

pub const DIMMER_CHANNELS: u8 = 8;
pub const RELAY_CHANNELS: u8 = 32;
pub const MAX_CHANNEL: u8 = DIMMER_CHANNELS + RELAY_CHANNELS;

/// One physical output, numbered 1-40.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

/// Which board a channel is routed to, with its zero-based index on that board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Dimmer(usize),
    Relay(usize),
}

impl Channel {
    pub fn new(id: u8) -> Result<Self> {
        if (1..=MAX_CHANNEL).contains(&id) {
            Ok(Self(id))
        } else {
            Err(StagelightError::InvalidChannel(id))
        }
    }

    pub fn id(self) -> u8 {
        self.0
    }

    pub fn kind(self) -> ChannelKind {
        if self.0 <= DIMMER_CHANNELS {
            ChannelKind::Dimmer(usize::from(self.0 - 1))
        } else {
            ChannelKind::Relay(usize::from(self.0 - DIMMER_CHANNELS - 1))
        }
    }
}

impl TryFrom<u8> for Channel {
    type Error = StagelightError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Channel> for u8 {
    fn from(value: Channel) -> Self {
        value.0
    }
}

/// A keyframe: reach `value` over `duration` ms, starting `time` ms into the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub time: u32,
    /// 0-100 for dimmer channels, 0/1 for relay channels.
    pub value: i32,
    /// 0 means step.
    pub duration: u32,
}

impl TimelineEntry {
    pub fn new(time: u32, value: i32, duration: u32) -> Self {
        Self {
            time,
            value,
            duration,
        }
    }

    /// Fixed-width encoding: time, value, duration as little-endian 32-bit words.
    pub fn to_le_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0..4].copy_from_slice(&self.time.to_le_bytes());
        out[4..8].copy_from_slice(&self.value.to_le_bytes());
        out[8..12].copy_from_slice(&self.duration.to_le_bytes());
        out
    }
}

/// Ordered keyframes for one channel with a forward-only cursor.
#[derive(Debug, Clone)]
pub struct Timeline {
    channel: Channel,
    entries: Vec<TimelineEntry>,
    capacity: usize,
    cursor: usize,
}

impl Timeline {
    pub fn new(channel: Channel, capacity: usize) -> Self {
        Self {
            channel,
            entries: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn output_id(&self) -> u8 {
        self.channel.id()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, idx: usize) -> Option<&TimelineEntry> {
        self.entries.get(idx)
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Appends an entry. Nothing is stored when the timeline is full or the
    /// entry would go back in time.
    pub fn add(&mut self, time: u32, value: i32, duration: u32) -> Result<()> {
        if self.entries.len() == self.capacity {
            return Err(StagelightError::CapacityExceeded {
                channel: self.channel.id(),
                capacity: self.capacity,
            });
        }
        if let Some(last) = self.entries.last() {
            if time < last.time {
                return Err(StagelightError::OrderViolation {
                    channel: self.channel.id(),
                    time,
                    last: last.time,
                });
            }
        }

        self.entries.push(TimelineEntry::new(time, value, duration));
        Ok(())
    }

    /// Drops all entries and rewinds the cursor.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.move_first();
    }

    pub fn move_first(&mut self) {
        self.cursor = 0;
    }

    pub fn move_next(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
    }

    /// Entry under the cursor, `None` once finished.
    pub fn current(&self) -> Option<&TimelineEntry> {
        self.entries.get(self.cursor)
    }

    pub fn is_finished(&self) -> bool {
        self.cursor == self.entries.len()
    }
}
