//! Fixed set of timelines sharing one cycle duration.

use crate::{
    timeline::{Channel, Timeline, TimelineEntry},
    Result, StagelightError,
};

#[derive(Debug, Clone, Default)]
pub struct Storyboard {
    timelines: Vec<Timeline>,
    capacity: usize,
    duration: u32,
}

impl Storyboard {
    pub fn new(timelines_capacity: usize, duration_ms: u32) -> Self {
        Self {
            timelines: Vec::with_capacity(timelines_capacity),
            capacity: timelines_capacity,
            duration: duration_ms,
        }
    }

    /// Total cycle length in milliseconds.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn timelines_count(&self) -> usize {
        self.timelines.len()
    }

    pub fn timelines(&self) -> &[Timeline] {
        &self.timelines
    }

    pub fn timeline_by_idx(&self, idx: usize) -> Option<&Timeline> {
        self.timelines.get(idx)
    }

    pub fn timeline(&self, channel: Channel) -> Option<&Timeline> {
        let idx = self.position(channel).ok()?;
        self.timelines.get(idx)
    }

    pub fn timeline_mut(&mut self, channel: Channel) -> Option<&mut Timeline> {
        let idx = self.position(channel).ok()?;
        self.timelines.get_mut(idx)
    }

    pub fn entries_count(&self, channel: Channel) -> usize {
        self.timeline(channel).map_or(0, Timeline::entries_count)
    }

    /// Registers an empty timeline for `channel` and returns it for filling.
    ///
    /// Timelines are kept sorted by channel whatever the registration order.
    pub fn add_timeline(&mut self, channel: Channel, entries_capacity: usize) -> Result<&mut Timeline> {
        if self.timelines.len() == self.capacity {
            return Err(StagelightError::CapacityExceeded {
                channel: channel.id(),
                capacity: self.capacity,
            });
        }
        let idx = match self.position(channel) {
            Ok(_) => return Err(StagelightError::DuplicateChannel(channel.id())),
            Err(idx) => idx,
        };

        self.timelines
            .insert(idx, Timeline::new(channel, entries_capacity));
        Ok(&mut self.timelines[idx])
    }

    fn position(&self, channel: Channel) -> std::result::Result<usize, usize> {
        self.timelines
            .binary_search_by_key(&channel, Timeline::channel)
    }

    /// `true` once `time` lies past the end of the cycle.
    pub fn is_finished(&self, time: u32) -> bool {
        time > self.duration
    }

    /// Rewinds every timeline cursor to its first entry.
    pub fn reset(&mut self) {
        for timeline in &mut self.timelines {
            timeline.move_first();
        }
    }

    /// Pops the earliest pending entry across all timelines.
    ///
    /// Ties go to the lowest channel. Returns `None` once every
    /// timeline is exhausted, or when `time` is already past the cycle end.
    pub fn next_timeline_and_entry(&mut self, time: u32) -> Option<(Channel, TimelineEntry)> {
        if self.is_finished(time) {
            return None;
        }

        let mut best: Option<(usize, u32)> = None;
        for (idx, timeline) in self.timelines.iter().enumerate() {
            let Some(current) = timeline.current() else {
                continue;
            };
            match best {
                Some((_, best_time)) if current.time >= best_time => {}
                _ => best = Some((idx, current.time)),
            }
        }

        let (idx, _) = best?;
        let timeline = &mut self.timelines[idx];
        let entry = *timeline.current()?;
        timeline.move_next();
        Some((timeline.channel(), entry))
    }

    /// CRC-32 (IEEE) of the loaded content, chained from `seed`.
    ///
    /// Timelines are visited in channel order and each entry contributes its
    /// 12-byte little-endian encoding (time, value, duration). Channel ids and
    /// the cycle duration are not part of the checksum.
    pub fn calc_crc32(&self, seed: u32) -> u32 {
        let mut hasher = crc32fast::Hasher::new_with_initial(seed);
        for timeline in &self.timelines {
            for entry in timeline.entries() {
                hasher.update(&entry.to_le_bytes());
            }
        }
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u8) -> Channel {
        Channel::new(id).unwrap()
    }

    fn two_channel_board() -> Storyboard {
        let mut board = Storyboard::new(2, 1000);
        let a = board.add_timeline(channel(1), 3).unwrap();
        a.add(0, 10, 0).unwrap();
        a.add(100, 20, 0).unwrap();
        a.add(200, 30, 0).unwrap();
        let b = board.add_timeline(channel(2), 2).unwrap();
        b.add(50, 1, 0).unwrap();
        b.add(150, 0, 0).unwrap();
        board
    }

    fn drain(board: &mut Storyboard) -> Vec<(u8, u32)> {
        let mut out = Vec::new();
        while let Some((channel, entry)) = board.next_timeline_and_entry(0) {
            out.push((channel.id(), entry.time));
        }
        out
    }

    #[test]
    fn merges_channels_in_time_order() {
        let mut board = two_channel_board();
        assert_eq!(
            drain(&mut board),
            vec![(1, 0), (2, 50), (1, 100), (2, 150), (1, 200)]
        );
        assert!(board.next_timeline_and_entry(0).is_none());
    }

    #[test]
    fn ties_go_to_the_lowest_channel() {
        let mut board = Storyboard::new(3, 100);
        board.add_timeline(channel(9), 1).unwrap().add(10, 1, 0).unwrap();
        board.add_timeline(channel(2), 1).unwrap().add(10, 50, 0).unwrap();
        board.add_timeline(channel(5), 1).unwrap().add(5, 50, 0).unwrap();

        assert_eq!(drain(&mut board), vec![(5, 5), (2, 10), (9, 10)]);
        let ids: Vec<u8> = board.timelines().iter().map(Timeline::output_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn reset_replays_the_same_sequence() {
        let mut board = two_channel_board();
        let first = drain(&mut board);
        board.reset();
        assert_eq!(drain(&mut board), first);
    }

    #[test]
    fn merge_output_is_non_decreasing() {
        let mut board = Storyboard::new(4, 10_000);
        for (id, step) in [(1u8, 70u32), (3, 30), (12, 110), (40, 45)] {
            let line = board.add_timeline(channel(id), 20).unwrap();
            for i in 0..20 {
                line.add(i * step, 1, 0).unwrap();
            }
        }

        let times: Vec<u32> = drain(&mut board).into_iter().map(|(_, t)| t).collect();
        assert_eq!(times.len(), 80);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn nothing_is_returned_past_the_cycle_end() {
        let mut board = two_channel_board();
        assert!(board.next_timeline_and_entry(1001).is_none());
        assert!(board.next_timeline_and_entry(1000).is_some());
    }

    #[test]
    fn empty_storyboard_yields_nothing() {
        let mut board = Storyboard::new(2, 100);
        board.add_timeline(channel(1), 0).unwrap();
        assert!(board.next_timeline_and_entry(0).is_none());
    }

    #[test]
    fn rejects_extra_and_duplicate_timelines() {
        let mut board = Storyboard::new(1, 100);
        board.add_timeline(channel(1), 1).unwrap();
        assert!(matches!(
            board.add_timeline(channel(2), 1),
            Err(StagelightError::CapacityExceeded { capacity: 1, .. })
        ));

        let mut board = Storyboard::new(2, 100);
        board.add_timeline(channel(1), 1).unwrap();
        assert!(matches!(
            board.add_timeline(channel(1), 1),
            Err(StagelightError::DuplicateChannel(1))
        ));
    }

    #[test]
    fn lookups_by_channel_and_index() {
        let board = two_channel_board();
        assert_eq!(board.timelines_count(), 2);
        assert_eq!(board.entries_count(channel(1)), 3);
        assert_eq!(board.entries_count(channel(7)), 0);
        assert_eq!(board.timeline_by_idx(1).map(Timeline::output_id), Some(2));
        assert!(board.timeline_by_idx(2).is_none());
    }

    #[test]
    fn crc_covers_entries_and_seed() {
        let board = two_channel_board();
        let mut bytes = Vec::new();
        for line in board.timelines() {
            for entry in line.entries() {
                bytes.extend_from_slice(&entry.to_le_bytes());
            }
        }

        let mut expected = crc32fast::Hasher::new();
        expected.update(&bytes);
        assert_eq!(board.calc_crc32(0), expected.finalize());
        assert_ne!(board.calc_crc32(0), board.calc_crc32(1));

        let mut reversed = Storyboard::new(2, 1000);
        for id in [2, 1] {
            let line = reversed.add_timeline(channel(id), 3).unwrap();
            for entry in board.timeline(channel(id)).unwrap().entries() {
                line.add(entry.time, entry.value, entry.duration).unwrap();
            }
        }
        assert_eq!(reversed.calc_crc32(0), board.calc_crc32(0));

        let mut changed = two_channel_board();
        changed.timeline_mut(channel(2)).unwrap().clear();
        assert_ne!(changed.calc_crc32(0), board.calc_crc32(0));
    }
}
