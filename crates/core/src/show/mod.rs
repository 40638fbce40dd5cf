use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    storyboard::Storyboard,
    timeline::{Channel, TimelineEntry, MAX_CHANNEL},
    Result, StagelightError,
};

/// Stored description of a show, as written by the authoring side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowDescription {
    /// Cycle length in ms; derived from the entries when absent or 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub timelines: Vec<TimelineDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub output_id: u8,
    #[serde(default)]
    pub entries: Vec<TimelineEntry>,
}

/// Something the loader could not store.
#[derive(Debug)]
pub struct Rejection {
    pub output_id: u8,
    /// Position in the description's entry list, `None` for a whole timeline.
    pub entry_index: Option<usize>,
    pub error: StagelightError,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub rejected: Vec<Rejection>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl ShowDescription {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Latest `time + duration` over all entries.
    pub fn derived_duration(&self) -> u32 {
        self.timelines
            .iter()
            .flat_map(|t| t.entries.iter())
            .map(|e| e.time.saturating_add(e.duration))
            .max()
            .unwrap_or(0)
    }

    /// Builds a storyboard, reporting every timeline or entry it had to drop.
    pub fn into_storyboard(self) -> (Storyboard, LoadReport) {
        let duration = match self.duration {
            Some(duration) if duration > 0 => duration,
            _ => self.derived_duration(),
        };
        let mut storyboard = Storyboard::new(usize::from(MAX_CHANNEL), duration);
        let mut report = LoadReport::default();

        for description in self.timelines {
            let output_id = description.output_id;
            let added = match Channel::new(output_id) {
                Ok(channel) => storyboard.add_timeline(channel, description.entries.len()),
                Err(error) => Err(error),
            };
            let timeline = match added {
                Ok(timeline) => timeline,
                Err(error) => {
                    warn!(output_id, name = ?description.name, %error, "timeline rejected");
                    report.rejected.push(Rejection {
                        output_id,
                        entry_index: None,
                        error,
                    });
                    continue;
                }
            };

            for (idx, entry) in description.entries.iter().enumerate() {
                let added = if entry.time > duration {
                    Err(StagelightError::EntryPastCycleEnd {
                        channel: output_id,
                        time: entry.time,
                        duration,
                    })
                } else {
                    timeline.add(entry.time, entry.value, entry.duration)
                };
                if let Err(error) = added {
                    warn!(output_id, entry = idx, %error, "entry rejected");
                    report.rejected.push(Rejection {
                        output_id,
                        entry_index: Some(idx),
                        error,
                    });
                }
            }
        }

        (storyboard, report)
    }

    /// Built-in demo: one dimmer fading through three levels and seven
    /// dimmers blinking in unison.
    pub fn demo() -> Self {
        let mut timelines = vec![TimelineDescription {
            name: Some("timeline1".to_string()),
            output_id: 1,
            entries: vec![
                TimelineEntry::new(0, 100, 500),
                TimelineEntry::new(500, 20, 250),
                TimelineEntry::new(750, 50, 100),
            ],
        }];
        for output_id in 2..=8 {
            timelines.push(TimelineDescription {
                name: Some(format!("timeline{output_id}")),
                output_id,
                entries: vec![
                    TimelineEntry::new(0, 1, 125),
                    TimelineEntry::new(125, 0, 1000),
                    TimelineEntry::new(1125, 1, 250),
                ],
            });
        }

        Self {
            duration: None,
            timelines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_stored_layout() {
        let raw = r#"{
            "timelines": [
                {
                    "name": "spot",
                    "outputId": 1,
                    "outputType": 0,
                    "entries": [
                        { "time": 0, "value": 100, "duration": 500 },
                        { "time": 500, "value": 20, "duration": 250 }
                    ]
                },
                { "outputId": 12, "entries": [ { "time": 40, "value": 1, "duration": 0 } ] }
            ]
        }"#;

        let show = ShowDescription::from_json_str(raw).unwrap();
        let (storyboard, report) = show.into_storyboard();

        assert!(report.is_clean());
        assert_eq!(storyboard.duration(), 750);
        assert_eq!(storyboard.timelines_count(), 2);
        let spot = storyboard.timeline(Channel::new(1).unwrap()).unwrap();
        assert_eq!(spot.entry(1), Some(&TimelineEntry::new(500, 20, 250)));
    }

    #[test]
    fn explicit_duration_wins() {
        let mut show = ShowDescription::demo();
        show.duration = Some(5000);
        let (storyboard, _) = show.into_storyboard();
        assert_eq!(storyboard.duration(), 5000);
    }

    #[test]
    fn reports_dropped_entries_and_timelines() {
        let show = ShowDescription {
            duration: Some(1000),
            timelines: vec![
                TimelineDescription {
                    name: None,
                    output_id: 2,
                    entries: vec![
                        TimelineEntry::new(100, 10, 0),
                        TimelineEntry::new(50, 20, 0),
                        TimelineEntry::new(200, 30, 0),
                    ],
                },
                TimelineDescription {
                    name: None,
                    output_id: 41,
                    entries: vec![TimelineEntry::new(0, 1, 0)],
                },
                TimelineDescription {
                    name: None,
                    output_id: 2,
                    entries: Vec::new(),
                },
            ],
        };

        let (storyboard, report) = show.into_storyboard();
        assert_eq!(storyboard.entries_count(Channel::new(2).unwrap()), 2);
        assert_eq!(report.rejected.len(), 3);
        assert!(matches!(
            report.rejected[0],
            Rejection {
                output_id: 2,
                entry_index: Some(1),
                error: StagelightError::OrderViolation { .. }
            }
        ));
        assert!(matches!(
            report.rejected[1].error,
            StagelightError::InvalidChannel(41)
        ));
        assert!(matches!(
            report.rejected[2].error,
            StagelightError::DuplicateChannel(2)
        ));
    }

    #[test]
    fn rejects_entries_past_the_cycle_end() {
        let show = ShowDescription::from_json_str(
            r#"{
                "duration": 1000,
                "timelines": [
                    { "outputId": 1, "entries": [
                        { "time": 0, "value": 10, "duration": 0 },
                        { "time": 1000, "value": 50, "duration": 0 },
                        { "time": 1500, "value": 90, "duration": 0 }
                    ] }
                ]
            }"#,
        )
        .unwrap();

        let (storyboard, report) = show.into_storyboard();
        assert_eq!(storyboard.entries_count(Channel::new(1).unwrap()), 2);
        assert!(!report.is_clean());
        assert!(matches!(
            report.rejected.as_slice(),
            [Rejection {
                output_id: 1,
                entry_index: Some(2),
                error: StagelightError::EntryPastCycleEnd {
                    time: 1500,
                    duration: 1000,
                    ..
                },
            }]
        ));
    }

    #[test]
    fn channel_order_does_not_depend_on_file_order() {
        let load = |first: u8, second: u8| {
            let json = format!(
                r#"{{ "duration": 100, "timelines": [
                    {{ "outputId": {first}, "entries": [{{ "time": 10, "value": {first}, "duration": 0 }}] }},
                    {{ "outputId": {second}, "entries": [{{ "time": 10, "value": {second}, "duration": 0 }}] }}
                ] }}"#
            );
            let (storyboard, report) = ShowDescription::from_json_str(&json)
                .unwrap()
                .into_storyboard();
            assert!(report.is_clean());
            storyboard
        };

        let mut shuffled = load(9, 2);
        let sorted = load(2, 9);
        assert_eq!(shuffled.calc_crc32(0), sorted.calc_crc32(0));
        let (winner, _) = shuffled.next_timeline_and_entry(0).unwrap();
        assert_eq!(winner.id(), 2);
    }

    #[test]
    fn demo_survives_a_json_round_trip() {
        let json = ShowDescription::demo().to_json_pretty().unwrap();
        let (storyboard, report) = ShowDescription::from_json_str(&json)
            .unwrap()
            .into_storyboard();

        assert!(report.is_clean());
        assert_eq!(storyboard.timelines_count(), 8);
        assert_eq!(storyboard.duration(), 1375);
    }
}
