//! # Timeline Slicer
//!
//! Restricts finished geometry to a bar or beat range and rebases it so the
//! window starts at beat 0.
//!
//! Ranges are 1-indexed and end-exclusive in the active [`TimelineUnit`]:
//! bars `2-4` keeps bars 2 and 3. The window is resolved against the canonical
//! [`MeasureMap`] before any geometry is computed, so a bad range fails fast.
//!
//! Segments crossing a window edge are clipped. Connections survive only when
//! both of their segments and both endpoints lie inside the window. Ids are
//! never renumbered.

use crate::config::TimelineUnit;
use crate::error::{Result, TimelineError};
use crate::geometry::{
    BeatWindow, ConnectionEdge, NoteEvent, RehearsalMark, Segment, TickSpec, BEAT_EPSILON,
};
use crate::measure_map::MeasureMap;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// More minor ticks than this are not emitted.
pub const MAX_MINOR_TICKS: usize = 4096;

/// 1-indexed, end-exclusive range in bars or beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRange {
    pub start: u32,
    pub end: u32,
}

impl FromStr for SliceRange {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            TimelineError::InvalidConfig(format!(
                "invalid slice range '{}': expected START-END, e.g. 2-4",
                s
            ))
        };
        let (start, end) = s.trim().split_once('-').ok_or_else(invalid)?;
        Ok(SliceRange {
            start: start.trim().parse().map_err(|_| invalid())?,
            end: end.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for SliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Number of whole units in the score.
pub fn extent(map: &MeasureMap, unit: TimelineUnit) -> u32 {
    match unit {
        TimelineUnit::Bar => map.len() as u32,
        TimelineUnit::Beat => (map.total_beats() - BEAT_EPSILON).max(0.0).ceil() as u32,
    }
}

/// Absolute beat window for `range`, or the whole score when `None`.
pub fn resolve_window(
    map: &MeasureMap,
    unit: TimelineUnit,
    range: Option<SliceRange>,
) -> Result<BeatWindow> {
    let Some(range) = range else {
        return Ok(BeatWindow {
            start: 0.0,
            end: map.total_beats(),
        });
    };

    let extent = extent(map, unit);
    let invalid = || TimelineError::InvalidSliceRange {
        start: range.start,
        end: range.end,
        extent,
        unit,
    };
    if range.start < 1 || range.start >= range.end || range.end > extent + 1 {
        return Err(invalid());
    }

    match unit {
        TimelineUnit::Bar => {
            let start = map.bar_start(range.start as usize).ok_or_else(invalid)?;
            let end = map.bar_start(range.end as usize).ok_or_else(invalid)?;
            Ok(BeatWindow { start, end })
        }
        TimelineUnit::Beat => Ok(BeatWindow {
            start: f64::from(range.start - 1),
            end: f64::from(range.end - 1),
        }),
    }
}

/// Clip segments to the window and rebase them; slivers are dropped.
pub fn slice_segments(segments: Vec<Segment>, window: &BeatWindow) -> Vec<Segment> {
    segments
        .into_iter()
        .filter_map(|mut segment| {
            let start = segment.start.max(window.start);
            let end = segment.end.min(window.end);
            if end - start <= BEAT_EPSILON {
                return None;
            }
            segment.start = start - window.start;
            segment.end = end - window.start;
            Some(segment)
        })
        .collect()
}

/// Keep edges whose segments survived and whose endpoints are in the window.
pub fn slice_connections(
    edges: Vec<ConnectionEdge>,
    segments: &[Segment],
    window: &BeatWindow,
) -> Vec<ConnectionEdge> {
    let surviving: HashSet<usize> = segments.iter().map(|s| s.id).collect();
    let inside = |beat: f64| beat >= window.start - BEAT_EPSILON && beat <= window.end + BEAT_EPSILON;

    edges
        .into_iter()
        .filter(|e| surviving.contains(&e.from_segment) && surviving.contains(&e.to_segment))
        .filter(|e| inside(e.from_beat) && inside(e.to_beat))
        .map(|mut e| {
            e.from_beat = (e.from_beat - window.start).max(0.0);
            e.to_beat = (e.to_beat - window.start).max(0.0);
            e
        })
        .collect()
}

/// Notes sounding inside the window, clipped and rebased.
pub fn slice_notes(notes: Vec<NoteEvent>, window: &BeatWindow) -> Vec<NoteEvent> {
    notes
        .into_iter()
        .filter_map(|mut note| {
            let onset = note.onset.max(window.start);
            let end = note.end().min(window.end);
            if end - onset <= BEAT_EPSILON {
                return None;
            }
            let notated_end = note.notated_end().min(window.end);
            note.onset = onset - window.start;
            note.duration = end - onset;
            note.notated_duration = (notated_end - onset).max(note.duration);
            Some(note)
        })
        .collect()
}

pub fn slice_marks(marks: Vec<RehearsalMark>, window: &BeatWindow) -> Vec<RehearsalMark> {
    marks
        .into_iter()
        .filter(|m| m.beat >= window.start - BEAT_EPSILON && m.beat < window.end - BEAT_EPSILON)
        .map(|mut m| {
            m.beat = (m.beat - window.start).max(0.0);
            m
        })
        .collect()
}

/// Time-axis ticks for the window, relative to its start.
///
/// Bar unit: a major tick at each bar start inside the window, labelled with
/// the 1-indexed bar number. Beat unit: a major tick every beat, labelled with
/// the 1-indexed absolute beat, and minor ticks every `min_duration` beats.
pub fn tick_spec(
    map: &MeasureMap,
    unit: TimelineUnit,
    window: &BeatWindow,
    min_duration: f64,
) -> TickSpec {
    let mut ticks = TickSpec::default();
    match unit {
        TimelineUnit::Bar => {
            for (position, span) in map.spans().iter().enumerate() {
                if span.start >= window.start - BEAT_EPSILON && span.start < window.end - BEAT_EPSILON {
                    ticks.major.push((span.start - window.start).max(0.0));
                    ticks.labels.push((position + 1).to_string());
                }
            }
        }
        TimelineUnit::Beat => {
            let length = window.len();
            let mut beat = 0usize;
            while (beat as f64) < length - BEAT_EPSILON {
                ticks.major.push(beat as f64);
                ticks.labels.push(format!("{}", (window.start.round() as usize) + beat + 1));
                beat += 1;
            }

            if min_duration > BEAT_EPSILON && min_duration < 1.0 - BEAT_EPSILON {
                let count = (length / min_duration).ceil() as usize;
                if count <= MAX_MINOR_TICKS {
                    ticks.minor = (0..count)
                        .map(|i| i as f64 * min_duration)
                        .filter(|t| *t < length - BEAT_EPSILON)
                        .filter(|t| (t - t.round()).abs() > BEAT_EPSILON)
                        .collect();
                }
            }
        }
    }
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::VoiceKey;
    use crate::score::{MeasureDecl, Part};
    use pretty_assertions::assert_eq;

    fn map_of(durations: &[f64]) -> MeasureMap {
        let part = Part {
            id: "P1".to_string(),
            measures: durations
                .iter()
                .enumerate()
                .map(|(index, d)| MeasureDecl {
                    index,
                    duration: Some(*d),
                    ..MeasureDecl::default()
                })
                .collect(),
            ..Part::default()
        };
        MeasureMap::build(&[part], 4.0).0
    }

    fn segment(id: usize, start: f64, end: f64) -> Segment {
        Segment {
            id,
            note: id,
            notes: vec![id],
            voice: VoiceKey {
                part: 0,
                staff: 1,
                voice: 1,
            },
            pitch: 60,
            start,
            end,
            thickness: 1,
            opacity: 0.5,
            color: "#757575".to_string(),
        }
    }

    #[test]
    fn test_parse_range() {
        assert_eq!("2-4".parse::<SliceRange>(), Ok(SliceRange { start: 2, end: 4 }));
        assert_eq!(" 10 - 12 ".parse::<SliceRange>(), Ok(SliceRange { start: 10, end: 12 }));
        assert!(matches!("4".parse::<SliceRange>(), Err(TimelineError::InvalidConfig(_))));
        assert!(matches!("a-b".parse::<SliceRange>(), Err(TimelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_bar_window() {
        let map = map_of(&[4.0, 4.0, 4.0, 4.0]);
        let window = resolve_window(&map, TimelineUnit::Bar, Some(SliceRange { start: 2, end: 4 })).unwrap();
        assert_eq!(window, BeatWindow { start: 4.0, end: 12.0 });

        // end may name the bar after the last one
        let window = resolve_window(&map, TimelineUnit::Bar, Some(SliceRange { start: 3, end: 5 })).unwrap();
        assert_eq!(window, BeatWindow { start: 8.0, end: 16.0 });
    }

    #[test]
    fn test_whole_score_window() {
        let map = map_of(&[3.0, 3.0]);
        assert_eq!(
            resolve_window(&map, TimelineUnit::Bar, None).unwrap(),
            BeatWindow { start: 0.0, end: 6.0 }
        );
    }

    #[test]
    fn test_beat_window() {
        let map = map_of(&[4.0, 4.0]);
        let window = resolve_window(&map, TimelineUnit::Beat, Some(SliceRange { start: 3, end: 7 })).unwrap();
        assert_eq!(window, BeatWindow { start: 2.0, end: 6.0 });
    }

    #[test]
    fn test_invalid_ranges() {
        let map = map_of(&[4.0, 4.0, 4.0, 4.0]);
        for (start, end) in [(3, 3), (4, 2), (0, 2), (2, 6)] {
            let err = resolve_window(&map, TimelineUnit::Bar, Some(SliceRange { start, end })).unwrap_err();
            assert_eq!(
                err,
                TimelineError::InvalidSliceRange {
                    start,
                    end,
                    extent: 4,
                    unit: TimelineUnit::Bar
                }
            );
        }
        assert!(resolve_window(&map, TimelineUnit::Beat, Some(SliceRange { start: 1, end: 17 })).is_ok());
        assert!(resolve_window(&map, TimelineUnit::Beat, Some(SliceRange { start: 1, end: 18 })).is_err());
    }

    #[test]
    fn test_bar_ticks_inside_window() {
        let map = map_of(&[1.0, 1.0, 1.0, 1.0]);
        let window = resolve_window(&map, TimelineUnit::Bar, Some(SliceRange { start: 2, end: 4 })).unwrap();
        let ticks = tick_spec(&map, TimelineUnit::Bar, &window, 0.5);
        assert_eq!(ticks.labelled(), vec![("2", 0.0), ("3", 1.0)]);
        assert!(ticks.minor.is_empty());
    }

    #[test]
    fn test_beat_ticks_with_minor() {
        let map = map_of(&[4.0]);
        let window = BeatWindow { start: 1.0, end: 3.0 };
        let ticks = tick_spec(&map, TimelineUnit::Beat, &window, 0.5);
        assert_eq!(ticks.labelled(), vec![("2", 0.0), ("3", 1.0)]);
        assert_eq!(ticks.minor, vec![0.5, 1.5]);
    }

    #[test]
    fn test_segments_clipped_and_rebased() {
        let window = BeatWindow { start: 4.0, end: 8.0 };
        let sliced = slice_segments(
            vec![segment(0, 0.0, 4.0), segment(1, 3.0, 5.0), segment(2, 7.5, 9.0), segment(3, 8.0, 9.0)],
            &window,
        );
        let spans: Vec<(usize, f64, f64)> = sliced.iter().map(|s| (s.id, s.start, s.end)).collect();
        assert_eq!(spans, vec![(1, 0.0, 1.0), (2, 3.5, 4.0)]);
    }

    #[test]
    fn test_connections_need_both_ends() {
        let window = BeatWindow { start: 4.0, end: 8.0 };
        let segments = slice_segments(vec![segment(0, 3.0, 5.0), segment(1, 5.0, 6.0), segment(2, 9.0, 10.0)], &window);
        let edge = |from_segment, to_segment, from_beat, to_beat| ConnectionEdge {
            from_segment,
            to_segment,
            from_note: from_segment,
            to_note: to_segment,
            from_beat,
            from_pitch: 60,
            to_beat,
            to_pitch: 62,
            gap: 0.0,
            alpha: 0.6,
            curvature: 0.0,
            line_width: 1.0,
        };
        let kept = slice_connections(vec![edge(0, 1, 5.0, 5.0), edge(1, 2, 6.0, 9.0)], &segments, &window);
        assert_eq!(kept.len(), 1);
        assert_eq!((kept[0].from_beat, kept[0].to_beat), (1.0, 1.0));
    }

    #[test]
    fn test_marks_rebased() {
        let window = BeatWindow { start: 4.0, end: 8.0 };
        let marks = vec![
            RehearsalMark { label: "A".into(), beat: 0.0 },
            RehearsalMark { label: "B".into(), beat: 4.0 },
            RehearsalMark { label: "C".into(), beat: 8.0 },
        ];
        assert_eq!(
            slice_marks(marks, &window),
            vec![RehearsalMark { label: "B".into(), beat: 0.0 }]
        );
    }
}
