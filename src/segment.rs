//! # Overlap Segmenter
//!
//! Splits notes into drawable [`Segment`]s per pitch lane.
//!
//! ## Purpose
//! Two notes of the same pitch in the same voice can sound at once (a held note
//! re-struck, or divisi written in one voice). Drawing each note as one bar with
//! a note-wide thickness exaggerates the overlap; splitting at every change in
//! the number of sounding notes draws extra thickness only where the overlap
//! really is.
//!
//! ## Algorithm
//! A lane is (part, staff, voice, concert pitch). For each lane, every note
//! onset and end is a change point. Each interval between consecutive change
//! points with at least one sounding note becomes one segment whose thickness
//! is the number of notes sounding in it.
//!
//! Every note's segments are disjoint and exactly cover `[onset, end)`.
//!
//! ## Legacy mode
//! With splitting off, each note is one segment. Its thickness is the largest
//! number of same-lane notes sounding at any point of its span.
//!
//! ## Example
//! ```rust
//! use scoreline::segment::{segment_notes, SegmentMode};
//! # use scoreline::geometry::{NoteEvent, VoiceKey};
//! # let note = |id, onset: f64, duration: f64| NoteEvent {
//! #     id, part_id: "P1".into(), voice: VoiceKey { part: 0, staff: 1, voice: 1 },
//! #     pitch: 67, onset, duration, notated_duration: duration, intensity: 0.5,
//! #     dynamic: None, staccato: false, sources: vec![id],
//! # };
//!
//! let notes = vec![note(0, 0.0, 2.0), note(1, 1.0, 2.0)];
//! let segments = segment_notes(&notes, SegmentMode::Split, &[]);
//!
//! let spans: Vec<(f64, f64, u32)> = segments.iter().map(|s| (s.start, s.end, s.thickness)).collect();
//! assert_eq!(spans, vec![(0.0, 1.0, 1), (1.0, 2.0, 2), (2.0, 3.0, 1)]);
//! ```

use crate::geometry::{opacity_for, NoteEvent, PartStyle, Segment, VoiceKey, BEAT_EPSILON};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Fallback color for parts without a style.
pub const UNSTYLED_COLOR: &str = "#757575";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentMode {
    /// Split at every overlap change.
    #[default]
    Split,
    /// One segment per note.
    Legacy,
}

impl SegmentMode {
    pub fn from_split_overlaps(split: bool) -> Self {
        if split {
            SegmentMode::Split
        } else {
            SegmentMode::Legacy
        }
    }
}

type LaneKey = (VoiceKey, u8);

/// Segment every note, lane by lane.
///
/// Segment ids are assigned in lane order, then time order. Colors come from
/// `styles` by part index.
pub fn segment_notes(notes: &[NoteEvent], mode: SegmentMode, styles: &[PartStyle]) -> Vec<Segment> {
    let mut lanes: BTreeMap<LaneKey, Vec<&NoteEvent>> = BTreeMap::new();
    for note in notes {
        lanes.entry((note.voice, note.pitch)).or_default().push(note);
    }

    let colors: HashMap<usize, &str> = styles.iter().map(|s| (s.part, s.color.as_str())).collect();
    let mut segments = Vec::with_capacity(notes.len());

    for ((voice, pitch), mut lane) in lanes {
        lane.sort_by(|a, b| a.onset.total_cmp(&b.onset).then(a.id.cmp(&b.id)));
        let color = colors.get(&voice.part).copied().unwrap_or(UNSTYLED_COLOR);

        let pieces = match mode {
            SegmentMode::Split => split_lane(&lane),
            SegmentMode::Legacy => legacy_lane(&lane),
        };
        for piece in pieces {
            segments.push(Segment {
                id: segments.len(),
                note: piece.notes[0],
                thickness: piece.thickness,
                opacity: opacity_for(piece.intensity),
                notes: piece.notes,
                voice,
                pitch,
                start: piece.start,
                end: piece.end,
                color: color.to_string(),
            });
        }
    }

    debug!(notes = notes.len(), segments = segments.len(), ?mode, "segmented notes");
    segments
}

struct Piece {
    start: f64,
    end: f64,
    notes: Vec<usize>,
    thickness: u32,
    intensity: f64,
}

/// Sorted, de-duplicated onsets and ends of a lane.
fn change_points(lane: &[&NoteEvent]) -> Vec<f64> {
    let mut points: Vec<f64> = lane.iter().flat_map(|n| [n.onset, n.end()]).collect();
    points.sort_by(f64::total_cmp);
    points.dedup_by(|later, earlier| (*later - *earlier).abs() <= BEAT_EPSILON);
    points
}

fn sounding<'a>(lane: &[&'a NoteEvent], start: f64, end: f64) -> Vec<&'a NoteEvent> {
    lane.iter()
        .copied()
        .filter(|n| n.onset <= start + BEAT_EPSILON && n.end() >= end - BEAT_EPSILON)
        .collect()
}

fn split_lane(lane: &[&NoteEvent]) -> Vec<Piece> {
    change_points(lane)
        .windows(2)
        .filter_map(|w| {
            let (start, end) = (w[0], w[1]);
            let active = sounding(lane, start, end);
            if active.is_empty() {
                return None;
            }
            Some(Piece {
                start,
                end,
                thickness: active.len() as u32,
                intensity: active.iter().map(|n| n.intensity).fold(0.0, f64::max),
                notes: active.iter().map(|n| n.id).collect(),
            })
        })
        .collect()
}

fn legacy_lane(lane: &[&NoteEvent]) -> Vec<Piece> {
    let points = change_points(lane);
    lane.iter()
        .map(|note| {
            let thickness = points
                .windows(2)
                .filter(|w| w[0] >= note.onset - BEAT_EPSILON && w[1] <= note.end() + BEAT_EPSILON)
                .map(|w| sounding(lane, w[0], w[1]).len() as u32)
                .max()
                .unwrap_or(1)
                .max(1);
            Piece {
                start: note.onset,
                end: note.end(),
                notes: vec![note.id],
                thickness,
                intensity: note.intensity,
            }
        })
        .collect()
}

/// First and final segment id of every note.
///
/// The final segment is the one ending where the note ends; connections may
/// only leave a note from there.
pub fn note_bounds(segments: &[Segment]) -> HashMap<usize, (usize, usize)> {
    let mut bounds: HashMap<usize, (usize, f64, usize, f64)> = HashMap::new();
    for segment in segments {
        for &note in &segment.notes {
            let entry = bounds
                .entry(note)
                .or_insert((segment.id, segment.start, segment.id, segment.end));
            if segment.start < entry.1 {
                entry.0 = segment.id;
                entry.1 = segment.start;
            }
            if segment.end > entry.3 {
                entry.2 = segment.id;
                entry.3 = segment.end;
            }
        }
    }
    bounds
        .into_iter()
        .map(|(note, (first, _, last, _))| (note, (first, last)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn note(id: usize, pitch: u8, onset: f64, duration: f64) -> NoteEvent {
        NoteEvent {
            id,
            part_id: "P1".to_string(),
            voice: VoiceKey {
                part: 0,
                staff: 1,
                voice: 1,
            },
            pitch,
            onset,
            duration,
            notated_duration: duration,
            intensity: 0.5,
            dynamic: None,
            staccato: false,
            sources: vec![id],
        }
    }

    fn spans(segments: &[Segment]) -> Vec<(f64, f64, u32)> {
        segments.iter().map(|s| (s.start, s.end, s.thickness)).collect()
    }

    /// Every note's segments are disjoint and cover exactly its span.
    fn assert_partition(notes: &[NoteEvent], segments: &[Segment]) {
        for n in notes {
            let mut mine: Vec<&Segment> = segments.iter().filter(|s| s.covers(n.id)).collect();
            mine.sort_by(|a, b| a.start.total_cmp(&b.start));
            assert!(!mine.is_empty(), "note {} has no segments", n.id);
            assert!((mine[0].start - n.onset).abs() < BEAT_EPSILON);
            assert!((mine[mine.len() - 1].end - n.end()).abs() < BEAT_EPSILON);
            for pair in mine.windows(2) {
                assert!((pair[0].end - pair[1].start).abs() < BEAT_EPSILON, "gap or overlap in note {}", n.id);
            }
        }
    }

    #[test]
    fn test_overlapping_same_pitch_splits_in_three() {
        let notes = vec![note(0, 67, 0.0, 2.0), note(1, 67, 1.0, 2.0)];
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);

        assert_eq!(spans(&segments), vec![(0.0, 1.0, 1), (1.0, 2.0, 2), (2.0, 3.0, 1)]);
        assert_eq!(segments[1].notes, vec![0, 1]);
        assert_eq!(segments[1].note, 0);
        assert_eq!(segments[2].note, 1);
        assert_partition(&notes, &segments);
    }

    #[test]
    fn test_adjacent_same_pitch_notes_stay_thin() {
        let notes = vec![note(0, 60, 0.0, 1.0), note(1, 60, 1.0, 1.0)];
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);
        assert_eq!(spans(&segments), vec![(0.0, 1.0, 1), (1.0, 2.0, 1)]);
    }

    #[test]
    fn test_nested_note() {
        let notes = vec![note(0, 60, 0.0, 4.0), note(1, 60, 1.0, 1.0)];
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);
        assert_eq!(spans(&segments), vec![(0.0, 1.0, 1), (1.0, 2.0, 2), (2.0, 4.0, 1)]);
        assert_partition(&notes, &segments);
    }

    #[test]
    fn test_gap_produces_no_segment() {
        let notes = vec![note(0, 60, 0.0, 1.0), note(1, 60, 2.0, 1.0)];
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);
        assert_eq!(spans(&segments), vec![(0.0, 1.0, 1), (2.0, 3.0, 1)]);
    }

    #[test]
    fn test_different_pitches_never_share_lane() {
        let notes = vec![note(0, 60, 0.0, 2.0), note(1, 64, 0.0, 2.0)];
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.thickness == 1));
    }

    #[test]
    fn test_different_voices_never_share_lane() {
        let mut other = note(1, 60, 0.0, 2.0);
        other.voice.voice = 2;
        let notes = vec![note(0, 60, 0.0, 2.0), other];
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.thickness == 1));
    }

    #[test]
    fn test_legacy_mode_one_segment_per_note() {
        let notes = vec![
            note(0, 60, 0.0, 1.0),
            note(1, 60, 0.5, 1.0),
            note(2, 60, 0.75, 0.5),
            note(3, 60, 3.0, 1.0),
        ];
        let segments = segment_notes(&notes, SegmentMode::Legacy, &[]);
        let by_note: Vec<(usize, u32)> = segments.iter().map(|s| (s.note, s.thickness)).collect();
        assert_eq!(by_note, vec![(0, 3), (1, 3), (2, 3), (3, 1)]);
        assert_partition(&notes, &segments);
    }

    #[test]
    fn test_opacity_from_loudest_contributor() {
        let mut loud = note(1, 60, 1.0, 2.0);
        loud.intensity = 1.0;
        let notes = vec![note(0, 60, 0.0, 2.0), loud];
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);
        assert!(segments[1].opacity > segments[0].opacity);
        assert_eq!(segments[1].opacity, segments[2].opacity);
    }

    #[test]
    fn test_color_from_part_style() {
        let styles = vec![PartStyle {
            part: 0,
            part_id: "P1".to_string(),
            label: "Violin".to_string(),
            group: "Strings".to_string(),
            color: "#2E7D32".to_string(),
        }];
        let segments = segment_notes(&[note(0, 60, 0.0, 1.0)], SegmentMode::Split, &styles);
        assert_eq!(segments[0].color, "#2E7D32");
        let plain = segment_notes(&[note(0, 60, 0.0, 1.0)], SegmentMode::Split, &[]);
        assert_eq!(plain[0].color, UNSTYLED_COLOR);
    }

    #[test]
    fn test_note_bounds_first_and_final() {
        let notes = vec![note(0, 67, 0.0, 2.0), note(1, 67, 1.0, 2.0)];
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);
        let bounds = note_bounds(&segments);
        assert_eq!(bounds[&0], (0, 1));
        assert_eq!(bounds[&1], (1, 2));
    }

    #[test]
    fn test_partition_with_many_overlaps() {
        let notes: Vec<NoteEvent> = (0..6)
            .map(|i| note(i, 62, i as f64 * 0.75, 1.0 + (i % 3) as f64 * 0.5))
            .collect();
        let segments = segment_notes(&notes, SegmentMode::Split, &[]);
        assert_partition(&notes, &segments);
        for s in &segments {
            assert_eq!(s.thickness as usize, s.notes.len());
            assert!(s.end > s.start);
        }
    }
}
