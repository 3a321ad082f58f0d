//! # Connection Builder
//!
//! Infers melodic steps inside each voice and turns them into
//! [`ConnectionEdge`]s from the end of one note to the start of the next.
//!
//! ## Rules
//! - Edges stay inside one [`VoiceKey`] (part, staff, voice).
//! - An edge leaves a note from its final segment and enters the destination's
//!   first segment.
//! - Source and destination must differ in pitch.
//! - Adjacency is judged on the notated end, so a staccato note still leads
//!   into the note written after it.
//! - All notes starting together form one onset group; each group receives at
//!   most one edge. The earliest source wins, and it targets the lowest-id note
//!   of the group with a different pitch.
//! - Without `bridge_rests`, the destination must start where the source's
//!   notated end falls (within [`TIMING_TOLERANCE`]); with it, the next onset
//!   group after the source's end is used.
//! - Gaps beyond `max_gap` produce no edge; alpha fades with the gap.
//!
//! ## Example
//! ```rust
//! use scoreline::connect::build_connections;
//! use scoreline::segment::{segment_notes, SegmentMode};
//! use scoreline::ConnectionStyle;
//! # use scoreline::geometry::{NoteEvent, VoiceKey};
//! # let note = |id, pitch, onset: f64| NoteEvent {
//! #     id, part_id: "P1".into(), voice: VoiceKey { part: 0, staff: 1, voice: 1 },
//! #     pitch, onset, duration: 1.0, notated_duration: 1.0, intensity: 0.5,
//! #     dynamic: None, staccato: false, sources: vec![id],
//! # };
//!
//! let notes = vec![note(0, 60, 0.0), note(1, 62, 1.0), note(2, 64, 3.0)];
//! let segments = segment_notes(&notes, SegmentMode::Split, &[]);
//! let edges = build_connections(&notes, &segments, &ConnectionStyle::default());
//!
//! // the rest before E4 breaks the line
//! assert_eq!(edges.len(), 1);
//! assert_eq!((edges[0].from_note, edges[0].to_note), (0, 1));
//! ```

use crate::config::ConnectionStyle;
use crate::geometry::{ConnectionEdge, NoteEvent, Segment, VoiceKey};
use crate::segment::note_bounds;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Tolerance for matching a note end against an onset.
pub const TIMING_TOLERANCE: f64 = 1e-3;

/// Notes of one voice starting at the same beat, lowest id first.
struct OnsetGroup<'a> {
    onset: f64,
    notes: Vec<&'a NoteEvent>,
}

fn onset_groups<'a>(line: &[&'a NoteEvent]) -> Vec<OnsetGroup<'a>> {
    let mut groups: Vec<OnsetGroup<'a>> = Vec::new();
    for &note in line {
        match groups.last_mut() {
            Some(group) if (note.onset - group.onset).abs() <= TIMING_TOLERANCE => {
                group.notes.push(note)
            }
            _ => groups.push(OnsetGroup {
                onset: note.onset,
                notes: vec![note],
            }),
        }
    }
    for group in &mut groups {
        group.notes.sort_by_key(|n| n.id);
    }
    groups
}

/// Build connection edges for every voice.
pub fn build_connections(
    notes: &[NoteEvent],
    segments: &[Segment],
    style: &ConnectionStyle,
) -> Vec<ConnectionEdge> {
    let bounds = note_bounds(segments);
    let mut voices: BTreeMap<VoiceKey, Vec<&NoteEvent>> = BTreeMap::new();
    for note in notes {
        voices.entry(note.voice).or_default().push(note);
    }

    let mut edges = Vec::new();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut suppressed = 0usize;

    for (_, mut line) in voices {
        line.sort_by(|a, b| a.onset.total_cmp(&b.onset).then(a.id.cmp(&b.id)));
        let groups = onset_groups(&line);

        let mut incoming: Vec<Vec<&NoteEvent>> = vec![Vec::new(); groups.len()];
        for &source in &line {
            let end = source.notated_end();
            let target = groups.partition_point(|g| g.onset < end - TIMING_TOLERANCE);
            let Some(group) = groups.get(target) else {
                continue;
            };
            if !style.bridge_rests && group.onset > end + TIMING_TOLERANCE {
                continue;
            }
            incoming[target].push(source);
        }

        for (group, sources) in groups.iter().zip(incoming) {
            for source in sources {
                let Some(dest) = group
                    .notes
                    .iter()
                    .find(|d| d.pitch != source.pitch && d.id != source.id)
                else {
                    continue;
                };
                let (Some(&(_, from_segment)), Some(&(to_segment, _))) =
                    (bounds.get(&source.id), bounds.get(&dest.id))
                else {
                    continue;
                };

                let gap = (dest.onset - source.end()).max(0.0);
                if style.max_gap.is_some_and(|max| gap > max + TIMING_TOLERANCE) {
                    suppressed += 1;
                    continue;
                }
                if !seen.insert((source.id, dest.id)) {
                    break;
                }

                edges.push(ConnectionEdge {
                    from_segment,
                    to_segment,
                    from_note: source.id,
                    to_note: dest.id,
                    from_beat: source.end(),
                    from_pitch: source.pitch,
                    to_beat: dest.onset,
                    to_pitch: dest.pitch,
                    gap,
                    alpha: style.alpha_for(gap, dest.intensity),
                    curvature: style.curvature,
                    line_width: style.line_width,
                });
                break;
            }
        }
    }

    edges.sort_by(|a, b| a.from_beat.total_cmp(&b.from_beat).then(a.from_note.cmp(&b.from_note)));
    debug!(edges = edges.len(), suppressed, "built connections");
    edges
}
