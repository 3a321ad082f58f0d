//! Tie merging.
//!
//! Chains are tracked per (staff, voice, concert pitch). A tie start opens a
//! chain, continues and stops extend it, and a stop closes it. Output notes
//! carry no tie flags, so merging an already merged list changes nothing.

use crate::score::TieKind;
use std::collections::HashMap;

/// A note placed on the canonical timeline, before or after tie merging.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedNote {
    pub staff: u8,
    pub voice: u8,
    /// Concert pitch.
    pub pitch: u8,
    pub onset: f64,
    pub duration: f64,
    /// Duration of the last written note of a chain.
    pub tail: f64,
    pub tie: Option<TieKind>,
    /// Staccato on the last written note of a chain.
    pub staccato: bool,
    pub velocity: Option<u8>,
    /// Raw event indices that make up this note.
    pub sources: Vec<usize>,
}

impl TimedNote {
    fn absorb(&mut self, other: TimedNote) {
        self.duration += other.duration;
        self.tail = other.tail;
        self.staccato = other.staccato;
        self.velocity = self.velocity.max(other.velocity);
        self.sources.extend(other.sources);
    }
}

/// A tie irregularity found while merging.
#[derive(Debug, Clone, PartialEq)]
pub struct TieIssue {
    pub staff: u8,
    pub voice: u8,
    pub pitch: u8,
    pub onset: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TieMerge {
    pub notes: Vec<TimedNote>,
    /// Stops (or continues) with nothing to attach to.
    pub orphans: Vec<TieIssue>,
    /// Starts that were never closed.
    pub unterminated: Vec<TieIssue>,
}

type ChainKey = (u8, u8, u8);

fn issue(note: &TimedNote) -> TieIssue {
    TieIssue {
        staff: note.staff,
        voice: note.voice,
        pitch: note.pitch,
        onset: note.onset,
    }
}

/// Merge tied notes into single sounding notes.
///
/// The merged note keeps the start's onset and sums the durations of every
/// constituent.
///
/// # Example
/// ```
/// use scoreline::normalize::{merge_ties, TimedNote};
/// use scoreline::score::TieKind;
///
/// let note = |onset, tie| TimedNote {
///     staff: 1, voice: 1, pitch: 60, onset, duration: 1.0, tail: 1.0,
///     tie, staccato: false, velocity: None, sources: vec![onset as usize],
/// };
/// let merged = merge_ties(vec![note(3.0, Some(TieKind::Start)), note(4.0, Some(TieKind::Stop))]);
/// assert_eq!(merged.notes.len(), 1);
/// assert_eq!(merged.notes[0].duration, 2.0);
/// assert_eq!(merged.notes[0].onset, 3.0);
/// ```
pub fn merge_ties(mut notes: Vec<TimedNote>) -> TieMerge {
    notes.sort_by(|a, b| a.onset.total_cmp(&b.onset));

    let mut result = TieMerge {
        notes: Vec::with_capacity(notes.len()),
        ..TieMerge::default()
    };
    let mut open: HashMap<ChainKey, usize> = HashMap::new();

    for mut note in notes {
        let key = (note.staff, note.voice, note.pitch);
        let tie = note.tie.take();

        match tie {
            None => result.notes.push(note),
            Some(TieKind::Start) => {
                if let Some(previous) = open.remove(&key) {
                    result.unterminated.push(issue(&result.notes[previous]));
                }
                result.notes.push(note);
                open.insert(key, result.notes.len() - 1);
            }
            Some(TieKind::Continue) => match open.get(&key) {
                Some(&chain) => result.notes[chain].absorb(note),
                None => {
                    result.orphans.push(issue(&note));
                    result.notes.push(note);
                    open.insert(key, result.notes.len() - 1);
                }
            },
            Some(TieKind::Stop) => match open.remove(&key) {
                Some(chain) => result.notes[chain].absorb(note),
                None => {
                    result.orphans.push(issue(&note));
                    result.notes.push(note);
                }
            },
        }
    }

    let mut dangling: Vec<usize> = open.into_values().collect();
    dangling.sort_unstable();
    result
        .unterminated
        .extend(dangling.into_iter().map(|i| issue(&result.notes[i])));

    result
}
