//! # Measure Map
//!
//! One canonical bar-to-beat mapping shared by every part.
//!
//! ## Purpose
//! Parts are notated independently and routinely disagree about bar lengths:
//! percussion is often exported without a time signature, and stale metadata
//! can inflate a single part's measure. Mapping each part through its own
//! durations lets parts drift apart; mapping all of them through one shared
//! map keeps them vertically aligned.
//!
//! ## Algorithm
//! For each measure index in the union of all parts:
//! 1. Collect the positive durations parts declare for it.
//! 2. The canonical duration is the most common declared value. Ties go to the
//!    shortest candidate, since inflated values are the usual corruption.
//! 3. If no part declares one, use the prevailing time signature, or
//!    `default_beats_per_measure` when no signature has been seen.
//! 4. Start beats accumulate from 0.
//!
//! The map must be built from all parts before any part's notes are placed.
//!
//! ## Example
//! ```rust
//! use scoreline::measure_map::MeasureMap;
//! use scoreline::score::{MeasureDecl, Part};
//!
//! let decl = |index, duration| MeasureDecl { index, duration, ..MeasureDecl::default() };
//! let strings = Part { id: "P1".into(), measures: vec![decl(0, Some(3.0)), decl(1, Some(3.0))], ..Part::default() };
//! let drums = Part { id: "P2".into(), measures: vec![decl(0, None), decl(1, Some(4.0))], ..Part::default() };
//! let cellos = Part { id: "P3".into(), measures: vec![decl(0, Some(3.0)), decl(1, Some(3.0))], ..Part::default() };
//!
//! let (map, advisories) = MeasureMap::build(&[strings, drums, cellos], 4.0);
//! assert_eq!(map.absolute_beat(1, 0.5), Some(3.5));
//! assert_eq!(map.total_beats(), 6.0);
//! assert_eq!(advisories.len(), 1); // P2's 4-beat measure 2 was overridden
//! ```

use crate::geometry::{Advisory, BEAT_EPSILON};
use crate::score::{Part, TimeSignature};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Canonical placement of one measure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureSpan {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub start: f64,
    pub duration: f64,
}

impl MeasureSpan {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureMap {
    spans: Vec<MeasureSpan>,
}

/// What the parts say about one measure index.
#[derive(Default)]
struct MeasureVotes {
    declared: Vec<(usize, f64)>,
    time_signature: Option<TimeSignature>,
    number: Option<String>,
}

impl MeasureMap {
    /// Build the canonical map from every part's measure declarations.
    ///
    /// Returns the map and the advisories for measures that needed a fallback or
    /// where a part's declaration was overridden.
    pub fn build(parts: &[Part], default_beats_per_measure: f64) -> (Self, Vec<Advisory>) {
        let mut votes: BTreeMap<usize, MeasureVotes> = BTreeMap::new();

        for (part_index, part) in parts.iter().enumerate() {
            for decl in &part.measures {
                let entry = votes.entry(decl.index).or_default();
                if let Some(duration) = decl.duration {
                    entry.declared.push((part_index, duration));
                }
                if entry.time_signature.is_none() {
                    entry.time_signature = decl.time_signature;
                }
                if entry.number.is_none() {
                    entry.number = decl.number.clone();
                }
            }
            // Measures only referenced by content still need a place on the map.
            for index in part
                .notes
                .iter()
                .map(|n| n.measure)
                .chain(part.dynamics.iter().map(|d| d.measure))
                .chain(part.rehearsal_marks.iter().map(|r| r.measure))
            {
                votes.entry(index).or_default();
            }
        }

        let mut spans = Vec::with_capacity(votes.len());
        let mut advisories = Vec::new();
        let mut prevailing: Option<TimeSignature> = None;
        let mut start = 0.0;

        for (index, vote) in votes {
            if vote.time_signature.is_some() {
                prevailing = vote.time_signature;
            }

            let usable: Vec<f64> = vote
                .declared
                .iter()
                .map(|(_, d)| *d)
                .filter(|d| d.is_finite() && *d > BEAT_EPSILON)
                .collect();

            let duration = match canonical_duration(&usable) {
                Some(duration) => duration,
                None => {
                    let beats = prevailing
                        .map(|ts| ts.quarter_beats())
                        .filter(|b| *b > BEAT_EPSILON)
                        .unwrap_or(default_beats_per_measure);
                    warn!(measure = index, beats, "no declared measure duration, using fallback");
                    advisories.push(Advisory::MeasureDurationFallback {
                        measure: index,
                        beats,
                    });
                    beats
                }
            };

            for (part_index, declared) in &vote.declared {
                if (declared - duration).abs() > BEAT_EPSILON {
                    let part = parts[*part_index].id.clone();
                    debug!(%part, measure = index, declared, canonical = duration, "measure duration overridden");
                    advisories.push(Advisory::MeasureDurationOverridden {
                        part,
                        measure: index,
                        declared: *declared,
                        canonical: duration,
                    });
                }
            }

            spans.push(MeasureSpan {
                index,
                number: vote.number,
                start,
                duration,
            });
            start += duration;
        }

        debug!(measures = spans.len(), total_beats = start, "built measure map");
        (Self { spans }, advisories)
    }

    pub fn spans(&self) -> &[MeasureSpan] {
        &self.spans
    }

    /// Number of measures (bars) in the map.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn span(&self, index: usize) -> Option<&MeasureSpan> {
        self.spans
            .binary_search_by_key(&index, |s| s.index)
            .ok()
            .map(|pos| &self.spans[pos])
    }

    /// Canonical start beat of a measure index.
    pub fn start_of(&self, index: usize) -> Option<f64> {
        self.span(index).map(|s| s.start)
    }

    /// Absolute beat of a position given relative to a measure's start.
    pub fn absolute_beat(&self, index: usize, local: f64) -> Option<f64> {
        self.start_of(index).map(|start| start + local)
    }

    pub fn total_beats(&self) -> f64 {
        self.spans.last().map(MeasureSpan::end).unwrap_or(0.0)
    }

    /// Start beat of the 1-indexed bar `bar`; `len() + 1` gives the end of the score.
    pub fn bar_start(&self, bar: usize) -> Option<f64> {
        if bar == 0 {
            return None;
        }
        if bar == self.spans.len() + 1 {
            return Some(self.total_beats());
        }
        self.spans.get(bar - 1).map(|s| s.start)
    }
}

/// Most common duration among `values`, compared with tolerance; ties go to
/// the shortest.
fn canonical_duration(values: &[f64]) -> Option<f64> {
    let mut tallies: Vec<(f64, usize)> = Vec::new();
    for &value in values {
        match tallies
            .iter_mut()
            .find(|(candidate, _)| (candidate - value).abs() <= BEAT_EPSILON)
        {
            Some(tally) => tally.1 += 1,
            None => tallies.push((value, 1)),
        }
    }

    tallies
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.total_cmp(&a.0)))
        .map(|(duration, _)| duration)
}
