//! # Timeline Geometry
//!
//! Output types of the pipeline. A renderer needs nothing beyond a [`Timeline`]
//! to draw the score: segments positioned by pitch and beat, optional connection
//! lines, tick marks, rehearsal marks, colors and a legend.
//!
//! All beats in a finished [`Timeline`] are relative to the slice window, so
//! the first drawable beat is always 0.
//!
//! ## Key Types
//! - [`NoteEvent`] - one sounding note after tie merging, at concert pitch
//! - [`Segment`] - a drawable piece of a note's span with thickness and opacity
//! - [`ConnectionEdge`] - a line from the end of one note to the start of the next
//! - [`EnsembleScore`] - how well the part labels fit one ensemble scheme
//! - [`Advisory`] - a recovered irregularity worth telling the user about

use crate::config::TimelineUnit;
use crate::ensemble::Ensemble;
use crate::score::DynamicMark;
use serde::Serialize;
use std::fmt;

/// Tolerance for comparing beat positions produced by float arithmetic.
pub const BEAT_EPSILON: f64 = 1e-6;

/// Identity of one notated voice: part, staff and voice number.
///
/// Connections never cross voice keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceKey {
    pub part: usize,
    pub staff: u8,
    pub voice: u8,
}

/// A musically distinct sounding note.
///
/// `duration` is the sounding duration (after staccato shortening);
/// `notated_duration` is the tie-merged duration before shortening and is
/// what melodic adjacency is measured against.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    pub id: usize,
    pub part_id: String,
    pub voice: VoiceKey,
    /// Concert pitch, MIDI number.
    pub pitch: u8,
    pub onset: f64,
    pub duration: f64,
    pub notated_duration: f64,
    /// Loudness in [0, 1].
    pub intensity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicMark>,
    pub staccato: bool,
    /// Indices into the part's raw note list.
    pub sources: Vec<usize>,
}

impl NoteEvent {
    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }

    pub fn notated_end(&self) -> f64 {
        self.onset + self.notated_duration
    }
}

/// A drawable piece of one pitch lane.
///
/// `note` is the owning note (the earliest contributor); `notes` lists every
/// note sounding during `[start, end)`, so `thickness == notes.len()` when
/// overlaps are split.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: usize,
    pub note: usize,
    pub notes: Vec<usize>,
    pub voice: VoiceKey,
    pub pitch: u8,
    pub start: f64,
    pub end: f64,
    pub thickness: u32,
    pub opacity: f64,
    pub color: String,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn covers(&self, note: usize) -> bool {
        self.notes.contains(&note)
    }
}

/// Directed melodic step between two notes of one voice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEdge {
    pub from_segment: usize,
    pub to_segment: usize,
    pub from_note: usize,
    pub to_note: usize,
    pub from_beat: f64,
    pub from_pitch: u8,
    pub to_beat: f64,
    pub to_pitch: u8,
    /// Silence between the source's sounding end and the destination onset.
    pub gap: f64,
    pub alpha: f64,
    pub curvature: f64,
    pub line_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleScore {
    pub ensemble: Ensemble,
    /// Fraction of parts matched, in [0, 1].
    pub confidence: f64,
    pub matched: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RehearsalMark {
    pub label: String,
    pub beat: f64,
}

/// Axis ticks for the time axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSpec {
    pub major: Vec<f64>,
    pub labels: Vec<String>,
    pub minor: Vec<f64>,
}

impl TickSpec {
    /// Major ticks paired with their labels.
    pub fn labelled(&self) -> Vec<(&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.major.iter().copied())
            .collect()
    }
}

/// How one part is drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartStyle {
    pub part: usize,
    pub part_id: String,
    pub label: String,
    /// Family or section label, or the de-duplicated part label when ungrouped.
    pub group: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
    pub parts: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotBounds {
    pub min_pitch: u8,
    pub max_pitch: u8,
    pub min_time: f64,
    pub max_time: f64,
    /// Shortest sounding segment, used for minor beat ticks.
    pub min_duration: f64,
}

/// Absolute beat range a timeline was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatWindow {
    pub start: f64,
    pub end: f64,
}

impl BeatWindow {
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= BEAT_EPSILON
    }
}

/// Recovered irregularity. Never fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Advisory {
    /// No part declared a duration for this measure.
    MeasureDurationFallback { measure: usize, beats: f64 },
    /// A part declared a duration that lost to the canonical one.
    MeasureDurationOverridden {
        part: String,
        measure: usize,
        declared: f64,
        canonical: f64,
    },
    /// Tie stop or continue with no open tie; kept as an ordinary note.
    OrphanTieStop {
        part: String,
        voice: u8,
        pitch: u8,
        onset: f64,
    },
    /// Tie start that was never closed; emitted with the duration gathered so far.
    UnterminatedTie {
        part: String,
        voice: u8,
        pitch: u8,
        onset: f64,
    },
    EnsembleSuggestion {
        suggested: Ensemble,
        ranked: Vec<EnsembleScore>,
        ambiguous: bool,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::MeasureDurationFallback { measure, beats } => write!(
                f,
                "measure {} has no declared duration in any part; using {} beats",
                measure + 1,
                beats
            ),
            Advisory::MeasureDurationOverridden {
                part,
                measure,
                declared,
                canonical,
            } => write!(
                f,
                "part {} declares measure {} as {} beats; aligned to {} beats",
                part,
                measure + 1,
                declared,
                canonical
            ),
            Advisory::OrphanTieStop {
                part,
                voice,
                pitch,
                onset,
            } => write!(
                f,
                "part {} voice {}: tie end at beat {} (pitch {}) has no tie start; kept as a separate note",
                part, voice, onset, pitch
            ),
            Advisory::UnterminatedTie {
                part,
                voice,
                pitch,
                onset,
            } => write!(
                f,
                "part {} voice {}: tie from beat {} (pitch {}) is never closed",
                part, voice, onset, pitch
            ),
            Advisory::EnsembleSuggestion {
                suggested,
                ranked,
                ambiguous,
            } => {
                let scores: Vec<String> = ranked
                    .iter()
                    .map(|s| format!("{} {:.0}%", s.ensemble, s.confidence * 100.0))
                    .collect();
                if *ambiguous {
                    write!(
                        f,
                        "ensemble detection is ambiguous ({}); suggesting {}",
                        scores.join(", "),
                        suggested
                    )
                } else {
                    write!(
                        f,
                        "suggested ensemble: {} ({}); pass --ensemble {} to group by it",
                        suggested,
                        scores.join(", "),
                        suggested
                    )
                }
            }
        }
    }
}

/// Everything a renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Scheme used for colors.
    pub ensemble: Ensemble,
    pub unit: TimelineUnit,
    pub window: BeatWindow,
    pub notes: Vec<NoteEvent>,
    pub segments: Vec<Segment>,
    pub connections: Vec<ConnectionEdge>,
    pub ensemble_scores: Vec<EnsembleScore>,
    pub parts: Vec<PartStyle>,
    pub legend: Vec<LegendEntry>,
    pub ticks: TickSpec,
    pub rehearsal_marks: Vec<RehearsalMark>,
    /// `None` when the window contains no sounding segment.
    pub bounds: Option<PlotBounds>,
    pub advisories: Vec<Advisory>,
}

impl Timeline {
    /// Segments belonging to one note, in time order.
    pub fn segments_of(&self, note: usize) -> Vec<&Segment> {
        let mut segments: Vec<&Segment> = self.segments.iter().filter(|s| s.covers(note)).collect();
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        segments
    }

    pub fn segment(&self, id: usize) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn note(&self, id: usize) -> Option<&NoteEvent> {
        self.notes.iter().find(|n| n.id == id)
    }
}

/// Bar opacity for a segment whose loudest note has the given intensity.
pub fn opacity_for(intensity: f64) -> f64 {
    (0.35 + 0.45 * intensity.clamp(0.0, 1.0)).min(0.95)
}

/// Plot bounds over the given segments, or `None` when empty.
pub fn plot_bounds(segments: &[Segment], window: &BeatWindow) -> Option<PlotBounds> {
    let min_pitch = segments.iter().map(|s| s.pitch).min()?;
    let max_pitch = segments.iter().map(|s| s.pitch).max()?;
    let min_duration = segments
        .iter()
        .map(Segment::duration)
        .filter(|d| *d > BEAT_EPSILON)
        .fold(f64::INFINITY, f64::min);

    Some(PlotBounds {
        min_pitch,
        max_pitch,
        min_time: 0.0,
        max_time: window.len(),
        min_duration: if min_duration.is_finite() { min_duration } else { 0.0 },
    })
}
