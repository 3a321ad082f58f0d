//! # Score Object Model
//!
//! Immutable, cycle-free description of a parsed score as handed to the pipeline.
//!
//! ## Purpose
//! Ingestion adapters (the MusicXML reader in [`crate::musicxml`], or a YAML
//! document decoded with `serde_yaml`) convert whatever object graph they read
//! into these plain values. Nothing downstream ever sees a parser type.
//!
//! ## Key Types
//! - [`Score`] - ordered parts plus an optional title
//! - [`Part`] - one instrument line: measures, raw notes, dynamics directions, rehearsal marks
//! - [`RawNoteEvent`] - one notated attack, with time local to its measure
//! - [`Pitch`] - spelled (`C4`, `Bb3`) or MIDI pitch
//! - [`MeasureDecl`] - a part's declared measure duration (possibly absent)
//!
//! ## Time
//! All times are quarter-note beats as `f64`. A raw note's `onset` is local to
//! the measure named by its `measure` index; the canonical measure map turns it
//! into an absolute beat.
//!
//! ## Ties
//! - `tie: Some(Start)`: first note of a tied group
//! - `tie: Some(Continue)`: middle note (tied on both sides)
//! - `tie: Some(Stop)`: last note of a tied group
//! - `tie: None`: ordinary note
//!
//! ## Example
//! ```rust
//! use scoreline::score::{Pitch, Score};
//!
//! let yaml = r#"
//! parts:
//!   - id: P1
//!     name: Flute
//!     measures:
//!       - { index: 0, duration: 4.0 }
//!     notes:
//!       - { measure: 0, onset: 0.0, duration: 1.0, pitch: C5 }
//! "#;
//! let score: Score = serde_yaml::from_str(yaml).unwrap();
//! assert_eq!(score.parts[0].notes[0].pitch, "C5".parse::<Pitch>().unwrap());
//! assert_eq!(score.parts[0].notes[0].pitch.midi(), 72);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A whole score: ordered parts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Score {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Score {
    /// Total raw note events across all parts (grace notes included).
    pub fn note_count(&self) -> usize {
        self.parts.iter().map(|p| p.notes.len()).sum()
    }
}

/// One part (instrument line) of the score.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Part {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub instrument: Instrument,
    #[serde(default)]
    pub measures: Vec<MeasureDecl>,
    #[serde(default)]
    pub notes: Vec<RawNoteEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamics: Vec<DynamicsDirection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rehearsal_marks: Vec<RehearsalMarkDecl>,
}

impl Part {
    /// Display label used for classification and legends.
    ///
    /// Prefers the instrument name, then the part name, then the part id.
    pub fn label(&self) -> &str {
        self.instrument
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.name.as_deref().filter(|n| !n.trim().is_empty()))
            .unwrap_or(&self.id)
    }
}

/// Instrument identity of a part.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Instrument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// General MIDI program, 1-128.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_program: Option<u8>,
    #[serde(default)]
    pub transposition: Transposition,
}

/// Written-to-sounding interval of a transposing instrument.
///
/// A Bb clarinet is `chromatic: -2`; a tenor saxophone is
/// `chromatic: -2, octave_change: -1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Transposition {
    #[serde(default)]
    pub chromatic: i8,
    #[serde(default)]
    pub octave_change: i8,
}

impl Transposition {
    /// Total shift in semitones from written to sounding pitch.
    pub fn semitones(&self) -> i16 {
        self.chromatic as i16 + 12 * self.octave_change as i16
    }

    pub fn is_identity(&self) -> bool {
        self.semitones() == 0
    }
}

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats: 4,
            beat_type: 4,
        }
    }
}

impl TimeSignature {
    /// Bar length in quarter-note beats (6/8 = 3.0, 3/4 = 3.0, 2/2 = 4.0).
    pub fn quarter_beats(&self) -> f64 {
        if self.beat_type == 0 {
            return 0.0;
        }
        self.beats as f64 * 4.0 / self.beat_type as f64
    }
}

/// A part's declaration for one measure.
///
/// `duration` is `None` when the part does not state a bar length (common for
/// percussion exported without a time signature).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MeasureDecl {
    /// 0-based position of the measure in the score.
    pub index: usize,
    /// Printed measure number, if different from the position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Time signature change taking effect at this measure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_signature: Option<TimeSignature>,
}

/// Whether a pitch is notated as written (transposed) or at sounding pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchSpace {
    #[default]
    Written,
    Sounding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieKind {
    Start,
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Articulation {
    Staccato,
    Staccatissimo,
    Accent,
    StrongAccent,
    Tenuto,
}

impl Articulation {
    /// True for articulations that shorten the sounding duration.
    pub fn shortens(&self) -> bool {
        matches!(self, Articulation::Staccato | Articulation::Staccatissimo)
    }
}

/// Dynamics marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicMark {
    Ppp,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
    Fff,
    Sfz,
    Sffz,
    Fp,
}

impl DynamicMark {
    /// Loudness level of the marking. `ff` is 1.0; `fff` and the sforzandi go above it.
    pub fn level(&self) -> f64 {
        match self {
            DynamicMark::Ppp => 0.2,
            DynamicMark::Pp => 0.3,
            DynamicMark::P => 0.4,
            DynamicMark::Mp => 0.55,
            DynamicMark::Mf => 0.7,
            DynamicMark::F => 0.85,
            DynamicMark::Ff => 1.0,
            DynamicMark::Fff => 1.15,
            DynamicMark::Sfz => 1.05,
            DynamicMark::Sffz => 1.1,
            DynamicMark::Fp => 0.65,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicMark::Ppp => "ppp",
            DynamicMark::Pp => "pp",
            DynamicMark::P => "p",
            DynamicMark::Mp => "mp",
            DynamicMark::Mf => "mf",
            DynamicMark::F => "f",
            DynamicMark::Ff => "ff",
            DynamicMark::Fff => "fff",
            DynamicMark::Sfz => "sfz",
            DynamicMark::Sffz => "sffz",
            DynamicMark::Fp => "fp",
        }
    }
}

impl FromStr for DynamicMark {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ppp" => Ok(DynamicMark::Ppp),
            "pp" => Ok(DynamicMark::Pp),
            "p" => Ok(DynamicMark::P),
            "mp" => Ok(DynamicMark::Mp),
            "mf" => Ok(DynamicMark::Mf),
            "f" => Ok(DynamicMark::F),
            "ff" => Ok(DynamicMark::Ff),
            "fff" => Ok(DynamicMark::Fff),
            "sfz" | "sf" => Ok(DynamicMark::Sfz),
            "sffz" => Ok(DynamicMark::Sffz),
            "fp" => Ok(DynamicMark::Fp),
            other => Err(format!("unknown dynamic '{}'", other)),
        }
    }
}

impl fmt::Display for DynamicMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Note names C through B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Step {
    #[default]
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    /// Semitones above C within the octave.
    pub fn semitone(&self) -> i16 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Step::C),
            'D' => Some(Step::D),
            'E' => Some(Step::E),
            'F' => Some(Step::F),
            'G' => Some(Step::G),
            'A' => Some(Step::A),
            'B' => Some(Step::B),
            _ => None,
        }
    }

    fn as_char(&self) -> char {
        match self {
            Step::C => 'C',
            Step::D => 'D',
            Step::E => 'E',
            Step::F => 'F',
            Step::G => 'G',
            Step::A => 'A',
            Step::B => 'B',
        }
    }
}

/// A pitch, either spelled or given directly as a MIDI note number.
///
/// In YAML a pitch is written as a name (`"C4"`, `"Bb3"`, `"F#5"`) or a bare
/// MIDI number (`60`). Middle C is `C4` = 60.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PitchRepr", into = "PitchRepr")]
pub enum Pitch {
    Spelled { step: Step, alter: i8, octave: i8 },
    Midi(u8),
}

impl Pitch {
    pub fn spelled(step: Step, alter: i8, octave: i8) -> Self {
        Pitch::Spelled {
            step,
            alter,
            octave,
        }
    }

    /// MIDI note number. May fall outside 0-127 for extreme spellings.
    pub fn midi(&self) -> i16 {
        match *self {
            Pitch::Spelled {
                step,
                alter,
                octave,
            } => step.semitone() + alter as i16 + (octave as i16 + 1) * 12,
            Pitch::Midi(n) => n as i16,
        }
    }
}

impl FromStr for Pitch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Ok(Pitch::Midi(n));
        }

        let mut chars = s.chars();
        let step = chars
            .next()
            .and_then(Step::from_char)
            .ok_or_else(|| format!("invalid pitch '{}': expected a note name A-G", s))?;

        let rest: String = chars.collect();
        let mut alter: i8 = 0;
        let mut octave_text = rest.as_str();
        while let Some(c) = octave_text.chars().next() {
            let step_alter = match c {
                '#' => alter.checked_add(1),
                'b' => alter.checked_sub(1),
                _ => break,
            };
            alter = step_alter
                .ok_or_else(|| format!("invalid pitch '{}': too many accidentals", s))?;
            octave_text = &octave_text[1..];
        }

        let octave = octave_text
            .parse::<i8>()
            .map_err(|_| format!("invalid pitch '{}': expected an octave number", s))?;

        Ok(Pitch::spelled(step, alter, octave))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Pitch::Spelled {
                step,
                alter,
                octave,
            } => {
                write!(f, "{}", step.as_char())?;
                let accidental = if alter >= 0 { '#' } else { 'b' };
                for _ in 0..alter.unsigned_abs() {
                    write!(f, "{}", accidental)?;
                }
                write!(f, "{}", octave)
            }
            Pitch::Midi(n) => write!(f, "{}", n),
        }
    }
}

/// Serialized form of [`Pitch`]: a MIDI number or a name.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PitchRepr {
    Midi(u8),
    Name(String),
}

impl TryFrom<PitchRepr> for Pitch {
    type Error = String;

    fn try_from(repr: PitchRepr) -> Result<Self, Self::Error> {
        match repr {
            PitchRepr::Midi(n) => Ok(Pitch::Midi(n)),
            PitchRepr::Name(name) => name.parse(),
        }
    }
}

impl From<Pitch> for PitchRepr {
    fn from(pitch: Pitch) -> Self {
        match pitch {
            Pitch::Midi(n) => PitchRepr::Midi(n),
            spelled => PitchRepr::Name(spelled.to_string()),
        }
    }
}

fn default_lane() -> u8 {
    1
}

/// One notated attack, as read from the score.
///
/// A tied group across barlines is several raw events. Chords are several raw
/// events sharing an onset and voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawNoteEvent {
    #[serde(default = "default_lane")]
    pub voice: u8,
    #[serde(default = "default_lane")]
    pub staff: u8,
    /// 0-based measure index.
    pub measure: usize,
    /// Onset in beats from the start of the measure.
    pub onset: f64,
    /// Notated duration in beats. Zero marks a grace note.
    pub duration: f64,
    pub pitch: Pitch,
    #[serde(default)]
    pub pitch_space: PitchSpace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie: Option<TieKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub articulations: Vec<Articulation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicMark>,
    /// MIDI velocity 0-127, when the source carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
}

impl RawNoteEvent {
    /// Plain quarter-beat note in voice 1, staff 1, written pitch.
    pub fn new(measure: usize, onset: f64, duration: f64, pitch: Pitch) -> Self {
        Self {
            voice: 1,
            staff: 1,
            measure,
            onset,
            duration,
            pitch,
            pitch_space: PitchSpace::Written,
            tie: None,
            articulations: Vec::new(),
            dynamic: None,
            velocity: None,
        }
    }

    pub fn is_staccato(&self) -> bool {
        self.articulations.iter().any(Articulation::shortens)
    }
}

/// Dynamics marking placed as a direction rather than on a note.
///
/// `voice: None` applies to every voice of the part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DynamicsDirection {
    pub measure: usize,
    #[serde(default)]
    pub onset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff: Option<u8>,
    pub mark: DynamicMark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RehearsalMarkDecl {
    pub measure: usize,
    #[serde(default)]
    pub onset: f64,
    pub label: String,
}
