//! # Ensemble Classifier
//!
//! Groups parts into instrument families for coloring, and scores how well a
//! score's part labels fit each known grouping scheme.
//!
//! ## Schemes
//! - `orchestra` - strings, winds, brass, percussion
//! - `bigband` - trumpets, trombones, saxophones, rhythm section
//! - `ungrouped` - one color per part; matches every part by definition
//!
//! ## Classification
//! A part with a General MIDI program (1-128) is classified by the scheme's
//! program table. Otherwise its label is matched against the scheme's keyword
//! rules. Rules are kept sorted by specificity (pattern length), longest first,
//! across all families, so "bassoon" is tried before "bass" and
//! "contrabassoon" before "contrabass".
//!
//! ## Confidence
//! Fraction of parts classified into a real family (not `Unknown`). Schemes are
//! ranked by confidence; on equal confidence grouped schemes rank before
//! `ungrouped`.
//!
//! ## Example
//! ```rust
//! use scoreline::ensemble::{Ensemble, EnsembleClassifier, Family};
//!
//! let classifier = EnsembleClassifier::new();
//! assert_eq!(classifier.family(Ensemble::Orchestra, "Bassoon", None), Family::Winds);
//! assert_eq!(classifier.family(Ensemble::Orchestra, "Double Bass", None), Family::Strings);
//! assert_eq!(classifier.family(Ensemble::BigBand, "Tenor Sax", None), Family::Saxophones);
//! assert_eq!(classifier.family(Ensemble::BigBand, "Anything", Some(57)), Family::Trumpets);
//! ```

use crate::error::TimelineError;
use crate::geometry::{EnsembleScore, LegendEntry, PartStyle};
use crate::score::Score;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensemble {
    Orchestra,
    BigBand,
    Ungrouped,
}

impl Ensemble {
    pub const ALL: [Ensemble; 3] = [Ensemble::Orchestra, Ensemble::BigBand, Ensemble::Ungrouped];

    pub fn is_grouped(&self) -> bool {
        !matches!(self, Ensemble::Ungrouped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Ensemble::Orchestra => "orchestra",
            Ensemble::BigBand => "bigband",
            Ensemble::Ungrouped => "ungrouped",
        }
    }

    /// Families in legend order, `Unknown` last.
    pub fn families(&self) -> &'static [Family] {
        match self {
            Ensemble::Orchestra => &[
                Family::Strings,
                Family::Winds,
                Family::Brass,
                Family::Percussion,
                Family::Unknown,
            ],
            Ensemble::BigBand => &[
                Family::Trumpets,
                Family::Trombones,
                Family::Saxophones,
                Family::RhythmSection,
                Family::Unknown,
            ],
            Ensemble::Ungrouped => &[],
        }
    }
}

impl fmt::Display for Ensemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ensemble {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orchestra" => Ok(Ensemble::Orchestra),
            "bigband" | "big-band" | "big_band" => Ok(Ensemble::BigBand),
            "ungrouped" => Ok(Ensemble::Ungrouped),
            _ => Err(TimelineError::UnknownEnsemble(s.trim().to_string())),
        }
    }
}

/// Caller's ensemble request: a fixed scheme, or auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnsembleChoice {
    /// Color ungrouped and report the detected scheme as a suggestion.
    #[default]
    Auto,
    Fixed(Ensemble),
}

impl FromStr for EnsembleChoice {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(EnsembleChoice::Auto);
        }
        s.parse().map(EnsembleChoice::Fixed)
    }
}

impl fmt::Display for EnsembleChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsembleChoice::Auto => f.write_str("auto"),
            EnsembleChoice::Fixed(ensemble) => ensemble.fmt(f),
        }
    }
}

/// Instrument family (orchestra) or section (big band).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Family {
    Strings,
    Winds,
    Brass,
    Percussion,
    Trumpets,
    Trombones,
    Saxophones,
    RhythmSection,
    Unknown,
}

impl Family {
    pub fn label(&self) -> &'static str {
        match self {
            Family::Strings => "Strings",
            Family::Winds => "Winds",
            Family::Brass => "Brass",
            Family::Percussion => "Percussion",
            Family::Trumpets => "Trumpets",
            Family::Trombones => "Trombones",
            Family::Saxophones => "Saxophones",
            Family::RhythmSection => "Rhythm Section",
            Family::Unknown => "Unknown",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Family::Strings => "#2E7D32",
            Family::Winds => "#1976D2",
            Family::Brass => "#F57C00",
            Family::Percussion => "#C2185B",
            Family::Trumpets => "#FF6B35",
            Family::Trombones => "#F7931E",
            Family::Saxophones => "#4A90E2",
            Family::RhythmSection => "#7B68EE",
            Family::Unknown => "#757575",
        }
    }
}

/// Colors cycled through for ungrouped parts.
pub const PART_PALETTE: [&str; 20] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf", "#393b79", "#637939", "#8c6d31", "#843c39", "#7b4173", "#5254a3",
    "#9c9ede", "#ad494a", "#d6616b", "#e7ba52",
];

const ORCHESTRA_KEYWORDS: &[(Family, &[&str])] = &[
    (
        Family::Strings,
        &[
            "violin", "viola", "cello", "contrabass", "double bass", "bass", "guitar", "harp",
            "piano", "pianoforte", "harpsichord", "clavichord", "banjo", "mandolin", "ukulele",
            "lute", "sitar", "shamisen", "koto", "strings", "string", "pizzicato", "tremolo",
        ],
    ),
    (
        Family::Winds,
        &[
            "flute", "piccolo", "recorder", "oboe", "english horn", "cor anglais", "clarinet",
            "bassoon", "contrabassoon", "saxophone", "sax", "soprano", "alto", "tenor", "baritone",
            "bass clarinet", "fagotto", "organ", "accordion", "harmonica", "pan flute", "whistle",
            "ocarina", "shakuhachi", "bagpipe", "fiddle",
        ],
    ),
    (
        Family::Brass,
        &[
            "trumpet", "cornet", "trombone", "tuba", "french horn", "horn", "euphonium",
            "baritone", "flugelhorn", "bugle", "brass", "muted",
        ],
    ),
    (
        Family::Percussion,
        &[
            "drum", "timpani", "snare", "bass drum", "cymbal", "triangle", "tambourine", "marimba",
            "xylophone", "vibraphone", "glockenspiel", "celesta", "gong", "bell", "chime",
            "woodblock", "clap", "percussion", "tom", "hi-hat", "crash", "ride",
        ],
    ),
];

const BIGBAND_KEYWORDS: &[(Family, &[&str])] = &[
    (Family::Trumpets, &["trumpet", "cornet", "flugelhorn", "bugle"]),
    (Family::Trombones, &["trombone", "tuba", "euphonium", "baritone horn"]),
    (
        Family::Saxophones,
        &[
            "saxophone", "sax", "soprano sax", "alto sax", "tenor sax", "baritone sax", "flute",
            "piccolo", "clarinet", "oboe", "bassoon", "english horn", "woodwind", "reed",
        ],
    ),
    (
        Family::RhythmSection,
        &[
            "piano", "pianoforte", "keyboard", "organ", "harpsichord", "bass", "double bass",
            "acoustic bass", "electric bass", "upright bass", "drum", "drums", "snare",
            "bass drum", "cymbal", "hi-hat", "crash", "ride", "guitar", "acoustic guitar",
            "electric guitar", "rhythm", "rhythm section", "percussion", "vibraphone", "marimba",
            "xylophone",
        ],
    ),
];

/// One keyword rule: `pattern` found in a lowercased label selects `family`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub pattern: &'static str,
    /// Longer patterns are more specific and are tried first.
    pub specificity: usize,
    pub family: Family,
}

/// Keyword rules of one scheme, most specific first.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    rules: Vec<KeywordRule>,
}

impl KeywordTable {
    pub fn new(entries: &[(Family, &[&'static str])]) -> Self {
        let mut rules: Vec<KeywordRule> = Vec::new();
        for (family, patterns) in entries {
            for &pattern in patterns.iter() {
                if rules.iter().any(|r| r.pattern == pattern && r.family == *family) {
                    continue;
                }
                rules.push(KeywordRule {
                    pattern,
                    specificity: pattern.chars().count(),
                    family: *family,
                });
            }
        }
        // stable: equal specificity keeps table order
        rules.sort_by(|a, b| b.specificity.cmp(&a.specificity));
        Self { rules }
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// Family of the most specific rule matching `label`.
    pub fn resolve(&self, label: &str) -> Option<Family> {
        let label = label.to_lowercase();
        self.rules
            .iter()
            .find(|rule| label.contains(rule.pattern))
            .map(|rule| rule.family)
    }
}

fn orchestra_program_family(program: u8) -> Family {
    match program {
        1..=8 => Family::Strings,
        9..=16 => Family::Percussion,
        17..=24 => Family::Winds,
        25..=52 => Family::Strings,
        53..=55 => Family::Winds,
        56..=64 => Family::Brass,
        65..=88 => Family::Winds,
        89..=96 => Family::Strings,
        97..=104 => Family::Unknown,
        105 | 111 => Family::Winds,
        106..=112 => Family::Strings,
        113..=128 => Family::Percussion,
        _ => Family::Unknown,
    }
}

fn bigband_program_family(program: u8) -> Family {
    match program {
        1..=40 | 48 => Family::RhythmSection,
        57 | 60 => Family::Trumpets,
        58 | 59 => Family::Trombones,
        65..=80 => Family::Saxophones,
        81..=96 | 113..=122 => Family::RhythmSection,
        _ => Family::Unknown,
    }
}

/// Label and program of one part, as seen by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PartLabel {
    pub part: usize,
    pub part_id: String,
    pub label: String,
    pub midi_program: Option<u8>,
}

impl PartLabel {
    pub fn from_score(score: &Score) -> Vec<PartLabel> {
        score
            .parts
            .iter()
            .enumerate()
            .map(|(index, part)| PartLabel {
                part: index,
                part_id: part.id.clone(),
                label: part.label().trim().to_string(),
                midi_program: part.instrument.midi_program,
            })
            .collect()
    }
}

pub struct EnsembleClassifier {
    orchestra: KeywordTable,
    bigband: KeywordTable,
}

impl Default for EnsembleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EnsembleClassifier {
    pub fn new() -> Self {
        Self {
            orchestra: KeywordTable::new(ORCHESTRA_KEYWORDS),
            bigband: KeywordTable::new(BIGBAND_KEYWORDS),
        }
    }

    /// Family of one part under `ensemble`. Ungrouped has no families.
    pub fn family(&self, ensemble: Ensemble, label: &str, midi_program: Option<u8>) -> Family {
        let (table, by_program): (&KeywordTable, fn(u8) -> Family) = match ensemble {
            Ensemble::Orchestra => (&self.orchestra, orchestra_program_family),
            Ensemble::BigBand => (&self.bigband, bigband_program_family),
            Ensemble::Ungrouped => return Family::Unknown,
        };

        match midi_program {
            Some(program @ 1..=128) => by_program(program),
            _ => table.resolve(label).unwrap_or(Family::Unknown),
        }
    }

    pub fn score(&self, ensemble: Ensemble, parts: &[PartLabel]) -> EnsembleScore {
        let total = parts.len();
        let matched = if ensemble.is_grouped() {
            parts
                .iter()
                .filter(|p| self.family(ensemble, &p.label, p.midi_program) != Family::Unknown)
                .count()
        } else {
            total
        };
        let confidence = match (ensemble.is_grouped(), total) {
            (false, _) => 1.0,
            (true, 0) => 0.0,
            (true, _) => matched as f64 / total as f64,
        };

        EnsembleScore {
            ensemble,
            confidence,
            matched,
            total,
        }
    }

    /// Scores of every scheme, best first.
    pub fn rank(&self, parts: &[PartLabel]) -> Vec<EnsembleScore> {
        let mut scores: Vec<EnsembleScore> =
            Ensemble::ALL.iter().map(|e| self.score(*e, parts)).collect();
        scores.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(b.ensemble.is_grouped().cmp(&a.ensemble.is_grouped()))
        });
        scores
    }

    /// Colors and group labels for every part under `ensemble`.
    pub fn part_styles(&self, ensemble: Ensemble, parts: &[PartLabel]) -> Vec<PartStyle> {
        if !ensemble.is_grouped() {
            return ungrouped_styles(parts);
        }
        parts
            .iter()
            .map(|p| {
                let family = self.family(ensemble, &p.label, p.midi_program);
                PartStyle {
                    part: p.part,
                    part_id: p.part_id.clone(),
                    label: p.label.clone(),
                    group: family.label().to_string(),
                    color: family.color().to_string(),
                }
            })
            .collect()
    }
}

/// Top grouped scheme, or ungrouped when grouped schemes tie or match nothing.
///
/// Returns the suggestion and whether detection was ambiguous.
pub fn suggest(ranked: &[EnsembleScore]) -> (Ensemble, bool) {
    let mut grouped = ranked.iter().filter(|s| s.ensemble.is_grouped());
    let Some(best) = grouped.next() else {
        return (Ensemble::Ungrouped, true);
    };
    if best.confidence <= 0.0 {
        return (Ensemble::Ungrouped, true);
    }
    if grouped.any(|s| (s.confidence - best.confidence).abs() < 1e-9) {
        return (Ensemble::Ungrouped, true);
    }
    (best.ensemble, false)
}

fn display_label(p: &PartLabel) -> String {
    if p.label.is_empty() {
        format!("Instrument {}", p.part + 1)
    } else {
        p.label.clone()
    }
}

/// One color per part; repeated labels are numbered ("Flute", "Flute 2").
fn ungrouped_styles(parts: &[PartLabel]) -> Vec<PartStyle> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    parts
        .iter()
        .enumerate()
        .map(|(position, p)| {
            let base = display_label(p);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            let group = if *count == 1 {
                base.clone()
            } else {
                format!("{} {}", base, count)
            };
            PartStyle {
                part: p.part,
                part_id: p.part_id.clone(),
                label: base,
                group,
                color: PART_PALETTE[position % PART_PALETTE.len()].to_string(),
            }
        })
        .collect()
}

/// Legend entries: one per used family in scheme order, or one per part when ungrouped.
pub fn legend(ensemble: Ensemble, styles: &[PartStyle]) -> Vec<LegendEntry> {
    if !ensemble.is_grouped() {
        return styles
            .iter()
            .map(|s| LegendEntry {
                label: s.group.clone(),
                color: s.color.clone(),
                parts: vec![s.part],
            })
            .collect();
    }

    ensemble
        .families()
        .iter()
        .filter_map(|family| {
            let parts: Vec<usize> = styles
                .iter()
                .filter(|s| s.group == family.label())
                .map(|s| s.part)
                .collect();
            (!parts.is_empty()).then(|| LegendEntry {
                label: family.label().to_string(),
                color: family.color().to_string(),
                parts,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn labels(names: &[&str]) -> Vec<PartLabel> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| PartLabel {
                part: i,
                part_id: format!("P{}", i + 1),
                label: name.to_string(),
                midi_program: None,
            })
            .collect()
    }

    #[test]
    fn test_keyword_rules_sorted_longest_first() {
        let table = KeywordTable::new(ORCHESTRA_KEYWORDS);
        let lengths: Vec<usize> = table.rules().iter().map(|r| r.specificity).collect();
        assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(table.rules().iter().filter(|r| r.pattern == "bassoon").count(), 1);
    }

    #[test]
    fn test_longest_match_avoids_cross_family_errors() {
        let c = EnsembleClassifier::new();
        let orchestra = |name| c.family(Ensemble::Orchestra, name, None);
        assert_eq!(orchestra("Bassoon"), Family::Winds);
        assert_eq!(orchestra("Contrabassoon"), Family::Winds);
        assert_eq!(orchestra("Contrabass"), Family::Strings);
        assert_eq!(orchestra("Bass Clarinet"), Family::Winds);
        assert_eq!(orchestra("Bass Drum"), Family::Percussion);
        assert_eq!(orchestra("English Horn"), Family::Winds);
        assert_eq!(orchestra("Horn in F"), Family::Brass);
        assert_eq!(orchestra("Baritone Saxophone"), Family::Winds);
        assert_eq!(orchestra("Tenor Trombone"), Family::Brass);
        assert_eq!(orchestra("Kazoo"), Family::Unknown);
    }

    #[test]
    fn test_bigband_sections() {
        let c = EnsembleClassifier::new();
        let bigband = |name| c.family(Ensemble::BigBand, name, None);
        assert_eq!(bigband("Trumpet 1"), Family::Trumpets);
        assert_eq!(bigband("Bass Trombone"), Family::Trombones);
        assert_eq!(bigband("Alto Sax 2"), Family::Saxophones);
        assert_eq!(bigband("Electric Bass"), Family::RhythmSection);
        assert_eq!(bigband("Drum Set"), Family::RhythmSection);
        assert_eq!(bigband("Violin"), Family::Unknown);
    }

    #[test]
    fn test_midi_program_takes_precedence() {
        let c = EnsembleClassifier::new();
        assert_eq!(c.family(Ensemble::Orchestra, "Flute", Some(41)), Family::Strings);
        assert_eq!(c.family(Ensemble::Orchestra, "Synth", Some(100)), Family::Unknown);
        assert_eq!(c.family(Ensemble::Orchestra, "Sitar", Some(105)), Family::Winds);
        assert_eq!(c.family(Ensemble::BigBand, "Violin", Some(41)), Family::Unknown);
        assert_eq!(c.family(Ensemble::BigBand, "Trombone", Some(58)), Family::Trombones);
        // out-of-range program falls back to keywords
        assert_eq!(c.family(Ensemble::Orchestra, "Flute", Some(0)), Family::Winds);
    }

    #[test]
    fn test_scores_for_mixed_orchestra() {
        let c = EnsembleClassifier::new();
        let parts = labels(&["Violin I", "Trombone", "Snare Drum"]);

        let orchestra = c.score(Ensemble::Orchestra, &parts);
        assert_eq!((orchestra.matched, orchestra.total), (3, 3));
        assert_eq!(orchestra.confidence, 1.0);

        let bigband = c.score(Ensemble::BigBand, &parts);
        assert_eq!(bigband.matched, 2);
        assert!((bigband.confidence - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ungrouped_always_one() {
        let c = EnsembleClassifier::new();
        for names in [vec![], vec!["Kazoo"], vec!["Violin", "Theremin"]] {
            let score = c.score(Ensemble::Ungrouped, &labels(&names));
            assert_eq!(score.confidence, 1.0);
        }
    }

    #[test]
    fn test_rank_orders_by_confidence_grouped_first() {
        let c = EnsembleClassifier::new();
        let ranked = c.rank(&labels(&["Violin", "Viola", "Cello"]));
        let order: Vec<Ensemble> = ranked.iter().map(|s| s.ensemble).collect();
        assert_eq!(order, vec![Ensemble::Orchestra, Ensemble::Ungrouped, Ensemble::BigBand]);
        assert!(ranked.iter().all(|s| (0.0..=1.0).contains(&s.confidence)));
    }

    #[test]
    fn test_suggestion_picks_unique_best() {
        let c = EnsembleClassifier::new();
        let ranked = c.rank(&labels(&["Trumpet", "Alto Sax", "Piano", "Drums", "Violin"]));
        // orchestra 5/5, bigband 4/5
        assert_eq!(suggest(&ranked), (Ensemble::Orchestra, false));
    }

    #[test]
    fn test_suggestion_tie_falls_back_to_ungrouped() {
        let c = EnsembleClassifier::new();
        let ranked = c.rank(&labels(&["Trumpet", "Piano"]));
        assert_eq!(suggest(&ranked), (Ensemble::Ungrouped, true));

        let ranked = c.rank(&labels(&["Theremin"]));
        assert_eq!(suggest(&ranked), (Ensemble::Ungrouped, true));
    }

    #[test]
    fn test_ungrouped_styles_number_duplicates() {
        let c = EnsembleClassifier::new();
        let styles = c.part_styles(Ensemble::Ungrouped, &labels(&["Flute", "Flute", "Oboe", ""]));
        let groups: Vec<&str> = styles.iter().map(|s| s.group.as_str()).collect();
        assert_eq!(groups, vec!["Flute", "Flute 2", "Oboe", "Instrument 4"]);
        assert_eq!(styles[0].color, PART_PALETTE[0]);
        assert_eq!(styles[1].color, PART_PALETTE[1]);
    }

    #[test]
    fn test_grouped_styles_and_legend() {
        let c = EnsembleClassifier::new();
        let styles = c.part_styles(Ensemble::Orchestra, &labels(&["Trumpet", "Violin", "Viola", "Kazoo"]));
        assert_eq!(styles[0].color, "#F57C00");
        assert_eq!(styles[1].group, "Strings");

        let entries = legend(Ensemble::Orchestra, &styles);
        let summary: Vec<(&str, Vec<usize>)> =
            entries.iter().map(|e| (e.label.as_str(), e.parts.clone())).collect();
        assert_eq!(
            summary,
            vec![("Strings", vec![1, 2]), ("Brass", vec![0]), ("Unknown", vec![3])]
        );
    }

    #[test]
    fn test_parse_ensemble_names() {
        assert_eq!("orchestra".parse::<EnsembleChoice>(), Ok(EnsembleChoice::Fixed(Ensemble::Orchestra)));
        assert_eq!("Big-Band".parse::<EnsembleChoice>(), Ok(EnsembleChoice::Fixed(Ensemble::BigBand)));
        assert_eq!("auto".parse::<EnsembleChoice>(), Ok(EnsembleChoice::Auto));
        assert_eq!(
            "polka".parse::<EnsembleChoice>(),
            Err(TimelineError::UnknownEnsemble("polka".to_string()))
        );
    }
}
