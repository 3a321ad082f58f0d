//! # Pipeline
//!
//! Entry points turning a [`Score`] into a [`Timeline`].
//!
//! ## Stages
//! 1. Validate the configuration and every part
//! 2. Build the canonical [`MeasureMap`] over all parts
//! 3. Resolve the slice window (so a bad range fails before any geometry work)
//! 4. Normalize each part against the shared map
//! 5. Rank ensemble schemes, pick colors and legend
//! 6. Segment overlaps, then build connections when enabled
//! 7. Slice and rebase, then derive ticks, rehearsal marks and plot bounds
//!
//! The pipeline is a pure function of its inputs: same score and config, same
//! timeline.

use crate::config::PipelineConfig;
use crate::connect::build_connections;
use crate::ensemble::{legend, suggest, Ensemble, EnsembleChoice, EnsembleClassifier, PartLabel};
use crate::error::{Result, TimelineError};
use crate::geometry::{plot_bounds, Advisory, RehearsalMark, Timeline};
use crate::measure_map::MeasureMap;
use crate::musicxml::read_score;
use crate::normalize::{normalize_part, validate_part};
use crate::score::Score;
use crate::segment::{segment_notes, SegmentMode};
use crate::slice::{
    resolve_window, slice_connections, slice_marks, slice_notes, slice_segments, tick_spec,
};
use tracing::{debug, info};

/// Build the drawable timeline of `score`.
///
/// # Example
/// ```rust
/// use scoreline::{build_timeline, PipelineConfig, Score};
///
/// let score: Score = serde_yaml::from_str(r#"
/// parts:
///   - id: P1
///     name: Violin
///     measures: [{ index: 0, duration: 4.0 }]
///     notes:
///       - { measure: 0, onset: 0.0, duration: 2.0, pitch: G4 }
///       - { measure: 0, onset: 2.0, duration: 2.0, pitch: A4 }
/// "#).unwrap();
///
/// let timeline = build_timeline(&score, &PipelineConfig::default()).unwrap();
/// assert_eq!(timeline.notes.len(), 2);
/// assert_eq!(timeline.segments.len(), 2);
/// assert!(timeline.connections.is_empty()); // connections are off by default
/// ```
pub fn build_timeline(score: &Score, config: &PipelineConfig) -> Result<Timeline> {
    config.validate()?;
    for part in &score.parts {
        validate_part(part)?;
    }
    if score.note_count() == 0 {
        return Err(TimelineError::EmptyScore);
    }

    let (map, mut advisories) = MeasureMap::build(&score.parts, config.default_beats_per_measure);
    let window = resolve_window(&map, config.timeline_unit, config.slice)?;

    let mut notes = Vec::with_capacity(score.note_count());
    for (index, part) in score.parts.iter().enumerate() {
        let (part_notes, part_advisories) =
            normalize_part(index, part, &map, config.staccato_factor, notes.len())?;
        notes.extend(part_notes);
        advisories.extend(part_advisories);
    }
    if notes.is_empty() {
        return Err(TimelineError::EmptyScore);
    }

    let classifier = EnsembleClassifier::new();
    let labels = PartLabel::from_score(score);
    let ranked = classifier.rank(&labels);
    let ensemble = match config.ensemble {
        EnsembleChoice::Fixed(ensemble) => ensemble,
        EnsembleChoice::Auto => {
            let (suggested, ambiguous) = suggest(&ranked);
            info!(%suggested, ambiguous, "ensemble detection");
            advisories.push(Advisory::EnsembleSuggestion {
                suggested,
                ranked: ranked.clone(),
                ambiguous,
            });
            Ensemble::Ungrouped
        }
    };
    let styles = classifier.part_styles(ensemble, &labels);
    let legend = legend(ensemble, &styles);

    let segments = segment_notes(
        &notes,
        SegmentMode::from_split_overlaps(config.split_overlaps),
        &styles,
    );
    let connections = if config.show_connections {
        build_connections(&notes, &segments, &config.connections)
    } else {
        Vec::new()
    };

    let rehearsal_marks = score
        .parts
        .first()
        .map(|part| {
            part.rehearsal_marks
                .iter()
                .filter_map(|mark| {
                    map.absolute_beat(mark.measure, mark.onset).map(|beat| RehearsalMark {
                        label: mark.label.clone(),
                        beat,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let segments = slice_segments(segments, &window);
    let connections = slice_connections(connections, &segments, &window);
    let notes = slice_notes(notes, &window);
    let rehearsal_marks = slice_marks(rehearsal_marks, &window);

    let bounds = plot_bounds(&segments, &window);
    let min_duration = bounds.map(|b| b.min_duration).unwrap_or(0.0);
    let ticks = tick_spec(&map, config.timeline_unit, &window, min_duration);

    debug!(
        notes = notes.len(),
        segments = segments.len(),
        connections = connections.len(),
        advisories = advisories.len(),
        %ensemble,
        "built timeline"
    );

    Ok(Timeline {
        title: score.title.clone(),
        ensemble,
        unit: config.timeline_unit,
        window,
        notes,
        segments,
        connections,
        ensemble_scores: ranked,
        parts: styles,
        legend,
        ticks,
        rehearsal_marks,
        bounds,
        advisories,
    })
}

/// Read partwise MusicXML and build its timeline.
pub fn timeline_from_musicxml(xml: &[u8], config: &PipelineConfig) -> Result<Timeline> {
    let score = read_score(xml)?;
    build_timeline(&score, config)
}

/// Decode a YAML-serialized [`Score`] and build its timeline.
pub fn timeline_from_yaml(content: &str, config: &PipelineConfig) -> Result<Timeline> {
    let score: Score =
        serde_yaml::from_str(content).map_err(|e| TimelineError::ParseError(e.to_string()))?;
    build_timeline(&score, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimelineUnit;
    use crate::slice::SliceRange;
    use pretty_assertions::assert_eq;

    const DUET: &str = r#"
title: Duet
parts:
  - id: P1
    name: Trumpet
    measures:
      - { index: 0, duration: 4.0 }
      - { index: 1, duration: 4.0 }
    notes:
      - { measure: 0, onset: 0.0, duration: 1.0, pitch: C5 }
      - { measure: 0, onset: 1.0, duration: 1.0, pitch: D5 }
      - { measure: 1, onset: 0.0, duration: 4.0, pitch: E5 }
    rehearsal-marks:
      - { measure: 1, label: A }
  - id: P2
    name: Piano
    measures:
      - { index: 0, duration: 4.0 }
      - { index: 1, duration: 4.0 }
    notes:
      - { measure: 0, onset: 0.0, duration: 4.0, pitch: C3 }
"#;

    fn duet() -> Score {
        serde_yaml::from_str(DUET).unwrap()
    }

    #[test]
    fn test_auto_mode_colors_ungrouped_and_suggests() {
        let timeline = build_timeline(&duet(), &PipelineConfig::default()).unwrap();
        assert_eq!(timeline.ensemble, Ensemble::Ungrouped);
        assert_eq!(timeline.title.as_deref(), Some("Duet"));

        let suggestion = timeline
            .advisories
            .iter()
            .find_map(|a| match a {
                Advisory::EnsembleSuggestion { suggested, ambiguous, .. } => Some((*suggested, *ambiguous)),
                _ => None,
            })
            .unwrap();
        // trumpet and piano fit both grouped schemes equally
        assert_eq!(suggestion, (Ensemble::Ungrouped, true));
        assert_eq!(timeline.legend.len(), 2);
    }

    #[test]
    fn test_fixed_ensemble_uses_family_colors() {
        let config = PipelineConfig {
            ensemble: EnsembleChoice::Fixed(Ensemble::BigBand),
            ..PipelineConfig::default()
        };
        let timeline = build_timeline(&duet(), &config).unwrap();
        assert_eq!(timeline.ensemble, Ensemble::BigBand);
        assert_eq!(timeline.parts[0].group, "Trumpets");
        assert_eq!(timeline.parts[1].group, "Rhythm Section");
        assert!(timeline.segments.iter().filter(|s| s.voice.part == 0).all(|s| s.color == "#FF6B35"));
        assert!(!timeline
            .advisories
            .iter()
            .any(|a| matches!(a, Advisory::EnsembleSuggestion { .. })));
    }

    #[test]
    fn test_connections_only_when_enabled() {
        let off = build_timeline(&duet(), &PipelineConfig::default()).unwrap();
        assert!(off.connections.is_empty());

        let config = PipelineConfig {
            show_connections: true,
            ..PipelineConfig::default()
        };
        let on = build_timeline(&duet(), &config).unwrap();
        let pairs: Vec<(u8, u8)> = on.connections.iter().map(|e| (e.from_pitch, e.to_pitch)).collect();
        // C5 -> D5; D5 ends at beat 2 and E5 starts at 4
        assert_eq!(pairs, vec![(72, 74)]);
    }

    #[test]
    fn test_rehearsal_marks_and_ticks() {
        let timeline = build_timeline(&duet(), &PipelineConfig::default()).unwrap();
        assert_eq!(
            timeline.rehearsal_marks,
            vec![RehearsalMark { label: "A".into(), beat: 4.0 }]
        );
        assert_eq!(timeline.ticks.labelled(), vec![("1", 0.0), ("2", 4.0)]);
        let bounds = timeline.bounds.unwrap();
        assert_eq!((bounds.min_pitch, bounds.max_pitch), (48, 76));
        assert_eq!(bounds.max_time, 8.0);
    }

    #[test]
    fn test_rehearsal_marks_come_from_first_part() {
        let mut score = duet();
        score.parts[1].rehearsal_marks = std::mem::take(&mut score.parts[0].rehearsal_marks);
        let timeline = build_timeline(&score, &PipelineConfig::default()).unwrap();
        assert!(timeline.rehearsal_marks.is_empty());
    }

    #[test]
    fn test_slice_rebases_geometry() {
        let config = PipelineConfig {
            slice: Some(SliceRange { start: 2, end: 3 }),
            ..PipelineConfig::default()
        };
        let timeline = build_timeline(&duet(), &config).unwrap();
        assert_eq!(timeline.segments.len(), 1);
        assert_eq!((timeline.segments[0].start, timeline.segments[0].end), (0.0, 4.0));
        assert_eq!(timeline.notes.len(), 1);
        assert_eq!(timeline.rehearsal_marks[0].beat, 0.0);
    }

    #[test]
    fn test_bad_slice_fails_before_geometry() {
        let config = PipelineConfig {
            timeline_unit: TimelineUnit::Bar,
            slice: Some(SliceRange { start: 2, end: 9 }),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            build_timeline(&duet(), &config),
            Err(TimelineError::InvalidSliceRange { extent: 2, .. })
        ));
    }

    #[test]
    fn test_empty_score() {
        assert_eq!(
            build_timeline(&Score::default(), &PipelineConfig::default()),
            Err(TimelineError::EmptyScore)
        );
    }

    #[test]
    fn test_only_grace_notes_is_empty() {
        let yaml = r#"
parts:
  - id: P1
    notes:
      - { measure: 0, onset: 0.0, duration: 0.0, pitch: C4 }
"#;
        assert_eq!(
            timeline_from_yaml(yaml, &PipelineConfig::default()),
            Err(TimelineError::EmptyScore)
        );
    }

    #[test]
    fn test_bad_yaml_is_parse_error() {
        assert!(matches!(
            timeline_from_yaml("parts: [{ id: P1, notes: 3 }]", &PipelineConfig::default()),
            Err(TimelineError::ParseError(_))
        ));
    }
}
