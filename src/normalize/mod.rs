//! # Note Normalizer
//!
//! Turns one part's raw note events into canonical [`NoteEvent`]s.
//!
//! ## Purpose
//! Raw events describe notation: a long note tied over a barline is several
//! events, transposing instruments are written at the wrong pitch, staccato is
//! a flag. Normalized notes describe sound: one event per sounding note, at
//! concert pitch, placed on the shared measure map, with a sounding duration
//! and a loudness.
//!
//! ## Steps (per part)
//! 1. Place every raw event on the canonical [`MeasureMap`]
//! 2. Shift written pitches by the instrument's transposition
//! 3. Merge tie chains ([`merge_ties`])
//! 4. Shorten staccato notes by the staccato factor
//! 5. Attach intensity from the dynamics in force for the note's voice
//!
//! Transposition happens before tie matching, so every later pitch comparison
//! sees concert pitch.
//!
//! ## Sub-modules
//! - `ties` - tie chain merging
//! - `dynamics` - per-voice dynamics timeline and level/intensity mapping

mod dynamics;
mod ties;


pub use dynamics::{
    clamp_level, intensity, velocity_level, DynamicsTimeline, DEFAULT_DYNAMIC_LEVEL,
    MAX_DYNAMIC_LEVEL, MIN_DYNAMIC_LEVEL,
};
pub use ties::{merge_ties, TieIssue, TieMerge, TimedNote};

use crate::config::{MAX_STACCATO_FACTOR, MIN_STACCATO_FACTOR};
use crate::error::{Result, TimelineError};
use crate::geometry::{Advisory, NoteEvent, VoiceKey, BEAT_EPSILON};
use crate::measure_map::MeasureMap;
use crate::score::{Part, PitchSpace, RawNoteEvent};
use tracing::{debug, warn};

/// Reject raw events that would produce negative or undefined geometry.
pub fn validate_part(part: &Part) -> Result<()> {
    for (index, raw) in part.notes.iter().enumerate() {
        let problem = if !raw.onset.is_finite() || raw.onset < 0.0 {
            Some(format!("note {} has invalid onset {}", index + 1, raw.onset))
        } else if !raw.duration.is_finite() {
            Some(format!("note {} has non-finite duration", index + 1))
        } else if raw.duration < 0.0 {
            Some(format!("note {} has negative duration {}", index + 1, raw.duration))
        } else {
            None
        };

        if let Some(message) = problem {
            return Err(TimelineError::InvalidNote {
                part: part.id.clone(),
                message,
            });
        }
    }
    for decl in &part.measures {
        if let Some(duration) = decl.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(TimelineError::InvalidNote {
                    part: part.id.clone(),
                    message: format!(
                        "measure {} declares invalid duration {}",
                        decl.index + 1,
                        duration
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Concert pitch of a raw event, or `None` when it leaves the MIDI range.
pub fn concert_pitch(raw: &RawNoteEvent, part: &Part) -> Option<u8> {
    let shift = match raw.pitch_space {
        PitchSpace::Written => part.instrument.transposition.semitones(),
        PitchSpace::Sounding => 0,
    };
    u8::try_from(raw.pitch.midi() + shift).ok().filter(|p| *p <= 127)
}

/// Normalize one part against the canonical measure map.
///
/// Note ids are assigned from `first_id` upward in onset order. Recoverable
/// tie problems are returned as advisories.
pub fn normalize_part(
    part_index: usize,
    part: &Part,
    map: &MeasureMap,
    staccato_factor: f64,
    first_id: usize,
) -> Result<(Vec<NoteEvent>, Vec<Advisory>)> {
    let factor = staccato_factor.clamp(MIN_STACCATO_FACTOR, MAX_STACCATO_FACTOR);
    let place = |measure: usize, local: f64| {
        map.absolute_beat(measure, local)
            .ok_or_else(|| TimelineError::InvalidNote {
                part: part.id.clone(),
                message: format!("measure {} is not on the measure map", measure + 1),
            })
    };

    let mut dynamics = DynamicsTimeline::new();
    for direction in &part.dynamics {
        let beat = place(direction.measure, direction.onset)?;
        dynamics.add(beat, direction.staff, direction.voice, direction.mark);
    }

    let mut timed = Vec::with_capacity(part.notes.len());
    let mut grace = 0usize;
    for (index, raw) in part.notes.iter().enumerate() {
        let onset = place(raw.measure, raw.onset)?;
        if let Some(mark) = raw.dynamic {
            dynamics.add(onset, Some(raw.staff), Some(raw.voice), mark);
        }
        if raw.duration <= BEAT_EPSILON {
            grace += 1;
            continue;
        }

        let pitch = concert_pitch(raw, part).ok_or_else(|| TimelineError::InvalidNote {
            part: part.id.clone(),
            message: format!(
                "note {} ({}) is outside the MIDI range at concert pitch",
                index + 1,
                raw.pitch
            ),
        })?;

        timed.push(TimedNote {
            staff: raw.staff,
            voice: raw.voice,
            pitch,
            onset,
            duration: raw.duration,
            tail: raw.duration,
            tie: raw.tie,
            staccato: raw.is_staccato(),
            velocity: raw.velocity,
            sources: vec![index],
        });
    }
    if grace > 0 {
        debug!(part = %part.id, grace, "skipped zero-duration notes");
    }

    let merged = merge_ties(timed);
    let mut advisories = Vec::new();
    for orphan in &merged.orphans {
        warn!(part = %part.id, voice = orphan.voice, onset = orphan.onset, "tie end without tie start");
        advisories.push(Advisory::OrphanTieStop {
            part: part.id.clone(),
            voice: orphan.voice,
            pitch: orphan.pitch,
            onset: orphan.onset,
        });
    }
    for open in &merged.unterminated {
        warn!(part = %part.id, voice = open.voice, onset = open.onset, "tie never closed");
        advisories.push(Advisory::UnterminatedTie {
            part: part.id.clone(),
            voice: open.voice,
            pitch: open.pitch,
            onset: open.onset,
        });
    }

    let notes: Vec<NoteEvent> = merged
        .notes
        .into_iter()
        .enumerate()
        .map(|(offset, note)| {
            let (level, mark) = dynamics.level_at(note.onset, note.staff, note.voice, note.velocity);
            // only the last written note of a tie chain is detached
            let duration = if note.staccato {
                note.duration - note.tail * (1.0 - factor)
            } else {
                note.duration
            };
            NoteEvent {
                id: first_id + offset,
                part_id: part.id.clone(),
                voice: VoiceKey {
                    part: part_index,
                    staff: note.staff,
                    voice: note.voice,
                },
                pitch: note.pitch,
                onset: note.onset,
                duration,
                notated_duration: note.duration,
                intensity: intensity(level),
                dynamic: mark,
                staccato: note.staccato,
                sources: note.sources,
            }
        })
        .collect();

    debug!(part = %part.id, raw = part.notes.len(), notes = notes.len(), "normalized part");
    Ok((notes, advisories))
}
