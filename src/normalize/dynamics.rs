//! Dynamics timeline and intensity mapping.
//!
//! A marking stays in force for its voice until the next marking that reaches
//! that voice. Part-wide directions (no voice or staff given) reach every voice.

use crate::geometry::BEAT_EPSILON;
use crate::score::DynamicMark;

pub const MIN_DYNAMIC_LEVEL: f64 = 0.2;
pub const MAX_DYNAMIC_LEVEL: f64 = 1.2;
/// Level before any marking has been seen.
pub const DEFAULT_DYNAMIC_LEVEL: f64 = 0.6;

pub fn clamp_level(level: f64) -> f64 {
    level.clamp(MIN_DYNAMIC_LEVEL, MAX_DYNAMIC_LEVEL)
}

/// Normalized intensity in [0, 1] for a (clamped) dynamic level.
pub fn intensity(level: f64) -> f64 {
    (clamp_level(level) - MIN_DYNAMIC_LEVEL) / (MAX_DYNAMIC_LEVEL - MIN_DYNAMIC_LEVEL)
}

/// Dynamic level implied by a MIDI velocity.
pub fn velocity_level(velocity: u8) -> f64 {
    let normalized = (velocity as f64 / 127.0).clamp(0.0, 1.0);
    MIN_DYNAMIC_LEVEL + normalized * (MAX_DYNAMIC_LEVEL - MIN_DYNAMIC_LEVEL)
}

#[derive(Debug, Clone)]
struct Marking {
    beat: f64,
    staff: Option<u8>,
    voice: Option<u8>,
    mark: DynamicMark,
}

impl Marking {
    fn reaches(&self, staff: u8, voice: u8) -> bool {
        self.staff.map_or(true, |s| s == staff) && self.voice.map_or(true, |v| v == voice)
    }
}

/// Markings of one part, in absolute beats.
#[derive(Debug, Clone, Default)]
pub struct DynamicsTimeline {
    markings: Vec<Marking>,
}

impl DynamicsTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a marking. `None` for staff or voice means "every".
    pub fn add(&mut self, beat: f64, staff: Option<u8>, voice: Option<u8>, mark: DynamicMark) {
        self.markings.push(Marking {
            beat,
            staff,
            voice,
            mark,
        });
    }

    /// Latest marking at or before `beat` that reaches the voice.
    ///
    /// Among markings at the same beat the one added last wins.
    pub fn mark_at(&self, beat: f64, staff: u8, voice: u8) -> Option<DynamicMark> {
        self.markings
            .iter()
            .enumerate()
            .filter(|(_, m)| m.beat <= beat + BEAT_EPSILON && m.reaches(staff, voice))
            .max_by(|(ia, a), (ib, b)| a.beat.total_cmp(&b.beat).then(ia.cmp(ib)))
            .map(|(_, m)| m.mark)
    }

    /// Clamped level for a note: the marking in force, raised by the note's velocity.
    pub fn level_at(&self, beat: f64, staff: u8, voice: u8, velocity: Option<u8>) -> (f64, Option<DynamicMark>) {
        let mark = self.mark_at(beat, staff, voice);
        let mut level = mark.map_or(DEFAULT_DYNAMIC_LEVEL, |m| m.level());
        if let Some(velocity) = velocity {
            level = level.max(velocity_level(velocity));
        }
        (clamp_level(level), mark)
    }
}
