//! # Error Types
//!
//! This module defines the fatal error types for the timeline pipeline.
//!
//! Every error carries the offending values so callers can report them without
//! re-deriving context. Recoverable irregularities (missing measure durations,
//! orphan tie stops, ambiguous ensembles) are never errors; they are reported as
//! [`Advisory`](crate::geometry::Advisory) entries on the finished timeline.
//!
//! ## Error Types
//! - `EmptyScore` - the score has no sounding notes
//! - `InvalidSliceRange` - slice bounds are reversed or outside the score
//! - `InvalidStaccatoFactor` - staccato factor outside the allowed range
//! - `UnknownEnsemble` - the caller named an ensemble scheme that does not exist
//! - `InvalidNote` - a raw note has a negative or non-finite onset or duration
//! - `InvalidConfig` - configuration values or YAML that cannot be used
//! - `ParseError` - malformed MusicXML or YAML score input
//!
//! ## Usage
//! ```rust
//! use scoreline::{build_timeline, PipelineConfig, Score, TimelineError};
//!
//! let score = Score::default();
//! match build_timeline(&score, &PipelineConfig::default()) {
//!     Ok(timeline) => println!("{} segments", timeline.segments.len()),
//!     Err(TimelineError::EmptyScore) => eprintln!("nothing to draw"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use crate::config::TimelineUnit;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    /// The score yields zero sounding notes.
    ///
    /// # Example
    /// ```
    /// # use scoreline::TimelineError;
    /// assert_eq!(TimelineError::EmptyScore.to_string(), "Score contains no notes");
    /// ```
    #[error("Score contains no notes")]
    EmptyScore,

    /// Slice range that is reversed, starts before 1, or ends past the score.
    ///
    /// `extent` is the number of bars or beats in the score; a valid range
    /// satisfies `1 <= start < end <= extent + 1`.
    ///
    /// # Example
    /// ```
    /// # use scoreline::{TimelineError, TimelineUnit};
    /// let err = TimelineError::InvalidSliceRange {
    ///     start: 4,
    ///     end: 2,
    ///     extent: 8,
    ///     unit: TimelineUnit::Bar,
    /// };
    /// assert_eq!(
    ///     err.to_string(),
    ///     "Invalid slice range 4-2: expected 1 <= start < end <= 9 (score has 8 bars)"
    /// );
    /// ```
    #[error("Invalid slice range {start}-{end}: expected 1 <= start < end <= {} (score has {extent} {unit}s)", .extent + 1)]
    InvalidSliceRange {
        start: u32,
        end: u32,
        extent: u32,
        unit: TimelineUnit,
    },

    /// Staccato factor outside the allowed range.
    ///
    /// # Example
    /// ```
    /// # use scoreline::TimelineError;
    /// let err = TimelineError::InvalidStaccatoFactor { factor: 1.5, min: 0.1, max: 0.9 };
    /// assert_eq!(err.to_string(), "Invalid staccato factor 1.5: must be between 0.1 and 0.9");
    /// ```
    #[error("Invalid staccato factor {factor}: must be between {min} and {max}")]
    InvalidStaccatoFactor { factor: f64, min: f64, max: f64 },

    /// Ensemble scheme name that is not one of the known schemes.
    #[error("Unknown ensemble '{0}': expected auto, orchestra, bigband or ungrouped")]
    UnknownEnsemble(String),

    /// Raw note with an unusable onset or duration.
    ///
    /// # Example
    /// ```
    /// # use scoreline::TimelineError;
    /// let err = TimelineError::InvalidNote {
    ///     part: "P1".to_string(),
    ///     message: "negative duration -1".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "Invalid note in part P1: negative duration -1");
    /// ```
    #[error("Invalid note in part {part}: {message}")]
    InvalidNote { part: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, TimelineError>;
