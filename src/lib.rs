//! # scoreline
//!
//! Turns a parsed musical score into render-ready timeline geometry: one bar
//! per sounding note on a pitch/time grid, split where notes overlap, with
//! optional melodic connection lines, instrument-family colors and axis ticks.
//!
//! ```rust
//! use scoreline::{timeline_from_yaml, PipelineConfig};
//!
//! let timeline = timeline_from_yaml(r#"
//! parts:
//!   - id: P1
//!     name: Cello
//!     notes:
//!       - { measure: 0, onset: 0.0, duration: 4.0, pitch: C3 }
//! "#, &PipelineConfig::default()).unwrap();
//!
//! assert_eq!(timeline.segments.len(), 1);
//! assert_eq!(timeline.window.end, 4.0);
//! ```

pub mod api;
pub mod config;
pub mod connect;
pub mod ensemble;
pub mod error;
pub mod geometry;
pub mod measure_map;
pub mod musicxml;
pub mod normalize;
pub mod score;
pub mod segment;
pub mod slice;

pub use api::{build_timeline, timeline_from_musicxml, timeline_from_yaml};
pub use config::{ConnectionStyle, PipelineConfig, TimelineUnit};
pub use ensemble::{Ensemble, EnsembleChoice};
pub use error::{Result, TimelineError};
pub use geometry::{
    Advisory, ConnectionEdge, EnsembleScore, NoteEvent, Segment, TickSpec, Timeline,
};
pub use score::Score;
pub use slice::SliceRange;
