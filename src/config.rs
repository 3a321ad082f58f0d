//! # Pipeline Configuration
//!
//! Every tunable value the pipeline reads lives in [`PipelineConfig`], which is
//! passed explicitly through each stage. The pipeline is a pure function of
//! `(Score, PipelineConfig)`.
//!
//! ## YAML
//! [`PipelineConfig::from_yaml`] decodes a [`RawConfig`] (all fields optional,
//! kebab-case) and validates it into the typed struct. Missing fields keep
//! their defaults.
//!
//! ```rust
//! use scoreline::{PipelineConfig, TimelineUnit};
//!
//! let config = PipelineConfig::from_yaml(r#"
//! ensemble: orchestra
//! timeline-unit: beat
//! slice-range: 2-6
//! connections:
//!   max-gap: 2.0
//! "#).unwrap();
//!
//! assert_eq!(config.timeline_unit, TimelineUnit::Beat);
//! assert_eq!(config.connections.max_gap, Some(2.0));
//! assert_eq!(config.staccato_factor, 0.4);
//! ```

use crate::ensemble::EnsembleChoice;
use crate::error::{Result, TimelineError};
use crate::slice::SliceRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_STACCATO_FACTOR: f64 = 0.4;
pub const MIN_STACCATO_FACTOR: f64 = 0.1;
pub const MAX_STACCATO_FACTOR: f64 = 0.9;
pub const DEFAULT_BEATS_PER_MEASURE: f64 = 4.0;

/// Unit used for slice ranges and tick marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineUnit {
    #[default]
    #[serde(alias = "measure")]
    Bar,
    Beat,
}

impl FromStr for TimelineUnit {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" | "measure" => Ok(TimelineUnit::Bar),
            "beat" => Ok(TimelineUnit::Beat),
            other => Err(TimelineError::InvalidConfig(format!(
                "unknown timeline unit '{}': expected bar or beat",
                other
            ))),
        }
    }
}

impl fmt::Display for TimelineUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineUnit::Bar => f.write_str("bar"),
            TimelineUnit::Beat => f.write_str("beat"),
        }
    }
}

/// Styling of connection lines between melodic steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStyle {
    /// Base alpha when `adaptive_alpha` is off.
    pub alpha: f64,
    /// Floor for faded and adaptive alpha.
    pub min_alpha: f64,
    /// Take the base alpha from the destination note's intensity.
    pub adaptive_alpha: bool,
    /// Gap (beats) at which fading begins.
    pub fade_start: f64,
    /// Gap (beats) at which alpha reaches `min_alpha`.
    pub fade_end: f64,
    /// Gaps longer than this produce no edge.
    pub max_gap: Option<f64>,
    /// Connect across rests to the next onset in the voice.
    pub bridge_rests: bool,
    pub line_width: f64,
    pub curvature: f64,
}

impl Default for ConnectionStyle {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            min_alpha: 0.25,
            adaptive_alpha: true,
            fade_start: 4.0,
            fade_end: 8.0,
            max_gap: None,
            bridge_rests: false,
            line_width: 1.0,
            curvature: 0.0,
        }
    }
}

impl ConnectionStyle {
    /// Alpha for an edge with the given gap into a note of the given intensity.
    ///
    /// # Example
    /// ```
    /// # use scoreline::ConnectionStyle;
    /// let style = ConnectionStyle { adaptive_alpha: false, ..ConnectionStyle::default() };
    /// assert_eq!(style.alpha_for(0.0, 1.0), 0.6);
    /// assert!((style.alpha_for(6.0, 1.0) - 0.3).abs() < 1e-9);
    /// assert_eq!(style.alpha_for(20.0, 1.0), 0.25);
    /// ```
    pub fn alpha_for(&self, gap: f64, intensity: f64) -> f64 {
        let base = if self.adaptive_alpha {
            intensity.clamp(self.min_alpha, 1.0)
        } else {
            self.alpha
        };

        if gap <= self.fade_start || self.fade_end <= self.fade_start {
            return base;
        }

        let t = ((gap - self.fade_start) / (self.fade_end - self.fade_start)).clamp(0.0, 1.0);
        (base * (1.0 - t)).max(self.min_alpha)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("alpha", self.alpha), ("min-alpha", self.min_alpha)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TimelineError::InvalidConfig(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if !self.fade_start.is_finite() || self.fade_start < 0.0 {
            return Err(TimelineError::InvalidConfig(format!(
                "fade-start must be a non-negative number of beats, got {}",
                self.fade_start
            )));
        }
        if !self.fade_end.is_finite() || self.fade_end < self.fade_start {
            return Err(TimelineError::InvalidConfig(format!(
                "fade-end ({}) must not be before fade-start ({})",
                self.fade_end, self.fade_start
            )));
        }
        if let Some(max_gap) = self.max_gap {
            if !max_gap.is_finite() || max_gap < 0.0 {
                return Err(TimelineError::InvalidConfig(format!(
                    "max-gap must be a non-negative number of beats, got {}",
                    max_gap
                )));
            }
        }
        if !self.line_width.is_finite() || self.line_width <= 0.0 {
            return Err(TimelineError::InvalidConfig(format!(
                "line-width must be positive, got {}",
                self.line_width
            )));
        }
        if !self.curvature.is_finite() {
            return Err(TimelineError::InvalidConfig(
                "curvature must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything the pipeline can be told.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub ensemble: EnsembleChoice,
    pub staccato_factor: f64,
    pub split_overlaps: bool,
    pub timeline_unit: TimelineUnit,
    /// 1-indexed, end-exclusive range in `timeline_unit`.
    pub slice: Option<SliceRange>,
    pub show_connections: bool,
    pub connections: ConnectionStyle,
    /// Bar length used when nothing in the score states one.
    pub default_beats_per_measure: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ensemble: EnsembleChoice::Auto,
            staccato_factor: DEFAULT_STACCATO_FACTOR,
            split_overlaps: true,
            timeline_unit: TimelineUnit::Bar,
            slice: None,
            show_connections: false,
            connections: ConnectionStyle::default(),
            default_beats_per_measure: DEFAULT_BEATS_PER_MEASURE,
        }
    }
}

impl PipelineConfig {
    /// Decode and validate a YAML configuration document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| TimelineError::InvalidConfig(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Apply a raw document on top of the defaults, then validate.
    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let mut config = Self::default();
        config.merge(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overwrite the fields `raw` sets, leaving the rest untouched.
    pub fn merge(&mut self, raw: RawConfig) -> Result<()> {
        if let Some(ensemble) = &raw.ensemble {
            self.ensemble = ensemble.parse()?;
        }
        if let Some(factor) = raw.staccato_factor {
            self.staccato_factor = factor;
        }
        if let Some(split) = raw.split_overlaps {
            self.split_overlaps = split;
        }
        if let Some(unit) = &raw.timeline_unit {
            self.timeline_unit = unit.parse()?;
        }
        if let Some(range) = &raw.slice_range {
            self.slice = Some(range.parse()?);
        }
        if let Some(show) = raw.show_connections {
            self.show_connections = show;
        }
        if let Some(beats) = raw.default_beats_per_measure {
            self.default_beats_per_measure = beats;
        }
        if let Some(style) = raw.connections {
            let c = &mut self.connections;
            c.alpha = style.alpha.unwrap_or(c.alpha);
            c.min_alpha = style.min_alpha.unwrap_or(c.min_alpha);
            c.adaptive_alpha = style.adaptive_alpha.unwrap_or(c.adaptive_alpha);
            c.fade_start = style.fade_start.unwrap_or(c.fade_start);
            c.fade_end = style.fade_end.unwrap_or(c.fade_end);
            c.max_gap = style.max_gap.or(c.max_gap);
            c.bridge_rests = style.bridge_rests.unwrap_or(c.bridge_rests);
            c.line_width = style.line_width.unwrap_or(c.line_width);
            c.curvature = style.curvature.unwrap_or(c.curvature);
        }
        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_STACCATO_FACTOR..=MAX_STACCATO_FACTOR).contains(&self.staccato_factor) {
            return Err(TimelineError::InvalidStaccatoFactor {
                factor: self.staccato_factor,
                min: MIN_STACCATO_FACTOR,
                max: MAX_STACCATO_FACTOR,
            });
        }
        if !self.default_beats_per_measure.is_finite() || self.default_beats_per_measure <= 0.0 {
            return Err(TimelineError::InvalidConfig(format!(
                "default-beats-per-measure must be positive, got {}",
                self.default_beats_per_measure
            )));
        }
        self.connections.validate()
    }
}

/// Raw configuration for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawConfig {
    pub ensemble: Option<String>,
    pub staccato_factor: Option<f64>,
    pub split_overlaps: Option<bool>,
    pub timeline_unit: Option<String>,
    /// `"A-B"`, 1-indexed and end-exclusive.
    pub slice_range: Option<String>,
    pub show_connections: Option<bool>,
    pub connections: Option<RawConnectionStyle>,
    pub default_beats_per_measure: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawConnectionStyle {
    pub alpha: Option<f64>,
    pub min_alpha: Option<f64>,
    pub adaptive_alpha: Option<bool>,
    pub fade_start: Option<f64>,
    pub fade_end: Option<f64>,
    pub max_gap: Option<f64>,
    pub bridge_rests: Option<bool>,
    pub line_width: Option<f64>,
    pub curvature: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::Ensemble;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ensemble, EnsembleChoice::Auto);
        assert!(config.split_overlaps);
        assert!(!config.show_connections);
        assert_eq!(config.connections.fade_start, 4.0);
        assert_eq!(config.connections.fade_end, 8.0);
    }

    #[test]
    fn test_staccato_factor_out_of_range() {
        for factor in [0.05, 0.95, f64::NAN] {
            let config = PipelineConfig {
                staccato_factor: factor,
                ..PipelineConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(TimelineError::InvalidStaccatoFactor { min, max, .. }) if min == 0.1 && max == 0.9
            ));
        }
    }

    #[test]
    fn test_staccato_factor_bounds_are_inclusive() {
        for factor in [0.1, 0.9] {
            let config = PipelineConfig {
                staccato_factor: factor,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_yaml_overrides() {
        let config = PipelineConfig::from_yaml(
            "ensemble: bigband\nsplit-overlaps: false\nshow-connections: true\nstaccato-factor: 0.5\n",
        )
        .unwrap();
        assert_eq!(config.ensemble, EnsembleChoice::Fixed(Ensemble::BigBand));
        assert!(!config.split_overlaps);
        assert!(config.show_connections);
        assert_eq!(config.staccato_factor, 0.5);
    }

    #[test]
    fn test_yaml_measure_alias_and_slice() {
        let config = PipelineConfig::from_yaml("timeline-unit: measure\nslice-range: 3-5\n").unwrap();
        assert_eq!(config.timeline_unit, TimelineUnit::Bar);
        assert_eq!(config.slice, Some(SliceRange { start: 3, end: 5 }));
    }

    #[test]
    fn test_yaml_unknown_ensemble() {
        let err = PipelineConfig::from_yaml("ensemble: marching-band\n").unwrap_err();
        assert_eq!(err, TimelineError::UnknownEnsemble("marching-band".to_string()));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        assert!(matches!(
            PipelineConfig::from_yaml("colour: red\n"),
            Err(TimelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(PipelineConfig::from_yaml("  \n").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_fade_end_before_start_rejected() {
        let err = PipelineConfig::from_yaml("connections:\n  fade-start: 6\n  fade-end: 2\n").unwrap_err();
        assert!(matches!(err, TimelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_alpha_fades_to_floor() {
        let style = ConnectionStyle::default();
        // adaptive: base is the destination intensity
        assert_eq!(style.alpha_for(1.0, 0.8), 0.8);
        assert_eq!(style.alpha_for(1.0, 0.1), 0.25);
        let halfway = style.alpha_for(6.0, 0.8);
        assert!((halfway - 0.4).abs() < 1e-9);
        assert_eq!(style.alpha_for(8.0, 0.8), 0.25);
        assert_eq!(style.alpha_for(100.0, 0.8), 0.25);
    }
}
