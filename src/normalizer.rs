//! Feature normalization
//!
//! This module standardizes raw sensor frames against statistics captured at
//! training time.
//! - Per-channel mean and scale, loaded once at startup
//! - Zero scales replaced by a small epsilon
//! - Standardized values clipped to a symmetric bound

use crate::error::MonitorError;
use crate::types::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

/// Replacement for a zero scale, so no channel divides by zero
pub const SCALE_EPSILON: f64 = 1e-6;

/// Default clip bound for standardized values
pub const DEFAULT_CLIP: f64 = 3.0;

/// Per-channel mean and scale captured from training data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl NormalizationStats {
    /// Create stats from mean and scale columns.
    ///
    /// Zero scales are replaced with [`SCALE_EPSILON`]; wrong lengths,
    /// negative scales and non-finite values are rejected.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, MonitorError> {
        if mean.len() != FEATURE_COUNT || scale.len() != FEATURE_COUNT {
            return Err(MonitorError::InvalidStats(format!(
                "expected {} mean and scale values, got {} and {}",
                FEATURE_COUNT,
                mean.len(),
                scale.len()
            )));
        }

        if let Some(i) = mean.iter().position(|m| !m.is_finite()) {
            return Err(MonitorError::InvalidStats(format!(
                "mean[{}] is not finite",
                i
            )));
        }

        let mut scale = scale;
        for (i, s) in scale.iter_mut().enumerate() {
            if !s.is_finite() || *s < 0.0 {
                return Err(MonitorError::InvalidStats(format!(
                    "scale[{}] must be finite and non-negative, got {}",
                    i, s
                )));
            }
            if *s == 0.0 {
                *s = SCALE_EPSILON;
            }
        }

        Ok(Self { mean, scale })
    }

    /// Compute stats from training rows: column mean and population
    /// standard deviation.
    pub fn fit(rows: &[FeatureVector]) -> Result<Self, MonitorError> {
        if rows.is_empty() {
            return Err(MonitorError::InvalidStats(
                "cannot fit statistics on an empty dataset".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; FEATURE_COUNT];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.values()) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut scale = vec![0.0; FEATURE_COUNT];
        for row in rows {
            for ((s, v), m) in scale.iter_mut().zip(row.values()).zip(&mean) {
                *s += (v - m).powi(2);
            }
        }
        for s in scale.iter_mut() {
            *s = (*s / n).sqrt();
        }

        Self::new(mean, scale)
    }

    /// Load stats from JSON, re-validating the invariants
    pub fn from_json(json: &str) -> Result<Self, MonitorError> {
        let raw: NormalizationStats = serde_json::from_str(json)?;
        Self::new(raw.mean, raw.scale)
    }

    /// Save stats to JSON
    pub fn to_json(&self) -> Result<String, MonitorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}

/// Normalizer for converting raw frames to standardized, clipped features
#[derive(Debug, Clone)]
pub struct Normalizer {
    stats: NormalizationStats,
    clip: f64,
}

impl Normalizer {
    /// Create a normalizer with the default clip bound
    pub fn new(stats: NormalizationStats) -> Self {
        Self {
            stats,
            clip: DEFAULT_CLIP,
        }
    }

    /// Create a normalizer clipping to `[-clip, clip]`; `clip` must be a
    /// positive finite number
    pub fn with_clip(stats: NormalizationStats, clip: f64) -> Result<Self, MonitorError> {
        if !(clip.is_finite() && clip > 0.0) {
            return Err(MonitorError::InvalidConfig(format!(
                "clip bound must be positive, got {}",
                clip
            )));
        }
        Ok(Self { stats, clip })
    }

    pub fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    pub fn clip(&self) -> f64 {
        self.clip
    }

    /// Standardize and clip a raw frame
    pub fn normalize(&self, raw: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, v) in raw.values().iter().enumerate() {
            let z = (v - self.stats.mean[i]) / self.stats.scale[i];
            out[i] = z.clamp(-self.clip, self.clip);
        }

        // Finite input over a positive scale stays finite after clamping.
        FeatureVector::new(out).unwrap_or(*raw)
    }
}
