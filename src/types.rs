//! Core types for the posture monitor
//!
//! These are the values that flow through each stage of the live loop:
//! feature vectors, posture labels, and the outbound actuator commands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of sensor channels in one frame
pub const FEATURE_COUNT: usize = 12;

/// One sample of sensor readings, one finite value per channel.
///
/// Used for both raw and normalized readings; the normalizer maps one to the
/// other without changing the shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Build a vector from exactly `FEATURE_COUNT` finite values.
    ///
    /// Returns `None` if any value is NaN or infinite.
    pub fn new(values: [f64; FEATURE_COUNT]) -> Option<Self> {
        if values.iter().all(|v| v.is_finite()) {
            Some(Self(values))
        } else {
            None
        }
    }

    /// Build a vector from a slice, checking both length and finiteness
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        let array: [f64; FEATURE_COUNT] = values.try_into().ok()?;
        Self::new(array)
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Values as f32, matching the classifier's input tensor
    pub fn to_f32(&self) -> [f32; FEATURE_COUNT] {
        self.0.map(|v| v as f32)
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.4}", v)?;
        }
        write!(f, "]")
    }
}

/// Binary posture classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostureLabel {
    Good,
    Bad,
}

impl PostureLabel {
    /// Derive a label from a classifier score.
    ///
    /// Strictly greater than the threshold is good; anything else, including
    /// a NaN score, is bad.
    pub fn from_score(score: f32, threshold: f32) -> Self {
        if score > threshold {
            PostureLabel::Good
        } else {
            PostureLabel::Bad
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostureLabel::Good => "GOOD",
            PostureLabel::Bad => "BAD",
        }
    }
}

/// Control message sent to the haptic actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Vibrate,
    Stop,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Vibrate => "VIBRATE",
            Command::Stop => "STOP",
        }
    }

    /// Newline-terminated wire encoding
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Command::Vibrate => b"VIBRATE\n",
            Command::Stop => b"STOP\n",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_rejects_non_finite() {
        let mut values = [1.0; FEATURE_COUNT];
        assert!(FeatureVector::new(values).is_some());

        values[4] = f64::NAN;
        assert!(FeatureVector::new(values).is_none());

        values[4] = f64::INFINITY;
        assert!(FeatureVector::new(values).is_none());
    }

    #[test]
    fn test_feature_vector_from_slice_checks_length() {
        assert!(FeatureVector::from_slice(&[1.0; 11]).is_none());
        assert!(FeatureVector::from_slice(&[1.0; 13]).is_none());
        assert!(FeatureVector::from_slice(&[1.0; FEATURE_COUNT]).is_some());
    }

    #[test]
    fn test_label_threshold_is_strict() {
        assert_eq!(PostureLabel::from_score(0.51, 0.5), PostureLabel::Good);
        assert_eq!(PostureLabel::from_score(0.5, 0.5), PostureLabel::Bad);
        assert_eq!(PostureLabel::from_score(0.1, 0.5), PostureLabel::Bad);
        assert_eq!(PostureLabel::from_score(f32::NAN, 0.5), PostureLabel::Bad);
    }

    #[test]
    fn test_command_wire_encoding() {
        assert_eq!(Command::Vibrate.as_bytes(), b"VIBRATE\n");
        assert_eq!(Command::Stop.as_bytes(), b"STOP\n");
        assert_eq!(serde_json::to_string(&Command::Stop).unwrap(), "\"STOP\"");
    }
}
