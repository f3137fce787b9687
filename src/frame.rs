//! Sensor frame parsing
//!
//! A frame is one line of comma-separated decimal readings, one per sensor
//! channel. Parsing never fails loudly: every line yields either a feature
//! vector or a [`ParseFailure`] describing why it was discarded.

use crate::types::{FeatureVector, FEATURE_COUNT};
use serde::Serialize;
use thiserror::Error;

/// Why a frame was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailureKind {
    Empty,
    Malformed,
    WrongArity,
}

impl ParseFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseFailureKind::Empty => "empty",
            ParseFailureKind::Malformed => "malformed",
            ParseFailureKind::WrongArity => "wrong_arity",
        }
    }
}

/// A rejected frame
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error("empty frame")]
    Empty,

    #[error("malformed token {token:?} at field {index}: {reason}")]
    Malformed {
        index: usize,
        token: String,
        reason: String,
    },

    #[error("expected {} fields, got {0}", FEATURE_COUNT)]
    WrongArity(usize),
}

impl ParseFailure {
    pub fn kind(&self) -> ParseFailureKind {
        match self {
            ParseFailure::Empty => ParseFailureKind::Empty,
            ParseFailure::Malformed { .. } => ParseFailureKind::Malformed,
            ParseFailure::WrongArity(_) => ParseFailureKind::WrongArity,
        }
    }
}

/// Parse one frame into a feature vector.
///
/// Every token is checked before the field count, so a short line with an
/// unparseable token reports [`ParseFailure::Malformed`].
pub fn parse(line: &str) -> Result<FeatureVector, ParseFailure> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let mut values = Vec::with_capacity(FEATURE_COUNT);
    for (index, token) in trimmed.split(',').enumerate() {
        let token = token.trim();
        let value = token
            .parse::<f64>()
            .map_err(|e| ParseFailure::Malformed {
                index,
                token: token.to_string(),
                reason: e.to_string(),
            })?;

        if !value.is_finite() {
            return Err(ParseFailure::Malformed {
                index,
                token: token.to_string(),
                reason: "value is not finite".to_string(),
            });
        }

        values.push(value);
    }

    FeatureVector::from_slice(&values).ok_or(ParseFailure::WrongArity(values.len()))
}
