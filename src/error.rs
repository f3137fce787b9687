//! Error types for Posture Sentinel

use thiserror::Error;

use crate::channel::ChannelError;

/// Errors that can occur while setting up or running the monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid normalization stats: {0}")]
    InvalidStats(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dataset error: {0}")]
    DatasetError(String),

    #[error("Failed to open serial port {port}: {reason}")]
    SerialOpen { port: String, reason: String },

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl From<csv::Error> for MonitorError {
    fn from(e: csv::Error) -> Self {
        MonitorError::DatasetError(e.to_string())
    }
}
