//! Posture Sentinel - live posture classification with haptic alerts
//!
//! Sentinel reads 12-channel sensor frames over a serial link and classifies
//! each one through a deterministic pipeline: frame parsing → normalization
//! → classifier scoring → dwell tracking → actuator command.
//!
//! ## Modules
//!
//! - **Live loop**: `monitor` drives the pipeline over any `SerialChannel`
//! - **Artifacts**: normalization stats and the dense classifier, both JSON
//! - **Offline tools**: dataset loading, stats fitting and accuracy evaluation

pub mod channel;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod frame;
pub mod monitor;
pub mod normalizer;
pub mod tracker;
pub mod types;

pub use channel::{ChannelError, LineChannel, SerialChannel, TimeoutReader};
pub use classifier::{DenseModel, PostureClassifier};
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use frame::{parse, ParseFailure, ParseFailureKind};
pub use monitor::{
    CancellationToken, Clock, InferenceLoop, Iteration, LoopExit, SimulatedClock, SystemClock,
};
pub use normalizer::{NormalizationStats, Normalizer};
pub use tracker::{PostureState, PostureStateTracker};
pub use types::{Command, FeatureVector, PostureLabel, FEATURE_COUNT};

/// Sentinel version
pub const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");
