//! Live inference loop
//!
//! Each iteration reads one frame from the link, parses, normalizes and
//! scores it, feeds the resulting label to the dwell tracker and writes any
//! command the tracker returns. Bad frames are logged and skipped; link
//! failures end the loop. Whatever ends the loop, a final `STOP` is written
//! so the actuator is never left vibrating.

use crate::channel::{ChannelError, SerialChannel};
use crate::classifier::PostureClassifier;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::frame::{self, ParseFailure};
use crate::normalizer::Normalizer;
use crate::tracker::PostureStateTracker;
use crate::types::{Command, FeatureVector, PostureLabel};
use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Source of timestamps for the dwell tracker
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock advancing a fixed interval on every reading, for replaying
/// recorded frames at their original sample rate
///
/// Once the next instant would fall outside chrono's range the clock holds
/// at the last instant it returned.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    start: DateTime<Utc>,
    interval: Duration,
    ticks: Cell<i32>,
    last: Cell<DateTime<Utc>>,
}

impl SimulatedClock {
    pub fn new(start: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            start,
            interval,
            ticks: Cell::new(0),
            last: Cell::new(start),
        }
    }

    /// Build a clock from a sample interval in milliseconds
    pub fn from_interval_ms(start: DateTime<Utc>, interval_ms: i64) -> Result<Self, MonitorError> {
        if interval_ms <= 0 {
            return Err(MonitorError::InvalidConfig(format!(
                "frame interval must be positive, got {}ms",
                interval_ms
            )));
        }
        let interval = Duration::try_milliseconds(interval_ms).ok_or_else(|| {
            MonitorError::InvalidConfig(format!("frame interval of {}ms is out of range", interval_ms))
        })?;
        Ok(Self::new(start, interval))
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        let ticks = self.ticks.get();
        let next = self
            .interval
            .checked_mul(ticks)
            .and_then(|offset| self.start.checked_add_signed(offset));
        match next {
            Some(instant) => {
                self.ticks.set(ticks.saturating_add(1));
                self.last.set(instant);
                instant
            }
            None => self.last.get(),
        }
    }
}

/// Cooperative stop request, checked between iterations
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A frame that made it through the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub raw: FeatureVector,
    pub normalized: FeatureVector,
    pub score: f32,
    pub label: PostureLabel,
    pub command: Option<Command>,
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, PartialEq)]
pub enum Iteration {
    /// Read timed out with no complete line
    Idle,
    /// Blank line
    Empty,
    /// Frame discarded
    Rejected(ParseFailure),
    Classified(Classification),
}

/// Why the loop ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    EndOfInput,
}

/// The read, classify, alert loop
pub struct InferenceLoop<C, M, K = SystemClock> {
    channel: C,
    classifier: M,
    normalizer: Normalizer,
    tracker: PostureStateTracker,
    threshold: f32,
    clock: K,
    cancel: CancellationToken,
    session_id: Uuid,
}

impl<C, M> InferenceLoop<C, M, SystemClock>
where
    C: SerialChannel,
    M: PostureClassifier,
{
    /// Create a loop on the wall clock
    pub fn new(channel: C, classifier: M, normalizer: Normalizer, config: &MonitorConfig) -> Self {
        Self {
            channel,
            classifier,
            normalizer,
            tracker: PostureStateTracker::new(config.dwell()),
            threshold: config.threshold,
            clock: SystemClock,
            cancel: CancellationToken::new(),
            session_id: Uuid::new_v4(),
        }
    }
}

impl<C, M, K> InferenceLoop<C, M, K>
where
    C: SerialChannel,
    M: PostureClassifier,
    K: Clock,
{
    /// Swap the clock
    pub fn with_clock<K2: Clock>(self, clock: K2) -> InferenceLoop<C, M, K2> {
        InferenceLoop {
            channel: self.channel,
            classifier: self.classifier,
            normalizer: self.normalizer,
            tracker: self.tracker,
            threshold: self.threshold,
            clock,
            cancel: self.cancel,
            session_id: self.session_id,
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn tracker(&self) -> &PostureStateTracker {
        &self.tracker
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Run one iteration.
    ///
    /// Only link errors are returned; frame problems are reported through
    /// the [`Iteration`] value.
    pub fn step(&mut self) -> Result<Iteration, ChannelError> {
        let line = match self.channel.read_line()? {
            Some(line) => line,
            None => {
                tracing::debug!("No frame before read timeout");
                return Ok(Iteration::Idle);
            }
        };
        // Every received line is one sample, even one that is later skipped
        let now = self.clock.now();

        if line.trim().is_empty() {
            tracing::info!("Empty line received");
            return Ok(Iteration::Empty);
        }

        tracing::info!("Received: {}", line);

        let raw = match frame::parse(&line) {
            Ok(raw) => raw,
            Err(failure) => {
                tracing::warn!(kind = failure.kind().as_str(), "Frame rejected: {}", failure);
                return Ok(Iteration::Rejected(failure));
            }
        };
        tracing::debug!("Raw: {}", raw);

        let normalized = self.normalizer.normalize(&raw);
        tracing::debug!("Normalized and clipped: {}", normalized);

        let score = self.classifier.score(&normalized);
        let label = PostureLabel::from_score(score, self.threshold);
        tracing::info!("Prediction score: {:.4} -> {} posture", score, label.as_str());

        let command = self.tracker.update(label, now);
        if let Some(command) = command {
            if command == Command::Vibrate {
                tracing::warn!(
                    "Vibrating after {}s of bad posture",
                    self.tracker.dwell().num_seconds()
                );
            }
            self.channel.write_bytes(command.as_bytes())?;
        }

        Ok(Iteration::Classified(Classification {
            raw,
            normalized,
            score,
            label,
            command,
        }))
    }

    /// Run until cancelled, out of input, or the link fails.
    ///
    /// A final `STOP` is written on every exit path. If the loop failed and
    /// the final `STOP` fails too, the loop's error is returned.
    pub fn run(&mut self) -> Result<LoopExit, MonitorError> {
        let span = tracing::info_span!("monitor", session = %self.session_id);
        let _enter = span.enter();

        tracing::info!("Posture monitoring started");
        let outcome = self.drive();
        let stop = self.channel.write_bytes(Command::Stop.as_bytes());

        match (outcome, stop) {
            (Ok(exit), Ok(())) => {
                tracing::info!("Posture monitoring stopped ({:?})", exit);
                Ok(exit)
            }
            (Ok(_), Err(stop_err)) => Err(stop_err.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(stop_err)) => {
                tracing::error!("Final STOP could not be sent: {}", stop_err);
                Err(e)
            }
        }
    }

    fn drive(&mut self) -> Result<LoopExit, MonitorError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }

            match self.step() {
                Ok(_) => {}
                Err(ChannelError::Closed) => return Ok(LoopExit::EndOfInput),
                Err(e) => {
                    tracing::error!("Serial link failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
}
