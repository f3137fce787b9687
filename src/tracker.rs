//! Bad-posture dwell tracking
//!
//! Turns a stream of posture labels into actuator commands. A good reading
//! always stops the actuator; a bad reading only triggers a vibration once
//! bad posture has been held for the full dwell time, and again after every
//! further dwell of continuous bad posture.

use crate::types::{Command, PostureLabel};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default continuous bad-posture time before an alert (seconds)
pub const DEFAULT_DWELL_SECS: i64 = 60;

/// Streak state owned by a [`PostureStateTracker`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureState {
    /// Start of the current bad streak, or of the current re-alert window
    pub bad_since: Option<DateTime<Utc>>,
    /// When the last vibration was issued
    pub last_alert: Option<DateTime<Utc>>,
}

impl PostureState {
    pub fn in_bad_streak(&self) -> bool {
        self.bad_since.is_some()
    }
}

/// State machine deciding when to vibrate or stop
#[derive(Debug, Clone)]
pub struct PostureStateTracker {
    state: PostureState,
    dwell: Duration,
}

impl Default for PostureStateTracker {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_DWELL_SECS))
    }
}

impl PostureStateTracker {
    /// Create a tracker with the given dwell threshold
    pub fn new(dwell: Duration) -> Self {
        Self {
            state: PostureState::default(),
            dwell,
        }
    }

    pub fn state(&self) -> &PostureState {
        &self.state
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Feed one classification result and return the command to send, if any.
    ///
    /// `Stop` is returned for every good label, not only when a streak ends.
    pub fn update(&mut self, label: PostureLabel, now: DateTime<Utc>) -> Option<Command> {
        match label {
            PostureLabel::Good => {
                self.state.bad_since = None;
                Some(Command::Stop)
            }
            PostureLabel::Bad => match self.state.bad_since {
                None => {
                    self.state.bad_since = Some(now);
                    None
                }
                Some(since) if now - since >= self.dwell => {
                    self.state.bad_since = Some(now);
                    self.state.last_alert = Some(now);
                    Some(Command::Vibrate)
                }
                Some(_) => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_continuous_bad_posture_realerts_every_dwell() {
        let mut tracker = PostureStateTracker::default();

        assert_eq!(tracker.update(PostureLabel::Bad, at(0)), None);
        assert_eq!(tracker.state().bad_since, Some(at(0)));

        assert_eq!(tracker.update(PostureLabel::Bad, at(59)), None);
        assert_eq!(tracker.state().bad_since, Some(at(0)));

        assert_eq!(
            tracker.update(PostureLabel::Bad, at(60)),
            Some(Command::Vibrate)
        );
        assert_eq!(tracker.state().bad_since, Some(at(60)));
        assert_eq!(tracker.state().last_alert, Some(at(60)));

        assert_eq!(tracker.update(PostureLabel::Bad, at(119)), None);
        assert_eq!(
            tracker.update(PostureLabel::Bad, at(120)),
            Some(Command::Vibrate)
        );
        assert_eq!(tracker.state().last_alert, Some(at(120)));
    }

    #[test]
    fn test_good_posture_clears_streak() {
        let mut tracker = PostureStateTracker::default();

        assert_eq!(tracker.update(PostureLabel::Bad, at(0)), None);
        assert_eq!(
            tracker.update(PostureLabel::Good, at(10)),
            Some(Command::Stop)
        );
        assert!(!tracker.state().in_bad_streak());

        // Fresh streak starting at t=10
        assert_eq!(tracker.update(PostureLabel::Bad, at(10)), None);
        assert_eq!(tracker.state().bad_since, Some(at(10)));
        assert_eq!(tracker.update(PostureLabel::Bad, at(69)), None);
        assert_eq!(
            tracker.update(PostureLabel::Bad, at(70)),
            Some(Command::Vibrate)
        );
    }

    #[test]
    fn test_repeated_good_always_stops() {
        let mut tracker = PostureStateTracker::default();

        for t in 0..200 {
            assert_eq!(
                tracker.update(PostureLabel::Good, at(t)),
                Some(Command::Stop)
            );
        }
        assert_eq!(tracker.state(), &PostureState::default());
    }

    #[test]
    fn test_custom_dwell() {
        let mut tracker = PostureStateTracker::new(Duration::seconds(2));

        assert_eq!(tracker.update(PostureLabel::Bad, at(0)), None);
        assert_eq!(tracker.update(PostureLabel::Bad, at(1)), None);
        assert_eq!(
            tracker.update(PostureLabel::Bad, at(2)),
            Some(Command::Vibrate)
        );
    }

    #[test]
    fn test_long_gap_between_bad_readings_alerts_once() {
        let mut tracker = PostureStateTracker::default();

        assert_eq!(tracker.update(PostureLabel::Bad, at(0)), None);
        // Only one vibration no matter how many dwells elapsed
        assert_eq!(
            tracker.update(PostureLabel::Bad, at(600)),
            Some(Command::Vibrate)
        );
        assert_eq!(tracker.update(PostureLabel::Bad, at(601)), None);
    }
}
