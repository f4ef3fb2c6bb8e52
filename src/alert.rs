// Posture Coach — Alert Engine
//
// Decides when the buzzer sounds.  Continuous monitoring goes through a
// cooldown gate; a one-shot check always signals its outcome.

use std::time::Duration;

use crate::classifier::ClassificationResult;
use crate::config::CoachConfig;
use crate::drivers::buzzer::BeepPattern;

/// Outcome of a one-shot check, as signalled to the wearer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Posture(ClassificationResult),
    /// At least one segment was unavailable.
    SensorFailure,
    /// Vector was complete but the model rejected it.
    ClassifierFailure,
}

/// Pulse timings for each signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPatterns {
    pub beep_on: Duration,
    pub beep_pause: Duration,
}

impl AlertPatterns {
    pub fn from_config(config: &CoachConfig) -> Self {
        Self {
            beep_on: Duration::from_millis(config.beep_on_ms),
            beep_pause: Duration::from_millis(config.beep_pause_ms),
        }
    }

    /// Single pulse for bad posture (continuous alerts use the same one).
    pub fn bad_posture(&self) -> BeepPattern {
        BeepPattern::new(1, self.beep_on, self.beep_pause)
    }

    pub fn good_posture(&self) -> BeepPattern {
        BeepPattern::new(2, self.beep_on, self.beep_pause)
    }

    /// Three short, fast pulses: cannot be mistaken for either verdict.
    pub fn sensor_failure(&self) -> BeepPattern {
        BeepPattern::new(3, Duration::from_millis(50), Duration::from_millis(100))
    }

    /// One-shot signal. Bypasses any cooldown.
    pub fn for_check(&self, outcome: &CheckOutcome) -> BeepPattern {
        match outcome {
            CheckOutcome::Posture(r) if r.is_good => self.good_posture(),
            CheckOutcome::Posture(_) => self.bad_posture(),
            CheckOutcome::SensorFailure | CheckOutcome::ClassifierFailure => self.sensor_failure(),
        }
    }
}

/// Cooldown gate for continuous monitoring. Holds the time of the last alert;
/// a fresh engine (new monitoring session) has none.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    cooldown: Duration,
    last_alert: Option<Duration>,
}

impl AlertEngine {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: None,
        }
    }

    /// Forget the last alert, e.g. when monitoring is re-entered.
    pub fn reset(&mut self) {
        self.last_alert = None;
    }

    pub fn last_alert(&self) -> Option<Duration> {
        self.last_alert
    }

    /// Returns true when a bad-posture alert should be emitted now, and if so
    /// records `now` as the last alert.  Good results never alert and never
    /// touch the timestamp.
    pub fn maybe_alert(&mut self, result: &ClassificationResult, now: Duration) -> bool {
        if result.is_good {
            return false;
        }
        let due = match self.last_alert {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.cooldown,
        };
        if due {
            self.last_alert = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn bad() -> ClassificationResult {
        ClassificationResult::new("sitting_bad")
    }

    fn good() -> ClassificationResult {
        ClassificationResult::new("sitting_good")
    }

    #[test]
    fn one_alert_per_cooldown_window() {
        let mut engine = AlertEngine::new(secs(60));
        assert!(engine.maybe_alert(&bad(), secs(0)));
        assert!(!engine.maybe_alert(&bad(), secs(30)));
        assert!(engine.maybe_alert(&bad(), secs(61)));
        assert_eq!(engine.last_alert(), Some(secs(61)));
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let mut engine = AlertEngine::new(secs(60));
        assert!(engine.maybe_alert(&bad(), secs(5)));
        assert!(engine.maybe_alert(&bad(), secs(65)));
    }

    #[test]
    fn good_results_never_alert_or_reset() {
        let mut engine = AlertEngine::new(secs(60));
        assert!(engine.maybe_alert(&bad(), secs(0)));
        assert!(!engine.maybe_alert(&good(), secs(10)));
        assert_eq!(engine.last_alert(), Some(secs(0)));
        assert!(!engine.maybe_alert(&bad(), secs(20)));

        let mut fresh = AlertEngine::new(secs(60));
        assert!(!fresh.maybe_alert(&good(), secs(0)));
        assert_eq!(fresh.last_alert(), None);
    }

    #[test]
    fn reset_rearms_immediately() {
        let mut engine = AlertEngine::new(secs(60));
        assert!(engine.maybe_alert(&bad(), secs(0)));
        engine.reset();
        assert!(engine.maybe_alert(&bad(), secs(1)));
    }

    #[test]
    fn one_shot_patterns_are_distinct() {
        let patterns = AlertPatterns::from_config(&CoachConfig::default());
        let good = patterns.for_check(&CheckOutcome::Posture(good()));
        let bad = patterns.for_check(&CheckOutcome::Posture(bad()));
        let fail = patterns.for_check(&CheckOutcome::SensorFailure);

        assert_eq!(good.count, 2);
        assert_eq!(bad.count, 1);
        assert_ne!(fail, good);
        assert_ne!(fail, bad);
    }
}
