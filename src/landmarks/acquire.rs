//! Bounded landmark acquisition loop: vision detection and geometric
//! validation, retried until a set validates cleanly or attempts run out.

use std::time::Duration;

use tracing::{info, warn};

use crate::artifacts::DiagnosticSink;
use crate::capture::ViewportCapture;
use crate::common::Clock;
use crate::error::VisionError;
use crate::landmarks::validate::{validate, Tolerances};
use crate::landmarks::{Confidence, LandmarkSet};
use crate::vision::LandmarkDetector;

#[derive(Debug, Clone, Copy)]
pub struct AcquireOptions {
    /// Retries after the first attempt; `max_retries = 2` means at most
    /// three detector invocations.
    pub max_retries: u32,
    pub pause: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            max_retries: 2,
            pause: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
pub struct ValidatedLandmarks {
    pub set: LandmarkSet,
    pub confidence: Confidence,
    /// How many detector invocations it took.
    pub invocations: u32,
}

pub async fn acquire_landmarks(
    detector: &dyn LandmarkDetector,
    capture: &ViewportCapture,
    opts: &AcquireOptions,
    tolerances: &Tolerances,
    clock: &dyn Clock,
    diagnostics: Option<&DiagnosticSink>,
) -> Result<ValidatedLandmarks, VisionError> {
    let (width, height) = (capture.width(), capture.height());
    let mut last_violations = Vec::new();

    for attempt in 0..=opts.max_retries {
        if attempt > 0 {
            clock.sleep(opts.pause).await;
        }

        let outcome = detector.detect(capture, attempt).await;
        let (set, confidence) = match outcome {
            Ok(detected) => detected,
            Err(VisionError::Parse(reason)) => {
                // Malformed output is handled exactly like a validation
                // failure: log, record, move to the next attempt.
                warn!(attempt, %reason, "vision response did not parse");
                last_violations = vec![format!("unparseable response: {reason}")];
                if let Some(sink) = diagnostics {
                    let _ = sink.save_json(
                        &format!("attempt-{attempt}-violations"),
                        &last_violations,
                    );
                }
                continue;
            }
            Err(other) => return Err(other),
        };

        if let Some(sink) = diagnostics {
            let _ = sink.save_json(&format!("attempt-{attempt}-landmarks"), &set);
        }

        let violations = validate(&set, width, height, tolerances);
        if violations.is_empty() {
            info!(attempt, %confidence, "landmark set validated");
            return Ok(ValidatedLandmarks {
                set,
                confidence,
                invocations: attempt + 1,
            });
        }

        warn!(
            attempt,
            count = violations.len(),
            "landmark set failed validation"
        );
        if let Some(sink) = diagnostics {
            let _ = sink.save_json(&format!("attempt-{attempt}-violations"), &violations);
        }
        last_violations = violations;
    }

    Err(VisionError::RetriesExhausted {
        attempts: opts.max_retries + 1,
        last_violations,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::common::clock::testing::ManualClock;
    use crate::common::CropRect;
    use crate::landmarks::{Landmark, LandmarkName};

    fn valid_set() -> LandmarkSet {
        LandmarkSet::from_points([
            (LandmarkName::Chin, Landmark::new(400, 80)),
            (LandmarkName::LeftWrist, Landmark::new(650, 150)),
            (LandmarkName::RightWrist, Landmark::new(150, 150)),
            (LandmarkName::LeftElbow, Landmark::new(560, 150)),
            (LandmarkName::RightElbow, Landmark::new(240, 150)),
            (LandmarkName::LeftKnee, Landmark::new(440, 420)),
            (LandmarkName::RightKnee, Landmark::new(360, 420)),
            (LandmarkName::Groin, Landmark::new(400, 300)),
        ])
        .unwrap()
    }

    fn invalid_set() -> LandmarkSet {
        // Chin below the groin.
        LandmarkSet::from_points([
            (LandmarkName::Chin, Landmark::new(400, 500)),
            (LandmarkName::LeftWrist, Landmark::new(650, 150)),
            (LandmarkName::RightWrist, Landmark::new(150, 150)),
            (LandmarkName::LeftElbow, Landmark::new(560, 150)),
            (LandmarkName::RightElbow, Landmark::new(240, 150)),
            (LandmarkName::LeftKnee, Landmark::new(440, 420)),
            (LandmarkName::RightKnee, Landmark::new(360, 420)),
            (LandmarkName::Groin, Landmark::new(400, 300)),
        ])
        .unwrap()
    }

    fn capture() -> ViewportCapture {
        ViewportCapture::for_testing(800, 600, CropRect::new(0, 0, 800, 600))
    }

    struct ScriptedDetector {
        responses: Mutex<Vec<Result<(LandmarkSet, Confidence), VisionError>>>,
        calls: AtomicU32,
    }

    impl ScriptedDetector {
        fn new(responses: Vec<Result<(LandmarkSet, Confidence), VisionError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LandmarkDetector for ScriptedDetector {
        async fn detect(
            &self,
            _capture: &ViewportCapture,
            _attempt: u32,
        ) -> Result<(LandmarkSet, Confidence), VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok((invalid_set(), Confidence::Low))
            } else {
                responses.remove(0)
            }
        }
    }

    fn opts() -> AcquireOptions {
        AcquireOptions {
            max_retries: 2,
            pause: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn exhausting_all_attempts_is_fatal_after_three_invocations() {
        let detector = ScriptedDetector::new(vec![]);
        let clock = ManualClock::default();
        let err = acquire_landmarks(
            &detector,
            &capture(),
            &opts(),
            &Tolerances::default(),
            &clock,
            None,
        )
        .await
        .unwrap_err();

        assert_eq!(detector.calls(), 3);
        match err {
            VisionError::RetriesExhausted {
                attempts,
                last_violations,
            } => {
                assert_eq!(attempts, 3);
                assert!(!last_violations.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn success_on_second_attempt_stops_after_two_invocations() {
        let detector = ScriptedDetector::new(vec![
            Ok((invalid_set(), Confidence::Medium)),
            Ok((valid_set(), Confidence::High)),
        ]);
        let clock = ManualClock::default();
        let result = acquire_landmarks(
            &detector,
            &capture(),
            &opts(),
            &Tolerances::default(),
            &clock,
            None,
        )
        .await
        .unwrap();

        assert_eq!(detector.calls(), 2);
        assert_eq!(result.invocations, 2);
        assert_eq!(result.confidence, Confidence::High);
        // One pause between the two attempts, through the injected clock.
        assert_eq!(clock.sleep_count(), 1);
    }

    #[tokio::test]
    async fn first_attempt_success_never_sleeps() {
        let detector = ScriptedDetector::new(vec![Ok((valid_set(), Confidence::High))]);
        let clock = ManualClock::default();
        let result = acquire_landmarks(
            &detector,
            &capture(),
            &opts(),
            &Tolerances::default(),
            &clock,
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.invocations, 1);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn parse_failure_counts_as_a_failed_attempt() {
        let detector = ScriptedDetector::new(vec![
            Err(VisionError::Parse("no json found".into())),
            Ok((valid_set(), Confidence::Medium)),
        ]);
        let clock = ManualClock::default();
        let result = acquire_landmarks(
            &detector,
            &capture(),
            &opts(),
            &Tolerances::default(),
            &clock,
            None,
        )
        .await
        .unwrap();

        assert_eq!(detector.calls(), 2);
        assert_eq!(result.invocations, 2);
    }

    #[tokio::test]
    async fn transport_errors_abort_immediately() {
        let detector = ScriptedDetector::new(vec![Err(VisionError::Api {
            status: 529,
            message: "overloaded".into(),
        })]);
        let clock = ManualClock::default();
        let err = acquire_landmarks(
            &detector,
            &capture(),
            &opts(),
            &Tolerances::default(),
            &clock,
            None,
        )
        .await
        .unwrap_err();

        assert_eq!(detector.calls(), 1);
        assert!(matches!(err, VisionError::Api { status: 529, .. }));
    }
}
