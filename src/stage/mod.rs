//! Detection of which phase of the external rigging workflow is on screen.
//!
//! Classification is a pure function over a [`SurfaceProbe`] so the rules can
//! be tested against synthetic fixtures; the async [`StageDetector`] wraps it
//! with polling, a single recovery interaction, and diagnostic captures.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::artifacts::DiagnosticSink;
use crate::browser::Surface;
use crate::common::Clock;
use crate::error::{BrowserError, StageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Idle,
    UploadModal,
    Uploading,
    Orient,
    LandmarkPlacement,
    Unknown,
}

/// Structural snapshot of the surface: the textual and element signals the
/// classifier keys on. Inputs are probes, never timers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurfaceProbe {
    pub visible_text: String,
    pub file_input_count: usize,
    pub marker_token_count: usize,
    pub progress_indicator: bool,
}

/// Classifies the current probe into a workflow stage.
///
/// Marker tokens are the strongest signal and win outright; the remaining
/// rules fall through from most to least specific.
pub fn classify(probe: &SurfaceProbe) -> Stage {
    let text = probe.visible_text.to_uppercase();

    if probe.marker_token_count > 0 {
        return Stage::LandmarkPlacement;
    }
    if probe.progress_indicator || text.contains("UPLOADING") || text.contains("PROCESSING") {
        return Stage::Uploading;
    }
    if text.contains("FACING") || text.contains("ORIENTATION") {
        return Stage::Orient;
    }
    if probe.file_input_count > 0 && (text.contains("UPLOAD") || text.contains("SELECT A FILE")) {
        return Stage::UploadModal;
    }
    if text.contains("AUTO-RIGGER") || text.contains("UPLOAD CHARACTER") {
        return Stage::Idle;
    }
    Stage::Unknown
}

#[derive(Debug, Clone, Copy)]
pub struct StageDetectorOptions {
    pub probe_interval: Duration,
    pub max_wait: Duration,
}

impl Default for StageDetectorOptions {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(60),
        }
    }
}

pub struct StageDetector {
    options: StageDetectorOptions,
}

impl StageDetector {
    pub fn new(options: StageDetectorOptions) -> Self {
        Self { options }
    }

    /// Polls the surface until `expected` is confirmed.
    ///
    /// An `unknown` classification triggers exactly one recovery advance
    /// interaction; if the surface still does not resolve within the bounded
    /// wait, the failure carries a diagnostic capture of what was on screen.
    pub async fn await_stage(
        &self,
        surface: &mut dyn Surface,
        expected: Stage,
        clock: &dyn Clock,
        diagnostics: &DiagnosticSink,
    ) -> Result<(), StageError> {
        let started = clock.now();
        let mut recovery_spent = false;
        let mut observed = Stage::Unknown;

        loop {
            match surface.probe().await {
                Ok(probe) => {
                    observed = classify(&probe);
                    debug!(?observed, ?expected, "stage probe");
                    if observed == expected {
                        info!(?expected, "stage confirmed");
                        return Ok(());
                    }
                    if observed == Stage::Unknown && !recovery_spent {
                        recovery_spent = true;
                        warn!("stage unknown, attempting one recovery advance");
                        if let Err(e) = surface.click_advance().await {
                            debug!(error = %e, "recovery advance had nothing to click");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "surface probe failed");
                }
            }

            let waited = (clock.now() - started)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if waited >= self.options.max_wait {
                let diagnostic = save_diagnostic(surface, diagnostics, expected).await;
                return Err(StageError::Unresolved {
                    expected,
                    observed,
                    waited_secs: waited.as_secs(),
                    diagnostic,
                });
            }
            clock.sleep(self.options.probe_interval).await;
        }
    }
}

async fn save_diagnostic(
    surface: &mut dyn Surface,
    diagnostics: &DiagnosticSink,
    expected: Stage,
) -> Option<std::path::PathBuf> {
    let shot: Result<_, BrowserError> = surface.screenshot().await;
    match shot {
        Ok(image) => diagnostics
            .save_capture(&format!("stage-{expected:?}-unresolved"), &image)
            .ok(),
        Err(e) => {
            warn!(error = %e, "could not capture stage diagnostic");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::DynamicImage;

    use super::*;
    use crate::browser::MarkerToken;
    use crate::common::clock::testing::ManualClock;
    use crate::common::{CropRect, Point};

    fn probe(text: &str) -> SurfaceProbe {
        SurfaceProbe {
            visible_text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn marker_tokens_classify_as_landmark_placement() {
        let p = SurfaceProbe {
            visible_text: "PLACE THE MARKERS".to_string(),
            marker_token_count: 8,
            ..Default::default()
        };
        assert_eq!(classify(&p), Stage::LandmarkPlacement);
    }

    #[test]
    fn progress_indicator_classifies_as_uploading() {
        let p = SurfaceProbe {
            progress_indicator: true,
            ..Default::default()
        };
        assert_eq!(classify(&p), Stage::Uploading);
    }

    #[test]
    fn orientation_caption_classifies_as_orient() {
        assert_eq!(
            classify(&probe("Is your character facing towards you?")),
            Stage::Orient
        );
    }

    #[test]
    fn file_input_plus_upload_text_classifies_as_upload_modal() {
        let p = SurfaceProbe {
            visible_text: "UPLOAD A CHARACTER FILE".to_string(),
            file_input_count: 1,
            ..Default::default()
        };
        assert_eq!(classify(&p), Stage::UploadModal);
    }

    #[test]
    fn landing_page_classifies_as_idle() {
        assert_eq!(classify(&probe("AUTO-RIGGER beta")), Stage::Idle);
    }

    #[test]
    fn empty_surface_classifies_as_unknown() {
        assert_eq!(classify(&probe("")), Stage::Unknown);
    }

    #[test]
    fn markers_win_over_other_signals() {
        let p = SurfaceProbe {
            visible_text: "UPLOADING".to_string(),
            marker_token_count: 8,
            progress_indicator: true,
            file_input_count: 1,
        };
        assert_eq!(classify(&p), Stage::LandmarkPlacement);
    }

    /// Surface stub that serves a scripted probe sequence and counts
    /// recovery clicks.
    struct ScriptedSurface {
        probes: Vec<SurfaceProbe>,
        cursor: AtomicUsize,
        advances: Arc<AtomicUsize>,
    }

    impl ScriptedSurface {
        fn new(probes: Vec<SurfaceProbe>) -> Self {
            Self {
                probes,
                cursor: AtomicUsize::new(0),
                advances: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Surface for ScriptedSurface {
        async fn probe(&mut self) -> Result<SurfaceProbe, BrowserError> {
            let i = self.cursor.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .probes
                .get(i)
                .or_else(|| self.probes.last())
                .cloned()
                .unwrap_or_default())
        }

        async fn screenshot(&mut self) -> Result<DynamicImage, BrowserError> {
            Ok(DynamicImage::ImageRgb8(image::ImageBuffer::from_pixel(
                4,
                4,
                image::Rgb([0, 0, 0]),
            )))
        }

        async fn region_of(&mut self, _selector: &str) -> Result<CropRect, BrowserError> {
            Ok(CropRect::new(0, 0, 4, 4))
        }

        async fn marker_tokens(&mut self) -> Result<Vec<MarkerToken>, BrowserError> {
            Ok(Vec::new())
        }

        async fn upload_file(&mut self, _path: &Path) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn click_advance(&mut self) -> Result<(), BrowserError> {
            self.advances.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn character_id(&mut self) -> Result<Option<String>, BrowserError> {
            Ok(None)
        }

        async fn mouse_press(&mut self, _p: Point) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn mouse_move(&mut self, _p: Point) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn mouse_release(&mut self, _p: Point) -> Result<(), BrowserError> {
            Ok(())
        }
    }

    fn detector() -> StageDetector {
        StageDetector::new(StageDetectorOptions {
            probe_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(2),
        })
    }

    fn sink() -> (tempfile::TempDir, DiagnosticSink) {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::create(dir.path(), uuid::Uuid::new_v4()).unwrap();
        (dir, sink)
    }

    #[tokio::test]
    async fn resolves_once_the_expected_stage_appears() {
        let mut surface = ScriptedSurface::new(vec![
            probe("UPLOADING PROCESSING"),
            SurfaceProbe {
                marker_token_count: 8,
                ..Default::default()
            },
        ]);
        let clock = ManualClock::default();
        let (_dir, sink) = sink();
        detector()
            .await_stage(&mut surface, Stage::LandmarkPlacement, &clock, &sink)
            .await
            .unwrap();
        assert_eq!(surface.advances.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_triggers_exactly_one_recovery_advance() {
        let mut surface = ScriptedSurface::new(vec![probe(""), probe(""), probe("")]);
        let clock = ManualClock::default();
        let (_dir, sink) = sink();
        let advances = surface.advances.clone();
        let err = detector()
            .await_stage(&mut surface, Stage::Orient, &clock, &sink)
            .await
            .unwrap_err();

        assert_eq!(advances.load(Ordering::SeqCst), 1);
        match err {
            StageError::Unresolved {
                expected,
                observed,
                diagnostic,
                ..
            } => {
                assert_eq!(expected, Stage::Orient);
                assert_eq!(observed, Stage::Unknown);
                assert!(diagnostic.is_some());
            }
        }
    }

    #[tokio::test]
    async fn recovery_can_unstick_the_surface() {
        let mut surface = ScriptedSurface::new(vec![
            probe(""),
            probe("Is your character facing towards you?"),
        ]);
        let clock = ManualClock::default();
        let (_dir, sink) = sink();
        detector()
            .await_stage(&mut surface, Stage::Orient, &clock, &sink)
            .await
            .unwrap();
        assert_eq!(surface.advances.load(Ordering::SeqCst), 1);
    }
}
