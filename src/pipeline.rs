//! End-to-end sequencing of one rig run: credentials, browser session,
//! stage-by-stage workflow driving, landmark acquisition, marker placement,
//! job polling, and the return conversion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::artifacts::DiagnosticSink;
use crate::browser::{CdpClient, CdpSurface, Surface};
use crate::capture::CaptureService;
use crate::config::Configuration;
use crate::convert::FormatConverter;
use crate::credentials::CredentialProvider;
use crate::error::{JobError, RigError, VisionError};
use crate::interact;
use crate::job::{HttpRigApi, JobOrchestrator};
use crate::landmarks::acquire::acquire_landmarks;
use crate::markers::{group_markers, mapping::map_markers};
use crate::session::{Outcome, RigSession};
use crate::stage::{classify, Stage, StageDetector};
use crate::vision::AnthropicVision;
use crate::common::{Clock, TokioClock};
use crate::job::RigApi;

pub struct RunRequest<'a> {
    pub input: &'a Path,
    pub out_dir: &'a Path,
    pub target_format: &'a str,
}

pub struct RigPipeline {
    config: Configuration,
    cancel: CancellationToken,
}

impl RigPipeline {
    pub fn new(config: Configuration, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Runs the whole pipeline for one input mesh. The returned session
    /// always carries a terminal outcome; there is no partial-success mode.
    pub async fn run(&self, request: &RunRequest<'_>) -> RigSession {
        let mut session = RigSession::new();
        info!(session = %session.id, input = %request.input.display(), "rig run started");

        match self.run_inner(request, &mut session).await {
            Ok(()) => {
                info!(session = %session.id, "rig run succeeded");
                session.outcome = Some(Outcome::Success);
            }
            Err(RigError::Job(JobError::Timeout { waited_secs })) => {
                error!(session = %session.id, waited_secs, "rig job timed out");
                session.outcome = Some(Outcome::Timeout);
            }
            Err(e) => {
                error!(session = %session.id, error = %e, "rig run failed");
                session.outcome = Some(Outcome::Failed(e.to_string()));
            }
        }
        session
    }

    async fn run_inner(
        &self,
        request: &RunRequest<'_>,
        session: &mut RigSession,
    ) -> Result<(), RigError> {
        let clock = TokioClock;
        let diagnostics = Arc::new(DiagnosticSink::create(
            &request.out_dir.join("diagnostics"),
            session.id,
        )?);

        let token = CredentialProvider::new(self.config.credentials.resolved_cache_path())
            .token(Utc::now())?;

        // The service only ingests its upload format; convert first when the
        // input is anything else.
        let upload_path = self
            .prepare_upload(request.input, request.out_dir, session)
            .await?;
        self.ensure_live()?;

        let cdp = CdpClient::connect(
            &self.config.browser.debug_host,
            self.config.browser.debug_port,
        )
        .await?;
        let mut surface = CdpSurface::new(cdp, self.config.browser.selectors.clone());
        surface.navigate(&self.config.browser.workflow_url).await?;

        let detector = StageDetector::new(self.config.browser.stage_detector_options());

        // From the landing page the upload modal has to be opened explicitly.
        let probe = surface.probe().await?;
        if classify(&probe) == Stage::Idle {
            surface.click_advance().await?;
        }
        detector
            .await_stage(&mut surface, Stage::UploadModal, &clock, &diagnostics)
            .await?;
        session.confirm_stage(Stage::UploadModal);
        self.ensure_live()?;

        surface.upload_file(&upload_path).await?;
        session.confirm_stage(Stage::Uploading);

        detector
            .await_stage(&mut surface, Stage::Orient, &clock, &diagnostics)
            .await?;
        session.confirm_stage(Stage::Orient);
        session.character_id = surface.character_id().await?;
        surface.click_advance().await?;
        self.ensure_live()?;

        detector
            .await_stage(&mut surface, Stage::LandmarkPlacement, &clock, &diagnostics)
            .await?;
        session.confirm_stage(Stage::LandmarkPlacement);

        let capture =
            CaptureService::capture_region(&mut surface, &self.config.browser.selectors.canvas)
                .await?;
        session.record_artifact(diagnostics.save_capture("landmark-viewport", capture.image())?);

        let api_key = self.config.vision.api_key().ok_or_else(|| {
            VisionError::MissingApiKey(self.config.vision.api_key_env.clone())
        })?;
        let vision = AnthropicVision::new(
            self.config.vision.api_url.clone(),
            api_key,
            self.config.vision.model.clone(),
            self.config.vision.max_tokens,
        )
        .with_diagnostics(diagnostics.clone());

        let validated = acquire_landmarks(
            &vision,
            &capture,
            &self.config.vision.acquire_options(),
            &self.config.validator,
            &clock,
            Some(diagnostics.as_ref()),
        )
        .await?;
        session.landmark_attempts = validated.invocations;
        self.ensure_live()?;

        let tokens = surface.marker_tokens().await?;
        let inventory = group_markers(&tokens)?;
        let plan = map_markers(&inventory, &validated.set, &capture);
        session.record_artifact(diagnostics.save_json("placement-plan", &plan)?);

        interact::place_markers(
            &mut surface,
            &plan,
            &self.config.interact.drag_options(),
            &clock,
            &diagnostics,
        )
        .await?;
        self.ensure_live()?;

        // Hand the placement to the service and leave the browser alone; the
        // rest of the lifecycle is API polling.
        surface.click_advance().await?;
        if session.character_id.is_none() {
            session.character_id = surface.character_id().await?;
        }
        let character_id = session
            .character_id
            .clone()
            .ok_or_else(|| JobError::Submit("service assigned no character id".to_string()))?;

        let api = HttpRigApi::new(self.config.job.api_base.clone(), token);
        let artifact =
            self.poll_job(&api, &clock, &character_id).await?;

        let native = self.write_native_artifact(request, &artifact)?;
        session.record_artifact(native.clone());

        if !request
            .target_format
            .eq_ignore_ascii_case(&self.config.job.native_format)
        {
            let converted = self.convert_artifact(request, &native).await?;
            session.record_artifact(converted);
        }
        Ok(())
    }

    async fn prepare_upload(
        &self,
        input: &Path,
        out_dir: &Path,
        session: &mut RigSession,
    ) -> Result<PathBuf, RigError> {
        let upload_format = self.config.job.upload_format.to_ascii_lowercase();
        let already_matches = input
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&upload_format))
            .unwrap_or(false);
        if already_matches {
            return Ok(input.to_path_buf());
        }

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("character");
        let upload_path = out_dir
            .join("work")
            .join(format!("{stem}.{upload_format}"));
        FormatConverter::convert_async(
            self.config.convert.clone(),
            input.to_path_buf(),
            upload_path.clone(),
            upload_format,
        )
        .await?;
        session.record_artifact(upload_path.clone());
        Ok(upload_path)
    }

    async fn poll_job(
        &self,
        api: &dyn RigApi,
        clock: &dyn Clock,
        character_id: &str,
    ) -> Result<Vec<u8>, RigError> {
        let orchestrator = JobOrchestrator::new(api, clock, self.config.job.poll_options());
        Ok(orchestrator.run(character_id).await?)
    }

    fn write_native_artifact(
        &self,
        request: &RunRequest<'_>,
        bytes: &[u8],
    ) -> Result<PathBuf, RigError> {
        let stem = request
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("character");
        let path = request.out_dir.join(format!(
            "{stem}-rigged.{}",
            self.config.job.native_format
        ));
        std::fs::create_dir_all(request.out_dir).map_err(crate::error::ArtifactError::from)?;
        std::fs::write(&path, bytes).map_err(crate::error::ArtifactError::from)?;
        info!(path = %path.display(), "rigged artifact written");
        Ok(path)
    }

    async fn convert_artifact(
        &self,
        request: &RunRequest<'_>,
        native: &Path,
    ) -> Result<PathBuf, RigError> {
        let target = request.target_format.to_ascii_lowercase();
        let converted = native.with_extension(&target);
        FormatConverter::convert_async(
            self.config.convert.clone(),
            native.to_path_buf(),
            converted.clone(),
            target,
        )
        .await?;
        info!(path = %converted.display(), "artifact converted for delivery");
        Ok(converted)
    }

    fn ensure_live(&self) -> Result<(), RigError> {
        if self.cancel.is_cancelled() {
            return Err(RigError::Cancelled);
        }
        Ok(())
    }
}
