//! Asynchronous rigging job lifecycle: submit, poll to a terminal state,
//! download the artifact.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::common::Clock;
use crate::error::JobError;

/// Lifecycle status of the external job.
///
/// `Timeout` is assigned locally when the bounded wait elapses; the external
/// service never reports it, and the parser treats it as unexpected if it
/// ever does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
    Timeout,
}

impl JobState {
    /// Parses a state string as reported by the service.
    pub fn parse_reported(raw: &str) -> Result<JobState, JobError> {
        match raw {
            "queued" => Ok(JobState::Queued),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(JobError::UnexpectedState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    pub message: Option<String>,
}

/// Seam to the external rigging/status API.
#[async_trait]
pub trait RigApi: Send + Sync {
    /// Submits the finalized rig request, returning the opaque job id.
    async fn submit(&self, character_id: &str) -> Result<String, JobError>;
    async fn status(&self, job_id: &str) -> Result<JobStatus, JobError>;
    /// Fetches the completed artifact bytes. Called at most once per job.
    async fn download(&self, job_id: &str) -> Result<Vec<u8>, JobError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// Drives one job from submission to a terminal outcome.
///
/// `failed` and `timeout` are surfaced as fatal without resubmission; retry
/// policy, if any, belongs to the caller of the whole pipeline.
pub struct JobOrchestrator<'a> {
    api: &'a dyn RigApi,
    clock: &'a dyn Clock,
    options: PollOptions,
}

impl<'a> JobOrchestrator<'a> {
    pub fn new(api: &'a dyn RigApi, clock: &'a dyn Clock, options: PollOptions) -> Self {
        Self {
            api,
            clock,
            options,
        }
    }

    pub async fn run(&self, character_id: &str) -> Result<Vec<u8>, JobError> {
        let job_id = self.api.submit(character_id).await?;
        info!(%job_id, "rig job submitted");

        let started = self.clock.now();
        loop {
            let status = self.api.status(&job_id).await?;
            debug!(%job_id, state = ?status.state, "job status");

            match status.state {
                JobState::Completed => {
                    info!(%job_id, "job completed, downloading artifact");
                    return self.api.download(&job_id).await;
                }
                JobState::Failed => {
                    return Err(JobError::Failed(
                        status
                            .message
                            .unwrap_or_else(|| "no failure detail from the service".to_string()),
                    ));
                }
                JobState::Queued | JobState::Processing => {}
                JobState::Timeout => {
                    // Never a service-reported state.
                    return Err(JobError::UnexpectedState("timeout".to_string()));
                }
            }

            let waited = (self.clock.now() - started)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if waited >= self.options.max_wait {
                return Err(JobError::Timeout {
                    waited_secs: waited.as_secs(),
                });
            }
            self.clock.sleep(self.options.interval).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
    result_url: Option<String>,
}

/// HTTP implementation against the rigging service, bearer-authenticated.
pub struct HttpRigApi {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl HttpRigApi {
    pub fn new(api_base: String, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base,
            token,
        }
    }

    async fn status_response(&self, job_id: &str) -> Result<StatusResponse, JobError> {
        let response = self
            .http
            .get(format!("{}/jobs/{job_id}", self.api_base))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(JobError::UnexpectedState(format!(
                "status endpoint returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RigApi for HttpRigApi {
    async fn submit(&self, character_id: &str) -> Result<String, JobError> {
        let response = self
            .http
            .post(format!("{}/rig", self.api_base))
            .bearer_auth(&self.token)
            .json(&json!({ "character_id": character_id }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(JobError::Submit(format!("HTTP {status}: {detail}")));
        }
        let body: SubmitResponse = response.json().await?;
        Ok(body.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, JobError> {
        let body = self.status_response(job_id).await?;
        Ok(JobStatus {
            state: JobState::parse_reported(&body.status)?,
            message: body.message,
        })
    }

    async fn download(&self, job_id: &str) -> Result<Vec<u8>, JobError> {
        // The status payload carries the artifact reference once completed.
        let body = self.status_response(job_id).await?;
        let url = body
            .result_url
            .ok_or_else(|| JobError::Download("completed job has no result url".to_string()))?;
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        if !response.status().is_success() {
            return Err(JobError::Download(format!(
                "artifact fetch returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
