use std::path::PathBuf;

use thiserror::Error;

use crate::stage::Stage;

// Main application error type

#[derive(Error, Debug)]
pub enum RigError {
    #[error("Browser Error: {0}")]
    Browser(#[from] BrowserError),
    #[error("Stage Error: {0}")]
    Stage(#[from] StageError),
    #[error("Vision Error: {0}")]
    Vision(#[from] VisionError),
    #[error("Marker Error: {0}")]
    Marker(#[from] MarkerError),
    #[error("Job Error: {0}")]
    Job(#[from] JobError),
    #[error("Conversion Error: {0}")]
    Convert(#[from] ConvertError),
    #[error("Credential Error: {0}")]
    Credential(#[from] CredentialError),
    #[error("Artifact Error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Run cancelled by caller")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to discover a debuggable page at {0}: {1}")]
    Endpoint(String, String),
    #[error("Websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("The devtools connection is closed")]
    ConnectionClosed,
    #[error("Devtools protocol error for {method}: {message}")]
    Protocol { method: String, message: String },
    #[error("Unexpected devtools payload for {method}: {detail}")]
    Payload { method: String, detail: String },
    #[error("No element matched selector '{0}'")]
    NoSuchElement(String),
    #[error("Failed to decode screenshot: {0}")]
    ScreenshotDecode(String),
    #[error("HTTP error talking to the devtools endpoint: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(
        "Surface never reached stage {expected:?} (last observed {observed:?}, \
         waited {waited_secs}s), diagnostic capture: {diagnostic:?}"
    )]
    Unresolved {
        expected: Stage,
        observed: Stage,
        waited_secs: u64,
        diagnostic: Option<PathBuf>,
    },
}

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("HTTP error calling the vision model: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Vision API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Failed to parse vision response: {0}")]
    Parse(String),
    #[error("Failed to encode capture for the vision request: {0}")]
    Encode(String),
    #[error("No vision API key in environment variable {0}")]
    MissingApiKey(String),
    #[error(
        "Landmark detection exhausted {attempts} attempt(s); last violations: {last_violations:?}"
    )]
    RetriesExhausted {
        attempts: u32,
        last_violations: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("Expected exactly 8 marker tokens on the surface, found {found}")]
    WrongCount { found: usize },
    #[error("Expected {expected} {role} marker(s), found {found}")]
    WrongCardinality {
        role: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Marker token with unrecognized visual class '{0}'")]
    UnknownDiscriminator(String),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("HTTP error talking to the rigging API: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Job submission rejected: {0}")]
    Submit(String),
    #[error("Rigging job failed: {0}")]
    Failed(String),
    #[error("Rigging job did not reach a terminal state within {waited_secs}s")]
    Timeout { waited_secs: u64 },
    #[error("Rigging API reported unexpected job state '{0}'")]
    UnexpectedState(String),
    #[error("Artifact download failed: {0}")]
    Download(String),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Blender executable not found (set convert.blender_path or BLENDER_PATH)")]
    BlenderNotFound,
    #[error("Unsupported mesh format '{0}'")]
    UnsupportedFormat(String),
    #[error("I/O error during conversion: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blender exited with {code:?}: {stderr_tail}")]
    ExitStatus {
        code: Option<i32>,
        stderr_tail: String,
    },
    #[error("Blender ran past the {0}s conversion timeout")]
    Timeout(u64),
    #[error("Conversion reported success but produced no file at {0}")]
    MissingOutput(PathBuf),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No cached credentials at {0}; run `rigbot login` first")]
    Missing(PathBuf),
    #[error("Cached token expired at {0}; run `rigbot login` again")]
    Expired(chrono::DateTime<chrono::Utc>),
    #[error("Failed to read credential cache: {0}")]
    Io(#[from] std::io::Error),
    #[error("Credential cache is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to write diagnostic artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode diagnostic image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Failed to serialize diagnostic payload: {0}")]
    Json(#[from] serde_json::Error),
}
