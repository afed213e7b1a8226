//! Layered runtime configuration: in-code defaults, an optional TOML file,
//! and `RIGBOT_`-prefixed environment overrides, in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::browser::SurfaceSelectors;
use crate::convert::ConverterConfig;
use crate::interact::DragOptions;
use crate::job::PollOptions;
use crate::landmarks::acquire::AcquireOptions;
use crate::landmarks::validate::Tolerances;
use crate::stage::StageDetectorOptions;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub browser: BrowserSection,
    pub vision: VisionSection,
    pub validator: Tolerances,
    pub interact: InteractSection,
    pub job: JobSection,
    pub convert: ConverterConfig,
    pub credentials: CredentialsSection,
}

impl Configuration {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix("RIGBOT").separator("__"));
        builder.build()?.try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// Devtools endpoint of an already-running browser.
    pub debug_host: String,
    pub debug_port: u16,
    pub workflow_url: String,
    pub selectors: SurfaceSelectors,
    pub stage_probe_interval_ms: u64,
    pub stage_max_wait_secs: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            debug_host: "127.0.0.1".to_string(),
            debug_port: 9222,
            workflow_url: "https://www.mixamo.com/#/?page=1&type=Character".to_string(),
            selectors: SurfaceSelectors::default(),
            stage_probe_interval_ms: 500,
            stage_max_wait_secs: 120,
        }
    }
}

impl BrowserSection {
    pub fn stage_detector_options(&self) -> StageDetectorOptions {
        StageDetectorOptions {
            probe_interval: Duration::from_millis(self.stage_probe_interval_ms),
            max_wait: Duration::from_secs(self.stage_max_wait_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionSection {
    pub api_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub retry_pause_secs: u64,
}

impl Default for VisionSection {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            max_retries: 2,
            retry_pause_secs: 2,
        }
    }
}

impl VisionSection {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    pub fn acquire_options(&self) -> AcquireOptions {
        AcquireOptions {
            max_retries: self.max_retries,
            pause: Duration::from_secs(self.retry_pause_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractSection {
    pub drag_steps: u32,
    pub drag_jitter_px: f64,
    pub settle_ms: u64,
}

impl Default for InteractSection {
    fn default() -> Self {
        Self {
            drag_steps: 12,
            drag_jitter_px: 1.5,
            settle_ms: 400,
        }
    }
}

impl InteractSection {
    pub fn drag_options(&self) -> DragOptions {
        DragOptions {
            steps: self.drag_steps,
            jitter_px: self.drag_jitter_px,
            settle: Duration::from_millis(self.settle_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobSection {
    pub api_base: String,
    /// Format of the artifact the service hands back.
    pub native_format: String,
    /// Format the mesh is converted to before upload.
    pub upload_format: String,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            api_base: "https://www.mixamo.com/api/v1".to_string(),
            native_format: "fbx".to_string(),
            upload_format: "fbx".to_string(),
            poll_interval_secs: 5,
            max_wait_secs: 600,
        }
    }
}

impl JobSection {
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub cache_path: Option<PathBuf>,
}

impl CredentialsSection {
    pub fn resolved_cache_path(&self) -> PathBuf {
        if let Some(path) = &self.cache_path {
            return path.clone();
        }
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".rigbot").join("credentials.json")
    }
}
