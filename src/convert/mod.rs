//! Mesh format conversion via a headless Blender subprocess.
//!
//! Blender is treated as an opaque tool: it either produces the output file
//! or the step fails loudly with the captured stderr tail, keeping the
//! source artifact intact.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConvertError;

const EMBEDDED_CONVERT_PY: &str = include_str!("../../scripts/convert.py");

/// Formats the converter knows how to read and write.
pub const SUPPORTED_FORMATS: &[&str] = &["glb", "gltf", "fbx", "obj", "dae"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Explicit Blender executable, tried before `BLENDER_PATH` and `PATH`.
    pub blender_path: Option<PathBuf>,
    /// On-disk entrypoint override; the embedded script is used otherwise.
    pub script_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            blender_path: None,
            script_path: None,
            timeout_secs: 300,
        }
    }
}

pub struct FormatConverter {
    config: ConverterConfig,
}

struct ResolvedScript {
    path: PathBuf,
    _tempfile: Option<tempfile::NamedTempFile>,
}

impl FormatConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    fn find_blender(&self) -> Result<PathBuf, ConvertError> {
        if let Some(path) = &self.config.blender_path {
            if path.exists() {
                return Ok(path.clone());
            }
        }
        if let Ok(path) = std::env::var("BLENDER_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }
        which::which("blender").map_err(|_| ConvertError::BlenderNotFound)
    }

    fn resolve_script(&self) -> Result<ResolvedScript, ConvertError> {
        if let Some(path) = &self.config.script_path {
            if path.exists() {
                return Ok(ResolvedScript {
                    path: path.clone(),
                    _tempfile: None,
                });
            }
        }
        let mut file = tempfile::Builder::new()
            .prefix("rigbot-convert-")
            .suffix(".py")
            .tempfile()?;
        file.write_all(EMBEDDED_CONVERT_PY.as_bytes())?;
        file.flush()?;
        Ok(ResolvedScript {
            path: file.path().to_path_buf(),
            _tempfile: Some(file),
        })
    }

    pub fn supports(format: &str) -> bool {
        SUPPORTED_FORMATS.contains(&format.to_ascii_lowercase().as_str())
    }

    /// Converts `input` into `output`, whose format is `target_format`
    /// (lowercase extension, e.g. `"fbx"`).
    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        target_format: &str,
    ) -> Result<(), ConvertError> {
        let target_format = target_format.to_ascii_lowercase();
        if !Self::supports(&target_format) {
            return Err(ConvertError::UnsupportedFormat(target_format));
        }
        if let Some(ext) = input.extension().and_then(|e| e.to_str()) {
            if !Self::supports(&ext.to_ascii_lowercase()) {
                return Err(ConvertError::UnsupportedFormat(ext.to_ascii_lowercase()));
            }
        }

        let blender = self.find_blender()?;
        let script = self.resolve_script()?;
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut command = Command::new(&blender);
        command
            .args(["--background", "--factory-startup", "--python"])
            .arg(&script.path)
            .arg("--")
            .arg(input)
            .arg(output)
            .arg(&target_format)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(
            input = %input.display(),
            output = %output.display(),
            %target_format,
            "converting mesh via blender"
        );
        let started = Instant::now();
        let mut child = command.spawn()?;
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() > timeout {
                child.kill()?;
                child.wait()?;
                return Err(ConvertError::Timeout(self.config.timeout_secs));
            }
            std::thread::sleep(Duration::from_millis(200));
        };

        let output_bytes = child.wait_with_output()?;
        if !status.success() {
            let stderr = String::from_utf8_lossy(&output_bytes.stderr);
            return Err(ConvertError::ExitStatus {
                code: status.code(),
                stderr_tail: tail(&stderr, 800),
            });
        }
        if !output.exists() {
            return Err(ConvertError::MissingOutput(output.to_path_buf()));
        }

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "conversion finished");
        Ok(())
    }

    /// Runs a conversion on the blocking pool so the single-threaded
    /// pipeline task is not stalled behind Blender.
    pub async fn convert_async(
        config: ConverterConfig,
        input: PathBuf,
        output: PathBuf,
        target_format: String,
    ) -> Result<(), ConvertError> {
        tokio::task::spawn_blocking(move || {
            FormatConverter::new(config).convert(&input, &output, &target_format)
        })
        .await
        .map_err(|e| ConvertError::Io(std::io::Error::other(e)))?
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim_end();
    match trimmed.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((i, _)) => trimmed[i..].to_string(),
        None => trimmed.to_string(),
    }
}
