//! Per-run diagnostic artifacts: captures, raw model output, parsed
//! intermediate state. Everything a fatal error needs for post-hoc debugging
//! without re-running the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use image::DynamicImage;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::ArtifactError;

pub struct DiagnosticSink {
    run_dir: PathBuf,
    sequence: AtomicU32,
}

impl DiagnosticSink {
    /// Creates `<base>/<timestamp>-<session-id>/` for this run's artifacts.
    pub fn create(base: &Path, session_id: Uuid) -> Result<Self, ArtifactError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let run_dir = base.join(format!("{stamp}-{session_id}"));
        fs::create_dir_all(&run_dir)?;
        Ok(Self {
            run_dir,
            sequence: AtomicU32::new(0),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn next_path(&self, label: &str, extension: &str) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.run_dir.join(format!("{seq:03}-{label}.{extension}"))
    }

    pub fn save_capture(&self, label: &str, image: &DynamicImage) -> Result<PathBuf, ArtifactError> {
        let path = self.next_path(label, "png");
        image.save(&path)?;
        debug!(path = %path.display(), "saved diagnostic capture");
        Ok(path)
    }

    pub fn save_text(&self, label: &str, contents: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.next_path(label, "txt");
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn save_json<T: Serialize>(&self, label: &str, value: &T) -> Result<PathBuf, ArtifactError> {
        let path = self.next_path(label, "json");
        fs::write(&path, serde_json::to_vec_pretty(value)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_land_in_the_run_directory_in_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::create(dir.path(), Uuid::new_v4()).unwrap();

        let a = sink.save_text("raw-response", "{}").unwrap();
        let b = sink.save_json("violations", &vec!["x".to_string()]).unwrap();

        assert!(a.starts_with(sink.run_dir()));
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("000-"));
        assert!(b.file_name().unwrap().to_str().unwrap().starts_with("001-"));
        assert_eq!(fs::read_to_string(&a).unwrap(), "{}");
    }

    #[test]
    fn captures_are_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::create(dir.path(), Uuid::new_v4()).unwrap();
        let image = DynamicImage::ImageRgb8(image::ImageBuffer::from_pixel(
            8,
            8,
            image::Rgb([10, 20, 30]),
        ));

        let path = sink.save_capture("verify", &image).unwrap();
        assert_eq!(path.extension().unwrap(), "png");
        let reloaded = image::open(&path).unwrap();
        assert_eq!(reloaded.width(), 8);
    }
}
