//! Vision-model landmark detection.

pub mod parse;
pub mod prompt;

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::artifacts::DiagnosticSink;
use crate::capture::ViewportCapture;
use crate::error::VisionError;
use crate::landmarks::{Confidence, LandmarkSet};

/// Seam between the acquisition loop and the concrete model client, so the
/// loop is testable with scripted detectors.
#[async_trait]
pub trait LandmarkDetector: Send + Sync {
    async fn detect(
        &self,
        capture: &ViewportCapture,
        attempt: u32,
    ) -> Result<(LandmarkSet, Confidence), VisionError>;
}

#[derive(Debug, Clone, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Landmark detector backed by an Anthropic-style messages endpoint: one
/// base64 PNG plus one text block per request.
pub struct AnthropicVision {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    diagnostics: Option<Arc<DiagnosticSink>>,
}

impl AnthropicVision {
    pub fn new(api_url: String, api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
            model,
            max_tokens,
            diagnostics: None,
        }
    }

    /// Raw responses get written here per attempt when set.
    pub fn with_diagnostics(mut self, sink: Arc<DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    fn encode_png(capture: &ViewportCapture) -> Result<String, VisionError> {
        let mut bytes = Cursor::new(Vec::new());
        capture
            .image()
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|e| VisionError::Encode(e.to_string()))?;
        Ok(BASE64.encode(bytes.into_inner()))
    }
}

#[async_trait]
impl LandmarkDetector for AnthropicVision {
    async fn detect(
        &self,
        capture: &ViewportCapture,
        attempt: u32,
    ) -> Result<(LandmarkSet, Confidence), VisionError> {
        let prompt = prompt::build_landmark_prompt(capture.width(), capture.height(), attempt);
        let image_data = Self::encode_png(capture)?;

        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![json!({
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": image_data,
                        },
                    },
                    { "type": "text", "text": prompt },
                ],
            })],
        };

        debug!(attempt, model = %self.model, "requesting landmark detection");
        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody { error: None });
            return Err(VisionError::Api {
                status: status.as_u16(),
                message: body
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "no error detail".to_string()),
            });
        }

        let body: MessageResponse = response.json().await?;
        let text = body
            .content
            .iter()
            .find(|block| block.content_type == "text")
            .and_then(|block| block.text.as_deref())
            .ok_or_else(|| VisionError::Parse("response has no text block".to_string()))?;

        if let Some(sink) = &self.diagnostics {
            let _ = sink.save_text(&format!("attempt-{attempt}-raw-response"), text);
        }

        parse::parse_landmark_response(text)
    }
}
