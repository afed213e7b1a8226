//! Capability interface over the interactive rigging surface.
//!
//! Stage classification, marker mapping, and the interaction simulator all
//! talk to this trait rather than to the devtools protocol directly, so they
//! can be exercised against synthetic fixtures.

use std::path::Path;

use async_trait::async_trait;
use image::DynamicImage;
use serde::Deserialize;
use serde_json::Value;

use crate::browser::CdpClient;
use crate::common::{CropRect, Point};
use crate::error::BrowserError;
use crate::stage::SurfaceProbe;

/// A raw draggable marker token as found on the surface: its visual class
/// string and the center of its bounding box.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerToken {
    pub class: String,
    pub x: f64,
    pub y: f64,
}

#[async_trait]
pub trait Surface: Send {
    /// Cheap structural snapshot used by the stage classifier.
    async fn probe(&mut self) -> Result<SurfaceProbe, BrowserError>;

    async fn screenshot(&mut self) -> Result<DynamicImage, BrowserError>;

    /// Bounding box of the first element matching `selector`, in surface
    /// coordinates.
    async fn region_of(&mut self, selector: &str) -> Result<CropRect, BrowserError>;

    /// All draggable marker tokens currently visible.
    async fn marker_tokens(&mut self) -> Result<Vec<MarkerToken>, BrowserError>;

    async fn upload_file(&mut self, path: &Path) -> Result<(), BrowserError>;

    /// Clicks the surface's primary continue affordance.
    async fn click_advance(&mut self) -> Result<(), BrowserError>;

    /// Character id assigned by the service once an upload is accepted.
    async fn character_id(&mut self) -> Result<Option<String>, BrowserError>;

    async fn mouse_press(&mut self, position: Point) -> Result<(), BrowserError>;
    async fn mouse_move(&mut self, position: Point) -> Result<(), BrowserError>;
    async fn mouse_release(&mut self, position: Point) -> Result<(), BrowserError>;
}

/// Selectors and captions that tie the generic surface operations to the
/// rigger's markup. All overridable from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SurfaceSelectors {
    pub canvas: String,
    pub marker: String,
    pub file_input: String,
    pub progress: String,
    pub advance_captions: Vec<String>,
}

impl Default for SurfaceSelectors {
    fn default() -> Self {
        Self {
            canvas: "canvas".to_string(),
            marker: ".marker-circle".to_string(),
            file_input: "input[type=file]".to_string(),
            progress: ".progress-bar, [role=progressbar]".to_string(),
            advance_captions: vec![
                "NEXT".to_string(),
                "APPLY".to_string(),
                "UPLOAD CHARACTER".to_string(),
                "OK".to_string(),
            ],
        }
    }
}

pub struct CdpSurface {
    cdp: CdpClient,
    selectors: SurfaceSelectors,
}

impl CdpSurface {
    pub fn new(cdp: CdpClient, selectors: SurfaceSelectors) -> Self {
        Self { cdp, selectors }
    }

    pub async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.cdp.navigate(url).await
    }

    fn payload_err(detail: &str) -> BrowserError {
        BrowserError::Payload {
            method: "Runtime.evaluate".to_string(),
            detail: detail.to_string(),
        }
    }
}

#[async_trait]
impl Surface for CdpSurface {
    async fn probe(&mut self) -> Result<SurfaceProbe, BrowserError> {
        let expression = format!(
            r#"(() => {{
                const text = document.body ? document.body.innerText : "";
                return JSON.stringify({{
                    visible_text: text,
                    file_input_count: document.querySelectorAll("{file_input}").length,
                    marker_token_count: document.querySelectorAll("{marker}").length,
                    progress_indicator: document.querySelector("{progress}") !== null,
                }});
            }})()"#,
            file_input = self.selectors.file_input,
            marker = self.selectors.marker,
            progress = self.selectors.progress,
        );
        let value = self.cdp.evaluate(&expression).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| Self::payload_err("probe did not return a string"))?;
        serde_json::from_str(raw).map_err(|e| Self::payload_err(&e.to_string()))
    }

    async fn screenshot(&mut self) -> Result<DynamicImage, BrowserError> {
        self.cdp.screenshot().await
    }

    async fn region_of(&mut self, selector: &str) -> Result<CropRect, BrowserError> {
        let expression = format!(
            r#"(() => {{
                const el = document.querySelector("{selector}");
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return JSON.stringify({{
                    x: Math.max(0, Math.round(r.x)),
                    y: Math.max(0, Math.round(r.y)),
                    width: Math.round(r.width),
                    height: Math.round(r.height),
                }});
            }})()"#
        );
        let value = self.cdp.evaluate(&expression).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| BrowserError::NoSuchElement(selector.to_string()))?;
        serde_json::from_str(raw).map_err(|e| Self::payload_err(&e.to_string()))
    }

    async fn marker_tokens(&mut self) -> Result<Vec<MarkerToken>, BrowserError> {
        let expression = format!(
            r#"(() => {{
                const tokens = [...document.querySelectorAll("{marker}")].map(el => {{
                    const r = el.getBoundingClientRect();
                    return {{
                        class: el.getAttribute("class") || "",
                        x: r.x + r.width / 2,
                        y: r.y + r.height / 2,
                    }};
                }});
                return JSON.stringify(tokens);
            }})()"#,
            marker = self.selectors.marker,
        );
        let value = self.cdp.evaluate(&expression).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| Self::payload_err("marker enumeration did not return a string"))?;
        serde_json::from_str(raw).map_err(|e| Self::payload_err(&e.to_string()))
    }

    async fn upload_file(&mut self, path: &Path) -> Result<(), BrowserError> {
        let selector = self.selectors.file_input.clone();
        self.cdp.set_file_input(&selector, path).await
    }

    async fn click_advance(&mut self) -> Result<(), BrowserError> {
        let captions = serde_json::to_string(&self.selectors.advance_captions)
            .unwrap_or_else(|_| "[]".to_string());
        let expression = format!(
            r#"(() => {{
                const captions = {captions};
                const candidates = [...document.querySelectorAll("button, [role=button]")];
                for (const caption of captions) {{
                    const hit = candidates.find(b =>
                        (b.innerText || "").trim().toUpperCase().includes(caption));
                    if (hit && !hit.disabled) {{ hit.click(); return true; }}
                }}
                return false;
            }})()"#
        );
        let value = self.cdp.evaluate(&expression).await?;
        if value.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(BrowserError::NoSuchElement("advance button".to_string()))
        }
    }

    async fn character_id(&mut self) -> Result<Option<String>, BrowserError> {
        // The rigger exposes the uploaded character's id in its URL fragment
        // once processing starts.
        let value = self
            .cdp
            .evaluate(
                r#"(() => {
                    const match = window.location.hash.match(/character=([0-9a-f-]+)/i);
                    return match ? match[1] : null;
                })()"#,
            )
            .await?;
        Ok(match value {
            Value::String(id) => Some(id),
            _ => None,
        })
    }

    async fn mouse_press(&mut self, position: Point) -> Result<(), BrowserError> {
        self.cdp.dispatch_mouse("mousePressed", position, true).await
    }

    async fn mouse_move(&mut self, position: Point) -> Result<(), BrowserError> {
        self.cdp.dispatch_mouse("mouseMoved", position, false).await
    }

    async fn mouse_release(&mut self, position: Point) -> Result<(), BrowserError> {
        self.cdp.dispatch_mouse("mouseReleased", position, true).await
    }
}
