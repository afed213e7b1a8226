//! Minimal Chrome DevTools Protocol client.
//!
//! Speaks to an already-running browser started with
//! `--remote-debugging-port`. One websocket per page target; commands are
//! correlated to responses by id, events arriving in between are drained and
//! logged at debug level.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use image::DynamicImage;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::common::Point;
use crate::error::BrowserError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageTarget {
    #[serde(rename = "type")]
    target_type: String,
    url: String,
    web_socket_debugger_url: Option<String>,
}

pub struct CdpClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl CdpClient {
    /// Discovers the first page target on the given debugging endpoint and
    /// attaches to it.
    pub async fn connect(host: &str, port: u16) -> Result<Self, BrowserError> {
        let endpoint = format!("http://{host}:{port}/json/list");
        let targets: Vec<PageTarget> = reqwest::get(&endpoint).await?.json().await?;

        let ws_url = targets
            .into_iter()
            .find(|t| t.target_type == "page" && t.web_socket_debugger_url.is_some())
            .and_then(|t| {
                debug!(url = %t.url, "attaching to page target");
                t.web_socket_debugger_url
            })
            .ok_or_else(|| {
                BrowserError::Endpoint(endpoint.clone(), "no debuggable page target".into())
            })?;

        let (ws, _) = connect_async(&ws_url).await?;
        let mut client = Self { ws, next_id: 0 };
        client.command("Page.enable", json!({})).await?;
        client.command("Runtime.enable", json!({})).await?;
        Ok(client)
    }

    /// Sends one command and waits for its response, skipping unrelated
    /// protocol events.
    pub async fn command(&mut self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.next_id += 1;
        let id = self.next_id;
        let payload = json!({ "id": id, "method": method, "params": params });
        self.ws.send(Message::Text(payload.to_string())).await?;

        loop {
            let message = self
                .ws
                .next()
                .await
                .ok_or(BrowserError::ConnectionClosed)??;
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => return Err(BrowserError::ConnectionClosed),
                _ => continue,
            };
            let value: Value = serde_json::from_str(&text).map_err(|e| BrowserError::Payload {
                method: method.to_string(),
                detail: e.to_string(),
            })?;

            if value.get("id").and_then(Value::as_u64) != Some(id) {
                if let Some(event) = value.get("method").and_then(Value::as_str) {
                    debug!(event, "devtools event");
                }
                continue;
            }
            if let Some(error) = value.get("error") {
                return Err(BrowserError::Protocol {
                    method: method.to_string(),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                });
            }
            return Ok(value.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    pub async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.command("Page.navigate", json!({ "url": url })).await?;
        Ok(())
    }

    /// Evaluates a javascript expression and returns its by-value result.
    pub async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            return Err(BrowserError::Protocol {
                method: "Runtime.evaluate".to_string(),
                message: exception
                    .get("exception")
                    .and_then(|e| e.get("description"))
                    .and_then(Value::as_str)
                    .unwrap_or("evaluation threw")
                    .to_string(),
            });
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    pub async fn screenshot(&mut self) -> Result<DynamicImage, BrowserError> {
        let result = self
            .command("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Payload {
                method: "Page.captureScreenshot".to_string(),
                detail: "missing data field".to_string(),
            })?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| BrowserError::ScreenshotDecode(e.to_string()))?;
        image::load_from_memory(&bytes).map_err(|e| BrowserError::ScreenshotDecode(e.to_string()))
    }

    /// Attaches a local file to the first node matching `selector`.
    pub async fn set_file_input(
        &mut self,
        selector: &str,
        file: &Path,
    ) -> Result<(), BrowserError> {
        let document = self.command("DOM.getDocument", json!({})).await?;
        let root_id = document
            .pointer("/root/nodeId")
            .and_then(Value::as_u64)
            .ok_or_else(|| BrowserError::Payload {
                method: "DOM.getDocument".to_string(),
                detail: "missing root node id".to_string(),
            })?;

        let node = self
            .command(
                "DOM.querySelector",
                json!({ "nodeId": root_id, "selector": selector }),
            )
            .await?;
        let node_id = node.get("nodeId").and_then(Value::as_u64).unwrap_or(0);
        if node_id == 0 {
            return Err(BrowserError::NoSuchElement(selector.to_string()));
        }

        self.command(
            "DOM.setFileInputFiles",
            json!({ "nodeId": node_id, "files": [file.to_string_lossy()] }),
        )
        .await?;
        Ok(())
    }

    pub async fn dispatch_mouse(
        &mut self,
        event_type: &str,
        position: Point,
        with_button: bool,
    ) -> Result<(), BrowserError> {
        let mut params = json!({
            "type": event_type,
            "x": position.x,
            "y": position.y,
        });
        if with_button {
            params["button"] = json!("left");
            params["clickCount"] = json!(1);
        }
        self.command("Input.dispatchMouseEvent", params).await?;
        Ok(())
    }
}
