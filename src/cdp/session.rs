//! A page target attached over the shared browser connection.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::client::CdpClient;
use super::error::CdpError;
use super::protocol::{CdpEvent, PrintToPdfParams};
use crate::scripts;

/// Bytes requested per `IO.read` when streaming a PDF out of the browser.
const READ_CHUNK: usize = 1 << 20;

pub struct PageSession {
    client: Arc<CdpClient>,
    session_id: String,
}

impl PageSession {
    pub(crate) fn new(client: Arc<CdpClient>, session_id: String) -> Self {
        Self { client, session_id }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a command scoped to this page.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        self.client.call(method, params, Some(&self.session_id)).await
    }

    /// Subscribe to events. Filter with [`CdpEvent::is_for`] and this
    /// session's id.
    pub fn events(&self) -> broadcast::Receiver<CdpEvent> {
        self.client.subscribe()
    }

    pub(crate) async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("Network.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        Ok(())
    }

    pub async fn set_viewport(&self, width: u32, height: u32) -> Result<(), CdpError> {
        self.call(
            "Emulation.setDeviceMetricsOverride",
            Some(json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1,
                "mobile": false,
            })),
        )
        .await?;
        Ok(())
    }

    /// Start navigating. `Err(text)` carries the browser's own failure
    /// reason (DNS, TLS, connection refused, …).
    pub async fn navigate(&self, url: &str) -> Result<Result<(), String>, CdpError> {
        let result = self.call("Page.navigate", Some(json!({ "url": url }))).await?;
        match result.get("errorText").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => Ok(Err(text.to_string())),
            _ => Ok(Ok(())),
        }
    }

    /// Evaluate an expression and return its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception
                .pointer("/exception/description")
                .or_else(|| exception.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(CdpError::JavaScript(text.to_string()));
        }

        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Run one of the [`scripts`] payloads with JSON arguments.
    pub async fn run_script(&self, script: &str, args: &[Value]) -> Result<Value, CdpError> {
        self.evaluate(&scripts::invocation(script, args)).await
    }

    /// Export the page as PDF bytes.
    pub async fn print_to_pdf(&self, params: &PrintToPdfParams) -> Result<Vec<u8>, CdpError> {
        let result = self
            .call("Page.printToPDF", Some(serde_json::to_value(params)?))
            .await?;

        if let Some(handle) = result.get("stream").and_then(Value::as_str) {
            return self.read_stream(handle).await;
        }
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| CdpError::InvalidResponse("printToPDF returned no data".into()))?;
        decode_base64(data)
    }

    async fn read_stream(&self, handle: &str) -> Result<Vec<u8>, CdpError> {
        let mut out = Vec::new();
        loop {
            let chunk = self
                .call("IO.read", Some(json!({ "handle": handle, "size": READ_CHUNK })))
                .await?;
            let data = chunk.get("data").and_then(Value::as_str).unwrap_or("");
            if chunk.get("base64Encoded").and_then(Value::as_bool).unwrap_or(false) {
                out.extend(decode_base64(data)?);
            } else {
                out.extend_from_slice(data.as_bytes());
            }
            if chunk.get("eof").and_then(Value::as_bool).unwrap_or(true) {
                break;
            }
        }
        if let Err(e) = self.call("IO.close", Some(json!({ "handle": handle }))).await {
            debug!("IO.close failed: {}", e);
        }
        trace!("read {} PDF bytes from stream", out.len());
        Ok(out)
    }

    /// Answer proxy authentication challenges for this page with the given
    /// credentials. Interception stops when the returned guard is dropped.
    pub async fn enable_proxy_auth(&self, username: &str, password: &str) -> Result<ProxyAuthGuard, CdpError> {
        // Subscribe before enabling so no paused request is missed.
        let events = self.events();
        self.call(
            "Fetch.enable",
            Some(json!({
                "handleAuthRequests": true,
                "patterns": [{ "urlPattern": "*" }],
            })),
        )
        .await?;

        let task = tokio::spawn(answer_fetch_events(
            self.client.clone(),
            self.session_id.clone(),
            events,
            username.to_string(),
            password.to_string(),
        ));
        Ok(ProxyAuthGuard { task })
    }
}

/// Stops proxy-auth handling on drop.
pub struct ProxyAuthGuard {
    task: JoinHandle<()>,
}

impl Drop for ProxyAuthGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn answer_fetch_events(
    client: Arc<CdpClient>,
    session_id: String,
    mut events: broadcast::Receiver<CdpEvent>,
    username: String,
    password: String,
) {
    loop {
        let event = match events.recv().await {
            Ok(ev) if ev.is_for(&session_id) => ev,
            Ok(_) => continue,
            Err(RecvError::Lagged(n)) => {
                warn!("proxy auth handler missed {} events", n);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(request_id) = event.params.get("requestId").and_then(Value::as_str) else {
            continue;
        };
        let reply = match event.method.as_str() {
            "Fetch.requestPaused" => {
                client
                    .call(
                        "Fetch.continueRequest",
                        Some(json!({ "requestId": request_id })),
                        Some(&session_id),
                    )
                    .await
            }
            "Fetch.authRequired" => {
                debug!("answering proxy auth challenge");
                client
                    .call(
                        "Fetch.continueWithAuth",
                        Some(json!({
                            "requestId": request_id,
                            "authChallengeResponse": {
                                "response": "ProvideCredentials",
                                "username": username,
                                "password": password,
                            },
                        })),
                        Some(&session_id),
                    )
                    .await
            }
            _ => continue,
        };
        if let Err(e) = reply {
            debug!("{} reply failed: {}", event.method, e);
        }
    }
}

fn decode_base64(data: &str) -> Result<Vec<u8>, CdpError> {
    STANDARD
        .decode(data)
        .map_err(|e| CdpError::InvalidResponse(format!("bad base64 payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_base64_roundtrips_pdf_header() {
        assert_eq!(decode_base64("JVBERi0=").unwrap(), b"%PDF-");
        assert!(decode_base64("not base64!").is_err());
    }
}
