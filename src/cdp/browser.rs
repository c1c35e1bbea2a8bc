//! A launched Chrome process plus its DevTools connection.
//!
//! `Browser::launch` acquires both; `close` releases both. If a `Browser` is
//! dropped without `close`, the process is still killed (`kill_on_drop`).

use std::sync::Arc;

use chrome_auto::{ChromeAutoError, ChromeProcess};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use super::client::CdpClient;
use super::error::CdpError;
use super::session::PageSession;
use crate::config::RenderConfig;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error(transparent)]
    Launch(#[from] ChromeAutoError),

    #[error("could not connect to DevTools: {0}")]
    Connect(#[source] CdpError),

    #[error(transparent)]
    Cdp(#[from] CdpError),
}

pub struct Browser {
    process: ChromeProcess,
    client: Arc<CdpClient>,
}

impl Browser {
    /// Start a fresh Chrome with a private profile and connect to it.
    pub async fn launch(config: &RenderConfig) -> Result<Self, BrowserError> {
        let process = ChromeProcess::launch(&config.launch_options()).await?;
        debug!("connecting to {}", process.websocket_url());
        let client = CdpClient::connect(process.websocket_url(), config.protocol_timeout())
            .await
            .map_err(BrowserError::Connect)?;
        Ok(Self { process, client })
    }

    /// Open a blank tab and attach to it.
    pub async fn new_page(&self) -> Result<PageSession, CdpError> {
        let created = self
            .client
            .call("Target.createTarget", Some(json!({ "url": "about:blank" })), None)
            .await?;
        let target_id = str_field(&created, "targetId")?;

        let attached = self
            .client
            .call(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
                None,
            )
            .await?;
        let session_id = str_field(&attached, "sessionId")?;
        debug!("attached to target {} (session {})", target_id, session_id);

        let page = PageSession::new(self.client.clone(), session_id);
        page.enable_domains().await?;
        Ok(page)
    }

    /// Ask Chrome to exit and wait for it.
    pub async fn close(self) {
        if let Err(e) = self.client.call("Browser.close", None, None).await {
            debug!("Browser.close: {}", e);
        }
        self.client.close().await;
        if let Err(e) = self.process.shutdown().await {
            debug!("browser shutdown: {}", e);
        }
    }
}

fn str_field(value: &Value, field: &str) -> Result<String, CdpError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CdpError::InvalidResponse(format!("missing {field}")))
}
