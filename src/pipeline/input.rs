//! Input resolution: read the index page from a local path or an http(s) URL.
//!
//! The page must be UTF-8; anything else is reported as a parse failure
//! rather than decoded lossily, so garbled titles never reach the manifest.

use crate::error::PageBindError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Where the index HTML came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlOrigin {
    File(PathBuf),
    Url(String),
}

/// The loaded index page.
#[derive(Debug, Clone)]
pub struct HtmlSource {
    pub html: String,
    pub origin: HtmlOrigin,
}

impl HtmlSource {
    /// The URL to resolve relative links against when none is given.
    pub fn default_base_url(&self) -> Option<&str> {
        match &self.origin {
            HtmlOrigin::Url(u) => Some(u),
            HtmlOrigin::File(_) => None,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the HTML behind `input`, downloading when it is a URL.
pub async fn load_html(input: &str, timeout_secs: u64) -> Result<HtmlSource, PageBindError> {
    if is_url(input) {
        let html = download_html(input, timeout_secs).await?;
        Ok(HtmlSource {
            html,
            origin: HtmlOrigin::Url(input.to_string()),
        })
    } else {
        let path = PathBuf::from(input);
        let html = read_local(&path).await?;
        Ok(HtmlSource {
            html,
            origin: HtmlOrigin::File(path),
        })
    }
}

async fn read_local(path: &Path) -> Result<String, PageBindError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PageBindError::PermissionDenied { path: path.to_path_buf() });
        }
        Err(_) => return Err(PageBindError::FileNotFound { path: path.to_path_buf() }),
    };
    debug!("Read {} bytes of HTML from {}", bytes.len(), path.display());
    decode_utf8(bytes, &path.display().to_string())
}

async fn download_html(url: &str, timeout_secs: u64) -> Result<String, PageBindError> {
    info!("Downloading index page from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PageBindError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PageBindError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PageBindError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(PageBindError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PageBindError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    decode_utf8(bytes.to_vec(), url)
}

fn decode_utf8(bytes: Vec<u8>, what: &str) -> Result<String, PageBindError> {
    String::from_utf8(bytes).map_err(|e| PageBindError::Parse {
        what: format!("HTML from {what}"),
        detail: format!("not valid UTF-8 ({e})"),
    })
}
