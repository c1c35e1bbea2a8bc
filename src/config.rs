//! Configuration types for extracting, rendering and merging.
//!
//! Rendering behaviour lives in [`RenderConfig`] (built via
//! [`RenderConfigBuilder`]); batch behaviour in [`BatchConfig`], which embeds
//! a `RenderConfig`. Extraction and merging have small plain structs.
//! Every knob has a documented default so callers set only what they need.

use crate::error::PageBindError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ── Page geometry ────────────────────────────────────────────────────────────

/// A4 paper width in inches.
pub const A4_WIDTH_IN: f64 = 8.27;
/// A4 paper height in inches.
pub const A4_HEIGHT_IN: f64 = 11.69;
/// Margin applied on every side, in inches.
pub const DEFAULT_MARGIN_IN: f64 = 0.4;

/// Proxy used for every request a browser session makes.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy server URL, e.g. `http://proxy.example.com:8080`.
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Credentials to answer proxy auth challenges with, if any.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            (Some(u), None) => Some((u.as_str(), "")),
            _ => None,
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ── Rendering ────────────────────────────────────────────────────────────────

/// How a single page is turned into a PDF.
///
/// Built via [`RenderConfig::builder()`] or [`RenderConfig::default()`].
///
/// # Example
/// ```rust
/// use pagebind::{ProxyConfig, RenderConfig};
///
/// let config = RenderConfig::builder()
///     .navigation_timeout_secs(45)
///     .proxy(ProxyConfig::new("http://proxy.local:3128"))
///     .build()
///     .unwrap();
/// assert_eq!(config.navigation_timeout_secs, 45);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Browser executable. Discovered automatically when `None`.
    pub chrome_path: Option<PathBuf>,

    /// Run the browser headless. Default: true.
    pub headless: bool,

    /// Launch Chrome with `--no-sandbox` (root inside containers). Default: false.
    pub no_sandbox: bool,

    /// Process-level proxy; credentials are answered per page session.
    pub proxy: Option<ProxyConfig>,

    /// Upper bound for load + network idle, in seconds. Default: 30.
    pub navigation_timeout_secs: u64,

    /// How long to wait for an element selector to match, in seconds. Default: 10.
    pub selector_timeout_secs: u64,

    /// Quiet window that defines network idle, in milliseconds. Default: 500.
    pub network_idle_ms: u64,

    /// Requests allowed in flight while still counting as idle. Default: 2.
    pub network_idle_max_inflight: usize,

    /// Time allowed for the browser to start, in seconds. Default: 30.
    pub launch_timeout_secs: u64,

    /// Timeout for any single DevTools call, in seconds. Default: 60.
    pub protocol_timeout_secs: u64,

    /// Paper width in inches. Default: A4.
    pub paper_width_in: f64,

    /// Paper height in inches. Default: A4.
    pub paper_height_in: f64,

    /// Margin on every side in inches. Default: 0.4.
    pub margin_in: f64,

    /// Print CSS backgrounds. Default: true.
    pub print_background: bool,

    /// Viewport used for layout, in CSS pixels. Default: 1280×1024.
    pub viewport: (u32, u32),
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            no_sandbox: false,
            proxy: None,
            navigation_timeout_secs: 30,
            selector_timeout_secs: 10,
            network_idle_ms: 500,
            network_idle_max_inflight: 2,
            launch_timeout_secs: 30,
            protocol_timeout_secs: 60,
            paper_width_in: A4_WIDTH_IN,
            paper_height_in: A4_HEIGHT_IN,
            margin_in: DEFAULT_MARGIN_IN,
            print_background: true,
            viewport: (1280, 1024),
        }
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    pub fn protocol_timeout(&self) -> Duration {
        Duration::from_secs(self.protocol_timeout_secs)
    }

    /// Chrome launch options derived from this config.
    pub fn launch_options(&self) -> chrome_auto::LaunchOptions {
        chrome_auto::LaunchOptions {
            executable: self.chrome_path.clone(),
            headless: self.headless,
            no_sandbox: self.no_sandbox,
            proxy_server: self.proxy.as_ref().map(|p| p.server.clone()),
            window_size: self.viewport,
            extra_args: Vec::new(),
            launch_timeout: Duration::from_secs(self.launch_timeout_secs),
        }
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn no_sandbox(mut self, v: bool) -> Self {
        self.config.no_sandbox = v;
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs;
        self
    }

    pub fn selector_timeout_secs(mut self, secs: u64) -> Self {
        self.config.selector_timeout_secs = secs;
        self
    }

    pub fn network_idle_ms(mut self, ms: u64) -> Self {
        self.config.network_idle_ms = ms;
        self
    }

    pub fn network_idle_max_inflight(mut self, n: usize) -> Self {
        self.config.network_idle_max_inflight = n;
        self
    }

    pub fn launch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.launch_timeout_secs = secs;
        self
    }

    pub fn protocol_timeout_secs(mut self, secs: u64) -> Self {
        self.config.protocol_timeout_secs = secs;
        self
    }

    pub fn paper_size_in(mut self, width: f64, height: f64) -> Self {
        self.config.paper_width_in = width;
        self.config.paper_height_in = height;
        self
    }

    pub fn margin_in(mut self, margin: f64) -> Self {
        self.config.margin_in = margin;
        self
    }

    pub fn print_background(mut self, v: bool) -> Self {
        self.config.print_background = v;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport = (width.max(1), height.max(1));
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, PageBindError> {
        let c = &self.config;
        if c.navigation_timeout_secs == 0 {
            return Err(PageBindError::InvalidConfig(
                "navigation timeout must be ≥ 1s".into(),
            ));
        }
        if c.launch_timeout_secs == 0 || c.protocol_timeout_secs == 0 {
            return Err(PageBindError::InvalidConfig(
                "launch and protocol timeouts must be ≥ 1s".into(),
            ));
        }
        if c.paper_width_in <= 0.0 || c.paper_height_in <= 0.0 {
            return Err(PageBindError::InvalidConfig(format!(
                "paper size must be positive, got {}×{} in",
                c.paper_width_in, c.paper_height_in
            )));
        }
        if c.margin_in < 0.0 || 2.0 * c.margin_in >= c.paper_width_in.min(c.paper_height_in) {
            return Err(PageBindError::InvalidConfig(format!(
                "margin {} in does not fit the paper",
                c.margin_in
            )));
        }
        if let Some(ref proxy) = c.proxy {
            if proxy.server.trim().is_empty() {
                return Err(PageBindError::InvalidConfig("proxy server is empty".into()));
            }
        }
        Ok(self.config)
    }
}

// ── Batch ────────────────────────────────────────────────────────────────────

/// How a whole manifest is rendered.
///
/// # Example
/// ```rust
/// use pagebind::BatchConfig;
///
/// let config = BatchConfig::builder("./data/pdfs")
///     .max_retries(1)
///     .skip_existing(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 1);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Directory the per-page PDFs are written to.
    pub output_dir: PathBuf,

    /// Optional CSS selector; each page is clipped to the matching element.
    pub selector: Option<String>,

    /// Extra attempts for an entry after its first failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Entries rendered at once, each with its own browser. Default: 1.
    pub concurrency: usize,

    /// Leave entries whose PDF already exists (non-empty) alone. Default: true.
    pub skip_existing: bool,

    /// Per-page rendering settings.
    pub render: RenderConfig,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("output_dir", &self.output_dir)
            .field("selector", &self.selector)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .field("skip_existing", &self.skip_existing)
            .field("render", &self.render)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            selector: None,
            max_retries: 3,
            retry_backoff_ms: 1000,
            concurrency: 1,
            skip_existing: true,
            render: RenderConfig::default(),
            progress_callback: None,
        }
    }

    /// Create a new builder writing into `output_dir`.
    pub fn builder(output_dir: impl Into<PathBuf>) -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::new(output_dir),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.config.selector = Some(selector.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn skip_existing(mut self, v: bool) -> Self {
        self.config.skip_existing = v;
        self
    }

    pub fn render(mut self, render: RenderConfig) -> Self {
        self.config.render = render;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, PageBindError> {
        let c = &self.config;
        if c.output_dir.as_os_str().is_empty() {
            return Err(PageBindError::InvalidConfig("output directory is empty".into()));
        }
        if c.concurrency == 0 {
            return Err(PageBindError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if let Some(ref sel) = c.selector {
            if sel.trim().is_empty() {
                return Err(PageBindError::InvalidConfig("selector is empty".into()));
            }
        }
        Ok(self.config)
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// How links are pulled out of the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// CSS selector picking the links. Default: `a[href]`.
    pub link_selector: String,
    /// Drop repeated links (same absolute URL), keeping the first. Default: true.
    pub dedupe: bool,
    /// Record `ul`/`ol` nesting as entry levels. Default: true.
    pub nested: bool,
    /// Download timeout when the index page is a URL, in seconds. Default: 60.
    pub download_timeout_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            link_selector: "a[href]".to_string(),
            dedupe: true,
            nested: true,
            download_timeout_secs: 60,
        }
    }
}

// ── Merging ──────────────────────────────────────────────────────────────────

/// How the merged document is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Document title stored in the PDF Info dictionary.
    pub title: Option<String>,
    /// Compress content streams of the merged file. Default: true.
    pub compress: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            title: None,
            compress: true,
        }
    }
}
