//! # chrome-auto
//!
//! Locate a Chrome / Chromium executable on the host and launch it headless
//! with a DevTools WebSocket endpoint, so callers that speak the Chrome
//! DevTools Protocol never have to hard-code browser paths or scrape ports.
//!
//! ## How it works
//!
//! [`locate_chrome`] checks, in order:
//!
//! 1. `CHROME_PATH` — an explicit executable path.
//! 2. Well-known install locations for the current OS.
//! 3. Common executable names on `PATH` (`google-chrome`, `chromium`, …).
//!
//! [`ChromeProcess::launch`] then starts the browser with
//! `--remote-debugging-port=0` and a throwaway profile directory, and scans
//! stderr for the `DevTools listening on ws://…` line Chrome prints once the
//! endpoint is ready. The process is killed when the handle is dropped.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrome_auto::{ChromeProcess, LaunchOptions};
//!
//! # async fn demo() -> Result<(), chrome_auto::ChromeAutoError> {
//! let chrome = ChromeProcess::launch(&LaunchOptions::default()).await?;
//! println!("DevTools endpoint: {}", chrome.websocket_url());
//! chrome.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment variable overrides
//!
//! - `CHROME_PATH` — path to a Chrome/Chromium executable; skips discovery.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable holding an explicit browser executable path.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Executable names tried on `PATH`, most specific first.
const PATH_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "headless_shell",
    "msedge",
];

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-auto operations.
#[derive(Error, Debug)]
pub enum ChromeAutoError {
    /// No executable was found in any of the searched locations.
    #[error("Chrome/Chromium executable not found (searched {searched} locations).\nInstall Chrome or set {CHROME_PATH_ENV}=/path/to/chrome.")]
    NotFound { searched: usize },

    /// An explicitly configured executable does not exist.
    #[error("Chrome executable '{path}' does not exist")]
    ExecutableMissing { path: PathBuf },

    /// The temporary profile directory could not be created.
    #[error("Failed to create browser profile directory: {0}")]
    ProfileDir(#[source] std::io::Error),

    /// The OS refused to start the process.
    #[error("Failed to spawn '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The browser exited before announcing its DevTools endpoint.
    #[error("Chrome exited before the DevTools endpoint was ready.\nLast output:\n{stderr}")]
    ExitedEarly { stderr: String },

    /// The DevTools endpoint was not announced within the launch timeout.
    #[error("Chrome did not report a DevTools endpoint within {secs}s")]
    Timeout { secs: u64 },

    /// Waiting on or killing the process failed.
    #[error("Chrome process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Discovery ────────────────────────────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Well-known install locations for the current platform.
fn platform_candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();
    match std::env::consts::OS {
        "macos" => {
            let apps = [
                "Google Chrome.app/Contents/MacOS/Google Chrome",
                "Chromium.app/Contents/MacOS/Chromium",
                "Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
                "Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            ];
            for app in apps {
                out.push(Path::new("/Applications").join(app));
                if let Some(home) = dirs::home_dir() {
                    out.push(home.join("Applications").join(app));
                }
            }
        }
        "windows" => {
            let rel = [
                r"Google\Chrome\Application\chrome.exe",
                r"Chromium\Application\chrome.exe",
                r"Microsoft\Edge\Application\msedge.exe",
            ];
            let mut roots: Vec<PathBuf> = ["ProgramFiles", "ProgramFiles(x86)"]
                .iter()
                .filter_map(|v| std::env::var_os(v).map(PathBuf::from))
                .collect();
            if let Some(local) = dirs::data_local_dir() {
                roots.push(local);
            }
            for root in &roots {
                for r in rel {
                    out.push(root.join(r));
                }
            }
        }
        _ => {
            for p in [
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
                "/opt/google/chrome/chrome",
            ] {
                out.push(PathBuf::from(p));
            }
        }
    }
    out
}

/// Executable candidates found by walking `PATH`.
fn path_candidates() -> Vec<PathBuf> {
    let Some(path_var) = std::env::var_os("PATH") else {
        return Vec::new();
    };
    let exe_suffix = std::env::consts::EXE_SUFFIX;
    std::env::split_paths(&path_var)
        .flat_map(|dir| {
            PATH_NAMES
                .iter()
                .map(move |name| dir.join(format!("{name}{exe_suffix}")))
        })
        .collect()
}

/// Locate a browser executable, honouring `explicit` first, then
/// `CHROME_PATH`, then platform and `PATH` discovery.
///
/// The discovered path (not an explicit or `CHROME_PATH` one) is cached for
/// the lifetime of the process; both overrides are re-read on every call.
pub fn locate_chrome(explicit: Option<&Path>) -> Result<PathBuf, ChromeAutoError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ChromeAutoError::ExecutableMissing {
                path: path.to_path_buf(),
            })
        };
    }

    if let Some(env_path) = std::env::var_os(CHROME_PATH_ENV) {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            return Ok(p);
        }
        warn!("{} '{}' not found; falling back to discovery", CHROME_PATH_ENV, p.display());
    }

    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let candidates: Vec<PathBuf> = platform_candidates()
        .into_iter()
        .chain(path_candidates())
        .collect();

    match candidates.iter().find(|p| p.is_file()) {
        Some(found) => {
            debug!("Located browser at {}", found.display());
            let _ = RESOLVED_PATH.set(found.clone());
            Ok(found.clone())
        }
        None => Err(ChromeAutoError::NotFound {
            searched: candidates.len(),
        }),
    }
}

/// Returns `true` if a browser executable can be located on this host.
pub fn is_chrome_available() -> bool {
    locate_chrome(None).is_ok()
}

// ── Launch ───────────────────────────────────────────────────────────────────

/// Options controlling how the browser process is started.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Explicit executable; discovered via [`locate_chrome`] when `None`.
    pub executable: Option<PathBuf>,
    /// Run without a visible window. Default: true.
    pub headless: bool,
    /// Pass `--no-sandbox` (needed when running as root in containers).
    pub no_sandbox: bool,
    /// Process-wide proxy, e.g. `http://proxy.local:8080`.
    pub proxy_server: Option<String>,
    /// Viewport size in CSS pixels. Default: 1280×1024.
    pub window_size: (u32, u32),
    /// Additional raw command-line switches.
    pub extra_args: Vec<String>,
    /// How long to wait for the DevTools endpoint. Default: 30 s.
    pub launch_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: false,
            proxy_server: None,
            window_size: (1280, 1024),
            extra_args: Vec::new(),
            launch_timeout: Duration::from_secs(30),
        }
    }
}

/// Build the browser command line for `options` and a profile directory.
pub fn launch_args(options: &LaunchOptions, user_data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-popup-blocking".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        format!("--window-size={},{}", options.window_size.0, options.window_size.1),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    if options.no_sandbox {
        args.push("--no-sandbox".to_string());
    }
    if let Some(ref proxy) = options.proxy_server {
        args.push(format!("--proxy-server={proxy}"));
    }
    args.extend(options.extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

static DEVTOOLS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DevTools listening on (ws://\S+)").expect("valid regex"));

/// Extract the WebSocket URL from a line of Chrome's stderr.
pub fn parse_devtools_line(line: &str) -> Option<String> {
    DEVTOOLS_LINE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// A running browser process with a DevTools endpoint.
///
/// The child is spawned with `kill_on_drop`, and the temporary profile is
/// removed when the handle goes away, so a dropped handle never leaks a
/// browser even on panic or task cancellation.
#[derive(Debug)]
pub struct ChromeProcess {
    child: Child,
    ws_url: String,
    executable: PathBuf,
    _profile: TempDir,
}

impl ChromeProcess {
    /// Start a browser and wait until its DevTools endpoint is reachable.
    pub async fn launch(options: &LaunchOptions) -> Result<Self, ChromeAutoError> {
        let executable = locate_chrome(options.executable.as_deref())?;
        let profile = tempfile::Builder::new()
            .prefix("chrome-auto-")
            .tempdir()
            .map_err(ChromeAutoError::ProfileDir)?;
        let args = launch_args(options, profile.path());

        debug!("Launching {} {:?}", executable.display(), args);
        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ChromeAutoError::Spawn {
                path: executable.clone(),
                source,
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ChromeAutoError::ExitedEarly {
                stderr: "stderr unavailable".to_string(),
            })?;
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: Vec<String> = Vec::new();

        let scan = async {
            while let Some(line) = lines.next_line().await? {
                if let Some(url) = parse_devtools_line(&line) {
                    return Ok(Some(url));
                }
                trace!("chrome: {}", line);
                tail.push(line);
                if tail.len() > 20 {
                    tail.remove(0);
                }
            }
            Ok::<_, std::io::Error>(None)
        };

        let found = match tokio::time::timeout(options.launch_timeout, scan).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(ChromeAutoError::Timeout {
                    secs: options.launch_timeout.as_secs(),
                })
            }
        };

        let Some(ws_url) = found else {
            return Err(ChromeAutoError::ExitedEarly {
                stderr: tail.join("\n"),
            });
        };

        // Keep draining stderr so a chatty browser never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("chrome: {}", line);
            }
        });

        info!("Chrome ready (pid {:?}) at {}", child.id(), ws_url);
        Ok(Self {
            child,
            ws_url,
            executable,
            _profile: profile,
        })
    }

    /// Browser-level DevTools WebSocket URL.
    pub fn websocket_url(&self) -> &str {
        &self.ws_url
    }

    /// Executable the process was started from.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Stop the browser and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<(), ChromeAutoError> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(status) => {
                debug!("Chrome exited: {:?}", status?);
            }
            Err(_) => {
                self.child.start_kill()?;
                let status = self.child.wait().await?;
                debug!("Chrome killed: {:?}", status);
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
