//! CLI binary for pagebind.
//!
//! A thin shim over the library crate: each subcommand maps its flags onto
//! the library's config builders, calls one entry point and prints the
//! result. Only this file turns outcomes into exit codes.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pagebind::manifest::ensure_pdf_suffix;
use pagebind::{
    extract_to_file, inspect_pdf, merge_pdfs, render_page, run, save_pages, BatchConfig, BatchProgressCallback,
    BatchReport, ExtractConfig, Manifest, MergeConfig, MergeReport, OutlineNode, ProgressCallback, ProxyConfig,
    RenderConfig, RenderRequest, RunLayout,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished entry.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us the total.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading manifest…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total} pages…"))
        ));
    }

    fn on_entry_start(&self, index: usize, _total: usize, title: &str) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(index, Instant::now());
        }
        self.bar.set_message(title.to_string());
    }

    fn on_entry_complete(&self, index: usize, total: usize, title: &str) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            title,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_entry_skipped(&self, index: usize, total: usize, title: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            dim("·"),
            index + 1,
            total,
            title,
            dim("exists"),
        ));
        self.bar.inc(1);
    }

    fn on_entry_retry(&self, index: usize, attempt: u32, error: &str) {
        self.bar.println(format!(
            "  {} {:>3}      retry {}  {}",
            yellow("↻"),
            index + 1,
            attempt,
            dim(&truncate(error, 80)),
        ));
    }

    fn on_entry_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} pages ready", green("✔"), bold(&succeeded.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages ready  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    if first_line.chars().count() > max_chars {
        let cut: String = first_line.chars().take(max_chars - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        first_line.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Everything in one go
  pagebind run --html https://docs.example.com/index.html

  # Step by step
  pagebind extract --html toc.html --base-url https://docs.example.com/
  pagebind save --json ./data/extracted_urls.json --selector "div.book"
  pagebind merge --json ./data/extracted_urls.json --title "Example Docs"

  # One page
  pagebind render --url https://example.com --file-name "Example Domain.pdf"

  # Check the result
  pagebind inspect ./data/merged.pdf

ENVIRONMENT VARIABLES:
  CHROME_PATH               Chrome/Chromium executable (skips discovery)
  PAGEBIND_*                Fallback for most flags, e.g. PAGEBIND_SELECTOR
  RUST_LOG                  Override log filtering (e.g. pagebind=debug)

SETUP:
  A Chrome or Chromium install is required for `render`, `save` and `run`.
  Inside containers you usually need --no-sandbox.
"#;

/// Bind the pages linked from an HTML index into one bookmarked PDF.
#[derive(Parser, Debug)]
#[command(
    name = "pagebind",
    version,
    about = "Bind the pages linked from an HTML index into one bookmarked PDF",
    long_about = "Extract the links of a documentation index, print every linked page to PDF \
with headless Chrome, and merge the results in index order with a nested outline.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Chrome/Chromium executable.
    #[arg(long, global = true, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,

    /// Launch Chrome with --no-sandbox (needed in most containers).
    #[arg(long, global = true, env = "PAGEBIND_NO_SANDBOX")]
    no_sandbox: bool,

    /// Page load timeout in seconds.
    #[arg(long, global = true, env = "PAGEBIND_NAV_TIMEOUT", default_value_t = 30)]
    nav_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGEBIND_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAGEBIND_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "PAGEBIND_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract links from an HTML index into a manifest JSON file.
    Extract(ExtractArgs),
    /// Render one URL to a PDF file.
    Render(RenderArgs),
    /// Render every manifest entry to its own PDF.
    Save(SaveArgs),
    /// Merge the rendered PDFs into one bookmarked document.
    Merge(MergeArgs),
    /// Print the page count and outline of a PDF.
    Inspect(InspectArgs),
    /// Extract, save and merge in one go.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Index page: local HTML file or http(s) URL.
    #[arg(long, env = "PAGEBIND_HTML")]
    html: String,

    /// URL relative links resolve against (defaults to --html when it is a URL).
    #[arg(long, env = "PAGEBIND_BASE_URL")]
    base_url: Option<String>,

    /// Manifest output path.
    #[arg(long, env = "PAGEBIND_MANIFEST", default_value = "./data/extracted_urls.json")]
    out: PathBuf,

    #[command(flatten)]
    links: LinkArgs,
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// CSS selector picking the links.
    #[arg(long, env = "PAGEBIND_LINK_SELECTOR", default_value = "a[href]")]
    link_selector: String,

    /// Keep repeated links instead of dropping them.
    #[arg(long, env = "PAGEBIND_KEEP_DUPLICATES")]
    keep_duplicates: bool,

    /// Ignore list nesting; every bookmark becomes top-level.
    #[arg(long, env = "PAGEBIND_FLAT")]
    flat: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAGEBIND_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct BrowserArgs {
    /// Clip each page to the element matching this CSS selector.
    #[arg(long, env = "PAGEBIND_SELECTOR")]
    selector: Option<String>,

    /// Proxy server URL.
    #[arg(long, env = "PAGEBIND_PROXY")]
    proxy: Option<String>,

    /// Proxy username.
    #[arg(long, env = "PAGEBIND_PROXY_USERNAME", requires = "proxy")]
    proxy_username: Option<String>,

    /// Proxy password.
    #[arg(long, env = "PAGEBIND_PROXY_PASSWORD", requires = "proxy_username", hide_env_values = true)]
    proxy_password: Option<String>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Page to render.
    #[arg(long)]
    url: Option<String>,

    /// Output file name.
    #[arg(long, default_value = "output.pdf")]
    file_name: String,

    /// Directory to write the PDF to.
    #[arg(long, env = "PAGEBIND_OUTPUT_DIR", default_value = "./data/pdfs")]
    output_dir: PathBuf,

    #[command(flatten)]
    browser: BrowserArgs,

    /// Print the render result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Extra attempts per failing page.
    #[arg(long, env = "PAGEBIND_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Pages rendered at once (each with its own browser).
    #[arg(short, long, env = "PAGEBIND_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Re-render pages whose PDF already exists.
    #[arg(long, env = "PAGEBIND_FORCE")]
    force: bool,

    #[command(flatten)]
    browser: BrowserArgs,
}

#[derive(Args, Debug)]
struct SaveArgs {
    /// Manifest produced by `extract`.
    #[arg(long = "json", env = "PAGEBIND_MANIFEST", default_value = "./data/extracted_urls.json")]
    manifest: PathBuf,

    /// Directory to write the PDFs to.
    #[arg(long, env = "PAGEBIND_OUTPUT_DIR", default_value = "./data/pdfs")]
    output_dir: PathBuf,

    #[command(flatten)]
    batch: BatchArgs,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Manifest produced by `extract`.
    #[arg(long = "json", env = "PAGEBIND_MANIFEST", default_value = "./data/extracted_urls.json")]
    manifest: PathBuf,

    /// Directory holding the rendered PDFs.
    #[arg(long, env = "PAGEBIND_PDF_DIR", default_value = "./data/pdfs")]
    pdf_dir: PathBuf,

    /// Merged PDF path.
    #[arg(long, env = "PAGEBIND_OUTPUT", default_value = "./data/merged.pdf")]
    output: PathBuf,

    /// Document title stored in the PDF metadata.
    #[arg(long, env = "PAGEBIND_TITLE")]
    title: Option<String>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// PDF to read.
    pdf: PathBuf,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Index page: local HTML file or http(s) URL.
    #[arg(long, env = "PAGEBIND_HTML")]
    html: String,

    /// URL relative links resolve against (defaults to --html when it is a URL).
    #[arg(long, env = "PAGEBIND_BASE_URL")]
    base_url: Option<String>,

    /// Directory for the manifest, the PDFs and the merged document.
    #[arg(long, env = "PAGEBIND_WORK_DIR", default_value = "./data")]
    work_dir: PathBuf,

    /// Document title stored in the PDF metadata.
    #[arg(long, env = "PAGEBIND_TITLE")]
    title: Option<String>,

    #[command(flatten)]
    links: LinkArgs,

    #[command(flatten)]
    batch: BatchArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for batch commands.
    let batch_command = matches!(cli.command, Command::Save(_) | Command::Run(_));
    let show_progress = batch_command && !g.quiet && !g.no_progress;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Extract(args) => cmd_extract(args, g).await,
        Command::Render(args) => cmd_render(args, g).await,
        Command::Save(args) => cmd_save(args, g, show_progress).await,
        Command::Merge(args) => cmd_merge(args, g).await,
        Command::Inspect(args) => cmd_inspect(args).await,
        Command::Run(args) => cmd_run(args, g, show_progress).await,
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

async fn cmd_extract(args: &ExtractArgs, g: &GlobalArgs) -> Result<()> {
    let manifest = extract_to_file(&args.html, args.base_url.as_deref(), &args.out, &extract_config(&args.links))
        .await
        .context("Link extraction failed")?;
    if !g.quiet {
        eprintln!(
            "{} {} links  →  {}",
            green("✔"),
            bold(&manifest.len().to_string()),
            bold(&args.out.display().to_string())
        );
    }
    Ok(())
}

async fn cmd_render(args: &RenderArgs, g: &GlobalArgs) -> Result<()> {
    let Some(url) = args.url.as_deref() else {
        eprintln!("{} --url is required", red("error:"));
        std::process::exit(1);
    };
    let config = render_config(g, &args.browser)?;
    let request = RenderRequest::new(url, ensure_pdf_suffix(&args.file_name), &args.output_dir)
        .with_selector(args.browser.selector.clone());

    let result = render_page(&request, &config).await;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !g.quiet {
        for w in &result.warnings {
            eprintln!("  {} {}", yellow("!"), w);
        }
        match (&result.output_path, result.error_message()) {
            (Some(path), None) => eprintln!(
                "{} {}{}",
                green("✔"),
                bold(&path.display().to_string()),
                if result.clipped { dim("  (clipped)") } else { String::new() }
            ),
            (_, msg) => eprintln!(
                "{} {}",
                red("✘"),
                msg.unwrap_or_else(|| "render failed".to_string())
            ),
        }
    }
    // Render failures are data: exit 0 either way.
    Ok(())
}

async fn cmd_save(args: &SaveArgs, g: &GlobalArgs, show_progress: bool) -> Result<()> {
    let manifest = Manifest::load(&args.manifest).context("Failed to load manifest")?;
    let config = batch_config(&args.output_dir, &args.batch, g, show_progress)?;

    let report = save_pages(&manifest, &config).await.context("Saving pages failed")?;

    if !g.quiet {
        print_batch_summary(&report, show_progress);
    }
    Ok(())
}

async fn cmd_merge(args: &MergeArgs, g: &GlobalArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest).context("Failed to load manifest")?;
    let config = MergeConfig {
        title: args.title.clone(),
        ..MergeConfig::default()
    };

    let report = merge_pdfs(&manifest, &args.pdf_dir, &args.output, &config)
        .await
        .context("Merge failed")?;

    if !g.quiet {
        print_merge_summary(&report);
    }
    Ok(())
}

async fn cmd_inspect(args: &InspectArgs) -> Result<()> {
    let summary = inspect_pdf(&args.pdf).await.context("Failed to inspect PDF")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else {
        println!("File:       {}", args.pdf.display());
        println!("Pages:      {}", summary.page_count);
        println!("Bookmarks:  {}", summary.bookmark_count());
        print_outline(&summary.outline, 1);
    }
    Ok(())
}

async fn cmd_run(args: &RunArgs, g: &GlobalArgs, show_progress: bool) -> Result<()> {
    let layout = RunLayout::in_dir(&args.work_dir);
    let batch = batch_config(&layout.pdf_dir, &args.batch, g, show_progress)?;
    let merge = MergeConfig {
        title: args.title.clone(),
        ..MergeConfig::default()
    };

    let report = run(
        &args.html,
        args.base_url.as_deref(),
        &layout,
        &extract_config(&args.links),
        &batch,
        &merge,
    )
    .await
    .context("Run failed")?;

    if !g.quiet {
        eprintln!(
            "{} {} links  →  {}",
            green("✔"),
            bold(&report.links.to_string()),
            report.manifest_path.display()
        );
        print_batch_summary(&report.batch, show_progress);
        print_merge_summary(&report.merge);
    }
    Ok(())
}

// ── Config mapping ───────────────────────────────────────────────────────────

fn extract_config(args: &LinkArgs) -> ExtractConfig {
    ExtractConfig {
        link_selector: args.link_selector.clone(),
        dedupe: !args.keep_duplicates,
        nested: !args.flat,
        download_timeout_secs: args.download_timeout,
    }
}

fn render_config(g: &GlobalArgs, browser: &BrowserArgs) -> Result<RenderConfig> {
    let mut builder = RenderConfig::builder()
        .no_sandbox(g.no_sandbox)
        .navigation_timeout_secs(g.nav_timeout);
    if let Some(ref path) = g.chrome {
        builder = builder.chrome_path(path);
    }
    if let Some(proxy) = proxy_config(browser) {
        builder = builder.proxy(proxy);
    }
    builder.build().context("Invalid render configuration")
}

/// A username alone is passed on with an empty password.
fn proxy_config(browser: &BrowserArgs) -> Option<ProxyConfig> {
    let server = browser.proxy.as_ref()?;
    let proxy = ProxyConfig::new(server);
    Some(match &browser.proxy_username {
        Some(user) => proxy.with_credentials(user, browser.proxy_password.clone().unwrap_or_default()),
        None => proxy,
    })
}

fn batch_config(output_dir: &std::path::Path, args: &BatchArgs, g: &GlobalArgs, show_progress: bool) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder(output_dir)
        .max_retries(args.max_retries)
        .concurrency(args.concurrency)
        .skip_existing(!args.force)
        .render(render_config(g, &args.browser)?);
    if let Some(ref selector) = args.browser.selector {
        builder = builder.selector(selector);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new_dynamic();
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid batch configuration")
}

// ── Reporting ────────────────────────────────────────────────────────────────

fn print_batch_summary(report: &BatchReport, show_progress: bool) {
    // The progress callback already printed a summary line.
    if !show_progress {
        eprintln!(
            "Rendered {}, skipped {}, failed {} of {} pages",
            report.rendered, report.skipped, report.failed, report.total
        );
    }
    for o in report.failures() {
        eprintln!(
            "  {} {}  {}",
            red("✗"),
            o.title,
            dim(&o.error.as_ref().map(|e| truncate(&e.to_string(), 100)).unwrap_or_default())
        );
    }
    for o in report.outcomes.iter().filter(|o| !o.warnings.is_empty()) {
        for w in &o.warnings {
            eprintln!("  {} {}  {}", yellow("!"), o.title, dim(w));
        }
    }
}

fn print_merge_summary(report: &MergeReport) {
    for e in report.missing.iter().chain(&report.failed) {
        eprintln!("  {} {}", yellow("!"), e);
    }
    eprintln!(
        "{} {} pages from {} documents  {}  →  {}",
        if report.missing.is_empty() && report.failed.is_empty() {
            green("✔")
        } else {
            cyan("⚠")
        },
        report.page_count,
        report.included.len(),
        dim(&format!("{} KiB", report.file_size / 1024)),
        bold(&report.output_path.display().to_string()),
    );
}

fn print_outline(nodes: &[OutlineNode], depth: usize) {
    for n in nodes {
        println!("{}{}  {}", "  ".repeat(depth), n.title, dim(&format!("p.{}", n.page_index + 1)));
        print_outline(&n.children, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser_args(args: &[&str]) -> BrowserArgs {
        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            browser: BrowserArgs,
        }
        let argv = std::iter::once("pagebind").chain(args.iter().copied());
        Wrapper::try_parse_from(argv).unwrap().browser
    }

    #[test]
    fn proxy_username_without_password_is_kept() {
        let args = browser_args(&["--proxy", "http://p:3128", "--proxy-username", "alice"]);
        let proxy = proxy_config(&args).unwrap();
        assert_eq!(proxy.credentials(), Some(("alice", "")));
    }

    #[test]
    fn proxy_credentials_pass_through() {
        let args = browser_args(&[
            "--proxy",
            "http://p:3128",
            "--proxy-username",
            "alice",
            "--proxy-password",
            "s3cret",
        ]);
        assert_eq!(proxy_config(&args).unwrap().credentials(), Some(("alice", "s3cret")));
    }

    #[test]
    fn no_proxy_server_means_no_proxy() {
        assert!(proxy_config(&browser_args(&[])).is_none());
    }
}
