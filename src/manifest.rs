//! The manifest: the ordered list of pages that defines the final document.
//!
//! Written once by the extractor and read by the batch renderer and the
//! merger. The file name each entry renders to is assigned here, once, so
//! every later step agrees on where a page's PDF lives.
//!
//! ```json
//! {
//!   "totalCount": 2,
//!   "baseUrl": "https://docs.example.com/",
//!   "links": [
//!     { "url": "https://docs.example.com/intro", "title": "Intro", "file_name": "Intro.pdf" },
//!     { "url": "https://docs.example.com/setup", "title": "Setup", "file_name": "Setup.pdf", "level": 1 }
//!   ]
//! }
//! ```
//!
//! Readers also accept a bare array of `{url, title}` objects and manifests
//! with relative URLs or without file names.

use crate::error::PageBindError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// Longest sanitized title kept in a file name, in characters.
pub const MAX_STEM_CHARS: usize = 200;

/// Stem used when a title sanitizes to nothing.
const UNTITLED: &str = "untitled";

/// One page of the final document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Absolute URL of the page.
    pub url: String,
    /// Display title, used for the bookmark and the file name.
    pub title: String,
    /// PDF file name inside the output directory.
    #[serde(default, alias = "fileName", skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    /// List-nesting depth relative to the shallowest link (0 = top level).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub level: usize,
}

fn is_zero(v: &usize) -> bool {
    *v == 0
}

impl ManifestEntry {
    /// Entry without a file name; one is assigned when the entry joins a
    /// [`Manifest`].
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            file_name: String::new(),
            level: 0,
        }
    }

    /// Set the nesting level.
    pub fn with_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }

    /// Bare file name of this entry's PDF. Never contains a directory part.
    pub fn pdf_file_name(&self) -> String {
        confine_file_name(&self.file_name).unwrap_or_else(|| file_name_for(&self.title))
    }

    /// Where this entry's PDF lives inside `dir`.
    pub fn pdf_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.pdf_file_name())
    }
}

/// Ordered list of entries plus the base URL they were resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub base_url: String,
    pub links: Vec<ManifestEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Wrapped(Manifest),
    Bare(Vec<ManifestEntry>),
}

impl Manifest {
    /// Build a manifest; file names missing from `links` are assigned.
    pub fn new(base_url: impl Into<String>, mut links: Vec<ManifestEntry>) -> Self {
        assign_file_names(&mut links);
        Self {
            total_count: links.len(),
            base_url: base_url.into(),
            links,
        }
    }

    /// Parse manifest JSON, resolving relative URLs and filling in file names.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut manifest = match serde_json::from_str::<ManifestFile>(text)? {
            ManifestFile::Wrapped(m) => m,
            ManifestFile::Bare(links) => Manifest {
                total_count: links.len(),
                base_url: String::new(),
                links,
            },
        };
        manifest.normalise();
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PageBindError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PageBindError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_json(&text).map_err(|source| PageBindError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded manifest {} ({} links)", path.display(), manifest.len());
        Ok(manifest)
    }

    /// Write the manifest as pretty JSON, creating parent directories.
    ///
    /// The file is replaced atomically (temp file + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PageBindError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PageBindError::Internal(format!("manifest serialisation: {e}")))?;
        write_atomic(path, json.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.links.iter()
    }

    fn normalise(&mut self) {
        if let Ok(base) = Url::parse(&self.base_url) {
            for entry in &mut self.links {
                if Url::parse(&entry.url).is_err() {
                    if let Ok(abs) = base.join(&entry.url) {
                        entry.url = abs.to_string();
                    }
                }
            }
        }
        assign_file_names(&mut self.links);
        self.total_count = self.links.len();
    }
}

// ── Naming ───────────────────────────────────────────────────────────────────

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N} ._-]").unwrap());

/// Reduce a title to characters that are safe in file names on every OS.
///
/// Keeps Unicode letters and digits plus space, `-`, `_` and `.`; trims
/// surrounding whitespace and caps the length at [`MAX_STEM_CHARS`].
pub fn sanitize_title(title: &str) -> String {
    let kept = RE_UNSAFE_CHARS.replace_all(title, "");
    let capped: String = kept.trim().chars().take(MAX_STEM_CHARS).collect();
    let capped = capped.trim_end();
    if capped.is_empty() {
        UNTITLED.to_string()
    } else {
        capped.to_string()
    }
}

/// Append `.pdf` unless the name already ends with it (any case).
pub fn ensure_pdf_suffix(name: &str) -> String {
    if name.to_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{name}.pdf")
    }
}

/// The file name a title renders to, before collision handling.
pub fn file_name_for(title: &str) -> String {
    ensure_pdf_suffix(&sanitize_title(title))
}

fn split_pdf_suffix(name: &str) -> (&str, &str) {
    if name.to_lowercase().ends_with(".pdf") && name.len() >= 4 {
        name.split_at(name.len() - 4)
    } else {
        (name, "")
    }
}

/// Last path component of an explicit file name, or `None` when nothing
/// usable is left (`""`, `.`, `..`, trailing separator).
fn confine_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    match base {
        "" | "." | ".." => None,
        _ => Some(base.to_string()),
    }
}

/// Fill in missing file names and make every name unique.
///
/// Explicit names are reduced to their last path component so every PDF
/// stays inside the output directory; otherwise they are kept. Generated names that collide (case-insensitive)
/// with an earlier name get a numeric suffix: `Intro.pdf`, `Intro_2.pdf`,
/// `Intro_3.pdf`.
pub fn assign_file_names(entries: &mut [ManifestEntry]) {
    for entry in entries.iter_mut().filter(|e| !e.file_name.is_empty()) {
        let confined = confine_file_name(&entry.file_name).unwrap_or_default();
        if confined != entry.file_name {
            warn!("File name {:?} for {} reduced to {:?}", entry.file_name, entry.url, confined);
            entry.file_name = confined;
        }
    }
    let mut taken: HashSet<String> = entries
        .iter()
        .filter(|e| !e.file_name.is_empty())
        .map(|e| e.file_name.to_lowercase())
        .collect();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();

    for entry in entries.iter_mut() {
        if !entry.file_name.is_empty() {
            continue;
        }
        let base = file_name_for(&entry.title);
        let key = base.to_lowercase();
        let mut candidate = base.clone();
        if taken.contains(&key) {
            let (stem, suffix) = split_pdf_suffix(&base);
            let n = next_suffix.entry(key.clone()).or_insert(1);
            loop {
                *n += 1;
                candidate = format!("{stem}_{n}{suffix}");
                if !taken.contains(&candidate.to_lowercase()) {
                    break;
                }
            }
        }
        taken.insert(candidate.to_lowercase());
        entry.file_name = candidate;
    }
}

/// Write `bytes` to `path` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PageBindError> {
    let write_err = |source: std::io::Error| PageBindError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, title: &str) -> ManifestEntry {
        ManifestEntry {
            url: url.into(),
            title: title.into(),
            file_name: String::new(),
            level: 0,
        }
    }

    #[test]
    fn sanitize_drops_unsafe_characters() {
        assert_eq!(sanitize_title("Chapter 1: Intro/Overview?"), "Chapter 1 IntroOverview");
        assert_eq!(sanitize_title("  Example Domain  "), "Example Domain");
        assert_eq!(sanitize_title("v1.2_release-notes"), "v1.2_release-notes");
        assert_eq!(sanitize_title("Über Straße"), "Über Straße");
        assert_eq!(sanitize_title("???"), "untitled");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_title(&long).chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn pdf_suffix_is_enforced_once() {
        assert_eq!(ensure_pdf_suffix("Example Domain"), "Example Domain.pdf");
        assert_eq!(ensure_pdf_suffix("report.pdf"), "report.pdf");
        assert_eq!(ensure_pdf_suffix("REPORT.PDF"), "REPORT.PDF");
        assert_eq!(file_name_for("Example Domain"), "Example Domain.pdf");
    }

    #[test]
    fn duplicate_titles_get_numeric_suffix() {
        let mut links = vec![
            entry("https://a/1", "Intro"),
            entry("https://a/2", "Intro"),
            entry("https://a/3", "intro"),
            entry("https://a/4", "Setup"),
        ];
        assign_file_names(&mut links);
        let names: Vec<_> = links.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["Intro.pdf", "Intro_2.pdf", "intro_3.pdf", "Setup.pdf"]);
    }

    #[test]
    fn generated_names_avoid_explicit_ones() {
        let mut links = vec![
            entry("https://a/1", "Intro"),
            ManifestEntry {
                file_name: "Intro_2.pdf".into(),
                ..entry("https://a/2", "Something else")
            },
            entry("https://a/3", "Intro"),
        ];
        assign_file_names(&mut links);
        assert_eq!(links[0].file_name, "Intro.pdf");
        assert_eq!(links[1].file_name, "Intro_2.pdf");
        assert_eq!(links[2].file_name, "Intro_3.pdf");
    }

    #[test]
    fn explicit_names_are_confined_to_the_output_dir() {
        let json = r#"[
            { "url": "https://a/1", "title": "One", "file_name": "sub/a.pdf" },
            { "url": "https://a/2", "title": "Two", "file_name": "../escape.pdf" },
            { "url": "https://a/3", "title": "Three", "file_name": "/etc/abs.pdf" },
            { "url": "https://a/4", "title": "Four", "file_name": "dir\\..\\" }
        ]"#;
        let m = Manifest::from_json(json).unwrap();
        let names: Vec<_> = m.entries().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "escape.pdf", "abs.pdf", "Four.pdf"]);

        let dir = Path::new("/out");
        for e in m.entries() {
            assert_eq!(e.pdf_path(dir).parent(), Some(dir));
        }
    }

    #[test]
    fn parses_wrapped_manifest_with_relative_urls() {
        let json = r#"{
            "totalCount": 2,
            "baseUrl": "https://docs.example.com/guide/",
            "links": [
                {"url": "intro.html", "title": "Intro", "file_name": "Intro.pdf"},
                {"url": "https://other.example.com/x", "title": "X"}
            ]
        }"#;
        let m = Manifest::from_json(json).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.links[0].url, "https://docs.example.com/guide/intro.html");
        assert_eq!(m.links[1].url, "https://other.example.com/x");
        assert_eq!(m.links[1].file_name, "X.pdf");
    }

    #[test]
    fn parses_bare_array_and_file_name_alias() {
        let json = r#"[
            {"url": "https://example.com", "title": "Example Domain"},
            {"url": "https://example.org", "title": "Org", "fileName": "custom.pdf"}
        ]"#;
        let m = Manifest::from_json(json).unwrap();
        assert_eq!(m.total_count, 2);
        assert_eq!(m.links[0].file_name, "Example Domain.pdf");
        assert_eq!(m.links[1].file_name, "custom.pdf");
    }

    #[test]
    fn serialises_with_camel_case_header_and_omits_zero_level() {
        let m = Manifest::new(
            "https://example.com/",
            vec![
                ManifestEntry::new("https://example.com/a", "A"),
                ManifestEntry::new("https://example.com/b", "B").with_level(1),
            ],
        );
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["totalCount"], 2);
        assert_eq!(v["baseUrl"], "https://example.com/");
        assert!(v["links"][0].get("level").is_none());
        assert_eq!(v["links"][1]["level"], 1);
    }

    #[test]
    fn new_manifest_assigns_unique_names() {
        let m = Manifest::new(
            "",
            vec![
                ManifestEntry::new("https://example.com/1", "FAQ"),
                ManifestEntry::new("https://example.com/2", "FAQ"),
            ],
        );
        assert_eq!(m.links[0].file_name, "FAQ.pdf");
        assert_eq!(m.links[1].file_name, "FAQ_2.pdf");
        assert_eq!(
            m.links[1].pdf_path(Path::new("/out")),
            PathBuf::from("/out/FAQ_2.pdf")
        );
    }

    #[test]
    fn save_and_load_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/manifest.json");
        let m = Manifest::new(
            "https://example.com/",
            vec![
                ManifestEntry::new("https://example.com/z", "Zeta"),
                ManifestEntry::new("https://example.com/a", "Alpha"),
            ],
        );
        m.save(&path).unwrap();
        let back = Manifest::load(&path).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Manifest::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, PageBindError::ManifestRead { .. }));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        let err = Manifest::load(&bad).unwrap_err();
        assert!(matches!(err, PageBindError::ManifestParse { .. }));
    }
}
