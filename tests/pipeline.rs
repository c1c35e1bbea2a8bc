//! Offline integration tests for the whole extract → save → merge pipeline.
//!
//! A scripted renderer stands in for Chrome and writes small lopdf-generated
//! PDFs, so these tests need neither a browser nor network access.

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, Stream};
use pagebind::{
    inspect_pdf, merge_pdfs, run_with, save_pages_with, BatchConfig, EntryError, EntryStatus, ExtractConfig, Manifest,
    ManifestEntry, MergeConfig, OutlineNode, PageBindError, PageRenderer, RenderRequest, RenderResult, RunLayout,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Writes an `n`-page PDF per URL; URLs mapped to 0 pages always fail.
struct FakeChrome {
    pages: HashMap<String, usize>,
    calls: Mutex<Vec<String>>,
}

impl FakeChrome {
    fn new(pages: &[(&str, usize)]) -> Self {
        Self {
            pages: pages.iter().map(|(u, n)| (u.to_string(), *n)).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageRenderer for FakeChrome {
    async fn render(&self, request: &RenderRequest) -> RenderResult {
        self.calls.lock().unwrap().push(request.url.clone());
        let n = self.pages.get(&request.url).copied().unwrap_or(1);
        if n == 0 {
            return RenderResult::failed(
                &request.file_name,
                EntryError::Navigation {
                    url: request.url.clone(),
                    detail: "net::ERR_NAME_NOT_RESOLVED".into(),
                },
            );
        }
        std::fs::create_dir_all(&request.output_dir).unwrap();
        let path = request.output_path();
        write_pdf(&path, n);
        RenderResult::succeeded(&request.file_name, path, false, Vec::new())
    }
}

fn write_pdf(path: &Path, n: usize) {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..n)
        .map(|i| {
            let content = doc.add_object(Stream::new(dictionary! {}, format!("BT ET % {i}").into_bytes()));
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
                "Contents" => content,
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => n as i64,
        }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);
    doc.save(path).unwrap();
}

const INDEX: &str = r##"
<html><body>
  <a href="#content">Skip to content</a>
  <nav>
    <ul>
      <li><a href="intro.html">Introduction</a>
        <ul>
          <li><a href="setup.html">Setup</a></li>
          <li><a href="broken.html">Broken page</a></li>
        </ul>
      </li>
      <li><a href="api/">API reference</a></li>
      <li><a href="intro.html">Introduction (again)</a></li>
    </ul>
  </nav>
</body></html>"##;

const BASE: &str = "https://docs.example.com/";

fn fake_site() -> FakeChrome {
    FakeChrome::new(&[
        ("https://docs.example.com/intro.html", 2),
        ("https://docs.example.com/setup.html", 1),
        ("https://docs.example.com/broken.html", 0),
        ("https://docs.example.com/api/", 3),
    ])
}

fn titles(nodes: &[OutlineNode]) -> Vec<(String, usize, usize)> {
    nodes
        .iter()
        .map(|n| (n.title.clone(), n.page_index, n.children.len()))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_binds_pages_with_nested_outline() {
    let work = tempfile::tempdir().unwrap();
    let index = work.path().join("index.html");
    std::fs::write(&index, INDEX).unwrap();
    let layout = RunLayout::in_dir(work.path().join("data"));
    let chrome = fake_site();
    let batch = BatchConfig::builder(&layout.pdf_dir).max_retries(0).build().unwrap();

    let report = run_with(
        &chrome,
        index.to_str().unwrap(),
        Some(BASE),
        &layout,
        &ExtractConfig::default(),
        &batch,
        &MergeConfig::default(),
    )
    .await
    .unwrap();

    // One render call per entry, in manifest order.
    assert_eq!(report.links, 4);
    assert_eq!(
        chrome.calls(),
        vec![
            "https://docs.example.com/intro.html",
            "https://docs.example.com/setup.html",
            "https://docs.example.com/broken.html",
            "https://docs.example.com/api/",
        ]
    );
    assert_eq!(report.batch.rendered, 3);
    assert_eq!(report.batch.failed, 1);

    // The failed page is reported missing and the rest still merge.
    assert_eq!(report.merge.page_count, 6);
    assert_eq!(report.merge.missing.len(), 1);
    assert!(matches!(
        &report.merge.missing[0],
        EntryError::MissingPdf { title, .. } if title == "Broken page"
    ));

    let summary = inspect_pdf(&layout.merged).await.unwrap();
    assert_eq!(summary.page_count, 6);
    assert_eq!(
        titles(&summary.outline),
        vec![("Introduction".to_string(), 0, 1), ("API reference".to_string(), 3, 0)]
    );
    assert_eq!(summary.outline[0].children[0].title, "Setup");
    assert_eq!(summary.outline[0].children[0].page_index, 2);
    assert_eq!(summary.outline, report.merge.outline);
}

#[tokio::test]
async fn rerun_skips_rendered_pages_and_keeps_outline() {
    let work = tempfile::tempdir().unwrap();
    let index = work.path().join("index.html");
    std::fs::write(&index, INDEX).unwrap();
    let layout = RunLayout::in_dir(work.path());
    let batch = BatchConfig::builder(&layout.pdf_dir).max_retries(0).build().unwrap();
    let run_once = |chrome: FakeChrome| {
        let layout = layout.clone();
        let batch = batch.clone();
        let index = index.clone();
        async move {
            let report = run_with(
                &chrome,
                index.to_str().unwrap(),
                Some(BASE),
                &layout,
                &ExtractConfig::default(),
                &batch,
                &MergeConfig::default(),
            )
            .await
            .unwrap();
            (report, chrome.calls())
        }
    };

    let (first, _) = run_once(fake_site()).await;
    let (second, calls) = run_once(fake_site()).await;

    // Only the page that never rendered is attempted again.
    assert_eq!(calls, vec!["https://docs.example.com/broken.html"]);
    assert_eq!(second.batch.skipped, 3);
    assert_eq!(second.merge.outline, first.merge.outline);

    let a = inspect_pdf(&layout.merged).await.unwrap();
    assert_eq!(a.outline, first.merge.outline);
}

#[tokio::test]
async fn duplicate_titles_render_to_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = Manifest::new(
        BASE,
        vec![
            ManifestEntry::new("https://docs.example.com/v1/faq", "FAQ"),
            ManifestEntry::new("https://docs.example.com/v2/faq", "FAQ"),
        ],
    );
    let chrome = FakeChrome::new(&[]);
    let config = BatchConfig::new(dir.path());

    let report = save_pages_with(&chrome, &manifest, &config).await.unwrap();

    assert!(report.outcomes.iter().all(|o| o.status == EntryStatus::Rendered));
    assert!(dir.path().join("FAQ.pdf").exists());
    assert!(dir.path().join("FAQ_2.pdf").exists());

    let merged = dir.path().join("merged.pdf");
    let merge = merge_pdfs(&manifest, dir.path(), &merged, &MergeConfig::default())
        .await
        .unwrap();
    let summary = inspect_pdf(&merged).await.unwrap();
    assert_eq!(merge.page_count, 2);
    assert_eq!(
        titles(&summary.outline),
        vec![("FAQ".to_string(), 0, 0), ("FAQ".to_string(), 1, 0)]
    );
}

#[tokio::test]
async fn merge_with_every_pdf_missing_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = Manifest::new(
        BASE,
        vec![
            ManifestEntry::new("https://docs.example.com/a", "A"),
            ManifestEntry::new("https://docs.example.com/b", "B"),
        ],
    );

    let err = merge_pdfs(&manifest, dir.path(), dir.path().join("merged.pdf"), &MergeConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PageBindError::NothingToMerge { missing: 2, failed: 0 }));
    assert!(!dir.path().join("merged.pdf").exists());
}

#[tokio::test]
async fn manifest_written_by_extract_feeds_later_steps() {
    let work = tempfile::tempdir().unwrap();
    let index = work.path().join("index.html");
    std::fs::write(&index, INDEX).unwrap();
    let out = work.path().join("links.json");

    pagebind::extract_to_file(index.to_str().unwrap(), Some(BASE), &out, &ExtractConfig::default())
        .await
        .unwrap();
    let manifest = Manifest::load(&out).unwrap();

    let levels: Vec<_> = manifest.entries().map(|e| (e.title.as_str(), e.level)).collect();
    assert_eq!(
        levels,
        vec![("Introduction", 0), ("Setup", 1), ("Broken page", 1), ("API reference", 0)]
    );
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["totalCount"], 4);
    assert_eq!(json["baseUrl"], BASE);
}
