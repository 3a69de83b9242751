//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chat_archiver::{ArchiveConfig, RasterizerConfig};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};

/// Route library logs to the test output; `RUST_LOG=debug` shows stage detail.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Build a PDF with one page per label; resources live on the page tree root.
pub fn pdf_with_pages(labels: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for label in labels {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*label)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

pub fn write_pdf(path: &Path, labels: &[&str]) {
    std::fs::write(path, pdf_with_pages(labels)).unwrap();
}

/// Content stream of every page, in order.
pub fn page_contents(path: &Path) -> Vec<Vec<u8>> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| doc.get_page_content(id).unwrap())
        .collect()
}

pub fn page_count(path: &Path) -> usize {
    Document::load(path).unwrap().get_pages().len()
}

/// A stand-in for the headless browser: keeps a copy of the HTML it was
/// given at `witness` and "renders" by copying `fixture_pdf` to `{pdf}`.
pub fn fake_rasterizer(fixture_pdf: &Path, witness: &Path) -> RasterizerConfig {
    let script = format!("cp \"$1\" '{}' && cp \"$0\" \"$2\"", witness.display());
    RasterizerConfig::new("sh")
        .arg("-c")
        .arg(script)
        .arg(fixture_pdf.to_string_lossy())
        .arg("{html}")
        .arg("{pdf}")
        .timeout_secs(10)
}

/// Isolated directories plus an offline config wired to the fake rasterizer.
pub struct Harness {
    pub root: tempfile::TempDir,
    pub scratch: PathBuf,
    pub fixture: PathBuf,
    pub witness: PathBuf,
    pub archive: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let fixture = root.path().join("fixture-page.pdf");
        write_pdf(&fixture, &["rendered page"]);
        let witness = root.path().join("witness.html");
        let archive = root.path().join("archive").join("chat.pdf");
        Self {
            root,
            scratch,
            fixture,
            witness,
            archive,
        }
    }

    pub fn config(&self) -> ArchiveConfig {
        self.config_with(fake_rasterizer(&self.fixture, &self.witness))
    }

    pub fn config_with(&self, rasterizer: RasterizerConfig) -> ArchiveConfig {
        ArchiveConfig::builder()
            .rasterizer(rasterizer)
            .scratch_dir(&self.scratch)
            .external_assets(false)
            .build()
            .unwrap()
    }

    pub fn witness_html(&self) -> String {
        std::fs::read_to_string(&self.witness).unwrap()
    }

    /// Entries left in the scratch parent directory.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(&self.scratch).unwrap().count()
    }
}
