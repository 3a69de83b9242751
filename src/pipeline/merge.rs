//! Archive merger: append a freshly rendered page file onto the archive.
//!
//! Existing page objects are never modified; the new document's objects are
//! renumbered above the archive's highest id and grafted onto the archive's
//! root page tree. The result is checked in memory, written to a temporary
//! file next to the archive, and atomically renamed over it. On any failure
//! the archive on disk is exactly what it was before.
//!
//! Named destinations of the new page (footnote anchors, for example) are
//! moved into the archive catalog's `/Dests` under a per-page prefix, so
//! internal links keep working and never collide with earlier pages.

use crate::error::MergeError;
use crate::pipeline::input::{ensure_pdf_magic, ArchiveTarget};
use crate::pipeline::rasterize::remove_transient;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Parent-chain walks stop here; a malformed tree may loop.
const MAX_TREE_DEPTH: usize = 64;

/// What the merge did to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Total pages in the archive afterwards.
    pub page_count: usize,
    /// Pages taken from the new page file.
    pub pages_added: usize,
    /// True when the archive did not exist before.
    pub created: bool,
}

/// Append every page of `page_path` to the archive.
///
/// `page_path` is consumed: it is deleted (or moved into place) whatever
/// the outcome.
pub fn merge_into_archive(target: &ArchiveTarget, page_path: &Path) -> Result<MergeReport, MergeError> {
    let result = match target {
        ArchiveTarget::Absent(archive) => adopt_as_archive(archive, page_path),
        ArchiveTarget::Existing(archive) => append_to_archive(archive, page_path),
    };
    if let Err(warning) = remove_transient(page_path) {
        warn!("{}", warning);
    }
    result
}

/// No archive yet: validate the page file and move it into place.
fn adopt_as_archive(archive: &Path, page_path: &Path) -> Result<MergeReport, MergeError> {
    let page_doc = load_page(page_path)?;
    let pages = page_doc.get_pages().len();
    if pages == 0 {
        return Err(MergeError::EmptyPage {
            path: page_path.to_path_buf(),
        });
    }

    let parent = parent_dir(archive);
    std::fs::create_dir_all(&parent).map_err(|source| write_failed(archive, source))?;

    if let Err(e) = std::fs::rename(page_path, archive) {
        // Typically a cross-device rename; copy beside the archive instead.
        debug!("Rename into place failed ({}), copying", e);
        let mut tmp = archive_tempfile(&parent).map_err(|source| write_failed(archive, source))?;
        let mut src = std::fs::File::open(page_path).map_err(|source| write_failed(archive, source))?;
        std::io::copy(&mut src, tmp.as_file_mut()).map_err(|source| write_failed(archive, source))?;
        tmp.as_file().sync_all().map_err(|source| write_failed(archive, source))?;
        tmp.persist(archive)
            .map_err(|e| write_failed(archive, e.error))?;
    }

    info!("Created archive {} with {} page(s)", archive.display(), pages);
    Ok(MergeReport {
        page_count: pages,
        pages_added: pages,
        created: true,
    })
}

/// Archive exists: merge in memory, then replace atomically.
fn append_to_archive(archive: &Path, page_path: &Path) -> Result<MergeReport, MergeError> {
    let mut doc = Document::load(archive).map_err(|e| MergeError::ArchiveUnreadable {
        path: archive.to_path_buf(),
        detail: e.to_string(),
    })?;
    let page_doc = load_page(page_path)?;

    let before = doc.get_pages().len();
    let added = append_pages(&mut doc, page_doc).map_err(|e| match e {
        AppendFailure::NoPages => MergeError::EmptyPage {
            path: page_path.to_path_buf(),
        },
        AppendFailure::Archive(detail) => MergeError::ArchiveUnreadable {
            path: archive.to_path_buf(),
            detail,
        },
        AppendFailure::Page(detail) => MergeError::PageUnreadable {
            path: page_path.to_path_buf(),
            detail,
        },
    })?;

    let after = doc.get_pages().len();
    if after != before + added {
        return Err(MergeError::PageCountMismatch {
            expected: before + added,
            actual: after,
        });
    }

    write_atomically(&mut doc, archive)?;
    info!(
        "Appended {} page(s) to {} ({} total)",
        added,
        archive.display(),
        after
    );
    Ok(MergeReport {
        page_count: after,
        pages_added: added,
        created: false,
    })
}

fn load_page(page_path: &Path) -> Result<Document, MergeError> {
    let unreadable = |detail: String| MergeError::PageUnreadable {
        path: page_path.to_path_buf(),
        detail,
    };
    ensure_pdf_magic(page_path).map_err(unreadable)?;
    Document::load(page_path).map_err(|e| unreadable(e.to_string()))
}

#[derive(Debug)]
enum AppendFailure {
    NoPages,
    Archive(String),
    Page(String),
}

/// Graft all pages of `page_doc` onto the end of `doc`'s root page tree.
///
/// Returns the number of pages appended.
fn append_pages(doc: &mut Document, mut page_doc: Document) -> Result<usize, AppendFailure> {
    page_doc.renumber_objects_with(doc.max_id + 1);

    let new_pages: Vec<ObjectId> = page_doc.get_pages().into_values().collect();
    if new_pages.is_empty() {
        return Err(AppendFailure::NoPages);
    }

    let prefix = format!("page{}.", doc.get_pages().len() + 1).into_bytes();
    let destinations = named_destinations(&page_doc);
    if !destinations.is_empty() {
        let names: BTreeSet<Vec<u8>> = destinations.iter().map(|(name, _)| name.clone()).collect();
        for object in page_doc.objects.values_mut() {
            rename_dest_refs(object, &names, &prefix);
        }
    }

    for &page_id in &new_pages {
        flatten_inherited(&mut page_doc, page_id).map_err(|e| AppendFailure::Page(e.to_string()))?;
    }

    let skipped = page_tree_nodes(&page_doc);

    let pages_root = doc
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| AppendFailure::Archive(format!("no page tree: {e}")))?;

    doc.max_id = doc.max_id.max(page_doc.max_id);
    for (id, object) in page_doc.objects {
        if !skipped.contains(&id) {
            doc.objects.insert(id, object);
        }
    }

    for &page_id in &new_pages {
        let page = doc
            .get_dictionary_mut(page_id)
            .map_err(|e| AppendFailure::Page(e.to_string()))?;
        page.set("Parent", Object::Reference(pages_root));
    }

    let root = doc
        .get_dictionary_mut(pages_root)
        .map_err(|e| AppendFailure::Archive(e.to_string()))?;
    let count = root.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
    let kids = root
        .get_mut(b"Kids")
        .and_then(Object::as_array_mut)
        .map_err(|e| AppendFailure::Archive(format!("page tree has no Kids: {e}")))?;
    kids.extend(new_pages.iter().map(|&id| Object::Reference(id)));
    root.set("Count", count + new_pages.len() as i64);

    if !destinations.is_empty() {
        debug!("Carrying over {} named destination(s)", destinations.len());
        let renamed = destinations
            .into_iter()
            .map(|(name, dest)| ([prefix.as_slice(), name.as_slice()].concat(), dest));
        add_named_destinations(doc, renamed).map_err(|e| AppendFailure::Archive(e.to_string()))?;
    }

    Ok(new_pages.len())
}

// ── Named destinations ───────────────────────────────────────────────────────

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> lopdf::Result<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}

/// Every named destination in the catalog: the `/Dests` dictionary and the
/// `/Names` → `/Dests` name tree.
fn named_destinations(doc: &Document) -> Vec<(Vec<u8>, Object)> {
    let mut found = Vec::new();
    let Ok(catalog) = doc.catalog() else {
        return found;
    };
    if let Ok(dests) = catalog
        .get(b"Dests")
        .and_then(|o| resolve(doc, o))
        .and_then(Object::as_dict)
    {
        found.extend(dests.iter().map(|(name, dest)| (name.clone(), dest.clone())));
    }
    if let Ok(tree) = catalog
        .get(b"Names")
        .and_then(|o| resolve(doc, o))
        .and_then(Object::as_dict)
        .and_then(|names| names.get(b"Dests"))
        .and_then(|o| resolve(doc, o))
        .and_then(Object::as_dict)
    {
        collect_name_tree(doc, tree, 0, &mut found);
    }
    found
}

fn collect_name_tree(doc: &Document, node: &Dictionary, depth: usize, found: &mut Vec<(Vec<u8>, Object)>) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    if let Ok(names) = node
        .get(b"Names")
        .and_then(|o| resolve(doc, o))
        .and_then(Object::as_array)
    {
        for pair in names.chunks_exact(2) {
            if let Ok(key) = pair[0].as_str() {
                found.push((key.to_vec(), pair[1].clone()));
            }
        }
    }
    if let Ok(kids) = node
        .get(b"Kids")
        .and_then(|o| resolve(doc, o))
        .and_then(Object::as_array)
    {
        for kid in kids {
            if let Ok(kid) = resolve(doc, kid).and_then(Object::as_dict) {
                collect_name_tree(doc, kid, depth + 1, found);
            }
        }
    }
}

/// Point `/Dest` entries and `/GoTo` actions that name one of `names` at the
/// prefixed name. String names become name objects, which resolve through
/// the catalog's `/Dests` dictionary.
fn rename_dest_refs(object: &mut Object, names: &BTreeSet<Vec<u8>>, prefix: &[u8]) {
    match object {
        Object::Dictionary(dict) => rename_in_dict(dict, names, prefix),
        Object::Array(items) => {
            for item in items {
                rename_dest_refs(item, names, prefix);
            }
        }
        _ => {}
    }
}

fn rename_in_dict(dict: &mut Dictionary, names: &BTreeSet<Vec<u8>>, prefix: &[u8]) {
    let is_goto = dict
        .get(b"S")
        .and_then(Object::as_name)
        .is_ok_and(|s| s == b"GoTo");
    for (key, value) in dict.iter_mut() {
        let names_dest = key.as_slice() == b"Dest" || (is_goto && key.as_slice() == b"D");
        let target = match value {
            Object::Name(name) | Object::String(name, _) if names_dest => Some(name.clone()),
            _ => None,
        };
        match target {
            Some(name) if names.contains(&name) => {
                *value = Object::Name([prefix, name.as_slice()].concat());
            }
            _ => rename_dest_refs(value, names, prefix),
        }
    }
}

/// Add entries to the archive catalog's `/Dests` dictionary, creating it
/// (or moving an inline one into its own object) as needed.
fn add_named_destinations(
    doc: &mut Document,
    entries: impl Iterator<Item = (Vec<u8>, Object)>,
) -> lopdf::Result<()> {
    let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference)?;
    let existing = doc.get_dictionary(catalog_id)?.get(b"Dests").ok().cloned();
    let dests_id = match existing {
        Some(Object::Reference(id)) => id,
        Some(Object::Dictionary(dict)) => doc.add_object(dict),
        _ => doc.add_object(Dictionary::new()),
    };
    doc.get_dictionary_mut(catalog_id)?
        .set("Dests", Object::Reference(dests_id));

    let dests = doc.get_dictionary_mut(dests_id)?;
    for (name, dest) in entries {
        dests.set(name, dest);
    }
    Ok(())
}

/// Copy attributes the page inherits from its ancestors onto the page itself,
/// so it renders the same once re-parented.
fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> lopdf::Result<()> {
    let mut inherited: Vec<(&[u8], Object)> = Vec::new();
    {
        let page = doc.get_dictionary(page_id)?;
        let parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        for key in INHERITABLE {
            if page.has(key) {
                continue;
            }
            let mut cursor = parent;
            let mut depth = 0;
            while let Some(node_id) = cursor {
                depth += 1;
                if depth > MAX_TREE_DEPTH {
                    break;
                }
                let node = doc.get_dictionary(node_id)?;
                if let Ok(value) = node.get(key) {
                    inherited.push((key, value.clone()));
                    break;
                }
                cursor = node.get(b"Parent").and_then(Object::as_reference).ok();
            }
        }
    }
    let page = doc.get_dictionary_mut(page_id)?;
    for (key, value) in inherited {
        page.set(key, value);
    }
    Ok(())
}

/// The catalog and every `/Type /Pages` node; these are not carried over.
fn page_tree_nodes(doc: &Document) -> BTreeSet<ObjectId> {
    let mut nodes: BTreeSet<ObjectId> = doc
        .objects
        .iter()
        .filter(|(_, object)| {
            object
                .as_dict()
                .and_then(|d| d.get(b"Type"))
                .and_then(Object::as_name)
                .is_ok_and(|t| t == b"Pages")
        })
        .map(|(&id, _)| id)
        .collect();
    if let Ok(root) = doc.trailer.get(b"Root").and_then(Object::as_reference) {
        nodes.insert(root);
    }
    nodes
}

fn write_atomically(doc: &mut Document, archive: &Path) -> Result<(), MergeError> {
    let parent = parent_dir(archive);
    let mut tmp = archive_tempfile(&parent).map_err(|source| write_failed(archive, source))?;

    doc.save_to(tmp.as_file_mut())
        .map_err(|e| write_failed(archive, std::io::Error::other(e.to_string())))?;
    tmp.as_file_mut()
        .flush()
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|source| write_failed(archive, source))?;

    if let Ok(meta) = std::fs::metadata(archive) {
        if let Err(e) = std::fs::set_permissions(tmp.path(), meta.permissions()) {
            debug!("Could not carry archive permissions over: {}", e);
        }
    }

    tmp.persist(archive)
        .map_err(|e| write_failed(archive, e.error))?;
    Ok(())
}

fn archive_tempfile(parent: &Path) -> std::io::Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(".chat-archiver-")
        .suffix(".pdf.tmp")
        .tempfile_in(parent)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_failed(archive: &Path, source: std::io::Error) -> MergeError {
    MergeError::WriteFailed {
        path: archive.to_path_buf(),
        source,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{page_contents, pdf_with_pages, with_named_destination};
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn absent_archive_adopts_page() {
        let dir = tempfile::tempdir().unwrap();
        let page = write(dir.path(), "page.pdf", &pdf_with_pages(&["first"]));
        let archive = dir.path().join("nested/chat.pdf");

        let report = merge_into_archive(&ArchiveTarget::Absent(archive.clone()), &page).unwrap();
        assert_eq!(
            report,
            MergeReport {
                page_count: 1,
                pages_added: 1,
                created: true
            }
        );
        assert!(archive.exists());
        assert!(!page.exists());
    }

    #[test]
    fn append_keeps_existing_pages_intact() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write(dir.path(), "chat.pdf", &pdf_with_pages(&["one", "two"]));
        let before = page_contents(&Document::load(&archive).unwrap());
        let page = write(dir.path(), "page.pdf", &pdf_with_pages(&["three"]));

        let report = merge_into_archive(&ArchiveTarget::Existing(archive.clone()), &page).unwrap();
        assert_eq!(report.page_count, 3);
        assert_eq!(report.pages_added, 1);
        assert!(!report.created);
        assert!(!page.exists());

        let merged = Document::load(&archive).unwrap();
        let after = page_contents(&merged);
        assert_eq!(after.len(), 3);
        assert_eq!(&after[..2], &before[..]);
        assert!(String::from_utf8_lossy(&after[2]).contains("three"));
    }

    #[test]
    fn appended_page_inherits_resources_and_mediabox() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write(dir.path(), "chat.pdf", &pdf_with_pages(&["one"]));
        let page = write(dir.path(), "page.pdf", &pdf_with_pages(&["two"]));
        merge_into_archive(&ArchiveTarget::Existing(archive.clone()), &page).unwrap();

        let merged = Document::load(&archive).unwrap();
        let last = *merged.get_pages().values().last().unwrap();
        let dict = merged.get_dictionary(last).unwrap();
        assert!(dict.has(b"Resources"));
        assert!(dict.has(b"MediaBox"));
        let parent = dict.get(b"Parent").and_then(Object::as_reference).unwrap();
        let root = merged
            .catalog()
            .and_then(|c| c.get(b"Pages"))
            .and_then(Object::as_reference)
            .unwrap();
        assert_eq!(parent, root);
    }

    #[test]
    fn repeated_appends_grow_one_page_each() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("chat.pdf");
        for (i, label) in ["a", "b", "c", "d"].into_iter().enumerate() {
            let page = write(dir.path(), "page.pdf", &pdf_with_pages(&[label]));
            let target = crate::pipeline::input::resolve_archive(&archive).unwrap();
            let report = merge_into_archive(&target, &page).unwrap();
            assert_eq!(report.page_count, i + 1);
        }
        let contents = page_contents(&Document::load(&archive).unwrap());
        let texts: Vec<String> = contents
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        for (text, label) in texts.iter().zip(["(a)", "(b)", "(c)", "(d)"]) {
            assert!(text.contains(label), "{text} should contain {label}");
        }
    }

    #[test]
    fn corrupt_page_leaves_archive_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let original = pdf_with_pages(&["one", "two"]);
        let archive = write(dir.path(), "chat.pdf", &original);
        let page = write(dir.path(), "page.pdf", b"definitely not a pdf");

        let err = merge_into_archive(&ArchiveTarget::Existing(archive.clone()), &page).unwrap_err();
        assert!(matches!(err, MergeError::PageUnreadable { .. }));
        assert_eq!(std::fs::read(&archive).unwrap(), original);
        assert!(!page.exists(), "temp page must be deleted on failure");
    }

    #[test]
    fn corrupt_archive_is_reported_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write(dir.path(), "chat.pdf", b"%PDF-1.5\ngarbage without xref");
        let page = write(dir.path(), "page.pdf", &pdf_with_pages(&["x"]));

        let err = merge_into_archive(&ArchiveTarget::Existing(archive.clone()), &page).unwrap_err();
        assert!(matches!(err, MergeError::ArchiveUnreadable { .. }), "got: {err}");
        assert_eq!(
            std::fs::read(&archive).unwrap(),
            b"%PDF-1.5\ngarbage without xref"
        );
        assert!(!page.exists());
    }

    #[test]
    fn no_temp_files_left_beside_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write(dir.path(), "chat.pdf", &pdf_with_pages(&["one"]));
        let page = write(dir.path(), "page.pdf", &pdf_with_pages(&["two"]));
        merge_into_archive(&ArchiveTarget::Existing(archive), &page).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["chat.pdf".to_string()]);
    }

    #[test]
    fn absent_archive_rejects_corrupt_page() {
        let dir = tempfile::tempdir().unwrap();
        let page = write(dir.path(), "page.pdf", b"oops");
        let archive = dir.path().join("chat.pdf");
        assert!(merge_into_archive(&ArchiveTarget::Absent(archive.clone()), &page).is_err());
        assert!(!archive.exists());
        assert!(!page.exists());
    }

    /// The name and target page of the first page link on `page_id`.
    fn link_target(doc: &Document, page_id: ObjectId) -> (Vec<u8>, ObjectId) {
        let page = doc.get_dictionary(page_id).unwrap();
        let annots = page.get(b"Annots").and_then(Object::as_array).unwrap();
        let link = annots[0].as_dict().unwrap();
        let name = match link.get(b"Dest") {
            Ok(dest) => dest.as_name().unwrap().to_vec(),
            Err(_) => link
                .get(b"A")
                .and_then(Object::as_dict)
                .and_then(|a| a.get(b"D"))
                .and_then(Object::as_name)
                .unwrap()
                .to_vec(),
        };
        let dests = doc
            .catalog()
            .and_then(|c| c.get(b"Dests"))
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .unwrap();
        let dest = dests.get(&name).and_then(Object::as_array).unwrap();
        (name, dest[0].as_reference().unwrap())
    }

    #[test]
    fn appended_links_keep_their_own_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write(dir.path(), "chat.pdf", &pdf_with_pages(&["one"]));
        for label in ["two", "three"] {
            let bytes = with_named_destination(&pdf_with_pages(&[label]), "fn-1", false);
            let page = write(dir.path(), "page.pdf", &bytes);
            merge_into_archive(&ArchiveTarget::Existing(archive.clone()), &page).unwrap();
        }

        let merged = Document::load(&archive).unwrap();
        let pages = merged.get_pages();
        let (name2, target2) = link_target(&merged, pages[&2]);
        let (name3, target3) = link_target(&merged, pages[&3]);
        assert_eq!(name2, b"page2.fn-1");
        assert_eq!(name3, b"page3.fn-1");
        assert_eq!(target2, pages[&2]);
        assert_eq!(target3, pages[&3]);
    }

    #[test]
    fn name_tree_destinations_are_carried_over() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write(dir.path(), "chat.pdf", &pdf_with_pages(&["one", "two"]));
        let bytes = with_named_destination(&pdf_with_pages(&["three"]), "note", true);
        let page = write(dir.path(), "page.pdf", &bytes);
        merge_into_archive(&ArchiveTarget::Existing(archive.clone()), &page).unwrap();

        let merged = Document::load(&archive).unwrap();
        let last = merged.get_pages()[&3];
        let (name, target) = link_target(&merged, last);
        assert_eq!(name, b"page3.note");
        assert_eq!(target, last);
    }

    #[test]
    fn parent_dir_of_bare_filename() {
        assert_eq!(parent_dir(Path::new("chat.pdf")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/a/chat.pdf")), PathBuf::from("/a"));
    }
}
