//! Associated files: compute the reference string linking a document to a
//! bibliography (relative or absolute), and copy or move the document next
//! to the bibliography, inserting the resulting reference into an entry.

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::model::{BibEntry, ValueItem};
use std::path::Path;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Absolute,
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOperation {
    KeepName,
    EntryId,
    UserDefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveCopyOperation {
    None,
    Copy,
    Move,
}

/// A document reference: either an absolute URL or a relative path string.
#[derive(Debug, Clone)]
enum Reference {
    Absolute(Url),
    Relative(String),
}

fn parse_reference(text: &str) -> Option<Reference> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match Url::parse(text) {
        Ok(url) => Some(Reference::Absolute(url)),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Some(Reference::Relative(text.to_string()))
        }
        Err(_) => None,
    }
}

/// Render a URL the way a local user expects: plain path for `file`,
/// the full URL otherwise.
fn prefer_local(url: &Url) -> String {
    if url.scheme() == "file" {
        url.path().to_string()
    } else {
        url.to_string()
    }
}

fn hosts_match(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && (a.scheme() == "file" || a.host_str() == b.host_str())
}

/// Compute the relative reference from the bibliography at `base_url` to
/// `document_url`. Falls back to the document's own rendering when the
/// two do not share scheme and host.
#[must_use]
pub fn relative_filename(document_url: &str, base_url: &str) -> String {
    let Some(document) = parse_reference(document_url) else {
        return String::new();
    };
    let Some(Reference::Absolute(base)) = parse_reference(base_url) else {
        return match document {
            Reference::Absolute(url) => prefer_local(&url),
            Reference::Relative(path) => path,
        };
    };
    let document = match document {
        Reference::Absolute(url) => url,
        Reference::Relative(path) => match base.join(&path) {
            Ok(url) => url,
            Err(_) => return path,
        },
    };
    if !hosts_match(&document, &base) {
        return prefer_local(&document);
    }

    relative_path(parent_path(base.path()), document.path())
}

/// Compute the absolute reference for `document_url` resolved against the
/// bibliography at `base_url`.
#[must_use]
pub fn absolute_filename(document_url: &str, base_url: &str) -> String {
    let Some(document) = parse_reference(document_url) else {
        return String::new();
    };
    let base = match parse_reference(base_url) {
        Some(Reference::Absolute(url)) => Some(url),
        _ => None,
    };
    match document {
        Reference::Relative(path) => match &base {
            Some(base) => base
                .join(&path)
                .map(|url| prefer_local(&url))
                .unwrap_or(path),
            None => path,
        },
        Reference::Absolute(url) => {
            if let Some(base) = &base {
                if !hosts_match(&url, base) {
                    return prefer_local(&url);
                }
            }
            prefer_local(&url)
        }
    }
}

/// The association string for a document, per the requested path kind.
#[must_use]
pub fn compute_associate_string(
    document_url: &str,
    bibliography_url: Option<&str>,
    kind: PathKind,
) -> String {
    let base = bibliography_url.unwrap_or("");
    match kind {
        PathKind::Absolute => absolute_filename(document_url, base),
        PathKind::Relative => relative_filename(document_url, base),
    }
}

/// Insert the computed reference into the entry unless some field already
/// carries it. Local documents land in `localfile`, remote ones in `url`.
pub fn insert_url(
    document_url: &str,
    entry: &mut BibEntry,
    bibliography_url: Option<&str>,
    kind: PathKind,
) -> String {
    let reference = compute_associate_string(document_url, bibliography_url, kind);
    if reference.is_empty() {
        return reference;
    }

    let already_contained = entry
        .fields()
        .any(|(_, value)| value.iter().any(|item| item.text() == reference));
    if !already_contained {
        let is_local = match parse_reference(document_url) {
            Some(Reference::Absolute(url)) => url.scheme() == "file",
            Some(Reference::Relative(_)) | None => true,
        };
        let field = if is_local {
            BibEntry::LOCALFILE
        } else {
            BibEntry::URL
        };
        let mut value = entry.remove(field).unwrap_or_default();
        value.push(ValueItem::VerbatimText(reference.clone()));
        entry.insert(field, value);
    }
    reference
}

/// Compute `(absolute source, target)` for a copy or move of `source_url`
/// next to the bibliography.
#[must_use]
pub fn compute_source_destination(
    source_url: &str,
    entry_id: &str,
    bibliography_url: &str,
    rename: RenameOperation,
    user_defined_filename: &str,
) -> Option<(Url, Url)> {
    // Renaming after an empty entry id falls back to keeping the name
    let rename = if entry_id.is_empty() && rename == RenameOperation::EntryId {
        RenameOperation::KeepName
    } else {
        rename
    };

    let Some(Reference::Absolute(base)) = parse_reference(bibliography_url) else {
        return None;
    };
    let source = match parse_reference(source_url)? {
        Reference::Absolute(url) => url,
        Reference::Relative(path) => base.join(&path).ok()?,
    };

    let source_path = Path::new(source.path());
    let original_name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let suffix = source_path
        .extension()
        .map_or_else(|| "html".to_string(), |e| e.to_string_lossy().to_string());

    let mut filename = original_name.clone();
    if filename.is_empty() || rename == RenameOperation::EntryId {
        filename = format!("{entry_id}.{suffix}");
    }
    if filename.is_empty() || rename == RenameOperation::UserDefined {
        filename = user_defined_filename.to_string();
    }
    if filename.is_empty() {
        return None;
    }

    let mut target = base.clone();
    let target_dir = parent_path(base.path()).to_string();
    target.set_path(&format!("{target_dir}/{filename}"));
    Some((source, target))
}

/// Copy or move a document next to the bibliography and return the target
/// URL. Remote sources are downloaded through the shared client; remote
/// targets are not supported.
pub async fn copy_document(
    http: &HttpClient,
    source_url: &str,
    entry_id: &str,
    bibliography_url: &str,
    rename: RenameOperation,
    operation: MoveCopyOperation,
    user_defined_filename: &str,
) -> Result<Option<Url>> {
    if operation == MoveCopyOperation::None {
        // Nothing to copy or move, the reference stays where it is
        return Ok(parse_reference(source_url).and_then(|r| match r {
            Reference::Absolute(url) => Some(url),
            Reference::Relative(_) => None,
        }));
    }

    let Some((source, target)) = compute_source_destination(
        source_url,
        entry_id,
        bibliography_url,
        rename,
        user_defined_filename,
    ) else {
        warn!("Either source or target URL is invalid");
        return Err(Error::InvalidInput {
            field: "source_url".to_string(),
            reason: "cannot compute source and destination".to_string(),
        });
    };

    if target.scheme() != "file" {
        return Err(Error::Unsupported(
            "target bibliography must be a local file".to_string(),
        ));
    }
    let target_path = Path::new(target.path());

    if source.scheme() == "file" {
        let source_path = Path::new(source.path());
        let _ = tokio::fs::remove_file(target_path).await;
        tokio::fs::copy(source_path, target_path).await?;
        if operation == MoveCopyOperation::Move {
            tokio::fs::remove_file(source_path).await?;
        }
    } else {
        let response = http.get(&source, None).await?;
        let data = response.bytes().await?;
        tokio::fs::write(target_path, &data).await?;
    }

    Ok(Some(target))
}

/// Directory part of a URL path.
fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &path[..pos],
    }
}

/// File-system-style relative path from directory `from_dir` to `to_file`.
fn relative_path(from_dir: &str, to_file: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to_file.split('/').filter(|s| !s.is_empty()).collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from.len() {
        parts.push("..".to_string());
    }
    for segment in &to[common..] {
        parts.push((*segment).to_string());
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    /// Scenario: same host yields a relative path, different hosts yield
    /// the absolute document URL unchanged.
    #[test]
    fn relative_inside_one_host() {
        let result = relative_filename(
            "https://example.com/documents/paper.pdf",
            "https://example.com/bibliography/all.bib",
        );
        assert_eq!(result, "../documents/paper.pdf");
    }

    #[test]
    fn relative_across_hosts_stays_absolute() {
        let result = relative_filename(
            "https://other.org/documents/paper.pdf",
            "https://example.com/bibliography/all.bib",
        );
        assert_eq!(result, "https://other.org/documents/paper.pdf");
    }

    #[test]
    fn invalid_document_is_empty() {
        assert_eq!(relative_filename("", "https://example.com/b.bib"), "");
        assert_eq!(absolute_filename("", "https://example.com/b.bib"), "");
    }

    #[test]
    fn missing_base_renders_document_raw() {
        assert_eq!(
            relative_filename("https://example.com/d/p.pdf", ""),
            "https://example.com/d/p.pdf"
        );
        assert_eq!(
            relative_filename("file:///home/user/p.pdf", "not a base"),
            "/home/user/p.pdf"
        );
    }

    #[test]
    fn absolute_resolves_relative_documents() {
        let result = absolute_filename("papers/p.pdf", "file:///home/user/all.bib");
        assert_eq!(result, "/home/user/papers/p.pdf");
    }

    #[test]
    fn file_urls_share_a_host_by_definition() {
        let result = relative_filename("file:///home/user/docs/p.pdf", "file:///home/user/b/all.bib");
        assert_eq!(result, "../docs/p.pdf");
    }

    #[test]
    fn source_destination_with_entry_id_rename() {
        let (source, target) = compute_source_destination(
            "file:///downloads/fulltext.pdf",
            "doe2020",
            "file:///home/user/bib/all.bib",
            RenameOperation::EntryId,
            "",
        )
        .unwrap();
        assert_eq!(source.path(), "/downloads/fulltext.pdf");
        assert_eq!(target.path(), "/home/user/bib/doe2020.pdf");
    }

    #[test]
    fn source_destination_defaults_extension_to_html() {
        let (_, target) = compute_source_destination(
            "https://example.org/article",
            "doe2020",
            "file:///home/user/bib/all.bib",
            RenameOperation::EntryId,
            "",
        )
        .unwrap();
        assert_eq!(target.path(), "/home/user/bib/doe2020.html");
    }

    #[test]
    fn empty_entry_id_keeps_original_name() {
        let (_, target) = compute_source_destination(
            "file:///downloads/fulltext.pdf",
            "",
            "file:///home/user/bib/all.bib",
            RenameOperation::EntryId,
            "",
        )
        .unwrap();
        assert_eq!(target.path(), "/home/user/bib/fulltext.pdf");
    }

    #[test]
    fn insert_url_places_local_and_remote_fields() {
        let mut entry = BibEntry::new(EntryKind::Article, "a1");
        let reference = insert_url(
            "https://example.com/documents/paper.pdf",
            &mut entry,
            Some("https://example.com/bib/all.bib"),
            PathKind::Relative,
        );
        assert_eq!(reference, "../documents/paper.pdf");
        assert!(entry.contains(BibEntry::LOCALFILE) || entry.contains(BibEntry::URL));

        // Inserting the same reference twice leaves one copy
        let again = insert_url(
            "https://example.com/documents/paper.pdf",
            &mut entry,
            Some("https://example.com/bib/all.bib"),
            PathKind::Relative,
        );
        assert_eq!(again, reference);
        let total: usize = entry.fields().map(|(_, v)| v.len()).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn copy_document_between_local_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("source.pdf");
        tokio::fs::write(&source_path, b"%PDF-1.5 content").await.unwrap();
        let bib_path = dir.path().join("all.bib");
        tokio::fs::write(&bib_path, b"").await.unwrap();

        let http = HttpClient::new().unwrap();
        let target = copy_document(
            &http,
            &format!("file://{}", source_path.display()),
            "doe2020",
            &format!("file://{}", bib_path.display()),
            RenameOperation::EntryId,
            MoveCopyOperation::Copy,
            "",
        )
        .await
        .unwrap()
        .unwrap();

        assert!(target.path().ends_with("doe2020.pdf"));
        let copied = tokio::fs::read(Path::new(target.path())).await.unwrap();
        assert_eq!(copied, b"%PDF-1.5 content");
        // Copy keeps the source in place
        assert!(tokio::fs::metadata(&source_path).await.is_ok());
    }

    #[tokio::test]
    async fn move_document_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("moved.pdf");
        tokio::fs::write(&source_path, b"%PDF").await.unwrap();
        let bib_path = dir.path().join("all.bib");
        tokio::fs::write(&bib_path, b"").await.unwrap();

        let http = HttpClient::new().unwrap();
        let target = copy_document(
            &http,
            &format!("file://{}", source_path.display()),
            "id1",
            &format!("file://{}", bib_path.display()),
            RenameOperation::KeepName,
            MoveCopyOperation::Move,
            "",
        )
        .await
        .unwrap()
        .unwrap();

        assert!(target.path().ends_with("moved.pdf"));
        assert!(tokio::fs::metadata(&source_path).await.is_err());
    }

    #[test]
    fn none_operation_returns_source() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let http = HttpClient::new().unwrap();
        let result = rt
            .block_on(copy_document(
                &http,
                "file:///a/b.pdf",
                "x",
                "file:///c/all.bib",
                RenameOperation::KeepName,
                MoveCopyOperation::None,
                "",
            ))
            .unwrap();
        assert_eq!(result.unwrap().path(), "/a/b.pdf");
    }
}
