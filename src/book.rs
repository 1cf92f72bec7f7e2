//! Book-level driver: translates every spine document of an extracted
//! container, then its metadata.

use crate::error::BookError;
use crate::package::{ContentDocument, SpineItem};
use crate::translator::Translator;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Options for a book run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookOptions {
    /// Translate creator names as well as the title.
    pub translate_authors: bool,
}

/// Summary of a finished book run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookReport {
    /// Content documents rewritten with bilingual markup.
    pub documents: Vec<PathBuf>,
    /// Spine entries whose files were missing.
    pub skipped: Vec<String>,
    /// Title stored in the package document, if there was one.
    pub title: Option<String>,
}

/// Translates the extracted container rooted at `root` in place.
///
/// Documents are processed in reading order and kept in memory; nothing is
/// written until every document and the metadata have been translated, so
/// the first failure leaves the book exactly as it was.
pub async fn translate_book(
    root: &Path,
    translator: &Translator,
    options: BookOptions,
) -> Result<BookReport, BookError> {
    let mut package = ContentDocument::open_container(root)?;
    let items: Vec<SpineItem> = package
        .spine_items()
        .into_iter()
        .filter(SpineItem::is_document)
        .collect();

    info!(
        "Opened {} with {} content documents",
        package.path().display(),
        items.len()
    );

    let mut report = BookReport::default();
    let mut pages = Vec::with_capacity(items.len());
    for (number, item) in items.iter().enumerate() {
        let Some(path) = resolve_href(package.base_dir(), &item.href) else {
            warn!("Skipping spine entry with unusable href: {}", item.href);
            report.skipped.push(item.href.clone());
            continue;
        };

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            warn!("Skipping missing content document: {}", path.display());
            report.skipped.push(item.href.clone());
            continue;
        }

        info!(
            "Translating document {}/{}: {}",
            number + 1,
            items.len(),
            item.href
        );
        let translated = translate_document(&path, translator).await?;
        pages.push((path, translated));
    }

    if let Some(title) = package.get_title() {
        let translated = translator
            .translate(&title)
            .await
            .map_err(|source| BookError::Translation {
                target: "title".to_string(),
                source,
            })?;
        package.set_title(&translated);
        report.title = Some(translated);
    }

    if options.translate_authors {
        let mut authors = Vec::new();
        for author in package.get_authors() {
            let translated = translator
                .translate(&author)
                .await
                .map_err(|source| BookError::Translation {
                    target: format!("author {}", author),
                    source,
                })?;
            authors.push(translated);
        }
        if !authors.is_empty() {
            package.set_authors(&authors);
        }
    }

    for (path, markup) in pages {
        tokio::fs::write(&path, markup)
            .await
            .map_err(|source| BookError::Io {
                path: path.clone(),
                source,
            })?;
        report.documents.push(path);
    }

    package.save()?;
    Ok(report)
}

async fn translate_document(path: &Path, translator: &Translator) -> Result<String, BookError> {
    let markup = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BookError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    translator
        .translate_page(&markup)
        .await
        .map_err(|source| BookError::Translation {
            target: path.display().to_string(),
            source,
        })
}

/// Resolves a manifest href against the package directory.
///
/// Hrefs are URLs, so percent-escapes and `..` segments are honored.
fn resolve_href(base_dir: &Path, href: &str) -> Option<PathBuf> {
    let base = url::Url::from_directory_path(base_dir).ok()?;
    let resolved = base.join(href).ok()?;
    if resolved.scheme() != "file" {
        return None;
    }
    resolved.to_file_path().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_href_relative() {
        let path = resolve_href(Path::new("/book/OEBPS"), "text/ch1.xhtml").unwrap();
        assert_eq!(path, PathBuf::from("/book/OEBPS/text/ch1.xhtml"));
    }

    #[test]
    fn test_resolve_href_decodes_and_normalizes() {
        let path = resolve_href(Path::new("/book/OEBPS"), "../Text/chapter%201.xhtml").unwrap();
        assert_eq!(path, PathBuf::from("/book/Text/chapter 1.xhtml"));
    }

    #[test]
    fn test_resolve_href_rejects_remote() {
        assert!(resolve_href(Path::new("/book"), "https://example.com/a.xhtml").is_none());
    }
}
