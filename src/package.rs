//! The root content descriptor (OPF package document).
//!
//! [`ContentDocument`] owns the parsed tree and exposes namespace-aware
//! access to the title, the author list, and the reading order. Edits stay
//! in memory until [`ContentDocument::save`] is called.

use crate::container::locate_rootfile;
use crate::dom::{Attribute, Document, Element, NodeId, NodeKind};
use crate::error::{ContainerError, DocumentError};
use crate::utils::escape_ascii;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Namespace of the package document itself.
pub const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";

/// Dublin Core metadata namespace.
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// MARC relator code for authors; EPUB 2 readers match roles against the
/// relator list, so the spelled-out word would be ignored.
const AUTHOR_ROLE: &str = "aut";

/// One entry of the reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    /// Path relative to the package document.
    pub href: String,
    /// MIME type declared in the manifest.
    pub media_type: String,
}

impl SpineItem {
    /// Whether this item is a markup content document.
    pub fn is_document(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html"
        )
    }
}

/// A parsed package document bound to its backing file.
#[derive(Debug)]
pub struct ContentDocument {
    path: PathBuf,
    document: Document,
    namespaces: BTreeMap<String, String>,
}

impl ContentDocument {
    /// Locates and opens the package document of an extracted container.
    pub fn open_container(root: &Path) -> Result<Self, ContainerError> {
        let path = locate_rootfile(root)?;
        Ok(Self::open(&path)?)
    }

    /// Opens a package document from disk.
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        let path = std::path::absolute(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let content = std::fs::read_to_string(&path).map_err(|source| DocumentError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_markup(path, &content)
    }

    /// Parses package markup that will be saved to `path`.
    pub fn from_markup(path: PathBuf, markup: &str) -> Result<Self, DocumentError> {
        let document = Document::parse(markup)?;
        let root = document
            .root_element()
            .ok_or_else(|| DocumentError::ElementNotFound("package".to_string()))?;

        let namespaces = document
            .element(root)
            .map(|element| {
                element
                    .attributes
                    .iter()
                    .filter(|attr| attr.is_namespace_declaration())
                    .map(|attr| {
                        let prefix = attr.key.strip_prefix("xmlns:").unwrap_or("");
                        (prefix.to_string(), attr.value.clone())
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            path,
            document,
            namespaces,
        })
    }

    /// Absolute path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that manifest hrefs are relative to.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }

    /// Namespace prefixes declared on the package element; the default
    /// namespace is keyed by the empty string.
    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }

    /// Text of the first title in the metadata section.
    pub fn get_title(&self) -> Option<String> {
        self.title_element()
            .map(|id| self.document.text_content(id))
    }

    /// Replaces the title text. Does nothing when there is no title element.
    pub fn set_title(&mut self, text: &str) {
        if let Some(id) = self.title_element() {
            self.document.set_text(id, escape_ascii(text));
        }
    }

    /// Text of every author element, in document order.
    pub fn get_authors(&self) -> Vec<String> {
        self.author_elements()
            .into_iter()
            .map(|id| self.document.text_content(id))
            .collect()
    }

    /// Replaces the author list.
    ///
    /// New elements go in at the position of the first existing author
    /// before the old ones are removed. Does nothing when the document has
    /// no author element to anchor on.
    pub fn set_authors(&mut self, authors: &[String]) {
        let existing = self.author_elements();
        let Some(&anchor) = existing.first() else {
            return;
        };
        let Some(name) = self.document.element(anchor).map(|el| el.name.clone()) else {
            return;
        };
        let opf_prefix = self.opf_attribute_prefix(anchor);

        for author in authors {
            let escaped = escape_ascii(author);
            let mut element = Element::new(name.as_str());
            element.attributes.push(Attribute {
                key: format!("{}:file-as", opf_prefix),
                value: escaped.clone(),
            });
            element.attributes.push(Attribute {
                key: format!("{}:role", opf_prefix),
                value: AUTHOR_ROLE.to_string(),
            });

            let id = self.document.create(NodeKind::Element(element));
            self.document.set_text(id, escaped);
            if let Err(err) = self.document.insert_before(anchor, id) {
                log::warn!("Could not insert author element: {}", err);
                return;
            }
        }

        for id in existing {
            self.document.detach(id);
        }
    }

    /// Content documents in reading order.
    ///
    /// Spine references are numbered in order; manifest items whose id is
    /// referenced land at that position. Unreferenced manifest items are
    /// left out, as are references with no manifest item.
    pub fn spine_items(&self) -> Vec<SpineItem> {
        let Some(package) = self.document.root_element() else {
            return Vec::new();
        };
        let doc = &self.document;

        let mut ordinals: HashMap<String, usize> = HashMap::new();
        let mut count = 0;
        if let Some(spine) = doc.find_first(package, OPF_NAMESPACE, "spine") {
            for child in doc.child_elements(spine) {
                if let Some(idref) = doc.attribute(child, "idref") {
                    ordinals.insert(idref, count);
                }
                count += 1;
            }
        }

        let mut slots: Vec<Option<SpineItem>> = vec![None; count];
        if let Some(manifest) = doc.find_first(package, OPF_NAMESPACE, "manifest") {
            for child in doc.child_elements(manifest) {
                let Some(ordinal) = doc
                    .attribute(child, "id")
                    .and_then(|id| ordinals.get(&id).copied())
                else {
                    continue;
                };
                slots[ordinal] = Some(SpineItem {
                    href: doc.attribute(child, "href").unwrap_or_default(),
                    media_type: doc.attribute(child, "media-type").unwrap_or_default(),
                });
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Writes the tree back to its backing file.
    pub fn save(&self) -> Result<(), DocumentError> {
        std::fs::write(&self.path, self.document.serialize()).map_err(|source| {
            DocumentError::Io {
                path: self.path.clone(),
                source,
            }
        })
    }

    /// Serialized markup of the current tree.
    pub fn to_markup(&self) -> String {
        self.document.serialize()
    }

    fn metadata_element(&self) -> Option<NodeId> {
        let package = self.document.root_element()?;
        self.document.find_first(package, OPF_NAMESPACE, "metadata")
    }

    fn title_element(&self) -> Option<NodeId> {
        let metadata = self.metadata_element()?;
        self.document.find_first(metadata, DC_NAMESPACE, "title")
    }

    fn author_elements(&self) -> Vec<NodeId> {
        match self.metadata_element() {
            Some(metadata) => self.document.find_all(metadata, DC_NAMESPACE, "creator"),
            None => Vec::new(),
        }
    }

    /// Prefix bound to the package namespace in scope at `anchor`, declaring
    /// `opf` on the package element if the namespace is only the default.
    fn opf_attribute_prefix(&mut self, anchor: NodeId) -> String {
        let mut current = Some(anchor);
        while let Some(node) = current {
            let bound = self.document.element(node).and_then(|element| {
                element.attributes.iter().find_map(|attr| {
                    attr.key
                        .strip_prefix("xmlns:")
                        .filter(|_| attr.value == OPF_NAMESPACE)
                        .map(str::to_string)
                })
            });
            if let Some(prefix) = bound {
                return prefix;
            }
            current = self.document.parent(node);
        }

        if let Some(package) = self.document.root_element() {
            self.document
                .set_attribute(package, "xmlns:opf", OPF_NAMESPACE);
        }
        self.namespaces
            .insert("opf".to_string(), OPF_NAMESPACE.to_string());
        "opf".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" xmlns:dc="http://purl.org/dc/elements/1.1/" version="2.0">
  <metadata xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>The Three-Body Problem</dc:title>
    <dc:creator opf:role="aut">Liu Cixin</dc:creator>
    <dc:language>en</dc:language>
    <dc:creator opf:role="trl">Ken Liu</dc:creator>
  </metadata>
  <manifest>
    <item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
    <item id="b" href="b.xhtml" media-type="application/xhtml+xml"/>
    <item id="c" href="c.xhtml" media-type="application/xhtml+xml"/>
    <item id="d" href="style.css" media-type="text/css"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="a"/>
    <itemref idref="c"/>
    <itemref idref="b"/>
  </spine>
</package>"#;

    const BARE_OPF: &str = r#"<package xmlns="http://www.idpf.org/2007/opf" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <metadata><dc:language>en</dc:language></metadata>
  <manifest/>
  <spine/>
</package>"#;

    fn write(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("content.opf");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn item(href: &str) -> SpineItem {
        SpineItem {
            href: href.to_string(),
            media_type: "application/xhtml+xml".to_string(),
        }
    }

    #[test]
    fn test_get_title() {
        let dir = TempDir::new().unwrap();
        let doc = ContentDocument::open(&write(&dir, OPF)).unwrap();
        assert_eq!(doc.get_title().as_deref(), Some("The Three-Body Problem"));
    }

    #[test]
    fn test_set_title_escapes_non_ascii() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, OPF);
        let mut doc = ContentDocument::open(&path).unwrap();

        doc.set_title("三体 & more");
        assert!(doc.to_markup().contains("<dc:title>&#19977;&#20307; &amp; more</dc:title>"));
        assert_eq!(doc.get_title().as_deref(), Some("三体 & more"));

        doc.save().unwrap();
        let reloaded = ContentDocument::open(&path).unwrap();
        assert_eq!(reloaded.get_title().as_deref(), Some("三体 & more"));
    }

    #[test]
    fn test_title_absent() {
        let dir = TempDir::new().unwrap();
        let mut doc = ContentDocument::open(&write(&dir, BARE_OPF)).unwrap();
        assert_eq!(doc.get_title(), None);

        let before = doc.to_markup();
        doc.set_title("x");
        assert_eq!(doc.get_title(), None);
        assert_eq!(doc.to_markup(), before);
    }

    #[test]
    fn test_get_authors_in_order() {
        let dir = TempDir::new().unwrap();
        let doc = ContentDocument::open(&write(&dir, OPF)).unwrap();
        assert_eq!(doc.get_authors(), vec!["Liu Cixin", "Ken Liu"]);
    }

    #[test]
    fn test_set_authors_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, OPF);
        let mut doc = ContentDocument::open(&path).unwrap();

        doc.set_authors(&["Ann".to_string(), "Bo".to_string()]);
        doc.save().unwrap();

        let reloaded = ContentDocument::open(&path).unwrap();
        assert_eq!(reloaded.get_authors(), vec!["Ann", "Bo"]);
    }

    #[test]
    fn test_set_authors_position_and_attributes() {
        let dir = TempDir::new().unwrap();
        let mut doc = ContentDocument::open(&write(&dir, OPF)).unwrap();

        doc.set_authors(&["刘慈欣".to_string()]);
        let markup = doc.to_markup();

        let expected = r#"<dc:creator opf:file-as="&#21016;&#24904;&#27427;" opf:role="aut">&#21016;&#24904;&#27427;</dc:creator>"#;
        let title_at = markup.find("<dc:title>").unwrap();
        let author_at = markup.find(expected).unwrap();
        let language_at = markup.find("<dc:language>").unwrap();
        assert!(title_at < author_at && author_at < language_at);
        assert!(!markup.contains("Ken Liu"));
        assert_eq!(doc.get_authors(), vec!["刘慈欣"]);
    }

    #[test]
    fn test_set_authors_declares_opf_prefix_when_missing() {
        let markup = r#"<package xmlns="http://www.idpf.org/2007/opf" xmlns:dc="http://purl.org/dc/elements/1.1/"><metadata><dc:creator>X</dc:creator></metadata></package>"#;
        let mut doc = ContentDocument::from_markup(PathBuf::from("/tmp/p.opf"), markup).unwrap();

        doc.set_authors(&["Y".to_string()]);
        let out = doc.to_markup();
        assert!(out.contains(r#"xmlns:opf="http://www.idpf.org/2007/opf""#));
        assert!(out.contains(r#"<dc:creator opf:file-as="Y" opf:role="aut">Y</dc:creator>"#));
        assert_eq!(doc.namespaces().get("opf").map(String::as_str), Some(OPF_NAMESPACE));
    }

    #[test]
    fn test_set_authors_without_anchor_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut doc = ContentDocument::open(&write(&dir, BARE_OPF)).unwrap();

        let before = doc.to_markup();
        doc.set_authors(&["Ann".to_string()]);
        assert!(doc.get_authors().is_empty());
        assert_eq!(doc.to_markup(), before);
    }

    #[test]
    fn test_spine_order_excludes_unreferenced() {
        let dir = TempDir::new().unwrap();
        let doc = ContentDocument::open(&write(&dir, OPF)).unwrap();
        assert_eq!(
            doc.spine_items(),
            vec![item("a.xhtml"), item("c.xhtml"), item("b.xhtml")]
        );
    }

    #[test]
    fn test_spine_skips_unknown_idref() {
        let markup = r#"<package xmlns="http://www.idpf.org/2007/opf"><manifest><item id="a" href="a.xhtml" media-type="application/xhtml+xml"/></manifest><spine><itemref idref="ghost"/><itemref idref="a"/></spine></package>"#;
        let doc = ContentDocument::from_markup(PathBuf::from("/tmp/p.opf"), markup).unwrap();
        assert_eq!(doc.spine_items(), vec![item("a.xhtml")]);
    }

    #[test]
    fn test_namespaces() {
        let dir = TempDir::new().unwrap();
        let doc = ContentDocument::open(&write(&dir, OPF)).unwrap();
        assert_eq!(doc.namespaces().get("").map(String::as_str), Some(OPF_NAMESPACE));
        assert_eq!(doc.namespaces().get("dc").map(String::as_str), Some(DC_NAMESPACE));
    }

    #[test]
    fn test_open_container() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("META-INF")).unwrap();
        std::fs::create_dir_all(dir.path().join("OEBPS")).unwrap();
        std::fs::write(
            dir.path().join("META-INF/container.xml"),
            r#"<container><rootfiles><rootfile full-path="OEBPS/content.opf"/></rootfiles></container>"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("OEBPS/content.opf"), OPF).unwrap();

        let doc = ContentDocument::open_container(dir.path()).unwrap();
        assert!(doc.base_dir().ends_with("OEBPS"));
        assert_eq!(doc.spine_items().len(), 3);
    }

    #[test]
    fn test_spine_item_is_document() {
        assert!(item("a.xhtml").is_document());
        let css = SpineItem {
            href: "s.css".to_string(),
            media_type: "text/css".to_string(),
        };
        assert!(!css.is_document());
    }
}
