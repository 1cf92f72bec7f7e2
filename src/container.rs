//! Locating the root content descriptor of an extracted container.

use crate::dom::Document;
use crate::error::ContainerError;
use std::path::{Path, PathBuf};

/// Pointer file location relative to the container root.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Resolves the absolute path of the root content descriptor (the OPF file)
/// named by the first `rootfile` entry of `META-INF/container.xml`.
pub fn locate_rootfile(root: &Path) -> Result<PathBuf, ContainerError> {
    let container = root.join(CONTAINER_PATH);
    let content = std::fs::read_to_string(&container).map_err(|source| ContainerError::Io {
        path: container.clone(),
        source,
    })?;

    let full_path = rootfile_full_path(&content)?
        .ok_or_else(|| ContainerError::MissingRootfile { container })?;

    let joined = root.join(full_path);
    std::path::absolute(&joined).map_err(|source| ContainerError::Io {
        path: joined,
        source,
    })
}

/// Reads the `full-path` of the first `rootfile` element, if any.
fn rootfile_full_path(content: &str) -> Result<Option<String>, ContainerError> {
    let doc = Document::parse(content)?;
    let rootfile = doc.find_all_local(doc.root(), "rootfile").into_iter().next();
    Ok(rootfile
        .and_then(|id| doc.attribute(id, "full-path"))
        .filter(|path| !path.is_empty()))
}
