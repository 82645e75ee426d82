//! Corpus loading.
//!
//! [`DirectoryLoader`] walks a directory and extracts the text of every
//! supported file. PDF extraction is delegated to `pdf-extract` and is only
//! available with the `pdf` feature; plain text and markdown are always
//! supported.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// A source of documents for ingestion.
pub trait DocumentLoader: Send + Sync {
    /// Load every document of the corpus.
    ///
    /// Blocking; the ingestion pipeline calls this from a blocking task.
    fn load(&self) -> Result<Vec<Document>>;
}

/// File formats the loader can extract text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Text,
    Markdown,
}

impl FileKind {
    /// Classify a path by extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Markdown => "markdown",
        }
    }
}

/// Loads every supported file below a directory, recursively.
///
/// Files are visited in path order so that repeated runs produce the same
/// document sequence. The document ID is the file path.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    kinds: Vec<FileKind>,
}

impl DirectoryLoader {
    /// Create a loader over `root` accepting PDF, text, and markdown files.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), kinds: vec![FileKind::Pdf, FileKind::Text, FileKind::Markdown] }
    }

    /// Restrict the loader to the given file kinds.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = FileKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn discover(&self) -> Result<Vec<(PathBuf, FileKind)>> {
        if !self.root.is_dir() {
            return Err(RagError::DocumentLoadError {
                path: self.root.clone(),
                message: "corpus directory not found".into(),
            });
        }

        let mut files = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                    warn!(%path, error = %e, "skipping unreadable corpus entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let kind = FileKind::from_path(entry.path())?;
                self.kinds.contains(&kind).then(|| (entry.into_path(), kind))
            })
            .collect::<Vec<_>>();

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

impl DocumentLoader for DirectoryLoader {
    fn load(&self) -> Result<Vec<Document>> {
        let files = self.discover()?;
        let mut documents = Vec::with_capacity(files.len());

        for (path, kind) in files {
            let text = extract_text(&path, kind)?;
            if text.trim().is_empty() {
                warn!(path = %path.display(), "skipping document with no extractable text");
                continue;
            }
            debug!(path = %path.display(), kind = kind.as_str(), chars = text.len(), "loaded document");

            let id = path.to_string_lossy().into_owned();
            documents.push(
                Document::new(id.clone(), text)
                    .with_metadata("source", id)
                    .with_metadata("file_type", kind.as_str()),
            );
        }

        if documents.is_empty() {
            return Err(RagError::DocumentLoadError {
                path: self.root.clone(),
                message: "no loadable documents found".into(),
            });
        }

        Ok(documents)
    }
}

fn extract_text(path: &Path, kind: FileKind) -> Result<String> {
    match kind {
        FileKind::Text | FileKind::Markdown => std::fs::read_to_string(path).map_err(|e| {
            RagError::DocumentLoadError { path: path.to_path_buf(), message: e.to_string() }
        }),
        FileKind::Pdf => extract_pdf(path),
    }
}

#[cfg(feature = "pdf")]
fn extract_pdf(path: &Path) -> Result<String> {
    pdf_extract::extract_text(path).map_err(|e| RagError::DocumentLoadError {
        path: path.to_path_buf(),
        message: format!("PDF text extraction failed: {e}"),
    })
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(path: &Path) -> Result<String> {
    Err(RagError::DocumentLoadError {
        path: path.to_path_buf(),
        message: "PDF support not enabled. Compile with --features pdf".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_text_and_markdown_in_path_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("b.txt"), "Second").unwrap();
        fs::write(root.join("nested/a.md"), "# Burns\nCool with water.").unwrap();
        fs::write(root.join("a.txt"), "First").unwrap();
        fs::write(root.join("notes.json"), "{}").unwrap();

        let docs = DirectoryLoader::new(root).load().unwrap();
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, ["First", "Second", "# Burns\nCool with water."]);
        assert_eq!(docs[2].metadata["file_type"], "markdown");
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("burns.txt"), "Cool the burn").unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone.txt"), temp.path().join("link.txt"))
            .unwrap();

        let docs = DirectoryLoader::new(temp.path()).load().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "Cool the burn");
    }

    #[test]
    fn missing_directory_is_a_load_error() {
        let err = DirectoryLoader::new("/definitely/not/here").load().unwrap_err();
        assert!(matches!(err, RagError::DocumentLoadError { .. }));
    }

    #[test]
    fn directory_without_documents_is_a_load_error() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("readme.json"), "{}").unwrap();
        fs::write(temp.path().join("blank.txt"), "   \n").unwrap();
        let err = DirectoryLoader::new(temp.path()).load().unwrap_err();
        assert!(matches!(err, RagError::DocumentLoadError { .. }));
    }

    #[test]
    fn kind_filter_skips_other_formats() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "text").unwrap();
        fs::write(temp.path().join("b.md"), "markdown").unwrap();
        let docs = DirectoryLoader::new(temp.path()).with_kinds([FileKind::Markdown]).load().unwrap();
        assert_eq!(docs.len(), 1);
    }
}
