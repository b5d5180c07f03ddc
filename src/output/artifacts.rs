//! On-disk artifact layout
//!
//! Everything a crawl saves lives under one storage root:
//!
//! ```text
//! <root>/pages/<fingerprint>.md
//! <root>/pdfs/<fingerprint>.pdf
//! <root>/images/<fingerprint><ext>
//! ```
//!
//! Files are written to a `.part` sibling first and renamed into place, so an
//! interrupted run never leaves a truncated artifact under its final name.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The three artifact families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Page,
    Pdf,
    Image,
}

impl ArtifactKind {
    /// Subdirectory of the storage root
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Page => "pages",
            ArtifactKind::Pdf => "pdfs",
            ArtifactKind::Image => "images",
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            ArtifactKind::Page => "page",
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Image => "image",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "page" => Some(ArtifactKind::Page),
            "pdf" => Some(ArtifactKind::Pdf),
            "image" => Some(ArtifactKind::Image),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// File extension for a binary content type, including the dot
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    match mime.to_ascii_lowercase().as_str() {
        "application/pdf" => Some(".pdf"),
        "image/jpeg" | "image/jpg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/svg+xml" => Some(".svg"),
        "image/bmp" => Some(".bmp"),
        _ => None,
    }
}

/// Directory tree for one storage root
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens a store, creating `pages/`, `pdfs/` and `images/` as needed
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self { root: root.into() };
        for kind in [ArtifactKind::Page, ArtifactKind::Pdf, ArtifactKind::Image] {
            fs::create_dir_all(store.dir(kind))?;
        }
        tracing::debug!("Artifact store ready at {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// `<root>/pages/<fingerprint>.md`
    pub fn page_path(&self, fingerprint: &str) -> PathBuf {
        self.dir(ArtifactKind::Page).join(format!("{}.md", fingerprint))
    }

    /// `<root>/<kind dir>/<fingerprint><ext>`
    ///
    /// `ext` must carry its leading dot.
    pub fn binary_path(&self, kind: ArtifactKind, fingerprint: &str, ext: &str) -> PathBuf {
        self.dir(kind).join(format!("{}{}", fingerprint, ext))
    }

    /// Writes a page, replacing any previous copy
    pub fn write_page(&self, fingerprint: &str, content: &str) -> io::Result<PathBuf> {
        let path = self.page_path(fingerprint);
        write_atomic(&path, content.as_bytes())?;
        Ok(path)
    }

    /// Writes a PDF or image
    pub fn write_binary(
        &self,
        kind: ArtifactKind,
        fingerprint: &str,
        ext: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let path = self.binary_path(kind, fingerprint, ext);
        write_atomic(&path, bytes)?;
        Ok(path)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    fs::write(&partial, bytes)?;
    fs::rename(&partial, path)
}
