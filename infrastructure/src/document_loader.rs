use anyhow::{anyhow, Context};
use docx_rs::{read_docx, DocumentChild};
use domain::models::Document;
use memmap2::Mmap;
use rayon::prelude::*;
use shared::types::Result;
use shared::utils::{extension_of, is_supported_file, TEXT_EXTENSIONS};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Text,
    Pdf,
    Docx,
}

impl DocumentKind {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = extension_of(path);
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ if TEXT_EXTENSIONS.contains(&ext.as_str()) => Some(Self::Text),
            _ => None,
        }
    }
}

/// Reads every supported file under a directory into a [`Document`].
pub struct DocumentLoader {
    root_path: PathBuf,
    ignored_dirs: HashSet<String>,
    max_file_bytes: u64,
}

impl DocumentLoader {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ignored_dirs: [
                ".git",
                "target",
                "node_modules",
                ".next",
                "dist",
                "build",
                ".idea",
                ".vscode",
                ".cache",
                "venv",
                "__pycache__",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_file_bytes: 10 * 1024 * 1024,
        }
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn load(&self) -> Result<Vec<Document>> {
        let files = self.collect_files()?;
        debug!(files = files.len(), "decoding documents in parallel");
        let loaded: Vec<Result<Option<Document>>> =
            files.par_iter().map(|path| self.load_file(path)).collect();

        let mut documents = Vec::with_capacity(loaded.len());
        for res in loaded {
            if let Some(doc) = res? {
                documents.push(doc);
            }
        }
        Ok(documents)
    }

    /// Supported files under the root, sorted so ingestion order is stable.
    pub fn collect_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root_path.is_dir() {
            return Err(anyhow!(
                "documents directory {} does not exist or is not a directory",
                self.root_path.display()
            ));
        }
        let mut files = Vec::new();
        self.collect_files_recursive(&self.root_path, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn collect_files_recursive(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read directory {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_symlink() && path.is_dir() {
                warn!(path = %path.display(), "skipping symlinked directory");
                continue;
            }
            if file_type.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if self.ignored_dirs.contains(name) {
                        continue;
                    }
                }
                self.collect_files_recursive(&path, files)?;
            } else if is_supported_file(&path) {
                files.push(path);
            } else {
                warn!(path = %path.display(), "skipping unsupported file");
            }
        }
        Ok(())
    }

    fn load_file(&self, path: &Path) -> Result<Option<Document>> {
        let Some(kind) = DocumentKind::from_path(path) else {
            return Ok(None);
        };
        let meta = path
            .metadata()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if meta.len() > self.max_file_bytes {
            warn!(
                path = %path.display(),
                bytes = meta.len(),
                limit = self.max_file_bytes,
                "skipping oversized file"
            );
            return Ok(None);
        }
        if meta.len() == 0 {
            return Ok(None);
        }

        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        // SAFETY: the map is read-only and dropped before this function returns.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map {}", path.display()))?;

        let extracted = match kind {
            // Invalid UTF-8 is replaced, never rejected.
            DocumentKind::Text => Ok(String::from_utf8_lossy(&mmap).into_owned()),
            DocumentKind::Pdf => {
                pdf_extract::extract_text_from_mem(&mmap).map_err(|e| anyhow!("{e}"))
            }
            DocumentKind::Docx => extract_docx_text(&mmap),
        };
        let text = match extracted {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable document");
                return Ok(None);
            }
        };

        if text.trim().is_empty() {
            debug!(path = %path.display(), "document has no text");
            return Ok(None);
        }

        let hash = format!("{:x}", md5::compute(text.as_bytes()));
        Ok(Some(Document {
            id: self.document_id(path),
            source: path.to_string_lossy().to_string(),
            text,
            hash,
        }))
    }

    fn document_id(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root_path).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn extract_docx_text(bytes: &[u8]) -> Result<String> {
    let docx = read_docx(bytes).map_err(|e| anyhow!("{e}"))?;
    let mut text = String::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(p) = child {
            text.push_str(&p.raw_text());
            text.push('\n');
        }
    }
    Ok(text)
}
