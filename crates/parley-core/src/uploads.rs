//! Local storage of uploaded files before they are sent to the remote model.

use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory that receives a copy of every upload.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    /// Open the directory, creating it if needed.
    pub async fn new(root: PathBuf) -> io::Result<Self> {
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` under a unique, sanitized name derived from `filename`.
    pub async fn store(&self, filename: &str, data: &[u8]) -> io::Result<PathBuf> {
        let stored_name = format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(filename));
        let path = self.root.join(stored_name);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Delete a stored copy. A file that is already gone is not an error.
    pub async fn remove(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// The file name a browser sent, stripped of any client-side directory.
pub fn display_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

/// Reduce `filename` to a safe single path component.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; whitespace becomes `_`;
/// everything else is dropped. Leading dots are stripped so the result is
/// never hidden or a parent reference.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = display_name(filename)
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c),
            '.' | '-' | '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
