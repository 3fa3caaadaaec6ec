//! Input validation: make sure a path names a readable PDF before pdfium
//! sees it.
//!
//! Checking the `%PDF` magic bytes up front turns "someone uploaded a JPEG"
//! into a clear [`MenuError::DocumentUnreadable`] instead of an opaque
//! pdfium load failure.

use crate::error::MenuError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn validate_pdf_path(path: &Path) -> Result<PathBuf, MenuError> {
    let unreadable = |reason: String| MenuError::DocumentUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    if !path.exists() {
        return Err(unreadable("file not found".into()));
    }
    if path.is_dir() {
        return Err(unreadable("path is a directory".into()));
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(unreadable("permission denied".into()));
        }
        Err(e) => return Err(unreadable(e.to_string())),
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() {
        return Err(unreadable("file is too short to be a PDF".into()));
    }
    if &magic != b"%PDF" {
        return Err(unreadable(format!("not a PDF (first bytes: {magic:?})")));
    }

    debug!("Validated PDF input: {}", path.display());
    Ok(path.to_path_buf())
}
