//! Document readers for docdex.
//!
//! Produces text plus provenance metadata from the supported file kinds:
//!
//! - plain text (`txt`, `md`, `rst`): resumable byte-offset slices via
//!   [`text::read_from`]
//! - PDF (`pdf`): page-wise text and Info-dictionary metadata via
//!   [`PdfReader`]
//!
//! Extension matching is case-sensitive: `Notes.TXT` is not indexed.

pub mod pdf;
pub mod text;

pub use pdf::{PdfMetadata, PdfReader};

use std::path::Path;

/// File extensions the engine indexes, matched case-sensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["txt", "pdf", "md", "rst"];

/// How a supported document is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Pdf,
}

/// Classify a path by its suffix. Returns `None` for unsupported files.
pub fn kind_for_path(path: &Path) -> Option<DocumentKind> {
    match path.extension()?.to_str()? {
        "pdf" => Some(DocumentKind::Pdf),
        "txt" | "md" | "rst" => Some(DocumentKind::PlainText),
        _ => None,
    }
}
