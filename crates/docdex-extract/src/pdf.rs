//! PDF page reader.
//!
//! Uses lopdf to pull text one page at a time so the scan scheduler can
//! spread a large PDF across ticks, and copies the Info-dictionary
//! metadata (title, author, subject, keywords) onto every page's chunks.

use docdex_core::ExtractError;
use lopdf::{Document, Object};
use std::path::Path;
use tracing::debug;

/// Document-level metadata from the PDF Info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
}

/// A loaded PDF, readable page by page.
#[derive(Debug)]
pub struct PdfReader {
    doc: Document,
    page_count: usize,
    metadata: PdfMetadata,
}

impl PdfReader {
    /// Load a PDF from disk. Load failures are reported as corrupt.
    pub fn load(path: &Path) -> Result<Self, ExtractError> {
        let doc = Document::load(path)
            .map_err(|e| ExtractError::Corrupt(format!("{}: {e}", path.display())))?;
        let page_count = doc.get_pages().len();
        let metadata = read_metadata(&doc);
        debug!(path = %path.display(), pages = page_count, "loaded pdf");
        Ok(Self {
            doc,
            page_count,
            metadata,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn metadata(&self) -> &PdfMetadata {
        &self.metadata
    }

    /// Extract the full text of one page, 1-based.
    pub fn page_text(&self, page: usize) -> Result<String, ExtractError> {
        if page == 0 || page > self.page_count {
            return Ok(String::new());
        }
        self.doc
            .extract_text(&[page as u32])
            .map_err(|e| ExtractError::Corrupt(format!("page {page}: {e}")))
    }
}

fn read_metadata(doc: &Document) -> PdfMetadata {
    let mut meta = PdfMetadata::default();
    let Ok(info) = doc.trailer.get(b"Info") else {
        return meta;
    };
    let dict = match info {
        Object::Reference(id) => match doc.get_dictionary(*id) {
            Ok(d) => d,
            Err(_) => return meta,
        },
        Object::Dictionary(d) => d,
        _ => return meta,
    };

    meta.title = string_entry(dict, b"Title");
    meta.author = string_entry(dict, b"Author");
    meta.subject = string_entry(dict, b"Subject");
    meta.keywords = string_entry(dict, b"Keywords");
    meta
}

fn string_entry(dict: &lopdf::Dictionary, key: &[u8]) -> String {
    match dict.get(key) {
        Ok(Object::String(bytes, _)) => decode_text_string(bytes),
        _ => String::new(),
    }
}

/// Decode a PDF text string: UTF-16BE when BOM-prefixed, byte text otherwise.
fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xfe, 0xff]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use lopdf::{Object, Stream, StringFormat};

    /// Build a minimal one-page PDF with the given content text and info.
    fn sample_pdf(text: &str, title: &str) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let content = lopdf::content::Content {
            operations: vec![
                lopdf::content::Operation::new("BT", vec![]),
                lopdf::content::Operation::new("Tf", vec!["F1".into(), 24.into()]),
                lopdf::content::Operation::new("Td", vec![100.into(), 600.into()]),
                lopdf::content::Operation::new(
                    "Tj",
                    vec![Object::string_literal(text)],
                ),
                lopdf::content::Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
            "Author" => Object::String(b"Ada".to_vec(), StringFormat::Literal),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc
    }

    #[test]
    fn reads_page_text_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.pdf");
        sample_pdf("quarterly report", "Q3").save(&path).unwrap();

        let reader = PdfReader::load(&path).unwrap();
        assert_eq!(reader.page_count(), 1);
        assert_eq!(reader.metadata().title, "Q3");
        assert_eq!(reader.metadata().author, "Ada");
        assert!(reader.metadata().subject.is_empty());

        let text = reader.page_text(1).unwrap();
        assert!(text.contains("quarterly report"));
    }

    #[test]
    fn out_of_range_page_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.pdf");
        sample_pdf("body", "t").save(&path).unwrap();

        let reader = PdfReader::load(&path).unwrap();
        assert_eq!(reader.page_text(0).unwrap(), "");
        assert_eq!(reader.page_text(2).unwrap(), "");
    }

    #[test]
    fn garbage_file_reports_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        let err = PdfReader::load(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt(_)));
    }

    #[test]
    fn decodes_utf16be_text_strings() {
        let mut bytes = vec![0xfe, 0xff];
        for unit in "Résumé".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_text_string(&bytes), "Résumé");
        assert_eq!(decode_text_string(b"plain"), "plain");
    }
}
