//! Text extraction for uploaded documents (PDF, DOCX, TXT).
//!
//! Extraction picks a loader by file extension (case-insensitive) and
//! returns [`Document`]s with `source` and `file_name` metadata. PDFs yield
//! one document per page with `page` (0-based) and `total_pages`.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Document, Metadata, FILE_NAME_KEY, PAGE_KEY, SOURCE_KEY};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Txt,
}

impl FileKind {
    /// Classifies a path by extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(FileKind::Pdf),
            "docx" => Ok(FileKind::Docx),
            "txt" => Ok(FileKind::Txt),
            _ => Err(Error::UnsupportedFileType(if ext.is_empty() {
                path.display().to_string()
            } else {
                format!(".{}", ext)
            })),
        }
    }
}

/// Extracts every path, skipping unsupported types with a warning and
/// dropping documents with no text. A supported file that fails to parse
/// is an error.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for path in paths {
        match extract_file(path) {
            Ok(found) => {
                let before = docs.len();
                docs.extend(found.into_iter().filter(|d| !d.page_content.trim().is_empty()));
                debug!(path = %path.display(), documents = docs.len() - before, "extracted");
            }
            Err(Error::UnsupportedFileType(ext)) => {
                warn!(path = %path.display(), extension = %ext, "unsupported file type skipped");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(docs)
}

/// Extracts one file from disk.
pub fn extract_file(path: &Path) -> Result<Vec<Document>> {
    let kind = FileKind::from_path(path)?;
    let bytes = std::fs::read(path)?;
    extract_bytes(&bytes, kind, path)
}

/// Extracts in-memory content that was (or will be) stored at `path`.
pub fn extract_bytes(bytes: &[u8], kind: FileKind, path: &Path) -> Result<Vec<Document>> {
    let base = base_metadata(path);
    match kind {
        FileKind::Pdf => {
            let pages = pdf_pages(bytes, path)?;
            let total = pages.len();
            Ok(pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| {
                    let mut md = base.clone();
                    md.insert(PAGE_KEY.to_string(), Value::from(i));
                    md.insert("total_pages".to_string(), Value::from(total));
                    Document::new(text, md)
                })
                .collect())
        }
        FileKind::Docx => Ok(vec![Document::new(docx_text(bytes, path)?, base)]),
        FileKind::Txt => {
            let text = std::str::from_utf8(bytes).map_err(|e| Error::Extraction {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            Ok(vec![Document::new(text, base)])
        }
    }
}

/// Reads a PDF from disk, one string per page.
pub fn read_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    pdf_pages(&bytes, path)
}

fn base_metadata(path: &Path) -> Metadata {
    let mut md = Metadata::new();
    md.insert(SOURCE_KEY.to_string(), Value::String(path.display().to_string()));
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        md.insert(FILE_NAME_KEY.to_string(), Value::String(name.to_string()));
    }
    md
}

fn pdf_pages(bytes: &[u8], path: &Path) -> Result<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| Error::Extraction {
        path: path.to_path_buf(),
        reason: format!("PDF extraction failed: {}", e),
    })
}

fn docx_text(bytes: &[u8], path: &Path) -> Result<String> {
    let ooxml = |reason: String| Error::Extraction {
        path: path.to_path_buf(),
        reason,
    };
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ooxml("word/document.xml not found".to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ooxml(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml("word/document.xml exceeds size limit".to_string()));
    }
    word_paragraphs(&xml).map_err(ooxml)
}

/// Collects `<w:t>` runs, one line per `<w:p>` paragraph.
fn word_paragraphs(xml: &[u8]) -> std::result::Result<String, String> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn kind_by_extension_is_case_insensitive() {
        assert_eq!(FileKind::from_path(Path::new("a/B.PDF")).unwrap(), FileKind::Pdf);
        assert_eq!(FileKind::from_path(Path::new("x.Docx")).unwrap(), FileKind::Docx);
        assert_eq!(FileKind::from_path(Path::new("notes.txt")).unwrap(), FileKind::Txt);
        assert!(matches!(
            FileKind::from_path(Path::new("sheet.xlsx")),
            Err(Error::UnsupportedFileType(e)) if e == ".xlsx"
        ));
        assert!(FileKind::from_path(Path::new("README")).is_err());
    }

    #[test]
    fn txt_sets_source_and_file_name() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "hello world").unwrap();
        let docs = extract_file(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "hello world");
        assert_eq!(docs[0].metadata[SOURCE_KEY], Value::String(path.display().to_string()));
        assert_eq!(docs[0].metadata[FILE_NAME_KEY], "notes.txt");
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memo.docx");
        std::fs::write(&path, docx_bytes(&["First paragraph.", "Second &amp; last."])).unwrap();
        let docs = extract_file(&path).unwrap();
        assert_eq!(docs[0].page_content, "First paragraph.\nSecond & last.");
    }

    #[test]
    fn invalid_pdf_is_extraction_error() {
        let err = extract_bytes(b"not a pdf", FileKind::Pdf, Path::new("x.pdf")).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn invalid_zip_is_extraction_error() {
        let err = extract_bytes(b"not a zip", FileKind::Docx, Path::new("x.docx")).unwrap_err();
        assert!(err.to_string().contains("x.docx"));
    }

    #[test]
    fn load_skips_unsupported_and_blank() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("a.txt");
        let blank = tmp.path().join("b.txt");
        let other = tmp.path().join("c.csv");
        std::fs::write(&good, "content").unwrap();
        std::fs::write(&blank, "  \n ").unwrap();
        std::fs::write(&other, "x,y").unwrap();
        let docs = load_documents(&[good, blank, other]).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "content");
    }

    #[test]
    fn load_with_only_unsupported_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("slides.pptx");
        std::fs::write(&path, "x").unwrap();
        assert!(load_documents(&[path]).unwrap().is_empty());
    }
}
