//! PDF handling for the analysis and comparison features.
//!
//! Both handlers work inside a per-session directory under their own base
//! (`[storage].analysis_base`, `[storage].compare_base`).

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::extract::read_pdf_pages;
use crate::session::{generate_session_id, resolve_dir};
use crate::upload::{safe_file_name, UploadedFile};

/// Name the reference document is stored under in a comparison session.
pub const REFERENCE_FILE: &str = "reference.pdf";
/// Name the actual (revised) document is stored under.
pub const ACTUAL_FILE: &str = "actual.pdf";

fn require_pdf(name: &str) -> Result<()> {
    let is_pdf = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        Ok(())
    } else {
        Err(Error::UnsupportedFileType(name.to_string()))
    }
}

fn open_session(base: &Path, session_id: Option<&str>, prefix: &str) -> Result<(String, PathBuf)> {
    let id = match session_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => generate_session_id(prefix),
    };
    let dir = resolve_dir(base, &id, true)?;
    Ok((id, dir))
}

/// Renders pages with `--- Page N ---` separators (1-based).
pub fn format_pages(pages: &[String], skip_blank: bool) -> String {
    pages
        .iter()
        .enumerate()
        .filter(|(_, text)| !(skip_blank && text.trim().is_empty()))
        .map(|(i, text)| format!("\n--- Page {} ---\n{}", i + 1, text.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Joins named documents into the comparison prompt input.
pub fn combine_texts(docs: &[(String, String)]) -> String {
    docs.iter()
        .map(|(name, content)| format!("Document: {}\n{}", name, content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Saves and reads single PDFs for analysis.
#[derive(Debug, Clone)]
pub struct DocHandler {
    session_id: String,
    session_path: PathBuf,
}

impl DocHandler {
    pub fn new(data_dir: &Path, session_id: Option<&str>) -> Result<Self> {
        let (session_id, session_path) = open_session(data_dir, session_id, "session")?;
        info!(session_id = %session_id, path = %session_path.display(), "doc handler ready");
        Ok(Self {
            session_id,
            session_path,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Writes `upload` into the session directory. Only `.pdf` is accepted.
    pub fn save_pdf(&self, upload: &dyn UploadedFile) -> Result<PathBuf> {
        let name = safe_file_name(upload.file_name())?;
        require_pdf(&name)?;
        let path = self.session_path.join(name);
        std::fs::write(&path, upload.bytes())?;
        info!(session_id = %self.session_id, path = %path.display(), "PDF saved");
        Ok(path)
    }

    /// Full text of a PDF with page separators.
    pub fn read_pdf(&self, path: &Path) -> Result<String> {
        let pages = read_pdf_pages(path)?;
        info!(path = %path.display(), pages = pages.len(), "PDF read");
        Ok(format_pages(&pages, false))
    }
}

/// Saves a reference/actual PDF pair and combines their text.
#[derive(Debug, Clone)]
pub struct ComparisonIngestor {
    session_id: String,
    session_path: PathBuf,
}

impl ComparisonIngestor {
    pub fn new(base_dir: &Path, session_id: Option<&str>) -> Result<Self> {
        let (session_id, session_path) = open_session(base_dir, session_id, "session")?;
        Ok(Self {
            session_id,
            session_path,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Stores both uploads under fixed names so a pair never collides.
    pub fn save_uploaded_files(
        &self,
        reference: &dyn UploadedFile,
        actual: &dyn UploadedFile,
    ) -> Result<(PathBuf, PathBuf)> {
        require_pdf(&safe_file_name(reference.file_name())?)?;
        require_pdf(&safe_file_name(actual.file_name())?)?;

        let ref_path = self.session_path.join(REFERENCE_FILE);
        let act_path = self.session_path.join(ACTUAL_FILE);
        std::fs::write(&ref_path, reference.bytes())?;
        std::fs::write(&act_path, actual.bytes())?;
        info!(
            session_id = %self.session_id,
            reference = %reference.file_name(),
            actual = %actual.file_name(),
            "comparison pair saved"
        );
        Ok((ref_path, act_path))
    }

    /// Text of one PDF, blank pages omitted.
    pub fn read_pdf(&self, path: &Path) -> Result<String> {
        Ok(format_pages(&read_pdf_pages(path)?, true))
    }

    /// Reference then actual, each prefixed with `Document: <name>`.
    pub fn combine_documents(&self) -> Result<String> {
        let mut docs = Vec::with_capacity(2);
        for name in [REFERENCE_FILE, ACTUAL_FILE] {
            let path = self.session_path.join(name);
            if path.is_file() {
                docs.push((name.to_string(), self.read_pdf(&path)?));
            }
        }
        if docs.is_empty() {
            return Err(Error::NoValidDocuments);
        }
        let combined = combine_texts(&docs);
        info!(session_id = %self.session_id, documents = docs.len(), "documents combined");
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::InMemoryUpload;
    use tempfile::TempDir;

    #[test]
    fn pages_are_numbered_from_one() {
        let pages = vec!["first".to_string(), "  ".to_string(), "third\n".to_string()];
        assert_eq!(
            format_pages(&pages, false),
            "\n--- Page 1 ---\nfirst\n\n--- Page 2 ---\n\n\n--- Page 3 ---\nthird"
        );
        assert_eq!(
            format_pages(&pages, true),
            "\n--- Page 1 ---\nfirst\n\n--- Page 3 ---\nthird"
        );
    }

    #[test]
    fn combine_prefixes_names() {
        let docs = vec![
            ("reference.pdf".to_string(), "A".to_string()),
            ("actual.pdf".to_string(), "B".to_string()),
        ];
        assert_eq!(
            combine_texts(&docs),
            "Document: reference.pdf\nA\n\nDocument: actual.pdf\nB"
        );
    }

    #[test]
    fn doc_handler_accepts_only_pdf() {
        let tmp = TempDir::new().unwrap();
        let handler = DocHandler::new(tmp.path(), Some("s1")).unwrap();
        assert_eq!(handler.session_path(), tmp.path().join("s1"));

        let saved = handler
            .save_pdf(&InMemoryUpload::new("dir/Report.PDF", b"%PDF-1.4".to_vec()))
            .unwrap();
        assert_eq!(saved, tmp.path().join("s1/Report.PDF"));

        let err = handler
            .save_pdf(&InMemoryUpload::new("notes.txt", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType(_)));
    }

    #[test]
    fn generated_sessions_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let a = ComparisonIngestor::new(tmp.path(), None).unwrap();
        let b = ComparisonIngestor::new(tmp.path(), None).unwrap();
        assert_ne!(a.session_path(), b.session_path());
        assert!(a.session_id().starts_with("session_"));
    }

    #[test]
    fn comparison_pair_uses_fixed_names() {
        let tmp = TempDir::new().unwrap();
        let ing = ComparisonIngestor::new(tmp.path(), Some("c1")).unwrap();
        let (r, a) = ing
            .save_uploaded_files(
                &InMemoryUpload::new("v1.pdf", "one"),
                &InMemoryUpload::new("v1.pdf", "two"),
            )
            .unwrap();
        assert_eq!(std::fs::read_to_string(r).unwrap(), "one");
        assert_eq!(std::fs::read_to_string(a).unwrap(), "two");

        let err = ing
            .save_uploaded_files(
                &InMemoryUpload::new("v1.pdf", "one"),
                &InMemoryUpload::new("v2.docx", "two"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType(_)));
    }

    #[test]
    fn combine_without_files_fails() {
        let tmp = TempDir::new().unwrap();
        let ing = ComparisonIngestor::new(tmp.path(), Some("empty")).unwrap();
        assert!(matches!(ing.combine_documents(), Err(Error::NoValidDocuments)));
    }
}
