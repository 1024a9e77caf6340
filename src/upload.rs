//! Uploaded file abstraction and persistence into session directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};

/// A file received from a client: a name and its bytes.
pub trait UploadedFile: Send + Sync {
    /// Client-supplied name; may contain directory components.
    fn file_name(&self) -> &str;
    fn bytes(&self) -> &[u8];
}

/// Upload held fully in memory, as produced by multipart parsing.
#[derive(Debug, Clone)]
pub struct InMemoryUpload {
    name: String,
    data: Vec<u8>,
}

impl InMemoryUpload {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl UploadedFile for InMemoryUpload {
    fn file_name(&self) -> &str {
        &self.name
    }
    fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Final path component of a client-supplied name, accepting either
/// separator.
pub fn safe_file_name(name: &str) -> Result<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(Error::UnsupportedFileType(name.to_string()));
    }
    Ok(base.to_string())
}

/// Writes one upload into `dir` under its base name.
pub fn save_uploaded_file(dir: &Path, upload: &dyn UploadedFile) -> Result<PathBuf> {
    let name = safe_file_name(upload.file_name())?;
    write_upload(dir, &name, upload)
}

fn write_upload(dir: &Path, name: &str, upload: &dyn UploadedFile) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, upload.bytes())?;
    info!(path = %path.display(), bytes = upload.bytes().len(), "saved upload");
    Ok(path)
}

/// Writes every upload into `dir`, returning saved paths in input order.
///
/// Uploads whose base names collide within the batch are saved as
/// `stem_1.ext`, `stem_2.ext`, ... so none overwrites another.
pub fn save_uploaded_files<U: UploadedFile>(dir: &Path, uploads: &[U]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut used = HashSet::new();
    let mut paths = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let base = safe_file_name(upload.file_name())?;
        let mut name = base.clone();
        let mut n = 1;
        while used.contains(&name) {
            name = numbered_name(&base, n);
            n += 1;
        }
        if name != base {
            warn!(upload = upload.file_name(), saved_as = %name, "duplicate file name in batch");
        }
        paths.push(write_upload(dir, &name, upload)?);
        used.insert(name);
    }
    Ok(paths)
}

fn numbered_name(base: &str, n: usize) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, n, ext),
        _ => format!("{}_{}", base, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn strips_directories() {
        assert_eq!(safe_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(safe_file_name("C:\\Users\\me\\doc.pdf").unwrap(), "doc.pdf");
        assert_eq!(safe_file_name("plain.txt").unwrap(), "plain.txt");
        assert!(safe_file_name("dir/").is_err());
        assert!(safe_file_name("..").is_err());
    }

    #[test]
    fn saves_into_dir() {
        let tmp = TempDir::new().unwrap();
        let uploads = vec![
            InMemoryUpload::new("a.txt", "alpha"),
            InMemoryUpload::new("nested/b.txt", "beta"),
        ];
        let paths = save_uploaded_files(tmp.path(), &uploads).unwrap();
        assert_eq!(paths, vec![tmp.path().join("a.txt"), tmp.path().join("b.txt")]);
        assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "beta");
    }

    #[test]
    fn colliding_names_are_kept_apart() {
        let tmp = TempDir::new().unwrap();
        let uploads = vec![
            InMemoryUpload::new("a/x.txt", "first"),
            InMemoryUpload::new("b/x.txt", "second"),
            InMemoryUpload::new("x.txt", "third"),
            InMemoryUpload::new("x_1.txt", "fourth"),
        ];
        let paths = save_uploaded_files(tmp.path(), &uploads).unwrap();
        assert_eq!(
            paths,
            vec![
                tmp.path().join("x.txt"),
                tmp.path().join("x_1.txt"),
                tmp.path().join("x_2.txt"),
                tmp.path().join("x_1_1.txt"),
            ]
        );
        let contents: Vec<String> = paths
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        assert_eq!(contents, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn numbered_names() {
        assert_eq!(numbered_name("x.txt", 1), "x_1.txt");
        assert_eq!(numbered_name("archive.tar.gz", 2), "archive.tar_2.gz");
        assert_eq!(numbered_name(".env", 1), ".env_1");
        assert_eq!(numbered_name("README", 3), "README_3");
    }
}
