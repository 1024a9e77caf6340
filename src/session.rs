//! Session directory allocation.
//!
//! Every ingestion session gets its own upload directory and its own index
//! directory, both named after the session id, so concurrent uploads for
//! different conversations never touch the same files. With sessions
//! disabled the base directories are shared.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Generates `"{prefix}_YYYYMMDD_HHMMSS_<8 hex>"`.
pub fn generate_session_id(prefix: &str) -> String {
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, ts, &suffix[..8])
}

/// Returns the directory ingestion should use under `base`.
///
/// Creates `base/session_id` (or `base` itself when `use_sessions` is
/// false), including parents. Existing directories and their contents are
/// left untouched.
pub fn resolve_dir(base: &Path, session_id: &str, use_sessions: bool) -> Result<PathBuf> {
    let dir = if use_sessions {
        validate_session_id(session_id)?;
        base.join(session_id)
    } else {
        base.to_path_buf()
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path an index for `session_id` would live at, without creating it.
pub fn index_dir_for(index_base: &Path, session_id: Option<&str>, use_sessions: bool) -> Result<PathBuf> {
    if !use_sessions {
        return Ok(index_base.to_path_buf());
    }
    let id = session_id.ok_or_else(|| Error::InvalidSessionId(String::new()))?;
    validate_session_id(id)?;
    Ok(index_base.join(id))
}

/// Session ids become directory names: one plain path component only.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let ok = !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidSessionId(session_id.to_string()))
    }
}

/// Resolved directories for one ingestion session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub temp_dir: PathBuf,
    pub index_dir: PathBuf,
    pub sessionized: bool,
}

impl Session {
    /// Opens (creating if needed) the upload and index directories for a
    /// session. A fresh id is generated when none is given.
    pub fn open(
        temp_base: &Path,
        index_base: &Path,
        session_id: Option<&str>,
        use_sessions: bool,
    ) -> Result<Self> {
        let id = match session_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_session_id("session"),
        };
        let temp_dir = resolve_dir(temp_base, &id, use_sessions)?;
        let index_dir = resolve_dir(index_base, &id, use_sessions)?;

        info!(
            session_id = %id,
            temp_dir = %temp_dir.display(),
            index_dir = %index_dir.display(),
            sessionized = use_sessions,
            "session directories ready"
        );

        Ok(Self {
            id,
            temp_dir,
            index_dir,
            sessionized: use_sessions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn session_dirs_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let a = resolve_dir(tmp.path(), "s1", true).unwrap();
        let b = resolve_dir(tmp.path(), "s2", true).unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());

        std::fs::write(a.join("f.txt"), "only in a").unwrap();
        assert!(!b.join("f.txt").exists());
    }

    #[test]
    fn resolve_is_idempotent_and_non_destructive() {
        let tmp = TempDir::new().unwrap();
        let dir = resolve_dir(tmp.path(), "s1", true).unwrap();
        std::fs::write(dir.join("keep.txt"), "x").unwrap();
        let again = resolve_dir(tmp.path(), "s1", true).unwrap();
        assert_eq!(dir, again);
        assert_eq!(std::fs::read_to_string(again.join("keep.txt")).unwrap(), "x");
    }

    #[test]
    fn shared_mode_returns_base() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("nested").join("base");
        let dir = resolve_dir(&base, "ignored", false).unwrap();
        assert_eq!(dir, base);
        assert!(base.is_dir());
    }

    #[test]
    fn rejects_path_traversal() {
        let tmp = TempDir::new().unwrap();
        for bad in ["..", "a/b", "", "../x", "a\\b"] {
            assert!(
                matches!(resolve_dir(tmp.path(), bad, true), Err(Error::InvalidSessionId(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn generated_ids_are_unique_and_valid() {
        let a = generate_session_id("session");
        let b = generate_session_id("session");
        assert_ne!(a, b);
        assert!(a.starts_with("session_"));
        validate_session_id(&a).unwrap();
    }

    #[test]
    fn open_creates_both_dirs() {
        let tmp = TempDir::new().unwrap();
        let session = Session::open(
            &tmp.path().join("data"),
            &tmp.path().join("index"),
            Some("test_session_123"),
            true,
        )
        .unwrap();
        assert_eq!(session.id, "test_session_123");
        assert_eq!(session.temp_dir, tmp.path().join("data").join("test_session_123"));
        assert_eq!(session.index_dir, tmp.path().join("index").join("test_session_123"));
        assert!(session.temp_dir.is_dir() && session.index_dir.is_dir());
    }

    #[test]
    fn index_dir_for_requires_id_with_sessions() {
        let base = Path::new("/srv/index");
        assert!(index_dir_for(base, None, true).is_err());
        assert_eq!(index_dir_for(base, None, false).unwrap(), base);
        assert_eq!(index_dir_for(base, Some("s"), true).unwrap(), base.join("s"));
    }
}
