//! Sibling JSON mirror, written for the benefit of legacy read-only
//! consumers (`spec.md` §3/§4.1). Never authoritative.

use super::snapshot::StoreSnapshot;
use crate::error::Result;
use std::path::Path;

/// Write `snapshot` as pretty JSON next to the database file. Failures are
/// non-fatal — `spec.md` §4.1/§7 classify this as `TransientIo` and require
/// callers to swallow it.
pub fn write_mirror(path: &Path, snapshot: &StoreSnapshot) {
    match serde_json::to_string_pretty(snapshot) {
        Ok(json) => {
            if let Err(err) = std::fs::write(path, json) {
                tracing::warn!(error = %err, path = %path.display(), "failed to write JSON mirror");
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize snapshot for JSON mirror");
        }
    }
}

/// Whether the mirror exists and its mtime exceeds the database's by more
/// than one second (`spec.md` §4.1).
#[must_use]
pub fn is_json_newer(mirror_path: &Path, db_path: &Path) -> bool {
    let (Ok(mirror_meta), Ok(db_meta)) = (mirror_path.metadata(), db_path.metadata()) else {
        return false;
    };
    let (Ok(mirror_mtime), Ok(db_mtime)) = (mirror_meta.modified(), db_meta.modified()) else {
        return false;
    };
    match mirror_mtime.duration_since(db_mtime) {
        Ok(delta) => delta.as_secs_f64() > 1.0,
        Err(_) => false,
    }
}

/// Parse the mirror file into a snapshot. A malformed mirror (e.g. a stray
/// comma) returns `Ok(None)` rather than propagating — the import path must
/// never abort on one bad file (`spec.md` §8 scenario 6).
pub fn read_mirror(path: &Path) -> Result<Option<StoreSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    match serde_json::from_str::<StoreSnapshot>(&contents) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "JSON mirror is malformed, import aborted gracefully");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_mirror_does_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intelligence.json");
        std::fs::write(&path, r#"{"memories": [,]}"#).unwrap();
        let result = read_mirror(&path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn missing_mirror_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read_mirror(&path).unwrap().is_none());
    }
}
