//! Record source abstraction and the file-backed spool.
//!
//! Active records are produced into a spool directory by an external
//! producer. The engine only needs three operations: enumerate active
//! records, load one (payload plus group tags), and move one into archival
//! storage once fully delivered. The trait keeps that seam narrow so tests
//! and alternative producers can supply their own source.

use std::{
    fs,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use tracing::debug;

use crate::{
    error::{CoreError, Result},
    models::{Record, RecordId},
};

/// Source of active usage records.
pub trait RecordSource: Send + Sync {
    /// Lists the identifiers of all records awaiting delivery.
    fn active_records(&self) -> Result<Vec<RecordId>>;

    /// Loads a record's payload and group tags.
    ///
    /// Unreadable or uninterpretable content is an error; callers log and
    /// skip the record rather than aborting the run.
    fn load(&self, id: &RecordId) -> Result<Record>;

    /// Moves a record out of active storage into the archive.
    ///
    /// Must be atomic per record: after this returns the record is either
    /// still active (on error) or archived, never neither.
    fn archive(&self, id: &RecordId) -> Result<()>;
}

/// Extracts group tags from record content.
///
/// Record payloads are opaque to the rest of the system; this is the single
/// place that inspects them, and only to derive routing group membership.
pub trait TagExtractor: Send + Sync {
    /// Returns the group tags present in the payload.
    fn extract(&self, payload: &[u8]) -> Vec<String>;
}

/// Tag extractor that collects the text content of a named element.
///
/// Scans for `<element>…</element>` occurrences in the raw bytes. This is a
/// delimiter scan, not an XML parse: the record wire contract guarantees
/// the group element appears in this exact serialized form.
#[derive(Debug, Clone)]
pub struct ElementTagExtractor {
    open: String,
    close: String,
}

impl ElementTagExtractor {
    /// Creates an extractor for the given element name.
    pub fn new(element: impl AsRef<str>) -> Self {
        let element = element.as_ref();
        Self { open: format!("<{element}>"), close: format!("</{element}>") }
    }
}

impl TagExtractor for ElementTagExtractor {
    fn extract(&self, payload: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(payload);
        let mut tags = Vec::new();
        let mut rest = text.as_ref();

        while let Some(start) = rest.find(&self.open) {
            let after_open = &rest[start + self.open.len()..];
            let Some(end) = after_open.find(&self.close) else {
                break;
            };
            let tag = after_open[..end].trim();
            if !tag.is_empty() {
                tags.push(tag.to_string());
            }
            rest = &after_open[end + self.close.len()..];
        }

        tags
    }
}

/// File-backed record source.
///
/// Every regular file in the spool directory is one active record; its file
/// name is the record identifier. Archiving renames the file into the
/// archive directory, which is atomic on a single filesystem.
pub struct FileSpool {
    spool_dir: PathBuf,
    archive_dir: PathBuf,
    extractor: Box<dyn TagExtractor>,
}

impl FileSpool {
    /// Opens a file spool, creating the spool and archive directories if
    /// they do not exist.
    pub fn open(
        spool_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        extractor: Box<dyn TagExtractor>,
    ) -> Result<Self> {
        let spool_dir = spool_dir.into();
        let archive_dir = archive_dir.into();

        fs::create_dir_all(&spool_dir)
            .map_err(|e| CoreError::io(spool_dir.display().to_string(), e))?;
        fs::create_dir_all(&archive_dir)
            .map_err(|e| CoreError::io(archive_dir.display().to_string(), e))?;

        Ok(Self { spool_dir, archive_dir, extractor })
    }

    fn record_path(&self, id: &RecordId) -> PathBuf {
        self.spool_dir.join(id.as_str())
    }

    /// Returns the archive directory path.
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }
}

impl RecordSource for FileSpool {
    fn active_records(&self) -> Result<Vec<RecordId>> {
        let entries = fs::read_dir(&self.spool_dir)
            .map_err(|e| CoreError::io(self.spool_dir.display().to_string(), e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::io(self.spool_dir.display().to_string(), e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| CoreError::io(entry.path().display().to_string(), e))?
                .is_file();
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(RecordId::from(name));
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn load(&self, id: &RecordId) -> Result<Record> {
        let path = self.record_path(id);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found(id.clone())
            } else {
                CoreError::invalid_record(id.clone(), e.to_string())
            }
        })?;

        let groups = self.extractor.extract(&bytes);
        debug!(record = %id, groups = ?groups, "loaded record from spool");

        Ok(Record { id: id.clone(), groups, payload: Bytes::from(bytes) })
    }

    fn archive(&self, id: &RecordId) -> Result<()> {
        let from = self.record_path(id);
        let to = self.archive_dir.join(id.as_str());

        fs::rename(&from, &to).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found(id.clone())
            } else {
                CoreError::io(from.display().to_string(), e)
            }
        })?;

        debug!(record = %id, "record archived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn spool_with_records(records: &[(&str, &str)]) -> (FileSpool, TempDir, TempDir) {
        let spool_dir = TempDir::new().expect("spool dir");
        let archive_dir = TempDir::new().expect("archive dir");

        for (name, content) in records {
            fs::write(spool_dir.path().join(name), content).expect("write record");
        }

        let spool = FileSpool::open(
            spool_dir.path(),
            archive_dir.path(),
            Box::new(ElementTagExtractor::new("group")),
        )
        .expect("open spool");

        (spool, spool_dir, archive_dir)
    }

    #[test]
    fn active_records_listed_in_sorted_order() {
        let (spool, _s, _a) = spool_with_records(&[
            ("usage-003", "<r/>"),
            ("usage-001", "<r/>"),
            ("usage-002", "<r/>"),
        ]);

        let ids = spool.active_records().expect("list");
        let names: Vec<&str> = ids.iter().map(RecordId::as_str).collect();
        assert_eq!(names, vec!["usage-001", "usage-002", "usage-003"]);
    }

    #[test]
    fn load_extracts_group_tags() {
        let (spool, _s, _a) = spool_with_records(&[(
            "usage-001",
            "<record><group>atlas</group><group>cms</group></record>",
        )]);

        let record = spool.load(&RecordId::from("usage-001")).expect("load");
        assert_eq!(record.groups, vec!["atlas", "cms"]);
        assert!(!record.payload.is_empty());
    }

    #[test]
    fn load_missing_record_is_not_found() {
        let (spool, _s, _a) = spool_with_records(&[]);

        let err = spool.load(&RecordId::from("absent")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn archive_moves_record_out_of_active_storage() {
        let (spool, spool_dir, archive_dir) = spool_with_records(&[("usage-001", "<r/>")]);
        let id = RecordId::from("usage-001");

        spool.archive(&id).expect("archive");

        assert!(!spool_dir.path().join("usage-001").exists());
        assert!(archive_dir.path().join("usage-001").exists());
        assert!(spool.active_records().expect("list").is_empty());
    }

    #[test]
    fn element_extractor_ignores_unterminated_tags() {
        let extractor = ElementTagExtractor::new("group");
        let tags = extractor.extract(b"<group>ok</group><group>dangling");
        assert_eq!(tags, vec!["ok"]);
    }

    #[test]
    fn element_extractor_skips_empty_tags() {
        let extractor = ElementTagExtractor::new("group");
        let tags = extractor.extract(b"<group>  </group><group>alice</group>");
        assert_eq!(tags, vec!["alice"]);
    }
}
