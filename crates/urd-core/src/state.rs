//! Durable per-record delivery state.
//!
//! Each active record owns one state entry: the set of endpoint addresses
//! that have confirmed receipt. The entry is created lazily, grows
//! monotonically during a run, and is deleted when the record is archived.
//! Durability of `add` is what makes crash recovery and re-runs idempotent:
//! a confirmed delivery is on disk before the engine moves to the next
//! batch.
//!
//! The trait is key-value shaped (record id → set of endpoint ids) with
//! synchronous put semantics; the file-backed store is one provider, and a
//! database-backed provider could replace it without changing the engine.

use std::{
    collections::BTreeSet,
    fs, io,
    path::PathBuf,
    sync::Mutex,
};

use tracing::debug;

use crate::{
    error::{CoreError, Result},
    models::{EndpointUrl, RecordId},
};

/// Durable store of per-record confirmed-endpoint sets.
pub trait StateStore: Send + Sync {
    /// Returns the set of endpoints confirmed for this record.
    ///
    /// A record with no entry yet has the empty set.
    fn get(&self, id: &RecordId) -> Result<BTreeSet<EndpointUrl>>;

    /// Adds an endpoint to the record's confirmed set and persists the
    /// entry before returning.
    ///
    /// An error here means the delivery confirmation is not durable; the
    /// caller must treat the record's update as failed rather than proceed.
    fn add(&self, id: &RecordId, endpoint: &EndpointUrl) -> Result<()>;

    /// Deletes the record's state entry.
    ///
    /// Removing an absent entry is not an error.
    fn remove(&self, id: &RecordId) -> Result<()>;
}

/// File-backed state store.
///
/// One file per record under the state directory, one endpoint address per
/// line. Each mutation rewrites the file in full through a temporary file
/// and rename, so a crash never leaves a half-written entry. A mutex
/// serializes read-modify-write cycles: per-endpoint delivery tasks run
/// concurrently and two of them may confirm different endpoints for the
/// same record.
pub struct FileStateStore {
    state_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStateStore {
    /// Opens a file state store, creating the state directory if needed.
    pub fn open(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        fs::create_dir_all(&state_dir)
            .map_err(|e| CoreError::io(state_dir.display().to_string(), e))?;
        Ok(Self { state_dir, write_lock: Mutex::new(()) })
    }

    fn entry_path(&self, id: &RecordId) -> PathBuf {
        self.state_dir.join(id.as_str())
    }

    fn read_entry(&self, id: &RecordId) -> Result<BTreeSet<EndpointUrl>> {
        let path = self.entry_path(id);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(EndpointUrl::from)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(CoreError::state(id.clone(), e.to_string())),
        }
    }

    fn write_entry(&self, id: &RecordId, endpoints: &BTreeSet<EndpointUrl>) -> Result<()> {
        let path = self.entry_path(id);
        let tmp = self.state_dir.join(format!(".{}.tmp", id.as_str()));

        let mut content = String::new();
        for endpoint in endpoints {
            content.push_str(endpoint.as_str());
            content.push('\n');
        }

        fs::write(&tmp, content).map_err(|e| CoreError::state(id.clone(), e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| CoreError::state(id.clone(), e.to_string()))?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self, id: &RecordId) -> Result<BTreeSet<EndpointUrl>> {
        self.read_entry(id)
    }

    fn add(&self, id: &RecordId, endpoint: &EndpointUrl) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut endpoints = self.read_entry(id)?;
        if endpoints.insert(endpoint.clone()) {
            self.write_entry(id, &endpoints)?;
            debug!(record = %id, endpoint = %endpoint, "delivery state persisted");
        }
        Ok(())
    }

    fn remove(&self, id: &RecordId) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match fs::remove_file(self.entry_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::state(id.clone(), e.to_string())),
        }
    }
}

pub mod mock {
    //! In-memory state store for testing delivery logic without a
    //! filesystem, with injectable persistence failures.

    use std::{
        collections::{BTreeSet, HashMap},
        sync::Mutex,
    };

    use super::{CoreError, EndpointUrl, RecordId, Result, StateStore};

    /// In-memory state store test double.
    #[derive(Default)]
    pub struct MemoryStateStore {
        entries: Mutex<HashMap<RecordId, BTreeSet<EndpointUrl>>>,
        fail_next_add: Mutex<bool>,
    }

    impl MemoryStateStore {
        /// Creates an empty in-memory store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `add` call fail with a state error.
        pub fn inject_add_failure(&self) {
            *self.fail_next_add.lock().unwrap() = true;
        }

        /// Returns the number of records with a non-empty state entry.
        pub fn entry_count(&self) -> usize {
            self.entries.lock().unwrap().len()
        }
    }

    impl StateStore for MemoryStateStore {
        fn get(&self, id: &RecordId) -> Result<BTreeSet<EndpointUrl>> {
            Ok(self.entries.lock().unwrap().get(id).cloned().unwrap_or_default())
        }

        fn add(&self, id: &RecordId, endpoint: &EndpointUrl) -> Result<()> {
            let mut fail = self.fail_next_add.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(CoreError::state(id.clone(), "injected persistence failure"));
            }
            drop(fail);

            self.entries
                .lock()
                .unwrap()
                .entry(id.clone())
                .or_default()
                .insert(endpoint.clone());
            Ok(())
        }

        fn remove(&self, id: &RecordId) -> Result<()> {
            self.entries.lock().unwrap().remove(id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn absent_record_has_empty_state() {
        let dir = TempDir::new().expect("state dir");
        let store = FileStateStore::open(dir.path()).expect("open");

        let state = store.get(&RecordId::from("usage-001")).expect("get");
        assert!(state.is_empty());
    }

    #[test]
    fn add_persists_across_reopen() {
        let dir = TempDir::new().expect("state dir");
        let id = RecordId::from("usage-001");
        let endpoint = EndpointUrl::from("https://collector-a.example.org");

        {
            let store = FileStateStore::open(dir.path()).expect("open");
            store.add(&id, &endpoint).expect("add");
        }

        let reopened = FileStateStore::open(dir.path()).expect("reopen");
        let state = reopened.get(&id).expect("get");
        assert!(state.contains(&endpoint));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn add_is_idempotent_per_endpoint() {
        let dir = TempDir::new().expect("state dir");
        let store = FileStateStore::open(dir.path()).expect("open");
        let id = RecordId::from("usage-001");
        let endpoint = EndpointUrl::from("https://collector-a.example.org");

        store.add(&id, &endpoint).expect("first add");
        store.add(&id, &endpoint).expect("second add");

        assert_eq!(store.get(&id).expect("get").len(), 1);
    }

    #[test]
    fn state_grows_monotonically_across_endpoints() {
        let dir = TempDir::new().expect("state dir");
        let store = FileStateStore::open(dir.path()).expect("open");
        let id = RecordId::from("usage-001");

        store.add(&id, &EndpointUrl::from("https://a.example.org")).expect("add a");
        store.add(&id, &EndpointUrl::from("https://b.example.org")).expect("add b");

        let state = store.get(&id).expect("get");
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn remove_deletes_entry_and_tolerates_absence() {
        let dir = TempDir::new().expect("state dir");
        let store = FileStateStore::open(dir.path()).expect("open");
        let id = RecordId::from("usage-001");

        store.add(&id, &EndpointUrl::from("https://a.example.org")).expect("add");
        store.remove(&id).expect("remove");
        assert!(store.get(&id).expect("get").is_empty());

        store.remove(&id).expect("remove absent entry");
    }

    #[test]
    fn entry_format_is_one_endpoint_per_line() {
        let dir = TempDir::new().expect("state dir");
        let store = FileStateStore::open(dir.path()).expect("open");
        let id = RecordId::from("usage-001");

        store.add(&id, &EndpointUrl::from("https://b.example.org")).expect("add b");
        store.add(&id, &EndpointUrl::from("https://a.example.org")).expect("add a");

        let content = fs::read_to_string(dir.path().join("usage-001")).expect("read entry");
        assert_eq!(content, "https://a.example.org\nhttps://b.example.org\n");
    }
}
