//! Archiver: retires records once every routed endpoint has confirmed.
//!
//! A record is archived iff its delivery state set covers its routing map
//! entry. Archiving is atomic per record (the payload moves into archival
//! storage, then the state entry is dropped) but deliberately not atomic
//! across records: a failure on one record is logged and the pass
//! continues. Records absent from the current routing map (no endpoint
//! matched them) are never archived here.

use std::sync::Arc;

use tracing::{info, warn};

use urd_core::{spool::RecordSource, state::StateStore, RoutingMap};

/// Archives fully delivered records and drops their state entries.
pub struct Archiver {
    source: Arc<dyn RecordSource>,
    state: Arc<dyn StateStore>,
}

impl Archiver {
    /// Creates an archiver over the given record source and state store.
    pub fn new(source: Arc<dyn RecordSource>, state: Arc<dyn StateStore>) -> Self {
        Self { source, state }
    }

    /// Archives every record whose state set covers its routed set.
    ///
    /// Returns the number of records archived.
    pub fn run(&self, routing: &RoutingMap) -> usize {
        let mut archived = 0;

        for (record, routed) in routing {
            let confirmed = match self.state.get(record) {
                Ok(confirmed) => confirmed,
                Err(error) => {
                    warn!(record = %record, error = %error, "cannot read delivery state, skipping");
                    continue;
                },
            };

            if !routed.iter().all(|endpoint| confirmed.contains(endpoint)) {
                continue;
            }

            if let Err(error) = self.source.archive(record) {
                warn!(record = %record, error = %error, "archiving failed, record stays active");
                continue;
            }

            // The record is out of active storage at this point; a failed
            // state removal leaves an orphaned entry, not a stuck record.
            if let Err(error) = self.state.remove(record) {
                warn!(record = %record, error = %error, "state entry removal failed after archive");
            }

            info!(record = %record, endpoints = routed.len(), "record fully delivered and archived");
            archived += 1;
        }

        archived
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, fs};

    use tempfile::TempDir;

    use urd_core::{
        spool::{ElementTagExtractor, FileSpool},
        state::FileStateStore,
        EndpointUrl, RecordId,
    };

    use super::*;

    struct Fixture {
        archiver: Archiver,
        state: Arc<dyn StateStore>,
        spool_dir: TempDir,
        archive_dir: TempDir,
        _state_dir: TempDir,
    }

    fn fixture(records: &[&str]) -> Fixture {
        let spool_dir = TempDir::new().expect("spool dir");
        let archive_dir = TempDir::new().expect("archive dir");
        let state_dir = TempDir::new().expect("state dir");

        for name in records {
            fs::write(spool_dir.path().join(name), "<r/>").expect("write record");
        }

        let source: Arc<dyn RecordSource> = Arc::new(
            FileSpool::open(
                spool_dir.path(),
                archive_dir.path(),
                Box::new(ElementTagExtractor::new("group")),
            )
            .expect("open spool"),
        );
        let state: Arc<dyn StateStore> =
            Arc::new(FileStateStore::open(state_dir.path()).expect("open state"));

        Fixture {
            archiver: Archiver::new(source, state.clone()),
            state,
            spool_dir,
            archive_dir,
            _state_dir: state_dir,
        }
    }

    fn routing(entries: &[(&str, &[&str])]) -> RoutingMap {
        entries
            .iter()
            .map(|(record, endpoints)| {
                (
                    RecordId::from(*record),
                    endpoints.iter().map(|e| EndpointUrl::from(*e)).collect::<BTreeSet<_>>(),
                )
            })
            .collect()
    }

    #[test]
    fn archives_record_when_state_covers_routing() {
        let f = fixture(&["usage-001"]);
        let id = RecordId::from("usage-001");
        f.state.add(&id, &EndpointUrl::from("https://e1.example.org")).expect("add");

        let archived = f.archiver.run(&routing(&[("usage-001", &["https://e1.example.org"])]));

        assert_eq!(archived, 1);
        assert!(!f.spool_dir.path().join("usage-001").exists());
        assert!(f.archive_dir.path().join("usage-001").exists());
        assert!(f.state.get(&id).expect("get").is_empty());
    }

    #[test]
    fn partial_delivery_is_not_archived() {
        let f = fixture(&["usage-001"]);
        let id = RecordId::from("usage-001");
        f.state.add(&id, &EndpointUrl::from("https://e1.example.org")).expect("add");

        let archived = f.archiver.run(&routing(&[(
            "usage-001",
            &["https://e1.example.org", "https://e2.example.org"],
        )]));

        assert_eq!(archived, 0);
        assert!(f.spool_dir.path().join("usage-001").exists());
        assert!(!f.state.get(&id).expect("get").is_empty());
    }

    #[test]
    fn record_missing_from_routing_map_stays_active() {
        let f = fixture(&["usage-001"]);
        let id = RecordId::from("usage-001");
        f.state.add(&id, &EndpointUrl::from("https://e1.example.org")).expect("add");

        let archived = f.archiver.run(&RoutingMap::new());

        assert_eq!(archived, 0);
        assert!(f.spool_dir.path().join("usage-001").exists());
    }

    #[test]
    fn failure_on_one_record_does_not_stop_the_pass() {
        // "usage-gone" is routed and fully confirmed but its spool file
        // does not exist, so archiving it fails.
        let f = fixture(&["usage-001"]);
        let e1 = EndpointUrl::from("https://e1.example.org");
        f.state.add(&RecordId::from("usage-001"), &e1).expect("add");
        f.state.add(&RecordId::from("usage-gone"), &e1).expect("add");

        let archived = f.archiver.run(&routing(&[
            ("usage-001", &["https://e1.example.org"]),
            ("usage-gone", &["https://e1.example.org"]),
        ]));

        assert_eq!(archived, 1);
        assert!(f.archive_dir.path().join("usage-001").exists());
    }
}
