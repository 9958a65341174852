//! Batch delivery engine: one run of the registration pipeline.
//!
//! A run loads the active records, computes the routing map, filters out
//! (record, endpoint) pairs already confirmed in the delivery state store,
//! discovers registration URLs concurrently, then delivers each endpoint's
//! pending records in bounded batches. Within an endpoint delivery is
//! strictly sequential and the first failure circuit-breaks that endpoint
//! for the remainder of the run; across endpoints delivery proceeds
//! independently. After delivery, fully confirmed records are archived and
//! the archive is swept for expired records.
//!
//! Errors local to one record or one endpoint never abort the run; they are
//! aggregated into the [`RunReport`]. Only configuration and credential
//! errors are fatal, and those surface before `run()` is ever reached.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use urd_core::{spool::RecordSource, state::StateStore, EndpointUrl, Record, RecordId};

use crate::{
    archive::Archiver,
    client::RegistrationClient,
    discovery::DiscoveryClient,
    retention::RetentionSweeper,
    routing::{invert, RoutingConfig},
};

/// Default number of records per registration call.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Configuration for the delivery engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum records per registration call.
    pub batch_size: usize,
    /// Static routing configuration.
    pub routing: RoutingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE, routing: RoutingConfig::default() }
    }
}

/// Outcome of one run for one endpoint.
#[derive(Debug, Clone, Default)]
pub struct EndpointReport {
    /// Whether discovery resolved a registration URL this run.
    pub resolved: bool,
    /// Records confirmed delivered in this run.
    pub delivered: usize,
    /// Records excluded up front because already confirmed in a prior run.
    pub already_delivered: usize,
    /// Records still pending for this endpoint after the run.
    pub pending: usize,
    /// First failure that circuit-broke the endpoint, if any.
    pub failure: Option<String>,
}

/// Aggregated outcome of one engine run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Correlation id for this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: chrono::DateTime<Utc>,
    /// Per-endpoint outcomes.
    pub endpoints: BTreeMap<EndpointUrl, EndpointReport>,
    /// Records skipped because their content was unreadable.
    pub unreadable_records: usize,
    /// Records excluded because no endpoint matched them.
    pub unrouted_records: usize,
    /// Records archived after full delivery.
    pub archived: usize,
    /// Expired archived records deleted by the sweeper.
    pub swept: usize,
}

impl RunReport {
    /// Total records confirmed delivered across all endpoints this run.
    pub fn total_delivered(&self) -> usize {
        self.endpoints.values().map(|r| r.delivered).sum()
    }

    /// Whether any endpoint failed during this run.
    pub fn has_failures(&self) -> bool {
        self.endpoints.values().any(|r| r.failure.is_some() || !r.resolved)
    }
}

/// The batch delivery engine.
pub struct DeliveryEngine {
    source: Arc<dyn RecordSource>,
    state: Arc<dyn StateStore>,
    client: RegistrationClient,
    discovery: DiscoveryClient,
    sweeper: RetentionSweeper,
    config: EngineConfig,
}

impl DeliveryEngine {
    /// Creates an engine over the given collaborators.
    pub fn new(
        source: Arc<dyn RecordSource>,
        state: Arc<dyn StateStore>,
        client: RegistrationClient,
        sweeper: RetentionSweeper,
        config: EngineConfig,
    ) -> Self {
        let discovery = DiscoveryClient::new(client.http());
        Self { source, state, client, discovery, sweeper, config }
    }

    /// Executes one complete run: deliver, archive, sweep.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(run_id = %run_id, batch_size = self.config.batch_size, "delivery run starting");

        let (records, unreadable_records) = self.load_active_records();
        let routing = self.config.routing.resolve(&records);
        let unrouted_records = records.len() - routing.len();
        if unrouted_records > 0 {
            info!(run_id = %run_id, count = unrouted_records, "records matched no endpoint, left pending");
        }

        let by_id: HashMap<RecordId, Record> =
            records.into_iter().map(|record| (record.id.clone(), record)).collect();
        let inverted = invert(&routing);

        // Exclude pairs already confirmed in earlier runs before making any
        // network call; re-runs with nothing new must perform zero calls.
        let mut queues: BTreeMap<EndpointUrl, (Vec<RecordId>, usize)> = BTreeMap::new();
        for (endpoint, record_ids) in inverted {
            let mut pending = Vec::new();
            let mut already_delivered = 0;
            for id in record_ids {
                match self.state.get(&id) {
                    Ok(confirmed) if confirmed.contains(&endpoint) => already_delivered += 1,
                    Ok(_) => pending.push(id),
                    Err(e) => {
                        // Unreadable state is treated as undelivered; the
                        // protocol is at-least-once.
                        warn!(record = %id, error = %e, "cannot read delivery state, treating as pending");
                        pending.push(id);
                    },
                }
            }
            if already_delivered > 0 {
                info!(
                    run_id = %run_id,
                    endpoint = %endpoint,
                    skipped = already_delivered,
                    "records already delivered to endpoint"
                );
            }
            queues.insert(endpoint, (pending, already_delivered));
        }

        let resolved = self.discovery.resolve_all(queues.keys().cloned()).await;

        let deliveries = queues.into_iter().map(|(endpoint, (pending, already_delivered))| {
            let url = resolved.get(&endpoint).and_then(Clone::clone);
            let by_id = &by_id;
            async move {
                let report = self
                    .deliver_endpoint(&endpoint, url, &pending, already_delivered, by_id)
                    .await;
                (endpoint, report)
            }
        });
        let endpoints: BTreeMap<EndpointUrl, EndpointReport> =
            join_all(deliveries).await.into_iter().collect();

        let archiver = Archiver::new(self.source.clone(), self.state.clone());
        let archived = archiver.run(&routing);
        let swept = self.sweeper.sweep();

        let report = RunReport {
            run_id,
            started_at,
            endpoints,
            unreadable_records,
            unrouted_records,
            archived,
            swept,
        };

        info!(
            run_id = %run_id,
            delivered = report.total_delivered(),
            archived = report.archived,
            swept = report.swept,
            failures = report.has_failures(),
            "delivery run finished"
        );

        report
    }

    /// Loads every active record, skipping unreadable ones.
    fn load_active_records(&self) -> (Vec<Record>, usize) {
        let ids = match self.source.active_records() {
            Ok(ids) => ids,
            Err(error) => {
                error!(error = %error, "cannot enumerate active records");
                return (Vec::new(), 0);
            },
        };

        let mut records = Vec::with_capacity(ids.len());
        let mut unreadable = 0;
        for id in ids {
            match self.source.load(&id) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(record = %id, error = %error, "unreadable record skipped for this run");
                    unreadable += 1;
                },
            }
        }
        (records, unreadable)
    }

    /// Delivers one endpoint's pending records in sequential batches.
    ///
    /// The first failed batch circuit-breaks the endpoint: every remaining
    /// batch is skipped and its records stay pending for the next run.
    async fn deliver_endpoint(
        &self,
        endpoint: &EndpointUrl,
        url: Option<Url>,
        pending: &[RecordId],
        already_delivered: usize,
        by_id: &HashMap<RecordId, Record>,
    ) -> EndpointReport {
        let mut report = EndpointReport {
            already_delivered,
            pending: pending.len(),
            ..EndpointReport::default()
        };

        let Some(url) = url else {
            // Discovery already logged the cause; nothing is attempted.
            return report;
        };
        report.resolved = true;

        'batches: for batch in pending.chunks(self.config.batch_size.max(1)) {
            let payloads: Vec<Bytes> =
                batch.iter().filter_map(|id| by_id.get(id)).map(|r| r.payload.clone()).collect();

            if let Err(error) = self.client.register_batch(endpoint, &url, &payloads).await {
                warn!(
                    endpoint = %endpoint,
                    batch_size = batch.len(),
                    error = %error,
                    "batch failed, endpoint circuit-broken for this run"
                );
                report.failure = Some(error.to_string());
                break;
            }

            for id in batch {
                if let Err(error) = self.state.add(id, endpoint) {
                    // The remote accepted the batch but the confirmation is
                    // not durable; the record must stay pending, and
                    // continuing would break the persist-before-next-batch
                    // ordering for everything after it.
                    error!(
                        record = %id,
                        endpoint = %endpoint,
                        error = %error,
                        "delivery state persistence failed"
                    );
                    report.failure = Some(error.to_string());
                    break 'batches;
                }
                report.delivered += 1;
                report.pending -= 1;
            }
        }

        report
    }
}
