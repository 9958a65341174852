//! Usage-record registration engine with durable delivery state.
//!
//! This crate implements the delivery side of urd: computing which records
//! must reach which collection endpoints, discovering live registration
//! URLs, delivering records in bounded batches with per-endpoint
//! circuit-breaking, archiving fully delivered records, and sweeping the
//! archive by TTL.
//!
//! # Run pipeline
//!
//! ```text
//! ┌──────────────┐  ┌───────────┐  ┌────────────────┐  ┌──────────┐
//! │ Record spool │─▶│ Routing   │─▶│ Batch delivery │─▶│ Archiver │
//! └──────────────┘  │ resolver  │  │ (per endpoint, │  └──────────┘
//!                   └───────────┘  │  sequential)   │       │
//!                        │         └────────────────┘       ▼
//!                        ▼                 ▲          ┌──────────┐
//!                   ┌───────────┐          │          │ Retention│
//!                   │ Discovery │──────────┘          │ sweeper  │
//!                   │ (join-all)│                     └──────────┘
//!                   └───────────┘
//! ```
//!
//! Delivery state is persisted after every confirmed batch, before the
//! next batch for that endpoint is attempted, so a crash mid-run resumes
//! correctly: confirmed records are skipped, unconfirmed ones retried.

pub mod archive;
pub mod client;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod retention;
pub mod routing;

pub use client::{ClientConfig, ClientCredentials, RegistrationClient};
pub use discovery::{DiscoveryClient, REGISTRATION_SERVICE};
pub use engine::{DeliveryEngine, EngineConfig, RunReport, DEFAULT_BATCH_SIZE};
pub use error::{DeliveryError, Result};
pub use retention::RetentionSweeper;
pub use routing::RoutingConfig;
