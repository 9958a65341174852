//! Core domain types for the urd usage-record delivery engine.
//!
//! This crate holds everything the delivery engine depends on but does not
//! own: the record and endpoint models, the record source (spool) the
//! records are produced into, and the durable per-record delivery state
//! store that makes re-runs idempotent.
//!
//! The two storage seams, [`spool::RecordSource`] and [`state::StateStore`],
//! are traits with file-backed production implementations.
//! The engine in `urd-delivery` only ever talks to the traits, so a
//! database-backed provider can be added without touching delivery logic.

pub mod error;
pub mod models;
pub mod spool;
pub mod state;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{EndpointUrl, Record, RecordId, RoutingMap};
pub use time::{Clock, RealClock};
