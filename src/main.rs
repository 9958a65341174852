//! urd usage-record registration run.
//!
//! Entry point for one delivery pass: load configuration, build the TLS
//! client, deliver pending records, archive what is fully confirmed, and
//! sweep the archive. Designed to be run from cron or a systemd timer.

mod config;

use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use tracing::info;

use urd_core::{
    spool::{ElementTagExtractor, FileSpool},
    state::FileStateStore,
    RealClock,
};
use urd_delivery::{DeliveryEngine, DeliveryError, RegistrationClient, RetentionSweeper};

use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Tracing may not be initialized yet when configuration fails.
            eprintln!("urd: {error:#}");
            if is_fatal(&error) {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        },
    }
}

/// Classifies an error surfacing to `main` for the exit status.
///
/// Delivery errors carry their own fatal/non-fatal split; anything else
/// (configuration loading, storage setup) is fatal.
fn is_fatal(error: &anyhow::Error) -> bool {
    error.downcast_ref::<DeliveryError>().map_or(true, DeliveryError::is_fatal)
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.log);

    info!(
        spool = %config.spool_dir.display(),
        endpoints = config.endpoints.len(),
        group_endpoints = config.group_endpoints.len(),
        batch_size = config.batch_size,
        "urd starting"
    );

    // Credential problems are fatal: nothing can be delivered without a
    // working TLS identity.
    let http = config
        .to_credentials()
        .build_client(&config.to_client_config())
        .context("cannot build TLS client")?;
    let client = RegistrationClient::new(http, config.to_client_config());

    let extractor = Box::new(ElementTagExtractor::new(&config.group_element));
    let source = Arc::new(
        FileSpool::open(&config.spool_dir, &config.archive_dir, extractor)
            .context("cannot open record spool")?,
    );
    let state = Arc::new(
        FileStateStore::open(&config.state_dir).context("cannot open delivery state store")?,
    );
    let sweeper = RetentionSweeper::with_ttl_days(
        &config.archive_dir,
        config.archive_ttl_days,
        Arc::new(RealClock),
    );

    let engine = DeliveryEngine::new(source, state, client, sweeper, config.to_engine_config());
    let report = engine.run().await;

    // Per-endpoint failures are not fatal; the records stay pending and
    // the next run picks them up.
    info!(
        run_id = %report.run_id,
        delivered = report.total_delivered(),
        archived = report.archived,
        swept = report.swept,
        failures = report.has_failures(),
        "urd finished"
    );

    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

#[cfg(test)]
mod tests {
    use urd_core::EndpointUrl;

    use super::*;

    #[test]
    fn configuration_errors_exit_nonzero() {
        let error = anyhow::Error::from(DeliveryError::configuration("missing key file"))
            .context("cannot build TLS client");
        assert!(is_fatal(&error));
    }

    #[test]
    fn endpoint_errors_do_not_fail_the_run() {
        let endpoint = EndpointUrl::from("https://collector.example.org");
        let error = anyhow::Error::from(DeliveryError::rejected(endpoint, 503));
        assert!(!is_fatal(&error));
    }

    #[test]
    fn unclassified_errors_exit_nonzero() {
        let error = anyhow::anyhow!("unparsable configuration file");
        assert!(is_fatal(&error));
    }
}
