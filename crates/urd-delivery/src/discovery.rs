//! Endpoint discovery via service-description lookup.
//!
//! Each logical endpoint advertises its services in a JSON document at its
//! base address. The registration URL is the `href` of the entry named
//! [`REGISTRATION_SERVICE`]: an absolute href is used verbatim, a path href
//! is merged onto the endpoint's scheme and host.
//!
//! All lookups for a run are issued concurrently and the aggregate result
//! is available only once every call has settled. A failed or empty lookup
//! resolves that endpoint to `None`; it never fails the others.

use std::collections::HashMap;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use urd_core::EndpointUrl;

use crate::error::{DeliveryError, Result};

/// Name of the service entry advertising the registration URL.
pub const REGISTRATION_SERVICE: &str = "StorageRegistration";

#[derive(Debug, Deserialize)]
struct ServiceDescription {
    #[serde(default)]
    services: Vec<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    name: String,
    href: String,
}

/// Resolves logical endpoint addresses to registration URLs.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    client: reqwest::Client,
}

impl DiscoveryClient {
    /// Creates a discovery client reusing the run's HTTP client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Resolves every endpoint concurrently.
    ///
    /// Returns once all lookups have completed or failed. Failures are
    /// logged and mapped to `None`; the corresponding endpoint is skipped
    /// for the rest of the run and its records stay pending.
    pub async fn resolve_all(
        &self,
        endpoints: impl IntoIterator<Item = EndpointUrl>,
    ) -> HashMap<EndpointUrl, Option<Url>> {
        let lookups = endpoints.into_iter().map(|endpoint| async move {
            let result = self.resolve(&endpoint).await;
            (endpoint, result)
        });

        let mut resolved = HashMap::new();
        for (endpoint, result) in join_all(lookups).await {
            match result {
                Ok(url) => {
                    debug!(endpoint = %endpoint, registration_url = %url, "endpoint resolved");
                    resolved.insert(endpoint, Some(url));
                },
                Err(error) => {
                    warn!(endpoint = %endpoint, error = %error, "endpoint discovery failed");
                    resolved.insert(endpoint, None);
                },
            }
        }
        resolved
    }

    /// Resolves a single endpoint's registration URL.
    async fn resolve(&self, endpoint: &EndpointUrl) -> Result<Url> {
        let base = Url::parse(endpoint.as_str())
            .map_err(|e| DeliveryError::discovery(endpoint.clone(), format!("invalid base address: {e}")))?;

        let response = self
            .client
            .get(base.clone())
            .send()
            .await
            .map_err(|e| DeliveryError::discovery(endpoint.clone(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::discovery(
                endpoint.clone(),
                format!("service description returned HTTP {}", status.as_u16()),
            ));
        }

        let description: ServiceDescription = response
            .json()
            .await
            .map_err(|e| DeliveryError::discovery(endpoint.clone(), format!("malformed service description: {e}")))?;

        let entry = description
            .services
            .iter()
            .find(|service| service.name == REGISTRATION_SERVICE)
            .ok_or_else(|| {
                DeliveryError::discovery(
                    endpoint.clone(),
                    format!("no {REGISTRATION_SERVICE} service entry"),
                )
            })?;

        resolve_href(endpoint, &base, &entry.href)
    }
}

/// Resolves a service href against the endpoint base.
///
/// Absolute URLs are used verbatim; anything else is taken as a path and
/// merged onto the base's scheme and host.
fn resolve_href(endpoint: &EndpointUrl, base: &Url, href: &str) -> Result<Url> {
    match Url::parse(href) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let mut merged = base.clone();
            merged.set_path(href);
            merged.set_query(None);
            Ok(merged)
        },
        Err(e) => Err(DeliveryError::discovery(
            endpoint.clone(),
            format!("unusable service href {href:?}: {e}"),
        )),
    }
}
