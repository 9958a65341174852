//! HTTP client for batched record registration.
//!
//! Builds the mutually authenticated HTTPS client from supplied TLS
//! credentials and submits batches: the concatenated raw record payloads
//! under one enclosing wrapper element, POSTed to the endpoint's resolved
//! registration URL. Transport failure, timeout, and non-2xx responses are
//! all batch failures; the caller circuit-breaks the endpoint for the rest
//! of the run.

use std::{fs, path::PathBuf, time::Duration};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};
use url::Url;

use urd_core::EndpointUrl;

use crate::error::{DeliveryError, Result};

/// Configuration for the registration client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout applied to every HTTP call.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Opening tag of the batch wrapper element.
    pub wrapper_open: String,
    /// Closing tag of the batch wrapper element.
    pub wrapper_close: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "urd/0.1".to_string(),
            wrapper_open: "<UsageRecords>".to_string(),
            wrapper_close: "</UsageRecords>".to_string(),
        }
    }
}

/// Locations of the TLS credentials for mutually authenticated calls.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// PEM-encoded private key.
    pub key_path: PathBuf,
    /// PEM-encoded client certificate.
    pub cert_path: PathBuf,
    /// PEM-encoded trust anchor bundle.
    pub ca_path: PathBuf,
}

impl ClientCredentials {
    /// Builds an HTTPS client authenticated with these credentials.
    ///
    /// Any failure here, unreadable files or unparsable PEM, is a
    /// configuration error and aborts the run before any delivery attempt.
    pub fn build_client(&self, config: &ClientConfig) -> Result<reqwest::Client> {
        let read = |path: &PathBuf| -> Result<Vec<u8>> {
            fs::read(path).map_err(|e| {
                DeliveryError::configuration(format!("cannot read {}: {e}", path.display()))
            })
        };

        let key = read(&self.key_path)?;
        let cert = read(&self.cert_path)?;
        let ca = read(&self.ca_path)?;

        let mut identity_pem = cert;
        identity_pem.extend_from_slice(&key);
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .map_err(|e| DeliveryError::configuration(format!("invalid client identity: {e}")))?;

        let trust_anchor = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| DeliveryError::configuration(format!("invalid trust anchor: {e}")))?;

        reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .add_root_certificate(trust_anchor)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))
    }
}

/// Client submitting record batches to resolved registration URLs.
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl RegistrationClient {
    /// Creates a registration client around an already built HTTP client.
    pub fn new(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    /// Returns the underlying HTTP client for reuse (discovery shares it).
    pub fn http(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Submits one batch of record payloads to a registration URL.
    ///
    /// Success means the remote accepted the call with a 2xx status.
    /// Everything else (connection failure, timeout, rejection) is an
    /// error the engine treats as a batch failure for that endpoint.
    pub async fn register_batch(
        &self,
        endpoint: &EndpointUrl,
        url: &Url,
        payloads: &[Bytes],
    ) -> Result<()> {
        let body = self.build_batch_payload(payloads);

        debug!(
            endpoint = %endpoint,
            url = %url,
            batch_size = payloads.len(),
            bytes = body.len(),
            "submitting registration batch"
        );

        let response = self
            .client
            .post(url.clone())
            .header("content-type", "application/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::timeout(endpoint.clone(), self.config.timeout.as_secs())
                } else {
                    DeliveryError::network(endpoint.clone(), e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            if status.as_u16() != 200 {
                debug!(endpoint = %endpoint, status = status.as_u16(), "non-200 success status");
            }
            Ok(())
        } else {
            warn!(endpoint = %endpoint, status = status.as_u16(), "registration rejected");
            Err(DeliveryError::rejected(endpoint.clone(), status.as_u16()))
        }
    }

    /// Concatenates record payloads under the wrapper element.
    fn build_batch_payload(&self, payloads: &[Bytes]) -> Bytes {
        let inner: usize = payloads.iter().map(Bytes::len).sum();
        let mut body = BytesMut::with_capacity(
            self.config.wrapper_open.len() + self.config.wrapper_close.len() + inner + payloads.len() + 2,
        );

        body.extend_from_slice(self.config.wrapper_open.as_bytes());
        body.extend_from_slice(b"\n");
        for payload in payloads {
            body.extend_from_slice(payload);
            body.extend_from_slice(b"\n");
        }
        body.extend_from_slice(self.config.wrapper_close.as_bytes());

        body.freeze()
    }
}
