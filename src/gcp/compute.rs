//! Compute Engine REST client
//!
//! Thin wrapper over the three calls the pipeline makes:
//! - `images.getFromFamily`
//! - `instances.insert`
//! - `instances.get`
//!
//! # Example
//!
//! ```no_run
//! use gce_bootstrap::gcp::auth::StaticTokenSource;
//! use gce_bootstrap::gcp::compute::ComputeClient;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> gce_bootstrap::error::Result<()> {
//! let client = ComputeClient::new(
//!     "https://compute.googleapis.com/compute/v1",
//!     Arc::new(StaticTokenSource::new("ya29.token")),
//!     Duration::from_secs(60),
//! )?;
//!
//! let image = client.image_from_family("ubuntu-os-cloud", "ubuntu-2204-lts").await?;
//! println!("Latest image: {}", image.self_link);
//! # Ok(())
//! # }
//! ```

use crate::error::{BootstrapError, Result};
use crate::gcp::auth::TokenSource;
use crate::gcp::types::{ErrorEnvelope, Image, Instance, InstanceRequest, Operation};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

/// Compute API client bound to one API base and token source
#[derive(Clone)]
pub struct ComputeClient {
    client: Client,
    base: Url,
    tokens: Arc<dyn TokenSource>,
}

impl ComputeClient {
    /// Create a client for `api_base` (e.g. `https://compute.googleapis.com/compute/v1`)
    pub fn new(api_base: &str, tokens: Arc<dyn TokenSource>, timeout: Duration) -> Result<Self> {
        Self::with_client(api_base, tokens, http_client(timeout)?)
    }

    /// Use an existing reqwest client
    pub fn with_client(api_base: &str, tokens: Arc<dyn TokenSource>, client: Client) -> Result<Self> {
        let base = parse_base(api_base)?;
        Ok(Self {
            client,
            base,
            tokens,
        })
    }

    /// Join path segments onto the API base, escaping each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BootstrapError::Validation(format!("Invalid API base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(request.bearer_auth(token))
    }

    /// Latest non-deprecated image of a family
    pub async fn image_from_family(&self, image_project: &str, family: &str) -> Result<Image> {
        let url = self.endpoint(&["projects", image_project, "global", "images", "family", family])?;

        debug!("GET {}", url);
        let response = self.authorized(self.client.get(url)).await?.send().await?;
        let image: Image = decode(response).await?;

        info!("Resolved image family {}/{} to {}", image_project, family, image.name);
        Ok(image)
    }

    /// Submit an instance insert. The returned operation is not waited on.
    pub async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        request: &InstanceRequest,
    ) -> Result<Operation> {
        let mut url = self.endpoint(&["projects", project, "zones", zone, "instances"])?;
        let request_id = uuid::Uuid::new_v4().to_string();
        url.query_pairs_mut().append_pair("requestId", &request_id);

        debug!("POST {} (instance {})", url, request.name);
        let response = self
            .authorized(self.client.post(url).json(request))
            .await?
            .send()
            .await?;
        let operation: Operation = decode(response).await?;

        info!(
            "Insert of instance {} accepted (operation {}, status {:?})",
            request.name, operation.name, operation.status
        );
        Ok(operation)
    }

    pub async fn get_instance(&self, project: &str, zone: &str, name: &str) -> Result<Instance> {
        let url = self.endpoint(&["projects", project, "zones", zone, "instances", name])?;

        debug!("GET {}", url);
        let response = self.authorized(self.client.get(url)).await?.send().await?;
        decode(response).await
    }

    /// External NAT address of an instance
    pub async fn instance_external_ip(&self, project: &str, zone: &str, name: &str) -> Result<String> {
        let instance = self.get_instance(project, zone, name).await?;
        instance
            .external_ip()
            .map(str::to_string)
            .ok_or_else(|| BootstrapError::NoExternalIp(name.to_string()))
    }
}

/// HTTP client shared by the token exchange and the compute calls
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(format!("gce-bootstrap/{}", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}

fn parse_base(api_base: &str) -> Result<Url> {
    let base = Url::parse(api_base)?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(BootstrapError::Validation(format!(
            "Invalid API base scheme '{}': only http and https are allowed",
            base.scheme()
        )));
    }

    if base.cannot_be_a_base() {
        return Err(BootstrapError::Validation(format!(
            "Invalid API base: {}",
            api_base
        )));
    }

    Ok(base)
}

/// Decode a success body, or turn the Google error envelope into `Api`
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body,
    };

    error!("Compute API returned {}: {}", status, message);
    Err(BootstrapError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::auth::StaticTokenSource;

    fn client(base: &str) -> Result<ComputeClient> {
        ComputeClient::new(
            base,
            Arc::new(StaticTokenSource::new("token")),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let c = client("https://compute.googleapis.com/compute/v1").unwrap();
        let url = c
            .endpoint(&["projects", "p", "zones", "us-central1-a", "instances"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://compute.googleapis.com/compute/v1/projects/p/zones/us-central1-a/instances"
        );
    }

    #[test]
    fn test_endpoint_trailing_slash_base() {
        let c = client("http://127.0.0.1:8080/compute/v1/").unwrap();
        let url = c.endpoint(&["projects", "p"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/compute/v1/projects/p");
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let c = client("https://compute.googleapis.com/compute/v1").unwrap();
        let url = c.endpoint(&["projects", "a/b"]).unwrap();
        assert!(url.as_str().ends_with("/projects/a%2Fb"));
    }

    #[test]
    fn test_invalid_base_rejected() {
        assert!(matches!(client("not a url"), Err(BootstrapError::Url(_))));
        assert!(matches!(
            client("ftp://example.com/compute"),
            Err(BootstrapError::Validation(_))
        ));
        assert!(matches!(
            client("mailto:ops@example.com"),
            Err(BootstrapError::Validation(_))
        ));
    }
}
