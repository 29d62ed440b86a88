//! HTTP client for the DMP tool's dataset and DMP endpoints

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

use madmp_common::config::DmpToolConfig;

static SIMPLE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w\-.]+$").expect("static regex"));

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Could not reach DMP tool at {url}: {message}")]
    Connection { url: String, message: String },

    #[error("Could not build HTTP client: {0}")]
    Client(String),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] madmp_common::Error),
}

/// What to do when the DMP tool cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// Return the error to the caller
    Raise,
    /// Log it and report `false`
    #[default]
    Suppress,
}

/// Substitute `id` for the `{}` or `%s` placeholder in an endpoint URL
pub fn prepare_endpoint_url(url: &str, id: &str) -> String {
    if url.contains("{}") {
        url.replacen("{}", id, 1)
    } else if url.contains("%s") {
        url.replacen("%s", id, 1)
    } else {
        url.to_string()
    }
}

/// Whether `id` can be placed into a URL path as is
pub fn is_simple_identifier(id: &str) -> bool {
    SIMPLE_IDENTIFIER.is_match(id)
}

#[derive(Clone)]
pub struct DmpToolClient {
    http: reqwest::Client,
    config: DmpToolConfig,
    policy: NotifyPolicy,
}

impl DmpToolClient {
    pub fn new(config: &DmpToolConfig, policy: NotifyPolicy) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;

        Ok(Self {
            http,
            config: config.clone(),
            policy,
        })
    }

    pub fn config(&self) -> &DmpToolConfig {
        &self.config
    }

    pub fn policy(&self) -> NotifyPolicy {
        self.policy
    }

    /// PATCH a dataset fragment
    pub async fn send_distribution_update(&self, dataset_id: &str, body: &Value) -> Result<bool, NotifyError> {
        self.send_dataset_request(Method::PATCH, dataset_id, body).await
    }

    /// DELETE a dataset's distribution
    pub async fn send_distribution_deletion(&self, dataset_id: &str, body: &Value) -> Result<bool, NotifyError> {
        self.send_dataset_request(Method::DELETE, dataset_id, body).await
    }

    /// POST a new dataset to a DMP
    pub async fn send_dataset_addition(&self, dmp_id: &str, body: &Value) -> Result<bool, NotifyError> {
        let url = prepare_endpoint_url(&self.config.dmp_endpoint_url, dmp_id);
        self.send(Method::POST, &url, body).await
    }

    /// Simple ids go into the URL; anything else goes to the collection
    /// endpoint and has to be carried in the body
    async fn send_dataset_request(
        &self,
        method: Method,
        dataset_id: &str,
        body: &Value,
    ) -> Result<bool, NotifyError> {
        let url = if is_simple_identifier(dataset_id) {
            prepare_endpoint_url(&self.config.dataset_endpoint_url, dataset_id)
        } else if body.get("dataset_id").is_some_and(|v| !v.is_null()) {
            self.config.datasets_endpoint_url.clone()
        } else {
            tracing::warn!(
                dataset_id = %dataset_id,
                "Dataset id not usable in URL and missing from body, not notifying"
            );
            return Ok(false);
        };

        self.send(method, &url, body).await
    }

    async fn send(&self, method: Method, url: &str, body: &Value) -> Result<bool, NotifyError> {
        let mut request = self.http.request(method.clone(), url).json(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(method = %method, url = %url, "Notifying DMP tool");

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::info!(method = %method, url = %url, status = status.as_u16(), "DMP tool notified");
                    Ok(true)
                } else {
                    tracing::warn!(method = %method, url = %url, status = status.as_u16(), "DMP tool rejected notification");
                    Ok(false)
                }
            }
            Err(e) => match self.policy {
                NotifyPolicy::Raise => Err(NotifyError::Connection {
                    url: url.to_string(),
                    message: e.to_string(),
                }),
                NotifyPolicy::Suppress => {
                    tracing::warn!(method = %method, url = %url, error = %e, "DMP tool unreachable");
                    Ok(false)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_endpoint_url() {
        assert_eq!(
            prepare_endpoint_url("http://dmp/api/datasets/{}", "ds-1"),
            "http://dmp/api/datasets/ds-1"
        );
        assert_eq!(
            prepare_endpoint_url("http://dmp/api/datasets/%s/", "ds-1"),
            "http://dmp/api/datasets/ds-1/"
        );
        assert_eq!(prepare_endpoint_url("http://dmp/api/datasets", "x"), "http://dmp/api/datasets");
    }

    #[test]
    fn test_simple_identifiers() {
        assert!(is_simple_identifier("ds-1"));
        assert!(is_simple_identifier("abc_DEF.9"));
        assert!(!is_simple_identifier("10.1234/abc"));
        assert!(!is_simple_identifier("https://doi.org/10.1/x"));
        assert!(!is_simple_identifier(""));
    }
}
