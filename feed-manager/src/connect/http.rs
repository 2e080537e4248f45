//! One-shot HTTPS queries.
//!
//! Each query is bound to a fixed endpoint URL at construction. Execution
//! resolves the host through the shared [`HostResolver`], pins the client
//! to the resolved addresses and performs a single GET with redirects
//! disabled. Anything other than a 2xx is an error.

use std::time::Duration;

use reqwest::redirect::Policy;
use url::Url;

use super::error::{ConnectError, HttpError};
use super::resolver::HostResolver;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A reusable single-request GET query against one HTTPS endpoint.
#[derive(Debug)]
pub struct OneShotQuery {
    url: Url,
    resolver: HostResolver,
}

impl OneShotQuery {
    /// Bind a query to an endpoint. Only `https` URLs with a host are
    /// accepted.
    pub fn new(url: &str, resolver: HostResolver) -> Result<Self, ConnectError> {
        let url = Url::parse(url)
            .map_err(|e| ConnectError::InvalidUrl(url.to_string(), e.to_string()))?;

        if url.scheme() != "https" {
            return Err(ConnectError::InvalidUrl(
                url.to_string(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if url.host_str().is_none() {
            return Err(ConnectError::InvalidUrl(
                url.to_string(),
                "missing host".to_string(),
            ));
        }

        Ok(Self { url, resolver })
    }

    /// The endpoint this query is bound to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Execute a GET with the given extra query parameters appended and
    /// return the response body.
    pub async fn execute(&self, query: &[(&str, &str)]) -> Result<String, HttpError> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| {
                ConnectError::InvalidUrl(self.url.to_string(), "missing host".to_string())
            })?
            .to_string();
        let port = self.url.port_or_known_default().unwrap_or(443);

        let addrs = self.resolver.resolve(&host, port).await?;

        let client = reqwest::Client::builder()
            .resolve_to_addrs(&host, &addrs)
            .redirect(Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HttpError::Transport {
                url: self.url.to_string(),
                reason: e.to_string(),
            })?;

        let mut url = self.url.clone();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let response = client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Connect(ConnectError::Timeout(REQUEST_TIMEOUT))
            } else {
                HttpError::Transport {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::from_status(status.as_u16(), url.to_string()));
        }

        response.text().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_https() {
        let resolver = HostResolver::new();
        let err = OneShotQuery::new("http://example.com/v5/market/time", resolver).unwrap_err();
        assert!(matches!(err, ConnectError::InvalidUrl(..)));
    }

    #[tokio::test]
    async fn test_rejects_garbage_url() {
        let resolver = HostResolver::new();
        let err = OneShotQuery::new("not a url", resolver).unwrap_err();
        assert!(matches!(err, ConnectError::InvalidUrl(..)));
    }

    #[tokio::test]
    async fn test_accepts_https_endpoint() {
        let resolver = HostResolver::new();
        let query =
            OneShotQuery::new("https://api.example.com/v5/market/time", resolver).unwrap();
        assert_eq!(query.url().host_str(), Some("api.example.com"));
        assert_eq!(query.url().path(), "/v5/market/time");
    }
}
