//! HTTP client for the portal lookup, with timeout and single-retry policy.

use casefetch_core::{CaseQuery, RawResponse};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PortalConfig;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("portal request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("portal returned {status} with an empty body")]
    EmptyErrorBody { status: u16 },
}

/// Sends one case-status lookup to the portal.
///
/// Retries exactly once, and only on connection/timeout errors. A completed
/// response is never re-requested — retrying a page the portal chose to
/// serve (however unexpected) would only amplify load against a possibly
/// defensive site.
pub struct CaseQueryClient {
    http: reqwest::Client,
    config: PortalConfig,
}

impl CaseQueryClient {
    pub fn new(config: PortalConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Fetch the portal's response for one lookup.
    ///
    /// The returned [`RawResponse`] is handed onward untouched; status-code
    /// interpretation beyond the empty-error-body check belongs to the
    /// classifier.
    pub async fn fetch(&self, query: &CaseQuery) -> Result<RawResponse, ClientError> {
        let params = self.config.query_params(query);
        info!(case = %query.reference(), url = %self.config.base_url, "querying portal");

        match self.attempt(&params).await {
            Err(ClientError::Http(e)) if e.is_timeout() || e.is_connect() => {
                warn!(error = %e, "transient portal error, retrying once");
                self.attempt(&params).await
            }
            other => other,
        }
    }

    async fn attempt(&self, params: &[(String, String)]) -> Result<RawResponse, ClientError> {
        let resp = self
            .http
            .get(&self.config.base_url)
            .query(params)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        if !(200..400).contains(&status) && body.trim().is_empty() {
            return Err(ClientError::EmptyErrorBody { status });
        }
        Ok(RawResponse {
            http_status: status,
            body,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_from_default_config() {
        let client = CaseQueryClient::new(PortalConfig::default()).unwrap();
        assert_eq!(client.config().timeout.as_secs(), 15);
    }

    #[test]
    fn empty_error_body_message_names_status() {
        let err = ClientError::EmptyErrorBody { status: 502 };
        assert_eq!(err.to_string(), "portal returned 502 with an empty body");
    }
}
