//! HTTP client for a remote SPARQL 1.1 Protocol endpoint.

use crate::core::{SparqlJsonTerm, Term};
use crate::querying::query_processing::{Binding, SparqlStore, StoreError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

#[derive(Debug, Deserialize)]
struct SparqlResults {
    results: SparqlResultRows,
}

#[derive(Debug, Deserialize)]
struct SparqlResultRows {
    bindings: Vec<HashMap<String, SparqlJsonTerm>>,
}

/// A [`SparqlStore`] reached over HTTP.
///
/// Queries and updates are sent as form-encoded POST bodies, which every common
/// triplestore accepts.
pub struct SparqlClient {
    endpoint: String,
    client: Client,
    headers: HeaderMap,
}

impl SparqlClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_timeout(endpoint, Duration::from_secs(60))
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Http(e.to_string()))?;
        Ok(Self { endpoint: endpoint.into(), client, headers: HeaderMap::new() })
    }

    /// Send an extra header with every request, e.g. `mu-auth-sudo: true`.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, StoreError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| StoreError::Http(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StoreError::Http(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_form(&self, field: &str, body: &str) -> Result<reqwest::Response, StoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[(field, body)])
            .send()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Status { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl SparqlStore for SparqlClient {
    async fn query(&self, query: &str) -> Result<Vec<Binding>, StoreError> {
        debug!(endpoint = %self.endpoint, "sending SPARQL query");
        let response = self.post_form("query", query).await?;
        let results: SparqlResults =
            response.json().await.map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(results
            .results
            .bindings
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter_map(|(var, term)| Term::try_from(term).ok().map(|term| (var, term)))
                    .collect()
            })
            .collect())
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        debug!(endpoint = %self.endpoint, "sending SPARQL update");
        self.post_form("update", update).await?;
        Ok(())
    }
}
