//! Remote SPARQL 1.1 protocol endpoints.

use super::{RowStream, Source};
use crate::core::{Binding, SourceId};
use crate::error::{FederationError, Result, SourceError};
use crate::execution::result_converter::{parse_results, RemoteResults, SPARQL_RESULTS_JSON};
use crate::execution::CancelSignal;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Builds the HTTP client shared by all endpoints of a federation, so
/// connections are pooled across sub-queries and queries.
pub fn build_client(request_timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|e| FederationError::Config(format!("Cannot build HTTP client: {}", e)))
}

/// A SPARQL endpoint queried with `POST` form requests.
#[derive(Debug, Clone)]
pub struct HttpSparqlSource {
    id: SourceId,
    endpoint: String,
    client: Client,
}

impl HttpSparqlSource {
    pub fn new(id: SourceId, endpoint: impl Into<String>, client: Client) -> Self {
        Self { id, endpoint: endpoint.into(), client }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

async fn send_query(
    client: &Client,
    endpoint: &str,
    query: &str,
) -> std::result::Result<RemoteResults, SourceError> {
    let response = client
        .post(endpoint)
        .header(ACCEPT, SPARQL_RESULTS_JSON)
        .form(&[("query", query)])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        return Err(SourceError::Remote(format!(
            "Query failed with status {}: {}",
            status, error_body
        )));
    }

    let body = response.bytes().await?;
    parse_results(&body)
}

/// Races a request against the cancel signal.
async fn cancellable(
    client: Client,
    endpoint: String,
    query: String,
    cancel: CancelSignal,
) -> std::result::Result<RemoteResults, SourceError> {
    if cancel.is_cancelled() {
        return Err(SourceError::Cancelled);
    }
    tokio::select! {
        result = send_query(&client, &endpoint, &query) => result,
        _ = cancel.cancelled() => {
            debug!("Request to {} cancelled", endpoint);
            Err(SourceError::Cancelled)
        }
    }
}

#[async_trait]
impl Source for HttpSparqlSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn open(&self) -> std::result::Result<(), SourceError> {
        match send_query(&self.client, &self.endpoint, "ASK {}").await {
            Ok(_) => Ok(()),
            Err(SourceError::Remote(message)) | Err(SourceError::Response(message)) => {
                Err(SourceError::Connection(message))
            }
            Err(e) => Err(e),
        }
    }

    fn select(&self, query: &str, cancel: CancelSignal) -> RowStream {
        debug!("Sending sub-query to {}:\n{}", self.id, query);
        let request =
            cancellable(self.client.clone(), self.endpoint.clone(), query.to_string(), cancel);

        stream::once(request)
            .flat_map(|result| {
                let rows: Vec<std::result::Result<Binding, SourceError>> = match result {
                    Ok(RemoteResults::Solutions(rows)) => rows.into_iter().map(Ok).collect(),
                    Ok(RemoteResults::Boolean(_)) => {
                        let message = "expected solutions, got a boolean".to_string();
                        vec![Err(SourceError::Response(message))]
                    }
                    Err(e) => vec![Err(e)],
                };
                stream::iter(rows)
            })
            .boxed()
    }

    async fn ask(
        &self,
        query: &str,
        cancel: CancelSignal,
    ) -> std::result::Result<bool, SourceError> {
        let result =
            cancellable(self.client.clone(), self.endpoint.clone(), query.to_string(), cancel)
                .await?;
        match result {
            RemoteResults::Boolean(value) => Ok(value),
            RemoteResults::Solutions(rows) => Ok(!rows.is_empty()),
        }
    }
}
