use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use flowline_core::config::RunnerConfig;
use flowline_core::document::GraphDocument;
use flowline_core::error::{FlowlineError, Result};

use crate::codec::{ResumableRunRequest, ResumeRequest, RunRequest, ValidateRequest};

/// Raw body bytes of one open event stream. Chunk errors are already mapped
/// into the crate error type so test transports never need a reqwest error.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Seam between the execution session and the wire.
///
/// The session only needs the three streaming endpoints; validation and
/// persistence stay on the concrete client. Tests substitute an in-memory
/// implementation.
pub trait RunnerTransport: Send + Sync {
    fn open_run(&self, request: RunRequest) -> BoxFuture<'_, Result<ByteStream>>;
    fn open_resumable(&self, request: ResumableRunRequest) -> BoxFuture<'_, Result<ByteStream>>;
    fn open_resume(&self, request: ResumeRequest) -> BoxFuture<'_, Result<ByteStream>>;
}

/// Result of the runner's non-streaming graph validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A persisted graph on the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedGraph {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub graph_data: GraphDocument,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SavedGraphBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    graph_data: &'a GraphDocument,
}

/// HTTP client for the runner API.
pub struct RunnerClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RunnerClient {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    /// Open a streaming endpoint, failing fast on a non-success status.
    ///
    /// Connection-level failures carry status 0 since no response exists.
    /// No per-request timeout: the stream stays open for the whole run.
    async fn open_stream<B: Serialize>(&self, path: &str, body: &B) -> Result<ByteStream> {
        debug!(path, "opening run stream");
        let response = self
            .request(self.http.post(self.url(path)).json(body))
            .send()
            .await
            .map_err(|e| FlowlineError::Transport {
                status: 0,
                body: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(FlowlineError::Transport { status, body });
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| FlowlineError::StreamLost(e.to_string()));
        Ok(stream.boxed())
    }

    /// Issue a non-streaming JSON request and decode the response body.
    async fn json_request<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self
            .request(builder.timeout(self.timeout))
            .send()
            .await
            .map_err(|e| FlowlineError::Transport {
                status: 0,
                body: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(FlowlineError::Transport { status, body });
        }

        let body = response.text().await.map_err(|e| FlowlineError::Transport {
            status: 0,
            body: e.to_string(),
        })?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Ask the remote validator whether a graph is executable.
    pub async fn validate(&self, request: &ValidateRequest) -> Result<ValidationReport> {
        self.json_request(self.http.post(self.url("/api/validate")).json(request))
            .await
    }

    // Saved-graph persistence.

    pub async fn create_graph(
        &self,
        name: &str,
        description: Option<&str>,
        graph_data: &GraphDocument,
    ) -> Result<SavedGraph> {
        let body = SavedGraphBody {
            name,
            description,
            graph_data,
        };
        self.json_request(self.http.post(self.url("/api/graphs")).json(&body))
            .await
    }

    pub async fn list_graphs(&self) -> Result<Vec<SavedGraph>> {
        self.json_request(self.http.get(self.url("/api/graphs"))).await
    }

    pub async fn get_graph(&self, id: &str) -> Result<SavedGraph> {
        self.json_request(self.http.get(self.url(&format!("/api/graphs/{id}"))))
            .await
    }

    pub async fn update_graph(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
        graph_data: &GraphDocument,
    ) -> Result<SavedGraph> {
        let body = SavedGraphBody {
            name,
            description,
            graph_data,
        };
        self.json_request(self.http.put(self.url(&format!("/api/graphs/{id}"))).json(&body))
            .await
    }

    pub async fn delete_graph(&self, id: &str) -> Result<()> {
        let response = self
            .request(
                self.http
                    .delete(self.url(&format!("/api/graphs/{id}")))
                    .timeout(self.timeout),
            )
            .send()
            .await
            .map_err(|e| FlowlineError::Transport {
                status: 0,
                body: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(FlowlineError::Transport { status, body });
        }
        Ok(())
    }
}

impl RunnerTransport for RunnerClient {
    fn open_run(&self, request: RunRequest) -> BoxFuture<'_, Result<ByteStream>> {
        Box::pin(async move { self.open_stream("/api/runs", &request).await })
    }

    fn open_resumable(&self, request: ResumableRunRequest) -> BoxFuture<'_, Result<ByteStream>> {
        Box::pin(async move { self.open_stream("/api/runs/resumable", &request).await })
    }

    fn open_resume(&self, request: ResumeRequest) -> BoxFuture<'_, Result<ByteStream>> {
        Box::pin(async move { self.open_stream("/api/runs/resume", &request).await })
    }
}
