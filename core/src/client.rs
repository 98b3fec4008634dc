//! Query-engine client capability consumed by stage runners.
//!
//! The engine never builds network clients itself; a [`ClientFactory`] is
//! injected into the shared run state.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("query {query_id} failed: {message}")]
    Query { query_id: String, message: String },
    #[error("query cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub session: BTreeMap<String, String>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub elapsed_ms: u64,
}

#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Run one statement to completion. Implementations must return
    /// `ClientError::Cancelled` promptly once `cancel` fires.
    async fn execute(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, ClientError>;
}

/// Produces a fresh client connection per call.
pub type ClientFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn QueryClient>> + Send + Sync>;
