use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pbench_core::api::{ClientError, QueryClient, QueryRequest, QueryResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::PrestoHttpError;

pub const USER_HEADER: &str = "X-Presto-User";
pub const CATALOG_HEADER: &str = "X-Presto-Catalog";
pub const SCHEMA_HEADER: &str = "X-Presto-Schema";
pub const SESSION_HEADER: &str = "X-Presto-Session";

/// One page of `/v1/statement` results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementPage {
    pub id: String,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub stats: Option<StatementStats>,
    #[serde(default)]
    pub error: Option<QueryErrorInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatementStats {
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryErrorInfo {
    pub message: String,
    #[serde(default)]
    pub error_name: Option<String>,
}

/// Entry of `GET /v1/query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicQueryInfo {
    pub query_id: String,
    pub state: String,
    pub query: String,
    #[serde(default)]
    pub session: Option<SessionInfo>,
}

impl BasicQueryInfo {
    pub fn is_active(&self) -> bool {
        matches!(
            self.state.as_str(),
            "QUEUED" | "WAITING_FOR_RESOURCES" | "DISPATCHING" | "PLANNING" | "STARTING" | "RUNNING"
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default, rename = "systemProperties")]
    pub system_properties: BTreeMap<String, String>,
}

/// REST client for a Presto coordinator.
#[derive(Clone)]
pub struct PrestoClient {
    http: reqwest::Client,
    user: String,
    base_url: String,
    url_statement: String,
    url_query: String,
}

impl PrestoClient {
    pub fn new(base_url: &str, user: &str, timeout_ms: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        let normalized = base_url.trim_end_matches('/');
        Ok(Self {
            http,
            user: user.to_string(),
            base_url: normalized.to_string(),
            url_statement: format!("{}/v1/statement", normalized),
            url_query: format!("{}/v1/query", normalized),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queries currently known to the coordinator.
    pub async fn list_queries(&self) -> anyhow::Result<Vec<BasicQueryInfo>> {
        let url = self.url_query.clone();
        let resp = self
            .http
            .get(&url)
            .header(USER_HEADER, &self.user)
            .send()
            .await
            .map_err(|err| PrestoHttpError::from_reqwest(err, url.clone()))?;
        let queries: Vec<BasicQueryInfo> = parse_json_response(resp).await?;
        tracing::debug!(url = %url, queries = queries.len(), "listed queries");
        Ok(queries)
    }

    async fn submit(&self, request: &QueryRequest) -> anyhow::Result<StatementPage> {
        let url = self.url_statement.clone();
        let mut req = self
            .http
            .post(&url)
            .header(USER_HEADER, &self.user)
            .body(request.sql.clone());
        if let Some(catalog) = request.catalog.as_deref().filter(|c| !c.is_empty()) {
            req = req.header(CATALOG_HEADER, catalog);
        }
        if let Some(schema) = request.schema.as_deref().filter(|s| !s.is_empty()) {
            req = req.header(SCHEMA_HEADER, schema);
        }
        if !request.session.is_empty() {
            req = req.header(SESSION_HEADER, session_header_value(&request.session));
        }
        let resp = req
            .send()
            .await
            .map_err(|err| PrestoHttpError::from_reqwest(err, url))?;
        parse_json_response(resp).await
    }

    async fn fetch_page(&self, uri: &str) -> anyhow::Result<StatementPage> {
        let resp = self
            .http
            .get(uri)
            .header(USER_HEADER, &self.user)
            .send()
            .await
            .map_err(|err| PrestoHttpError::from_reqwest(err, uri.to_string()))?;
        parse_json_response(resp).await
    }

    async fn cancel_uri(&self, uri: &str) {
        match self
            .http
            .delete(uri)
            .header(USER_HEADER, &self.user)
            .send()
            .await
        {
            Ok(resp) => tracing::debug!(uri = %uri, status = %resp.status(), "query cancelled"),
            Err(err) => tracing::warn!(uri = %uri, error = %err, "failed to cancel query"),
        }
    }
}

#[async_trait]
impl QueryClient for PrestoClient {
    async fn execute(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let started = Instant::now();

        let mut page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            res = self.submit(request) => res.map_err(|e| ClientError::Request(e.to_string()))?,
        };

        let mut result = QueryResult {
            query_id: Some(page.id.clone()),
            ..QueryResult::default()
        };

        loop {
            if let Some(err) = page.error.take() {
                tracing::debug!(query_id = %page.id, error_name = ?err.error_name, "query failed");
                return Err(ClientError::Query {
                    query_id: page.id.clone(),
                    message: err.message,
                });
            }
            if result.columns.is_empty() {
                if let Some(columns) = page.columns.take() {
                    result.columns = columns.into_iter().map(|c| c.name).collect();
                }
            }
            if let Some(rows) = page.data.take() {
                result.rows.extend(rows);
            }

            let Some(next) = page.next_uri.take() else {
                break;
            };
            if cancel.is_cancelled() {
                self.cancel_uri(&next).await;
                return Err(ClientError::Cancelled);
            }
            page = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cancel_uri(&next).await;
                    return Err(ClientError::Cancelled);
                }
                res = self.fetch_page(&next) => res.map_err(|e| ClientError::Request(e.to_string()))?,
            };
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }
}

fn session_header_value(session: &BTreeMap<String, String>) -> String {
    session
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

async fn parse_json_response<T: DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|err| PrestoHttpError::from_reqwest(err, url.clone()))?;

    if !status.is_success() {
        return Err(PrestoHttpError::status_error(status.as_u16(), url, &body).into());
    }

    serde_json::from_str::<T>(&body)
        .map_err(|err| PrestoHttpError::decode_error(status.as_u16(), url, err, &body).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_execute_follows_next_uri() {
        let mut server = mockito::Server::new_async().await;
        let next = format!("{}/v1/statement/q1/1", server.url());

        let first = server
            .mock("POST", "/v1/statement")
            .match_header(USER_HEADER, "bench")
            .match_header(CATALOG_HEADER, "hive")
            .match_header(SESSION_HEADER, "a=1,b=2")
            .match_body("select 1")
            .with_body(
                serde_json::json!({
                    "id": "q1",
                    "nextUri": next,
                    "stats": {"state": "QUEUED"}
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/v1/statement/q1/1")
            .with_body(
                serde_json::json!({
                    "id": "q1",
                    "columns": [{"name": "_col0", "type": "integer"}],
                    "data": [[1]],
                    "stats": {"state": "FINISHED"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = PrestoClient::new(&server.url(), "bench", 5_000).unwrap();
        let mut request = QueryRequest::new("select 1");
        request.catalog = Some("hive".into());
        request.session.insert("a".into(), "1".into());
        request.session.insert("b".into(), "2".into());

        let result = client
            .execute(&request, &CancellationToken::new())
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(result.query_id.as_deref(), Some("q1"));
        assert_eq!(result.columns, vec!["_col0".to_string()]);
        assert_eq!(result.rows, vec![vec![serde_json::json!(1)]]);
    }

    #[tokio::test]
    async fn test_execute_reports_query_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/statement")
            .with_body(
                serde_json::json!({
                    "id": "q2",
                    "error": {"message": "Table not found", "errorName": "TABLE_NOT_FOUND"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = PrestoClient::new(&server.url(), "bench", 5_000).unwrap();
        let err = client
            .execute(&QueryRequest::new("select * from t"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::Query {
                query_id: "q2".into(),
                message: "Table not found".into()
            }
        );
    }

    #[tokio::test]
    async fn test_execute_maps_http_status_to_request_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/statement")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = PrestoClient::new(&server.url(), "bench", 5_000).unwrap();
        let err = client
            .execute(&QueryRequest::new("select 1"), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ClientError::Request(msg) => assert!(msg.contains("status=503")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_returns_cancelled_when_token_fired() {
        let client = PrestoClient::new("http://127.0.0.1:9", "bench", 1_000).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .execute(&QueryRequest::new("select 1"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Cancelled);
    }

    #[tokio::test]
    async fn test_list_queries() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/query")
            .with_body(
                serde_json::json!([
                    {"queryId": "a", "state": "RUNNING", "query": "select 1",
                     "session": {"user": "u", "catalog": "hive", "schema": "tpch"}},
                    {"queryId": "b", "state": "FINISHED", "query": "select 2"}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = PrestoClient::new(&server.url(), "bench", 5_000).unwrap();
        let queries = client.list_queries().await.unwrap();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].is_active());
        assert!(!queries[1].is_active());
        assert_eq!(
            queries[0].session.as_ref().and_then(|s| s.schema.as_deref()),
            Some("tpch")
        );
    }
}
