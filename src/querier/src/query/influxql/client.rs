//! InfluxDB 1.x HTTP query client
//!
//! The transpiled statement is sent to the `/query` endpoint and the JSON
//! envelope is decoded into [`QueryResponse`]. Timestamps are requested in
//! the server default (RFC3339 strings).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use common::config::InfluxDbConfig;

/// Errors talking to InfluxDB
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid InfluxDB URL: {0}")]
    Url(#[from] url::ParseError),
    /// InfluxDB answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// JSON deserialization error
    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
    /// Error reported inside an otherwise successful response
    #[error("{0}")]
    Remote(String),
    #[error("no InfluxDB client configured")]
    NotConfigured,
}

/// One series of a statement result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of a `/query` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Executes InfluxQL text against a store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InfluxClient: Send + Sync {
    async fn query(
        &self,
        command: &str,
        database: &str,
        precision: &str,
    ) -> Result<QueryResponse, StoreError>;
}

/// [`InfluxClient`] backed by the InfluxDB 1.x HTTP API
pub struct HttpInfluxClient {
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    http: reqwest::Client,
}

impl HttpInfluxClient {
    pub fn new(config: &InfluxDbConfig) -> Result<Self, StoreError> {
        Self::with_timeout(config, config.request_timeout)
    }

    pub fn with_timeout(config: &InfluxDbConfig, timeout: Duration) -> Result<Self, StoreError> {
        let mut base_url = Url::parse(&config.url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            http,
        })
    }
}

#[async_trait]
impl InfluxClient for HttpInfluxClient {
    async fn query(
        &self,
        command: &str,
        database: &str,
        precision: &str,
    ) -> Result<QueryResponse, StoreError> {
        let url = self.base_url.join("query")?;
        let mut params = vec![("q", command)];
        if !database.is_empty() {
            params.push(("db", database));
        }
        if !precision.is_empty() {
            params.push(("epoch", precision));
        }

        let mut request = self.http.get(url).query(&params);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_ref());
        }
        let resp = request.send().await?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<QueryResponse, StoreError> {
    let status = resp.status();
    let text = resp.text().await?;
    if status.is_success() {
        return Ok(serde_json::from_str(&text)?);
    }
    // InfluxDB reports query errors as {"error": "..."} with a 4xx status
    let message = serde_json::from_str::<QueryResponse>(&text)
        .ok()
        .and_then(|r| r.error)
        .unwrap_or(text);
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_query_response() {
        let body = json!({
            "results": [{
                "statement_id": 0,
                "series": [{
                    "name": "cpu",
                    "tags": {"host": "telegraf"},
                    "columns": ["time", "last"],
                    "values": [["2023-01-06T07:00:00Z", 1.5]]
                }]
            }]
        });
        let resp: QueryResponse = serde_json::from_value(body).unwrap();

        assert!(resp.error.is_none());
        let row = &resp.results[0].series[0];
        assert_eq!(row.name, "cpu");
        assert_eq!(row.tags.get("host").map(String::as_str), Some("telegraf"));
        assert_eq!(row.columns, vec!["time", "last"]);
        assert_eq!(row.values[0][1], json!(1.5));
    }

    #[test]
    fn test_decode_statement_error() {
        let body = json!({"results": [{"statement_id": 0, "error": "database not found: foo"}]});
        let resp: QueryResponse = serde_json::from_value(body).unwrap();

        assert!(resp.results[0].series.is_empty());
        assert_eq!(
            resp.results[0].error.as_deref(),
            Some("database not found: foo")
        );
    }

    #[test]
    fn test_query_endpoint_url() {
        let config = InfluxDbConfig {
            url: "http://localhost:8086".to_string(),
            ..Default::default()
        };
        let client = HttpInfluxClient::new(&config).unwrap();
        assert_eq!(
            client.base_url.join("query").unwrap().as_str(),
            "http://localhost:8086/query"
        );

        let config = InfluxDbConfig {
            url: "https://influx.example.com/proxy".to_string(),
            ..Default::default()
        };
        let client = HttpInfluxClient::new(&config).unwrap();
        assert_eq!(
            client.base_url.join("query").unwrap().as_str(),
            "https://influx.example.com/proxy/query"
        );
    }

    #[test]
    fn test_invalid_url() {
        let config = InfluxDbConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpInfluxClient::new(&config),
            Err(StoreError::Url(_))
        ));
    }
}
