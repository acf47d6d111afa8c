use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::config::Configuration;
use querier::{
    Command, DataType, InfluxClient, InfluxDbAdaptor, PromValue, QuerierError, QueryContext,
    QueryResponse, RunnerRegistry, StoreError,
};
use serde_json::json;

/// Returns one canned response and records every statement it receives
struct CannedClient {
    response: QueryResponse,
    delay: Duration,
    statements: Mutex<Vec<(String, String)>>,
}

impl CannedClient {
    fn new(body: serde_json::Value) -> Self {
        Self {
            response: serde_json::from_value(body).unwrap(),
            delay: Duration::ZERO,
            statements: Mutex::new(Vec::new()),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(json!({"results": []}))
        }
    }

    fn statements(&self) -> Vec<(String, String)> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl InfluxClient for CannedClient {
    async fn query(
        &self,
        command: &str,
        database: &str,
        _precision: &str,
    ) -> Result<QueryResponse, StoreError> {
        self.statements
            .lock()
            .unwrap()
            .push((command.to_string(), database.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.response.clone())
    }
}

fn adaptor(client: Arc<CannedClient>) -> (InfluxDbAdaptor, Arc<RunnerRegistry>) {
    let registry = Arc::new(RunnerRegistry::with_defaults());
    let adaptor = InfluxDbAdaptor::new(
        Arc::clone(&registry),
        client,
        Arc::new(Configuration::default()),
    );
    (adaptor, registry)
}

fn end() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 6, 7, 0, 0).unwrap()
}

#[tokio::test]
async fn test_ungrouped_rows_reshape_into_sorted_matrix() {
    let client = Arc::new(CannedClient::new(json!({
        "results": [{
            "statement_id": 0,
            "series": [{
                "name": "cpu",
                "columns": ["time", "host", "cpu", "value"],
                "values": [
                    ["2023-01-06T06:59:30Z", "web", "cpu1", 0.5],
                    ["2023-01-06T06:59:00Z", "db", "cpu0", 0.1],
                    ["2023-01-06T06:59:00Z", "web", "cpu1", 0.4],
                    ["2023-01-06T06:59:00Z", "web", "cpu0", 0.2],
                    ["2023-01-06T06:59:30Z", "db", "cpu0", 0.3]
                ]
            }]
        }]
    })));
    let (adaptor, _) = adaptor(Arc::clone(&client));

    let command = Command {
        end: Some(end()),
        ..Command::new("cpu[1m]", "telegraf")
    };
    let result = adaptor.query(&QueryContext::new(), command).await.unwrap();

    assert_eq!(
        client.statements(),
        vec![(
            "SELECT *::tag, value FROM cpu WHERE time <= '2023-01-06T07:00:00Z' AND time >= '2023-01-06T06:59:00Z' GROUP BY *".to_string(),
            "telegraf".to_string()
        )]
    );

    let Some(PromValue::Matrix(series)) = &result.value else {
        panic!("expected a matrix, got {:?}", result.value);
    };
    let label_sets: Vec<_> = series
        .iter()
        .map(|s| (s.metric.get("host").unwrap(), s.metric.get("cpu").unwrap()))
        .collect();
    assert_eq!(label_sets, vec![("db", "cpu0"), ("web", "cpu0"), ("web", "cpu1")]);
    for s in series {
        assert!(s.points.windows(2).all(|w| w[0].t <= w[1].t));
    }

    let encoded = serde_json::to_value(&result).unwrap();
    assert_eq!(encoded["resultType"], "matrix");
    assert_eq!(
        encoded["result"][2],
        json!({
            "metric": {"__name__": "cpu", "cpu": "cpu1", "host": "web"},
            "values": [[1672988340, "0.4"], [1672988370, "0.5"]]
        })
    );
}

#[tokio::test]
async fn test_slow_store_loses_to_deadline() {
    let client = Arc::new(CannedClient::slow(Duration::from_secs(5)));
    let (adaptor, registry) = adaptor(client);

    let ctx = QueryContext::with_timeout(Duration::from_millis(1));
    let err = adaptor
        .query(&ctx, Command::new("go_goroutines", "prometheus"))
        .await
        .unwrap_err();

    assert!(matches!(err, QuerierError::DeadlineExceeded));
    assert_eq!(err.to_string(), "context deadline exceeded");
    let pool = registry.get(querier::CommandType::PROMQL_QUERY).unwrap();
    assert_eq!(pool.idle(), 1);
}

#[tokio::test]
async fn test_label_values() {
    let client = Arc::new(CannedClient::new(json!({
        "results": [{
            "statement_id": 0,
            "series": [{
                "name": "go_goroutines",
                "columns": ["key", "value"],
                "values": [["job", "prometheus"], ["job", "node"], ["job", "prometheus"]]
            }]
        }]
    })));
    let (adaptor, _) = adaptor(Arc::clone(&client));

    let command = Command {
        end: Some(end()),
        data_type: Some(DataType::LabelValues),
        label_name: Some("job".to_string()),
        ..Command::new("go_goroutines", "prometheus")
    };
    let result = adaptor.query(&QueryContext::new(), command).await.unwrap();

    assert_eq!(
        client.statements()[0].0,
        "SHOW TAG VALUES ON prometheus FROM go_goroutines WITH KEY = job WHERE time <= '2023-01-06T07:00:00Z'"
    );
    assert_eq!(
        result.value,
        Some(PromValue::LabelValues(vec![
            "prometheus".to_string(),
            "node".to_string()
        ]))
    );
}

#[tokio::test]
async fn test_label_values_without_selector() {
    let client = Arc::new(CannedClient::new(json!({"results": [{"statement_id": 0}]})));
    let (adaptor, _) = adaptor(Arc::clone(&client));

    let command = Command {
        data_type: Some(DataType::LabelValues),
        label_name: Some("job".to_string()),
        ..Command::new("", "prometheus")
    };
    let result = adaptor.query(&QueryContext::new(), command).await.unwrap();

    assert_eq!(
        client.statements()[0].0,
        "SHOW TAG VALUES ON prometheus WITH KEY = job"
    );
    assert_eq!(result.value, Some(PromValue::LabelValues(vec![])));
}

#[tokio::test]
async fn test_scalar_expression_skips_store() {
    let client = Arc::new(CannedClient::new(json!({"results": []})));
    let (adaptor, _) = adaptor(Arc::clone(&client));

    let command = Command {
        end: Some(end()),
        ..Command::new("1+1", "prometheus")
    };
    let result = adaptor.query(&QueryContext::new(), command).await.unwrap();

    assert!(client.statements().is_empty());
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({"resultType": "scalar", "result": [1672988400, "2"]})
    );
}

#[tokio::test]
async fn test_concurrent_queries_share_pool() {
    let client = Arc::new(CannedClient::new(json!({"results": []})));
    let (adaptor, registry) = adaptor(client);
    let adaptor = Arc::new(adaptor);

    let runs = (0..8).map(|i| {
        let adaptor = Arc::clone(&adaptor);
        async move {
            let command = Command {
                end: Some(end()),
                ..Command::new(format!("{i} * 2"), "prometheus")
            };
            adaptor.query(&QueryContext::new(), command).await
        }
    });
    let results = futures::future::join_all(runs).await;

    for (i, result) in results.into_iter().enumerate() {
        let value = result.unwrap().value;
        assert!(matches!(value, Some(PromValue::Scalar(p)) if p.v == (i * 2) as f64));
    }
    let pool = registry.get(querier::CommandType::PROMQL_QUERY).unwrap();
    assert!(pool.idle() >= 1);
}

#[test]
#[ntest::timeout(5000)]
fn test_blocking_caller() {
    let client = Arc::new(CannedClient::new(json!({"results": []})));
    let (adaptor, _) = adaptor(client);

    let result = tokio_test::block_on(adaptor.query(
        &QueryContext::new(),
        Command::new("2 ^ 10", "prometheus"),
    ));
    assert!(matches!(result.unwrap().value, Some(PromValue::Scalar(p)) if p.v == 1024.0));
}
