//! Market and sentiment data collaborators
//!
//! Queried once per request, before round 0. Any failure degrades to an empty
//! dataset for that source; the committee still runs.

use crate::config::DataServicesConfig;
use crate::error::OrchestrationError;
use crate::models::{CommitteeRequest, Context, MarketDataset, TimeHorizon};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct DataQuery {
    pub symbols: Vec<String>,
    pub keywords: Vec<String>,
    pub time_horizon: TimeHorizon,
    /// Look-back window such as "24h" or "7d".
    pub window: String,
}

impl DataQuery {
    pub fn from_request(request: &CommitteeRequest) -> Self {
        let mut keywords = vec![request.topic.trim().to_string()];
        if let Some(headline) = &request.headline {
            keywords.push(headline.trim().to_string());
        }

        Self {
            symbols: request.symbols.iter().map(|s| s.trim().to_string()).collect(),
            keywords,
            time_horizon: request.time_horizon,
            window: window_for(request.time_horizon).to_string(),
        }
    }
}

fn window_for(horizon: TimeHorizon) -> &'static str {
    match horizon {
        TimeHorizon::Immediate => "1h",
        TimeHorizon::Short => "24h",
        TimeHorizon::Medium => "7d",
        TimeHorizon::Long => "30d",
        TimeHorizon::Extended => "90d",
    }
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Key under which this source's data lands in the dataset.
    fn name(&self) -> &str;

    async fn fetch(&self, query: &DataQuery) -> Result<MarketDataset>;
}

/// Strip a `{success, data}` envelope. Bodies without one pass through.
fn unwrap_envelope(body: Value) -> Option<Value> {
    match body.get("success").and_then(Value::as_bool) {
        Some(true) => body.get("data").cloned().filter(|d| !d.is_null()),
        Some(false) => None,
        None => Some(body),
    }
}

async fn post_json(client: &Client, url: &str, body: &Value) -> Result<Value> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| OrchestrationError::DataSource(format!("{}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(OrchestrationError::DataSource(format!(
            "{} returned {}",
            url, status
        )));
    }

    Ok(response.json::<Value>().await?)
}

fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(timeout)
        .build()?)
}

/// Stock service market context
pub struct StockDataClient {
    client: Client,
    base_url: String,
}

impl StockDataClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataSource for StockDataClient {
    fn name(&self) -> &str {
        "market_context"
    }

    async fn fetch(&self, query: &DataQuery) -> Result<MarketDataset> {
        let mut dataset = MarketDataset::default();
        if query.symbols.is_empty() {
            return Ok(dataset);
        }

        let url = format!("{}/api/v1/rag/market-context", self.base_url);
        let body = json!({
            "symbols": query.symbols,
            "time_horizon": query.time_horizon,
        });

        match unwrap_envelope(post_json(&self.client, &url, &body).await?) {
            Some(data) => {
                info!(symbols = query.symbols.len(), "Fetched market context");
                dataset.insert(self.name(), data);
            }
            None => warn!("Stock service reported failure; continuing without market context"),
        }
        Ok(dataset)
    }
}

/// Realtime sentiment summary
pub struct SentimentClient {
    client: Client,
    base_url: String,
}

impl SentimentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataSource for SentimentClient {
    fn name(&self) -> &str {
        "sentiment"
    }

    async fn fetch(&self, query: &DataQuery) -> Result<MarketDataset> {
        let url = format!("{}/api/v1/sentiment/realtime", self.base_url);
        let body = json!({
            "symbols": query.symbols,
            "keywords": query.keywords,
            "time_window": query.window,
            "metrics": ["sentiment_score", "volume", "trend", "alerts"],
        });

        let mut dataset = MarketDataset::default();
        if let Some(data) = unwrap_envelope(post_json(&self.client, &url, &body).await?) {
            dataset.insert(self.name(), data);
        }
        Ok(dataset)
    }
}

/// Builds the seed context from the request and every configured data source.
#[derive(Clone, Default)]
pub struct ContextBuilder {
    sources: Vec<Arc<dyn MarketDataSource>>,
}

impl ContextBuilder {
    pub fn new(sources: Vec<Arc<dyn MarketDataSource>>) -> Self {
        Self { sources }
    }

    /// Sources for whichever service URLs are configured.
    pub fn from_config(config: &DataServicesConfig) -> Result<Self> {
        let mut sources: Vec<Arc<dyn MarketDataSource>> = Vec::new();
        if let Some(url) = &config.stock_service_url {
            sources.push(Arc::new(StockDataClient::new(url.as_str(), config.request_timeout)?));
        }
        if let Some(url) = &config.sentiment_service_url {
            sources.push(Arc::new(SentimentClient::new(url.as_str(), config.request_timeout)?));
        }
        Ok(Self::new(sources))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Query all sources concurrently and merge what comes back. Never fails.
    pub async fn seed(&self, request_id: Uuid, request: &CommitteeRequest) -> Context {
        let query = Arc::new(DataQuery::from_request(request));
        let mut tasks = JoinSet::new();

        for source in &self.sources {
            let source = Arc::clone(source);
            let query = Arc::clone(&query);
            tasks.spawn(async move {
                let name = source.name().to_string();
                (name, source.fetch(&query).await)
            });
        }

        let mut market_data = MarketDataset::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(dataset))) => {
                    debug!(%request_id, source = %name, entries = dataset.sources.len(), "Data source settled");
                    market_data.merge(dataset);
                }
                Ok((name, Err(e))) => {
                    warn!(%request_id, source = %name, "Data source failed, using empty dataset: {}", e);
                }
                Err(e) => warn!(%request_id, "Data source task failed: {}", e),
            }
        }

        Context::seed(request_id, request, market_data)
    }
}
