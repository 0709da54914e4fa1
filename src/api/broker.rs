use crate::models::{Mode, Rate};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("broker rejected the order ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Broker's view of one position.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerPosition {
    pub id: String,
    #[serde(default)]
    pub state: String,
    pub direction: String,
    pub market: String,
    pub size: f64,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub close_price: f64,
    #[serde(default)]
    pub created_at: i64,
}

/// Order routing for positions that reach the virtual and real stages.
pub trait Broker: Send + Sync {
    fn open(
        &self,
        market: &str,
        mode: Mode,
        size: f64,
        rate: &Rate,
    ) -> impl std::future::Future<Output = Result<BrokerPosition, BrokerError>> + Send;

    fn close(
        &self,
        external_id: &str,
        rate: &Rate,
    ) -> impl std::future::Future<Output = Result<BrokerPosition, BrokerError>> + Send;
}

/// REST broker client.
#[derive(Clone)]
pub struct RestBroker {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestBroker {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn accept(response: reqwest::Response) -> Result<BrokerPosition, BrokerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

impl Broker for RestBroker {
    async fn open(
        &self,
        market: &str,
        mode: Mode,
        size: f64,
        _rate: &Rate,
    ) -> Result<BrokerPosition, BrokerError> {
        let mut form = HashMap::new();
        form.insert("direction", mode.as_str().to_lowercase());
        form.insert("market", market.to_string());
        form.insert("size", format!("{size}"));

        let response = self
            .client
            .post(format!("{}/position/new", self.base_url))
            .bearer_auth(&self.api_key)
            .form(&form)
            .send()
            .await?;

        let position = Self::accept(response).await?;
        tracing::info!(
            "Opened broker position {} on {} ({} {})",
            position.id,
            market,
            mode,
            size
        );
        Ok(position)
    }

    async fn close(&self, external_id: &str, _rate: &Rate) -> Result<BrokerPosition, BrokerError> {
        let response = self
            .client
            .put(format!("{}/position/close/{}", self.base_url, external_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let position = Self::accept(response).await?;
        tracing::info!("Closed broker position {}", external_id);
        Ok(position)
    }
}

/// In-process broker filling orders at the submitted quote. Used for paper
/// trading and tests.
#[derive(Default)]
pub struct PaperBroker {
    open: Mutex<HashMap<String, BrokerPosition>>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().map(|open| open.len()).unwrap_or(0)
    }
}

impl Broker for PaperBroker {
    async fn open(
        &self,
        market: &str,
        mode: Mode,
        size: f64,
        rate: &Rate,
    ) -> Result<BrokerPosition, BrokerError> {
        let position = BrokerPosition {
            id: Uuid::new_v4().to_string(),
            state: "active".to_string(),
            direction: mode.as_str().to_lowercase(),
            market: market.to_string(),
            size,
            profit: 0.0,
            // Long buys at the ask, short sells at the bid.
            entry_price: match mode {
                Mode::Long => rate.ask,
                Mode::Short => rate.bid,
            },
            close_price: 0.0,
            created_at: rate.time,
        };
        if let Ok(mut open) = self.open.lock() {
            open.insert(position.id.clone(), position.clone());
        }
        Ok(position)
    }

    async fn close(&self, external_id: &str, rate: &Rate) -> Result<BrokerPosition, BrokerError> {
        let mut position = self
            .open
            .lock()
            .ok()
            .and_then(|mut open| open.remove(external_id))
            .ok_or_else(|| BrokerError::Rejected {
                status: 404,
                body: format!("unknown position {external_id}"),
            })?;

        position.state = "closed".to_string();
        position.close_price = match position.direction.as_str() {
            "long" => rate.bid,
            _ => rate.ask,
        };
        Ok(position)
    }
}
