//! Production `BrokerClient`: a rate-limited REST client against the
//! configured broker endpoint.

use crate::client::BrokerClient;
use crate::error::{BrokerError, Result};
use crate::rate_limiter::RateLimiter;
use crate::types::{BrokerOrderStatus, OrderAck, OrderRequest, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optrade_core::{Candle, OptionContract, Price, Quantity, Symbol, Timeframe};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    api_key: &'a str,
    api_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuoteResponse {
    symbol: String,
    last_price: String,
    bid: String,
    ask: String,
    volume: String,
    #[serde(rename = "timestamp")]
    ts: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MarginResponse {
    available_margin: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrderResponse {
    broker_order_id: String,
    status: BrokerOrderStatus,
    filled_quantity: String,
    average_fill_price: Option<String>,
}

/// Broker reachable over HTTP, behind the application's configured base
/// URL and credentials. Every call passes through `rate_limiter` and
/// requires a prior `authenticate()`.
pub struct HttpBrokerClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    rate_limiter: RateLimiter,
    token: parking_lot::RwLock<Option<String>>,
    authenticated: AtomicBool,
}

impl HttpBrokerClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            rate_limiter: RateLimiter::new(200, Duration::from_secs(60), 20),
            token: parking_lot::RwLock::new(None),
            authenticated: AtomicBool::new(false),
        })
    }

    fn bearer(&self) -> Option<String> {
        self.token.read().clone()
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        self.rate_limiter.wait_for_capacity().await;
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(token) = self.bearer() {
            req = req.bearer_auth(token);
        }
        self.rate_limiter.record_send();
        let response = req
            .send()
            .await
            .map_err(|e| BrokerError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::BrokerStatus {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| BrokerError::Parse(e.to_string()))
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn authenticate(&self) -> Result<()> {
        info!(base_url = %self.base_url, "authenticating with broker");
        let request = AuthRequest {
            api_key: &self.api_key,
            api_secret: &self.api_secret,
        };
        let response = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| BrokerError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::AuthFailed(format!("HTTP {status}: {body}")));
        }
        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::Parse(e.to_string()))?;
        *self.token.write() = Some(body.access_token);
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        let path = format!("/quotes/{}", symbol.as_str());
        let raw: QuoteResponse = self.get_json(&path).await?;
        Ok(Quote {
            symbol: Symbol::new(raw.symbol),
            last_price: Price::new(raw.last_price.parse().map_err(|e| BrokerError::Parse(format!("{e}")))?),
            bid: Price::new(raw.bid.parse().map_err(|e| BrokerError::Parse(format!("{e}")))?),
            ask: Price::new(raw.ask.parse().map_err(|e| BrokerError::Parse(format!("{e}")))?),
            volume: Quantity::new(raw.volume.parse().map_err(|e| BrokerError::Parse(format!("{e}")))?),
            timestamp: raw.ts,
        })
    }

    async fn get_quotes(&self, symbols: &[Symbol]) -> Result<HashMap<Symbol, Quote>> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = symbols.iter().map(Symbol::as_str).collect::<Vec<_>>().join(",");
        let path = format!("/quotes?symbols={joined}");
        let raw: Vec<QuoteResponse> = self.get_json(&path).await?;
        raw.into_iter()
            .map(|r| {
                let quote = Quote {
                    symbol: Symbol::new(r.symbol.clone()),
                    last_price: Price::new(r.last_price.parse().map_err(|e| BrokerError::Parse(format!("{e}")))?),
                    bid: Price::new(r.bid.parse().map_err(|e| BrokerError::Parse(format!("{e}")))?),
                    ask: Price::new(r.ask.parse().map_err(|e| BrokerError::Parse(format!("{e}")))?),
                    volume: Quantity::new(r.volume.parse().map_err(|e| BrokerError::Parse(format!("{e}")))?),
                    timestamp: r.ts,
                };
                Ok((Symbol::new(r.symbol), quote))
            })
            .collect()
    }

    async fn get_available_margin(&self) -> Result<Price> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        let raw: MarginResponse = self.get_json("/margins").await?;
        Ok(Price::new(
            raw.available_margin
                .parse()
                .map_err(|e| BrokerError::Parse(format!("{e}")))?,
        ))
    }

    async fn get_historical_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        let path = format!(
            "/candles/{}?timeframe={}&from={}&to={}",
            symbol.as_str(),
            timeframe.as_str(),
            from.to_rfc3339(),
            to.to_rfc3339()
        );
        debug!(path = %path, "fetching historical candles");
        self.get_json(&path).await
    }

    async fn get_option_chain(&self, underlying: &Symbol) -> Result<Vec<OptionContract>> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        let path = format!("/options/{}/chain", underlying.as_str());
        self.get_json(&path).await
    }

    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        self.rate_limiter.wait_for_order_capacity().await;
        self.rate_limiter.record_order_send();
        let mut req = self
            .http
            .post(format!("{}/orders", self.base_url))
            .json(&order);
        if let Some(token) = self.bearer() {
            req = req.bearer_auth(token);
        }
        let result = req.send().await.map_err(|e| BrokerError::Http(e.to_string()));
        self.rate_limiter.record_order_response();
        let response = result?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 422 {
                return Err(BrokerError::OrderRejected(body));
            }
            return Err(BrokerError::BrokerStatus {
                status: status.as_u16(),
                body,
            });
        }
        let raw: OrderResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::Parse(e.to_string()))?;
        if raw.status == BrokerOrderStatus::Rejected {
            warn!(order_id = %raw.broker_order_id, "order rejected by broker");
        }
        Ok(OrderAck {
            client_order_id: order.client_order_id,
            broker_order_id: raw.broker_order_id,
            status: raw.status,
            filled_quantity: Quantity::new(
                raw.filled_quantity
                    .parse()
                    .map_err(|e| BrokerError::Parse(format!("{e}")))?,
            ),
            average_fill_price: raw
                .average_fill_price
                .map(|p| p.parse().map(Price::new))
                .transpose()
                .map_err(|e: rust_decimal::Error| BrokerError::Parse(e.to_string()))?,
            acknowledged_at: Utc::now(),
        })
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<()> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        self.rate_limiter.wait_for_capacity().await;
        self.rate_limiter.record_send();
        let mut req = self
            .http
            .delete(format!("{}/orders/{}", self.base_url, broker_order_id));
        if let Some(token) = self.bearer() {
            req = req.bearer_auth(token);
        }
        let response = req.send().await.map_err(|e| BrokerError::Http(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::BrokerStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn get_order_status(&self, broker_order_id: &str) -> Result<OrderAck> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        let path = format!("/orders/{broker_order_id}");
        let raw: OrderResponse = self.get_json(&path).await?;
        Ok(OrderAck {
            client_order_id: uuid::Uuid::nil(),
            broker_order_id: raw.broker_order_id,
            status: raw.status,
            filled_quantity: Quantity::new(
                raw.filled_quantity
                    .parse()
                    .map_err(|e| BrokerError::Parse(format!("{e}")))?,
            ),
            average_fill_price: raw
                .average_fill_price
                .map(|p| p.parse().map(Price::new))
                .transpose()
                .map_err(|e: rust_decimal::Error| BrokerError::Parse(e.to_string()))?,
            acknowledged_at: Utc::now(),
        })
    }
}
