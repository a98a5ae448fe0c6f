//! Catalog REST client.
//!
//! Pulls events, markets, series and tags from the upstream catalog API
//! with cursor pagination, plus per-token REST book and price reads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::core::domain::{
    BookSnapshot, Event, EventId, Market, MarketId, Outcome, PriceLevel, Token, TokenId,
};
use crate::error::{Error, Result};

/// Cursor value the upstream returns when pagination is exhausted.
const END_CURSOR: &str = "LTE=";

/// One page of a cursor-paginated listing.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// The cursor to resume from, or `None` when the listing is exhausted.
    #[must_use]
    pub fn resume_cursor(&self) -> Option<String> {
        match self.next_cursor.as_deref() {
            None | Some("") | Some(END_CURSOR) => None,
            Some(c) => Some(c.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
    pub end_date: Option<String>,
    pub series_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<RawTag>,
}

impl RawEvent {
    #[must_use]
    pub fn into_domain(self) -> Event {
        let end_time = self
            .end_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Event {
            id: EventId::from(self.id),
            slug: self.slug,
            title: self.title,
            active: self.active,
            closed: self.closed,
            end_time,
            series_id: self.series_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMarket {
    pub id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub minimum_tick_size: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub neg_risk: bool,
    #[serde(default)]
    pub tokens: Vec<RawToken>,
    #[serde(default)]
    pub tags: Vec<RawTag>,
}

impl RawMarket {
    /// Convert to a domain market plus its outcome tokens. Markets without
    /// exactly one YES and one NO token are not binary and are skipped by
    /// the caller.
    #[must_use]
    pub fn into_domain(self, fallback_event: &EventId) -> (Market, Vec<Token>) {
        let market_id = MarketId::from(self.id.clone());
        let tokens = self
            .tokens
            .into_iter()
            .filter_map(|t| {
                let outcome = Outcome::parse(&t.outcome)?;
                Some(Token {
                    id: TokenId::from(t.token_id),
                    market_id: market_id.clone(),
                    outcome,
                })
            })
            .collect();
        let market = Market {
            id: market_id,
            event_id: self
                .event_id
                .map_or_else(|| fallback_event.clone(), EventId::from),
            slug: self.slug,
            question: self.question.unwrap_or_default(),
            condition_id: self.condition_id.unwrap_or(self.id),
            tick_size: self
                .minimum_tick_size
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| rust_decimal::Decimal::new(1, 2)),
            active: self.active,
            closed: self.closed,
            neg_risk: self.neg_risk,
        };
        (market, tokens)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawToken {
    pub token_id: String,
    pub outcome: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTag {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSeries {
    pub id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    price: String,
}

/// A single point of the prices-history series.
#[derive(Debug, Clone, Deserialize)]
pub struct PricePoint {
    pub t: i64,
    pub p: f64,
}

#[derive(Debug, Deserialize)]
struct RawPriceHistory {
    #[serde(default)]
    history: Vec<PricePoint>,
}

/// HTTP client for the upstream catalog and REST book endpoints.
pub struct CatalogClient {
    http: HttpClient,
    base_url: String,
    page_limit: usize,
}

impl CatalogClient {
    /// Create a client for the given base URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: String, timeout: Duration, page_limit: usize) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            http,
            base_url,
            page_limit,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(url = %url, "catalog GET");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// One page of events starting at `cursor`.
    pub async fn events_page(&self, cursor: Option<&str>) -> Result<Page<RawEvent>> {
        let mut path = format!("/events?limit={}", self.page_limit);
        if let Some(c) = cursor {
            path.push_str(&format!("&next_cursor={c}"));
        }
        self.get_json(&path).await
    }

    /// One page of markets starting at `cursor`.
    pub async fn markets_page(&self, cursor: Option<&str>) -> Result<Page<RawMarket>> {
        let mut path = format!("/markets?limit={}", self.page_limit);
        if let Some(c) = cursor {
            path.push_str(&format!("&next_cursor={c}"));
        }
        self.get_json(&path).await
    }

    /// One page of series starting at `cursor`.
    pub async fn series_page(&self, cursor: Option<&str>) -> Result<Page<RawSeries>> {
        let mut path = format!("/series?limit={}", self.page_limit);
        if let Some(c) = cursor {
            path.push_str(&format!("&next_cursor={c}"));
        }
        self.get_json(&path).await
    }

    /// One page of tags starting at `cursor`.
    pub async fn tags_page(&self, cursor: Option<&str>) -> Result<Page<RawTag>> {
        let mut path = format!("/tags?limit={}", self.page_limit);
        if let Some(c) = cursor {
            path.push_str(&format!("&next_cursor={c}"));
        }
        self.get_json(&path).await
    }

    /// A single market by id, optionally with its tags inlined.
    pub async fn market(&self, id: &MarketId, include_tag: bool) -> Result<RawMarket> {
        self.get_json(&format!("/markets/{id}?include_tag={include_tag}"))
            .await
    }

    /// REST book snapshot for a token.
    pub async fn book(&self, token_id: &TokenId) -> Result<BookSnapshot> {
        let raw: RawBook = self.get_json(&format!("/book?token_id={token_id}")).await?;
        let ts = raw
            .timestamp
            .as_deref()
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        let mut bids: Vec<PriceLevel> = raw
            .bids
            .iter()
            .filter_map(|l| Some(PriceLevel::new(l.price.parse().ok()?, l.size.parse().ok()?)))
            .collect();
        let mut asks: Vec<PriceLevel> = raw
            .asks
            .iter()
            .filter_map(|l| Some(PriceLevel::new(l.price.parse().ok()?, l.size.parse().ok()?)))
            .collect();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(BookSnapshot::new(token_id.clone(), ts, bids, asks))
    }

    /// Current quoted price for a token on one side of the book.
    pub async fn price(&self, token_id: &TokenId, side: &str) -> Result<rust_decimal::Decimal> {
        let raw: RawPrice = self
            .get_json(&format!("/price?token_id={token_id}&side={side}"))
            .await?;
        raw.price
            .parse()
            .map_err(|e| Error::Parse(format!("price {:?}: {e}", raw.price)))
    }

    /// Historic prices for a market over `[start_ts, end_ts]`.
    pub async fn prices_history(
        &self,
        market: &MarketId,
        interval: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<PricePoint>> {
        let raw: RawPriceHistory = self
            .get_json(&format!(
                "/prices-history?market={market}&interval={interval}&startTs={start_ts}&endTs={end_ts}"
            ))
            .await?;
        Ok(raw.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_resume_cursor_handles_end_markers() {
        let done: Page<RawTag> = Page {
            data: vec![],
            next_cursor: Some(END_CURSOR.into()),
        };
        assert_eq!(done.resume_cursor(), None);

        let more: Page<RawTag> = Page {
            data: vec![],
            next_cursor: Some("MTAw".into()),
        };
        assert_eq!(more.resume_cursor(), Some("MTAw".into()));

        let empty: Page<RawTag> = Page {
            data: vec![],
            next_cursor: None,
        };
        assert_eq!(empty.resume_cursor(), None);
    }

    #[test]
    fn raw_market_splits_tokens() {
        let raw = RawMarket {
            id: "m1".into(),
            event_id: Some("e1".into()),
            slug: "m1-slug".into(),
            question: Some("Will it?".into()),
            condition_id: Some("0xm1".into()),
            minimum_tick_size: Some("0.001".into()),
            active: true,
            closed: false,
            neg_risk: false,
            tokens: vec![
                RawToken {
                    token_id: "t-yes".into(),
                    outcome: "Yes".into(),
                },
                RawToken {
                    token_id: "t-no".into(),
                    outcome: "No".into(),
                },
            ],
            tags: vec![],
        };
        let (market, tokens) = raw.into_domain(&EventId::from("fallback"));
        assert_eq!(market.event_id.as_str(), "e1");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].outcome, Outcome::Yes);
        assert_eq!(tokens[1].outcome, Outcome::No);
    }

    #[test]
    fn raw_event_parses_end_date() {
        let raw = RawEvent {
            id: "e1".into(),
            slug: "e1".into(),
            title: "T".into(),
            active: true,
            closed: false,
            end_date: Some("2026-09-01T00:00:00+00:00".into()),
            series_id: None,
            tags: vec![],
        };
        let event = raw.into_domain();
        assert!(event.end_time.is_some());
    }
}
