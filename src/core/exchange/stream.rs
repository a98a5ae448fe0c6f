//! Live order-book WebSocket stream.
//!
//! Maintains a single connection with:
//! - heartbeat pings on a fixed interval, with reconnect on ping failure;
//! - periodic subscription refresh against an asset-id provider, sending
//!   one subscribe and one unsubscribe message for the set difference;
//! - exponential backoff with jitter on reconnect, reset after the first
//!   successful subscribe.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, tungstenite::Message};
use tracing::{debug, info, warn};

use super::messages::{
    PongMessage, SubscribeMessage, UpdateSubscriptionMessage, WsMessage,
};
use crate::core::domain::{BookSnapshot, LastTrade, TokenId};
use crate::core::shutdown::ShutdownToken;
use crate::error::{Error, Result};

/// Messages the read buffer must accommodate (full book snapshots).
const MAX_MESSAGE_BYTES: usize = 4 << 20;

/// Supplies the set of asset ids the stream should be subscribed to.
#[async_trait]
pub trait AssetProvider: Send + Sync {
    async fn asset_ids(&self) -> Result<Vec<TokenId>>;
}

/// Events surfaced to the market-data ingest task.
#[derive(Debug)]
pub enum StreamEvent {
    Book(BookSnapshot),
    LastTrade(LastTrade),
}

/// Stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub heartbeat_interval: Duration,
    pub refresh_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            heartbeat_interval: Duration::from_secs(20),
            refresh_interval: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// The order-book stream task.
pub struct BookStream<P: AssetProvider> {
    config: StreamConfig,
    provider: P,
    subscribed: HashSet<String>,
    consecutive_failures: u32,
}

impl<P: AssetProvider> BookStream<P> {
    #[must_use]
    pub fn new(config: StreamConfig, provider: P) -> Self {
        Self {
            config,
            provider,
            subscribed: HashSet::new(),
            consecutive_failures: 0,
        }
    }

    /// Run until shutdown. Connection errors reconnect with backoff and
    /// never propagate; only cancellation ends the loop.
    pub async fn run(
        mut self,
        events: mpsc::Sender<StreamEvent>,
        shutdown: ShutdownToken,
    ) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            // The outer select keeps the connect/subscribe phase
            // cancellable; the read loop selects on its own.
            let outcome = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                outcome = self.run_connection(&events, &shutdown) => outcome,
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_cancelled() => return Ok(()),
                Err(e) => {
                    self.consecutive_failures += 1;
                    let delay = self.backoff_delay();
                    warn!(
                        error = %e,
                        attempt = self.consecutive_failures,
                        delay_ms = delay.as_millis(),
                        "stream disconnected, reconnecting after delay"
                    );
                    tokio::select! {
                        () = sleep(delay) => {}
                        () = shutdown.cancelled() => return Ok(()),
                    }
                }
            }
        }
    }

    /// `min(base · 2^n, max) + jitter(0..base/2)`.
    fn backoff_delay(&self) -> Duration {
        let base = self.config.backoff_base;
        let exp = self.consecutive_failures.saturating_sub(1).min(16);
        let scaled = base.saturating_mul(2u32.saturating_pow(exp));
        let capped = scaled.min(self.config.backoff_max);
        let jitter_cap = (base.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        capped + Duration::from_millis(jitter)
    }

    async fn run_connection(
        &mut self,
        events: &mpsc::Sender<StreamEvent>,
        shutdown: &ShutdownToken,
    ) -> Result<()> {
        let ws_config = WebSocketConfig {
            max_message_size: Some(MAX_MESSAGE_BYTES),
            max_frame_size: Some(MAX_MESSAGE_BYTES),
            ..Default::default()
        };
        info!(url = %self.config.url, "connecting to market stream");
        let (mut ws, response) =
            connect_async_with_config(&self.config.url, Some(ws_config), false).await?;
        info!(status = %response.status(), "market stream connected");

        // Initial subscription from the provider.
        let initial: Vec<TokenId> = self.provider.asset_ids().await?;
        let asset_ids: Vec<String> = initial.iter().map(ToString::to_string).collect();
        let msg = SubscribeMessage::new(asset_ids.clone());
        ws.send(Message::Text(serde_json::to_string(&msg)?)).await?;
        self.subscribed = asset_ids.into_iter().collect();
        info!(assets = self.subscribed.len(), "subscribed");

        // A successful subscribe resets the backoff schedule.
        self.consecutive_failures = 0;

        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await; // first tick fires immediately
        let mut refresh = interval(self.config.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        refresh.tick().await;

        let mut first_message = true;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    let _ = ws.close(None).await;
                    return Err(Error::Cancelled);
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = ws.send(Message::Text("ping".into())).await {
                        warn!(error = %e, "heartbeat failed");
                        return Err(e.into());
                    }
                }
                _ = refresh.tick() => {
                    if let Err(e) = self.refresh_subscriptions(&mut ws).await {
                        warn!(error = %e, "subscription refresh failed");
                        return Err(e);
                    }
                }
                frame = ws.next() => {
                    let Some(frame) = frame else {
                        return Err(Error::Connection("stream ended".into()));
                    };
                    match frame? {
                        Message::Text(text) => {
                            if first_message {
                                info!("first message on new connection");
                                first_message = false;
                            }
                            self.handle_text(&text, &mut ws, events).await?;
                        }
                        Message::Ping(data) => {
                            ws.send(Message::Pong(data)).await?;
                        }
                        Message::Close(frame) => {
                            info!(frame = ?frame, "stream closed by server");
                            return Err(Error::Connection("server close".into()));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_text<S>(
        &mut self,
        text: &str,
        ws: &mut S,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<()>
    where
        S: SinkExt<Message> + Unpin,
        Error: From<<S as futures_util::Sink<Message>>::Error>,
    {
        // Some venues send a bare "ping" outside any JSON envelope.
        if text == "ping" {
            ws.send(Message::Text(serde_json::to_string(&PongMessage::default())?))
                .await?;
            return Ok(());
        }

        let parsed: WsMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, raw = %text, "unparseable stream message");
                return Ok(());
            }
        };

        match parsed {
            WsMessage::Ping => {
                ws.send(Message::Text(serde_json::to_string(&PongMessage::default())?))
                    .await?;
            }
            WsMessage::Book(book) => {
                let snapshot = book.to_snapshot(Utc::now());
                if events.try_send(StreamEvent::Book(snapshot)).is_err() {
                    debug!("ingest queue full, dropping book snapshot");
                }
            }
            WsMessage::LastTradePrice(trade) => {
                if let Some(price) = trade.price.as_deref().and_then(|p| p.parse().ok()) {
                    let ts = trade
                        .timestamp
                        .as_deref()
                        .and_then(|t| t.parse::<i64>().ok())
                        .and_then(chrono::DateTime::from_timestamp_millis)
                        .unwrap_or_else(Utc::now);
                    let event = StreamEvent::LastTrade(LastTrade {
                        token_id: TokenId::from(trade.asset_id),
                        price,
                        trade_ts: ts,
                    });
                    if events.try_send(event).is_err() {
                        debug!("ingest queue full, dropping last trade");
                    }
                }
            }
            WsMessage::PriceChange(_) | WsMessage::TickSizeChange(_) | WsMessage::Unknown => {}
        }
        Ok(())
    }

    async fn refresh_subscriptions<S>(&mut self, ws: &mut S) -> Result<()>
    where
        S: SinkExt<Message> + Unpin,
        Error: From<<S as futures_util::Sink<Message>>::Error>,
    {
        let wanted: HashSet<String> = self
            .provider
            .asset_ids()
            .await?
            .iter()
            .map(ToString::to_string)
            .collect();

        let added: Vec<String> = wanted.difference(&self.subscribed).cloned().collect();
        let removed: Vec<String> = self.subscribed.difference(&wanted).cloned().collect();
        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }

        // Send both updates before mutating the tracked set, so a send
        // failure leaves the set reflecting the server's view.
        if !added.is_empty() {
            let msg = UpdateSubscriptionMessage::subscribe(added.clone());
            ws.send(Message::Text(serde_json::to_string(&msg)?)).await?;
        }
        if !removed.is_empty() {
            let msg = UpdateSubscriptionMessage::unsubscribe(removed.clone());
            ws.send(Message::Text(serde_json::to_string(&msg)?)).await?;
        }

        info!(
            added = added.len(),
            removed = removed.len(),
            total = wanted.len(),
            "subscription set refreshed"
        );
        self.subscribed = wanted;
        Ok(())
    }

    #[cfg(test)]
    fn subscribed_set(&self) -> &HashSet<String> {
        &self.subscribed
    }
}
