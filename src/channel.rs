//! Live update channel.
//!
//! A persistent websocket to the tracker server. On every (re)connect the
//! client subscribes to the active category's topic; incoming progress and
//! completion frames are forwarded to the event loop in receive order.
//! Category filtering happens on the loop, not here.
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::api::DEFAULT_CATEGORY;
use crate::app::AppEvent;

pub const EVENT_PROGRESS: &str = "update_progress";
pub const EVENT_COMPLETE: &str = "update_complete";
pub const EVENT_SUBSCRIBE: &str = "subscribe_category";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),

    #[error("Malformed channel frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ============================================================================
// Frames
// ============================================================================

/// Progress of a running update for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub category: String,
    pub current: u64,
    pub total: u64,
}

impl ProgressEvent {
    /// Fill percentage in `0..=100`. A zero total reads as 0%.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Progress(ProgressEvent),
    Complete { category: String },
}

impl ChannelEvent {
    pub fn category(&self) -> &str {
        match self {
            ChannelEvent::Progress(p) => &p.category,
            ChannelEvent::Complete { category } => category,
        }
    }
}

/// Connection state changes, reported for logging and the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateData {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    current: u64,
    #[serde(default)]
    total: u64,
}

#[derive(Serialize)]
struct OutgoingFrame<'a> {
    event: &'a str,
    data: SubscribeData<'a>,
}

#[derive(Serialize)]
struct SubscribeData<'a> {
    category: &'a str,
}

fn category_or_default(category: Option<String>) -> String {
    category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// Decode one text frame. Unknown event names yield `Ok(None)`.
pub fn parse_frame(text: &str) -> Result<Option<ChannelEvent>, ChannelError> {
    let frame: Frame = serde_json::from_str(text)?;
    let data = || -> Result<UpdateData, ChannelError> {
        if frame.data.is_null() {
            return Ok(UpdateData::default());
        }
        Ok(serde_json::from_value(frame.data.clone())?)
    };
    match frame.event.as_str() {
        EVENT_PROGRESS => {
            let d = data()?;
            Ok(Some(ChannelEvent::Progress(ProgressEvent {
                category: category_or_default(d.category),
                current: d.current,
                total: d.total,
            })))
        }
        EVENT_COMPLETE => {
            let d = data()?;
            Ok(Some(ChannelEvent::Complete {
                category: category_or_default(d.category),
            }))
        }
        _ => Ok(None),
    }
}

pub fn subscribe_frame(category: &str) -> String {
    let frame = OutgoingFrame {
        event: EVENT_SUBSCRIBE,
        data: SubscribeData { category },
    };
    // Serializing two borrowed strings cannot fail.
    serde_json::to_string(&frame).unwrap_or_default()
}

/// Derive the channel URL: `http` becomes `ws`, `https` becomes `wss`.
pub fn channel_url(server: &Url, path: &str) -> Result<Url, ChannelError> {
    let scheme = match server.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => server.scheme(),
        other => return Err(ChannelError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    };
    let mut url = server.clone();
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidUrl(server.to_string()))?;
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    url.set_path(&path);
    url.set_query(None);
    Ok(url)
}

// ============================================================================
// Client
// ============================================================================

/// Handle to the background connection task.
pub struct ChannelClient {
    category: watch::Sender<String>,
    handle: JoinHandle<()>,
}

impl ChannelClient {
    /// Start the connection task. It reconnects forever with a fixed delay
    /// and stops when the event receiver is dropped.
    pub fn spawn(
        url: Url,
        category: &str,
        reconnect_delay: Duration,
        events: mpsc::Sender<AppEvent>,
    ) -> Self {
        let (tx, rx) = watch::channel(category.to_string());
        let handle = tokio::spawn(connection_loop(url, rx, reconnect_delay, events));
        Self {
            category: tx,
            handle,
        }
    }

    /// Switch the subscribed topic. Takes effect immediately when connected.
    pub fn set_category(&self, category: &str) {
        self.category.send_if_modified(|current| {
            if current == category {
                false
            } else {
                *current = category.to_string();
                true
            }
        });
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum SessionEnd {
    Reconnect,
    Shutdown,
}

async fn connection_loop(
    url: Url,
    mut category: watch::Receiver<String>,
    reconnect_delay: Duration,
    events: mpsc::Sender<AppEvent>,
) {
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _response)) => {
                tracing::info!(url = %url, "Live channel connected");
                if events
                    .send(AppEvent::ChannelStatus(ChannelStatus::Connected))
                    .await
                    .is_err()
                {
                    return;
                }
                match run_session(ws, &mut category, &events).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Reconnect => {
                        if events
                            .send(AppEvent::ChannelStatus(ChannelStatus::Disconnected))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Live channel connection failed");
            }
        }
        tracing::debug!(delay_ms = reconnect_delay.as_millis() as u64, "Reconnecting live channel");
        tokio::time::sleep(reconnect_delay).await;
    }
}

async fn run_session<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    category: &mut watch::Receiver<String>,
    events: &mpsc::Sender<AppEvent>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();

    let initial = category.borrow_and_update().clone();
    if let Err(e) = write.send(WsMessage::Text(subscribe_frame(&initial).into())).await {
        tracing::warn!(error = %e, "Failed to send subscription");
        return SessionEnd::Reconnect;
    }
    tracing::debug!(category = %initial, "Subscribed to category topic");

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    match parse_frame(&text) {
                        Ok(Some(event)) => {
                            if events.send(AppEvent::Channel(event)).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Ok(None) => tracing::debug!(frame = %text.as_str(), "Ignoring unknown channel event"),
                        Err(e) => tracing::warn!(error = %e, "Ignoring malformed channel frame"),
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::info!(?frame, "Live channel closed by server");
                    return SessionEnd::Reconnect;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Live channel read failed");
                    return SessionEnd::Reconnect;
                }
                None => return SessionEnd::Reconnect,
            },
            changed = category.changed() => {
                if changed.is_err() {
                    return SessionEnd::Shutdown;
                }
                let name = category.borrow_and_update().clone();
                if let Err(e) = write.send(WsMessage::Text(subscribe_frame(&name).into())).await {
                    tracing::warn!(error = %e, "Failed to resubscribe");
                    return SessionEnd::Reconnect;
                }
                tracing::debug!(category = %name, "Resubscribed to category topic");
            }
        }
    }
}
