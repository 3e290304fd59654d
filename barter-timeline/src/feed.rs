/// WebSocket subscription to a trader's operation feed
///
/// Provides automatic reconnection, heartbeat, and frame parsing. One text
/// frame carries one [`RawOperation`]; validation is left to the timeline.
use crate::error::TimelineError;
use crate::types::RawOperation;
use futures::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, error, info, warn};

pub const DEFAULT_FEED_URL: &str = "ws://127.0.0.1:9002";

/// Feed client configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket server URL
    pub url: String,
    /// Ping interval to keep connection alive
    pub ping_interval: Duration,
    /// Reconnection delay after disconnect
    pub reconnect_delay: Duration,
    /// Maximum channel buffer size for operations
    pub channel_buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            ping_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            channel_buffer_size: 1000,
        }
    }
}

impl FeedConfig {
    /// Create a new configuration with custom URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Default configuration, URL taken from `TIMELINE_WS_URL` if set
    pub fn from_env() -> Self {
        match std::env::var("TIMELINE_WS_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }
}

/// Connection status updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Decoded text frame
#[derive(Debug, Clone)]
pub enum Frame {
    Welcome,
    Operation(RawOperation),
    Invalid,
}

impl Frame {
    pub fn parse(text: &str) -> Self {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
            if value.get("type").and_then(|v| v.as_str()) == Some("welcome") {
                return Frame::Welcome;
            }
        }

        match serde_json::from_str::<RawOperation>(text) {
            Ok(operation) => Frame::Operation(operation),
            Err(e) => {
                warn!(%e, frame = text, "operation frame dropped");
                Frame::Invalid
            }
        }
    }
}

/// Subscription handle
///
/// Dropping the returned receivers does not stop the background task on its
/// own until the next frame arrives; call [`TimelineFeed::unsubscribe`].
#[derive(Debug)]
pub struct TimelineFeed {
    config: FeedConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TimelineFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Start the subscription
    ///
    /// Returns a receiver for operations and a receiver for connection status
    /// updates. Starting again replaces the previous subscription.
    pub fn start(&self) -> (mpsc::Receiver<RawOperation>, mpsc::Receiver<FeedStatus>) {
        let (operation_tx, operation_rx) = mpsc::channel(self.config.channel_buffer_size);
        let (status_tx, status_rx) = mpsc::channel(10);

        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            run_feed_loop(config, operation_tx, status_tx).await;
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }

        (operation_rx, status_rx)
    }

    pub fn is_subscribed(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the subscription; calling it again is a no-op
    pub fn unsubscribe(&self) {
        if let Some(handle) = self.task.lock().take() {
            info!("Unsubscribing from {}", self.config.url);
            handle.abort();
        }
    }
}

impl Drop for TimelineFeed {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Why a connection stopped delivering frames
#[derive(Debug, PartialEq)]
enum StreamEnd {
    ServerClosed,
    ReceiverDropped,
    Failed(TimelineError),
}

/// Per-connection frame counters, logged on disconnect
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FrameStats {
    operations: u64,
    clears: u64,
    dropped: u64,
}

/// Forward operation frames from one connection until it ends
async fn forward_frames<S>(
    read: &mut S,
    operation_tx: &mpsc::Sender<RawOperation>,
    stats: &mut FrameStats,
) -> StreamEnd
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = read.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return StreamEnd::ServerClosed,
            Ok(_) => continue,
            Err(e) => return StreamEnd::Failed(TimelineError::from(e)),
        };

        let operation = match Frame::parse(&text) {
            Frame::Operation(operation) => operation,
            Frame::Welcome => continue,
            Frame::Invalid => {
                stats.dropped += 1;
                continue;
            }
        };

        if operation.is_clear() {
            stats.clears += 1;
        } else {
            stats.operations += 1;
        }
        if operation_tx.send(operation).await.is_err() {
            return StreamEnd::ReceiverDropped;
        }
    }
    StreamEnd::ServerClosed
}

/// Reconnecting subscription loop
async fn run_feed_loop(
    config: FeedConfig,
    operation_tx: mpsc::Sender<RawOperation>,
    status_tx: mpsc::Sender<FeedStatus>,
) {
    info!(url = %config.url, "timeline feed starting");

    loop {
        let _ = status_tx.send(FeedStatus::Reconnecting).await;

        let (ws_stream, _) = match connect_async(&config.url).await {
            Ok(connected) => connected,
            Err(e) => {
                let error = TimelineError::from(e);
                warn!(url = %config.url, %error, "timeline feed unreachable");
                let _ = status_tx.send(FeedStatus::Disconnected).await;
                tokio::time::sleep(config.reconnect_delay).await;
                continue;
            }
        };

        info!(url = %config.url, "timeline feed connected");
        let _ = status_tx.send(FeedStatus::Connected).await;

        let (mut write, mut read) = ws_stream.split();
        let (heartbeat_stop_tx, mut heartbeat_stop_rx) = mpsc::channel::<()>(1);
        let ping_interval = config.ping_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    _ = heartbeat_stop_rx.recv() => break,
                }
            }
        });

        let mut stats = FrameStats::default();
        let end = forward_frames(&mut read, &operation_tx, &mut stats).await;

        let _ = heartbeat_stop_tx.send(()).await;
        let _ = status_tx.send(FeedStatus::Disconnected).await;

        match end {
            StreamEnd::ReceiverDropped => {
                info!(?stats, "timeline consumer gone, feed stopped");
                return;
            }
            StreamEnd::ServerClosed => info!(?stats, "timeline feed closed by server"),
            StreamEnd::Failed(error) => error!(?stats, %error, "timeline feed failed"),
        }

        debug!(delay = ?config.reconnect_delay, "timeline feed reconnecting");
        tokio::time::sleep(config.reconnect_delay).await;
    }
}
