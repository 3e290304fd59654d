/// Timeline replay server
///
/// Reads recorded operations from a JSON-lines file and broadcasts them, one
/// frame per operation, to every connected timeline client.
use barter_timeline::RawOperation;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const DEFAULT_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9002));
const DEFAULT_BUFFER_SIZE: usize = 10_000;

/// Replay settings read from the environment
#[derive(Debug, Clone, PartialEq)]
struct ReplayConfig {
    /// JSON-lines file of operations (`TIMELINE_REPLAY_FILE`)
    file: String,
    /// Listen address (`WS_ADDR`)
    addr: SocketAddr,
    /// Pause between frames (`REPLAY_INTERVAL_MS`)
    interval: Duration,
    /// Restart from the top after a `@CLEAR` frame (`REPLAY_LOOP`)
    looping: bool,
    /// Broadcast buffer (`WS_BUFFER_SIZE`)
    buffer_size: usize,
}

impl ReplayConfig {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = lookup("WS_ADDR")
            .and_then(|addr| addr.parse::<SocketAddr>().ok())
            .unwrap_or(DEFAULT_ADDR);

        Self {
            file: lookup("TIMELINE_REPLAY_FILE").unwrap_or_else(|| "operations.jsonl".to_string()),
            addr,
            interval: Duration::from_millis(
                lookup("REPLAY_INTERVAL_MS")
                    .and_then(|ms| ms.parse().ok())
                    .unwrap_or(500),
            ),
            looping: lookup("REPLAY_LOOP")
                .is_some_and(|flag| matches!(flag.trim(), "1" | "true" | "yes" | "on")),
            // broadcast::channel panics on zero capacity
            buffer_size: lookup("WS_BUFFER_SIZE")
                .and_then(|size| size.parse::<usize>().ok())
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_BUFFER_SIZE),
        }
    }
}

/// Parse JSON lines into operations, skipping blanks, `#` comments and garbage
fn load_operations(contents: &str) -> Vec<RawOperation> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .filter_map(|(number, line)| match serde_json::from_str::<RawOperation>(line) {
            Ok(operation) => Some(operation),
            Err(e) => {
                warn!("Skipping line {}: {}", number + 1, e);
                None
            }
        })
        .collect()
}

#[tokio::main]
async fn main() {
    init_logging();

    info!("Starting timeline replay server");

    let config = ReplayConfig::from_env();
    let contents = match std::fs::read_to_string(&config.file) {
        Ok(contents) => contents,
        Err(e) => {
            error!("Failed to read replay file {}: {}", config.file, e);
            return;
        }
    };
    let operations = load_operations(&contents);
    info!("Loaded {} operations from {}", operations.len(), config.file);

    info!("WebSocket broadcast buffer size: {}", config.buffer_size);
    let (tx, _rx) = broadcast::channel::<String>(config.buffer_size);
    let tx = Arc::new(tx);

    let listener = match TcpListener::bind(&config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind WebSocket server on {}: {}", config.addr, e);
            return;
        }
    };
    info!("WebSocket server listening on ws://{}", config.addr);

    let tx_clone = tx.clone();
    tokio::spawn(async move {
        start_websocket_server(listener, tx_clone).await;
    });

    replay(&config, &operations, &tx).await;
}

/// Broadcast every operation, optionally forever
async fn replay(config: &ReplayConfig, operations: &[RawOperation], tx: &broadcast::Sender<String>) {
    let frames: Vec<String> = operations
        .iter()
        .filter_map(|operation| serde_json::to_string(operation).ok())
        .collect();
    let clear = serde_json::to_string(&RawOperation::clear()).unwrap_or_default();

    let mut pass = 0u64;
    loop {
        // Hold the replay until someone is listening
        while tx.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        pass += 1;
        info!("Replay pass {} ({} frames)", pass, frames.len());
        for frame in &frames {
            if tx.send(frame.clone()).is_err() {
                debug!("No clients connected, frame dropped");
            }
            tokio::time::sleep(config.interval).await;
        }

        if !config.looping {
            info!("Replay finished, keeping connections open");
            std::future::pending::<()>().await;
        }

        let _ = tx.send(clear.clone());
        tokio::time::sleep(config.interval).await;
    }
}

/// Accept WebSocket clients and attach them to the broadcast
async fn start_websocket_server(listener: TcpListener, tx: Arc<broadcast::Sender<String>>) {
    while let Ok((stream, peer_addr)) = listener.accept().await {
        info!(%peer_addr, "client connected");
        let tx = tx.clone();
        tokio::spawn(handle_client(stream, peer_addr, tx));
    }
}

/// Frames sent before the broadcast: a welcome, then `@CLEAR`
///
/// Clients may have kept operations from an earlier connection; the clear
/// makes every client start from an empty timeline.
fn greeting_frames() -> Vec<String> {
    let welcome = serde_json::json!({
        "type": "welcome",
        "message": "Connected to timeline replay feed",
        "timestamp": Utc::now()
    });
    [welcome.to_string(), serde_json::to_string(&RawOperation::clear()).unwrap_or_default()]
        .into_iter()
        .filter(|frame| !frame.is_empty())
        .collect()
}

/// Serve one timeline client until either side hangs up
async fn handle_client(stream: TcpStream, peer_addr: SocketAddr, tx: Arc<broadcast::Sender<String>>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!(%peer_addr, %e, "handshake failed");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut rx = tx.subscribe();

    for frame in greeting_frames() {
        if ws_sender.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    let mut forwarded = 0u64;
    let mut lagged = 0u64;
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(frame) => {
                    if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                    forwarded += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%peer_addr, skipped, "client lagging behind the replay");
                    lagged += skipped;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = ws_receiver.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%peer_addr, %e, "client connection error");
                    break;
                }
            },
        }
    }

    info!(%peer_addr, forwarded, lagged, "client disconnected");
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
