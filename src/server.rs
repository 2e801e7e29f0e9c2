//! TCP front end for the shared store.

use crate::protocol::{encode_line, handle_request, parse_request, ProtocolError, StoreEvent, StoreRequest, StoreResponse};
use crate::store::SharedStore;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const EVENT_BROADCAST_BUFFER_SIZE: usize = 256;

/// Accept clients forever, serving each on its own task.
pub async fn run_server(
    listener: TcpListener,
    store: SharedStore,
    events: broadcast::Sender<StoreEvent>,
) -> Result<(), ProtocolError> {
    info!("🌐 Store server listening on {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_store = store.clone();
                let client_events = events.subscribe();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_store, client_events).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

pub async fn handle_client(
    stream: TcpStream,
    mut store: SharedStore,
    events: broadcast::Receiver<StoreEvent>,
) -> Result<(), ProtocolError> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));
    let mut event_task = None;

    let mut line = String::new();
    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match parse_request(trimmed) {
            Ok(StoreRequest::Subscribe) => {
                // Subscribe before acknowledging, start streaming after.
                let receiver = event_task.is_none().then(|| events.resubscribe());
                write_line(&writer, &StoreResponse::Subscribed).await?;
                if let Some(receiver) = receiver {
                    event_task = Some(spawn_event_stream(Arc::clone(&writer), receiver));
                }
                continue;
            }
            Ok(request) => {
                debug!("📨 Received request: {:?}", request);
                handle_request(&mut store, request)
            }
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                StoreResponse::error(e.to_string())
            }
        };

        write_line(&writer, &response).await?;
    }

    if let Some(task) = event_task {
        task.abort();
    }
    Ok(())
}

async fn write_line(writer: &Mutex<OwnedWriteHalf>, response: &StoreResponse) -> Result<(), ProtocolError> {
    let encoded = encode_line(response)?;
    let mut guard = writer.lock().await;
    guard.write_all(encoded.as_bytes()).await?;
    Ok(())
}

fn spawn_event_stream(
    writer: Arc<Mutex<OwnedWriteHalf>>,
    mut receiver: broadcast::Receiver<StoreEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, {} events skipped", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Ok(line) = encode_line(&event) else { continue };
            let mut guard = writer.lock().await;
            if let Err(e) = guard.write_all(line.as_bytes()).await {
                warn!("Failed to push event: {}", e);
                break;
            }
        }
    })
}
