//! Line-delimited JSON protocol for reading and writing the store over TCP.
//!
//! Each request is one JSON object per line, tagged by `op`. Each response
//! is one JSON object per line, tagged by `status`. A `subscribe` request
//! turns the connection into a stream of [`StoreEvent`] lines, one per
//! published `system` tree.

use crate::store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreRequest {
    Get { path: String },
    Set { path: String, value: Value },
    Update { path: String, fields: Map<String, Value> },
    Subscribe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreResponse {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    Subscribed,
    Error {
        message: String,
    },
}

impl StoreResponse {
    pub fn ok() -> Self {
        StoreResponse::Ok { value: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StoreResponse::Error {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, StoreResponse::Error { .. })
    }
}

/// Pushed to subscribers after every publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message exceeds {} bytes", MAX_REQUEST_SIZE)]
    MessageTooLarge,
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn parse_request(line: &str) -> Result<StoreRequest, ProtocolError> {
    if line.len() > MAX_REQUEST_SIZE {
        return Err(ProtocolError::MessageTooLarge);
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// Serialize one message as a newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Apply a non-streaming request to the store. `subscribe` is acknowledged
/// here; the caller is responsible for the event stream.
pub fn handle_request<S: Store>(store: &mut S, request: StoreRequest) -> StoreResponse {
    let result = match request {
        StoreRequest::Get { path } => store.get(&path).map(|value| StoreResponse::Ok { value }),
        StoreRequest::Set { path, value } => store.set(&path, value).map(|()| StoreResponse::ok()),
        StoreRequest::Update { path, fields } => store.update(&path, fields).map(|()| StoreResponse::ok()),
        StoreRequest::Subscribe => Ok(StoreResponse::Subscribed),
    };
    result.unwrap_or_else(|e| StoreResponse::error(e.to_string()))
}
