//! Wire protocol between log clients and the log service.
//!
//! Messages are JSON text frames, internally tagged by `"type"`.

use crate::shared_log::LogError;
use crate::stroke::{ProjectId, Stroke, StrokeRecord};
use serde::{Deserialize, Serialize};

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving snapshots of a project under a client-chosen id
    Subscribe { subscription: u64, project: ProjectId },
    /// Stop a subscription
    Unsubscribe { subscription: u64 },
    /// Append a record to a project's log
    Append {
        request_id: u64,
        project: ProjectId,
        record: StrokeRecord,
    },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full ordered stroke list of a subscribed project
    Snapshot {
        subscription: u64,
        project: ProjectId,
        strokes: Vec<Stroke>,
    },
    /// An append was committed
    Appended { request_id: u64, stroke: Stroke },
    /// A request failed; `request_id` is absent for connection-level errors
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        code: ErrorCode,
        message: String,
    },
}

/// Machine-readable failure category carried by `ServerMessage::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    PermissionDenied,
    InvalidRecord,
    BadRequest,
    Unavailable,
}

impl ErrorCode {
    /// Rebuild the client-side error for a failed request.
    pub fn into_log_error(self, message: String) -> LogError {
        match self {
            ErrorCode::PermissionDenied => LogError::PermissionDenied(message),
            ErrorCode::InvalidRecord | ErrorCode::BadRequest => LogError::Protocol(message),
            ErrorCode::Unavailable => LogError::Unavailable(message),
        }
    }
}

impl From<&LogError> for ErrorCode {
    fn from(error: &LogError) -> Self {
        match error {
            LogError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            LogError::Protocol(_) => ErrorCode::InvalidRecord,
            LogError::Unavailable(_) | LogError::Closed => ErrorCode::Unavailable,
        }
    }
}

impl ServerMessage {
    /// Error reply for a failed request.
    pub fn error(request_id: Option<u64>, error: &LogError) -> Self {
        ServerMessage::Error {
            request_id,
            code: error.into(),
            message: error.to_string(),
        }
    }
}
