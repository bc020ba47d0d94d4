//! Shared ordered log abstraction.
//!
//! The log is the append-only, per-project store every client replicates
//! strokes through. It assigns each appended record an id and a strictly
//! increasing order, and pushes full ordered snapshots to subscribers.

mod memory;
mod remote;

pub use memory::MemoryLog;
pub use remote::{ConnectionState, RemoteLog};

use crate::stroke::{ProjectId, Stroke, StrokeRecord, StrokeSnapshot};
use futures::channel::mpsc::{TryRecvError, UnboundedReceiver};
use futures::stream::{FusedStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;

/// Shared log errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("Log unavailable: {0}")]
    Unavailable(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Log connection closed")]
    Closed,
}

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Boxed future returned by log operations; owns everything it needs.
pub type BoxFuture<T> = futures::future::BoxFuture<'static, T>;

/// An append-only, subscribable stroke log scoped by project.
pub trait SharedLog: Send + Sync {
    /// Durably append a record. Resolves to the committed stroke with its
    /// assigned id and order.
    fn append(&self, project: &ProjectId, record: StrokeRecord) -> BoxFuture<LogResult<Stroke>>;

    /// Subscribe to full ordered snapshots of a project, starting with the
    /// current one.
    fn subscribe(&self, project: &ProjectId) -> LogResult<Subscription>;
}

/// Checks every log implementation applies before accepting a record.
pub fn validate_record(record: &StrokeRecord) -> LogResult<()> {
    if record.author_id.trim().is_empty() {
        return Err(LogError::PermissionDenied("record has no author".to_string()));
    }
    if !(record.draft.thickness.is_finite() && record.draft.thickness > 0.0) {
        return Err(LogError::Protocol(format!(
            "invalid stroke thickness {}",
            record.draft.thickness
        )));
    }
    Ok(())
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// A live, cancellable stream of full project snapshots.
///
/// Cancelling is idempotent and stops all further deliveries, including any
/// snapshot already queued. Dropping the subscription cancels it.
pub struct Subscription {
    project: ProjectId,
    receiver: Option<UnboundedReceiver<StrokeSnapshot>>,
    on_cancel: Option<CancelFn>,
}

impl Subscription {
    /// Wrap a snapshot channel. `on_cancel` detaches the sender from the log.
    pub fn new(
        project: ProjectId,
        receiver: UnboundedReceiver<StrokeSnapshot>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            project,
            receiver: Some(receiver),
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// The project this subscription is scoped to.
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Next queued snapshot, without waiting.
    pub fn try_next(&mut self) -> Option<StrokeSnapshot> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.try_recv() {
                Ok(snapshot) => {
                    if snapshot.project() == &self.project {
                        return Some(snapshot);
                    }
                    log::warn!(
                        "Dropping snapshot for {} on subscription to {}",
                        snapshot.project(),
                        self.project
                    );
                }
                Err(TryRecvError::Closed) => {
                    log::info!("Subscription to {} ended by the log", self.project);
                    self.receiver = None;
                    return None;
                }
                Err(TryRecvError::Empty) => return None,
            }
        }
    }

    /// Drain the queue, keeping only the newest snapshot.
    pub fn latest(&mut self) -> Option<StrokeSnapshot> {
        let mut latest = None;
        while let Some(snapshot) = self.try_next() {
            latest = Some(snapshot);
        }
        latest
    }

    /// Whether snapshots can still arrive.
    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Stop all further deliveries. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
        }
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
            log::debug!("Unsubscribed from {}", self.project);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("project", &self.project)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Stream for Subscription {
    type Item = StrokeSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let this = &mut *self;
            let Some(receiver) = this.receiver.as_mut() else {
                return Poll::Ready(None);
            };
            match receiver.poll_next_unpin(cx) {
                Poll::Ready(Some(snapshot)) if snapshot.project() != &this.project => continue,
                Poll::Ready(None) => {
                    this.receiver = None;
                    return Poll::Ready(None);
                }
                other => return other,
            }
        }
    }
}

impl FusedStream for Subscription {
    fn is_terminated(&self) -> bool {
        self.receiver.is_none()
    }
}
