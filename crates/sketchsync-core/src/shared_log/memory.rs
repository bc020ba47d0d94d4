//! In-process shared log.

use super::{BoxFuture, LogError, LogResult, SharedLog, Subscription, validate_record};
use crate::stroke::{ProjectId, Stroke, StrokeRecord, StrokeSnapshot};
use futures::channel::mpsc::{UnboundedSender, unbounded};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use uuid::Uuid;

#[derive(Default)]
struct ProjectLog {
    strokes: Vec<Stroke>,
    /// Last order handed out; purges never reset it.
    last_order: u64,
    subscribers: Vec<(u64, UnboundedSender<StrokeSnapshot>)>,
}

impl ProjectLog {
    fn snapshot(&self, project: &ProjectId) -> StrokeSnapshot {
        StrokeSnapshot::new(project.clone(), self.strokes.clone())
    }

    /// Push the current snapshot to every live subscriber, forgetting closed ones.
    fn publish(&mut self, project: &ProjectId) {
        let snapshot = self.snapshot(project);
        self.subscribers
            .retain(|(_, tx)| tx.unbounded_send(snapshot.clone()).is_ok());
    }
}

#[derive(Default)]
struct Inner {
    projects: HashMap<ProjectId, ProjectLog>,
    next_subscriber: u64,
}

/// Shared log kept in memory, for tests and single-process sessions.
///
/// Clones share the same log.
#[derive(Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(inner: &Mutex<Inner>) -> LogResult<MutexGuard<'_, Inner>> {
        inner
            .lock()
            .map_err(|e| LogError::Unavailable(format!("Lock error: {}", e)))
    }

    /// Append synchronously; the async `append` wraps this.
    fn append_now(inner: &Mutex<Inner>, project: &ProjectId, record: StrokeRecord) -> LogResult<Stroke> {
        validate_record(&record)?;
        let mut guard = Self::lock(inner)?;
        let entry = guard.projects.entry(project.clone()).or_default();
        entry.last_order += 1;
        let stroke = Stroke::new(Uuid::new_v4(), entry.last_order, record);
        entry.strokes.push(stroke.clone());
        entry.publish(project);
        Ok(stroke)
    }

    /// Current committed strokes of a project.
    pub fn snapshot(&self, project: &ProjectId) -> LogResult<StrokeSnapshot> {
        let guard = Self::lock(&self.inner)?;
        Ok(guard
            .projects
            .get(project)
            .map(|entry| entry.snapshot(project))
            .unwrap_or_else(|| StrokeSnapshot::empty(project.clone())))
    }

    /// Number of live subscriptions on a project.
    pub fn subscriber_count(&self, project: &ProjectId) -> usize {
        Self::lock(&self.inner)
            .map(|guard| guard.projects.get(project).map_or(0, |entry| entry.subscribers.len()))
            .unwrap_or(0)
    }

    /// Permanently delete every stroke of a project and notify subscribers.
    ///
    /// This is destructive and not part of the drawing protocol. Orders keep
    /// increasing afterwards. Returns the number of strokes removed.
    pub fn purge(&self, project: &ProjectId) -> LogResult<usize> {
        let mut guard = Self::lock(&self.inner)?;
        let Some(entry) = guard.projects.get_mut(project) else {
            return Ok(0);
        };
        let removed = entry.strokes.len();
        entry.strokes.clear();
        entry.publish(project);
        log::warn!("Purged {} strokes from {}", removed, project);
        Ok(removed)
    }

    fn unsubscribe(inner: &Weak<Mutex<Inner>>, project: &ProjectId, id: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if let Ok(mut guard) = inner.lock() {
            if let Some(entry) = guard.projects.get_mut(project) {
                entry.subscribers.retain(|(sub_id, _)| *sub_id != id);
            }
        }
    }
}

impl SharedLog for MemoryLog {
    fn append(&self, project: &ProjectId, record: StrokeRecord) -> BoxFuture<LogResult<Stroke>> {
        let inner = Arc::clone(&self.inner);
        let project = project.clone();
        Box::pin(async move { Self::append_now(&inner, &project, record) })
    }

    fn subscribe(&self, project: &ProjectId) -> LogResult<Subscription> {
        let mut guard = Self::lock(&self.inner)?;
        let id = guard.next_subscriber;
        guard.next_subscriber += 1;

        let (tx, rx) = unbounded();
        let entry = guard.projects.entry(project.clone()).or_default();
        // Every subscription starts with the current state.
        tx.unbounded_send(entry.snapshot(project))
            .map_err(|_| LogError::Closed)?;
        entry.subscribers.push((id, tx));
        drop(guard);

        let weak = Arc::downgrade(&self.inner);
        let scope = project.clone();
        Ok(Subscription::new(project.clone(), rx, move || {
            Self::unsubscribe(&weak, &scope, id);
        }))
    }
}
