//! Sync client: publishes finished drafts to the shared log and subscribes
//! to project snapshots.

use crate::identity::Identity;
use crate::shared_log::{BoxFuture, LogError, SharedLog, Subscription};
use crate::stroke::{Draft, ProjectId, Stroke};
use std::sync::Arc;
use thiserror::Error;

/// Sync errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("No identity available, refusing to write")]
    Unauthorized,
    #[error("No active project")]
    NoActiveProject,
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// An outstanding commit. Resolves once the log has accepted or refused it.
pub type PendingCommit = BoxFuture<SyncResult<Stroke>>;

/// Client side of the shared log for one user.
pub struct SyncClient {
    log: Arc<dyn SharedLog>,
    identity: Option<Identity>,
}

impl SyncClient {
    pub fn new(log: Arc<dyn SharedLog>, identity: Option<Identity>) -> Self {
        Self { log, identity }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    /// Whether commits would be attempted at all.
    pub fn can_commit(&self) -> bool {
        self.identity.as_ref().is_some_and(Identity::is_usable)
    }

    /// Append a finished draft to `project`'s log.
    ///
    /// Failures are logged here and never retried; the draft is gone either way.
    pub fn commit(&self, project: Option<&ProjectId>, draft: Draft) -> PendingCommit {
        let Some(identity) = self.identity.as_ref().filter(|identity| identity.is_usable()) else {
            log::warn!("Dropping {} stroke: no identity", draft.shape.type_name());
            return Box::pin(async { Err(SyncError::Unauthorized) });
        };
        let Some(project) = project else {
            log::warn!("Dropping {} stroke: no active project", draft.shape.type_name());
            return Box::pin(async { Err(SyncError::NoActiveProject) });
        };

        let kind = draft.shape.type_name();
        let project = project.clone();
        let append = self.log.append(&project, draft.into_record(identity));
        Box::pin(async move {
            match append.await {
                Ok(stroke) => {
                    log::debug!("Committed {} stroke {} at order {} in {}", kind, stroke.id, stroke.order, project);
                    Ok(stroke)
                }
                Err(e) => {
                    log::error!("Failed to commit {} stroke to {}: {}", kind, project, e);
                    Err(e.into())
                }
            }
        })
    }

    /// Subscribe to full snapshots of `project`.
    pub fn subscribe(&self, project: &ProjectId) -> SyncResult<Subscription> {
        self.log.subscribe(project).map_err(|e| {
            log::error!("Failed to subscribe to {}: {}", project, e);
            SyncError::from(e)
        })
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
