//! Whiteboard controller: capture machine, sync client and committed state
//! for one drawing surface.

use crate::identity::Identity;
use crate::shared_log::Subscription;
use crate::stroke::{Draft, ProjectId, SerializableColor, Stroke, StrokeSnapshot};
use crate::sync::{PendingCommit, SyncClient, SyncResult};
use crate::theme::Theme;
use crate::tools::{CaptureMachine, ToolKind, ToolSettings};
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use kurbo::Point;

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct BoardView<'a> {
    /// Committed strokes in ascending order.
    pub committed: &'a [Stroke],
    /// The local in-progress draft, painted last.
    pub draft: Option<&'a Draft>,
    pub background: SerializableColor,
}

/// One user's view of a collaborative drawing.
///
/// Methods returning `bool` report whether the surface needs a redraw.
pub struct Whiteboard {
    capture: CaptureMachine,
    theme: Theme,
    sync: SyncClient,
    project: Option<ProjectId>,
    subscription: Option<Subscription>,
    /// Latest snapshot, replaced wholesale. `None` shows an empty board.
    committed: Option<StrokeSnapshot>,
    /// Bumped every time the committed sequence is replaced.
    revision: u64,
    commits: FuturesUnordered<PendingCommit>,
}

impl Whiteboard {
    pub fn new(sync: SyncClient, settings: ToolSettings, theme: Theme) -> Self {
        Self {
            capture: CaptureMachine::new(settings, theme.default_ink()),
            theme,
            sync,
            project: None,
            subscription: None,
            committed: None,
            revision: 0,
            commits: FuturesUnordered::new(),
        }
    }

    pub fn project(&self) -> Option<&ProjectId> {
        self.project.as_ref()
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn tool(&self) -> ToolKind {
        self.capture.tool()
    }

    pub fn color(&self) -> SerializableColor {
        self.capture.color()
    }

    pub fn capture(&self) -> &CaptureMachine {
        &self.capture
    }

    pub fn sync(&self) -> &SyncClient {
        &self.sync
    }

    /// Whether pointer-down would start a draft.
    pub fn can_draw(&self) -> bool {
        self.project.is_some() && self.sync.can_commit()
    }

    /// Committed revision counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Commits sent but not yet answered.
    pub fn in_flight(&self) -> usize {
        self.commits.len()
    }

    /// Switch the active project.
    ///
    /// The old subscription is cancelled before the new one is opened, and
    /// any draft in progress is discarded. The committed view starts empty
    /// until the first snapshot of the new project arrives.
    ///
    /// Re-selecting the current project resubscribes if the log ended the
    /// previous subscription.
    pub fn set_project(&mut self, project: Option<ProjectId>) -> SyncResult<()> {
        let live = self.subscription.as_ref().is_some_and(Subscription::is_active);
        if self.project == project && (project.is_none() || live) {
            return Ok(());
        }

        if self.capture.is_active() {
            log::debug!("Discarding draft on project switch");
            self.capture.cancel();
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.replace_committed(None);
        self.project = project;

        let Some(project) = self.project.as_ref() else {
            return Ok(());
        };
        log::info!("Switched to project {}", project);
        self.subscription = Some(self.sync.subscribe(project)?);
        Ok(())
    }

    /// Sign in or out. Signing out discards a draft in progress.
    ///
    /// Returns true if a draft was discarded.
    pub fn set_identity(&mut self, identity: Option<Identity>) -> bool {
        self.sync.set_identity(identity);
        if self.sync.can_commit() || !self.capture.is_active() {
            return false;
        }
        log::debug!("Discarding draft: signed out");
        self.capture.cancel();
        true
    }

    pub fn pointer_down(&mut self, point: Point) -> bool {
        if !self.can_draw() {
            log::debug!("Pointer down ignored: drawing disabled");
            return false;
        }
        self.capture.begin(point, self.theme.background())
    }

    pub fn pointer_move(&mut self, point: Point) -> bool {
        self.capture.update(point)
    }

    /// Finish the gesture and send the draft to the log.
    pub fn pointer_up(&mut self) -> bool {
        let Some(draft) = self.capture.end() else {
            return false;
        };
        self.commits.push(self.sync.commit(self.project.as_ref(), draft));
        true
    }

    /// Leaving the surface finishes the gesture like a pointer up.
    pub fn pointer_leave(&mut self) -> bool {
        self.pointer_up()
    }

    /// Select a tool. Any tool but the eraser resets the ink to the theme default.
    pub fn select_tool(&mut self, tool: ToolKind) -> bool {
        if !self.capture.set_tool(tool) {
            return false;
        }
        if tool != ToolKind::Eraser {
            self.capture.set_color(self.theme.default_ink());
        }
        true
    }

    /// Pick an ink color, switching back to the pencil.
    ///
    /// Ignored while the eraser is selected or a gesture is active.
    pub fn set_color(&mut self, color: SerializableColor) -> bool {
        if !self.capture.tool().uses_color() {
            log::debug!("Ignoring color change while the eraser is selected");
            return false;
        }
        if !self.capture.set_color(color) {
            return false;
        }
        self.capture.set_tool(ToolKind::Freehand);
        true
    }

    /// Change the background theme. Committed strokes are untouched.
    pub fn set_theme(&mut self, theme: Theme) -> bool {
        if self.theme == theme {
            return false;
        }
        self.theme = theme;
        true
    }

    /// Empty the local committed view. The shared log is not touched and the
    /// next snapshot brings everything back.
    pub fn clear_view(&mut self) -> bool {
        log::info!("Clearing local view");
        self.replace_committed(None);
        true
    }

    /// Drain finished commits and queued snapshots without blocking.
    ///
    /// Only the newest snapshot is kept. Returns true if the committed view
    /// changed.
    pub fn poll_updates(&mut self) -> bool {
        while let Some(Some(result)) = self.commits.next().now_or_never() {
            if let Ok(stroke) = result {
                log::debug!("Commit of {} acknowledged", stroke.id);
            }
        }

        let latest = self.subscription.as_mut().and_then(Subscription::latest);
        match latest {
            Some(snapshot) => {
                self.replace_committed(Some(snapshot));
                true
            }
            None => false,
        }
    }

    /// Committed strokes in ascending order.
    pub fn committed(&self) -> &[Stroke] {
        self.committed.as_ref().map(StrokeSnapshot::strokes).unwrap_or_default()
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.capture.draft()
    }

    pub fn render_state(&self) -> BoardView<'_> {
        BoardView {
            committed: self.committed(),
            draft: self.draft(),
            background: self.theme.background(),
        }
    }

    fn replace_committed(&mut self, snapshot: Option<StrokeSnapshot>) {
        self.committed = snapshot;
        self.revision += 1;
    }
}

impl std::fmt::Debug for Whiteboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Whiteboard")
            .field("project", &self.project)
            .field("theme", &self.theme)
            .field("capture", &self.capture)
            .field("committed", &self.committed().len())
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}
