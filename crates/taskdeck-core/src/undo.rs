use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

use crate::repository::TaskRepository;
use crate::store::KeyValueStore;
use crate::task::Task;
use crate::timers::{TimerEvent, TimerQueue, TimerToken};

pub const DEFAULT_DELETE_GRACE_MS: i64 = 260;
pub const DEFAULT_TOAST_MS: i64 = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionState {
    Idle,
    PendingRemoval { task_id: String },
}

#[derive(Debug, Clone)]
struct PendingDeletion {
    task_id: String,
    token: TimerToken,
}

/// The undo affordance shown after a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub task_id: String,
    pub title: String,
    token: TimerToken,
}

/// Single-slot deferred deletion. A new delete request supersedes the
/// pending one: its removal timer is cancelled and its backup replaced, so
/// the superseded task stays in the collection.
#[derive(Debug, Clone)]
pub struct UndoController {
    grace: Duration,
    toast_duration: Duration,
    pending: Option<PendingDeletion>,
    backup: Option<Task>,
    toast: Option<Toast>,
}

impl Default for UndoController {
    fn default() -> Self {
        Self::new(
            Duration::milliseconds(DEFAULT_DELETE_GRACE_MS),
            Duration::milliseconds(DEFAULT_TOAST_MS),
        )
    }
}

impl UndoController {
    pub fn new(grace: Duration, toast_duration: Duration) -> Self {
        Self {
            grace,
            toast_duration,
            pending: None,
            backup: None,
            toast: None,
        }
    }

    pub fn state(&self) -> DeletionState {
        match &self.pending {
            Some(pending) => DeletionState::PendingRemoval {
                task_id: pending.task_id.clone(),
            },
            None => DeletionState::Idle,
        }
    }

    /// Id of the task playing its exit transition, if any.
    pub fn exiting_id(&self) -> Option<&str> {
        self.pending.as_ref().map(|pending| pending.task_id.as_str())
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref()
    }

    pub fn backup(&self) -> Option<&Task> {
        self.backup.as_ref()
    }

    /// Captures the task and schedules its removal. Unknown ids are ignored.
    #[instrument(skip(self, repo, timers, now))]
    pub fn request_delete<S: KeyValueStore>(
        &mut self,
        repo: &TaskRepository<S>,
        timers: &mut TimerQueue<TimerEvent>,
        id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(task) = repo.get(id).cloned() else {
            debug!("delete of unknown task ignored");
            return false;
        };

        if let Some(previous) = self.pending.take() {
            timers.cancel(previous.token);
            debug!(superseded = %previous.task_id, "pending removal superseded");
        }

        self.show_toast(timers, &task, now);
        self.backup = Some(task);

        let token = timers.schedule(
            now,
            self.grace,
            TimerEvent::RemoveTask { id: id.to_string() },
        );
        self.pending = Some(PendingDeletion {
            task_id: id.to_string(),
            token,
        });
        debug!(%token, "removal pending");
        true
    }

    /// Cancels a pending removal and puts the latest captured task back
    /// unless it is still present. Returns whether there was anything to
    /// undo.
    #[instrument(skip(self, repo, timers))]
    pub fn undo<S: KeyValueStore>(
        &mut self,
        repo: &mut TaskRepository<S>,
        timers: &mut TimerQueue<TimerEvent>,
    ) -> bool {
        let cancelled = match self.pending.take() {
            Some(pending) => {
                timers.cancel(pending.token);
                debug!(task_id = %pending.task_id, "pending removal cancelled");
                true
            }
            None => false,
        };

        let (captured, restored) = match self.backup.take() {
            Some(task) => (true, repo.restore(task)),
            None => (false, false),
        };

        self.dismiss_toast(timers);
        debug!(cancelled, restored, "undo applied");
        cancelled || captured
    }

    /// Handles a fired removal timer. Tokens that no longer match the
    /// pending slot are ignored.
    #[instrument(skip(self, repo))]
    pub fn on_removal_due<S: KeyValueStore>(
        &mut self,
        repo: &mut TaskRepository<S>,
        token: TimerToken,
        id: &str,
    ) {
        match &self.pending {
            Some(pending) if pending.token == token && pending.task_id == id => {
                self.pending = None;
                repo.remove(id);
                debug!("grace period elapsed; task removed");
            }
            _ => debug!("stale removal timer ignored"),
        }
    }

    pub fn on_toast_due(&mut self, token: TimerToken) {
        if self.toast.as_ref().is_some_and(|toast| toast.token == token) {
            self.toast = None;
            debug!(%token, "undo toast expired");
        }
    }

    fn show_toast(&mut self, timers: &mut TimerQueue<TimerEvent>, task: &Task, now: DateTime<Utc>) {
        self.dismiss_toast(timers);
        let token = timers.schedule(now, self.toast_duration, TimerEvent::DismissToast);
        self.toast = Some(Toast {
            task_id: task.id.clone(),
            title: task.title.clone(),
            token,
        });
    }

    fn dismiss_toast(&mut self, timers: &mut TimerQueue<TimerEvent>) {
        if let Some(toast) = self.toast.take() {
            timers.cancel(toast.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{DeletionState, UndoController};
    use crate::repository::TaskRepository;
    use crate::store::MemoryStore;
    use crate::timers::{TimerEvent, TimerQueue};

    struct Harness {
        repo: TaskRepository<MemoryStore>,
        timers: TimerQueue<TimerEvent>,
        undo: UndoController,
        now: DateTime<Utc>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                repo: TaskRepository::open(MemoryStore::new()),
                timers: TimerQueue::new(),
                undo: UndoController::default(),
                now: Utc
                    .with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
                    .single()
                    .expect("valid now"),
            }
        }

        fn add(&mut self, title: &str) -> String {
            self.repo
                .add(title, "", None, self.now)
                .expect("created")
                .id
        }

        fn delete(&mut self, id: &str) -> bool {
            self.undo
                .request_delete(&self.repo, &mut self.timers, id, self.now)
        }

        fn advance(&mut self, millis: i64) {
            self.now += Duration::milliseconds(millis);
            for (token, event) in self.timers.fire_due(self.now) {
                match event {
                    TimerEvent::RemoveTask { id } => {
                        self.undo.on_removal_due(&mut self.repo, token, &id)
                    }
                    TimerEvent::DismissToast => self.undo.on_toast_due(token),
                    TimerEvent::DismissBanner => {}
                }
            }
        }
    }

    #[test]
    fn removal_happens_after_grace() {
        let mut h = Harness::new();
        let id = h.add("T");

        assert!(h.delete(&id));
        assert_eq!(
            h.undo.state(),
            DeletionState::PendingRemoval { task_id: id.clone() }
        );
        h.advance(259);
        assert!(h.repo.contains(&id));

        h.advance(1);
        assert!(!h.repo.contains(&id));
        assert_eq!(h.undo.state(), DeletionState::Idle);
        assert!(h.undo.toast().is_some());

        h.advance(4000);
        assert!(h.undo.toast().is_none());
    }

    #[test]
    fn undo_before_grace_cancels_removal() {
        let mut h = Harness::new();
        let id = h.add("T");
        h.delete(&id);
        h.advance(100);

        assert!(h.undo.undo(&mut h.repo, &mut h.timers));
        assert!(h.undo.toast().is_none());
        assert!(h.timers.is_empty());

        h.advance(1000);
        assert!(h.repo.contains(&id));
        assert_eq!(h.repo.len(), 1);
    }

    #[test]
    fn undo_after_removal_restores_backup() {
        let mut h = Harness::new();
        let id = h.add("T");
        h.delete(&id);
        h.advance(300);
        assert!(!h.repo.contains(&id));

        assert!(h.undo.undo(&mut h.repo, &mut h.timers));
        assert!(h.repo.contains(&id));
        assert!(!h.undo.undo(&mut h.repo, &mut h.timers));
        assert_eq!(h.repo.len(), 1);
    }

    #[test]
    fn second_delete_supersedes_first() {
        let mut h = Harness::new();
        let a = h.add("A");
        let b = h.add("B");

        h.delete(&a);
        h.advance(100);
        h.delete(&b);
        assert_eq!(h.undo.exiting_id(), Some(b.as_str()));
        assert_eq!(h.undo.toast().map(|t| t.title.as_str()), Some("B"));

        h.advance(1000);
        assert!(h.repo.contains(&a));
        assert!(!h.repo.contains(&b));
        assert_eq!(h.undo.backup().map(|t| t.id.as_str()), Some(b.as_str()));
    }

    #[test]
    fn unknown_id_is_ignored() {
        let mut h = Harness::new();
        assert!(!h.delete("nope"));
        assert_eq!(h.undo.state(), DeletionState::Idle);
        assert!(h.timers.is_empty());
    }

    #[test]
    fn stale_tokens_do_not_fire() {
        let mut h = Harness::new();
        let id = h.add("T");
        h.delete(&id);
        let stale = h.timers.fire_due(h.now + Duration::milliseconds(260));
        let (token, _) = stale[0].clone();

        h.undo.undo(&mut h.repo, &mut h.timers);
        h.undo.on_removal_due(&mut h.repo, token, &id);
        assert!(h.repo.contains(&id));
    }
}
