//! A single-threaded task list session.
//!
//! [`App`] owns the repository, the deletion/undo slot, the banner slot, the
//! theme and the timer queue. Every public action first fires timers that
//! are already due, so a caller that only ever acts (and never calls
//! [`App::tick`] itself) still observes timer effects in deadline order.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument};

use crate::clock::Clock;
use crate::datetime::today_in;
use crate::repository::TaskRepository;
use crate::store::KeyValueStore;
use crate::task::{IdGenerator, Task, UuidIds};
use crate::timers::{TimerEvent, TimerQueue};
use crate::undo::{DEFAULT_DELETE_GRACE_MS, DEFAULT_TOAST_MS, DeletionState, Toast, UndoController};
use crate::view::{
    BannerSlot, DEFAULT_BANNER_MS, Filter, ListSummary, Theme, empty_message, filtered_sorted,
    load_theme, save_theme,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub delete_grace: Duration,
    pub toast: Duration,
    pub banner: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            delete_grace: Duration::milliseconds(DEFAULT_DELETE_GRACE_MS),
            toast: Duration::milliseconds(DEFAULT_TOAST_MS),
            banner: Duration::milliseconds(DEFAULT_BANNER_MS),
        }
    }
}

pub struct AppOptions {
    pub timings: Timings,
    pub timezone: Tz,
    pub ambient_theme: Option<Theme>,
    pub ids: Box<dyn IdGenerator>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            timezone: chrono_tz::UTC,
            ambient_theme: None,
            ids: Box::new(UuidIds),
        }
    }
}

pub struct App<S, C> {
    repo: TaskRepository<S>,
    undo: UndoController,
    banner: BannerSlot,
    timers: TimerQueue<TimerEvent>,
    filter: Filter,
    theme: Theme,
    timezone: Tz,
    clock: C,
}

impl<S: KeyValueStore, C: Clock> App<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self::with_options(store, clock, AppOptions::default())
    }

    #[instrument(skip_all)]
    pub fn with_options(store: S, clock: C, options: AppOptions) -> Self {
        let repo = TaskRepository::open_with_ids(store, options.ids);
        let theme = load_theme(repo.store(), options.ambient_theme);
        info!(
            tasks = repo.len(),
            %theme,
            timezone = %options.timezone,
            "session started"
        );

        Self {
            repo,
            undo: UndoController::new(options.timings.delete_grace, options.timings.toast),
            banner: BannerSlot::new(options.timings.banner),
            timers: TimerQueue::new(),
            filter: Filter::default(),
            theme,
            timezone: options.timezone,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        today_in(self.timezone, self.clock.now())
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn repository(&self) -> &TaskRepository<S> {
        &self.repo
    }

    pub fn tasks(&self) -> &[Task] {
        self.repo.tasks()
    }

    /// Fires every uncancelled timer whose deadline has passed. Returns how
    /// many fired.
    pub fn tick(&mut self) -> usize {
        let fired = self.timers.fire_due(self.clock.now());
        let count = fired.len();
        for (token, event) in fired {
            match event {
                TimerEvent::RemoveTask { id } => {
                    self.undo.on_removal_due(&mut self.repo, token, &id);
                }
                TimerEvent::DismissToast => self.undo.on_toast_due(token),
                TimerEvent::DismissBanner => self.banner.on_dismiss_due(token),
            }
        }
        if count > 0 {
            debug!(count, "timers fired");
        }
        count
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    #[instrument(skip(self, description))]
    pub fn add_task(
        &mut self,
        title: &str,
        description: &str,
        due_date: Option<NaiveDate>,
    ) -> Option<Task> {
        self.tick();
        let now = self.clock.now();
        let task = self.repo.add(title, description, due_date, now)?;
        if let Some(due) = task.due_date {
            self.banner.maybe_show_far_future(&mut self.timers, due, now);
        }
        Some(task)
    }

    pub fn toggle_task(&mut self, id: &str) {
        self.tick();
        self.repo.toggle(id);
    }

    pub fn request_delete(&mut self, id: &str) -> bool {
        self.tick();
        let now = self.clock.now();
        self.undo
            .request_delete(&self.repo, &mut self.timers, id, now)
    }

    pub fn undo(&mut self) -> bool {
        self.tick();
        self.undo.undo(&mut self.repo, &mut self.timers)
    }

    pub fn deletion_state(&self) -> DeletionState {
        self.undo.state()
    }

    pub fn is_exiting(&self, id: &str) -> bool {
        self.undo.exiting_id() == Some(id)
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.undo.toast()
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.message()
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.tick();
        debug!(%filter, "filter changed");
        self.filter = filter;
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.tick();
        self.theme = self.theme.toggled();
        save_theme(self.repo.store(), self.theme);
        debug!(theme = %self.theme, "theme toggled");
        self.theme
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        filtered_sorted(self.repo.tasks(), self.filter, self.today())
    }

    pub fn summary(&self) -> ListSummary {
        ListSummary {
            shown: self.visible_tasks().len(),
            total: self.repo.len(),
        }
    }

    pub fn empty_message(&self) -> &'static str {
        empty_message(self.repo.len())
    }
}
