use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::datetime::days_ahead;
use crate::store::{KeyValueStore, THEME_KEY, write_blob};
use crate::task::Task;
use crate::timers::{TimerEvent, TimerQueue, TimerToken};

pub const DEFAULT_BANNER_MS: i64 = 4200;
pub const FAR_FUTURE_YEAR: i32 = 2025;
pub const FAR_FUTURE_DAYS: i64 = 365;
pub const FAR_FUTURE_MESSAGE: &str =
    "This is a to-do list, not NASA's mission schedule. Maybe pick a nearer date?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn matches(self, task: &Task) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !task.completed,
            Filter::Completed => task.completed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Active => "active",
            Filter::Completed => "completed",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Filter::All),
            "active" => Ok(Filter::Active),
            "completed" | "done" => Ok(Filter::Completed),
            other => Err(anyhow!("unknown filter: {other} (expected all, active or completed)")),
        }
    }
}

/// Urgency order: overdue first, then by ascending due date, then undated.
pub fn due_order(a: &Task, b: &Task, today: NaiveDate) -> Ordering {
    let overdue_a = a.due_date.is_some_and(|due| due < today);
    let overdue_b = b.due_date.is_some_and(|due| due < today);
    if overdue_a != overdue_b {
        return if overdue_a {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }

    match (a.due_date, b.due_date) {
        (Some(da), Some(db)) => da.cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn filtered_sorted(tasks: &[Task], filter: Filter, today: NaiveDate) -> Vec<&Task> {
    let mut view: Vec<&Task> = tasks.iter().filter(|task| filter.matches(task)).collect();
    view.sort_by(|a, b| due_order(a, b, today));
    view
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueBadge {
    Overdue,
    Today,
    Due(NaiveDate),
}

impl DueBadge {
    pub fn for_task(task: &Task, today: NaiveDate) -> Option<Self> {
        let due = task.due_date?;
        Some(match due.cmp(&today) {
            Ordering::Less => DueBadge::Overdue,
            Ordering::Equal => DueBadge::Today,
            Ordering::Greater => DueBadge::Due(due),
        })
    }
}

impl fmt::Display for DueBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DueBadge::Overdue => f.write_str("Overdue"),
            DueBadge::Today => f.write_str("Due today"),
            DueBadge::Due(date) => write!(f, "Due {}", date.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSummary {
    pub shown: usize,
    pub total: usize,
}

impl fmt::Display for ListSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} shown", self.shown, self.total)
    }
}

pub fn empty_message(total: usize) -> &'static str {
    if total == 0 {
        "No tasks yet. Add your first task!"
    } else {
        "No tasks match this filter."
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn storage_value(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn from_storage(raw: &str) -> Option<Self> {
        match raw.trim() {
            "dark" => Some(Theme::Dark),
            "light" => Some(Theme::Light),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_value())
    }
}

/// Any stored preference wins: `dark` is dark, anything else is light. With
/// nothing stored the ambient signal decides, then light. An unreadable
/// store resolves to light.
pub fn load_theme<S: KeyValueStore + ?Sized>(store: &S, ambient: Option<Theme>) -> Theme {
    let stored = match store.get(THEME_KEY) {
        Ok(stored) => stored.filter(|raw| !raw.is_empty()),
        Err(err) => {
            warn!(key = THEME_KEY, error = %err, "theme preference unreadable; using light");
            return Theme::Light;
        }
    };
    let theme = match stored.as_deref() {
        Some("dark") => Theme::Dark,
        Some(_) => Theme::Light,
        None => ambient.unwrap_or_default(),
    };
    debug!(?stored, ?ambient, %theme, "resolved theme");
    theme
}

pub fn save_theme<S: KeyValueStore + ?Sized>(store: &S, theme: Theme) {
    write_blob(store, THEME_KEY, theme.storage_value());
}

pub fn is_far_future(due: NaiveDate, now: DateTime<Utc>) -> bool {
    due.year() > FAR_FUTURE_YEAR || days_ahead(due, now) > FAR_FUTURE_DAYS
}

#[derive(Debug, Clone)]
struct ShownBanner {
    message: String,
    token: TimerToken,
}

/// A one-shot advisory message with its own dismiss timer.
#[derive(Debug, Clone)]
pub struct BannerSlot {
    duration: Duration,
    shown: Option<ShownBanner>,
}

impl Default for BannerSlot {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_BANNER_MS))
    }
}

impl BannerSlot {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            shown: None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.shown.as_ref().map(|banner| banner.message.as_str())
    }

    /// Replaces whatever is shown and restarts the dismiss timer.
    pub fn show(&mut self, timers: &mut TimerQueue<TimerEvent>, message: &str, now: DateTime<Utc>) {
        if let Some(previous) = self.shown.take() {
            timers.cancel(previous.token);
        }
        let token = timers.schedule(now, self.duration, TimerEvent::DismissBanner);
        self.shown = Some(ShownBanner {
            message: message.to_string(),
            token,
        });
    }

    pub fn maybe_show_far_future(
        &mut self,
        timers: &mut TimerQueue<TimerEvent>,
        due: NaiveDate,
        now: DateTime<Utc>,
    ) -> bool {
        if !is_far_future(due, now) {
            return false;
        }
        debug!(%due, "far-future due date; showing banner");
        self.show(timers, FAR_FUTURE_MESSAGE, now);
        true
    }

    pub fn on_dismiss_due(&mut self, token: TimerToken) {
        if self.shown.as_ref().is_some_and(|banner| banner.token == token) {
            self.shown = None;
        }
    }
}
