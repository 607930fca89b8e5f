use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::store::{KeyValueStore, TASKS_KEY, read_blob, write_blob};
use crate::task::{IdGenerator, Task, UuidIds};

/// Owns the task collection, newest first, and mirrors every change to the
/// store.
pub struct TaskRepository<S> {
    store: S,
    ids: Box<dyn IdGenerator>,
    tasks: Vec<Task>,
}

impl<S: KeyValueStore> TaskRepository<S> {
    #[instrument(skip(store))]
    pub fn open(store: S) -> Self {
        Self::open_with_ids(store, Box::new(UuidIds))
    }

    #[instrument(skip(store, ids))]
    pub fn open_with_ids(store: S, ids: Box<dyn IdGenerator>) -> Self {
        let tasks = load(&store);
        debug!(count = tasks.len(), "repository opened");
        Self { store, ids, tasks }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Creates a task at the front of the collection. An empty title after
    /// trimming is rejected and nothing is stored.
    #[instrument(skip(self, description, now))]
    pub fn add(
        &mut self,
        title: &str,
        description: &str,
        due_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Option<Task> {
        let title = title.trim();
        if title.is_empty() {
            debug!("rejected task with empty title");
            return None;
        }

        let mut id = self.ids.next_id(now);
        while self.contains(&id) {
            warn!(%id, "generated id collides; drawing another");
            id = self.ids.next_id(now);
        }

        let task = Task::new_active(
            id,
            title.to_string(),
            description.trim().to_string(),
            due_date,
        );
        self.tasks.insert(0, task.clone());
        self.save();

        debug!(id = %task.id, count = self.tasks.len(), "task added");
        Some(task)
    }

    #[instrument(skip(self))]
    pub fn toggle(&mut self, id: &str) {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            debug!("toggle of unknown task ignored");
            return;
        };
        task.completed = !task.completed;
        debug!(completed = task.completed, "task toggled");
        self.save();
    }

    #[instrument(skip(self))]
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let idx = self.tasks.iter().position(|task| task.id == id)?;
        let removed = self.tasks.remove(idx);
        self.save();
        debug!(count = self.tasks.len(), "task removed");
        Some(removed)
    }

    /// Puts `task` back at the front unless a task with its id is present.
    /// Returns whether it was inserted.
    #[instrument(skip(self, task), fields(id = %task.id))]
    pub fn restore(&mut self, task: Task) -> bool {
        if self.contains(&task.id) {
            debug!("task already present; restore skipped");
            return false;
        }
        self.tasks.insert(0, task);
        self.save();
        true
    }

    pub fn save(&self) {
        save(&self.store, &self.tasks);
    }
}

/// Reads the task blob. Anything unreadable yields an empty collection;
/// records that fail the shape check are dropped one by one.
#[instrument(skip(store))]
pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Vec<Task> {
    let Some(raw) = read_blob(store, TASKS_KEY) else {
        return Vec::new();
    };
    parse_tasks(&raw)
}

pub fn parse_tasks(raw: &str) -> Vec<Task> {
    let records = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(records)) => records,
        Ok(other) => {
            warn!(kind = json_kind(&other), "stored tasks are not an array; ignoring");
            return Vec::new();
        }
        Err(err) => {
            warn!(error = %err, "stored tasks are not valid json; ignoring");
            return Vec::new();
        }
    };

    let total = records.len();
    let mut seen = HashSet::new();
    let tasks: Vec<Task> = records
        .iter()
        .filter_map(Task::from_stored)
        .filter(|task| seen.insert(task.id.clone()))
        .collect();

    if tasks.len() != total {
        warn!(
            kept = tasks.len(),
            dropped = total - tasks.len(),
            "dropped malformed or duplicate task records"
        );
    }
    tasks
}

#[instrument(skip(store, tasks), fields(count = tasks.len()))]
pub fn save<S: KeyValueStore + ?Sized>(store: &S, tasks: &[Task]) {
    match serde_json::to_string(tasks) {
        Ok(json) => write_blob(store, TASKS_KEY, &json),
        Err(err) => warn!(error = %err, "failed serializing tasks; not saved"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
