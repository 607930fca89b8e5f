use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::datetime::{iso_date_serde, parse_stored_date};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub completed: bool,

    #[serde(default, with = "iso_date_serde::option")]
    pub due_date: Option<NaiveDate>,
}

impl Task {
    pub fn new_active(
        id: String,
        title: String,
        description: String,
        due_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            title,
            description,
            completed: false,
            due_date,
        }
    }

    /// Builds a task from one stored record, or `None` when the record lacks a
    /// string `id`, a string `title` or a boolean `completed`.
    pub fn from_stored(record: &Value) -> Option<Self> {
        let obj = record.as_object()?;
        let id = obj.get("id")?.as_str()?;
        let title = obj.get("title")?.as_str()?;
        let completed = obj.get("completed")?.as_bool()?;

        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let due_date = obj
            .get("dueDate")
            .and_then(Value::as_str)
            .and_then(parse_stored_date);

        Some(Self {
            id: id.to_string(),
            title: title.to_string(),
            description,
            completed,
            due_date,
        })
    }
}

pub trait IdGenerator {
    fn next_id(&mut self, now: DateTime<Utc>) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self, _now: DateTime<Utc>) -> String {
        Uuid::new_v4().to_string()
    }
}

/// `<millis>-<six base36 chars>`. Millis never go backwards within one
/// generator even if the clock does.
#[derive(Debug, Clone, Default)]
pub struct TimestampIds {
    last_millis: i64,
}

impl IdGenerator for TimestampIds {
    fn next_id(&mut self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis().max(self.last_millis);
        self.last_millis = millis;

        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{millis}-{suffix}")
    }
}
