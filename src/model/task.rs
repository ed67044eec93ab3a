use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Id prefix for tasks fabricated locally by an optimistic create
pub const TEMP_ID_PREFIX: &str = "temp-";

/// A task as the remote store returns it. Field names follow the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-assigned identity (`_id` on the wire)
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_date::deserialize"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_date::deserialize"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_date::deserialize"
    )]
    pub due_date: Option<DateTime<Utc>>,
}

/// Server timestamps: RFC 3339, or a bare `YYYY-MM-DD` read as midnight UTC.
/// Null and empty strings decode to `None`.
mod lenient_date {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.trim().is_empty() => {
                parse_due_date(&s).map(Some).map_err(serde::de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}

impl Task {
    /// Build the local stand-in shown while a create is in flight.
    pub fn placeholder(input: &NewTask) -> Self {
        Task {
            id: format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()),
            title: input.title.clone(),
            category: input.category.clone(),
            done: false,
            archived: false,
            created_at: None,
            updated_at: None,
            due_date: input.due_date,
        }
    }

    /// True for tasks that only exist locally (temporary id)
    pub fn is_placeholder(&self) -> bool {
        is_temp_id(&self.id)
    }
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Boolean task fields that have a dedicated toggle endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleField {
    Done,
    Archived,
}

impl ToggleField {
    /// Path segment used by `PATCH /api/todos/:id/:field`
    pub fn as_str(self) -> &'static str {
        match self {
            ToggleField::Done => "done",
            ToggleField::Archived => "archived",
        }
    }

    pub fn get(self, task: &Task) -> bool {
        match self {
            ToggleField::Done => task.done,
            ToggleField::Archived => task.archived,
        }
    }

    pub fn set(self, task: &mut Task, value: bool) {
        match self {
            ToggleField::Done => task.done = value,
            ToggleField::Archived => task.archived = value,
        }
    }
}

/// How a toggle changes its field: flip whatever is there, or force a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleIntent {
    Flip,
    SetTo(bool),
}

impl ToggleIntent {
    /// The value the field holds after applying this intent to `current`
    pub fn resolve(self, current: bool) -> bool {
        match self {
            ToggleIntent::Flip => !current,
            ToggleIntent::SetTo(value) => value,
        }
    }

    /// Explicit value sent to the server; `None` lets the server flip
    pub fn value(self) -> Option<bool> {
        match self {
            ToggleIntent::Flip => None,
            ToggleIntent::SetTo(value) => Some(value),
        }
    }
}

impl From<Option<bool>> for ToggleIntent {
    fn from(value: Option<bool>) -> Self {
        value.map_or(ToggleIntent::Flip, ToggleIntent::SetTo)
    }
}

/// Body of `POST /api/todos`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        NewTask {
            title: title.into(),
            category: None,
            due_date: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }
}

/// Body of `PATCH /api/todos/:id`. Only present fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.category.is_none()
            && self.due_date.is_none()
            && self.done.is_none()
            && self.archived.is_none()
    }
}

/// Body of `DELETE /api/todos/:id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub ok: bool,
}

/// Parse a due date given as `YYYY-MM-DD` (midnight UTC) or full RFC 3339.
pub fn parse_due_date(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("invalid date '{}' (expected YYYY-MM-DD or RFC 3339)", s))
}
