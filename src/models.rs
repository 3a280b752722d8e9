// Data models for the task board

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Icon assigned to categories created without one
pub const DEFAULT_ICON: &str = "Folder";

/// A named, coloured group of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub position: usize,
}

/// A single to-do item, owned by exactly one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `YYYY-MM-DD`, optionally followed by `THH:MM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_priority"
    )]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub position: usize,
}

impl Task {
    /// Parsed due date, if present and well-formed
    pub fn due(&self) -> Option<NaiveDateTime> {
        self.due_date.as_deref().and_then(parse_due)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(eyre::eyre!("Unknown priority: {} (expected low, medium or high)", other)),
        }
    }
}

// Older blobs may carry "" or an unknown word here; treat those as "no priority"
fn lenient_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

/// Input for `Store::add_category`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
    pub icon: Option<String>,
}

impl NewCategory {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Input for `Store::add_task`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub category_id: String,
    pub completed: bool,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub priority: Option<Priority>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category_id: category_id.into(),
            ..Default::default()
        }
    }
}

/// Partial update for a category. Position is only changed by reordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl CategoryPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none() && self.icon.is_none()
    }

    /// Merge into `category`, returning whether any field changed
    pub fn apply(&self, category: &mut Category) -> bool {
        let mut changed = false;
        if let Some(name) = &self.name {
            changed |= replace(&mut category.name, name.trim().to_string());
        }
        if let Some(color) = &self.color {
            changed |= replace(&mut category.color, color.clone());
        }
        if let Some(icon) = &self.icon {
            let icon = if icon.trim().is_empty() {
                default_icon()
            } else {
                icon.clone()
            };
            changed |= replace(&mut category.icon, icon);
        }
        changed
    }
}

/// Partial update for a task.
///
/// The outer `Option` means "leave unchanged"; for the optional fields the
/// inner `None` clears the value. Category and position are only changed by
/// reordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
    pub priority: Option<Option<Priority>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
    }

    /// Merge into `task`, returning whether any field changed
    pub fn apply(&self, task: &mut Task) -> bool {
        let mut changed = false;
        if let Some(title) = &self.title {
            changed |= replace(&mut task.title, title.trim().to_string());
        }
        if let Some(completed) = self.completed {
            changed |= replace(&mut task.completed, completed);
        }
        if let Some(description) = &self.description {
            changed |= replace(&mut task.description, non_blank(description.as_deref()));
        }
        if let Some(due_date) = &self.due_date {
            changed |= replace(&mut task.due_date, non_blank(due_date.as_deref()));
        }
        if let Some(priority) = self.priority {
            changed |= replace(&mut task.priority, priority);
        }
        changed
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Categories present before the user has created any
pub fn default_categories() -> Vec<Category> {
    let seed = [
        ("cat-1", "Work", "#9b87f5", "Briefcase"),
        ("cat-2", "Personal", "#1EAEDB", "User"),
        ("cat-3", "Ideas", "#FF69B4", "Lightbulb"),
    ];

    seed.iter()
        .enumerate()
        .map(|(position, (id, name, color, icon))| Category {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            position,
        })
        .collect()
}

/// Join a date and an optional time-of-day into the stored due-date form.
///
/// Returns `None` when no date is given; a time without a date is dropped.
pub fn combine_due(date: Option<&str>, time: Option<&str>) -> Option<String> {
    let date = non_blank(date)?;
    match non_blank(time) {
        Some(time) => Some(format!("{}T{}", date, time)),
        None => Some(date),
    }
}

/// Parse a stored due date. Date-only values resolve to local midnight.
pub fn parse_due(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Helper function to get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
