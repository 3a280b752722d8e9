// Read-only views over categories and tasks

use crate::models::{Category, Priority, Task};
use crate::record::Record;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use eyre::{Result, eyre};
use std::fmt;
use std::str::FromStr;

/// Calendar month window used to narrow tasks by due date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthFilter {
    pub year: i32,
    /// 1-based month
    pub month: u32,
}

impl MonthFilter {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(eyre!("Invalid month: {} (expected 1-12)", month));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// A task matches only if its due date parses and falls in this month
    pub fn matches(&self, task: &Task) -> bool {
        task.due()
            .is_some_and(|due| due.year() == self.year && due.month() == self.month)
    }
}

impl FromStr for MonthFilter {
    type Err = eyre::Report;

    /// Parses `YYYY-MM`
    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| eyre!("Invalid month filter: {} (expected YYYY-MM)", s))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| eyre!("Invalid year in month filter: {}", s))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| eyre!("Invalid month in month filter: {}", s))?;
        Self::new(year, month)
    }
}

impl fmt::Display for MonthFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Records ordered ascending by position; ties keep their input order
pub fn sorted_by_position<T: Record>(records: &[T]) -> Vec<&T> {
    let mut sorted: Vec<&T> = records.iter().collect();
    sorted.sort_by_key(|record| record.position());
    sorted
}

/// Tasks of one category, optionally narrowed to a month, in position order
pub fn tasks_for_category<'a>(tasks: &'a [Task], category_id: &str, filter: Option<&MonthFilter>) -> Vec<&'a Task> {
    let mut selected: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.category_id == category_id)
        .filter(|task| filter.is_none_or(|f| f.matches(task)))
        .collect();
    selected.sort_by_key(|task| task.position);
    selected
}

/// Number of tasks across all categories due within the month
pub fn filtered_task_count(tasks: &[Task], filter: &MonthFilter) -> usize {
    tasks.iter().filter(|task| filter.matches(task)).count()
}

/// Categories, in position order, owning at least one task due within the month
pub fn categories_with_tasks_in<'a>(
    categories: &'a [Category],
    tasks: &[Task],
    filter: &MonthFilter,
) -> Vec<&'a Category> {
    sorted_by_position(categories)
        .into_iter()
        .filter(|category| {
            tasks
                .iter()
                .any(|task| task.category_id == category.id && filter.matches(task))
        })
        .collect()
}

/// Incomplete task whose due date has passed
pub fn is_overdue(task: &Task, now: NaiveDateTime) -> bool {
    !task.completed && task.due().is_some_and(|due| due < now)
}

/// The high-priority task to surface first.
///
/// Among incomplete high-priority tasks with a parseable due date, picks the
/// nearest one still in the future; if all are past due, the earliest one.
pub fn upcoming_priority_task(tasks: &[Task], now: NaiveDateTime) -> Option<&Task> {
    let mut candidates: Vec<(NaiveDateTime, &Task)> = tasks
        .iter()
        .filter(|task| !task.completed && task.priority == Some(Priority::High))
        .filter_map(|task| task.due().map(|due| (due, task)))
        .collect();
    candidates.sort_by_key(|(due, _)| *due);

    candidates
        .iter()
        .find(|(due, _)| *due > now)
        .or_else(|| candidates.first())
        .map(|(_, task)| *task)
}
