// Position-ordered record trait shared by categories and tasks

use crate::models::{Category, Task};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Core trait for records kept in a dense, 0-based position sequence
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Unique identifier for this record
    fn id(&self) -> &str;

    /// Position within the record's group
    fn position(&self) -> usize;

    fn set_position(&mut self, position: usize);

    /// Records sharing a group key form one position sequence
    fn group_key(&self) -> &str;

    /// Collection name for this record type; also the persisted blob key
    fn collection_name() -> &'static str
    where
        Self: Sized;
}

impl Record for Category {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    // All categories share one sequence
    fn group_key(&self) -> &str {
        ""
    }

    fn collection_name() -> &'static str {
        "categories"
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    fn group_key(&self) -> &str {
        &self.category_id
    }

    fn collection_name() -> &'static str {
        "tasks"
    }
}

/// Indices of `records` grouped by group key, each group ordered by
/// (position, index) so ties keep their stored order
fn groups<T: Record>(records: &[T]) -> HashMap<&str, Vec<usize>> {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        groups.entry(record.group_key()).or_default().push(idx);
    }
    for members in groups.values_mut() {
        members.sort_by_key(|&idx| (records[idx].position(), idx));
    }
    groups
}

/// True when every group's positions are exactly `0..len`
pub fn positions_are_dense<T: Record>(records: &[T]) -> bool {
    groups(records).values().all(|members| {
        members
            .iter()
            .enumerate()
            .all(|(expected, &idx)| records[idx].position() == expected)
    })
}

/// Rewrite positions so every group is dense, preserving relative order.
/// Returns whether any position changed.
pub fn normalize_positions<T: Record>(records: &mut [T]) -> bool {
    let assignments: Vec<(usize, usize)> = groups(records)
        .into_values()
        .flat_map(|members| members.into_iter().enumerate().map(|(pos, idx)| (idx, pos)))
        .collect();

    let mut changed = false;
    for (idx, pos) in assignments {
        if records[idx].position() != pos {
            records[idx].set_position(pos);
            changed = true;
        }
    }
    changed
}

/// Drop records whose id was already seen, keeping the first.
/// Returns whether anything was dropped.
pub fn dedupe_ids<T: Record>(records: &mut Vec<T>) -> bool {
    let before = records.len();
    let mut seen = HashSet::new();
    records.retain(|record| {
        let fresh = seen.insert(record.id().to_string());
        if !fresh {
            warn!(
                collection = T::collection_name(),
                id = record.id(),
                "Dropping record with duplicate id"
            );
        }
        fresh
    });
    records.len() != before
}
