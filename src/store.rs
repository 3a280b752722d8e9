// Ordered category/task store with persisted state

use crate::backend::{Backend, MemoryBackend};
use crate::config::Config;
use crate::filter::{self, MonthFilter};
use crate::jsonl;
use crate::models::{
    Category, CategoryPatch, DEFAULT_ICON, NewCategory, NewTask, Task, TaskPatch, combine_due, default_categories,
    non_blank,
};
use crate::record::{self, Record};
use chrono::NaiveDateTime;
use eyre::{Context, Result, eyre};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a successful mutation changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    CategoryAdded {
        id: String,
    },
    CategoryUpdated {
        id: String,
    },
    CategoryDeleted {
        id: String,
        removed_tasks: Vec<String>,
    },
    CategoriesReordered {
        from: usize,
        to: usize,
    },
    TaskAdded {
        id: String,
        category_id: String,
    },
    TaskUpdated {
        id: String,
    },
    TaskDeleted {
        id: String,
        category_id: String,
    },
    TasksReordered {
        category_id: String,
        from: usize,
        to: usize,
    },
    TaskMoved {
        id: String,
        from_category: String,
        to_category: String,
        position: usize,
    },
}

impl Change {
    pub fn touches_categories(&self) -> bool {
        matches!(
            self,
            Change::CategoryAdded { .. }
                | Change::CategoryUpdated { .. }
                | Change::CategoryDeleted { .. }
                | Change::CategoriesReordered { .. }
        )
    }

    pub fn touches_tasks(&self) -> bool {
        match self {
            Change::CategoryDeleted { removed_tasks, .. } => !removed_tasks.is_empty(),
            Change::TaskAdded { .. }
            | Change::TaskUpdated { .. }
            | Change::TaskDeleted { .. }
            | Change::TasksReordered { .. }
            | Change::TaskMoved { .. } => true,
            _ => false,
        }
    }
}

type Listener = Box<dyn FnMut(&Change)>;

/// Owns the category and task collections.
///
/// Every mutation goes through this type and leaves positions dense: for each
/// category the tasks occupy `0..n`, and the categories occupy `0..m`. After a
/// mutation the touched collections are written to the backend and listeners
/// are notified.
pub struct Store {
    backend: Box<dyn Backend>,
    categories: Vec<Category>,
    tasks: Vec<Task>,
    listeners: Vec<Listener>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("categories", &self.categories)
            .field("tasks", &self.tasks)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Store {
    /// Open or create a store in the given directory, honouring its `config.yaml`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).context("Failed to create store directory")?;

        let config = Config::load(path)?;
        let backend = config.open_backend(path)?;
        Self::with_backend(backend, &config)
    }

    /// Load state from an already opened backend
    pub fn with_backend(mut backend: Box<dyn Backend>, config: &Config) -> Result<Self> {
        let (mut categories, mut categories_dirty) = match load_collection::<Category>(&mut *backend)? {
            Some(categories) => (categories, false),
            None if config.seed_defaults => (default_categories(), true),
            None => (Vec::new(), true),
        };
        let (mut tasks, mut tasks_dirty) = match load_collection::<Task>(&mut *backend)? {
            Some(tasks) => (tasks, false),
            None => (Vec::new(), true),
        };

        categories_dirty |= record::dedupe_ids(&mut categories);
        tasks_dirty |= record::dedupe_ids(&mut tasks);
        tasks_dirty |= drop_orphans(&mut tasks, &categories);
        categories_dirty |= record::normalize_positions(&mut categories);
        tasks_dirty |= record::normalize_positions(&mut tasks);

        let mut store = Self {
            backend,
            categories,
            tasks,
            listeners: Vec::new(),
        };

        if categories_dirty {
            store.persist_categories()?;
        }
        if tasks_dirty {
            store.persist_tasks()?;
        }

        info!(
            categories = store.categories.len(),
            tasks = store.tasks.len(),
            "Opened store"
        );
        Ok(store)
    }

    /// Store backed by process memory only, seeded with the default categories
    pub fn in_memory() -> Result<Self> {
        Self::with_backend(Box::new(MemoryBackend::new()), &Config::default())
    }

    /// Register a callback run after every successful mutation
    pub fn on_change<F>(&mut self, listener: F)
    where
        F: FnMut(&Change) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Categories in storage order
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Tasks in storage order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn sorted_categories(&self) -> Vec<&Category> {
        filter::sorted_by_position(&self.categories)
    }

    pub fn tasks_for_category(&self, category_id: &str, month: Option<&MonthFilter>) -> Vec<&Task> {
        filter::tasks_for_category(&self.tasks, category_id, month)
    }

    pub fn upcoming_priority_task(&self, now: NaiveDateTime) -> Option<&Task> {
        filter::upcoming_priority_task(&self.tasks, now)
    }

    // ========================================================================
    // Categories
    // ========================================================================

    /// Append a new category at the end of the category order
    pub fn add_category(&mut self, input: NewCategory) -> Result<Category> {
        let name = require_text("Category name", &input.name)?;
        let id = fresh_id("cat", |candidate| self.category(candidate).is_some());

        let category = Category {
            id,
            name,
            color: input.color,
            icon: non_blank(input.icon.as_deref()).unwrap_or_else(|| DEFAULT_ICON.to_string()),
            position: self.categories.len(),
        };
        self.categories.push(category.clone());
        info!(id = %category.id, position = category.position, "Added category");

        self.commit(Change::CategoryAdded {
            id: category.id.clone(),
        })?;
        Ok(category)
    }

    /// Merge `patch` into the category. Returns false if nothing changed or
    /// the id is unknown.
    pub fn update_category(&mut self, id: &str, patch: &CategoryPatch) -> Result<bool> {
        let Some(category) = self.categories.iter_mut().find(|c| c.id == id) else {
            debug!(id, "update_category: not found");
            return Ok(false);
        };
        if let Some(name) = &patch.name {
            require_text("Category name", name)?;
        }
        if !patch.apply(category) {
            return Ok(false);
        }

        self.commit(Change::CategoryUpdated { id: id.to_string() })?;
        Ok(true)
    }

    /// Remove a category together with all of its tasks
    pub fn delete_category(&mut self, id: &str) -> Result<bool> {
        let Some(idx) = self.categories.iter().position(|c| c.id == id) else {
            debug!(id, "delete_category: not found");
            return Ok(false);
        };

        let removed = self.categories.remove(idx);
        for category in &mut self.categories {
            if category.position > removed.position {
                category.position -= 1;
            }
        }

        let mut removed_tasks = Vec::new();
        self.tasks.retain(|task| {
            if task.category_id == id {
                removed_tasks.push(task.id.clone());
                false
            } else {
                true
            }
        });
        info!(id, removed_tasks = removed_tasks.len(), "Deleted category");

        self.commit(Change::CategoryDeleted {
            id: id.to_string(),
            removed_tasks,
        })?;
        Ok(true)
    }

    /// Move the category at position `from` to position `to`.
    ///
    /// Both indices must be existing positions; anything else is a no-op.
    pub fn reorder_categories(&mut self, from: usize, to: usize) -> Result<bool> {
        let len = self.categories.len();
        if from >= len || to >= len {
            warn!(from, to, len, "reorder_categories: index out of range, ignoring");
            return Ok(false);
        }
        if from == to {
            return Ok(false);
        }

        self.categories.sort_by_key(|c| c.position);
        let moved = self.categories.remove(from);
        self.categories.insert(to, moved);
        for (position, category) in self.categories.iter_mut().enumerate() {
            category.position = position;
        }
        debug!(from, to, "Reordered categories");

        self.commit(Change::CategoriesReordered { from, to })?;
        Ok(true)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Append a new task at the end of its category
    pub fn add_task(&mut self, input: NewTask) -> Result<Task> {
        let title = require_text("Task title", &input.title)?;
        if self.category(&input.category_id).is_none() {
            return Err(eyre!("Unknown category: {}", input.category_id));
        }
        let id = fresh_id("task", |candidate| self.task(candidate).is_some());

        let task = Task {
            id,
            title,
            completed: input.completed,
            position: self.group_len(&input.category_id),
            category_id: input.category_id,
            description: non_blank(input.description.as_deref()),
            due_date: combine_due(input.due_date.as_deref(), input.due_time.as_deref()),
            priority: input.priority,
        };
        self.tasks.push(task.clone());
        info!(id = %task.id, category_id = %task.category_id, position = task.position, "Added task");

        self.commit(Change::TaskAdded {
            id: task.id.clone(),
            category_id: task.category_id.clone(),
        })?;
        Ok(task)
    }

    /// Merge `patch` into the task. Returns false if nothing changed or the id
    /// is unknown.
    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Result<bool> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "update_task: not found");
            return Ok(false);
        };
        if let Some(title) = &patch.title {
            require_text("Task title", title)?;
        }
        if !patch.apply(task) {
            return Ok(false);
        }

        self.commit(Change::TaskUpdated { id: id.to_string() })?;
        Ok(true)
    }

    /// Remove a task and close the gap it leaves in its category
    pub fn delete_task(&mut self, id: &str) -> Result<bool> {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            debug!(id, "delete_task: not found");
            return Ok(false);
        };

        let removed = self.tasks.remove(idx);
        for task in &mut self.tasks {
            if task.category_id == removed.category_id && task.position > removed.position {
                task.position -= 1;
            }
        }
        info!(id, category_id = %removed.category_id, "Deleted task");

        self.commit(Change::TaskDeleted {
            id: removed.id,
            category_id: removed.category_id,
        })?;
        Ok(true)
    }

    /// Move the task at position `from` in `source` to position `to` in
    /// `destination`.
    ///
    /// Within one category `to` is clamped to the last slot; across categories
    /// it is clamped to `0..=len` of the destination. An out-of-range `from`
    /// or an unknown destination is a no-op.
    pub fn reorder_tasks(&mut self, source: &str, destination: &str, from: usize, to: usize) -> Result<bool> {
        let mut source_group = self.group_indices(source);
        if from >= source_group.len() {
            warn!(
                source,
                from,
                len = source_group.len(),
                "reorder_tasks: source index out of range, ignoring"
            );
            return Ok(false);
        }

        if source == destination {
            let to = to.min(source_group.len() - 1);
            if from == to {
                return Ok(false);
            }

            let moved = source_group.remove(from);
            source_group.insert(to, moved);
            self.renumber(&source_group);
            debug!(category_id = source, from, to, "Reordered tasks");

            self.commit(Change::TasksReordered {
                category_id: source.to_string(),
                from,
                to,
            })?;
            return Ok(true);
        }

        if self.category(destination).is_none() {
            warn!(destination, "reorder_tasks: unknown destination category, ignoring");
            return Ok(false);
        }

        let mut destination_group = self.group_indices(destination);
        let moved = source_group.remove(from);
        let position = to.min(destination_group.len());
        destination_group.insert(position, moved);

        self.tasks[moved].category_id = destination.to_string();
        self.renumber(&source_group);
        self.renumber(&destination_group);

        let id = self.tasks[moved].id.clone();
        debug!(id = %id, source, destination, position, "Moved task between categories");

        self.commit(Change::TaskMoved {
            id,
            from_category: source.to_string(),
            to_category: destination.to_string(),
            position,
        })?;
        Ok(true)
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn group_len(&self, category_id: &str) -> usize {
        self.tasks.iter().filter(|t| t.category_id == category_id).count()
    }

    /// Indices into `self.tasks` for one category, in position order
    fn group_indices(&self, category_id: &str) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.category_id == category_id)
            .map(|(idx, _)| idx)
            .collect();
        indices.sort_by_key(|&idx| self.tasks[idx].position);
        indices
    }

    fn renumber(&mut self, order: &[usize]) {
        for (position, &idx) in order.iter().enumerate() {
            self.tasks[idx].position = position;
        }
    }

    /// Persist what `change` touched, then notify listeners.
    ///
    /// A persistence failure is returned to the caller; the in-memory state
    /// keeps the mutation either way.
    fn commit(&mut self, change: Change) -> Result<()> {
        let mut persisted = Ok(());
        if change.touches_categories() {
            persisted = self.persist_categories();
        }
        if persisted.is_ok() && change.touches_tasks() {
            persisted = self.persist_tasks();
        }
        if let Err(e) = &persisted {
            warn!(error = ?e, ?change, "Failed to persist change, keeping in-memory state");
        }

        for listener in &mut self.listeners {
            listener(&change);
        }
        persisted
    }

    fn persist_categories(&mut self) -> Result<()> {
        write_collection(&mut *self.backend, &self.categories)
    }

    fn persist_tasks(&mut self) -> Result<()> {
        write_collection(&mut *self.backend, &self.tasks)
    }
}

/// Read a collection; a missing or malformed blob yields `None`. A malformed
/// blob is set aside before the caller overwrites it.
fn load_collection<T: Record>(backend: &mut dyn Backend) -> Result<Option<Vec<T>>> {
    let collection = T::collection_name();
    let Some(text) = backend.read_blob(collection)? else {
        debug!(collection, "No saved collection");
        return Ok(None);
    };

    match jsonl::decode(&text) {
        Ok(records) => Ok(Some(records)),
        Err(e) => {
            warn!(collection, error = ?e, "Saved collection is malformed, treating as absent");
            match backend.set_aside_blob(collection) {
                Ok(()) => warn!(collection, "Set aside malformed collection"),
                Err(e) => warn!(collection, error = ?e, "Failed to set aside malformed collection"),
            }
            Ok(None)
        }
    }
}

fn write_collection<T: Record>(backend: &mut dyn Backend, records: &[T]) -> Result<()> {
    let collection = T::collection_name();
    let text = jsonl::encode(records)?;
    backend
        .write_blob(collection, &text)
        .with_context(|| format!("Failed to save {}", collection))
}

/// Drop tasks whose category does not exist. Returns whether any were dropped.
fn drop_orphans(tasks: &mut Vec<Task>, categories: &[Category]) -> bool {
    let known: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();
    let before = tasks.len();
    tasks.retain(|task| {
        let keep = known.contains(task.category_id.as_str());
        if !keep {
            warn!(id = %task.id, category_id = %task.category_id, "Dropping task with unknown category");
        }
        keep
    });
    tasks.len() != before
}

fn fresh_id(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate = format!("{}-{}", prefix, Uuid::now_v7());
        if !taken(&candidate) {
            return candidate;
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(eyre!("{} cannot be empty", field));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::set_aside_key;
    use crate::models::Priority;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store() -> Store {
        Store::in_memory().unwrap()
    }

    fn titles(store: &Store, category_id: &str) -> Vec<String> {
        store
            .tasks_for_category(category_id, None)
            .iter()
            .map(|t| t.title.clone())
            .collect()
    }

    fn category_names(store: &Store) -> Vec<String> {
        store.sorted_categories().iter().map(|c| c.name.clone()).collect()
    }

    fn add(store: &mut Store, title: &str, category_id: &str) -> Task {
        store.add_task(NewTask::new(title, category_id)).unwrap()
    }

    fn assert_dense(store: &Store) {
        assert!(record::positions_are_dense(store.categories()));
        assert!(record::positions_are_dense(store.tasks()));
    }

    #[test]
    fn test_in_memory_store_seeds_defaults() {
        let store = store();
        assert_eq!(category_names(&store), vec!["Work", "Personal", "Ideas"]);
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_add_category_appends_with_default_icon() {
        let mut store = store();
        let category = store.add_category(NewCategory::new("Errands", "#00ff00")).unwrap();

        assert!(category.id.starts_with("cat-"));
        assert_eq!(category.position, 3);
        assert_eq!(category.icon, DEFAULT_ICON);
        assert_eq!(store.category(&category.id), Some(&category));

        let with_icon = store
            .add_category(NewCategory::new("Gym", "#ff0000").with_icon("Dumbbell"))
            .unwrap();
        assert_eq!(with_icon.position, 4);
        assert_eq!(with_icon.icon, "Dumbbell");
        assert_dense(&store);
    }

    #[test]
    fn test_add_category_rejects_blank_name() {
        let mut store = store();
        assert!(store.add_category(NewCategory::new("   ", "#fff")).is_err());
        assert_eq!(store.categories().len(), 3);
    }

    #[test]
    fn test_add_task_positions_per_category() {
        let mut store = store();
        let a = add(&mut store, "A", "cat-1");
        let b = add(&mut store, "B", "cat-2");
        let c = add(&mut store, "C", "cat-1");

        assert_eq!((a.position, b.position, c.position), (0, 0, 1));
        assert_ne!(a.id, c.id);
        assert_dense(&store);
    }

    #[test]
    fn test_add_task_combines_due_date_and_time() {
        let mut store = store();
        let task = store
            .add_task(NewTask {
                due_date: Some("2024-05-01".to_string()),
                due_time: Some("14:00".to_string()),
                priority: Some(Priority::High),
                description: Some("  ".to_string()),
                ..NewTask::new("Dentist", "cat-2")
            })
            .unwrap();

        assert_eq!(task.due_date.as_deref(), Some("2024-05-01T14:00"));
        assert_eq!(task.description, None);
        assert_eq!(task.priority, Some(Priority::High));
    }

    #[test]
    fn test_add_task_rejects_unknown_category_and_blank_title() {
        let mut store = store();
        assert!(store.add_task(NewTask::new("Orphan", "cat-404")).is_err());
        assert!(store.add_task(NewTask::new(" ", "cat-1")).is_err());
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_update_task_merges_fields_only() {
        let mut store = store();
        let task = add(&mut store, "Draft", "cat-1");
        add(&mut store, "Other", "cat-1");

        let patch = TaskPatch {
            title: Some("Final".to_string()),
            completed: Some(true),
            ..Default::default()
        };
        assert!(store.update_task(&task.id, &patch).unwrap());

        let updated = store.task(&task.id).unwrap();
        assert_eq!(updated.title, "Final");
        assert!(updated.completed);
        assert_eq!(updated.position, 0);
        assert_eq!(updated.category_id, "cat-1");

        // Same patch again is a no-op
        assert!(!store.update_task(&task.id, &patch).unwrap());
        assert!(!store.update_task("task-missing", &patch).unwrap());
    }

    #[test]
    fn test_update_task_rejects_blank_title() {
        let mut store = store();
        let task = add(&mut store, "Keep", "cat-1");
        let patch = TaskPatch {
            title: Some(String::new()),
            ..Default::default()
        };
        assert!(store.update_task(&task.id, &patch).is_err());
        assert_eq!(store.task(&task.id).unwrap().title, "Keep");
    }

    #[test]
    fn test_update_unknown_id_with_blank_text_is_noop() {
        let mut store = store();
        let task_patch = TaskPatch {
            title: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(store.update_task("task-missing", &task_patch), Ok(false)));

        let category_patch = CategoryPatch {
            name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(store.update_category("cat-404", &category_patch), Ok(false)));
        assert_eq!(store.category("cat-1").unwrap().name, "Work");
    }

    #[test]
    fn test_update_category() {
        let mut store = store();
        let patch = CategoryPatch {
            name: Some("Job".to_string()),
            color: Some("#123456".to_string()),
            ..Default::default()
        };
        assert!(store.update_category("cat-1", &patch).unwrap());

        let category = store.category("cat-1").unwrap();
        assert_eq!(category.name, "Job");
        assert_eq!(category.color, "#123456");
        assert_eq!(category.position, 0);
        assert!(!store.update_category("cat-404", &patch).unwrap());
    }

    #[test]
    fn test_delete_task_renumbers_its_category_only() {
        let mut store = store();
        let a = add(&mut store, "A", "cat-1");
        add(&mut store, "B", "cat-1");
        add(&mut store, "C", "cat-1");
        add(&mut store, "X", "cat-2");
        add(&mut store, "Y", "cat-2");

        assert!(store.delete_task(&a.id).unwrap());
        assert_eq!(titles(&store, "cat-1"), vec!["B", "C"]);
        assert_eq!(titles(&store, "cat-2"), vec!["X", "Y"]);
        assert_dense(&store);

        assert!(!store.delete_task(&a.id).unwrap());
    }

    #[test]
    fn test_delete_category_cascades_and_renumbers() {
        let mut store = store();
        add(&mut store, "W", "cat-1");
        add(&mut store, "P1", "cat-2");
        add(&mut store, "P2", "cat-2");
        add(&mut store, "I", "cat-3");

        assert!(store.delete_category("cat-2").unwrap());
        assert_eq!(category_names(&store), vec!["Work", "Ideas"]);
        assert_eq!(store.category("cat-3").unwrap().position, 1);
        assert!(store.tasks().iter().all(|t| t.category_id != "cat-2"));
        assert_eq!(store.tasks().len(), 2);
        assert_dense(&store);

        assert!(!store.delete_category("cat-2").unwrap());
    }

    #[test]
    fn test_reorder_categories() {
        let mut store = store();
        assert!(store.reorder_categories(0, 2).unwrap());
        assert_eq!(category_names(&store), vec!["Personal", "Ideas", "Work"]);

        assert!(store.reorder_categories(2, 0).unwrap());
        assert_eq!(category_names(&store), vec!["Work", "Personal", "Ideas"]);
        assert_dense(&store);
    }

    #[test]
    fn test_reorder_categories_noop_cases() {
        let mut store = store();
        assert!(!store.reorder_categories(1, 1).unwrap());
        assert!(!store.reorder_categories(3, 0).unwrap());
        assert!(!store.reorder_categories(0, 3).unwrap());
        assert_eq!(category_names(&store), vec!["Work", "Personal", "Ideas"]);
    }

    #[test]
    fn test_reorder_tasks_within_category() {
        let mut store = store();
        for title in ["A", "B", "C", "D"] {
            add(&mut store, title, "cat-1");
        }

        assert!(store.reorder_tasks("cat-1", "cat-1", 0, 2).unwrap());
        assert_eq!(titles(&store, "cat-1"), vec!["B", "C", "A", "D"]);

        assert!(store.reorder_tasks("cat-1", "cat-1", 3, 0).unwrap());
        assert_eq!(titles(&store, "cat-1"), vec!["D", "B", "C", "A"]);

        // Past the end clamps to the last slot
        assert!(store.reorder_tasks("cat-1", "cat-1", 0, 99).unwrap());
        assert_eq!(titles(&store, "cat-1"), vec!["B", "C", "A", "D"]);
        assert_dense(&store);
    }

    #[test]
    fn test_reorder_tasks_noop_cases() {
        let mut store = store();
        add(&mut store, "A", "cat-1");
        add(&mut store, "B", "cat-1");

        assert!(!store.reorder_tasks("cat-1", "cat-1", 1, 1).unwrap());
        assert!(!store.reorder_tasks("cat-1", "cat-1", 2, 0).unwrap());
        assert!(!store.reorder_tasks("cat-2", "cat-1", 0, 0).unwrap());
        assert!(!store.reorder_tasks("cat-1", "cat-404", 0, 0).unwrap());
        assert_eq!(titles(&store, "cat-1"), vec!["A", "B"]);
    }

    #[test]
    fn test_reorder_tasks_across_categories() {
        let mut store = store();
        for title in ["A", "B", "C"] {
            add(&mut store, title, "cat-1");
        }
        for title in ["X", "Y"] {
            add(&mut store, title, "cat-2");
        }

        assert!(store.reorder_tasks("cat-1", "cat-2", 1, 1).unwrap());
        assert_eq!(titles(&store, "cat-1"), vec!["A", "C"]);
        assert_eq!(titles(&store, "cat-2"), vec!["X", "B", "Y"]);
        assert_dense(&store);
    }

    #[test]
    fn test_reorder_tasks_across_categories_clamps_destination() {
        let mut store = store();
        add(&mut store, "A", "cat-1");
        add(&mut store, "X", "cat-2");

        assert!(store.reorder_tasks("cat-1", "cat-2", 0, 50).unwrap());
        assert_eq!(titles(&store, "cat-2"), vec!["X", "A"]);
        assert!(titles(&store, "cat-1").is_empty());
        assert_dense(&store);

        // Into an empty category
        assert!(store.reorder_tasks("cat-2", "cat-3", 1, 7).unwrap());
        assert_eq!(titles(&store, "cat-3"), vec!["A"]);
        assert_eq!(store.tasks_for_category("cat-3", None)[0].position, 0);
        assert_dense(&store);
    }

    #[test]
    fn test_listeners_receive_changes() {
        let mut store = store();
        let seen: Rc<RefCell<Vec<Change>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.on_change(move |change| sink.borrow_mut().push(change.clone()));

        let task = add(&mut store, "A", "cat-1");
        store.reorder_categories(0, 1).unwrap();
        store.delete_task("task-missing").unwrap();
        store.delete_category("cat-1").unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[0],
            Change::TaskAdded {
                id: task.id.clone(),
                category_id: "cat-1".to_string()
            }
        );
        assert_eq!(seen[1], Change::CategoriesReordered { from: 0, to: 1 });
        assert_eq!(
            seen[2],
            Change::CategoryDeleted {
                id: "cat-1".to_string(),
                removed_tasks: vec![task.id]
            }
        );
    }

    #[test]
    fn test_change_touches() {
        let deleted_empty = Change::CategoryDeleted {
            id: "c".to_string(),
            removed_tasks: Vec::new(),
        };
        assert!(deleted_empty.touches_categories());
        assert!(!deleted_empty.touches_tasks());

        let moved = Change::TaskMoved {
            id: "t".to_string(),
            from_category: "a".to_string(),
            to_category: "b".to_string(),
            position: 0,
        };
        assert!(moved.touches_tasks());
        assert!(!moved.touches_categories());
    }

    #[test]
    fn test_mutation_is_persisted() {
        let backend = MemoryBackend::new();
        let mut store = Store::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
        add(&mut store, "Saved", "cat-1");

        let text = backend.read_blob("tasks").unwrap().unwrap();
        let saved: Vec<Task> = jsonl::decode(&text).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Saved");
    }

    #[test]
    fn test_persistence_failure_is_surfaced_but_state_kept() {
        let backend = MemoryBackend::new();
        let mut store = Store::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
        let notified = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&notified);
        store.on_change(move |_| *counter.borrow_mut() += 1);

        backend.set_read_only(true);
        assert!(store.reorder_categories(0, 2).is_err());
        assert_eq!(category_names(&store), vec!["Personal", "Ideas", "Work"]);
        assert_eq!(*notified.borrow(), 1);
    }

    #[test]
    fn test_load_missing_blobs_persists_defaults() {
        let backend = MemoryBackend::new();
        Store::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();

        let categories: Vec<Category> = jsonl::decode(&backend.read_blob("categories").unwrap().unwrap()).unwrap();
        assert_eq!(categories, default_categories());
        assert_eq!(backend.read_blob("tasks").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_load_without_seed_defaults() {
        let config = Config {
            seed_defaults: false,
            ..Config::default()
        };
        let store = Store::with_backend(Box::new(MemoryBackend::new()), &config).unwrap();
        assert!(store.categories().is_empty());
    }

    #[test]
    fn test_load_malformed_blob_falls_back_to_defaults() {
        let backend = MemoryBackend::new();
        backend.insert("categories", "{not json}\n").unwrap();
        backend.insert("tasks", "[1, 2, 3]\n").unwrap();

        let store = Store::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
        assert_eq!(store.categories(), default_categories().as_slice());
        assert!(store.tasks().is_empty());

        // The unreadable contents survive under a backup key
        assert_eq!(
            backend.read_blob(&set_aside_key("categories")).unwrap().as_deref(),
            Some("{not json}\n")
        );
        assert_eq!(
            backend.read_blob(&set_aside_key("tasks")).unwrap().as_deref(),
            Some("[1, 2, 3]\n")
        );
    }

    #[test]
    fn test_load_valid_blob_is_not_set_aside() {
        let backend = MemoryBackend::new();
        Store::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
        Store::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
        assert_eq!(backend.read_blob(&set_aside_key("categories")).unwrap(), None);
    }

    #[test]
    fn test_load_repairs_invariants() {
        let backend = MemoryBackend::new();
        backend
            .insert(
                "categories",
                r##"{"id":"a","name":"A","color":"#111","position":4}
{"id":"b","name":"B","color":"#222","position":1}
{"id":"b","name":"Duplicate","color":"#333","position":0}
"##,
            )
            .unwrap();
        backend
            .insert(
                "tasks",
                r#"{"id":"t1","title":"One","categoryId":"a","position":3}
{"id":"t2","title":"Two","categoryId":"a","position":3}
{"id":"t3","title":"Orphan","categoryId":"zzz","position":0}
"#,
            )
            .unwrap();

        let store = Store::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
        assert_eq!(category_names(&store), vec!["B", "A"]);
        assert_eq!(titles(&store, "a"), vec!["One", "Two"]);
        assert!(store.task("t3").is_none());
        assert_dense(&store);

        // Repaired state was written back
        let saved: Vec<Task> = jsonl::decode(&backend.read_blob("tasks").unwrap().unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
    }
}
