// Taskboard - Ordered categories and tasks with persisted local state

pub mod backend;
pub mod config;
pub mod filter;
pub mod jsonl;
pub mod models;
pub mod record;
pub mod store;

// Re-export main types for convenience
pub use backend::{Backend, FileBackend, MemoryBackend, SqliteBackend};
pub use config::{BackendKind, Config};
pub use filter::MonthFilter;
pub use models::{Category, CategoryPatch, NewCategory, NewTask, Priority, Task, TaskPatch, now_ms};
pub use record::Record;
pub use store::{Change, Store};
