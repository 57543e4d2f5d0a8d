//! Task lifecycle records and their storage.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTaskStore;
pub use store::{check_update, TaskError, TaskStore};
pub use types::*;
