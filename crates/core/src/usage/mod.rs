//! Usage log: every provider call and task lifecycle transition, written
//! asynchronously to storage through a channel.

mod events;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use events::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;
