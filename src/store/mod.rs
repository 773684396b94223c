//! Persistence layer: SQLite-backed storage for todos and reminders.

mod libsql_backend;
mod migrations;
mod model;
mod traits;

pub use libsql_backend::LibSqlStore;
pub use model::{Reminder, Todo};
pub use traits::Store;
