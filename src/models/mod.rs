//! Data models for table entities and queue messages.

mod entity;
mod queue;
mod table;

pub use entity::*;
pub use queue::*;
pub use table::*;
