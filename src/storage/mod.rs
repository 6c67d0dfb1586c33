//! Storage backends behind the table and queue clients.

mod queue;
mod table;

pub use queue::*;
pub use table::*;
