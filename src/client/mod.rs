//! Table and queue clients.

mod queue;
mod table;

pub use queue::*;
pub use table::*;

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Longest partition or row key the table service accepts, in bytes.
const MAX_KEY_LEN: usize = 1024;

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9]{2,62}$").expect("valid table name regex")
    })
}

fn queue_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").expect("valid queue name regex")
    })
}

pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    if !table_name_pattern().is_match(name) {
        return Err(Error::argument(format!(
            "table name '{}' must be 3-63 alphanumeric characters starting with a letter",
            name
        )));
    }
    if name.eq_ignore_ascii_case("tables") {
        return Err(Error::argument("table name 'tables' is reserved"));
    }
    Ok(())
}

pub(crate) fn validate_queue_name(name: &str) -> Result<()> {
    if !queue_name_pattern().is_match(name) || name.contains("--") {
        return Err(Error::argument(format!(
            "queue name '{}' must be 3-63 lowercase letters, digits or single hyphens, \
             starting and ending with a letter or digit",
            name
        )));
    }
    Ok(())
}

/// Checks a partition or row key before it is sent to the store.
pub(crate) fn validate_key(kind: &str, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::argument(format!("{} must not be empty", kind)));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::argument(format!(
            "{} exceeds {} bytes",
            kind, MAX_KEY_LEN
        )));
    }
    if let Some(c) = key
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
    {
        return Err(Error::argument(format!(
            "{} contains the disallowed character {:?}",
            kind, c
        )));
    }
    Ok(())
}
