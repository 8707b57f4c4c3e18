//! Utility functions for display formatting.

pub mod format;

pub use format::{relative_age, truncate_string};
