//! Utility functions and helpers.

pub mod format;
pub mod fs;
pub mod path_policy;

pub use format::*;
pub use fs::*;
