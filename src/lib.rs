//! graft - apply skill bundles to a generated project tree.
//!
//! A skill adds and modifies files in a project. Modified files merge three
//! ways against a recorded ancestor; dependency manifests, env files,
//! compose services and endpoint registries merge by structure. Every
//! application is recorded so the whole history can be replayed onto a new
//! template or individual skills uninstalled.

pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod merge;
pub mod migrations;
pub mod project;
pub mod skill;
pub mod storage;
pub mod structured;
pub mod utils;
pub mod version;

pub use error::{GraftError, Result};
