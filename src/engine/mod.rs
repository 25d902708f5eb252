//! The pipelines that change a project: init, apply, uninstall and replay.
//!
//! Each public entry point opens its own [`Session`], which serializes
//! operations on one project through the project lock.

pub mod apply;
pub mod init;
pub mod replay;
pub mod session;
pub mod uninstall;
pub mod validate;

pub use apply::{ApplyOptions, ApplyReport, ApplyStage, apply_in_session, apply_skill, check_skill};
pub use init::{InitReport, init_project};
pub use replay::{ReplayFailure, ReplayReport, replay};
pub use session::Session;
pub use uninstall::{UninstallReport, uninstall_in_session, uninstall_skill};
pub use validate::{TEMPLATE_OWNER, validate};
