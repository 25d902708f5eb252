//! Skill bundles and their manifests.

pub mod bundle;
pub mod manifest;

pub use bundle::{SkillBundle, parse_params, substitute_params};
pub use manifest::{FieldRequirement, Requirements, SkillManifest};
