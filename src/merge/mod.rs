//! Three-way text merge.
//!
//! Each side is diffed against the base (Myers, line granularity) and the
//! two edit scripts are walked together diff3-style. Lines only one side
//! changed come from that side; lines both sides changed the same way merge
//! cleanly; everything else becomes a conflict region holding both sides
//! verbatim. Output is a pure function of the inputs and options.
//!
//! Conflict regions look like:
//!
//! ```text
//! <<<<<<< current
//! local lines
//! ||||||| base        (only with show_base)
//! ancestor lines
//! =======
//! incoming lines
//! >>>>>>> skill-name
//! ```

mod diff;
mod diff3;

use std::path::Path;

use crate::config::MergeConfig;
use crate::error::{ConflictHunk, MergeConflict};

pub use diff::{Hunk, diff_lines};
use diff3::{Region, merge_regions};

pub const MARKER_START: &str = "<<<<<<<";
pub const MARKER_BASE: &str = "|||||||";
pub const MARKER_SEPARATOR: &str = "=======";
pub const MARKER_END: &str = ">>>>>>>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub current_label: String,
    pub incoming_label: String,
    pub show_base: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            current_label: "current".to_string(),
            incoming_label: "incoming".to_string(),
            show_base: false,
        }
    }
}

impl MergeOptions {
    /// Labels from config, falling back to the skill name for the incoming side.
    pub fn for_skill(config: &MergeConfig, skill: &str) -> Self {
        Self {
            current_label: config.current_label.clone(),
            incoming_label: config
                .incoming_label
                .clone()
                .unwrap_or_else(|| skill.to_string()),
            show_base: config.show_base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    Clean(String),
    Conflicted {
        /// Merged text with conflict markers in place.
        content: String,
        hunks: Vec<ConflictHunk>,
    },
}

impl MergeResult {
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Clean(content) | Self::Conflicted { content, .. } => content,
        }
    }

    /// The clean text, or a text conflict naming `file`.
    pub fn into_clean(self, file: &Path) -> Result<String, MergeConflict> {
        match self {
            Self::Clean(content) => Ok(content),
            Self::Conflicted { hunks, .. } => Err(MergeConflict::Text {
                file: file.to_path_buf(),
                hunks,
            }),
        }
    }
}

/// Merge one file's three versions.
///
/// `base` is `None` when no ancestor exists. If `current` is also `None` the
/// incoming text is taken as-is; if the file exists locally without an
/// ancestor, the two versions are merged against an empty base, so anything
/// but identical content conflicts. A missing `current` with a known base
/// means the file was deleted locally and merges as empty text.
pub fn merge(
    base: Option<&str>,
    current: Option<&str>,
    incoming: &str,
    options: &MergeOptions,
) -> MergeResult {
    let current_text = match (base, current) {
        (None, None) => return MergeResult::Clean(incoming.to_string()),
        (_, Some(current)) => current,
        (Some(_), None) => "",
    };
    let base_text = base.unwrap_or("");

    if current_text == incoming || base_text == incoming {
        return MergeResult::Clean(current_text.to_string());
    }
    if base_text == current_text {
        return MergeResult::Clean(incoming.to_string());
    }

    let base_lines: Vec<&str> = base_text.split_inclusive('\n').collect();
    let current_lines: Vec<&str> = current_text.split_inclusive('\n').collect();
    let incoming_lines: Vec<&str> = incoming.split_inclusive('\n').collect();

    render(
        merge_regions(&base_lines, &current_lines, &incoming_lines),
        options,
    )
}

fn render(regions: Vec<Region<'_>>, options: &MergeOptions) -> MergeResult {
    let mut out = String::new();
    let mut hunks = Vec::new();

    for region in regions {
        match region {
            Region::Resolved(lines) => out.extend(lines),
            Region::Conflict {
                base_start,
                base,
                current,
                incoming,
            } => {
                let current = current.concat();
                let incoming = incoming.concat();

                push_marker(&mut out, MARKER_START, Some(&options.current_label));
                push_side(&mut out, &current);
                if options.show_base {
                    push_marker(&mut out, MARKER_BASE, Some("base"));
                    push_side(&mut out, &base.concat());
                }
                push_marker(&mut out, MARKER_SEPARATOR, None);
                push_side(&mut out, &incoming);
                push_marker(&mut out, MARKER_END, Some(&options.incoming_label));

                hunks.push(ConflictHunk {
                    base_line: base_start + 1,
                    current,
                    incoming,
                });
            }
        }
    }

    if hunks.is_empty() {
        MergeResult::Clean(out)
    } else {
        MergeResult::Conflicted {
            content: out,
            hunks,
        }
    }
}

fn push_marker(out: &mut String, marker: &str, label: Option<&str>) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(marker);
    if let Some(label) = label.filter(|label| !label.is_empty()) {
        out.push(' ');
        out.push_str(label);
    }
    out.push('\n');
}

fn push_side(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
}

/// True when `text` still carries an unresolved conflict region.
pub fn has_conflict_markers(text: &str) -> bool {
    let mut open = false;
    for line in text.lines() {
        if line.starts_with(MARKER_START) {
            open = true;
        } else if open && line.starts_with(MARKER_END) {
            return true;
        }
    }
    false
}
