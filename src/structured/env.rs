//! Environment file merging.
//!
//! Existing lines are never rewritten. Keys the file lacks are appended
//! inside a block delimited by `# >>> graft: <skill>` and
//! `# <<< graft: <skill>`; a later merge for the same skill extends its block.

use std::collections::HashSet;
use std::path::Path;

use super::Summary;

pub fn is_env_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == ".env" || name.starts_with(".env.") || name.ends_with(".env"))
}

fn block_open(skill: &str) -> String {
    format!("# >>> graft: {skill}")
}

fn block_close(skill: &str) -> String {
    format!("# <<< graft: {skill}")
}

/// Key name of a `KEY=value` (or `export KEY=value`) line.
fn key_of(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, _) = line.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some(key)
}

/// Append the missing `keys` (each `KEY` or `KEY=default`) to `existing`.
pub fn merge_env(existing: &str, keys: &[String], skill: &str) -> (String, Summary) {
    let defined: HashSet<&str> = existing.lines().filter_map(key_of).collect();
    let mut summary = Summary::default();
    let mut seen = HashSet::new();
    let mut new_lines = Vec::new();

    for spec in keys {
        let (key, default) = spec
            .split_once('=')
            .map_or((spec.trim(), ""), |(key, value)| (key.trim(), value));
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        if defined.contains(key) {
            summary.skipped.push(key.to_string());
        } else {
            summary.added.push(key.to_string());
            new_lines.push(format!("{key}={default}"));
        }
    }

    if new_lines.is_empty() {
        return (existing.to_string(), summary);
    }

    let close = block_close(skill);
    let lines: Vec<&str> = existing.lines().collect();
    let mut out = String::with_capacity(existing.len() + new_lines.len() * 32);

    if let Some(close_at) = lines.iter().position(|line| line.trim() == close) {
        for line in &lines[..close_at] {
            out.push_str(line);
            out.push('\n');
        }
        for line in &new_lines {
            out.push_str(line);
            out.push('\n');
        }
        for line in &lines[close_at..] {
            out.push_str(line);
            out.push('\n');
        }
        return (out, summary);
    }

    out.push_str(existing);
    if !out.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(&block_open(skill));
    out.push('\n');
    for line in &new_lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&close);
    out.push('\n');
    (out, summary)
}
