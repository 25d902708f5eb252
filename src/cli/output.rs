use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use serde_json::json;

use crate::error::{GraftError, MergeConflict, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Robot,
}

#[derive(Serialize)]
pub struct RobotResponse<T> {
    pub status: RobotStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Ok,
    Error { code: String, message: String },
    Partial { completed: usize, failed: usize },
}

impl<T> RobotResponse<T> {
    fn new(status: RobotStatus, data: T) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

pub fn robot_ok<T: Serialize>(data: T) -> RobotResponse<T> {
    RobotResponse::new(RobotStatus::Ok, data)
}

pub fn robot_partial<T: Serialize>(data: T, completed: usize, failed: usize) -> RobotResponse<T> {
    RobotResponse::new(RobotStatus::Partial { completed, failed }, data)
}

/// Error document; `data` carries whatever detail the error has.
pub fn robot_error(err: &GraftError) -> RobotResponse<serde_json::Value> {
    RobotResponse::new(
        RobotStatus::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        },
        error_details(err),
    )
}

fn error_details(err: &GraftError) -> serde_json::Value {
    match err {
        GraftError::Conflict(MergeConflict::Text { file, hunks }) => json!({
            "file": file,
            "hunks": hunks,
        }),
        GraftError::Conflict(MergeConflict::Dependency {
            file,
            package,
            existing,
            incoming,
        }) => json!({
            "file": file,
            "package": package,
            "existing": existing,
            "incoming": incoming,
        }),
        GraftError::Conflict(MergeConflict::PortCollision {
            file,
            port,
            service,
            existing_service,
        }) => json!({
            "file": file,
            "port": port,
            "service": service,
            "existing_service": existing_service,
        }),
        GraftError::SharedFile { skill, file, others } => json!({
            "skill": skill,
            "file": file,
            "others": others,
        }),
        GraftError::LockContention { holder } => json!({ "holder": holder }),
        _ => serde_json::Value::Null,
    }
}

pub fn emit_robot<T: Serialize>(response: &RobotResponse<T>) -> Result<()> {
    emit_json(response)
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 14,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push(String::new());
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        // pad before styling so escape codes don't eat the width
        let padded = format!("{key:width$}", width = self.key_width);
        self.lines
            .push(format!("{} {value}", style(padded).dim()));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("  - {text}"));
        self
    }

    pub fn warning(&mut self, text: &str) -> &mut Self {
        self.lines
            .push(format!("{} {text}", style("warning:").yellow().bold()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}

/// Human rendering of a failure, with conflict detail where there is some.
pub fn render_error(err: &GraftError) -> String {
    let mut text = format!("{} {err}", style("error:").red().bold());
    if let GraftError::Conflict(MergeConflict::Text { hunks, .. }) = err {
        for hunk in hunks {
            text.push('\n');
            text.push_str(&hunk.to_string());
        }
    }
    text
}
