//! Command grammar.
//!
//! Input is classified by a fixed, ordered list of checks. The first check
//! that matches wins, so `set status ...` never reaches the overdue test even
//! when the title mentions "overdue tasks".

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::models::ProjectStatus;

/// One line of the help text together with a command it accepts.
pub struct CommandHelp {
    pub usage: &'static str,
    pub example: &'static str,
}

/// Every command the matcher understands, in help order.
pub const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        usage: "list projects",
        example: "list projects",
    },
    CommandHelp {
        usage: "create project <title> [due YYYY-MM-DD]",
        example: "create project Launch due 2025-01-31",
    },
    CommandHelp {
        usage: STATUS_USAGE,
        example: "set status Launch to on_hold",
    },
    CommandHelp {
        usage: PROGRESS_USAGE,
        example: "set progress Launch to 75",
    },
    CommandHelp {
        usage: "overdue tasks",
        example: "overdue tasks",
    },
    CommandHelp {
        usage: "help",
        example: "help",
    },
];

const STATUS_USAGE: &str = "set status <project title> to <planning|active|on_hold|completed>";
const PROGRESS_USAGE: &str = "set progress <project title> to <0-100>";

/// What the user asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Help,
    ListProjects,
    CreateProject {
        title: String,
        deadline: Option<DateTime<Utc>>,
    },
    SetStatus {
        title: String,
        status: ProjectStatus,
    },
    /// `value` is the number as typed; rounding and clamping happen on write.
    SetProgress {
        title: String,
        value: f64,
    },
    OverdueTasks,
    /// `hint` is set when the input started like a known command but did not
    /// fit its pattern.
    Unrecognized {
        hint: Option<&'static str>,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::ListProjects => "list_projects",
            Self::CreateProject { .. } => "create_project",
            Self::SetStatus { .. } => "set_status",
            Self::SetProgress { .. } => "set_progress",
            Self::OverdueTasks => "overdue_tasks",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

pub fn help_text() -> String {
    let mut text = String::from("I can help with:");
    for command in COMMANDS {
        text.push_str("\n• ");
        text.push_str(command.usage);
    }
    text
}

pub fn status_hint() -> &'static str {
    static HINT: OnceLock<String> = OnceLock::new();
    HINT.get_or_init(|| format!("Try: {}", STATUS_USAGE))
}

pub fn progress_hint() -> &'static str {
    static HINT: OnceLock<String> = OnceLock::new();
    HINT.get_or_init(|| format!("Try: {}", PROGRESS_USAGE))
}

static CREATE_PREFIX_RE: OnceLock<Regex> = OnceLock::new();
static DUE_RE: OnceLock<Regex> = OnceLock::new();
static STATUS_RE: OnceLock<Regex> = OnceLock::new();
static PROGRESS_RE: OnceLock<Regex> = OnceLock::new();

fn create_prefix_re() -> &'static Regex {
    CREATE_PREFIX_RE.get_or_init(|| Regex::new(r"(?i)^create\s+project\s*").expect("valid regex"))
}

/// The `due` clause and everything after it.
fn due_re() -> &'static Regex {
    DUE_RE.get_or_init(|| {
        Regex::new(r"(?is)(?:^|\s+)due\s+(\d{4}-\d{2}-\d{2}).*$").expect("valid regex")
    })
}

fn status_re() -> &'static Regex {
    STATUS_RE.get_or_init(|| {
        Regex::new(r"(?i)^set\s+status\s+(.+)\s+to\s+(planning|active|on_hold|completed)$")
            .expect("valid regex")
    })
}

fn progress_re() -> &'static Regex {
    PROGRESS_RE.get_or_init(|| {
        Regex::new(r"(?i)^set\s+progress\s+(.+)\s+to\s+(-?\d+(?:\.\d+)?)\s*%?$")
            .expect("valid regex")
    })
}

/// Classify a line of user input.
///
/// Matching runs on the lower-cased text; arguments are taken from the
/// original text so titles keep their case.
pub fn parse(input: &str) -> Intent {
    let text = input.trim();
    let lower = text.to_lowercase();

    if lower == "help" {
        return Intent::Help;
    }
    if lower.starts_with("list projects") {
        return Intent::ListProjects;
    }
    if lower.starts_with("create project") {
        return parse_create(text);
    }
    if lower.starts_with("set status") {
        return match status_re().captures(text) {
            Some(caps) => {
                let status = ProjectStatus::from_str(&caps[2].to_lowercase());
                match status {
                    Some(status) => Intent::SetStatus {
                        title: caps[1].trim().to_string(),
                        status,
                    },
                    None => Intent::Unrecognized {
                        hint: Some(status_hint()),
                    },
                }
            }
            None => Intent::Unrecognized {
                hint: Some(status_hint()),
            },
        };
    }
    if lower.starts_with("set progress") {
        let parsed = progress_re().captures(text).and_then(|caps| {
            let value = caps[2].parse::<f64>().ok()?;
            Some(Intent::SetProgress {
                title: caps[1].trim().to_string(),
                value,
            })
        });
        return parsed.unwrap_or(Intent::Unrecognized {
            hint: Some(progress_hint()),
        });
    }
    if lower.contains("overdue") && lower.contains("tasks") {
        return Intent::OverdueTasks;
    }

    Intent::Unrecognized { hint: None }
}

fn parse_create(text: &str) -> Intent {
    let rest = create_prefix_re().replace(text, "");

    let (title, deadline) = match due_re().captures(&rest) {
        Some(caps) => {
            let start = caps.get(0).map_or(rest.len(), |m| m.start());
            (&rest[..start], parse_date(&caps[1]))
        }
        None => (&rest[..], None),
    };

    Intent::CreateProject {
        title: title.trim().to_string(),
        deadline,
    }
}

/// `YYYY-MM-DD` at midnight UTC. Impossible dates yield `None`.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
