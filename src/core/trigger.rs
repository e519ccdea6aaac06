//! Triggers and the events they react to

use crate::core::cron::CronSchedule;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// An incoming event that may start a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A change was pushed to the repository
    Push {
        /// Full git ref, e.g. `refs/heads/main`
        git_ref: String,
        /// Commit that was pushed, when known
        #[serde(default)]
        sha: Option<String>,
    },
    /// The scheduler ticked at the given instant
    ScheduleTick { at: DateTime<Utc> },
}

impl Event {
    /// A push to the given ref with no known commit
    pub fn push(git_ref: impl Into<String>) -> Self {
        Event::Push {
            git_ref: git_ref.into(),
            sha: None,
        }
    }

    pub fn tick(at: DateTime<Utc>) -> Self {
        Event::ScheduleTick { at }
    }

    /// Branch name for push events (`refs/heads/` stripped)
    pub fn branch(&self) -> Option<&str> {
        match self {
            Event::Push { git_ref, .. } => {
                Some(git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref))
            }
            Event::ScheduleTick { .. } => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Push { git_ref, sha: Some(sha) } => {
                let short: String = sha.chars().take(8).collect();
                write!(f, "push {} ({})", git_ref, short)
            }
            Event::Push { git_ref, sha: None } => write!(f, "push {}", git_ref),
            Event::ScheduleTick { at } => write!(f, "schedule {}", at.to_rfc3339()),
        }
    }
}

/// Glob-style branch filter (`main`, `release/*`, `feature/**`)
#[derive(Debug, Clone)]
pub struct BranchFilter {
    pattern: String,
    regex: Regex,
}

impl BranchFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut source = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    source.push_str(".*");
                }
                '*' => source.push_str("[^/]*"),
                '?' => source.push_str("[^/]"),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&source)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }
}

impl PartialEq for BranchFilter {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Serialize for BranchFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

/// Condition under which a workflow run is started
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires on every push, optionally restricted to matching branches
    Push { branches: Vec<BranchFilter> },
    /// Fires on scheduler ticks that fall on the cron pattern
    Schedule { cron: CronSchedule },
}

impl Trigger {
    /// Check whether this trigger fires for the given event
    pub fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (Trigger::Push { branches }, Event::Push { .. }) => {
                if branches.is_empty() {
                    return true;
                }
                let branch = event.branch().unwrap_or_default();
                branches.iter().any(|filter| filter.matches(branch))
            }
            (Trigger::Schedule { cron }, Event::ScheduleTick { at }) => cron.matches(at),
            _ => false,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Push { branches } if branches.is_empty() => f.write_str("push"),
            Trigger::Push { branches } => {
                let patterns: Vec<&str> = branches.iter().map(|b| b.pattern()).collect();
                write!(f, "push [{}]", patterns.join(", "))
            }
            Trigger::Schedule { cron } => write!(f, "schedule '{}'", cron),
        }
    }
}
