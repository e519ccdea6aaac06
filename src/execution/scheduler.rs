//! Execution scheduling - job concurrency and schedule trigger timing

use crate::core::{Trigger, Workflow};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Strategy for scheduling the jobs of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute jobs in declaration order, one at a time
    #[default]
    Sequential,

    /// Execute all jobs of a run concurrently
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    /// Number of jobs allowed to run at once for a run of `job_count` jobs
    pub fn max_concurrent_jobs(&self, job_count: usize) -> usize {
        let limit = match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => job_count,
            SchedulingStrategy::LimitedParallel(max) => (*max).min(job_count),
        };
        limit.max(1)
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingStrategy::Sequential => f.write_str("sequential"),
            SchedulingStrategy::Parallel => f.write_str("parallel"),
            SchedulingStrategy::LimitedParallel(max) => write!(f, "parallel-limited:{}", max),
        }
    }
}

impl FromStr for SchedulingStrategy {
    type Err = String;

    /// Accepts `sequential`, `parallel` and `parallel-limited[:N]` (N defaults to 2)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, limit) = match s.split_once(':') {
            Some((name, limit)) => (name, Some(limit)),
            None => (s, None),
        };

        match (name.trim().to_lowercase().as_str(), limit) {
            ("sequential", None) => Ok(SchedulingStrategy::Sequential),
            ("parallel", None) => Ok(SchedulingStrategy::Parallel),
            ("parallel-limited", None) => Ok(SchedulingStrategy::LimitedParallel(2)),
            ("parallel-limited", Some(limit)) => match limit.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(SchedulingStrategy::LimitedParallel(n)),
                _ => Err(format!("invalid job limit '{}'", limit)),
            },
            _ => Err(format!(
                "unknown strategy '{}' (expected sequential, parallel or parallel-limited[:N])",
                s
            )),
        }
    }
}

/// Next instant strictly after `after` at which a schedule trigger fires
pub fn next_fire_time(workflow: &Workflow, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    workflow
        .triggers
        .iter()
        .filter_map(|trigger| match trigger {
            Trigger::Schedule { cron } => cron.next_after(after),
            Trigger::Push { .. } => None,
        })
        .min()
}

/// The next `count` fire times of the workflow's schedule triggers
pub fn upcoming_fire_times(workflow: &Workflow, after: &DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    let mut times = Vec::with_capacity(count);
    let mut cursor = *after;
    while times.len() < count {
        match next_fire_time(workflow, &cursor) {
            Some(next) => {
                times.push(next);
                cursor = next;
            }
            None => break,
        }
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parse;
    use chrono::TimeZone;

    #[test]
    fn test_max_concurrent_jobs() {
        assert_eq!(SchedulingStrategy::Sequential.max_concurrent_jobs(4), 1);
        assert_eq!(SchedulingStrategy::Parallel.max_concurrent_jobs(4), 4);
        assert_eq!(SchedulingStrategy::LimitedParallel(2).max_concurrent_jobs(4), 2);
        assert_eq!(SchedulingStrategy::LimitedParallel(8).max_concurrent_jobs(3), 3);
        assert_eq!(SchedulingStrategy::Parallel.max_concurrent_jobs(0), 1);
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("sequential".parse(), Ok(SchedulingStrategy::Sequential));
        assert_eq!("Parallel".parse(), Ok(SchedulingStrategy::Parallel));
        assert_eq!("parallel-limited".parse(), Ok(SchedulingStrategy::LimitedParallel(2)));
        assert_eq!("parallel-limited:4".parse(), Ok(SchedulingStrategy::LimitedParallel(4)));
        assert!("parallel-limited:0".parse::<SchedulingStrategy>().is_err());
        assert!("random".parse::<SchedulingStrategy>().is_err());
    }

    #[test]
    fn test_next_fire_time() {
        let yaml = r#"
on:
  push:
  schedule:
    - cron: "0 6 * * 6"
jobs:
  run_tests:
    runs-on: ubuntu-latest
    steps:
      - run: cargo test
"#;
        let workflow = parse(yaml.as_bytes()).unwrap();
        let friday = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();

        let times = upcoming_fire_times(&workflow, &friday, 2);
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2026, 10, 17, 6, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 10, 24, 6, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_push_only_workflow_has_no_fire_time() {
        let yaml = r#"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: make
"#;
        let workflow = parse(yaml.as_bytes()).unwrap();
        assert_eq!(next_fire_time(&workflow, &Utc::now()), None);
        assert!(upcoming_fire_times(&workflow, &Utc::now(), 3).is_empty());
    }
}
