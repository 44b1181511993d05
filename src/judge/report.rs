use std::fmt::{Display, Formatter, Write};
use std::time::Duration;

use crate::package::Test;
use crate::utils::MemoryLimitType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
  Ok,
  WrongAnswer,
  TimeLimitExceeded,
  MemoryLimitExceeded,
  OutputSizeLimitExceeded,
  RuntimeError,
  CheckerError,
  Skipped,
}

impl TestStatus {
  /// Short form used in logs and dumps
  pub fn abbreviation(&self) -> &'static str {
    match self {
      TestStatus::Ok => "OK",
      TestStatus::WrongAnswer => "WA",
      TestStatus::TimeLimitExceeded => "TLE",
      TestStatus::MemoryLimitExceeded => "MLE",
      TestStatus::OutputSizeLimitExceeded => "OLE",
      TestStatus::RuntimeError => "RTE",
      TestStatus::CheckerError => "CHECKER_ERROR",
      TestStatus::Skipped => "SKIPPED",
    }
  }

  pub fn description(&self) -> &'static str {
    match self {
      TestStatus::Ok => "OK",
      TestStatus::WrongAnswer => "Wrong answer",
      TestStatus::TimeLimitExceeded => "Time limit exceeded",
      TestStatus::MemoryLimitExceeded => "Memory limit exceeded",
      TestStatus::OutputSizeLimitExceeded => "Output size limit exceeded",
      TestStatus::RuntimeError => "Runtime error",
      TestStatus::CheckerError => "Checker error",
      TestStatus::Skipped => "Skipped",
    }
  }
}

impl Display for TestStatus {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.abbreviation())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportTest {
  pub name: String,
  pub status: TestStatus,
  pub runtime: Duration,
  pub time_limit: Duration,
  pub memory_consumed: MemoryLimitType,
  pub memory_limit: MemoryLimitType,
  pub comment: String,
}

impl ReportTest {
  /// Placeholder of a test that was not run
  pub fn skipped(test: &Test) -> Self {
    ReportTest {
      name: test.name.clone(),
      status: TestStatus::Skipped,
      runtime: Duration::ZERO,
      time_limit: test.time_limit,
      memory_consumed: 0,
      memory_limit: test.memory_limit,
      comment: String::new(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportGroup {
  pub tests: Vec<ReportTest>,
  /// In `[0, max_score]`, or `[max_score, 0]` if `max_score` is negative
  pub score: i64,
  pub max_score: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeReport {
  pub groups: Vec<ReportGroup>,
  pub judge_log: String,
}

/// Seconds rounded down to 10 ms, e.g. `1.23`
pub(crate) fn format_seconds(duration: Duration) -> String {
  let centis = duration.as_millis() / 10;
  format!("{}.{:02}", centis / 100, centis % 100)
}

impl JudgeReport {
  pub fn total_score(&self) -> i64 {
    self.groups.iter().map(|group| group.score).sum()
  }

  /// Sum of positive group maxima
  pub fn max_score(&self) -> i64 {
    self
      .groups
      .iter()
      .map(|group| group.max_score)
      .filter(|score| *score > 0)
      .sum()
  }

  pub fn pretty_dump(&self) -> String {
    let mut dump = String::from("{\n");
    for group in &self.groups {
      for test in &group.tests {
        let _ = write!(
          dump,
          "  {:<11}{:>4} / {} s  {} / {} KiB    Status: {}",
          test.name,
          format_seconds(test.runtime),
          format_seconds(test.time_limit),
          test.memory_consumed >> 10,
          test.memory_limit >> 10,
          test.status
        );
        if !test.comment.is_empty() {
          dump.push(' ');
          dump.push_str(&test.comment);
        }
        dump.push('\n');
      }
      let _ = writeln!(dump, "  Score: {} / {}", group.score, group.max_score);
    }
    dump.push('}');
    dump
  }
}
