use std::fmt::Write;
use std::time::Duration;

use log::debug;

use crate::judge::report::{format_seconds, ReportTest, TestStatus};
use crate::package::group_of;
use crate::sandbox::ExitStat;
use crate::utils::MemoryLimitType;

/// Receives the progress of a `judge` call
pub trait JudgeLogger {
  fn begin(&mut self, is_final: bool);

  /// A test whose checker was not run
  fn test(&mut self, test: &ReportTest, es: &ExitStat);

  fn test_with_checker(
    &mut self,
    test: &ReportTest,
    es: &ExitStat,
    checker_es: &ExitStat,
    checker_memory_limit: Option<MemoryLimitType>,
    checker_error: &str,
  );

  fn group_score(&mut self, score: i64, max_score: i64, score_ratio: f64);

  fn final_score(&mut self, total_score: i64, max_score: i64);

  fn end(&mut self);

  /// Text logged since the last `begin`
  fn judge_log(&self) -> &str;
}

/// Human readable judge log, every line is also sent to `log::debug!`
#[derive(Debug, Default)]
pub struct VerboseJudgeLogger {
  log: String,
  is_final: bool,
  after_final_score: bool,
  first_test_after_final_score: bool,
  last_gid: String,
}

fn seconds(duration: Duration) -> String {
  format!("{:.3}", duration.as_secs_f64())
}

impl VerboseJudgeLogger {
  pub fn new() -> Self {
    VerboseJudgeLogger::default()
  }

  fn log(&mut self, line: String) {
    debug!("{}", line);
    self.log.push_str(&line);
    self.log.push('\n');
  }

  fn test_line(&mut self, test: &ReportTest, es: &ExitStat) -> String {
    if self.after_final_score {
      let gid = group_of(&test.name).to_string();
      if self.first_test_after_final_score {
        self.first_test_after_final_score = false;
      } else if gid != self.last_gid {
        self.log(String::new());
      }
      self.last_gid = gid;
    }

    let mut line = format!(
      "  {:<12} {:>4} / {} s  {} / {} KiB  Status: ",
      test.name,
      format_seconds(test.runtime),
      format_seconds(test.time_limit),
      test.memory_consumed >> 10,
      test.memory_limit >> 10
    );
    match test.status {
      TestStatus::RuntimeError => {
        let _ = write!(line, "RTE ({})", es.message());
      }
      TestStatus::CheckerError => line.push_str("CHECKER ERROR (Running OK)"),
      status => line.push_str(status.abbreviation()),
    }
    let _ = write!(
      line,
      " [ CPU: {} RT: {} ]",
      seconds(es.cpu_runtime()),
      seconds(es.runtime())
    );
    line
  }
}

impl JudgeLogger for VerboseJudgeLogger {
  fn begin(&mut self, is_final: bool) {
    self.log.clear();
    self.after_final_score = false;
    self.first_test_after_final_score = false;
    self.is_final = is_final;
    let kind = if is_final { "final" } else { "initial" };
    self.log(format!("Judging ({}): {{", kind));
  }

  fn test(&mut self, test: &ReportTest, es: &ExitStat) {
    let line = self.test_line(test, es);
    self.log(line);
  }

  fn test_with_checker(
    &mut self,
    test: &ReportTest,
    es: &ExitStat,
    checker_es: &ExitStat,
    checker_memory_limit: Option<MemoryLimitType>,
    checker_error: &str,
  ) {
    let mut line = self.test_line(test, es);
    let verdict = match test.status {
      TestStatus::Ok => format!("OK {}", test.comment),
      TestStatus::WrongAnswer => format!("WA {}", test.comment),
      TestStatus::CheckerError => format!("ERROR {}", checker_error),
      _ => {
        self.log(line);
        return;
      }
    };
    let _ = write!(
      line,
      "  Checker: {} [ CPU: {} RT: {} ] {}",
      verdict,
      seconds(checker_es.cpu_runtime()),
      seconds(checker_es.runtime()),
      checker_es.peak_memory() >> 10
    );
    if let Some(limit) = checker_memory_limit {
      let _ = write!(line, " / {} KiB", limit >> 10);
    }
    self.log(line);
  }

  fn group_score(&mut self, score: i64, max_score: i64, score_ratio: f64) {
    self.log(format!(
      "Score: {} / {} (ratio: {:.4})",
      score, max_score, score_ratio
    ));
  }

  fn final_score(&mut self, total_score: i64, max_score: i64) {
    self.after_final_score = true;
    self.first_test_after_final_score = true;
    if self.is_final {
      self.log(format!("Total score: {} / {}", total_score, max_score));
    }
  }

  fn end(&mut self) {
    self.log("}".to_string());
  }

  fn judge_log(&self) -> &str {
    &self.log
  }
}
