use std::time::Duration;

use crate::sandbox::{ExitStat, MEMORY_LIMIT_EXCEEDED, TIME_LIMIT_EXCEEDED};
use crate::utils::MemoryLimitType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerVerdict {
  Ok,
  Wrong,
  Error,
}

/// Decoded verdict of a checker run
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerStatus {
  verdict: CheckerVerdict,
  score_ratio: f64,
  message: String,
}

/// Limits the checker was run with, used to classify its failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckerLimits {
  pub cpu_time_limit: Duration,
  pub real_time_limit: Duration,
  pub memory_limit: Option<MemoryLimitType>,
}

fn split_line(text: &str) -> (&str, &str) {
  match text.split_once('\n') {
    Some((line, rest)) => (line, rest),
    None => (text, ""),
  }
}

/// Non-negative decimal number without sign or exponent
fn parse_percentage(text: &str) -> Option<f64> {
  let mut digits = 0;
  let mut dots = 0;
  for c in text.chars() {
    match c {
      '0'..='9' => digits += 1,
      '.' => dots += 1,
      _ => return None,
    }
  }
  if digits == 0 || dots > 1 {
    return None;
  }
  text.parse::<f64>().ok()
}

impl CheckerStatus {
  pub fn ok<MS: Into<String>>(score_ratio: f64, message: MS) -> Self {
    CheckerStatus {
      verdict: CheckerVerdict::Ok,
      score_ratio: score_ratio.clamp(0.0, 1.0),
      message: message.into(),
    }
  }

  pub fn wrong<MS: Into<String>>(message: MS) -> Self {
    CheckerStatus {
      verdict: CheckerVerdict::Wrong,
      score_ratio: 0.0,
      message: message.into(),
    }
  }

  pub fn error<MS: Into<String>>(message: MS) -> Self {
    CheckerStatus {
      verdict: CheckerVerdict::Error,
      score_ratio: 0.0,
      message: message.into(),
    }
  }

  pub fn verdict(&self) -> CheckerVerdict {
    self.verdict
  }

  /// Meaningful for `Ok` only
  pub fn score_ratio(&self) -> f64 {
    self.score_ratio
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  /// Decode the stdout of a checker that exited with code 0.
  ///
  /// ```text
  /// OK|WRONG
  /// [percentage of the score]
  /// [comment...]
  /// ```
  pub fn parse(output: &str) -> CheckerStatus {
    let (first, rest) = split_line(output);
    let (second, comment) = split_line(rest);
    let percentage = if second.is_empty() {
      Some(100.0)
    } else {
      parse_percentage(second)
    };

    match first {
      "OK" => match percentage {
        Some(percentage) => CheckerStatus::ok(percentage / 100.0, comment.trim_end()),
        None => CheckerStatus::error(format!(
          "Second line of the stdout is invalid: `{}` - it has be to either empty or a real number representing the percentage of score that solution will receive",
          second
        )),
      },
      // The second line does not matter here; if it is not a number it starts the comment
      "WRONG" => match percentage {
        Some(_) => CheckerStatus::wrong(comment.trim_end()),
        None => CheckerStatus::wrong(rest.trim_end()),
      },
      _ => CheckerStatus::error(format!(
        "First line of the stdout is invalid: `{}` - it has to be either `OK` or `WRONG`",
        first
      )),
    }
  }

  /// Classify a finished checker run, decoding `output` only on a clean exit
  pub fn from_run(es: &ExitStat, limits: &CheckerLimits, output: &str) -> CheckerStatus {
    if es.is_ok() {
      return CheckerStatus::parse(output);
    }

    if es.runtime() >= limits.real_time_limit || es.cpu_runtime() >= limits.cpu_time_limit {
      CheckerStatus::error(TIME_LIMIT_EXCEEDED)
    } else if es.is_memory_limit_exceeded()
      || limits.memory_limit.map_or(false, |limit| es.peak_memory() > limit)
    {
      CheckerStatus::error(MEMORY_LIMIT_EXCEEDED)
    } else {
      CheckerStatus::error(format!("Runtime error ({})", es.message()))
    }
  }
}

#[cfg(test)]
mod tests {
  use nix::sys::signal::Signal;

  use super::*;
  use crate::sandbox::Termination;

  fn limits() -> CheckerLimits {
    CheckerLimits {
      cpu_time_limit: Duration::from_secs(10),
      real_time_limit: Duration::from_millis(15500),
      memory_limit: Some(256 << 20),
    }
  }

  #[test]
  fn it_should_accept_ok() {
    let status = CheckerStatus::parse("OK\n");
    assert_eq!(status.verdict(), CheckerVerdict::Ok);
    assert_eq!(status.score_ratio(), 1.0);
    assert_eq!(status.message(), "");

    let status = CheckerStatus::parse("OK");
    assert_eq!(status.verdict(), CheckerVerdict::Ok);
    assert_eq!(status.score_ratio(), 1.0);
  }

  #[test]
  fn it_should_read_percentage_and_comment() {
    let status = CheckerStatus::parse("OK\n50\n");
    assert_eq!(status.verdict(), CheckerVerdict::Ok);
    assert_eq!(status.score_ratio(), 0.5);

    let status = CheckerStatus::parse("OK\n12.5\nPartial answer\nsecond line\n");
    assert_eq!(status.score_ratio(), 0.125);
    assert_eq!(status.message(), "Partial answer\nsecond line");

    let status = CheckerStatus::parse("OK\n\nGood job");
    assert_eq!(status.score_ratio(), 1.0);
    assert_eq!(status.message(), "Good job");

    let status = CheckerStatus::parse("OK\n250\n");
    assert_eq!(status.score_ratio(), 1.0);
  }

  #[test]
  fn it_should_reject_bad_second_line() {
    for output in ["OK\n-5\n", "OK\nabc\n", "OK\n1.2.3\n", "OK\n1e3\n"] {
      let status = CheckerStatus::parse(output);
      assert_eq!(status.verdict(), CheckerVerdict::Error, "{}", output);
      assert!(status.message().starts_with("Second line of the stdout is invalid"));
    }
  }

  #[test]
  fn it_should_accept_wrong() {
    let status = CheckerStatus::parse("WRONG\nExpected 4 got 5\n");
    assert_eq!(status.verdict(), CheckerVerdict::Wrong);
    assert_eq!(status.score_ratio(), 0.0);
    assert_eq!(status.message(), "Expected 4 got 5");

    let status = CheckerStatus::parse("WRONG\n\nLine 3 differs");
    assert_eq!(status.message(), "Line 3 differs");

    let status = CheckerStatus::parse("WRONG\n0\nLine 3 differs");
    assert_eq!(status.message(), "Line 3 differs");
  }

  #[test]
  fn it_should_reject_bad_first_line() {
    let status = CheckerStatus::parse("MAYBE\n");
    assert_eq!(status.verdict(), CheckerVerdict::Error);
    assert_eq!(
      status.message(),
      "First line of the stdout is invalid: `MAYBE` - it has to be either `OK` or `WRONG`"
    );
    assert_eq!(CheckerStatus::parse("").verdict(), CheckerVerdict::Error);
    assert_eq!(CheckerStatus::parse("ok\n").verdict(), CheckerVerdict::Error);
  }

  #[test]
  fn it_should_classify_failed_runs() {
    let es = ExitStat::new(
      Termination::Killed(Signal::SIGKILL),
      Duration::from_secs(10),
      Duration::from_secs(10),
      0,
      TIME_LIMIT_EXCEEDED,
    );
    assert_eq!(
      CheckerStatus::from_run(&es, &limits(), "OK\n"),
      CheckerStatus::error("Time limit exceeded")
    );

    let es = ExitStat::new(
      Termination::Killed(Signal::SIGSEGV),
      Duration::from_millis(5),
      Duration::from_millis(6),
      256 << 20,
      MEMORY_LIMIT_EXCEEDED,
    );
    assert_eq!(
      CheckerStatus::from_run(&es, &limits(), ""),
      CheckerStatus::error("Memory limit exceeded")
    );

    let es = ExitStat::new(
      Termination::Exited(1),
      Duration::from_millis(5),
      Duration::from_millis(6),
      1 << 20,
      "",
    );
    assert_eq!(
      CheckerStatus::from_run(&es, &limits(), "OK\n"),
      CheckerStatus::error("Runtime error (exited with 1)")
    );

    let es = ExitStat::new(
      Termination::Exited(0),
      Duration::from_millis(5),
      Duration::from_millis(6),
      1 << 20,
      "",
    );
    assert_eq!(
      CheckerStatus::from_run(&es, &limits(), "OK\n50"),
      CheckerStatus::ok(0.5, "")
    );
  }
}
