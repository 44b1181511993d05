use std::env;
use std::fs::{self, File};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use log::{debug, info};
use nix::sys::signal::Signal;
use nix::sys::stat::utimes;
use nix::sys::time::{TimeVal, TimeValLike};
use tempfile::TempDir;

use crate::checker::{CheckerLimits, CheckerStatus, CheckerVerdict};
use crate::compiler::{CompilationCache, Compiler, Language, DEFAULT_CHECKER_SOURCE};
use crate::judge::interactive::judge_interactive;
use crate::judge::logger::JudgeLogger;
use crate::judge::report::{JudgeReport, ReportGroup, ReportTest, TestStatus};
use crate::judge::scoring::{decay_ratio, group_score, is_group_decided, real_time_limit};
use crate::package::{open_package, Group, PackageLoader, Simfile, Test, SIMFILE_NAME};
use crate::sandbox::{ExitStat, FileGrant, PtraceSandbox, Sandbox, SandboxOptions, Stdio};
use crate::utils::{read_truncated, truncate_str, MemoryLimitType, KIB, MIB};
use crate::JudgeError;

const BUILD_DIR: &str = "build";

const CHECKER_NAME: &str = "checker";

const SOLUTION_NAME: &str = "solution";

const SOLUTION_OUTPUT: &str = "solution.out";

const DEFAULT_CHECKER_NAME: &str = "default_checker.c";

/// Judging options
#[derive(Debug, Clone)]
pub struct JudgeWorkerOptions {
  checker_time_limit: Duration,
  checker_memory_limit: Option<MemoryLimitType>,
  score_cut_lambda: f64,
  max_comment_len: usize,
  checker_output_limit: usize,
  output_size_limit: MemoryLimitType,
  compile_time_limit: Duration,
  compile_memory_limit: MemoryLimitType,
  compile_errors_limit: usize,
  cache_dir: Option<PathBuf>,
  cache_max_age: Option<Duration>,
}

impl Default for JudgeWorkerOptions {
  fn default() -> Self {
    JudgeWorkerOptions {
      checker_time_limit: Duration::from_secs(10),
      checker_memory_limit: Some(256 * MIB),
      score_cut_lambda: 2.0 / 3.0,
      max_comment_len: 256,
      checker_output_limit: 512,
      output_size_limit: 1024 * MIB,
      compile_time_limit: Duration::from_secs(30),
      compile_memory_limit: 1024 * MIB,
      compile_errors_limit: (32 * KIB) as usize,
      cache_dir: None,
      cache_max_age: None,
    }
  }
}

impl JudgeWorkerOptions {
  pub fn new() -> Self {
    JudgeWorkerOptions::default()
  }

  pub fn checker_time_limit(mut self, value: Duration) -> Self {
    self.checker_time_limit = value;
    self
  }

  /// `None` runs the checker without memory limit
  pub fn checker_memory_limit(mut self, value: Option<MemoryLimitType>) -> Self {
    self.checker_memory_limit = value;
    self
  }

  /// Fraction of the time limit after which the score starts to decrease, in `[0, 1]`
  pub fn score_cut_lambda(mut self, value: f64) -> Self {
    self.score_cut_lambda = value;
    self
  }

  pub fn max_comment_len(mut self, value: usize) -> Self {
    self.max_comment_len = value;
    self
  }

  pub fn checker_output_limit(mut self, value: usize) -> Self {
    self.checker_output_limit = value;
    self
  }

  pub fn output_size_limit(mut self, value: MemoryLimitType) -> Self {
    self.output_size_limit = value;
    self
  }

  pub fn compile_time_limit(mut self, value: Duration) -> Self {
    self.compile_time_limit = value;
    self
  }

  pub fn compile_memory_limit(mut self, value: MemoryLimitType) -> Self {
    self.compile_memory_limit = value;
    self
  }

  pub fn compile_errors_limit(mut self, value: usize) -> Self {
    self.compile_errors_limit = value;
    self
  }

  /// Enable the compilation cache
  pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.cache_dir = Some(path.into());
    self
  }

  pub fn cache_max_age(mut self, value: Duration) -> Self {
    self.cache_max_age = Some(value);
    self
  }

  pub fn get_checker_time_limit(&self) -> Duration {
    self.checker_time_limit
  }

  pub fn get_checker_memory_limit(&self) -> &Option<MemoryLimitType> {
    &self.checker_memory_limit
  }

  pub fn get_score_cut_lambda(&self) -> f64 {
    self.score_cut_lambda
  }

  pub fn get_max_comment_len(&self) -> usize {
    self.max_comment_len
  }

  pub fn get_checker_output_limit(&self) -> usize {
    self.checker_output_limit
  }

  pub fn get_output_size_limit(&self) -> MemoryLimitType {
    self.output_size_limit
  }

  pub fn get_cache_dir(&self) -> &Option<PathBuf> {
    &self.cache_dir
  }

  pub fn get_cache_max_age(&self) -> &Option<Duration> {
    &self.cache_max_age
  }

  fn validate(&self) -> Result<(), JudgeError> {
    if !(0.0..=1.0).contains(&self.score_cut_lambda) {
      return Err(JudgeError::config(format!(
        "score_cut_lambda has to be in [0, 1], got {}",
        self.score_cut_lambda
      )));
    }
    Ok(())
  }
}

/// Executes one test and reports its checker score ratio
pub(crate) trait TestJudge {
  fn judge_test(
    &mut self,
    test: &Test,
    logger: &mut dyn JudgeLogger,
  ) -> Result<(ReportTest, f64), JudgeError>;
}

/// Sandbox options of a solution run on `test`, without stdio
pub(crate) fn solution_options(options: &JudgeWorkerOptions, test: &Test) -> SandboxOptions {
  SandboxOptions::new()
    .cpu_time_limit(test.time_limit)
    .real_time_limit(real_time_limit(test.time_limit))
    .memory_limit(test.memory_limit)
    .output_size_limit(options.output_size_limit)
}

/// Sandbox options of a checker run, without stdio
pub(crate) fn checker_options(limits: &CheckerLimits) -> SandboxOptions {
  SandboxOptions::new()
    .cpu_time_limit(limits.cpu_time_limit)
    .real_time_limit(limits.real_time_limit)
    .set_memory_limit(limits.memory_limit)
}

/// The failure of a solution run, `None` if it exited cleanly within the limits
pub(crate) fn classify_solution(es: &ExitStat, test: &Test) -> Option<(TestStatus, String)> {
  let real_limit = real_time_limit(test.time_limit);
  let over_time = es.cpu_runtime() >= test.time_limit || es.runtime() >= real_limit;
  let over_memory = es.is_memory_limit_exceeded() || es.peak_memory() > test.memory_limit;
  if es.is_ok() && !over_time && !over_memory {
    return None;
  }

  let status = if over_time {
    TestStatus::TimeLimitExceeded
  } else if over_memory {
    TestStatus::MemoryLimitExceeded
  } else if es.termination().signal() == Some(Signal::SIGXFSZ) {
    TestStatus::OutputSizeLimitExceeded
  } else {
    return Some((
      TestStatus::RuntimeError,
      format!("Runtime error ({})", es.message()),
    ));
  };
  Some((status, status.description().to_string()))
}

pub(crate) fn test_report(test: &Test, es: &ExitStat, status: TestStatus, comment: &str) -> ReportTest {
  let mut runtime = es.cpu_runtime();
  // Killed by the wall clock
  if status == TestStatus::TimeLimitExceeded && runtime < test.time_limit {
    runtime = test.time_limit;
  }
  ReportTest {
    name: test.name.clone(),
    status,
    runtime,
    time_limit: test.time_limit,
    memory_consumed: es.peak_memory(),
    memory_limit: test.memory_limit,
    comment: comment.to_string(),
  }
}

/// Report of a solution that ran fine, judged by `checker`
pub(crate) fn checked_report(
  test: &Test,
  es: &ExitStat,
  checker: &CheckerStatus,
  max_comment_len: usize,
) -> (ReportTest, f64) {
  let comment = truncate_str(checker.message(), max_comment_len);
  match checker.verdict() {
    CheckerVerdict::Ok => (
      test_report(test, es, TestStatus::Ok, comment),
      checker.score_ratio(),
    ),
    CheckerVerdict::Wrong => (test_report(test, es, TestStatus::WrongAnswer, comment), 0.0),
    CheckerVerdict::Error => (test_report(test, es, TestStatus::CheckerError, comment), 0.0),
  }
}

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// Runs the solution on prepared files, then the checker on its output
struct BatchJudge<'a> {
  sandbox: &'a dyn Sandbox,
  options: &'a JudgeWorkerOptions,
  package: &'a mut dyn PackageLoader,
  checker: &'a Path,
  solution: &'a Path,
  scratch: PathBuf,
}

impl<'a> TestJudge for BatchJudge<'a> {
  fn judge_test(
    &mut self,
    test: &Test,
    logger: &mut dyn JudgeLogger,
  ) -> Result<(ReportTest, f64), JudgeError> {
    let input = self.package.load_as_file(&test.input, "test.in")?;
    let es = {
      let stdin = File::open(&input)?;
      let stdout = File::create(&self.scratch)?;
      let options = solution_options(self.options, test)
        .stdin(Stdio::Fd(stdin.as_raw_fd()))
        .stdout(Stdio::Fd(stdout.as_raw_fd()))
        .stderr(Stdio::Closed);
      self.sandbox.run(self.solution, &[], &options, &[])?
    };
    debug!("Solution on test {}: {}", test.name, es.termination());

    if let Some((status, comment)) = classify_solution(&es, test) {
      let report = test_report(test, &es, status, &comment);
      logger.test(&report, &es);
      return Ok((report, 0.0));
    }

    let output = test
      .output
      .as_deref()
      .ok_or_else(|| JudgeError::simfile(format!("Test `{}` has no output file", test.name)))?;
    let expected = self.package.load_as_file(output, "test.out")?;

    let limits = CheckerLimits {
      cpu_time_limit: self.options.checker_time_limit,
      real_time_limit: real_time_limit(self.options.checker_time_limit),
      memory_limit: self.options.checker_memory_limit,
    };
    let mut verdict = tempfile::tempfile()?;
    let options = checker_options(&limits)
      .stdin(Stdio::Closed)
      .stdout(Stdio::Fd(verdict.as_raw_fd()))
      .stderr(Stdio::Closed);
    let args = vec![path_arg(&input), path_arg(&expected), path_arg(&self.scratch)];
    let grants = [
      FileGrant::read_only(&input),
      FileGrant::read_only(&expected),
      FileGrant::read_only(&self.scratch),
    ];
    let checker_es = self.sandbox.run(self.checker, &args, &options, &grants)?;
    let checker_output = read_truncated(&mut verdict, self.options.checker_output_limit)?;
    let status = CheckerStatus::from_run(&checker_es, &limits, &checker_output);

    let (report, ratio) = checked_report(test, &es, &status, self.options.max_comment_len);
    logger.test_with_checker(
      &report,
      &es,
      &checker_es,
      limits.memory_limit,
      status.message(),
    );
    Ok((report, ratio))
  }
}

/// Judge `groups` test by test. Groups that can no longer score are skipped
/// when a partial report is requested, and judged afterwards.
pub(crate) fn process_tests<J: TestJudge + ?Sized>(
  groups: &[&Group],
  is_final: bool,
  score_cut_lambda: f64,
  judge: &mut J,
  logger: &mut dyn JudgeLogger,
  partial_report: Option<&mut dyn FnMut(&JudgeReport)>,
) -> Result<JudgeReport, JudgeError> {
  logger.begin(is_final);
  let mut report = JudgeReport::default();
  let mut has_skipped = false;

  for group in groups {
    let mut report_group = ReportGroup {
      tests: Vec::with_capacity(group.tests.len()),
      score: 0,
      max_score: group.score,
    };
    let mut group_ratio = 1.0_f64;

    let mut tests = group.tests.iter();
    for test in tests.by_ref() {
      let (test_report, ratio) = judge.judge_test(test, logger)?;
      let ratio = decay_ratio(ratio, test_report.runtime, test.time_limit, score_cut_lambda);
      group_ratio = group_ratio.min(ratio);
      report_group.tests.push(test_report);

      if partial_report.is_some() && is_group_decided(group.score, group_ratio) {
        break;
      }
    }
    for test in tests {
      report_group.tests.push(ReportTest::skipped(test));
      has_skipped = true;
    }

    report_group.score = group_score(group.score, group_ratio);
    logger.group_score(report_group.score, group.score, group_ratio);
    report.groups.push(report_group);
  }

  logger.final_score(report.total_score(), report.max_score());

  if let (true, Some(callback)) = (has_skipped, partial_report) {
    report.judge_log = logger.judge_log().to_string();
    callback(&report);

    // The scores are decided, these runs only complete the report
    for (group, report_group) in groups.iter().zip(report.groups.iter_mut()) {
      for (test, test_report) in group.tests.iter().zip(report_group.tests.iter_mut()) {
        if test_report.status == TestStatus::Skipped {
          let (judged, _) = judge.judge_test(test, logger)?;
          *test_report = judged;
        }
      }
    }
  }

  logger.end();
  report.judge_log = logger.judge_log().to_string();
  Ok(report)
}

fn no_package() -> JudgeError {
  JudgeError::package("No package is loaded")
}

/// Judges solutions against a loaded package
pub struct JudgeWorker {
  options: JudgeWorkerOptions,
  sandbox: Arc<dyn Sandbox>,
  tmp_dir: TempDir,
  cache: Option<CompilationCache>,
  package: Option<Box<dyn PackageLoader>>,
  simfile: Option<Simfile>,
  checker: Option<PathBuf>,
  solution: Option<PathBuf>,
}

impl JudgeWorker {
  pub fn new(options: JudgeWorkerOptions) -> Result<Self, JudgeError> {
    JudgeWorker::with_sandbox(options, Arc::new(PtraceSandbox::new()))
  }

  /// Use another isolation backend
  pub fn with_sandbox(
    options: JudgeWorkerOptions,
    sandbox: Arc<dyn Sandbox>,
  ) -> Result<Self, JudgeError> {
    options.validate()?;
    let tmp_dir = tempfile::Builder::new().prefix("catjudge-").tempdir()?;
    let cache = options.cache_dir.as_ref().map(|dir| {
      let cache = CompilationCache::new(dir);
      match options.cache_max_age {
        Some(max_age) => cache.max_age(max_age),
        None => cache,
      }
    });
    debug!("Judge worker directory {}", tmp_dir.path().display());

    Ok(JudgeWorker {
      options,
      sandbox,
      tmp_dir,
      cache,
      package: None,
      simfile: None,
      checker: None,
      solution: None,
    })
  }

  pub fn options(&self) -> &JudgeWorkerOptions {
    &self.options
  }

  pub fn simfile(&self) -> Option<&Simfile> {
    self.simfile.as_ref()
  }

  /// Open the package at `path`. `simfile` replaces the Simfile of the package.
  pub fn load_package<P: AsRef<Path>>(
    &mut self,
    path: P,
    simfile: Option<&str>,
  ) -> Result<(), JudgeError> {
    let loader = open_package(path)?;
    self.load_package_with(loader, simfile)
  }

  pub fn load_package_with(
    &mut self,
    mut loader: Box<dyn PackageLoader>,
    simfile: Option<&str>,
  ) -> Result<(), JudgeError> {
    let simfile = match simfile {
      Some(contents) => Simfile::parse(contents)?,
      None => Simfile::parse(&loader.load_as_str(SIMFILE_NAME)?)?,
    };
    info!(
      "Loaded problem {} ({} groups, {})",
      simfile.name.as_deref().unwrap_or("<unnamed>"),
      simfile.groups.len(),
      if simfile.interactive { "interactive" } else { "batch" }
    );

    self.package = Some(loader);
    self.simfile = Some(simfile);
    self.checker = None;
    Ok(())
  }

  fn compile_into(
    &self,
    source: &Path,
    language: Language,
    executable: &Path,
    cached_name: Option<&str>,
  ) -> Result<(), JudgeError> {
    let compiler = Compiler::new(self.sandbox.clone(), self.tmp_dir.path().join(BUILD_DIR))
      .time_limit(self.options.compile_time_limit)
      .memory_limit(self.options.compile_memory_limit)
      .errors_limit(self.options.compile_errors_limit);
    match (&self.cache, cached_name) {
      (Some(cache), Some(name)) => compiler.compile_cached(source, language, executable, cache, name),
      _ => compiler.compile(source, language, executable),
    }
  }

  /// Write the default checker source, dated like the running binary that embeds it
  fn write_default_checker(&self) -> Result<PathBuf, JudgeError> {
    let source = self.tmp_dir.path().join(DEFAULT_CHECKER_NAME);
    fs::write(&source, DEFAULT_CHECKER_SOURCE)?;
    let built = env::current_exe()
      .and_then(|exe| exe.metadata())
      .and_then(|meta| meta.modified());
    if let Ok(Ok(since_epoch)) = built.map(|time| time.duration_since(UNIX_EPOCH)) {
      let time = TimeVal::microseconds(since_epoch.as_micros() as i64);
      utimes(&source, &time, &time)?;
    }
    Ok(source)
  }

  /// Compile the checker of the loaded package, or the default checker if it has none
  pub fn compile_checker(&mut self, cached_name: Option<&str>) -> Result<(), JudgeError> {
    let checker = self.simfile.as_ref().ok_or_else(no_package)?.checker.clone();
    let (source, language) = match checker {
      Some(path) => {
        let language = Language::detect(None, &path)?;
        let package = self.package.as_mut().ok_or_else(no_package)?;
        (package.load_as_file(&path, "checker_source")?, language)
      }
      None => (self.write_default_checker()?, Language::C11),
    };

    let executable = self.tmp_dir.path().join(CHECKER_NAME);
    self.compile_into(&source, language, &executable, cached_name)?;
    self.checker = Some(executable);
    Ok(())
  }

  pub fn compile_solution(
    &mut self,
    source: &Path,
    language: Language,
    cached_name: Option<&str>,
  ) -> Result<(), JudgeError> {
    let executable = self.tmp_dir.path().join(SOLUTION_NAME);
    self.compile_into(source, language, &executable, cached_name)?;
    self.solution = Some(executable);
    Ok(())
  }

  /// Compile the `index`-th solution listed in the Simfile
  pub fn compile_package_solution(
    &mut self,
    index: usize,
    cached_name: Option<&str>,
  ) -> Result<(), JudgeError> {
    let simfile = self.simfile.as_ref().ok_or_else(no_package)?;
    let path = simfile.solutions.get(index).cloned().ok_or_else(|| {
      JudgeError::package(format!("The package has no solution #{}", index))
    })?;
    let language = Language::detect(None, &path)?;
    let package = self.package.as_mut().ok_or_else(no_package)?;
    let source = package.load_as_file(&path, "solution_source")?;
    self.compile_solution(&source, language, cached_name)
  }

  /// Use a prebuilt checker
  pub fn load_compiled_checker<P: Into<PathBuf>>(&mut self, path: P) {
    self.checker = Some(path.into());
  }

  /// Use a prebuilt solution
  pub fn load_compiled_solution<P: Into<PathBuf>>(&mut self, path: P) {
    self.solution = Some(path.into());
  }

  /// Run the solution with `input` as stdin and `output` as stdout
  pub fn run_solution(
    &self,
    input: &Path,
    output: &Path,
    time_limit: Duration,
    memory_limit: Option<MemoryLimitType>,
  ) -> Result<ExitStat, JudgeError> {
    let solution = self
      .solution
      .as_ref()
      .ok_or_else(|| JudgeError::compile("No solution is compiled"))?;
    let stdin = File::open(input)?;
    let stdout = File::create(output)?;
    let options = SandboxOptions::new()
      .stdin(Stdio::Fd(stdin.as_raw_fd()))
      .stdout(Stdio::Fd(stdout.as_raw_fd()))
      .stderr(Stdio::Closed)
      .cpu_time_limit(time_limit)
      .real_time_limit(real_time_limit(time_limit))
      .set_memory_limit(memory_limit)
      .output_size_limit(self.options.output_size_limit);
    self.sandbox.run(solution, &[], &options, &[])
  }

  /// Judge the compiled solution on the initial (group `0`) or final tests.
  ///
  /// With `partial_report`, groups that already lost their score are reported
  /// as skipped through the callback before they are judged to the end.
  pub fn judge(
    &mut self,
    is_final: bool,
    logger: &mut dyn JudgeLogger,
    partial_report: Option<&mut dyn FnMut(&JudgeReport)>,
  ) -> Result<JudgeReport, JudgeError> {
    let simfile = self.simfile.as_ref().ok_or_else(no_package)?;
    let package = self.package.as_deref_mut().ok_or_else(no_package)?;
    let checker = self
      .checker
      .as_deref()
      .ok_or_else(|| JudgeError::compile("No checker is compiled"))?;
    let solution = self
      .solution
      .as_deref()
      .ok_or_else(|| JudgeError::compile("No solution is compiled"))?;
    let groups: Vec<&Group> = simfile
      .groups
      .iter()
      .filter(|group| group.is_initial() != is_final)
      .collect();
    let lambda = self.options.score_cut_lambda;

    info!(
      "Judging {} tests of {} groups",
      if is_final { "final" } else { "initial" },
      groups.len()
    );

    let report = if simfile.interactive {
      judge_interactive(
        self.sandbox.as_ref(),
        &self.options,
        package,
        checker,
        solution,
        |judge| process_tests(&groups, is_final, lambda, judge, logger, partial_report),
      )?
    } else {
      let mut judge = BatchJudge {
        sandbox: self.sandbox.as_ref(),
        options: &self.options,
        package,
        checker,
        solution,
        scratch: self.tmp_dir.path().join(SOLUTION_OUTPUT),
      };
      process_tests(&groups, is_final, lambda, &mut judge, logger, partial_report)?
    };

    info!(
      "Judging finished with score {} / {}",
      report.total_score(),
      report.max_score()
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sandbox::Termination;

  fn test(name: &str, time_limit_ms: u64) -> Test {
    Test {
      name: name.to_string(),
      input: format!("in/{}.in", name),
      output: Some(format!("out/{}.out", name)),
      time_limit: Duration::from_millis(time_limit_ms),
      memory_limit: 64 * MIB,
    }
  }

  fn exit(termination: Termination, cpu_ms: u64, real_ms: u64, message: &str) -> ExitStat {
    ExitStat::new(
      termination,
      Duration::from_millis(cpu_ms),
      Duration::from_millis(real_ms),
      MIB,
      message,
    )
  }

  #[test]
  fn it_should_classify_solution_runs() {
    let t = test("1a", 1000);
    assert_eq!(classify_solution(&exit(Termination::Exited(0), 200, 250, ""), &t), None);

    let (status, _) = classify_solution(&exit(Termination::Exited(0), 1000, 1100, ""), &t).unwrap();
    assert_eq!(status, TestStatus::TimeLimitExceeded);

    let es = exit(Termination::Killed(Signal::SIGKILL), 300, 2000, "Time limit exceeded");
    let (status, _) = classify_solution(&es, &t).unwrap();
    assert_eq!(status, TestStatus::TimeLimitExceeded);
    let report = test_report(&t, &es, status, "");
    assert_eq!(report.runtime, Duration::from_secs(1));

    let es = exit(Termination::Killed(Signal::SIGKILL), 30, 40, "Memory limit exceeded");
    let (status, comment) = classify_solution(&es, &t).unwrap();
    assert_eq!(status, TestStatus::MemoryLimitExceeded);
    assert_eq!(comment, "Memory limit exceeded");

    let es = exit(Termination::Killed(Signal::SIGXFSZ), 30, 40, "");
    let (status, _) = classify_solution(&es, &t).unwrap();
    assert_eq!(status, TestStatus::OutputSizeLimitExceeded);

    let es = exit(Termination::Exited(3), 30, 40, "");
    assert_eq!(
      classify_solution(&es, &t),
      Some((
        TestStatus::RuntimeError,
        "Runtime error (exited with 3)".to_string()
      ))
    );
  }

  #[test]
  fn it_should_truncate_checker_comments() {
    let t = test("1a", 1000);
    let es = exit(Termination::Exited(0), 10, 10, "");
    let checker = CheckerStatus::wrong("x".repeat(300));
    let (report, ratio) = checked_report(&t, &es, &checker, 256);
    assert_eq!(report.status, TestStatus::WrongAnswer);
    assert_eq!(report.comment.len(), 256);
    assert_eq!(ratio, 0.0);

    let (report, ratio) = checked_report(&t, &es, &CheckerStatus::ok(0.5, "half"), 256);
    assert_eq!(report.status, TestStatus::Ok);
    assert_eq!(report.comment, "half");
    assert_eq!(ratio, 0.5);
  }

  #[test]
  fn it_should_validate_options() {
    assert!(JudgeWorkerOptions::new().validate().is_ok());
    assert!(JudgeWorkerOptions::new().score_cut_lambda(1.5).validate().is_err());
    assert!(JudgeWorkerOptions::new().score_cut_lambda(-0.1).validate().is_err());
    assert!(JudgeWorkerOptions::new().score_cut_lambda(1.0).validate().is_ok());
  }
}
