use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;
use nix::sys::signal::Signal;

use crate::checker::{CheckerLimits, CheckerStatus, CheckerVerdict};
use crate::judge::logger::JudgeLogger;
use crate::judge::report::{JudgeReport, ReportTest};
use crate::judge::scoring::real_time_limit;
use crate::judge::worker::{
  checked_report, checker_options, classify_solution, solution_options, test_report, JudgeWorkerOptions,
  TestJudge,
};
use crate::package::{PackageLoader, Test};
use crate::sandbox::{ExitStat, FileGrant, Sandbox, Stdio, Termination};
use crate::utils::{read_truncated, OsPipe, PipeEnd};
use crate::JudgeError;

/// Checker side of one interactive test
struct CheckerJob {
  input: PathBuf,
  /// Output of the solution
  stdin: PipeEnd,
  /// Input of the solution
  stdout: PipeEnd,
  real_time_limit: Duration,
}

struct CheckerRun {
  es: ExitStat,
  status: CheckerStatus,
}

type CheckerResult = Result<CheckerRun, JudgeError>;

/// Runs checkers on the jobs it receives until `None` arrives
struct CheckerSupervisor<'a> {
  sandbox: &'a dyn Sandbox,
  options: &'a JudgeWorkerOptions,
  checker: &'a Path,
}

impl<'a> CheckerSupervisor<'a> {
  fn serve(&self, jobs: Receiver<Option<CheckerJob>>, results: Sender<CheckerResult>) {
    while let Ok(Some(job)) = jobs.recv() {
      if results.send(self.run(job)).is_err() {
        break;
      }
    }
    debug!("Checker supervisor finished");
  }

  fn run(&self, job: CheckerJob) -> CheckerResult {
    let limits = CheckerLimits {
      cpu_time_limit: self.options.get_checker_time_limit(),
      real_time_limit: job.real_time_limit,
      memory_limit: *self.options.get_checker_memory_limit(),
    };
    // The checker talks to the solution on stdout, its verdict goes to stderr
    let mut verdict = tempfile::tempfile()?;
    let options = checker_options(&limits)
      .stdin(Stdio::Fd(job.stdin.fd()))
      .stdout(Stdio::Fd(job.stdout.fd()))
      .stderr(Stdio::Fd(verdict.as_raw_fd()));
    let args = vec![job.input.to_string_lossy().into_owned()];
    let grants = [FileGrant::read_only(&job.input)];

    let es = self.sandbox.run(self.checker, &args, &options, &grants);
    // Unblocks a solution still waiting for input
    drop(job);
    let es = es?;

    let output = read_truncated(&mut verdict, self.options.get_checker_output_limit())?;
    let status = CheckerStatus::from_run(&es, &limits, &output);
    debug!("Interactive checker: {} {:?}", es.termination(), status.verdict());
    Ok(CheckerRun { es, status })
  }
}

/// Runs the solution of an interactive problem while the checker supervisor
/// runs the checker of the same test
pub(crate) struct InteractiveJudge<'a> {
  sandbox: &'a dyn Sandbox,
  options: &'a JudgeWorkerOptions,
  package: &'a mut dyn PackageLoader,
  solution: &'a Path,
  jobs: &'a Sender<Option<CheckerJob>>,
  results: &'a Receiver<CheckerResult>,
}

fn supervisor_gone() -> JudgeError {
  JudgeError::exec("Checker supervisor thread exited unexpectedly")
}

impl<'a> TestJudge for InteractiveJudge<'a> {
  fn judge_test(
    &mut self,
    test: &Test,
    logger: &mut dyn JudgeLogger,
  ) -> Result<(ReportTest, f64), JudgeError> {
    let input = self.package.load_as_file(&test.input, "test.in")?;
    let to_checker = OsPipe::new()?;
    let to_solution = OsPipe::new()?;

    let job = CheckerJob {
      input,
      stdin: to_checker.read,
      stdout: to_solution.write,
      real_time_limit: self.options.get_checker_time_limit() + real_time_limit(test.time_limit),
    };
    self.jobs.send(Some(job)).map_err(|_| supervisor_gone())?;

    let options = solution_options(self.options, test)
      .stdin(Stdio::Fd(to_solution.read.fd()))
      .stdout(Stdio::Fd(to_checker.write.fd()))
      .stderr(Stdio::Closed);
    let es = self.sandbox.run(self.solution, &[], &options, &[]);
    // The checker sees EOF once the solution side is closed
    drop(to_solution.read);
    drop(to_checker.write);
    let es = es?;

    let CheckerRun {
      es: checker_es,
      status,
    } = self.results.recv().map_err(|_| supervisor_gone())??;

    let max_comment_len = self.options.get_max_comment_len();
    let killed_by_pipe = es.termination() == Termination::Killed(Signal::SIGPIPE);
    let (report, ratio) = if killed_by_pipe && status.verdict() == CheckerVerdict::Wrong {
      // The checker stopped reading after it found a wrong answer
      checked_report(test, &es, &status, max_comment_len)
    } else if status.verdict() == CheckerVerdict::Error {
      // A failed checker cannot tell who broke the exchange
      checked_report(test, &es, &status, max_comment_len)
    } else if let Some((solution_status, comment)) = classify_solution(&es, test) {
      (test_report(test, &es, solution_status, &comment), 0.0)
    } else {
      checked_report(test, &es, &status, max_comment_len)
    };

    logger.test_with_checker(
      &report,
      &es,
      &checker_es,
      *self.options.get_checker_memory_limit(),
      status.message(),
    );
    Ok((report, ratio))
  }
}

/// Run `judge_tests` with an interactive judge. The checker supervisor thread
/// is stopped and joined on every exit path.
pub(crate) fn judge_interactive<F>(
  sandbox: &dyn Sandbox,
  options: &JudgeWorkerOptions,
  package: &mut dyn PackageLoader,
  checker: &Path,
  solution: &Path,
  judge_tests: F,
) -> Result<JudgeReport, JudgeError>
where
  F: FnOnce(&mut InteractiveJudge<'_>) -> Result<JudgeReport, JudgeError>,
{
  let (job_sender, job_receiver) = bounded::<Option<CheckerJob>>(1);
  let (result_sender, result_receiver) = bounded::<CheckerResult>(1);
  let supervisor = CheckerSupervisor {
    sandbox,
    options,
    checker,
  };

  thread::scope(|scope| {
    let handle = thread::Builder::new()
      .name("checker-supervisor".into())
      .spawn_scoped(scope, move || supervisor.serve(job_receiver, result_sender))?;

    let jobs = scopeguard::guard(job_sender, |jobs| {
      // No more jobs
      let _ = jobs.send(None);
    });
    let result = judge_tests(&mut InteractiveJudge {
      sandbox,
      options,
      package,
      solution,
      jobs: &jobs,
      results: &result_receiver,
    });
    drop(jobs);

    handle
      .join()
      .map_err(|_| JudgeError::exec("Checker supervisor thread panicked"))?;
    result
  })
}
