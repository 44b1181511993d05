use std::fmt::{Display, Formatter};
use std::os::unix::prelude::RawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::utils::MemoryLimitType;
use crate::JudgeError;

pub use ptrace::PtraceSandbox;
pub use syscall::{Arch, SyscallFilter};

mod proc;
mod ptrace;
mod syscall;
mod watchdog;

pub const MEMORY_LIMIT_EXCEEDED: &str = "Memory limit exceeded";

pub const TIME_LIMIT_EXCEEDED: &str = "Time limit exceeded";

/// Runs in the forked child right before `exec`. It must not allocate.
pub type PreExecHook = fn() -> nix::Result<()>;

/// Process isolation backend
pub trait Sandbox: Send + Sync {
  /// Run `executable` with `args` (`argv[0]` is the executable itself) and wait for it
  fn run(
    &self,
    executable: &Path,
    args: &[String],
    options: &SandboxOptions,
    grants: &[FileGrant],
  ) -> Result<ExitStat, JudgeError>;
}

/// Where a standard descriptor of the sandboxed process comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stdio {
  /// Keep the descriptor of the current process
  Inherit,
  Closed,
  Fd(RawFd),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
  ReadOnly,
  WriteOnly,
  ReadWrite,
}

/// A file the sandboxed program may additionally open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGrant {
  path: PathBuf,
  mode: AccessMode,
}

/// Sandbox running options
#[derive(Debug, Clone)]
pub struct SandboxOptions {
  stdin: Stdio,
  stdout: Stdio,
  stderr: Stdio,
  real_time_limit: Option<Duration>,
  cpu_time_limit: Option<Duration>,
  memory_limit: Option<MemoryLimitType>,
  output_size_limit: Option<MemoryLimitType>,
  syscall_filter: bool,
  cwd: Option<PathBuf>,
  pre_exec: Option<PreExecHook>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
  Exited(i32),
  Killed(Signal),
  Dumped(Signal),
}

/// The result of one sandboxed run
#[derive(Debug, Clone, PartialEq)]
pub struct ExitStat {
  termination: Termination,
  cpu_runtime: Duration,
  runtime: Duration,
  peak_memory: MemoryLimitType,
  message: String,
}

impl FileGrant {
  pub fn new<P: Into<PathBuf>>(path: P, mode: AccessMode) -> Self {
    FileGrant {
      path: path.into(),
      mode,
    }
  }

  pub fn read_only<P: Into<PathBuf>>(path: P) -> Self {
    FileGrant::new(path, AccessMode::ReadOnly)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn mode(&self) -> AccessMode {
    self.mode
  }

  /// Whether `requested` access is covered by this grant
  pub fn permits(&self, requested: AccessMode) -> bool {
    self.mode == AccessMode::ReadWrite || self.mode == requested
  }
}

impl Default for SandboxOptions {
  fn default() -> Self {
    SandboxOptions::new()
  }
}

impl SandboxOptions {
  pub fn new() -> Self {
    SandboxOptions {
      stdin: Stdio::Closed,
      stdout: Stdio::Closed,
      stderr: Stdio::Closed,
      real_time_limit: None,
      cpu_time_limit: None,
      memory_limit: None,
      output_size_limit: None,
      syscall_filter: true,
      cwd: None,
      pre_exec: None,
    }
  }

  /// Set stdin redirection
  pub fn stdin(mut self, stdio: Stdio) -> Self {
    self.stdin = stdio;
    self
  }

  /// Set stdout redirection
  pub fn stdout(mut self, stdio: Stdio) -> Self {
    self.stdout = stdio;
    self
  }

  /// Set stderr redirection
  pub fn stderr(mut self, stdio: Stdio) -> Self {
    self.stderr = stdio;
    self
  }

  /// Set wall clock time limit
  pub fn real_time_limit(mut self, value: Duration) -> Self {
    self.real_time_limit = Some(value);
    self
  }

  /// Set CPU time limit
  pub fn cpu_time_limit(mut self, value: Duration) -> Self {
    self.cpu_time_limit = Some(value);
    self
  }

  /// Set memory limit (unit: bytes)
  pub fn memory_limit(mut self, value: MemoryLimitType) -> Self {
    self.memory_limit = Some(value);
    self
  }

  /// Set memory limit (unit: bytes) or do nothing
  pub fn set_memory_limit(mut self, value: Option<MemoryLimitType>) -> Self {
    self.memory_limit = value;
    self
  }

  /// Set max size of created files (unit: bytes)
  pub fn output_size_limit(mut self, value: MemoryLimitType) -> Self {
    self.output_size_limit = Some(value);
    self
  }

  /// Run without syscall restriction
  pub fn disable_syscall_filter(mut self) -> Self {
    self.syscall_filter = false;
    self
  }

  /// Set working directory of the child
  pub fn cwd<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.cwd = Some(path.into());
    self
  }

  pub fn pre_exec(mut self, hook: PreExecHook) -> Self {
    self.pre_exec = Some(hook);
    self
  }

  pub fn get_stdin(&self) -> Stdio {
    self.stdin
  }

  pub fn get_stdout(&self) -> Stdio {
    self.stdout
  }

  pub fn get_stderr(&self) -> Stdio {
    self.stderr
  }

  pub fn get_real_time_limit(&self) -> &Option<Duration> {
    &self.real_time_limit
  }

  pub fn get_cpu_time_limit(&self) -> &Option<Duration> {
    &self.cpu_time_limit
  }

  pub fn get_memory_limit(&self) -> &Option<MemoryLimitType> {
    &self.memory_limit
  }

  pub fn get_output_size_limit(&self) -> &Option<MemoryLimitType> {
    &self.output_size_limit
  }

  pub fn is_syscall_filter_enabled(&self) -> bool {
    self.syscall_filter
  }

  pub fn get_cwd(&self) -> &Option<PathBuf> {
    &self.cwd
  }

  pub fn get_pre_exec(&self) -> &Option<PreExecHook> {
    &self.pre_exec
  }
}

impl Termination {
  pub fn is_ok(&self) -> bool {
    *self == Termination::Exited(0)
  }

  pub fn signal(&self) -> Option<Signal> {
    match self {
      Termination::Exited(_) => None,
      Termination::Killed(signal) | Termination::Dumped(signal) => Some(*signal),
    }
  }
}

impl Display for Termination {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Termination::Exited(code) => write!(f, "exited with {}", code),
      Termination::Killed(signal) => write!(
        f,
        "killed by signal {} - {}",
        *signal as i32,
        describe_signal(*signal)
      ),
      Termination::Dumped(signal) => write!(
        f,
        "killed and dumped by signal {} - {}",
        *signal as i32,
        describe_signal(*signal)
      ),
    }
  }
}

/// Human readable signal description, as strsignal(3) gives
pub fn describe_signal(signal: Signal) -> &'static str {
  match signal {
    Signal::SIGSEGV => "Segmentation fault",
    Signal::SIGABRT => "Aborted",
    Signal::SIGKILL => "Killed",
    Signal::SIGPIPE => "Broken pipe",
    Signal::SIGFPE => "Floating point exception",
    Signal::SIGBUS => "Bus error",
    Signal::SIGILL => "Illegal instruction",
    Signal::SIGTERM => "Terminated",
    Signal::SIGXCPU => "CPU time limit exceeded",
    Signal::SIGXFSZ => "File size limit exceeded",
    Signal::SIGSYS => "Bad system call",
    Signal::SIGTRAP => "Trace/breakpoint trap",
    Signal::SIGALRM => "Alarm clock",
    Signal::SIGINT => "Interrupt",
    Signal::SIGHUP => "Hangup",
    other => other.as_str(),
  }
}

impl ExitStat {
  /// Build an exit status; an empty `message` is derived from `termination`
  pub fn new<MS: Into<String>>(
    termination: Termination,
    cpu_runtime: Duration,
    runtime: Duration,
    peak_memory: MemoryLimitType,
    message: MS,
  ) -> Self {
    let message = message.into();
    let message = if message.is_empty() && !termination.is_ok() {
      termination.to_string()
    } else {
      message
    };
    ExitStat {
      termination,
      cpu_runtime,
      runtime,
      peak_memory,
      message,
    }
  }

  pub fn termination(&self) -> Termination {
    self.termination
  }

  /// Exited with code 0
  pub fn is_ok(&self) -> bool {
    self.termination.is_ok()
  }

  pub fn cpu_runtime(&self) -> Duration {
    self.cpu_runtime
  }

  pub fn runtime(&self) -> Duration {
    self.runtime
  }

  pub fn peak_memory(&self) -> MemoryLimitType {
    self.peak_memory
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn is_memory_limit_exceeded(&self) -> bool {
    self.message == MEMORY_LIMIT_EXCEEDED
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_describe_termination() {
    let es = ExitStat::new(
      Termination::Killed(Signal::SIGSEGV),
      Duration::ZERO,
      Duration::ZERO,
      0,
      "",
    );
    assert_eq!(es.message(), "killed by signal 11 - Segmentation fault");

    let es = ExitStat::new(
      Termination::Dumped(Signal::SIGABRT),
      Duration::ZERO,
      Duration::ZERO,
      0,
      "",
    );
    assert_eq!(es.message(), "killed and dumped by signal 6 - Aborted");

    let es = ExitStat::new(Termination::Exited(3), Duration::ZERO, Duration::ZERO, 0, "");
    assert_eq!(es.message(), "exited with 3");

    let es = ExitStat::new(Termination::Exited(0), Duration::ZERO, Duration::ZERO, 0, "");
    assert!(es.is_ok());
    assert_eq!(es.message(), "");
  }

  #[test]
  fn it_should_check_grants() {
    let grant = FileGrant::read_only("/tmp/in");
    assert!(grant.permits(AccessMode::ReadOnly));
    assert!(!grant.permits(AccessMode::WriteOnly));
    assert!(FileGrant::new("/tmp/x", AccessMode::ReadWrite).permits(AccessMode::WriteOnly));
  }
}
