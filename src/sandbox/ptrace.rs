use std::ffi::{CStr, CString};
use std::iter::once;
use std::os::unix::prelude::RawFd;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::libc::{self, c_int, rlim_t, user_regs_struct, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::ptrace::{self, Event, Options};
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{
  kill, killpg, raise, signal, sigprocmask, SigHandler, SigSet, SigmaskHow, Signal,
};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{chdir, close, dup2, execvp, fork, setpgid, ForkResult, Pid};
use scopeguard::ScopeGuard;

use crate::sandbox::proc::{detect_arch, read_path, vm_peak, vm_size};
use crate::sandbox::syscall::{SyscallAction, SyscallCall};
use crate::sandbox::watchdog::{Watchdog, WatchdogReport};
use crate::sandbox::{
  Arch, ExitStat, FileGrant, Sandbox, SandboxOptions, Stdio, SyscallFilter, Termination,
  MEMORY_LIMIT_EXCEEDED, TIME_LIMIT_EXCEEDED,
};
use crate::utils::{
  into_c_string, path_to_c_string, ChildStage, ErrorPipe, ErrorWritePipe, MemoryLimitType, KIB,
};
use crate::JudgeError;

/// A SIGSEGV this close to the address space limit is a failed allocation
const MEMORY_SLACK: MemoryLimitType = 64 * KIB;

/// Linux sandbox tracing the child with ptrace(2)
#[derive(Debug, Default, Clone, Copy)]
pub struct PtraceSandbox;

type ResourceLimit = (Resource, rlim_t, rlim_t);

impl PtraceSandbox {
  pub fn new() -> Self {
    PtraceSandbox
  }
}

/// 计算 setrlimit 参数
fn resource_limits(options: &SandboxOptions) -> Vec<ResourceLimit> {
  let mut limits = vec![];

  // 地址空间与栈大小相同
  if let Some(memory_limit) = options.get_memory_limit() {
    limits.push((Resource::RLIMIT_AS, *memory_limit, *memory_limit));
    limits.push((Resource::RLIMIT_STACK, *memory_limit, *memory_limit));
  }

  // 运行时限 + 1 秒，防止逃逸的子进程
  if let Some(cpu_time_limit) = options.get_cpu_time_limit() {
    let seconds = (cpu_time_limit.as_secs_f64()).ceil() as rlim_t + 1;
    limits.push((Resource::RLIMIT_CPU, seconds, seconds + 1));
  }

  if let Some(output_size_limit) = options.get_output_size_limit() {
    limits.push((Resource::RLIMIT_FSIZE, *output_size_limit, *output_size_limit));
  }

  limits
}

fn abort_child(pipe: &ErrorWritePipe, stage: ChildStage, errno: Errno) -> ! {
  pipe.write(stage, errno);
  unsafe { libc::_exit(127) }
}

/// 重定向标准输入输出
fn redirect(target: RawFd, stdio: Stdio) -> nix::Result<()> {
  match stdio {
    Stdio::Inherit => Ok(()),
    Stdio::Closed => match close(target) {
      Ok(()) | Err(Errno::EBADF) => Ok(()),
      Err(errno) => Err(errno),
    },
    // dup2 onto itself keeps FD_CLOEXEC
    Stdio::Fd(fd) if fd == target => fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map(drop),
    Stdio::Fd(fd) => dup2(fd, target).map(drop),
  }
}

fn reset_signals() -> nix::Result<()> {
  for sig in Signal::iterator() {
    if sig == Signal::SIGKILL || sig == Signal::SIGSTOP {
      continue;
    }
    unsafe { signal(sig, SigHandler::SigDfl) }?;
  }
  sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)
}

/// Runs in the forked child: nothing here may allocate
fn exec_child(
  pipe: &ErrorWritePipe,
  program: &CStr,
  argv: &[CString],
  cwd: Option<&CStr>,
  limits: &[ResourceLimit],
  options: &SandboxOptions,
) -> ! {
  if let Err(errno) = setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
    abort_child(pipe, ChildStage::SetPgid, errno);
  }

  if let Some(cwd) = cwd {
    if let Err(errno) = chdir(cwd) {
      abort_child(pipe, ChildStage::Chdir, errno);
    }
  }

  for (resource, soft, hard) in limits {
    if let Err(errno) = setrlimit(*resource, *soft, *hard) {
      abort_child(pipe, ChildStage::SetRlimit, errno);
    }
  }

  let redirects = [
    (STDIN_FILENO, options.get_stdin()),
    (STDOUT_FILENO, options.get_stdout()),
    (STDERR_FILENO, options.get_stderr()),
  ];
  for (target, stdio) in redirects {
    if let Err(errno) = redirect(target, stdio) {
      abort_child(pipe, ChildStage::Redirect, errno);
    }
  }

  // Ignored signals survive exec, and Rust ignores SIGPIPE
  if let Err(errno) = reset_signals() {
    abort_child(pipe, ChildStage::Signals, errno);
  }

  if let Some(hook) = options.get_pre_exec() {
    if let Err(errno) = hook() {
      abort_child(pipe, ChildStage::PreExec, errno);
    }
  }

  if let Err(errno) = ptrace::traceme() {
    abort_child(pipe, ChildStage::Traceme, errno);
  }

  // Wait for the tracer to set options
  if let Err(errno) = raise(Signal::SIGSTOP) {
    abort_child(pipe, ChildStage::Raise, errno);
  }

  match execvp(program, argv) {
    Err(errno) => abort_child(pipe, ChildStage::Exec, errno),
    Ok(never) => match never {},
  }
}

fn wait4(pid: Pid) -> Result<(WaitStatus, libc::rusage), JudgeError> {
  let mut status: c_int = 0;
  let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
  loop {
    let result = unsafe { libc::wait4(pid.as_raw(), &mut status, libc::__WALL, &mut usage) };
    if result == -1 {
      match Errno::last() {
        Errno::EINTR => continue,
        errno => return Err(errno.into()),
      }
    }
    return Ok((WaitStatus::from_raw(pid, status)?, usage));
  }
}

fn timeval_to_duration(tv: &libc::timeval) -> Duration {
  Duration::new(tv.tv_sec as u64, (tv.tv_usec as u32) * 1000)
}

fn resume(pid: Pid, syscalls: bool, signal: Option<Signal>) {
  let result = if syscalls {
    ptrace::syscall(pid, signal)
  } else {
    ptrace::cont(pid, signal)
  };
  if let Err(errno) = result {
    // The tracee may already be gone
    debug!("Resume child process #{}. fails: {}", pid, errno);
  }
}

fn syscall_call(arch: Option<Arch>, regs: &user_regs_struct) -> SyscallCall {
  let args = match arch {
    Some(Arch::I386) => [regs.rbx, regs.rcx, regs.rdx, regs.rsi, regs.rdi, regs.rbp],
    _ => [regs.rdi, regs.rsi, regs.rdx, regs.r10, regs.r8, regs.r9],
  };
  SyscallCall {
    id: regs.orig_rax,
    args,
  }
}

/// What the tracer observed until the child was reaped
struct TraceOutcome {
  termination: Termination,
  usage: libc::rusage,
  /// Cause decided by the tracer: forbidden syscall or memory limit
  verdict: Option<String>,
  peak_memory: MemoryLimitType,
  watchdog: WatchdogReport,
}

fn kill_and_reap(child: Pid) {
  let _ = killpg(child, Signal::SIGKILL);
  let _ = kill(child, Signal::SIGKILL);
  // The exit event stop comes before the child is reaped
  loop {
    match waitpid(child, Some(WaitPidFlag::__WALL)) {
      Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) | Err(_) => break,
      Ok(_) => {
        let _ = ptrace::cont(child, None);
      }
    }
  }
}

/// Supervise the traced child until it is reaped
fn trace(
  child: Pid,
  start: Instant,
  options: &SandboxOptions,
  grants: &[FileGrant],
) -> Result<TraceOutcome, JudgeError> {
  // The child never outlives this call, whatever happens below
  let child = scopeguard::guard(child, kill_and_reap);

  let mut watchdog = Some(Watchdog::start(
    *child,
    *options.get_cpu_time_limit(),
    *options.get_real_time_limit(),
  )?);
  let mut watchdog_report = WatchdogReport::default();

  let mut filter = if options.is_syscall_filter_enabled() {
    Some(SyscallFilter::new(grants))
  } else {
    None
  };
  let syscalls = filter.is_some();

  let mut attached = false;
  let mut entering = true;
  let mut pending: Option<SyscallCall> = None;
  let mut verdict: Option<String> = None;
  let mut peak_memory: MemoryLimitType = 0;

  let kill_group = |pid: Pid, peak_memory: &mut MemoryLimitType| {
    if let Some(peak) = vm_peak(pid) {
      *peak_memory = (*peak_memory).max(peak);
    }
    let _ = killpg(pid, Signal::SIGKILL);
  };

  let (termination, usage) = loop {
    let (status, usage) = wait4(*child)?;

    match status {
      WaitStatus::Exited(pid, code) => {
        debug!("Child process #{}. exited with status {}", pid, code);
        break (Termination::Exited(code), usage);
      }
      WaitStatus::Signaled(pid, signal, dumped) => {
        debug!("Child process #{}. is signaled by {}", pid, signal);
        let termination = if dumped {
          Termination::Dumped(signal)
        } else {
          Termination::Killed(signal)
        };
        break (termination, usage);
      }
      WaitStatus::Stopped(pid, Signal::SIGSTOP) if !attached => {
        attached = true;
        ptrace::setoptions(
          pid,
          Options::PTRACE_O_TRACESYSGOOD
            | Options::PTRACE_O_EXITKILL
            | Options::PTRACE_O_TRACEEXEC
            | Options::PTRACE_O_TRACEEXIT,
        )
        .map_err(|errno| JudgeError::ptrace(format!("ptrace(PTRACE_SETOPTIONS) fails: {}", errno)))?;
        resume(pid, syscalls, None);
      }
      WaitStatus::Stopped(pid, signal) => {
        let deliver = match signal {
          // Group stops would hang the tracee
          Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => None,
          Signal::SIGSEGV => {
            if let (Some(limit), Some(size)) = (options.get_memory_limit(), vm_size(pid)) {
              if size + MEMORY_SLACK >= *limit {
                info!("Child process #{}. hit the memory limit (SIGSEGV)", pid);
                verdict.get_or_insert_with(|| MEMORY_LIMIT_EXCEEDED.to_string());
              }
            }
            Some(signal)
          }
          _ => Some(signal),
        };
        resume(pid, syscalls, deliver);
      }
      WaitStatus::PtraceEvent(pid, _, event) => {
        if event == Event::PTRACE_EVENT_EXEC as c_int {
          if let Some(filter) = filter.as_mut() {
            let arch = detect_arch(pid)?;
            debug!("Child process #{}. runs a {:?} binary", pid, arch);
            filter.on_exec(arch);
          }
        } else if event == Event::PTRACE_EVENT_EXIT as c_int {
          if let Some(peak) = vm_peak(pid) {
            peak_memory = peak_memory.max(peak);
          }
          if let Some(watchdog) = watchdog.take() {
            watchdog_report = watchdog.finish();
          }
        }
        resume(pid, syscalls, None);
      }
      WaitStatus::PtraceSyscall(pid) => {
        if let Some(filter) = filter.as_mut() {
          if verdict.is_none() {
            let regs = match ptrace::getregs(pid) {
              Ok(regs) => regs,
              // Killed by the watchdog meanwhile
              Err(Errno::ESRCH) => continue,
              Err(errno) => return Err(errno.into()),
            };
            if entering {
              let call = syscall_call(filter.arch(), &regs);
              match filter.check(&call, |address| read_path(pid, address)) {
                SyscallAction::Allow => pending = None,
                SyscallAction::CheckResult => pending = Some(call),
                SyscallAction::Forbid(name) => {
                  info!("Child process #{}. is killed for forbidden syscall {}", pid, name);
                  verdict = Some(format!("forbidden syscall: {}", name));
                  kill_group(pid, &mut peak_memory);
                }
              }
            } else if let Some(call) = pending.take() {
              if filter.is_memory_exhausted(&call, regs.rax) {
                info!("Child process #{}. hit the memory limit", pid);
                verdict = Some(MEMORY_LIMIT_EXCEEDED.to_string());
                kill_group(pid, &mut peak_memory);
              }
            }
          }
        }
        entering = !entering;
        resume(pid, syscalls, None);
      }
      WaitStatus::Continued(pid) => resume(pid, syscalls, None),
      WaitStatus::StillAlive => {}
    }
  };

  let child = ScopeGuard::into_inner(child);
  // Forked descendants must not survive the call
  let _ = killpg(child, Signal::SIGKILL);

  if let Some(watchdog) = watchdog.take() {
    watchdog_report = watchdog.finish();
  }
  debug!(
    "Child process #{}. finished in {:?}",
    child,
    start.elapsed()
  );

  Ok(TraceOutcome {
    termination,
    usage,
    verdict,
    peak_memory,
    watchdog: watchdog_report,
  })
}

impl Sandbox for PtraceSandbox {
  fn run(
    &self,
    executable: &Path,
    args: &[String],
    options: &SandboxOptions,
    grants: &[FileGrant],
  ) -> Result<ExitStat, JudgeError> {
    // Everything allocating happens before fork
    let program = path_to_c_string(executable)?;
    let argv = once(Ok::<CString, JudgeError>(program.clone()))
      .chain(args.iter().map(into_c_string))
      .collect::<Result<Vec<CString>, JudgeError>>()?;
    let cwd = match options.get_cwd() {
      Some(cwd) => Some(path_to_c_string(cwd)?),
      None => None,
    };
    let limits = resource_limits(options);
    let pipe = ErrorPipe::new()?;

    debug!("Start running program {} {}", executable.display(), args.join(" "));

    match unsafe { fork() } {
      Ok(ForkResult::Parent { child, .. }) => {
        let start = Instant::now();
        let pipe = pipe.read()?;

        let outcome = trace(child, start, options, grants)?;
        let runtime = start.elapsed();

        if let Some((stage, errno)) = pipe.read()? {
          return Err(JudgeError::exec(format!(
            "{} failed before running {}: {}",
            stage,
            executable.display(),
            errno.desc()
          )));
        }

        let usage = &outcome.usage;
        let cpu_runtime = timeval_to_duration(&usage.ru_utime) + timeval_to_duration(&usage.ru_stime);
        let peak_memory = outcome
          .peak_memory
          .max(outcome.watchdog.peak_memory.unwrap_or(0))
          .max(usage.ru_maxrss as MemoryLimitType * KIB);

        let message = match (outcome.verdict, outcome.watchdog.expired) {
          (Some(verdict), _) => verdict,
          (None, Some(_)) => TIME_LIMIT_EXCEEDED.to_string(),
          (None, None) => String::new(),
        };

        let stat = ExitStat::new(outcome.termination, cpu_runtime, runtime, peak_memory, message);
        debug!(
          "Program {} finished: {} [ CPU: {:?} RT: {:?} ] {} KiB",
          executable.display(),
          stat.termination(),
          stat.cpu_runtime(),
          stat.runtime(),
          stat.peak_memory() >> 10
        );
        Ok(stat)
      }
      Ok(ForkResult::Child) => {
        let pipe = pipe.write();
        exec_child(&pipe, &program, &argv, cwd.as_deref(), &limits, options)
      }
      Err(errno) => Err(JudgeError::fork(format!("fork() failed: {}", errno))),
    }
  }
}

#[cfg(test)]
mod tests {
  use nix::unistd::pause;

  use super::*;

  #[test]
  fn it_should_reap_child_stopped_at_exit_event() {
    let child = match unsafe { fork() }.unwrap() {
      ForkResult::Child => {
        let _ = ptrace::traceme();
        let _ = raise(Signal::SIGSTOP);
        loop {
          pause();
        }
      }
      ForkResult::Parent { child } => child,
    };
    assert_eq!(
      waitpid(child, Some(WaitPidFlag::__WALL)).unwrap(),
      WaitStatus::Stopped(child, Signal::SIGSTOP)
    );
    ptrace::setoptions(child, Options::PTRACE_O_EXITKILL | Options::PTRACE_O_TRACEEXIT).unwrap();
    ptrace::cont(child, None).unwrap();

    kill_and_reap(child);
    assert_eq!(
      waitpid(child, Some(WaitPidFlag::__WALL | WaitPidFlag::WNOHANG)),
      Err(Errno::ECHILD)
    );
  }
}
