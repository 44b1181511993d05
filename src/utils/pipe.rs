use std::fmt::{Display, Formatter};
use std::os::unix::prelude::RawFd;

use nix::{
  errno::Errno,
  fcntl::OFlag,
  unistd::{self, close, pipe2},
};

use crate::error::JudgeError;

/// Steps of the forked child before `exec`, reported back on failure
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStage {
  SetPgid = 1,
  Chdir,
  SetRlimit,
  Redirect,
  Signals,
  PreExec,
  Traceme,
  Raise,
  Exec,
}

/// Close-on-exec pipe used by the forked child to report setup errors
pub struct ErrorPipe(RawFd, RawFd);

pub struct ErrorReadPipe(RawFd);

pub struct ErrorWritePipe(RawFd);

/// Owned end of an OS pipe, closed on drop
#[derive(Debug)]
pub struct PipeEnd(RawFd);

pub struct OsPipe {
  pub read: PipeEnd,
  pub write: PipeEnd,
}

impl ChildStage {
  fn from_u8(value: u8) -> Option<ChildStage> {
    let stage = match value {
      1 => ChildStage::SetPgid,
      2 => ChildStage::Chdir,
      3 => ChildStage::SetRlimit,
      4 => ChildStage::Redirect,
      5 => ChildStage::Signals,
      6 => ChildStage::PreExec,
      7 => ChildStage::Traceme,
      8 => ChildStage::Raise,
      9 => ChildStage::Exec,
      _ => return None,
    };
    Some(stage)
  }
}

impl Display for ChildStage {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      ChildStage::SetPgid => "setpgid()",
      ChildStage::Chdir => "chdir()",
      ChildStage::SetRlimit => "setrlimit()",
      ChildStage::Redirect => "redirecting stdio",
      ChildStage::Signals => "resetting signals",
      ChildStage::PreExec => "pre-exec hook",
      ChildStage::Traceme => "ptrace(PTRACE_TRACEME)",
      ChildStage::Raise => "raise(SIGSTOP)",
      ChildStage::Exec => "execvp()",
    };
    f.write_str(name)
  }
}

impl ErrorPipe {
  pub fn new() -> Result<Self, JudgeError> {
    let result = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
    Ok(ErrorPipe(result.0, result.1))
  }

  pub fn read(self) -> Result<ErrorReadPipe, JudgeError> {
    close(self.1)?;
    Ok(ErrorReadPipe(self.0))
  }

  /// Keep the write end; called in the child, so it must not allocate
  pub fn write(self) -> ErrorWritePipe {
    let _ = close(self.0);
    ErrorWritePipe(self.1)
  }
}

impl ErrorReadPipe {
  /// Read the failure reported by the child, if any
  pub fn read(&self) -> Result<Option<(ChildStage, Errno)>, JudgeError> {
    let mut buf = [0u8; 5];
    let size = match unistd::read(self.0, &mut buf) {
      Ok(size) => size,
      Err(Errno::EAGAIN) => 0,
      Err(errno) => return Err(errno.into()),
    };
    if size < buf.len() {
      return Ok(None);
    }
    let stage = ChildStage::from_u8(buf[0]);
    let errno = i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
    Ok(stage.map(|stage| (stage, Errno::from_i32(errno))))
  }
}

impl Drop for ErrorReadPipe {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl ErrorWritePipe {
  pub fn write(&self, stage: ChildStage, errno: Errno) {
    let code = (errno as i32).to_le_bytes();
    let buf = [stage as u8, code[0], code[1], code[2], code[3]];
    let _ = unistd::write(self.0, &buf);
  }
}

impl Drop for ErrorWritePipe {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl OsPipe {
  pub fn new() -> Result<Self, JudgeError> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
    Ok(OsPipe {
      read: PipeEnd(read),
      write: PipeEnd(write),
    })
  }
}

impl PipeEnd {
  pub fn fd(&self) -> RawFd {
    self.0
  }
}

impl Drop for PipeEnd {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}
