use std::{
  error::Error,
  fmt::{Debug, Display},
  process::{ExitCode, Termination},
};

use flexi_logger::FlexiLoggerError;
use nix::{errno::Errno, libc::STDOUT_FILENO, unistd::isatty};
use zip::result::ZipError;

pub enum JudgeError {
  Fork(String),
  Exec(String),
  Ptrace(String),
  Nix(Errno),
  Fs(String),
  Package(String),
  Simfile(String),
  Compile(String),
  Config(String),
  Zip(ZipError),
  Cli(String),
  Logger(FlexiLoggerError),
}

pub enum JudgeExit {
  Ok,
  Err(JudgeError),
}

impl JudgeError {
  pub fn fork<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Fork(msg.into())
  }

  pub fn exec<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Exec(msg.into())
  }

  pub fn ptrace<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Ptrace(msg.into())
  }

  pub fn fs<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Fs(msg.into())
  }

  pub fn package<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Package(msg.into())
  }

  pub fn simfile<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Simfile(msg.into())
  }

  pub fn compile<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Compile(msg.into())
  }

  pub fn config<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Config(msg.into())
  }

  pub fn cli<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Cli(msg.into())
  }
}

impl Debug for JudgeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for JudgeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      JudgeError::Fork(msg) => f.write_fmt(format_args!("CatJudge Fork Error: {}", msg)),
      JudgeError::Exec(msg) => f.write_fmt(format_args!("CatJudge Exec Error: {}", msg)),
      JudgeError::Ptrace(msg) => f.write_fmt(format_args!("CatJudge Ptrace Error: {}", msg)),
      JudgeError::Nix(errno) => f.write_fmt(format_args!("CatJudge Nix Error: {}", errno)),
      JudgeError::Fs(msg) => f.write_fmt(format_args!("CatJudge File System Error: {}", msg)),
      JudgeError::Package(msg) => f.write_fmt(format_args!("CatJudge Package Error: {}", msg)),
      JudgeError::Simfile(msg) => f.write_fmt(format_args!("CatJudge Simfile Error: {}", msg)),
      JudgeError::Compile(msg) => f.write_fmt(format_args!("CatJudge Compile Error: {}", msg)),
      JudgeError::Config(msg) => f.write_fmt(format_args!("CatJudge Config Error: {}", msg)),
      JudgeError::Zip(err) => f.write_fmt(format_args!("CatJudge Zip Error: {}", err)),
      JudgeError::Cli(msg) => f.write_fmt(format_args!("CatJudge CLI Error: {}", msg)),
      JudgeError::Logger(err) => f.write_fmt(format_args!("CatJudge Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for JudgeError {
  fn from(errno: Errno) -> Self {
    JudgeError::Nix(errno)
  }
}

impl From<std::io::Error> for JudgeError {
  fn from(err: std::io::Error) -> Self {
    JudgeError::Fs(err.to_string())
  }
}

impl From<ZipError> for JudgeError {
  fn from(err: ZipError) -> Self {
    JudgeError::Zip(err)
  }
}

impl From<FlexiLoggerError> for JudgeError {
  fn from(err: FlexiLoggerError) -> Self {
    JudgeError::Logger(err)
  }
}

impl Error for JudgeError {}

impl From<Result<(), JudgeError>> for JudgeExit {
  fn from(result: Result<(), JudgeError>) -> Self {
    match result {
      Ok(()) => JudgeExit::Ok,
      Err(err) => JudgeExit::Err(err),
    }
  }
}

impl Termination for JudgeExit {
  fn report(self) -> ExitCode {
    match self {
      JudgeExit::Ok => ExitCode::SUCCESS.report(),
      JudgeExit::Err(err) => {
        let text = format!("{}", err);
        let text = match text.split_once(": ") {
          Some((prefix, message)) => {
            let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
            if is_tty {
              format!("\x1b[1m\x1b[91m{}\x1b[39m\x1b[22m  {}", prefix, message)
            } else {
              format!(
                "{{\n  \"ok\": false,\n  \"type\": \"{}\",\n  \"message\": \"{}\"\n}}",
                prefix,
                message.escape_default()
              )
            }
          }
          None => text,
        };
        eprintln!("{}", text);
        ExitCode::FAILURE.report()
      }
    }
  }
}
