use std::fs;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use nix::sys::signal::Signal;

use catjudge::sandbox::{MEMORY_LIMIT_EXCEEDED, TIME_LIMIT_EXCEEDED};
use catjudge::utils::{find_in_path, OsPipe, MIB};
use catjudge::{Compiler, Language, PtraceSandbox, Sandbox, SandboxOptions, Stdio, Termination};

mod common;

fn shell(script: &str) -> Vec<String> {
  vec!["-c".to_string(), script.to_string()]
}

fn options() -> SandboxOptions {
  SandboxOptions::new()
    .cpu_time_limit(Duration::from_secs(1))
    .real_time_limit(Duration::from_secs(2))
    .memory_limit(256 * MIB)
    .disable_syscall_filter()
}

#[test]
fn it_should_run_true() {
  common::setup();
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/true"), &[], &options(), &[])
    .unwrap();
  info!("/bin/true: {:?}", es);
  assert!(es.is_ok());
  assert_eq!(es.message(), "");
  assert!(es.peak_memory() > 0);
}

#[test]
fn it_should_report_exit_code() {
  common::setup();
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/sh"), &shell("exit 3"), &options(), &[])
    .unwrap();
  assert_eq!(es.termination(), Termination::Exited(3));
  assert_eq!(es.message(), "exited with 3");
}

#[test]
fn it_should_report_signals() {
  common::setup();
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/sh"), &shell("kill -SEGV $$"), &options(), &[])
    .unwrap();
  assert_eq!(es.termination().signal(), Some(Signal::SIGSEGV));
  assert!(es.message().contains("Segmentation fault"), "{}", es.message());
}

#[test]
fn it_should_redirect_stdio() {
  common::setup();
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("in.txt");
  let output = dir.path().join("out.txt");
  fs::File::create(&input).unwrap().write_all(b"1 2\n").unwrap();
  let stdin = fs::File::open(&input).unwrap();
  let stdout = fs::File::create(&output).unwrap();

  let options = options()
    .stdin(Stdio::Fd(stdin.as_raw_fd()))
    .stdout(Stdio::Fd(stdout.as_raw_fd()))
    .stderr(Stdio::Closed);
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/sh"), &shell("read a b; echo $((a + b))"), &options, &[])
    .unwrap();
  assert!(es.is_ok(), "{}", es.message());
  assert_eq!(fs::read_to_string(output).unwrap(), "3\n");
}

#[test]
fn it_should_kill_on_real_time_limit() {
  common::setup();
  let options = options().real_time_limit(Duration::from_millis(300));
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/sh"), &shell("sleep 5; sleep 5"), &options, &[])
    .unwrap();
  assert!(!es.is_ok());
  assert_eq!(es.message(), TIME_LIMIT_EXCEEDED);
  assert!(es.runtime() >= Duration::from_millis(300));
  assert!(es.runtime() < Duration::from_secs(3));
}

#[test]
fn it_should_kill_on_cpu_time_limit() {
  common::setup();
  let options = options()
    .cpu_time_limit(Duration::from_millis(200))
    .real_time_limit(Duration::from_secs(5));
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/sh"), &shell("while :; do :; done"), &options, &[])
    .unwrap();
  assert!(!es.is_ok());
  assert_eq!(es.message(), TIME_LIMIT_EXCEEDED);
  assert!(es.cpu_runtime() >= Duration::from_millis(200));
}

#[test]
fn it_should_forbid_opening_files() {
  common::setup();
  // A dynamically linked program opens its libraries, which is not granted
  let options = SandboxOptions::new()
    .cpu_time_limit(Duration::from_secs(1))
    .real_time_limit(Duration::from_secs(2))
    .memory_limit(256 * MIB);
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/sh"), &shell("cat /etc/passwd"), &options, &[])
    .unwrap();
  info!("Filtered /bin/sh: {:?}", es);
  assert!(!es.is_ok());
  assert!(es.message().starts_with("forbidden syscall: "), "{}", es.message());
}

#[test]
fn it_should_fail_to_run_missing_program() {
  common::setup();
  let result = PtraceSandbox::new().run(Path::new("/not/a/program"), &[], &options(), &[]);
  assert!(result.is_err());
}

#[test]
fn it_should_run_pre_exec_hook() {
  common::setup();
  fn umask_hook() -> nix::Result<()> {
    nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(0o077));
    Ok(())
  }
  fn failing_hook() -> nix::Result<()> {
    Err(nix::errno::Errno::EPERM)
  }

  let dir = tempfile::tempdir().unwrap();
  let output = dir.path().join("umask.txt");
  let stdout = fs::File::create(&output).unwrap();
  let hooked = options()
    .stdout(Stdio::Fd(stdout.as_raw_fd()))
    .pre_exec(umask_hook);
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/sh"), &shell("umask"), &hooked, &[])
    .unwrap();
  assert!(es.is_ok(), "{}", es.message());
  assert_eq!(fs::read_to_string(output).unwrap().trim(), "0077");

  let failing = options().pre_exec(failing_hook);
  let result = PtraceSandbox::new().run(Path::new("/bin/true"), &[], &failing, &[]);
  assert!(result.is_err());
}

#[test]
fn it_should_restore_default_signal_handlers() {
  common::setup();
  let pipe = OsPipe::new().unwrap();
  let write = pipe.write;
  drop(pipe.read);

  let options = options().stdout(Stdio::Fd(write.fd()));
  let es = PtraceSandbox::new()
    .run(Path::new("/bin/sh"), &shell("echo hello; exit 7"), &options, &[])
    .unwrap();
  info!("Write to a closed pipe: {:?}", es);
  assert_eq!(es.termination(), Termination::Killed(Signal::SIGPIPE));
}

const TOUCH_MEMORY: &str = r#"#include <stdlib.h>
#include <string.h>
int main(int argc, char **argv) {
  size_t size = (size_t)atoi(argv[1]) << 20;
  char *p = malloc(size);
  if (p == NULL) return 3;
  memset(p, 1, size);
  return p[size - 1] == 1 ? 0 : 4;
}
"#;

fn build_touch_memory(dir: &Path) -> Option<PathBuf> {
  if find_in_path("gcc").is_none() {
    info!("gcc is not installed, skipping");
    return None;
  }
  let source = dir.join("touch.c");
  fs::write(&source, TOUCH_MEMORY).unwrap();
  let executable = dir.join("touch");
  Compiler::new(Arc::new(PtraceSandbox::new()), dir.join("build"))
    .compile(&source, Language::C11, &executable)
    .unwrap();
  Some(executable)
}

fn memory_options() -> SandboxOptions {
  SandboxOptions::new()
    .cpu_time_limit(Duration::from_secs(2))
    .real_time_limit(Duration::from_secs(4))
    .memory_limit(64 * MIB)
}

#[test]
fn it_should_measure_memory_below_limit() {
  common::setup();
  let dir = tempfile::tempdir().unwrap();
  let program = match build_touch_memory(dir.path()) {
    Some(program) => program,
    None => return,
  };
  let es = PtraceSandbox::new()
    .run(&program, &["16".to_string()], &memory_options(), &[])
    .unwrap();
  info!("16 MiB under 64 MiB: {:?}", es);
  assert!(es.is_ok(), "{}", es.message());
  assert!(es.peak_memory() >= 16 * MIB);
  assert!(es.peak_memory() < 64 * MIB);
}

#[test]
fn it_should_report_memory_limit_exceeded() {
  common::setup();
  let dir = tempfile::tempdir().unwrap();
  let program = match build_touch_memory(dir.path()) {
    Some(program) => program,
    None => return,
  };
  let es = PtraceSandbox::new()
    .run(&program, &["128".to_string()], &memory_options(), &[])
    .unwrap();
  info!("128 MiB over 64 MiB: {:?}", es);
  assert!(!es.is_ok());
  assert_eq!(es.message(), MEMORY_LIMIT_EXCEEDED);
}
