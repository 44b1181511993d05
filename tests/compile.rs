use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use catjudge::utils::find_in_path;
use catjudge::{
  CompilationCache, Compiler, JudgeError, JudgeWorker, JudgeWorkerOptions, Language, PtraceSandbox,
  TestStatus, VerboseJudgeLogger,
};

mod common;

const APLUSB: &str = r#"#include <stdio.h>
int main() {
  long long a, b;
  scanf("%lld %lld", &a, &b);
  printf("%lld\n", a + b);
  return 0;
}
"#;

const APLUSB_WA: &str = r#"#include <stdio.h>
int main() {
  long long a, b;
  scanf("%lld %lld", &a, &b);
  printf("%lld\n", a - b);
  return 0;
}
"#;

const SIMFILE: &str = r#"
name: A + B
memory_limit: 64
limits: [
  apb0 1
  apb1a 1
  apb1b 1
  apb2a 1
]
scoring: [0 0, 1 40, 2 60]
tests_files: [
  apb0 tests/0.in tests/0.out
  apb1a tests/1a.in tests/1a.out
  apb1b tests/1b.in tests/1b.out
  apb2a tests/2a.in tests/2a.out
]
"#;

fn has_gcc() -> bool {
  let found = find_in_path("gcc").is_some();
  if !found {
    info!("gcc is not installed, skipping");
  }
  found
}

fn write_package(root: &Path) {
  fs::write(root.join("Simfile"), SIMFILE).unwrap();
  fs::create_dir_all(root.join("tests")).unwrap();
  let cases = [("0", "1 2", "3"), ("1a", "2 2", "4"), ("1b", "5 5", "10"), ("2a", "10 0", "10")];
  for (name, input, output) in cases {
    fs::write(root.join(format!("tests/{}.in", name)), format!("{}\n", input)).unwrap();
    fs::write(root.join(format!("tests/{}.out", name)), format!("{}\n", output)).unwrap();
  }
}

#[test]
fn it_should_compile_c() {
  common::setup();
  if !has_gcc() {
    return;
  }
  let dir = tempfile::tempdir().unwrap();
  let source = dir.path().join("apb.c");
  fs::write(&source, APLUSB).unwrap();
  let executable = dir.path().join("apb");

  let compiler = Compiler::new(Arc::new(PtraceSandbox::new()), dir.path().join("build"));
  compiler.compile(&source, Language::C11, &executable).unwrap();
  assert!(executable.is_file());
}

#[test]
fn it_should_report_compilation_errors() {
  common::setup();
  if !has_gcc() {
    return;
  }
  let dir = tempfile::tempdir().unwrap();
  let source = dir.path().join("broken.c");
  fs::write(&source, "int main() { return undefined_variable; }\n").unwrap();

  let compiler = Compiler::new(Arc::new(PtraceSandbox::new()), dir.path().join("build"))
    .errors_limit(4096);
  match compiler.compile(&source, Language::C11, &dir.path().join("broken")) {
    Err(JudgeError::Compile(diagnostics)) => {
      assert!(diagnostics.contains("undefined_variable"), "{}", diagnostics);
      assert!(diagnostics.len() <= 4096);
    }
    other => panic!("unexpected {:?}", other),
  }
}

#[test]
fn it_should_reuse_cached_builds() {
  common::setup();
  if !has_gcc() {
    return;
  }
  let dir = tempfile::tempdir().unwrap();
  let source = dir.path().join("apb.c");
  fs::write(&source, APLUSB).unwrap();
  let cache = CompilationCache::new(dir.path().join("cache")).max_age(Duration::from_secs(3600));
  let compiler = Compiler::new(Arc::new(PtraceSandbox::new()), dir.path().join("build"));

  let first = dir.path().join("first");
  compiler
    .compile_cached(&source, Language::C11, &first, &cache, "apb")
    .unwrap();
  assert!(cache.cached_path("apb").unwrap().is_file());

  // The build directory is gone, so only the cache can provide the executable
  fs::remove_dir_all(dir.path().join("build")).unwrap();
  let second = dir.path().join("second");
  compiler
    .compile_cached(&source, Language::C11, &second, &cache, "apb")
    .unwrap();
  assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
}

#[test]
fn it_should_judge_aplusb() {
  common::setup();
  if !has_gcc() {
    return;
  }
  let dir = tempfile::tempdir().unwrap();
  write_package(dir.path());
  let correct = dir.path().join("apb.c");
  fs::write(&correct, APLUSB).unwrap();
  let wrong = dir.path().join("apb_wa.c");
  fs::write(&wrong, APLUSB_WA).unwrap();

  let mut worker = JudgeWorker::new(JudgeWorkerOptions::new()).unwrap();
  worker.load_package(dir.path(), None).unwrap();
  worker.compile_checker(None).unwrap();
  let mut logger = VerboseJudgeLogger::new();

  worker.compile_solution(&correct, Language::C11, None).unwrap();
  let initial = worker.judge(false, &mut logger, None).unwrap();
  info!("{}", initial.judge_log);
  assert_eq!(initial.groups[0].tests[0].status, TestStatus::Ok);
  let report = worker.judge(true, &mut logger, None).unwrap();
  info!("{}", report.judge_log);
  assert!(report.groups.iter().flat_map(|g| &g.tests).all(|t| t.status == TestStatus::Ok));
  assert_eq!(report.total_score(), 100);

  // 10 - 0 is still right
  worker.compile_solution(&wrong, Language::C11, None).unwrap();
  let report = worker.judge(true, &mut logger, None).unwrap();
  info!("{}", report.judge_log);
  assert_eq!(report.groups[0].tests[0].status, TestStatus::WrongAnswer);
  assert!(report.groups[0].tests[0].comment.starts_with("Line 1"));
  assert_eq!(report.groups[1].tests[0].status, TestStatus::Ok);
  assert_eq!(report.total_score(), 60);
}
