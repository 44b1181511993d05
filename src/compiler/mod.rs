use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use lazy_static::lazy_static;
use log::{debug, info};

use crate::sandbox::{Sandbox, SandboxOptions, Stdio, TIME_LIMIT_EXCEEDED};
use crate::utils::{find_in_path, read_truncated, MemoryLimitType, KIB, MIB};
use crate::JudgeError;

pub use cache::CompilationCache;

use preset::{
  CompilePreset, C11_PRESET, CPP11_PRESET, CPP14_PRESET, CPP17_PRESET, CPP20_PRESET,
  PASCAL_PRESET, RUST_PRESET,
};

pub mod cache;
mod preset;

/// Source of the checker used when a package does not ship one
pub const DEFAULT_CHECKER_SOURCE: &str = include_str!("default_checker.c");

const SOURCE_BASENAME: &str = "source";

const EXECUTABLE_NAME: &str = "exe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
  C11,
  Cpp11,
  Cpp14,
  Cpp17,
  Cpp20,
  Pascal,
  Rust,
}

lazy_static! {
  static ref DETECT_LANGUAGE_MAP: HashMap<&'static str, Language> = {
    let mut map = HashMap::new();
    map.insert("c", Language::C11);
    map.insert("c11", Language::C11);
    map.insert("cc", Language::Cpp17);
    map.insert("cpp", Language::Cpp17);
    map.insert("cxx", Language::Cpp17);
    map.insert("c++", Language::Cpp17);
    map.insert("cpp11", Language::Cpp11);
    map.insert("cpp14", Language::Cpp14);
    map.insert("cpp17", Language::Cpp17);
    map.insert("cpp20", Language::Cpp20);
    map.insert("pas", Language::Pascal);
    map.insert("pascal", Language::Pascal);
    map.insert("rs", Language::Rust);
    map.insert("rust", Language::Rust);
    map
  };
}

impl Language {
  /// Detect from the extension of `path`
  pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Language> {
    let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    DETECT_LANGUAGE_MAP.get(ext.as_str()).copied()
  }

  /// Use the `language` name if given, otherwise detect from `path`
  pub fn detect<P: AsRef<Path>>(language: Option<&str>, path: P) -> Result<Language, JudgeError> {
    match language {
      Some(language) => language.parse(),
      None => Language::from_path(&path).ok_or_else(|| {
        JudgeError::compile(format!(
          "Can not detect language of {}",
          path.as_ref().display()
        ))
      }),
    }
  }

  fn preset(&self) -> &'static CompilePreset {
    match self {
      Language::C11 => &*C11_PRESET,
      Language::Cpp11 => &*CPP11_PRESET,
      Language::Cpp14 => &*CPP14_PRESET,
      Language::Cpp17 => &*CPP17_PRESET,
      Language::Cpp20 => &*CPP20_PRESET,
      Language::Pascal => &*PASCAL_PRESET,
      Language::Rust => &*RUST_PRESET,
    }
  }
}

impl FromStr for Language {
  type Err = JudgeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    DETECT_LANGUAGE_MAP
      .get(s.to_ascii_lowercase().as_str())
      .copied()
      .ok_or_else(|| JudgeError::compile(format!("Unknown language `{}`", s)))
  }
}

impl Display for Language {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Language::C11 => "C11",
      Language::Cpp11 => "C++11",
      Language::Cpp14 => "C++14",
      Language::Cpp17 => "C++17",
      Language::Cpp20 => "C++20",
      Language::Pascal => "Pascal",
      Language::Rust => "Rust",
    };
    f.write_str(name)
  }
}

fn modified(path: &Path) -> Result<SystemTime, JudgeError> {
  Ok(fs::metadata(path)?.modified()?)
}

/// Runs toolchains inside the sandbox. Each compilation starts from an empty build directory.
pub struct Compiler {
  sandbox: Arc<dyn Sandbox>,
  build_dir: PathBuf,
  time_limit: Duration,
  memory_limit: MemoryLimitType,
  errors_limit: usize,
}

impl Compiler {
  pub fn new<P: Into<PathBuf>>(sandbox: Arc<dyn Sandbox>, build_dir: P) -> Self {
    Compiler {
      sandbox,
      build_dir: build_dir.into(),
      time_limit: Duration::from_secs(30),
      memory_limit: 1024 * MIB,
      errors_limit: (32 * KIB) as usize,
    }
  }

  /// Set both CPU and wall clock limit of the compiler
  pub fn time_limit(mut self, value: Duration) -> Self {
    self.time_limit = value;
    self
  }

  pub fn memory_limit(mut self, value: MemoryLimitType) -> Self {
    self.memory_limit = value;
    self
  }

  /// Max length of returned diagnostics (unit: bytes)
  pub fn errors_limit(mut self, value: usize) -> Self {
    self.errors_limit = value;
    self
  }

  fn locate(&self, language: Language) -> Result<PathBuf, JudgeError> {
    let program = language.preset().program;
    find_in_path(program).ok_or_else(|| {
      JudgeError::compile(format!("Compiler `{}` for {} is not installed", program, language))
    })
  }

  /// Compile `source` into `executable`. Diagnostics of a failed compilation are
  /// returned as `JudgeError::Compile`.
  pub fn compile(&self, source: &Path, language: Language, executable: &Path) -> Result<(), JudgeError> {
    let compiler = self.locate(language)?;
    self.compile_with(&compiler, source, language, executable)
  }

  /// Like `compile`, but reuse the artifact cached as `cached_name` when it is
  /// newer than both the source and the compiler
  pub fn compile_cached(
    &self,
    source: &Path,
    language: Language,
    executable: &Path,
    cache: &CompilationCache,
    cached_name: &str,
  ) -> Result<(), JudgeError> {
    let compiler = self.locate(language)?;
    let newer_than = modified(source)?.max(modified(&compiler)?);
    if cache.copy_if_newer(cached_name, executable, newer_than)? {
      info!("Using cached {} for {}", cached_name, source.display());
      return Ok(());
    }

    self.compile_with(&compiler, source, language, executable)?;
    cache.cache_file(cached_name, executable)
  }

  fn compile_with(
    &self,
    compiler: &Path,
    source: &Path,
    language: Language,
    executable: &Path,
  ) -> Result<(), JudgeError> {
    let preset = language.preset();
    remove_dir_all::ensure_empty_dir(&self.build_dir)?;

    let source_name = format!("{}.{}", SOURCE_BASENAME, preset.extension);
    fs::copy(source, self.build_dir.join(&source_name)).map_err(|err| {
      JudgeError::compile(format!("Failed to read source {}: {}", source.display(), err))
    })?;

    let mut errors = tempfile::tempfile()?;
    let options = SandboxOptions::new()
      .stdout(Stdio::Fd(errors.as_raw_fd()))
      .stderr(Stdio::Fd(errors.as_raw_fd()))
      .cpu_time_limit(self.time_limit)
      .real_time_limit(self.time_limit)
      .memory_limit(self.memory_limit)
      .disable_syscall_filter()
      .cwd(&self.build_dir);
    let args = preset.arguments(&source_name, EXECUTABLE_NAME);

    info!("Compiling {} as {}", source.display(), language);
    let es = self.sandbox.run(compiler, &args, &options, &[])?;
    debug!("Compiler {} {}: {:?}", compiler.display(), args.join(" "), es);

    let built = self.build_dir.join(EXECUTABLE_NAME);
    if es.is_ok() && built.is_file() {
      fs::copy(&built, executable)?;
      return Ok(());
    }

    let diagnostics = read_truncated(&mut errors, self.errors_limit)?;
    let cause = if es.is_ok() {
      Some(format!("{} did not produce an executable", preset.program))
    } else if es.message() == TIME_LIMIT_EXCEEDED || es.runtime() >= self.time_limit {
      Some("Compilation time limit exceeded".to_string())
    } else if es.is_memory_limit_exceeded() {
      Some("Compilation memory limit exceeded".to_string())
    } else {
      None
    };
    let diagnostics = match cause {
      Some(cause) if diagnostics.is_empty() => cause,
      Some(cause) => format!("{}\n{}", cause, diagnostics),
      None => diagnostics,
    };
    info!("Compilation of {} failed", source.display());
    Err(JudgeError::compile(diagnostics))
  }
}
