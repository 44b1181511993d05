use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::debug;
use path_absolutize::Absolutize;
use tempfile::NamedTempFile;

use crate::JudgeError;

/// Directory of compiled artifacts keyed by name.
///
/// An entry is valid when it is newer than what it was built from and, if
/// `max_age` is set, not older than `max_age`.
#[derive(Debug, Clone)]
pub struct CompilationCache {
  dir: PathBuf,
  max_age: Option<Duration>,
}

impl CompilationCache {
  pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
    CompilationCache {
      dir: dir.into(),
      max_age: None,
    }
  }

  pub fn max_age(mut self, value: Duration) -> Self {
    self.max_age = Some(value);
    self
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Location of the entry `name`, which may not leave the cache directory
  pub fn cached_path(&self, name: &str) -> Result<PathBuf, JudgeError> {
    Path::new(name)
      .absolutize_virtually(&self.dir)
      .map(|path| path.into_owned())
      .map_err(|_| JudgeError::fs(format!("Invalid compilation cache entry name `{}`", name)))
  }

  /// Whether `name` exists and was stored after `newer_than`
  pub fn is_cached(&self, name: &str, newer_than: SystemTime) -> bool {
    let path = match self.cached_path(name) {
      Ok(path) => path,
      Err(_) => return false,
    };
    let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
      Ok(modified) => modified,
      Err(_) => return false,
    };
    if modified < newer_than {
      return false;
    }
    match self.max_age {
      Some(max_age) => SystemTime::now()
        .duration_since(modified)
        .map_or(true, |age| age <= max_age),
      None => true,
    }
  }

  /// Store a copy of `file` as `name`, replacing the previous entry atomically
  pub fn cache_file(&self, name: &str, file: &Path) -> Result<(), JudgeError> {
    let dest = self.cached_path(name)?;
    let parent = dest.parent().unwrap_or(&self.dir);
    fs::create_dir_all(parent)?;

    let tmp = NamedTempFile::new_in(parent)?;
    fs::copy(file, tmp.path())?;
    tmp
      .persist(&dest)
      .map_err(|err| JudgeError::fs(format!("Failed to store {}: {}", dest.display(), err)))?;
    debug!("Cached {} as {}", file.display(), dest.display());
    Ok(())
  }

  /// Copy `name` to `dest` if it is cached and newer than `newer_than`
  pub fn copy_if_newer(
    &self,
    name: &str,
    dest: &Path,
    newer_than: SystemTime,
  ) -> Result<bool, JudgeError> {
    if !self.is_cached(name, newer_than) {
      return Ok(false);
    }
    fs::copy(self.cached_path(name)?, dest)?;
    debug!("Compilation cache hit for {}", name);
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn it_should_cache_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CompilationCache::new(dir.path().join("cache"));
    let mut artifact = NamedTempFile::new_in(dir.path()).unwrap();
    artifact.write_all(b"binary").unwrap();

    let before = SystemTime::now() - Duration::from_secs(60);
    assert!(!cache.is_cached("solutions/1", before));
    cache.cache_file("solutions/1", artifact.path()).unwrap();
    assert!(cache.is_cached("solutions/1", before));
    assert!(!cache.is_cached("solutions/1", SystemTime::now() + Duration::from_secs(60)));

    let dest = dir.path().join("exe");
    assert!(cache.copy_if_newer("solutions/1", &dest, before).unwrap());
    assert_eq!(fs::read(&dest).unwrap(), b"binary");
    assert!(!cache.copy_if_newer("solutions/2", &dest, before).unwrap());
  }

  #[test]
  fn it_should_expire_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CompilationCache::new(dir.path()).max_age(Duration::ZERO);
    let artifact = NamedTempFile::new_in(dir.path()).unwrap();
    cache.cache_file("checker", artifact.path()).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(!cache.is_cached("checker", SystemTime::UNIX_EPOCH));
  }

  #[test]
  fn it_should_keep_entries_inside() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CompilationCache::new(dir.path());
    assert!(cache.cached_path("../escape").is_err());
    assert!(cache.cached_path("ok/name").is_ok());
  }
}
