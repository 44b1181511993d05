use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use log::{debug, info};
use path_absolutize::Absolutize;
use tempfile::TempDir;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::JudgeError;

pub use config::{ConfigFile, ConfigValue};
pub use simfile::{compare_group_ids, compare_test_names, group_of, split_test_name, Group, Simfile, Test};

pub mod config;
pub mod simfile;

/// Name of the package configuration file in the package root
pub const SIMFILE_NAME: &str = "Simfile";

/// Read access to the files of a problem package. Paths are relative to the package root.
pub trait PackageLoader: Send {
  /// Copy the file at `path` to `dest`
  fn load_into_dest_file(&mut self, path: &str, dest: &Path) -> Result<(), JudgeError>;

  /// A path on disk holding the contents of `path`, `hint` names a temporary copy if one is needed
  fn load_as_file(&mut self, path: &str, hint: &str) -> Result<PathBuf, JudgeError>;

  fn load_as_str(&mut self, path: &str) -> Result<String, JudgeError>;
}

fn escaping_path(path: &str) -> JudgeError {
  JudgeError::package(format!("Path `{}` points outside of the package", path))
}

/// Package stored as a plain directory
pub struct DirPackageLoader {
  root: PathBuf,
}

impl DirPackageLoader {
  pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, JudgeError> {
    let root = root.as_ref().absolutize()?.into_owned();
    if !root.is_dir() {
      return Err(JudgeError::package(format!(
        "Package directory {} does not exist",
        root.display()
      )));
    }
    Ok(DirPackageLoader { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn resolve(&self, path: &str) -> Result<PathBuf, JudgeError> {
    let resolved = Path::new(path)
      .absolutize_virtually(&self.root)
      .map_err(|_| escaping_path(path))?;
    Ok(resolved.into_owned())
  }
}

impl PackageLoader for DirPackageLoader {
  fn load_into_dest_file(&mut self, path: &str, dest: &Path) -> Result<(), JudgeError> {
    let source = self.resolve(path)?;
    fs::copy(&source, dest).map_err(|err| {
      JudgeError::package(format!("Failed to copy `{}` from the package: {}", path, err))
    })?;
    Ok(())
  }

  fn load_as_file(&mut self, path: &str, _hint: &str) -> Result<PathBuf, JudgeError> {
    let source = self.resolve(path)?;
    if !source.is_file() {
      return Err(JudgeError::package(format!(
        "File `{}` does not exist in the package",
        path
      )));
    }
    Ok(source)
  }

  fn load_as_str(&mut self, path: &str) -> Result<String, JudgeError> {
    let source = self.resolve(path)?;
    fs::read_to_string(&source).map_err(|err| {
      JudgeError::package(format!("Failed to read `{}` from the package: {}", path, err))
    })
  }
}

/// Package stored as a zip archive. If every entry lives in one top-level
/// directory, that directory is the package root.
pub struct ZipPackageLoader {
  archive: ZipArchive<File>,
  prefix: String,
  tmp_dir: TempDir,
}

/// The single top-level directory shared by all entries, with a trailing slash
fn common_prefix<'a, I: Iterator<Item = &'a str>>(names: I) -> String {
  let mut prefix: Option<&str> = None;
  for name in names {
    let top = match name.split_once('/') {
      Some((top, _)) if !top.is_empty() => top,
      _ => return String::new(),
    };
    match prefix {
      Some(prefix) if prefix != top => return String::new(),
      _ => prefix = Some(top),
    }
  }
  prefix.map(|prefix| format!("{}/", prefix)).unwrap_or_default()
}

impl ZipPackageLoader {
  pub fn new<P: AsRef<Path>>(archive: P) -> Result<Self, JudgeError> {
    let path = archive.as_ref();
    let file = File::open(path).map_err(|err| {
      JudgeError::package(format!("Failed to open package {}: {}", path.display(), err))
    })?;
    let archive = ZipArchive::new(file)?;
    let prefix = common_prefix(archive.file_names());
    debug!(
      "Opened zip package {} with {} entries, root `{}`",
      path.display(),
      archive.len(),
      prefix
    );
    Ok(ZipPackageLoader {
      archive,
      prefix,
      tmp_dir: tempfile::tempdir()?,
    })
  }

  /// Entry name of `path` inside the archive
  fn entry_name(&self, path: &str) -> Result<String, JudgeError> {
    let normalized = Path::new(path)
      .absolutize_virtually("/")
      .map_err(|_| escaping_path(path))?
      .into_owned();
    let parts: Vec<&str> = normalized
      .components()
      .filter_map(|component| match component {
        Component::Normal(part) => part.to_str(),
        _ => None,
      })
      .collect();
    if parts.is_empty() {
      return Err(JudgeError::package(format!("`{}` is not a file path", path)));
    }
    Ok(format!("{}{}", self.prefix, parts.join("/")))
  }

  fn with_entry<T, F>(&mut self, path: &str, f: F) -> Result<T, JudgeError>
  where
    F: FnOnce(&mut dyn Read) -> io::Result<T>,
  {
    let name = self.entry_name(path)?;
    let mut entry = match self.archive.by_name(&name) {
      Ok(entry) => entry,
      Err(ZipError::FileNotFound) => {
        return Err(JudgeError::package(format!(
          "File `{}` does not exist in the package",
          path
        )))
      }
      Err(err) => return Err(err.into()),
    };
    if entry.is_dir() {
      return Err(JudgeError::package(format!("`{}` is a directory", path)));
    }
    f(&mut entry).map_err(|err| {
      JudgeError::package(format!("Failed to extract `{}` from the package: {}", path, err))
    })
  }
}

impl PackageLoader for ZipPackageLoader {
  fn load_into_dest_file(&mut self, path: &str, dest: &Path) -> Result<(), JudgeError> {
    self.with_entry(path, |entry| {
      let mut file = File::create(dest)?;
      io::copy(entry, &mut file)?;
      Ok(())
    })
  }

  fn load_as_file(&mut self, path: &str, hint: &str) -> Result<PathBuf, JudgeError> {
    let dest = self.tmp_dir.path().join(hint);
    self.load_into_dest_file(path, &dest)?;
    Ok(dest)
  }

  fn load_as_str(&mut self, path: &str) -> Result<String, JudgeError> {
    self.with_entry(path, |entry| {
      let mut text = String::new();
      entry.read_to_string(&mut text)?;
      Ok(text)
    })
  }
}

/// Directories are read in place, anything else is opened as a zip archive
pub fn open_package<P: AsRef<Path>>(path: P) -> Result<Box<dyn PackageLoader>, JudgeError> {
  let path = path.as_ref();
  info!("Loading package {}", path.display());
  if path.is_dir() {
    Ok(Box::new(DirPackageLoader::new(path)?))
  } else {
    Ok(Box::new(ZipPackageLoader::new(path)?))
  }
}
