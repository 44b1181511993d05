use std::env;
use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use flexi_logger::DeferredNow;
use log::Record;

pub use pipe::{ChildStage, ErrorPipe, ErrorReadPipe, ErrorWritePipe, OsPipe, PipeEnd};

use crate::JudgeError;

pub mod pipe;

/// Memory sizes are counted in bytes
pub type MemoryLimitType = u64;

pub const KIB: MemoryLimitType = 1 << 10;

pub const MIB: MemoryLimitType = 1 << 20;

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Task successfully read from conf.json```
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}

pub(crate) fn into_c_string<S: AsRef<str>>(string: S) -> Result<CString, JudgeError> {
  let string = string.as_ref();
  CString::new(string)
    .map_err(|_| JudgeError::exec(format!("Argument contains a nul byte: {:?}", string)))
}

pub(crate) fn path_to_c_string(path: &Path) -> Result<CString, JudgeError> {
  CString::new(path.as_os_str().as_bytes())
    .map_err(|_| JudgeError::exec(format!("Path contains a nul byte: {}", path.display())))
}

/// Read at most `max_len` bytes from the beginning of `file`.
///
/// Trailing whitespace is removed. Longer contents are cut and end with `...`.
pub fn read_truncated(file: &mut File, max_len: usize) -> Result<String, JudgeError> {
  file.seek(SeekFrom::Start(0))?;
  let mut buf = Vec::with_capacity(max_len.min(1 << 16) + 1);
  file.take(max_len as u64 + 1).read_to_end(&mut buf)?;

  if buf.len() > max_len {
    buf.truncate(max_len);
    let dots = max_len.min(3);
    for b in buf[max_len - dots..].iter_mut() {
      *b = b'.';
    }
  } else {
    while buf.last().map_or(false, |b| b.is_ascii_whitespace()) {
      buf.pop();
    }
  }

  Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Truncate `text` to at most `max_len` bytes on a char boundary
pub fn truncate_str(text: &str, max_len: usize) -> &str {
  if text.len() <= max_len {
    return text;
  }
  let mut end = max_len;
  while !text.is_char_boundary(end) {
    end -= 1;
  }
  &text[..end]
}

/// Resolve a program name the way `execvp` does
pub fn find_in_path<P: AsRef<Path>>(program: P) -> Option<PathBuf> {
  let program = program.as_ref();
  if program.components().count() > 1 {
    return Some(program.to_path_buf());
  }
  let paths = env::var_os("PATH")?;
  env::split_paths(&paths)
    .map(|dir| dir.join(program))
    .find(|candidate| {
      candidate
        .metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn it_should_read_and_trim() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"OK\n50\n\n  ").unwrap();
    assert_eq!(read_truncated(&mut file, 512).unwrap(), "OK\n50");
  }

  #[test]
  fn it_should_mark_truncated_output() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"WRONG\nabcdefghijklmnop").unwrap();
    assert_eq!(read_truncated(&mut file, 10).unwrap(), "WRONG\na...");
  }

  #[test]
  fn it_should_truncate_on_char_boundary() {
    assert_eq!(truncate_str("żółw", 3), "ż");
    assert_eq!(truncate_str("abc", 10), "abc");
  }
}
