use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;
use std::io::IoSliceMut;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::unistd::Pid;

use crate::sandbox::Arch;
use crate::utils::{MemoryLimitType, KIB};
use crate::JudgeError;

const PATH_MAX: usize = 4096;

const PAGE_SIZE: usize = 4096;

/// Read a `kB` field such as `VmPeak` from `/proc/<pid>/status`, in bytes
fn status_field(pid: Pid, field: &str) -> Option<MemoryLimitType> {
  let status = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
  status
    .lines()
    .find_map(|line| line.strip_prefix(field)?.strip_prefix(':'))
    .and_then(|value| value.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
    .map(|kib| kib * KIB)
}

pub(crate) fn vm_peak(pid: Pid) -> Option<MemoryLimitType> {
  status_field(pid, "VmPeak")
}

pub(crate) fn vm_size(pid: Pid) -> Option<MemoryLimitType> {
  status_field(pid, "VmSize")
}

/// ELF class byte of the running binary: 1 is 32-bit, 2 is 64-bit
pub(crate) fn detect_arch(pid: Pid) -> Result<Arch, JudgeError> {
  let mut header = [0u8; 5];
  File::open(format!("/proc/{}/exe", pid))?.read_exact(&mut header)?;
  match header[4] {
    1 => Ok(Arch::I386),
    2 => Ok(Arch::X86_64),
    class => Err(JudgeError::ptrace(format!(
      "Unknown ELF class {} of traced program",
      class
    ))),
  }
}

/// Read a NUL-terminated path from the tracee memory
pub(crate) fn read_path(pid: Pid, address: u64) -> Option<PathBuf> {
  let mut result = Vec::new();
  let mut address = address as usize;
  while result.len() < PATH_MAX {
    // Never cross a page boundary in one read, the next page may be unmapped
    let len = (PAGE_SIZE - address % PAGE_SIZE).min(PATH_MAX - result.len());
    let mut buf = vec![0u8; len];
    let read = {
      let mut local = [IoSliceMut::new(&mut buf)];
      let remote = [RemoteIoVec { base: address, len }];
      process_vm_readv(pid, &mut local, &remote).ok()?
    };
    if read == 0 {
      return None;
    }
    if let Some(end) = buf[..read].iter().position(|b| *b == 0) {
      result.extend_from_slice(&buf[..end]);
      return Some(PathBuf::from(OsString::from_vec(result)));
    }
    result.extend_from_slice(&buf[..read]);
    address += read;
  }
  None
}
