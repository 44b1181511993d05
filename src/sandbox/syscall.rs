use std::collections::HashMap;
use std::path::PathBuf;

use lazy_static::lazy_static;
use nix::errno::Errno;
use nix::libc::{O_ACCMODE, O_RDONLY, O_WRONLY};

use crate::sandbox::{AccessMode, FileGrant};

pub type SyscallId = u64;

/// Architecture of the traced binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
  I386,
  X86_64,
}

/// 系统调用权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyscallPerm {
  Allow,
  /// Allowed a limited number of times
  Limited(u32),
  /// Allowed for granted paths only
  Open { path_arg: usize, flags_arg: usize },
  /// Allowed, the result is checked for memory exhaustion
  Memory,
}

struct SyscallTable {
  /// Sorted by syscall id
  perms: Vec<(SyscallId, SyscallPerm)>,
  names: HashMap<SyscallId, &'static str>,
  execve: SyscallId,
  brk: SyscallId,
}

/// One intercepted syscall: number and raw arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallCall {
  pub id: SyscallId,
  pub args: [u64; 6],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallAction {
  Allow,
  /// Allow, then inspect the return value
  CheckResult,
  Forbid(String),
}

/// 系统调用过滤器
/// 白名单过滤，不在表内的系统调用一律禁止
#[derive(Debug, Clone)]
pub struct SyscallFilter {
  arch: Option<Arch>,
  limits: Vec<(SyscallId, u32)>,
  grants: Vec<FileGrant>,
}

macro_rules! syscall_table {
  ($execve:expr, $brk:expr, [$(($id:expr, $name:expr, $perm:expr)),* $(,)?], [$(($fid:expr, $fname:expr)),* $(,)?]) => {{
    let mut perms = vec![$(($id as SyscallId, $perm)),*];
    perms.sort_by_key(|(id, _)| *id);
    let mut names = HashMap::new();
    $(names.insert($id as SyscallId, $name);)*
    $(names.insert($fid as SyscallId, $fname);)*
    SyscallTable {
      perms,
      names,
      execve: $execve,
      brk: $brk,
    }
  }};
}

use SyscallPerm::{Allow, Limited, Memory};

const OPEN: SyscallPerm = SyscallPerm::Open {
  path_arg: 0,
  flags_arg: 1,
};

const OPENAT: SyscallPerm = SyscallPerm::Open {
  path_arg: 1,
  flags_arg: 2,
};

lazy_static! {
  static ref I386_TABLE: SyscallTable = syscall_table!(
    11,
    45,
    [
      (1, "exit", Allow),
      (3, "read", Allow),
      (4, "write", Allow),
      (5, "open", OPEN),
      (6, "close", Allow),
      (11, "execve", Limited(1)),
      (13, "time", Allow),
      (19, "lseek", Allow),
      (20, "getpid", Allow),
      (33, "access", Limited(1)),
      (45, "brk", Memory),
      (54, "ioctl", Allow),
      (78, "gettimeofday", Allow),
      (85, "readlink", Limited(1)),
      (90, "mmap", Memory),
      (91, "munmap", Allow),
      (108, "fstat", Allow),
      (122, "uname", Limited(1)),
      (125, "mprotect", Allow),
      (140, "_llseek", Allow),
      (145, "readv", Allow),
      (146, "writev", Allow),
      (163, "mremap", Memory),
      (168, "poll", Allow),
      (173, "rt_sigreturn", Allow),
      (174, "rt_sigaction", Allow),
      (175, "rt_sigprocmask", Allow),
      (186, "sigaltstack", Allow),
      (192, "mmap2", Memory),
      (197, "fstat64", Allow),
      (219, "madvise", Allow),
      (224, "gettid", Allow),
      (240, "futex", Allow),
      (243, "set_thread_area", Limited(1)),
      (252, "exit_group", Allow),
      (258, "set_tid_address", Allow),
      (265, "clock_gettime", Allow),
      (270, "tgkill", Allow),
      (295, "openat", OPENAT),
      (300, "fstatat64", Allow),
      (311, "set_robust_list", Allow),
      (340, "prlimit64", Allow),
      (355, "getrandom", Allow),
      (383, "statx", Allow),
      (386, "rseq", Allow),
      (403, "clock_gettime64", Allow),
    ],
    [
      (2, "fork"),
      (8, "creat"),
      (10, "unlink"),
      (26, "ptrace"),
      (37, "kill"),
      (39, "mkdir"),
      (102, "socketcall"),
      (120, "clone"),
      (162, "nanosleep"),
      (190, "vfork"),
      (359, "socket"),
      (362, "connect"),
      (358, "execveat"),
    ]
  );

  static ref X86_64_TABLE: SyscallTable = syscall_table!(
    59,
    12,
    [
      (0, "read", Allow),
      (1, "write", Allow),
      (2, "open", OPEN),
      (3, "close", Allow),
      (5, "fstat", Allow),
      (7, "poll", Allow),
      (8, "lseek", Allow),
      (9, "mmap", Memory),
      (10, "mprotect", Allow),
      (11, "munmap", Allow),
      (12, "brk", Memory),
      (13, "rt_sigaction", Allow),
      (14, "rt_sigprocmask", Allow),
      (15, "rt_sigreturn", Allow),
      (16, "ioctl", Allow),
      (17, "pread64", Allow),
      (19, "readv", Allow),
      (20, "writev", Allow),
      (21, "access", Limited(1)),
      (25, "mremap", Memory),
      (28, "madvise", Allow),
      (39, "getpid", Allow),
      (59, "execve", Limited(1)),
      (60, "exit", Allow),
      (63, "uname", Limited(1)),
      (89, "readlink", Limited(1)),
      (96, "gettimeofday", Allow),
      (131, "sigaltstack", Allow),
      (158, "arch_prctl", Limited(1)),
      (186, "gettid", Allow),
      (201, "time", Allow),
      (202, "futex", Allow),
      (205, "set_thread_area", Limited(1)),
      (218, "set_tid_address", Allow),
      (228, "clock_gettime", Allow),
      (231, "exit_group", Allow),
      (234, "tgkill", Allow),
      (257, "openat", OPENAT),
      (262, "newfstatat", Allow),
      (273, "set_robust_list", Allow),
      (302, "prlimit64", Allow),
      (318, "getrandom", Allow),
      (332, "statx", Allow),
      (334, "rseq", Allow),
    ],
    [
      (35, "nanosleep"),
      (41, "socket"),
      (42, "connect"),
      (49, "bind"),
      (56, "clone"),
      (57, "fork"),
      (58, "vfork"),
      (62, "kill"),
      (83, "mkdir"),
      (85, "creat"),
      (87, "unlink"),
      (101, "ptrace"),
      (230, "clock_nanosleep"),
      (263, "unlinkat"),
      (322, "execveat"),
      (435, "clone3"),
    ]
  );
}

fn table(arch: Arch) -> &'static SyscallTable {
  match arch {
    Arch::I386 => &I386_TABLE,
    Arch::X86_64 => &X86_64_TABLE,
  }
}

impl SyscallTable {
  fn perm(&self, id: SyscallId) -> Option<SyscallPerm> {
    self
      .perms
      .binary_search_by_key(&id, |(id, _)| *id)
      .ok()
      .map(|index| self.perms[index].1)
  }

  fn limits(&self) -> Vec<(SyscallId, u32)> {
    self
      .perms
      .iter()
      .filter_map(|(id, perm)| match perm {
        Limited(count) => Some((*id, *count)),
        _ => None,
      })
      .collect()
  }
}

/// Syscall name for messages, or its number when unknown
pub fn syscall_name(arch: Arch, id: SyscallId) -> String {
  match table(arch).names.get(&id) {
    Some(name) => name.to_string(),
    None => id.to_string(),
  }
}

fn access_mode(flags: u64) -> AccessMode {
  match flags as i32 & O_ACCMODE {
    O_RDONLY => AccessMode::ReadOnly,
    O_WRONLY => AccessMode::WriteOnly,
    _ => AccessMode::ReadWrite,
  }
}

impl SyscallFilter {
  pub fn new(grants: &[FileGrant]) -> Self {
    SyscallFilter {
      arch: None,
      limits: vec![],
      grants: grants.to_vec(),
    }
  }

  pub fn arch(&self) -> Option<Arch> {
    self.arch
  }

  /// The traced program has been exec'd; its own execve used the first allowance
  pub fn on_exec(&mut self, arch: Arch) {
    let table = table(arch);
    self.arch = Some(arch);
    self.limits = table.limits();
    self.consume(table.execve);
  }

  fn consume(&mut self, id: SyscallId) -> bool {
    match self.limits.iter_mut().find(|(limited, _)| *limited == id) {
      Some((_, count)) if *count > 0 => {
        *count -= 1;
        true
      }
      _ => false,
    }
  }

  /// Decide a syscall entry. `read_path` reads a NUL-terminated string from the tracee.
  pub fn check<F>(&mut self, call: &SyscallCall, read_path: F) -> SyscallAction
  where
    F: FnOnce(u64) -> Option<PathBuf>,
  {
    // Not exec'd yet, only our own preparation code runs
    let arch = match self.arch {
      Some(arch) => arch,
      None => return SyscallAction::Allow,
    };
    let forbid = || SyscallAction::Forbid(syscall_name(arch, call.id));

    match table(arch).perm(call.id) {
      Some(Allow) => SyscallAction::Allow,
      Some(Memory) => SyscallAction::CheckResult,
      Some(Limited(_)) => {
        if self.consume(call.id) {
          SyscallAction::Allow
        } else {
          forbid()
        }
      }
      Some(SyscallPerm::Open {
        path_arg,
        flags_arg,
      }) => {
        let requested = access_mode(call.args[flags_arg]);
        let address = call.args[path_arg];
        if address == 0 {
          return forbid();
        }
        match read_path(address) {
          Some(path) => {
            let granted = self
              .grants
              .iter()
              .any(|grant| grant.path() == path && grant.permits(requested));
            if granted {
              SyscallAction::Allow
            } else {
              forbid()
            }
          }
          None => forbid(),
        }
      }
      None => forbid(),
    }
  }

  /// Whether a memory syscall failed because of the address space limit
  pub fn is_memory_exhausted(&self, call: &SyscallCall, ret: u64) -> bool {
    let arch = match self.arch {
      Some(arch) => arch,
      None => return false,
    };
    let ret = match arch {
      Arch::X86_64 => ret as i64,
      Arch::I386 => ret as u32 as i32 as i64,
    };
    if call.id == table(arch).brk {
      let requested = call.args[0] as i64;
      requested != 0 && ret < requested
    } else {
      ret == -(Errno::ENOMEM as i64)
    }
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::*;

  fn call(id: SyscallId, args: [u64; 6]) -> SyscallCall {
    SyscallCall { id, args }
  }

  #[test]
  fn it_should_allow_everything_before_exec() {
    let mut filter = SyscallFilter::new(&[]);
    assert_eq!(filter.check(&call(41, [0; 6]), |_| None), SyscallAction::Allow);
  }

  #[test]
  fn it_should_forbid_by_name() {
    let mut filter = SyscallFilter::new(&[]);
    filter.on_exec(Arch::X86_64);
    assert_eq!(
      filter.check(&call(41, [0; 6]), |_| None),
      SyscallAction::Forbid("socket".into())
    );
    assert_eq!(
      filter.check(&call(999, [0; 6]), |_| None),
      SyscallAction::Forbid("999".into())
    );
    assert_eq!(filter.check(&call(1, [0; 6]), |_| None), SyscallAction::Allow);
  }

  #[test]
  fn it_should_count_limited_syscalls() {
    let mut filter = SyscallFilter::new(&[]);
    filter.on_exec(Arch::X86_64);
    // execve was consumed by the exec itself
    assert_eq!(
      filter.check(&call(59, [0; 6]), |_| None),
      SyscallAction::Forbid("execve".into())
    );
    assert_eq!(filter.check(&call(158, [0; 6]), |_| None), SyscallAction::Allow);
    assert_eq!(
      filter.check(&call(158, [0; 6]), |_| None),
      SyscallAction::Forbid("arch_prctl".into())
    );
  }

  #[test]
  fn it_should_use_i386_numbers() {
    let mut filter = SyscallFilter::new(&[]);
    filter.on_exec(Arch::I386);
    assert_eq!(filter.check(&call(4, [0; 6]), |_| None), SyscallAction::Allow);
    assert_eq!(
      filter.check(&call(2, [0; 6]), |_| None),
      SyscallAction::Forbid("fork".into())
    );
    assert_eq!(filter.check(&call(192, [0; 6]), |_| None), SyscallAction::CheckResult);
  }

  #[test]
  fn it_should_open_granted_files_only() {
    let grants = vec![FileGrant::read_only("/tmp/test.in")];
    let mut filter = SyscallFilter::new(&grants);
    filter.on_exec(Arch::X86_64);

    let read_in = |_| Some(Path::new("/tmp/test.in").to_path_buf());
    let read_other = |_| Some(Path::new("/etc/passwd").to_path_buf());

    // openat(AT_FDCWD, path, O_RDONLY)
    assert_eq!(
      filter.check(&call(257, [0, 0x1000, 0, 0, 0, 0]), read_in),
      SyscallAction::Allow
    );
    // O_WRONLY is not granted
    assert_eq!(
      filter.check(&call(257, [0, 0x1000, 1, 0, 0, 0]), read_in),
      SyscallAction::Forbid("openat".into())
    );
    assert_eq!(
      filter.check(&call(2, [0x1000, 0, 0, 0, 0, 0]), read_other),
      SyscallAction::Forbid("open".into())
    );
  }

  #[test]
  fn it_should_detect_memory_exhaustion() {
    let mut filter = SyscallFilter::new(&[]);
    filter.on_exec(Arch::X86_64);
    let enomem = (-(Errno::ENOMEM as i64)) as u64;
    assert!(filter.is_memory_exhausted(&call(9, [0; 6]), enomem));
    assert!(!filter.is_memory_exhausted(&call(9, [0; 6]), 0x7f00_0000_0000));
    // brk returns the old break when it cannot grow
    assert!(filter.is_memory_exhausted(&call(12, [0x2000, 0, 0, 0, 0, 0]), 0x1000));
    assert!(!filter.is_memory_exhausted(&call(12, [0, 0, 0, 0, 0, 0]), 0x1000));
  }
}
