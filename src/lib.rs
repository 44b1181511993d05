pub use checker::{CheckerStatus, CheckerVerdict};
pub use compiler::{CompilationCache, Compiler, Language};
pub use error::{JudgeError, JudgeExit};
pub use judge::{
  JudgeLogger, JudgeReport, JudgeWorker, JudgeWorkerOptions, ReportGroup, ReportTest, TestStatus,
  VerboseJudgeLogger,
};
pub use package::{open_package, DirPackageLoader, PackageLoader, Simfile, ZipPackageLoader};
pub use sandbox::{ExitStat, FileGrant, PtraceSandbox, Sandbox, SandboxOptions, Stdio, Termination};

pub mod checker;
pub mod compiler;
mod error;
pub mod judge;
pub mod package;
pub mod sandbox;
pub mod utils;
