pub use logger::{JudgeLogger, VerboseJudgeLogger};
pub use report::{JudgeReport, ReportGroup, ReportTest, TestStatus};
pub use scoring::{decay_ratio, group_score, real_time_limit};
pub use worker::{JudgeWorker, JudgeWorkerOptions};

mod interactive;
pub mod logger;
pub mod report;
pub mod scoring;
mod worker;
