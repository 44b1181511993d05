use std::env;
use std::fs::{self, File};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use flexi_logger::{Duplicate, FileSpec, Logger};
use log::info;

use catjudge::utils::{default_format, KIB};
use catjudge::{
  Compiler, JudgeError, JudgeExit, JudgeWorker, JudgeWorkerOptions, Language, PtraceSandbox,
  Sandbox, SandboxOptions, Stdio, VerboseJudgeLogger,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[arg(long, default_value_t = false, help = "Log at debug level")]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  #[command(about = "Judge a solution against a problem package")]
  Judge {
    #[arg(help = "Package directory or zip archive")]
    package: PathBuf,

    #[arg(help = "Solution source, the main solution of the package if omitted")]
    solution: Option<PathBuf>,

    #[arg(short, long, help = "Solution language, detected from the extension by default")]
    lang: Option<String>,

    #[arg(long, default_value_t = false, help = "Only judge the initial tests")]
    initial: bool,

    #[arg(long, help = "Use this Simfile instead of the one in the package")]
    simfile: Option<PathBuf>,

    #[arg(long, help = "Compilation cache directory")]
    cache_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 2.0 / 3.0, help = "Fraction of the time limit where score decay starts")]
    score_cut_lambda: f64,

    #[arg(long, default_value_t = 10000, help = "Checker time limit (unit: ms)")]
    checker_time: u64,
  },

  #[command(about = "Compile a source file in the sandbox")]
  Compile {
    #[arg(help = "Source file")]
    source: PathBuf,

    #[arg(help = "Output executable")]
    output: PathBuf,

    #[arg(short, long, help = "Language, detected from the extension by default")]
    lang: Option<String>,
  },

  #[command(about = "Run a program in the sandbox")]
  Run {
    #[arg(help = "Program")]
    program: PathBuf,

    #[arg(help = "Arguments")]
    arguments: Vec<String>,

    #[arg(short, long, default_value_t = 1000, help = "Time limit (unit: ms)")]
    time: u64,

    #[arg(short, long, default_value_t = 262144, help = "Memory limit (unit: KiB)")]
    memory: u64,

    #[arg(long, help = "Redirect stdin from this file")]
    stdin: Option<PathBuf>,

    #[arg(long, help = "Redirect stdout to this file")]
    stdout: Option<PathBuf>,

    #[arg(long, default_value_t = false, help = "Allow every system call")]
    no_filter: bool,
  },
}

fn judge(
  package: PathBuf,
  solution: Option<PathBuf>,
  lang: Option<String>,
  initial: bool,
  simfile: Option<PathBuf>,
  options: JudgeWorkerOptions,
) -> Result<(), JudgeError> {
  let mut worker = JudgeWorker::new(options)?;
  let simfile = match simfile {
    Some(path) => Some(fs::read_to_string(path)?),
    None => None,
  };
  worker.load_package(&package, simfile.as_deref())?;

  // Only the embedded checker is the same across packages
  let checker_cache = match worker.simfile() {
    Some(simfile) if simfile.checker.is_none() => Some("default_checker"),
    _ => None,
  };
  worker.compile_checker(checker_cache)?;
  match solution {
    Some(source) => {
      let language = Language::detect(lang.as_deref(), &source)?;
      worker.compile_solution(&source, language, None)?;
    }
    None => worker.compile_package_solution(0, None)?,
  }

  let mut logger = VerboseJudgeLogger::new();
  let passes: &[bool] = if initial { &[false] } else { &[false, true] };
  for &is_final in passes {
    let report = worker.judge(is_final, &mut logger, None)?;
    println!("{}", report.judge_log.trim_end());
    println!("{}", report.pretty_dump());
  }
  Ok(())
}

fn compile(source: PathBuf, output: PathBuf, lang: Option<String>) -> Result<(), JudgeError> {
  let language = Language::detect(lang.as_deref(), &source)?;
  let build_dir = tempfile::tempdir()?;
  let compiler = Compiler::new(Arc::new(PtraceSandbox::new()), build_dir.path());
  compiler.compile(&source, language, &output)?;
  println!("Compiled {} to {}", source.display(), output.display());
  Ok(())
}

fn run(
  program: PathBuf,
  arguments: Vec<String>,
  time: u64,
  memory: u64,
  stdin: Option<PathBuf>,
  stdout: Option<PathBuf>,
  no_filter: bool,
) -> Result<(), JudgeError> {
  let stdin = stdin.map(File::open).transpose()?;
  let stdout = stdout.map(File::create).transpose()?;
  let time_limit = Duration::from_millis(time);

  let mut options = SandboxOptions::new()
    .stdin(stdin.as_ref().map_or(Stdio::Closed, |file| Stdio::Fd(file.as_raw_fd())))
    .stdout(stdout.as_ref().map_or(Stdio::Inherit, |file| Stdio::Fd(file.as_raw_fd())))
    .cpu_time_limit(time_limit)
    .real_time_limit(catjudge::judge::real_time_limit(time_limit))
    .memory_limit(memory * KIB);
  if no_filter {
    options = options.disable_syscall_filter();
  }

  let es = PtraceSandbox::new().run(&program, &arguments, &options, &[])?;
  println!(
    "{}\nCPU: {:?} RT: {:?} Memory: {} KiB",
    es.message(),
    es.cpu_runtime(),
    es.runtime(),
    es.peak_memory() >> 10
  );
  Ok(())
}

fn start() -> Result<(), JudgeError> {
  let cli = Cli::parse();

  let spec = if cli.verbose { "catjudge=debug" } else { "catjudge=info" };
  let _logger = Logger::try_with_str(spec)?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("LOG_DIR").unwrap_or("./logs/".into()))
        .basename("catjudge")
        .discriminant(format!("{}", chrono::offset::Local::now().format("%Y-%m-%d")))
        .suppress_timestamp(),
    )
    .append()
    .duplicate_to_stderr(Duplicate::Warn)
    .format_for_files(default_format)
    .print_message()
    .start()?;

  info!("Start running catjudge");

  match cli.command {
    Commands::Judge {
      package,
      solution,
      lang,
      initial,
      simfile,
      cache_dir,
      score_cut_lambda,
      checker_time,
    } => {
      let mut options = JudgeWorkerOptions::new()
        .score_cut_lambda(score_cut_lambda)
        .checker_time_limit(Duration::from_millis(checker_time));
      if let Some(cache_dir) = cache_dir {
        options = options.cache_dir(cache_dir);
      }
      judge(package, solution, lang, initial, simfile, options)?
    }
    Commands::Compile { source, output, lang } => compile(source, output, lang)?,
    Commands::Run {
      program,
      arguments,
      time,
      memory,
      stdin,
      stdout,
      no_filter,
    } => run(program, arguments, time, memory, stdin, stdout, no_filter)?,
  }

  info!("Running catjudge finished");

  Ok(())
}

fn main() -> JudgeExit {
  start().into()
}
