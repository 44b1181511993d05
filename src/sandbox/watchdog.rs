use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info};
use nix::sys::signal::{killpg, Signal};
use nix::time::{clock_getcpuclockid, clock_gettime, ClockId};
use nix::unistd::Pid;

use crate::sandbox::proc::vm_peak;
use crate::utils::MemoryLimitType;
use crate::JudgeError;

const MAX_TICK: Duration = Duration::from_millis(100);

const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expired {
  CpuTime,
  RealTime,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct WatchdogReport {
  pub(crate) expired: Option<Expired>,
  /// VmPeak sampled right before the kill
  pub(crate) peak_memory: Option<MemoryLimitType>,
}

/// Kills the process group of `pid` once a time limit is reached
pub(crate) struct Watchdog {
  stop: Option<Sender<()>>,
  handle: Option<JoinHandle<WatchdogReport>>,
}

fn cpu_time(clock: ClockId) -> Option<Duration> {
  let ts = clock_gettime(clock).ok()?;
  Some(Duration::new(ts.tv_sec() as u64, ts.tv_nsec() as u32))
}

impl Watchdog {
  pub(crate) fn start(
    pid: Pid,
    cpu_time_limit: Option<Duration>,
    real_time_limit: Option<Duration>,
  ) -> Result<Self, JudgeError> {
    if cpu_time_limit.is_none() && real_time_limit.is_none() {
      return Ok(Watchdog {
        stop: None,
        handle: None,
      });
    }

    let clock = match cpu_time_limit {
      Some(_) => Some(clock_getcpuclockid(pid)?),
      None => None,
    };
    let (stop, stopped) = bounded::<()>(1);
    let start = Instant::now();

    let handle = thread::Builder::new()
      .name(format!("watchdog-{}", pid))
      .spawn(move || {
        let mut report = WatchdogReport::default();
        loop {
          let elapsed = start.elapsed();
          let mut wait = MAX_TICK;

          if let Some(limit) = real_time_limit {
            if elapsed >= limit {
              report.expired = Some(Expired::RealTime);
              break;
            }
            wait = wait.min(limit - elapsed);
          }

          if let (Some(limit), Some(clock)) = (cpu_time_limit, clock) {
            match cpu_time(clock) {
              Some(used) if used >= limit => {
                report.expired = Some(Expired::CpuTime);
                break;
              }
              Some(used) => wait = wait.min(limit - used),
              // Process is gone
              None => return report,
            }
          }

          match stopped.recv_timeout(wait.max(MIN_TICK)) {
            Err(RecvTimeoutError::Timeout) => continue,
            _ => return report,
          }
        }

        report.peak_memory = vm_peak(pid);
        info!(
          "Child process #{}. exceeded {:?} limit, killing process group",
          pid,
          report.expired
        );
        let _ = killpg(pid, Signal::SIGKILL);
        report
      })?;

    debug!("Watchdog started for child process #{}.", pid);

    Ok(Watchdog {
      stop: Some(stop),
      handle: Some(handle),
    })
  }

  /// Stop watching and collect what happened
  pub(crate) fn finish(mut self) -> WatchdogReport {
    self.shutdown()
  }

  fn shutdown(&mut self) -> WatchdogReport {
    if let Some(stop) = self.stop.take() {
      let _ = stop.try_send(());
    }
    match self.handle.take() {
      Some(handle) => handle.join().unwrap_or_default(),
      None => WatchdogReport::default(),
    }
  }
}

impl Drop for Watchdog {
  fn drop(&mut self) {
    self.shutdown();
  }
}
