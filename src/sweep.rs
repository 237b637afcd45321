//! Crash sweep: cut power at every write and erase of a workload in turn.
//!
//! A dry run with the injector disarmed counts the workload's flash
//! operations. Then, for each crash point 1..=N, the workload is replayed
//! on a fresh copy of the base image with power cut at that point, and the
//! verify closure inspects what survived (normally by restoring).

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::{ENV_CRASH_TARGET, runtime};
use crate::engine::FileSystem;
use crate::error::INTERRUPTED;
use crate::flash::SimFlash;
use crate::harness::Harness;

/// Information about the crash the verify closure is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashInfo {
    /// The crash point (1-indexed).
    pub point_id: u32,
    /// Writes and erases the uninterrupted workload performs.
    pub total: u32,
}

/// Outcome of a completed sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub crash_points: u32,
    pub verified: u32,
}

/// Sweep configuration.
pub struct Sweep<'a> {
    base: &'a SimFlash,
    only: Option<u32>,
}

impl<'a> Sweep<'a> {
    /// Sweep starting every replay from `base`.
    ///
    /// `FLASHSIM_CRASH_TARGET`, when set, limits the sweep to that point.
    pub fn new(base: &'a SimFlash) -> Self {
        Self {
            base,
            only: runtime().crash_target,
        }
    }

    /// Only replay crash point `target`.
    pub fn only(mut self, target: u32) -> Self {
        self.only = Some(target);
        self
    }

    /// Run the sweep.
    ///
    /// `run` performs the workload and returns the code of its last
    /// invocation; it must stop at the first [`INTERRUPTED`]. The engine
    /// keeps its RAM state between replays, so `run` normally starts with a
    /// restore of the fresh image.
    ///
    /// # Panics
    ///
    /// Panics if a replay does not hit its crash point, or re-raises a
    /// panic from `verify` after dumping the crashed image.
    pub fn execute<E, R, V>(&self, harness: &mut Harness<E>, mut run: R, mut verify: V) -> SweepReport
    where
        E: FileSystem,
        R: FnMut(&mut Harness<E>, &mut SimFlash) -> i32,
        V: FnMut(&mut Harness<E>, &mut SimFlash, &CrashInfo),
    {
        let mut flash = self.base.clone();
        harness.arm(0);
        let before = harness.faults().ops();
        let code = run(harness, &mut flash);
        let ops = harness.faults().ops() - before;
        let Ok(total) = u32::try_from(ops) else {
            panic!("workload performs {ops} flash operations, more than a sweep can address");
        };
        assert_ne!(code, INTERRUPTED, "dry run was interrupted");
        log::info!("workload performs {total} flash operations (rc={code})");

        let targets = match self.only {
            Some(target) => target..=target,
            None => 1..=total,
        };

        let mut verified = 0;
        for target in targets {
            let mut flash = self.base.clone();
            let fired_before = harness.faults().fired_count();
            let Ok(countdown) = i32::try_from(target) else {
                panic!("crash point {target} does not fit the fault countdown");
            };
            harness.arm(countdown);
            let code = run(harness, &mut flash);
            harness.arm(0);

            if harness.faults().fired_count() == fired_before || code != INTERRUPTED {
                report_failure(
                    target,
                    &flash,
                    &format!("crash point never reached, workload returned {code}"),
                );
                panic!("crash point {target}: workload finished without a power cut (rc={code})");
            }

            let info = CrashInfo {
                point_id: target,
                total,
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                verify(harness, &mut flash, &info);
            }));
            if let Err(payload) = outcome {
                report_failure(target, &flash, "verification failed");
                panic::resume_unwind(payload);
            }

            log::info!("crash point {target}/{total}: OK");
            verified += 1;
        }

        SweepReport {
            crash_points: total,
            verified,
        }
    }
}

/// Print what failed, where the image went and how to replay it.
fn report_failure(target: u32, flash: &SimFlash, reason: &str) {
    eprintln!("[flashsim] crash point {target}: FAILED");
    eprintln!("[flashsim] reason: {reason}");
    match dump_image(target, flash) {
        Ok(path) => eprintln!("[flashsim] image: {}", path.display()),
        Err(e) => eprintln!("[flashsim] error: cannot dump image: {e}"),
    }
    eprintln!("[flashsim] to reproduce:");
    eprintln!(
        "  {ENV_CRASH_TARGET}={target} cargo test{} -- --exact",
        test_name().map(|n| format!(" {n}")).unwrap_or_default()
    );
}

/// Write the crashed image under a directory unique to this process and call.
fn dump_image(target: u32, flash: &SimFlash) -> std::io::Result<PathBuf> {
    let dir = artifact_dir(&std::env::temp_dir());
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("crash_{target}.img"));
    flash.dump(&path)?;
    Ok(path)
}

fn artifact_dir(root: &Path) -> PathBuf {
    root.join("flashsim")
        .join(format!("flashsim-{}-{}", std::process::id(), Uuid::new_v4()))
}

/// The running test's name, as `cargo test` names its threads.
fn test_name() -> Option<String> {
    match std::thread::current().name() {
        Some(name) if name != "main" => Some(name.to_string()),
        _ => None,
    }
}
