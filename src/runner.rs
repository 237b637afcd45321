//! Run every script in a directory against fresh copies of a flash image.
//!
//! Files ending in `.bin` are binary record scripts; anything else is read
//! as the line syntax. Scripts should begin with `format` or `restore`: the
//! engine's RAM state carries over from the previous script.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::engine::FileSystem;
use crate::error::RunError;
use crate::flash::{AreaDescs, SimFlash};
use crate::harness::Harness;
use crate::script::{codec, text};

/// Pass/fail tally of a runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatus {
    pub passes: usize,
    pub failures: usize,
}

impl RunStatus {
    pub fn total(&self) -> usize {
        self.passes + self.failures
    }
}

pub struct ScriptRunner<'a> {
    template: &'a SimFlash,
    areas: &'a AreaDescs,
    status: RunStatus,
}

impl<'a> ScriptRunner<'a> {
    /// Every script starts from a clone of `template`.
    pub fn new(template: &'a SimFlash, areas: &'a AreaDescs) -> Self {
        Self {
            template,
            areas,
            status: RunStatus::default(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Run one script file; returns the flash image it left behind.
    ///
    /// A command that fails is reported as [`RunError::Aborted`] rather than
    /// unwinding into the caller.
    pub fn run_file<E: FileSystem>(
        &mut self,
        harness: &mut Harness<E>,
        path: &Path,
    ) -> Result<SimFlash, RunError> {
        log::info!("Running script: \"{}\"", path.display());
        let cmds = if path.extension().is_some_and(|ext| ext == "bin") {
            codec::decode(&fs::read(path)?)?
        } else {
            text::parse(&fs::read_to_string(path)?)?
        };

        let mut flash = self.template.clone();
        harness.arm(0);
        let areas = self.areas;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            harness.run_script(&mut flash, areas, &cmds)
        }));
        match outcome {
            Ok(0) => Ok(flash),
            Ok(rc) => Err(RunError::Aborted(format!("script returned {rc}"))),
            Err(payload) => Err(RunError::Aborted(panic_message(payload.as_ref()))),
        }
    }

    /// Run every regular file in `dir`, in name order.
    pub fn run_dir<E: FileSystem>(
        &mut self,
        harness: &mut Harness<E>,
        dir: &Path,
    ) -> Result<RunStatus, RunError> {
        let mut scripts: Vec<PathBuf> = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        scripts.retain(|p| p.is_file());
        scripts.sort();

        for script in &scripts {
            match self.run_file(harness, script) {
                Ok(_) => self.status.passes += 1,
                Err(e) => {
                    log::warn!("{}: {e}", script.display());
                    self.status.failures += 1;
                }
            }
        }

        if self.status.failures > 0 {
            log::error!(
                "{} scripts ran with {} failures",
                self.status.total(),
                self.status.failures
            );
        } else {
            log::info!("{} scripts ran successfully", self.status.passes);
        }
        Ok(self.status)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
