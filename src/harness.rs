//! Invocation entry points.
//!
//! Each entry point is one checkpointed call into the engine: the fault
//! injector is reset to "powered", the area descriptors are lent to the
//! engine, the operation runs, and the result is settled. If power was cut
//! anywhere inside, the engine's own result is discarded and the caller gets
//! [`INTERRUPTED`].

use crate::bridge::FlashBridge;
use crate::config::PoolConfig;
use crate::engine::{Access, Asserts, Env, FileSystem};
use crate::error::{FsError, FsResult, INTERRUPTED};
use crate::fault::FaultInjector;
use crate::flash::{AreaDescs, Flash};
use crate::pool::Pools;
use crate::script::{self, Command};

/// The harness state around one engine: pools, fault injector and
/// assertion bookkeeping.
///
/// One invocation runs at a time; every entry point takes `&mut self`.
pub struct Harness<E: FileSystem> {
    engine: E,
    pools: Pools<E::Objects>,
    faults: FaultInjector,
    asserts: Asserts,
    last_ops: u64,
}

impl<E: FileSystem> Harness<E> {
    /// Set up the pools for `engine`; capacities left at zero take defaults.
    pub fn new(engine: E, config: &PoolConfig) -> Self {
        Self {
            engine,
            pools: Pools::new(config),
            faults: FaultInjector::new(),
            asserts: Asserts::default(),
            last_ops: 0,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn pools(&self) -> &Pools<E::Objects> {
        &self.pools
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Cut power on the `countdown`-th write or erase from now.
    ///
    /// Zero or a negative value never fires.
    pub fn arm(&mut self, countdown: i32) {
        self.faults.arm(countdown);
    }

    /// Count failed engine assertions instead of stopping the run.
    pub fn catch_asserts(&mut self, enable: bool) {
        self.asserts.catching = enable;
    }

    /// Assertions caught during the last invocation.
    pub fn caught_asserts(&self) -> u32 {
        self.asserts.caught
    }

    /// Writes and erases issued by the last invocation.
    pub fn last_ops(&self) -> u64 {
        self.last_ops
    }

    /// Run `op` against the engine under a fresh checkpoint.
    ///
    /// Returns `Err(FsError::PowerLoss)` whenever power was cut during
    /// `op`, whatever `op` itself returned.
    pub fn invoke<T, F>(&mut self, flash: &mut dyn Flash, areas: &AreaDescs, op: F) -> FsResult<T>
    where
        F: FnOnce(&mut E, &mut Env<'_, E::Objects>) -> FsResult<T>,
    {
        let checkpoint = self.faults.checkpoint();
        self.asserts.caught = 0;

        let result = {
            let bridge = FlashBridge::new(flash, &mut self.faults);
            let mut env = Env::new(
                bridge,
                &mut self.pools,
                areas.as_slice(),
                &mut self.asserts,
            );
            op(&mut self.engine, &mut env)
        };

        let (fired, ops) = self.faults.settle(checkpoint);
        self.last_ops = ops;
        if fired {
            if !matches!(result, Err(FsError::PowerLoss)) {
                log::warn!("engine kept going after the power cut; result discarded");
            }
            return Err(FsError::PowerLoss);
        }
        result
    }

    pub fn format(&mut self, flash: &mut dyn Flash, areas: &AreaDescs) -> i32 {
        let result = self.invoke(flash, areas, |fs, env| fs.format(env));
        status("format", result)
    }

    pub fn restore(&mut self, flash: &mut dyn Flash, areas: &AreaDescs) -> i32 {
        let result = self.invoke(flash, areas, |fs, env| fs.restore(env));
        status("restore", result)
    }

    /// Open `name` for appending, creating it if needed, and write `data`.
    ///
    /// Empty `data` only creates the file; no write reaches the engine. The
    /// handle is left open: its file slot stays occupied until the next
    /// format or restore.
    pub fn write_to_file(
        &mut self,
        flash: &mut dyn Flash,
        areas: &AreaDescs,
        name: &str,
        data: &[u8],
    ) -> i32 {
        let result = self.invoke(flash, areas, |fs, env| {
            let file = fs.open(env, name, Access::WRITE | Access::APPEND)?;
            if data.is_empty() {
                return Ok(());
            }
            fs.write(env, &file, data)
        });
        status("write_to_file", result)
    }

    pub fn rename(&mut self, flash: &mut dyn Flash, areas: &AreaDescs, from: &str, to: &str) -> i32 {
        let result = self.invoke(flash, areas, |fs, env| fs.rename(env, from, to));
        status("rename", result)
    }

    /// Run a whole script under one checkpoint.
    ///
    /// # Panics
    ///
    /// Panics if any command fails for a reason other than a power cut.
    pub fn run_script(&mut self, flash: &mut dyn Flash, areas: &AreaDescs, cmds: &[Command]) -> i32 {
        let result = self.invoke(flash, areas, |fs, env| script::interpret(fs, env, cmds));
        status("script", result)
    }
}

fn status(what: &str, result: FsResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(FsError::PowerLoss) => {
            log::info!("{what}: interrupted by power cut");
            INTERRUPTED
        }
        Err(e) => {
            log::info!("{what}: {e}");
            e.code()
        }
    }
}
