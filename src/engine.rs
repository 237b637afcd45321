//! The call surface between the harness and the filesystem engine.
//!
//! The harness drives an engine through [`FileSystem`]; the engine reaches
//! back into the harness only through the [`Env`] it is handed, which is
//! where its pools, its flash and its area descriptors live for the length
//! of one invocation.

use std::ops::BitOr;

use crate::bridge::FlashBridge;
use crate::error::FsResult;
use crate::flash::AreaDesc;
use crate::pool::{PoolObjects, Pools};

/// Open mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access(u8);

impl Access {
    pub const READ: Access = Access(0x01);
    pub const WRITE: Access = Access(0x02);
    pub const APPEND: Access = Access(0x04);
    pub const TRUNCATE: Access = Access(0x08);

    pub fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

/// A flash filesystem under test.
///
/// Every media access must go through `env.flash`, and every error it
/// returns must be propagated: after a power loss the engine is expected to
/// give up at once, the way a CPU without power would.
pub trait FileSystem {
    /// Slot types for the six object pools.
    type Objects: PoolObjects;
    /// Open file token handed back to the harness.
    type File;

    /// Erase the areas and lay down an empty filesystem.
    fn format(&mut self, env: &mut Env<'_, Self::Objects>) -> FsResult<()>;

    /// Rebuild in-memory state from what is on the media.
    fn restore(&mut self, env: &mut Env<'_, Self::Objects>) -> FsResult<()>;

    fn open(
        &mut self,
        env: &mut Env<'_, Self::Objects>,
        path: &str,
        access: Access,
    ) -> FsResult<Self::File>;

    fn write(
        &mut self,
        env: &mut Env<'_, Self::Objects>,
        file: &Self::File,
        data: &[u8],
    ) -> FsResult<()>;

    fn close(&mut self, env: &mut Env<'_, Self::Objects>, file: Self::File) -> FsResult<()>;

    fn rename(&mut self, env: &mut Env<'_, Self::Objects>, from: &str, to: &str) -> FsResult<()>;

    fn unlink(&mut self, env: &mut Env<'_, Self::Objects>, path: &str) -> FsResult<()>;
}

/// Assertion checks raised by the engine.
#[derive(Debug, Default)]
pub(crate) struct Asserts {
    pub(crate) catching: bool,
    pub(crate) caught: u32,
}

/// Everything the engine may touch during one invocation.
pub struct Env<'a, O: PoolObjects> {
    pub flash: FlashBridge<'a>,
    pub pools: &'a mut Pools<O>,
    areas: &'a [AreaDesc],
    asserts: &'a mut Asserts,
}

impl<'a, O: PoolObjects> Env<'a, O> {
    pub(crate) fn new(
        flash: FlashBridge<'a>,
        pools: &'a mut Pools<O>,
        areas: &'a [AreaDesc],
        asserts: &'a mut Asserts,
    ) -> Self {
        Self {
            flash,
            pools,
            areas,
            asserts,
        }
    }

    /// Area descriptors supplied for this invocation.
    pub fn areas(&self) -> &[AreaDesc] {
        self.areas
    }

    /// Engine assertion hook.
    ///
    /// With catching enabled a failed check is counted and execution goes
    /// on; otherwise it stops the run.
    #[track_caller]
    pub fn check(&mut self, cond: bool, what: &str) {
        if cond {
            return;
        }
        let at = std::panic::Location::caller();
        if self.asserts.catching {
            self.asserts.caught += 1;
            log::warn!("{at}: assertion `{what}' failed (caught)");
        } else {
            log::error!("{at}: assertion `{what}' failed");
            panic!("{at}: assertion `{what}' failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::fault::FaultInjector;
    use crate::flash::SimFlash;

    struct Objects;

    impl PoolObjects for Objects {
        type File = ();
        type Dir = ();
        type Inode = ();
        type Block = ();
        type CacheInode = ();
        type CacheBlock = ();
    }

    #[test]
    fn access_flags_combine() {
        let mode = Access::WRITE | Access::APPEND;
        assert!(mode.contains(Access::WRITE));
        assert!(mode.contains(Access::APPEND));
        assert!(!mode.contains(Access::READ));
        assert_eq!(mode.bits(), 0x06);
    }

    #[test]
    fn caught_checks_are_counted() {
        let mut flash = SimFlash::new(vec![64], 1, 0xff).unwrap();
        let mut faults = FaultInjector::new();
        let mut pools: Pools<Objects> = Pools::new(&PoolConfig::default());
        let mut asserts = Asserts {
            catching: true,
            caught: 0,
        };
        let mut env = Env::new(
            FlashBridge::new(&mut flash, &mut faults),
            &mut pools,
            &[],
            &mut asserts,
        );
        env.check(true, "fine");
        env.check(false, "first");
        env.check(env.areas().len() == 1, "second");
        assert!(env.areas().is_empty());
        drop(env);
        assert_eq!(asserts.caught, 2);
    }

    #[test]
    #[should_panic(expected = "assertion `len <= 8' failed")]
    fn uncaught_checks_stop_the_run() {
        let mut flash = SimFlash::new(vec![64], 1, 0xff).unwrap();
        let mut faults = FaultInjector::new();
        let mut pools: Pools<Objects> = Pools::new(&PoolConfig::default());
        let mut asserts = Asserts::default();
        let mut env = Env::new(
            FlashBridge::new(&mut flash, &mut faults),
            &mut pools,
            &[],
            &mut asserts,
        );
        env.check(false, "len <= 8");
    }
}
