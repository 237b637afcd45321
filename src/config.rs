//! Runtime configuration read from the environment.
//!
//! Variables are read exactly once per process and cached.

use std::sync::OnceLock;

/// Cached runtime configuration, initialized once from environment variables.
static RUNTIME: OnceLock<RuntimeConfig> = OnceLock::new();

const ENV_NUM_FILES: &str = "FLASHSIM_NUM_FILES";
const ENV_NUM_DIRS: &str = "FLASHSIM_NUM_DIRS";
const ENV_NUM_INODES: &str = "FLASHSIM_NUM_INODES";
const ENV_NUM_BLOCKS: &str = "FLASHSIM_NUM_BLOCKS";
const ENV_NUM_CACHE_INODES: &str = "FLASHSIM_NUM_CACHE_INODES";
const ENV_NUM_CACHE_BLOCKS: &str = "FLASHSIM_NUM_CACHE_BLOCKS";
pub(crate) const ENV_CRASH_TARGET: &str = "FLASHSIM_CRASH_TARGET";

/// Capacities of the six object pools.
///
/// A zero entry means "use the default" for that pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolConfig {
    pub num_files: u32,
    pub num_dirs: u32,
    pub num_inodes: u32,
    pub num_blocks: u32,
    pub num_cache_inodes: u32,
    pub num_cache_blocks: u32,
}

impl PoolConfig {
    pub const DEFAULT: PoolConfig = PoolConfig {
        num_files: 4,
        num_dirs: 4,
        num_inodes: 100,
        num_blocks: 100,
        num_cache_inodes: 4,
        num_cache_blocks: 64,
    };

    /// Replace every unset (zero) capacity with its default.
    pub fn resolved(self) -> PoolConfig {
        let pick = |value: u32, default: u32| if value == 0 { default } else { value };
        PoolConfig {
            num_files: pick(self.num_files, Self::DEFAULT.num_files),
            num_dirs: pick(self.num_dirs, Self::DEFAULT.num_dirs),
            num_inodes: pick(self.num_inodes, Self::DEFAULT.num_inodes),
            num_blocks: pick(self.num_blocks, Self::DEFAULT.num_blocks),
            num_cache_inodes: pick(self.num_cache_inodes, Self::DEFAULT.num_cache_inodes),
            num_cache_blocks: pick(self.num_cache_blocks, Self::DEFAULT.num_cache_blocks),
        }
    }

    /// Pool capacities from the `FLASHSIM_NUM_*` variables, defaults elsewhere.
    pub fn from_env() -> PoolConfig {
        runtime().pools
    }
}

/// Cached runtime configuration.
#[derive(Debug)]
pub(crate) struct RuntimeConfig {
    pub(crate) pools: PoolConfig,
    /// Restricts a crash sweep to this single crash point.
    pub(crate) crash_target: Option<u32>,
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<u32>().ok())
}

fn init_runtime() -> RuntimeConfig {
    let pools = PoolConfig {
        num_files: env_u32(ENV_NUM_FILES).unwrap_or(0),
        num_dirs: env_u32(ENV_NUM_DIRS).unwrap_or(0),
        num_inodes: env_u32(ENV_NUM_INODES).unwrap_or(0),
        num_blocks: env_u32(ENV_NUM_BLOCKS).unwrap_or(0),
        num_cache_inodes: env_u32(ENV_NUM_CACHE_INODES).unwrap_or(0),
        num_cache_blocks: env_u32(ENV_NUM_CACHE_BLOCKS).unwrap_or(0),
    }
    .resolved();

    let crash_target = env_u32(ENV_CRASH_TARGET).filter(|&t| t > 0);

    RuntimeConfig {
        pools,
        crash_target,
    }
}

/// Returns the cached runtime configuration.
#[inline]
pub(crate) fn runtime() -> &'static RuntimeConfig {
    RUNTIME.get_or_init(init_runtime)
}
