//! flashsim: deterministic power-loss testing for embedded flash filesystems.
//!
//! The filesystem engine under test is driven through the [`FileSystem`]
//! trait. Everything it needs from its platform comes from the harness:
//! fixed-capacity object pools instead of a heap, and a flash bridge in
//! front of a simulated device. The bridge counts writes and erases; when
//! the armed countdown reaches zero, power is "cut": the write does not
//! happen, the engine unwinds with [`FsError::PowerLoss`], and the
//! invocation returns [`INTERRUPTED`].
//!
//! # Example
//!
//! ```ignore
//! use flashsim::{DeviceName, Harness, PoolConfig, make_device};
//!
//! let (mut flash, areas) = make_device(DeviceName::Small, 1, 0xff)?;
//! let mut harness = Harness::new(MyFs::default(), &PoolConfig::from_env());
//! assert_eq!(harness.format(&mut flash, &areas), 0);
//!
//! // Cut power on the second flash write of this call.
//! harness.arm(2);
//! assert_eq!(harness.write_to_file(&mut flash, &areas, "log", b"abc"), flashsim::INTERRUPTED);
//!
//! // Whatever reached the media must still mount.
//! harness.arm(0);
//! assert_eq!(harness.restore(&mut flash, &areas), 0);
//! ```

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod fault;
pub mod flash;
pub mod harness;
pub mod pool;
pub mod runner;
pub mod script;
pub mod sweep;

pub use bridge::{FlashBridge, crc16_ccitt};
pub use config::PoolConfig;
pub use engine::{Access, Env, FileSystem};
pub use error::{FlashError, FsError, FsResult, INTERRUPTED, PowerLoss, RunError, ScriptError};
pub use fault::{FaultInjector, FaultState};
pub use flash::{ALL_DEVICES, AreaDesc, AreaDescs, DeviceName, Flash, Sector, SimFlash, make_device};
pub use harness::Harness;
pub use pool::{Handle, Pool, PoolKind, PoolObjects, Pools};
pub use runner::{RunStatus, ScriptRunner};
pub use script::{Command, Name};
pub use sweep::{CrashInfo, Sweep, SweepReport};
