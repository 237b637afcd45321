//! Error types shared by the harness, the flash backend and script parsing.

use thiserror::Error;

/// Return code of every invocation that was cut short by a simulated power loss.
///
/// Engine status codes are small positive numbers, so this value can never be
/// mistaken for one of them.
pub const INTERRUPTED: i32 = -0x13579;

/// Result type of every call crossing the engine boundary.
pub type FsResult<T> = Result<T, FsError>;

/// The marker a write or erase returns once the fault countdown hits zero.
///
/// Engines must propagate it (normally with `?`); the invocation boundary
/// turns it into [`INTERRUPTED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("simulated power loss")]
pub struct PowerLoss;

/// Status of a filesystem engine call.
///
/// The numeric codes follow the embedded filesystem's own `FS_E*` values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// Power was cut under the engine; nothing after the failing write or
    /// erase reached the media.
    #[error("simulated power loss")]
    PowerLoss,

    #[error("corrupt filesystem: {0}")]
    Corrupt(String),

    /// The flash backend rejected an access.
    #[error("flash hardware error: {0}")]
    Hardware(String),

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("out of memory")]
    NoMem,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Exists(String),

    /// No room left in the flash areas.
    #[error("filesystem full")]
    Full,

    #[error("access denied")]
    Access,

    /// Any other engine-specific status code.
    #[error("engine error {0}")]
    Code(i32),
}

impl FsError {
    /// The integer status an embedded caller would have seen.
    pub fn code(&self) -> i32 {
        match self {
            FsError::PowerLoss => INTERRUPTED,
            FsError::Corrupt(_) => 1,
            FsError::Hardware(_) => 2,
            FsError::Invalid(_) => 4,
            FsError::NoMem => 5,
            FsError::NotFound(_) => 6,
            FsError::Full => 8,
            FsError::Exists(_) => 11,
            FsError::Access => 12,
            FsError::Code(code) => *code,
        }
    }
}

impl From<PowerLoss> for FsError {
    fn from(_: PowerLoss) -> Self {
        FsError::PowerLoss
    }
}

/// Errors reported by a flash backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    #[error("access 0x{offset:x}+0x{len:x} is outside the device")]
    OutOfBounds { offset: usize, len: usize },

    #[error("access 0x{offset:x}+0x{len:x} is not aligned to {align}")]
    Misaligned {
        offset: usize,
        len: usize,
        align: usize,
    },

    /// Flash bits can only be programmed once between erases.
    #[error("write to 0x{offset:x} hits bytes not erased since the last write")]
    NotErased { offset: usize },

    #[error("erase 0x{offset:x}+0x{len:x} does not cover whole sectors")]
    PartialSector { offset: usize, len: usize },

    #[error("no sector {0}")]
    NoSuchSector(usize),

    #[error("write alignment must be 1, 2, 4 or 8, got {0}")]
    BadAlign(usize),

    #[error("area 0x{base:x}+0x{len:x} does not start on a sector boundary")]
    AreaUnaligned { base: usize, len: usize },

    #[error("area 0x{base:x}+0x{len:x} goes past the end of the device")]
    AreaPastEnd { base: usize, len: usize },

    #[error("an area set holds at most {0} areas")]
    TooManyAreas(usize),
}

/// Errors decoding or parsing a test script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("name is {0} bytes, the limit is 256")]
    NameTooLong(usize),

    #[error("record {index}: unknown command tag {tag}")]
    UnknownTag { index: usize, tag: u8 },

    #[error("record {index}: truncated, {available} of {needed} bytes")]
    Truncated {
        index: usize,
        available: usize,
        needed: usize,
    },

    #[error("record {index}: invalid length {len}")]
    BadLength { index: usize, len: i32 },

    #[error("record {index}: name is not valid UTF-8")]
    NotUtf8 { index: usize },

    #[error("line {line}: {detail}")]
    Parse { line: usize, detail: String },
}

/// Why a script file did not pass.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    /// A command failed while the script ran.
    #[error("script aborted: {0}")]
    Aborted(String),
}
