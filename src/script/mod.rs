//! Scripted test commands and their interpreter.
//!
//! A script is a flat list of [`Command`]s run under a single checkpoint.
//! Scripts are expected to succeed: any engine error other than a power cut
//! stops the run, since it means the script itself is wrong.

pub mod codec;
pub mod text;

use std::fmt;

use crate::engine::{Access, Env, FileSystem};
use crate::error::{FsError, FsResult, ScriptError};
use crate::pool::PoolObjects;

/// Longest name a command can carry.
pub const MAX_NAME_LEN: usize = 256;

/// Largest buffer a single `WriteToFile` may synthesize.
pub const MAX_WRITE_LEN: usize = 1024;

/// A path with an explicit, bounded length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(String);

impl Name {
    pub fn new(name: &str) -> Result<Name, ScriptError> {
        if name.len() > MAX_NAME_LEN {
            return Err(ScriptError::NameTooLong(name.len()));
        }
        Ok(Name(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for Name {
    type Error = ScriptError;

    fn try_from(name: &str) -> Result<Name, ScriptError> {
        Name::new(name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One step of a test script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    End,
    /// Open (creating if needed) for appending; becomes the current file.
    OpenFile { name: Name },
    /// Append `length` copies of `fill` to the current file.
    WriteToFile { length: u32, fill: u8 },
    RenamePath { from: Name, to: Name },
    UnlinkPath { name: Name },
    Restore,
    Format,
}

impl Command {
    pub fn open_file(name: &str) -> Result<Command, ScriptError> {
        Ok(Command::OpenFile {
            name: Name::new(name)?,
        })
    }

    pub fn write_to_file(length: u32, fill: u8) -> Command {
        Command::WriteToFile { length, fill }
    }

    pub fn rename_path(from: &str, to: &str) -> Result<Command, ScriptError> {
        Ok(Command::RenamePath {
            from: Name::new(from)?,
            to: Name::new(to)?,
        })
    }

    pub fn unlink_path(name: &str) -> Result<Command, ScriptError> {
        Ok(Command::UnlinkPath {
            name: Name::new(name)?,
        })
    }

    /// Record tag in the binary encoding.
    pub fn tag(&self) -> u8 {
        match self {
            Command::End => 0,
            Command::OpenFile { .. } => 1,
            Command::WriteToFile { .. } => 2,
            Command::RenamePath { .. } => 3,
            Command::UnlinkPath { .. } => 4,
            Command::Restore => 5,
            Command::Format => 6,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::End => f.write_str("end"),
            Command::OpenFile { name } => write!(f, "file_open {name}"),
            Command::WriteToFile { length, fill } => {
                write!(f, "write {length} bytes of 0x{fill:02x}")
            }
            Command::RenamePath { from, to } => write!(f, "path_rename {from} {to}"),
            Command::UnlinkPath { name } => write!(f, "path_unlink {name}"),
            Command::Restore => f.write_str("restore"),
            Command::Format => f.write_str("format"),
        }
    }
}

/// Run `cmds` up to the first `End`.
///
/// Returns `Err(FsError::PowerLoss)` if power was cut; every other engine
/// failure panics.
pub(crate) fn interpret<E: FileSystem>(
    fs: &mut E,
    env: &mut Env<'_, E::Objects>,
    cmds: &[Command],
) -> FsResult<()> {
    let mut current: Option<E::File> = None;
    let mut buf = Vec::new();

    for cmd in cmds {
        log::info!("script: {cmd}");
        match cmd {
            Command::End => break,
            Command::OpenFile { name } => {
                if let Some(file) = current.take() {
                    ensure(fs.close(env, file), env, cmd)?;
                }
                let file = fs.open(env, name.as_str(), Access::WRITE | Access::APPEND);
                current = Some(ensure(file, env, cmd)?);
            }
            Command::WriteToFile { length, fill } => {
                let len = *length as usize;
                if len > MAX_WRITE_LEN {
                    fatal(cmd, &format!("length exceeds {MAX_WRITE_LEN}"));
                }
                let Some(file) = current.as_ref() else {
                    fatal(cmd, "no file is open");
                };
                buf.clear();
                buf.resize(len, *fill);
                ensure(fs.write(env, file, &buf), env, cmd)?;
            }
            Command::RenamePath { from, to } => {
                ensure(fs.rename(env, from.as_str(), to.as_str()), env, cmd)?;
            }
            Command::UnlinkPath { name } => {
                ensure(fs.unlink(env, name.as_str()), env, cmd)?;
            }
            Command::Restore => ensure(fs.restore(env), env, cmd)?,
            Command::Format => ensure(fs.format(env), env, cmd)?,
        }
    }

    if let Some(file) = current {
        ensure(fs.close(env, file), env, &Command::End)?;
    }
    Ok(())
}

/// Once power is down, any failure is the power cut, whatever code the
/// engine chose to report it with.
fn ensure<T, O: PoolObjects>(
    result: FsResult<T>,
    env: &Env<'_, O>,
    cmd: &Command,
) -> FsResult<T> {
    match result {
        Err(FsError::PowerLoss) => Err(FsError::PowerLoss),
        Err(e) if env.flash.powered_down() => {
            log::info!("script command `{cmd}` failed after the power cut: {e}");
            Err(FsError::PowerLoss)
        }
        Err(e) => fatal(cmd, &format!("{e} (rc={})", e.code())),
        ok => ok,
    }
}

fn fatal(cmd: &Command, why: &str) -> ! {
    log::error!("script command `{cmd}` failed: {why}");
    panic!("script command `{cmd}` failed: {why}");
}
