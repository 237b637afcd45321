//! Binary script records.
//!
//! Every record is the same size: a one byte tag, padding up to a four byte
//! boundary, then the largest payload (a rename) regardless of the tag.
//!
//! ```text
//!  0      4          8          12               268              524
//!  | tag  | len / len_a | len_b / fill | name_a ... | name_b ...    |
//! ```
//!
//! Lengths are little-endian `i32`. Open and unlink records keep their name
//! right after the length, at offset 8. A record with tag 0 ends the script.

use crate::error::ScriptError;
use crate::script::{Command, MAX_NAME_LEN, Name};

pub const RECORD_SIZE: usize = 524;

const PAYLOAD: usize = 4;
const NAME_AT: usize = PAYLOAD + 4;
const FILL_AT: usize = PAYLOAD + 4;
const RENAME_LEN_B: usize = PAYLOAD + 4;
const RENAME_NAME_A: usize = PAYLOAD + 8;
const RENAME_NAME_B: usize = RENAME_NAME_A + MAX_NAME_LEN;

/// Encode `cmds` into fixed-size records, terminated by an `End` record.
pub fn encode(cmds: &[Command]) -> Vec<u8> {
    let mut out = Vec::with_capacity((cmds.len() + 1) * RECORD_SIZE);
    for cmd in cmds {
        out.extend_from_slice(&encode_record(cmd));
        if *cmd == Command::End {
            return out;
        }
    }
    out.extend_from_slice(&encode_record(&Command::End));
    out
}

fn encode_record(cmd: &Command) -> [u8; RECORD_SIZE] {
    let mut rec = [0u8; RECORD_SIZE];
    rec[0] = cmd.tag();
    match cmd {
        Command::End | Command::Restore | Command::Format => {}
        Command::OpenFile { name } | Command::UnlinkPath { name } => {
            put_len(&mut rec, PAYLOAD, name.len());
            put_name(&mut rec, NAME_AT, name);
        }
        Command::WriteToFile { length, fill } => {
            rec[PAYLOAD..PAYLOAD + 4].copy_from_slice(&(*length as i32).to_le_bytes());
            rec[FILL_AT] = *fill;
        }
        Command::RenamePath { from, to } => {
            put_len(&mut rec, PAYLOAD, from.len());
            put_len(&mut rec, RENAME_LEN_B, to.len());
            put_name(&mut rec, RENAME_NAME_A, from);
            put_name(&mut rec, RENAME_NAME_B, to);
        }
    }
    rec
}

fn put_len(rec: &mut [u8], at: usize, len: usize) {
    rec[at..at + 4].copy_from_slice(&(len as i32).to_le_bytes());
}

fn put_name(rec: &mut [u8], at: usize, name: &Name) {
    rec[at..at + name.len()].copy_from_slice(name.as_str().as_bytes());
}

/// Decode records up to the terminating `End`, which is not returned.
pub fn decode(bytes: &[u8]) -> Result<Vec<Command>, ScriptError> {
    let mut cmds = Vec::new();
    for index in 0.. {
        let start = index * RECORD_SIZE;
        let available = bytes.len().saturating_sub(start);
        if available < RECORD_SIZE {
            return Err(ScriptError::Truncated {
                index,
                available,
                needed: RECORD_SIZE,
            });
        }
        let rec = &bytes[start..start + RECORD_SIZE];
        let cmd = decode_record(index, rec)?;
        if cmd == Command::End {
            break;
        }
        cmds.push(cmd);
    }
    Ok(cmds)
}

fn decode_record(index: usize, rec: &[u8]) -> Result<Command, ScriptError> {
    let cmd = match rec[0] {
        0 => Command::End,
        1 => Command::OpenFile {
            name: get_name(index, rec, PAYLOAD, NAME_AT)?,
        },
        2 => {
            let length = get_i32(rec, PAYLOAD);
            if length < 0 {
                return Err(ScriptError::BadLength { index, len: length });
            }
            Command::WriteToFile {
                length: length as u32,
                fill: rec[FILL_AT],
            }
        }
        3 => Command::RenamePath {
            from: get_name(index, rec, PAYLOAD, RENAME_NAME_A)?,
            to: get_name(index, rec, RENAME_LEN_B, RENAME_NAME_B)?,
        },
        4 => Command::UnlinkPath {
            name: get_name(index, rec, PAYLOAD, NAME_AT)?,
        },
        5 => Command::Restore,
        6 => Command::Format,
        tag => return Err(ScriptError::UnknownTag { index, tag }),
    };
    Ok(cmd)
}

fn get_i32(rec: &[u8], at: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&rec[at..at + 4]);
    i32::from_le_bytes(raw)
}

fn get_name(index: usize, rec: &[u8], len_at: usize, name_at: usize) -> Result<Name, ScriptError> {
    let len = get_i32(rec, len_at);
    if len < 0 || len as usize > MAX_NAME_LEN {
        return Err(ScriptError::BadLength { index, len });
    }
    let raw = &rec[name_at..name_at + len as usize];
    let name = std::str::from_utf8(raw).map_err(|_| ScriptError::NotUtf8 { index })?;
    Name::new(name)
}
