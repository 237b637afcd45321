//! Line-oriented script syntax.
//!
//! ```text
//! # comment
//! format
//! file_open log append
//! write_to_file data A 100
//! path_rename data data.old
//! path_unlink log
//! restore
//! ```
//!
//! `write_to_file NAME C LEN` opens NAME and appends LEN copies of the
//! character C, so it expands into two commands. Names are word characters,
//! dots and dashes.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ScriptError;
use crate::script::Command;

const NAME: &str = r"([\w.-]+)";

static BLANK_RE: LazyLock<Regex> = LazyLock::new(|| line_re(""));
static FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| line_re(r"format"));
static RESTORE_RE: LazyLock<Regex> = LazyLock::new(|| line_re(r"restore"));
static FILE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| line_re(&format!(r"file_open\s+{NAME}(?:\s+(\w+))?")));
static WRITE_TO_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| line_re(&format!(r"write_to_file\s+{NAME}\s+(\S+)\s+(\S+)")));
static PATH_RENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| line_re(&format!(r"path_rename\s+{NAME}\s+{NAME}")));
static PATH_UNLINK_RE: LazyLock<Regex> =
    LazyLock::new(|| line_re(&format!(r"path_unlink\s+{NAME}")));

/// Anchor `body` to a whole line, allowing a trailing comment.
fn line_re(body: &str) -> Regex {
    let pattern = format!(r"^\s*{body}\s*(?:#.*)?$");
    match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => panic!("bad script pattern {pattern}: {e}"),
    }
}

/// Parse a whole script.
pub fn parse(src: &str) -> Result<Vec<Command>, ScriptError> {
    let mut cmds = Vec::new();
    for (i, line) in src.lines().enumerate() {
        parse_line(line, &mut cmds).map_err(|detail| ScriptError::Parse {
            line: i + 1,
            detail,
        })?;
    }
    Ok(cmds)
}

fn parse_line(line: &str, out: &mut Vec<Command>) -> Result<(), String> {
    if BLANK_RE.is_match(line) {
        return Ok(());
    }

    if FORMAT_RE.is_match(line) {
        out.push(Command::Format);
    } else if RESTORE_RE.is_match(line) {
        out.push(Command::Restore);
    } else if let Some(cap) = FILE_OPEN_RE.captures(line) {
        match cap.get(2).map(|m| m.as_str()) {
            None | Some("append") => {}
            Some(mode) => return Err(format!("unsupported open mode `{mode}`")),
        }
        out.push(Command::open_file(&cap[1]).map_err(|e| e.to_string())?);
    } else if let Some(cap) = WRITE_TO_FILE_RE.captures(line) {
        let fill = match cap[2].as_bytes() {
            [c] => *c,
            _ => return Err(format!("fill `{}` is not a single character", &cap[2])),
        };
        let len = cap[3]
            .parse::<u32>()
            .map_err(|e| format!("bad length `{}`: {e}", &cap[3]))?;
        out.push(Command::open_file(&cap[1]).map_err(|e| e.to_string())?);
        out.push(Command::write_to_file(len, fill));
    } else if let Some(cap) = PATH_RENAME_RE.captures(line) {
        out.push(Command::rename_path(&cap[1], &cap[2]).map_err(|e| e.to_string())?);
    } else if let Some(cap) = PATH_UNLINK_RE.captures(line) {
        out.push(Command::unlink_path(&cap[1]).map_err(|e| e.to_string())?);
    } else {
        return Err(format!("invalid command \"{}\"", line.trim()));
    }
    Ok(())
}
