//! Parsers for `smbclient` output

use super::{ProtocolError, ProtocolErrorKind, RemoteEntry};
use regex::Regex;
use std::sync::OnceLock;

/// Printed by `pwd`; delimits the output of each command sent to a session
pub const DIRECTORY_MARKER: &str = "Current directory is";

/// `  name   attrs   size  Www Mmm dd hh:mm:ss yyyy`
fn listing_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^  (?P<name>.+?)\s+(?P<attrs>[A-Z]*)\s+(?P<size>\d+)\s+\w{3} \w{3}\s+\d{1,2} \d{2}:\d{2}:\d{2} \d{4}$",
        )
        .expect("listing regex is valid")
    })
}

fn status_code() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"NT_STATUS_[A-Z_]+").expect("status regex is valid"))
}

/// Strip an interactive prompt (`smb: \dir\> `) glued to the front of a line.
pub fn strip_prompt(line: &str) -> &str {
    if line.starts_with("smb: ") {
        if let Some(idx) = line.find("> ") {
            return &line[idx + 2..];
        }
    }
    line
}

/// Parse one line of `ls` output. Summary lines and blanks yield `None`,
/// as do the `.` and `..` entries.
pub fn parse_listing_line(line: &str) -> Option<RemoteEntry> {
    let caps = listing_line().captures(strip_prompt(line))?;
    let name = caps.name("name")?.as_str();
    if name == "." || name == ".." {
        return None;
    }
    let is_directory = caps.name("attrs")?.as_str().contains('D');
    let size = caps.name("size")?.as_str().parse().ok()?;

    Some(RemoteEntry {
        name: name.to_string(),
        size: if is_directory { 0 } else { size },
        is_directory,
    })
}

/// First `NT_STATUS_*` code mentioned in `text`
pub fn find_status(text: &str) -> Option<&str> {
    status_code().find(text).map(|m| m.as_str())
}

/// Turn the output of one `ls` into entries or a classified error.
///
/// An empty directory lists as `NT_STATUS_NO_SUCH_FILE`; that is success.
pub fn parse_listing(lines: &[String]) -> Result<Vec<RemoteEntry>, ProtocolError> {
    let entries: Vec<RemoteEntry> = lines.iter().filter_map(|l| parse_listing_line(l)).collect();
    if !entries.is_empty() {
        return Ok(entries);
    }

    for line in lines {
        match find_status(line) {
            Some("NT_STATUS_NO_SUCH_FILE") => return Ok(Vec::new()),
            Some(status) => {
                return Err(ProtocolError::new(
                    ProtocolErrorKind::from_status(status),
                    strip_prompt(line).trim(),
                ))
            }
            None => {}
        }
    }
    Ok(Vec::new())
}

/// Parse `smbclient -g -L` output into disk share names.
///
/// With no disk shares, a status code anywhere in the output (or a failed
/// exit) makes the whole enumeration an error.
pub fn parse_share_list(output: &str, exited_ok: bool) -> Result<Vec<String>, ProtocolError> {
    let shares: Vec<String> = output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '|');
            match (fields.next(), fields.next()) {
                (Some("Disk"), Some(name)) if !name.is_empty() => Some(name.to_string()),
                _ => None,
            }
        })
        .collect();
    if !shares.is_empty() {
        return Ok(shares);
    }

    if let Some(status) = find_status(output) {
        return Err(ProtocolError::new(ProtocolErrorKind::from_status(status), status));
    }
    if !exited_ok {
        let detail = output.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("no output");
        return Err(ProtocolError::other(format!("share enumeration failed: {detail}")));
    }
    Ok(Vec::new())
}
