//! Discovery marker embedded in a spawned process's arguments.
//!
//! A managed process carries a trailing `--title=<token>` argument. It has no
//! effect on the process itself; it only lets later scans recognize it.

use std::sync::OnceLock;

use regex::Regex;

/// Title used when none is configured.
pub const DEFAULT_TITLE: &str = "nitro-proxy";

const TITLE_FLAG: &str = "--title=";

fn title_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"--title=([^ ]*)( .*)*").expect("valid title regex"))
}

/// Appends the title marker as the last argument.
pub fn tag(mut args: Vec<String>, title: &str) -> Vec<String> {
    args.push(format!("{}{}", TITLE_FLAG, title));
    args
}

/// Extracts the marker token from a full command line.
pub fn extract_title(command_line: &str) -> Option<String> {
    let captures = title_regex().captures(command_line)?;
    captures.get(1).map(|m| m.as_str().trim().to_string())
}

/// Whether `command_line` carries exactly `title` as its marker.
pub fn has_title(command_line: &str, title: &str) -> bool {
    extract_title(command_line).as_deref() == Some(title.trim())
}
