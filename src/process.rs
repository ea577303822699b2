//! Launch descriptions and the lifecycle of a supervised server.
//!
//! `LaunchSpec` describes what to spawn; `ServerState` tracks where a spawned
//! server sits in its lifecycle for the duration of one command.

use std::borrow::Cow;
use std::path::PathBuf;

/// What to run, where, and with which extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// The command executable.
    pub program: String,
    /// Arguments for the command.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Environment variables added on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Splits a shell-style command line into a spec.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = shell_words::split(command_line).ok()?;
        if parts.is_empty() {
            return None;
        }
        let program = parts.remove(0);
        Some(Self::new(program, parts))
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Appends the discovery marker as the final argument.
    pub fn tagged(mut self, title: &str) -> Self {
        self.args = crate::title::tag(self.args, title);
        self
    }

    /// Command line suitable for log output.
    ///
    /// Only words the shell would split or expand are quoted, so markers such
    /// as `--title=<t>` read exactly as they are matched.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|word| display_word(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn display_word(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:,@%+".contains(c));
    if plain {
        Cow::Borrowed(word)
    } else {
        shell_words::quote(word)
    }
}

/// Lifecycle of a supervised server process.
///
/// There is no health check: a server counts as running as soon as the OS
/// accepts the spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed { code: i32 },
}

impl ServerState {
    /// State after an attached server exits with `code`.
    pub fn exited(code: i32) -> Self {
        if code == 0 {
            ServerState::Stopped
        } else {
            ServerState::Crashed { code }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_preview_command() {
        let spec = LaunchSpec::parse("node ./server/index.mjs").unwrap();
        assert_eq!(spec.program, "node");
        assert_eq!(spec.args, vec!["./server/index.mjs"]);
        assert!(LaunchSpec::parse("   ").is_none());
    }

    #[test]
    fn parse_honors_quotes() {
        let spec = LaunchSpec::parse(r#"node "./my server/index.mjs" --port 3000"#).unwrap();
        assert_eq!(spec.args, vec!["./my server/index.mjs", "--port", "3000"]);
    }

    #[test]
    fn tagged_appends_marker_last() {
        let spec = LaunchSpec::parse("node index.mjs")
            .unwrap()
            .env("NITRO_PORT", "4000")
            .tagged("nitro-proxy");
        assert_eq!(spec.args.last().map(String::as_str), Some("--title=nitro-proxy"));
        assert_eq!(spec.display(), "node index.mjs --title=nitro-proxy");
        assert_eq!(spec.env, vec![("NITRO_PORT".to_string(), "4000".to_string())]);
    }

    #[test]
    fn display_quotes_only_shell_sensitive_words() {
        let spec = LaunchSpec::new(
            "node",
            vec![
                "./my server/index.mjs".into(),
                "--port=3000".into(),
                "".into(),
                "--title=web".into(),
            ],
        );
        assert_eq!(
            spec.display(),
            "node './my server/index.mjs' --port=3000 '' --title=web"
        );
        let round_trip = LaunchSpec::parse(&spec.display()).unwrap();
        assert_eq!(round_trip, spec);
    }

    #[test]
    fn exit_code_maps_to_terminal_state() {
        assert_eq!(ServerState::exited(0), ServerState::Stopped);
        assert_eq!(ServerState::exited(3), ServerState::Crashed { code: 3 });
    }
}
