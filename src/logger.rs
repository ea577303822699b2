//! Tagged console logging.
//!
//! Components receive a `Logger` scoped to their own tag at construction time
//! instead of reaching for a process-wide instance. Events are emitted through
//! `tracing`, so verbosity is controlled by `NITRO_PROXY_LOG` for every command.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "NITRO_PROXY_LOG";

/// Installs the stderr subscriber. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(colors_enabled())
        .with_writer(std::io::stderr)
        .try_init();
}

/// A logger bound to a tag such as `nitro-proxy:stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    tag: String,
}

impl Logger {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// Returns a child logger whose tag is nested under this one.
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            tag: format!("{}:{}", self.tag, tag),
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        tracing::debug!("{}", self.format(message.as_ref()));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        tracing::info!("{}", self.format(message.as_ref()));
    }

    pub fn success(&self, message: impl AsRef<str>) {
        let line = format!("{} {}", apply_color("\u{2714}", Some("green")), message.as_ref());
        tracing::info!("{}", self.format(&line));
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        tracing::warn!("{}", self.format(message.as_ref()));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        tracing::error!("{}", self.format(message.as_ref()));
    }

    fn format(&self, message: &str) -> String {
        format!("[{}] {}", self.tag, message)
    }
}

/// Whether log lines may carry ANSI colors: only when stderr is a terminal,
/// the same condition `init` uses for the subscriber.
fn colors_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::io::stderr().is_terminal())
}

/// Colors `text` when colors are enabled; plain text otherwise.
pub fn apply_color(text: &str, color: Option<&str>) -> String {
    if colors_enabled() {
        paint(text, color)
    } else {
        text.to_string()
    }
}

/// Wraps `text` in an ANSI color sequence. Unknown colors leave it untouched.
fn paint(text: &str, color: Option<&str>) -> String {
    let code = match color.unwrap_or("").to_lowercase().as_str() {
        "red" => "31",
        "green" => "32",
        "yellow" => "33",
        "blue" => "34",
        "magenta" => "35",
        "cyan" => "36",
        "gray" | "grey" => "90",
        _ => "0",
    };
    if code == "0" {
        text.to_string()
    } else {
        format!("\u{1b}[{}m{}\u{1b}[0m", code, text)
    }
}

/// Highlights a value (path, command, URL) inside a log line.
pub fn green(text: impl AsRef<str>) -> String {
    apply_color(text.as_ref(), Some("green"))
}

pub fn red(text: impl AsRef<str>) -> String {
    apply_color(text.as_ref(), Some("red"))
}
