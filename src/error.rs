//! Error taxonomy shared by the supervision and launch code.

use std::path::PathBuf;

use thiserror::Error;

use crate::routes::RouteError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed project config, metadata file, or missing required field.
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Route(#[from] RouteError),
    /// No process matched the requested port, pid, or title.
    #[error("{0}")]
    NotFound(String),
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The front-end output directory is absent or empty.
    #[error("build output is missing or empty: {}", .0.display())]
    BuildMissing(PathBuf),
    /// An OS listing or lookup facility could not answer.
    #[error("`{command}` failed: {message}")]
    Lookup { command: String, message: String },
    #[error("`{command}` exited with code {code}")]
    CommandFailed { command: String, code: i32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Error::Spawn {
            command: command.into(),
            source,
        }
    }

    pub fn lookup(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Lookup {
            command: command.into(),
            message: message.into(),
        }
    }
}
