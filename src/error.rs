use thiserror::Error;

/// Failures a command can surface to the user. Dispatch catches these at the
/// top level, logs them, and turns them into a status-line message; they are
/// never allowed to escape into the event loop.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    InvalidArgument(String),

    /// The active buffer does not expose a text surface we can drive.
    #[error("unsupported editor")]
    UnsupportedEditor,

    /// The target buffer is read-only.
    #[error("buffer is not modifiable")]
    NotModifiable,

    /// A persisted record could not be decoded.
    #[error("stored record is unreadable: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    SearchNotFound(String),
}

pub type CommandResult<T = ()> = Result<T, CommandError>;
