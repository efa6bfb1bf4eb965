use std::ffi::OsString;
use std::io;

use thiserror::Error;

/// Errors surfaced by the drivers.
///
/// Only failures that prevent a child from being run at all, or from being
/// reaped, are reported this way. A program that cannot be executed shows up
/// as an exit status of [`EXEC_FAILURE_CODE`](crate::EXEC_FAILURE_CODE), a
/// child that stops reading its input ends the input early, and a child that
/// dies mid-stream ends the output early.
#[derive(Debug, Error)]
pub enum Error {
    /// The pipes connecting parent and child could not be created.
    #[error("could not create pipe: {0}")]
    Pipe(io::Error),

    /// The child process could not be created.
    #[error("could not spawn {program:?}: {error}")]
    Spawn {
        /// The program that was to be run.
        program: OsString,

        /// The error raised by `fork()`, by argument preparation, or by the
        /// child while setting itself up before the exec.
        error: io::Error,
    },

    /// Waiting for the child to exit failed.
    #[error("error while waiting for child {pid} to exit: {error}")]
    Wait {
        /// PID of the child.
        pid: u32,

        /// The error raised by `waitpid()`.
        error: io::Error,
    },

    /// A background worker panicked, or the thread that forks children is
    /// gone.
    #[error("background worker failed: {0}")]
    Worker(String),
}

/// Result type of the drivers.
pub type Result<T> = std::result::Result<T, Error>;
