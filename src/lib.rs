//! Execution of a child process as a line-oriented transform.
//!
//! The child is started with its stdin and stdout connected to pipes. Input
//! lines are written to its stdin, which is then closed, and the child's
//! output is read back one line at a time until it ends. Finally the child is
//! reaped and its [`ExitStatus`] returned.
//!
//! The same protocol is available in three shapes:
//!
//! * [`execute`] blocks the current thread, handing each output line to a
//!   callback; [`check_output`] collects the lines instead.
//! * [`spawn_async`] runs [`execute`] on a worker thread and returns a
//!   [`Pending`] exit status.
//! * [`LineStream`] writes the input up front and lets the caller pull the
//!   output through an iterator, reaping the child when dropped.
//!
//! # Examples
//!
//! Filter lines through `grep`:
//!
//! ```no_run
//! # use std::collections::VecDeque;
//! # use linepipe::*;
//! # fn dummy() -> linepipe::Result<()> {
//! let mut input: VecDeque<String> = ["12232\n", "hello, world\n", "Hello, world\n"]
//!     .into_iter()
//!     .map(String::from)
//!     .collect();
//! let capture = check_output(&Command::new("/bin/grep").args(["-i", "hello"]), &mut input)?;
//! assert_eq!(capture.lines, ["hello, world", "Hello, world"]);
//! # Ok(())
//! # }
//! ```
//!
//! Input is written in full before any output is read. A child that writes
//! more output than fits in a pipe buffer before it has consumed all of its
//! input will therefore deadlock with the parent; such children need their
//! input fed in smaller batches.
//!
//! On Linux and Android, children are sent SIGTERM when the process that
//! spawned them exits.
//!
//! This crate is Unix-only.

#![cfg(unix)]

mod background;
mod channel;
mod error;
mod execute;
mod posix;
mod process;
mod spawn;
mod stream;

#[cfg(test)]
mod tests;

pub use background::{Pending, spawn_async};
pub use channel::DuplexChannel;
pub use error::{Error, Result};
pub use execute::{Capture, check_output, execute};
pub use process::{ChildProcess, ExitStatus};
pub use spawn::{Command, EXEC_FAILURE_CODE, spawn};
pub use stream::{LineStream, Lines};
