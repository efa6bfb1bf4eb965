use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::mem;

use crate::error::Result;
use crate::execute::pump_input;
use crate::process::{ChildProcess, ExitStatus};
use crate::spawn::{Command, spawn};

/// A running child whose output is consumed by iteration.
///
/// [`open`](Self::open) starts the child and writes all of its input before
/// returning; the output is then read lazily, one line per step of the
/// [`Lines`] cursor:
///
/// ```no_run
/// # use std::collections::VecDeque;
/// # use linepipe::{Command, LineStream};
/// # fn dummy() -> linepipe::Result<()> {
/// let mut input = VecDeque::from(["hello\n".to_string(), "world\n".to_string()]);
/// let mut stream = LineStream::open(&Command::new("/bin/grep").arg("hello"), &mut input)?;
/// for line in &mut stream {
///     println!("received: {}", line);
/// }
/// # Ok(())
/// # }
/// ```
///
/// The child is reaped by [`finish`](Self::finish), or else when the stream is
/// dropped. Output not read by then is discarded.
#[derive(Debug)]
pub struct LineStream {
    child: ChildProcess,
}

impl LineStream {
    /// Start `command`, write all of `input` to it and close its stdin.
    ///
    /// Written lines are removed from `input`. If the child stops accepting
    /// input early, the unwritten lines stay in `input`.
    pub fn open(command: &Command, input: &mut VecDeque<String>) -> Result<LineStream> {
        let mut child = spawn(command)?;
        pump_input(&mut child, input);
        Ok(LineStream { child })
    }

    /// Returns the PID of the child.
    pub fn pid(&self) -> u32 {
        self.child.pid()
    }

    /// A cursor over the remaining output, positioned on the next line.
    ///
    /// The output can only be traversed once: once a cursor is exhausted,
    /// every later cursor starts out exhausted.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines::new(&mut self.child)
    }

    /// Discard any unread output, reap the child and return its exit status.
    pub fn finish(mut self) -> Result<ExitStatus> {
        self.child.wait()
    }
}

impl<'a> IntoIterator for &'a mut LineStream {
    type Item = String;
    type IntoIter = Lines<'a>;

    fn into_iter(self) -> Lines<'a> {
        self.lines()
    }
}

#[derive(Debug)]
enum Cursor {
    // holds a line read ahead but not yet handed out
    Ready(String),
    Iterating,
    Exhausted,
}

/// Forward-only cursor over a [`LineStream`]'s output.
///
/// Creating the cursor reads the first line, so a child that produced no
/// output yields an already exhausted cursor.
#[derive(Debug)]
pub struct Lines<'a> {
    child: &'a mut ChildProcess,
    cursor: Cursor,
}

impl<'a> Lines<'a> {
    fn new(child: &'a mut ChildProcess) -> Lines<'a> {
        let cursor = match child.read_line() {
            Some(line) => Cursor::Ready(line),
            None => Cursor::Exhausted,
        };
        Lines { child, cursor }
    }

    /// True once the child's output has ended.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.cursor, Cursor::Exhausted)
    }

    /// The line the next call to `next()` will return, if already read.
    pub fn peek(&self) -> Option<&str> {
        match &self.cursor {
            Cursor::Ready(line) => Some(line.as_str()),
            Cursor::Iterating | Cursor::Exhausted => None,
        }
    }
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match mem::replace(&mut self.cursor, Cursor::Iterating) {
            Cursor::Ready(line) => Some(line),
            Cursor::Iterating => {
                let line = self.child.read_line();
                if line.is_none() {
                    self.cursor = Cursor::Exhausted;
                }
                line
            }
            Cursor::Exhausted => {
                self.cursor = Cursor::Exhausted;
                None
            }
        }
    }
}

impl FusedIterator for Lines<'_> {}
