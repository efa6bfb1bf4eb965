use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::mem;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};

use log::{trace, warn};

use crate::posix;

/// Which process a channel has been bound to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Side {
    Unselected,
    Parent,
    Child,
}

/// A pair of pipes connecting a parent process with one child.
///
/// The channel is created before forking. Afterwards each process selects its
/// own half: the child with [`set_as_child_end`], which moves the child-side
/// descriptors onto its standard streams, and the parent with
/// [`set_as_parent_end`], which keeps only the write end of the child's stdin
/// and the read end of the child's stdout.
///
/// All descriptors are owned by `File`s and are therefore closed exactly once,
/// no matter how the channel is dropped.
///
/// [`set_as_child_end`]: DuplexChannel::set_as_child_end
/// [`set_as_parent_end`]: DuplexChannel::set_as_parent_end
#[derive(Debug)]
pub struct DuplexChannel {
    side: Side,
    // Parent side: write end of the child's stdin, read end of its stdout.
    to_child: Option<File>,
    from_child: Option<BufReader<File>>,
    // Child side: read end of stdin, write end of stdout.
    child_stdin: Option<File>,
    child_stdout: Option<File>,
    delimiter: u8,
    good: bool,
    line: Vec<u8>,
}

impl DuplexChannel {
    /// Create both pipes, splitting output on newlines.
    pub fn new() -> io::Result<DuplexChannel> {
        DuplexChannel::with_delimiter(b'\n')
    }

    /// Create both pipes, splitting output on `delimiter`.
    pub fn with_delimiter(delimiter: u8) -> io::Result<DuplexChannel> {
        let (child_stdin, to_child) = posix::pipe()?;
        let (from_child, child_stdout) = posix::pipe()?;
        Ok(DuplexChannel {
            side: Side::Unselected,
            to_child: Some(to_child),
            from_child: Some(BufReader::new(from_child)),
            child_stdin: Some(child_stdin),
            child_stdout: Some(child_stdout),
            delimiter,
            good: true,
            line: Vec::new(),
        })
    }

    /// Wire the calling process's stdin and stdout (and, if `merge_stderr`,
    /// stderr) to the channel.
    ///
    /// Must only be called in a freshly forked child, before exec. It does not
    /// allocate or free memory, and errors carry no message, so it is safe to
    /// call between fork and exec. An error leaves the child's standard
    /// streams in an unknown state; the only sane reaction is to exit.
    pub fn set_as_child_end(&mut self, merge_stderr: bool) -> io::Result<()> {
        if self.side != Side::Unselected {
            return Err(ErrorKind::InvalidInput.into());
        }
        self.side = Side::Child;

        if let Some(to_child) = self.to_child.take() {
            posix::close(to_child.into_raw_fd())?;
        }
        if let Some(from_child) = self.from_child.take() {
            let fd = from_child.get_ref().as_raw_fd();
            // dropping the BufReader would free its buffer
            mem::forget(from_child);
            posix::close(fd)?;
        }

        let (Some(stdin), Some(stdout)) = (self.child_stdin.take(), self.child_stdout.take())
        else {
            return Err(ErrorKind::InvalidInput.into());
        };
        let stdin = lift_above_standard(stdin.into_raw_fd())?;
        let stdout = lift_above_standard(stdout.into_raw_fd())?;

        posix::dup2(stdin, posix::STDIN_FD)?;
        posix::dup2(stdout, posix::STDOUT_FD)?;
        if merge_stderr {
            posix::dup2(stdout, posix::STDERR_FD)?;
        }
        posix::close(stdin)?;
        posix::close(stdout)?;
        Ok(())
    }

    /// Release the child's half of the channel in the parent.
    ///
    /// After this, the child holds the only copies of the descriptors it
    /// reads from and writes to, so end-of-file propagates in both
    /// directions.
    pub fn set_as_parent_end(&mut self) -> io::Result<()> {
        if self.side != Side::Unselected {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "channel end already selected",
            ));
        }
        self.side = Side::Parent;
        self.child_stdin = None;
        self.child_stdout = None;
        Ok(())
    }

    /// Write `data` to the child's stdin.
    ///
    /// No framing is added; a line meant to be seen as such by the child must
    /// carry its own terminator. Blocks while the pipe buffer is full.
    /// Returns the number of bytes written.
    pub fn write_input(&mut self, data: &str) -> io::Result<usize> {
        let Some(to_child) = self.to_child.as_mut() else {
            return Err(io::Error::new(
                ErrorKind::NotConnected,
                "child input already closed",
            ));
        };
        to_child.write_all(data.as_bytes())?;
        trace!("wrote {} bytes to child", data.len());
        Ok(data.len())
    }

    /// Close the child's stdin, signaling end of input.
    ///
    /// Returns `false` if the input was already closed.
    pub fn close_input(&mut self) -> bool {
        self.to_child.take().is_some()
    }

    /// Whether [`close_input`](Self::close_input) has been called.
    pub fn is_input_closed(&self) -> bool {
        self.to_child.is_none()
    }

    /// Read the next line of the child's output, without its delimiter.
    ///
    /// Blocks until a full line is available or the child closes its output.
    /// A final line lacking a delimiter is still returned. Returns `None` at
    /// end of stream, after which [`is_good`](Self::is_good) is `false`. A read
    /// error also ends the stream.
    pub fn read_line(&mut self) -> Option<String> {
        if !self.good {
            return None;
        }
        let Some(from_child) = self.from_child.as_mut() else {
            self.good = false;
            return None;
        };
        self.line.clear();
        match from_child.read_until(self.delimiter, &mut self.line) {
            Ok(0) => {
                self.good = false;
                None
            }
            Ok(_) => {
                if self.line.last() == Some(&self.delimiter) {
                    self.line.pop();
                }
                let line = String::from_utf8_lossy(&self.line).into_owned();
                trace!("read line from child: {:?}", line);
                Some(line)
            }
            Err(e) => {
                warn!("error reading from child: {}", e);
                self.good = false;
                None
            }
        }
    }

    /// `false` once a read has hit end of stream or failed.
    pub fn is_good(&self) -> bool {
        self.good
    }

    /// The byte output lines are split on.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Close every descriptor still held, discarding unread output.
    ///
    /// A child still writing gets `EPIPE` or `SIGPIPE` instead of blocking on
    /// a full pipe, and a child still reading sees end of file.
    pub(crate) fn shutdown(&mut self) {
        self.to_child = None;
        self.from_child = None;
        self.child_stdin = None;
        self.child_stdout = None;
        self.good = false;
    }
}

// Standard stream numbers are about to be overwritten by dup2, so a pipe end
// that happens to occupy one of them is first moved out of the way.
fn lift_above_standard(fd: RawFd) -> io::Result<RawFd> {
    if fd > posix::STDERR_FD {
        return Ok(fd);
    }
    let lifted = posix::dup_above(fd, posix::STDERR_FD + 1)?;
    posix::close(fd)?;
    Ok(lifted)
}
