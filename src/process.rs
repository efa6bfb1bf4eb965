use std::fmt;
use std::io;

use log::{debug, warn};

use crate::channel::DuplexChannel;
use crate::error::{Error, Result};
use crate::posix;

/// Exit status of a child process.
///
/// This is an opaque wrapper around the raw status reported by `waitpid()`.
/// Use [`code`](Self::code) and [`signal`](Self::signal) to tell a normal exit
/// from death by signal instead of treating the raw value as a return code.
#[derive(Eq, PartialEq, Hash, Copy, Clone)]
pub struct ExitStatus(Option<i32>);

impl ExitStatus {
    /// Create an `ExitStatus` from a raw `waitpid()` status.
    pub fn from_raw(raw: i32) -> ExitStatus {
        ExitStatus(Some(raw))
    }

    /// Status of a child that is known to have finished, but whose status was
    /// collected by someone else.
    pub(crate) fn undetermined() -> ExitStatus {
        ExitStatus(None)
    }

    /// The raw `waitpid()` status, if determined.
    pub fn raw(&self) -> Option<i32> {
        self.0
    }

    /// Returns the exit code if the process exited normally.
    ///
    /// Returns `None` if the process was killed by a signal.
    pub fn code(&self) -> Option<u32> {
        let raw = self.0?;
        libc::WIFEXITED(raw).then(|| libc::WEXITSTATUS(raw) as u32)
    }

    /// Returns the signal number if the process was killed by a signal.
    pub fn signal(&self) -> Option<i32> {
        let raw = self.0?;
        libc::WIFSIGNALED(raw).then(|| libc::WTERMSIG(raw))
    }

    /// True if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code() == Some(0)
    }

    /// True if the process was killed by signal `signum`.
    pub fn is_killed_by(&self, signum: i32) -> bool {
        self.signal() == Some(signum)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(raw) if libc::WIFEXITED(raw) => {
                write!(f, "exit code {}", libc::WEXITSTATUS(raw))
            }
            Some(raw) if libc::WIFSIGNALED(raw) => {
                write!(f, "signal {}", libc::WTERMSIG(raw))
            }
            Some(raw) => write!(f, "unrecognized wait status: {} {:#x}", raw, raw),
            None => write!(f, "undetermined exit status"),
        }
    }
}

impl fmt::Debug for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(raw) if libc::WIFEXITED(raw) => {
                write!(f, "ExitStatus(Exited({}))", libc::WEXITSTATUS(raw))
            }
            Some(raw) if libc::WIFSIGNALED(raw) => {
                write!(f, "ExitStatus(Signal({}))", libc::WTERMSIG(raw))
            }
            Some(raw) => write!(f, "ExitStatus(Unknown({} {:#x}))", raw, raw),
            None => write!(f, "ExitStatus(Undetermined)"),
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum ProcessState {
    Running,
    Finished(ExitStatus),
}

/// A spawned child process together with the channel to its stdin and stdout.
///
/// Created by [`spawn`](crate::spawn). The child is reaped exactly once,
/// either by an explicit [`wait`](Self::wait) or when the handle is dropped.
/// Reaping always closes the channel first, so a child blocked on a full
/// output pipe cannot keep the reaper waiting forever.
#[derive(Debug)]
pub struct ChildProcess {
    pid: u32,
    channel: DuplexChannel,
    state: ProcessState,
}

impl ChildProcess {
    pub(crate) fn new(pid: u32, channel: DuplexChannel) -> ChildProcess {
        ChildProcess {
            pid,
            channel,
            state: ProcessState::Running,
        }
    }

    /// Returns the PID of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The channel connected to the child's stdin and stdout.
    pub fn channel_mut(&mut self) -> &mut DuplexChannel {
        &mut self.channel
    }

    /// Write `data` to the child's stdin. See [`DuplexChannel::write_input`].
    pub fn write_input(&mut self, data: &str) -> io::Result<usize> {
        self.channel.write_input(data)
    }

    /// Close the child's stdin. See [`DuplexChannel::close_input`].
    pub fn close_input(&mut self) -> bool {
        let was_open = self.channel.close_input();
        if was_open {
            debug!("closed input of child {}", self.pid);
        }
        was_open
    }

    /// Read a line of the child's output. See [`DuplexChannel::read_line`].
    pub fn read_line(&mut self) -> Option<String> {
        self.channel.read_line()
    }

    /// See [`DuplexChannel::is_good`].
    pub fn is_good(&self) -> bool {
        self.channel.is_good()
    }

    /// Returns the exit status if the child has already been reaped.
    ///
    /// This does not perform any system calls.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.state {
            ProcessState::Finished(status) => Some(status),
            ProcessState::Running => None,
        }
    }

    /// Close the channel, wait for the child to exit, and return its status.
    ///
    /// Output not read before this call is discarded. Once the child has been
    /// reaped, further calls return the cached status.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.channel.shutdown();
        loop {
            if let ProcessState::Finished(status) = self.state {
                return Ok(status);
            }
            match posix::waitpid(self.pid, 0) {
                Ok((pid_out, status)) if pid_out == self.pid => {
                    debug!("reaped child {}: {}", self.pid, status);
                    self.state = ProcessState::Finished(status);
                }
                Ok(_) => {}
                Err(e) if e.raw_os_error() == Some(posix::EINTR) => {}
                Err(e) if e.raw_os_error() == Some(posix::ECHILD) => {
                    // Someone else waited for the child. The PID no longer exists and we
                    // cannot find its exit status.
                    self.state = ProcessState::Finished(ExitStatus::undetermined());
                }
                Err(error) => {
                    return Err(Error::Wait {
                        pid: self.pid,
                        error,
                    });
                }
            }
        }
    }

    /// Send SIGTERM to the child.
    pub fn terminate(&self) -> io::Result<()> {
        self.send_signal(posix::SIGTERM)
    }

    /// Send SIGKILL to the child.
    pub fn kill(&self) -> io::Result<()> {
        self.send_signal(posix::SIGKILL)
    }

    /// Send `signal` to the child.
    ///
    /// Does nothing if the child has already been reaped, since its PID may
    /// have been reused.
    pub fn send_signal(&self, signal: i32) -> io::Result<()> {
        match self.state {
            ProcessState::Finished(_) => Ok(()),
            ProcessState::Running => posix::kill(self.pid, signal),
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if let ProcessState::Running = self.state
            && let Err(e) = self.wait()
        {
            warn!("failed to reap child {}: {}", self.pid, e);
        }
    }
}
