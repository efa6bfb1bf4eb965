use std::ffi::{CStr, OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::OnceLock;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread;

use log::{debug, warn};

use crate::channel::DuplexChannel;
use crate::error::{Error, Result};
use crate::posix;
use crate::process::ChildProcess;

/// Exit code of a child whose program could not be executed.
///
/// A bad path or missing permission shows up as this code in the reaped exit
/// status, the same convention shells use. Failures while wiring up the child
/// before the exec are reported by [`spawn`] as [`Error::Spawn`] instead.
pub const EXEC_FAILURE_CODE: u8 = 127;

/// Description of a program to run: its path, arguments, and how its output
/// is split.
///
/// `Command` is a by-value builder:
///
/// ```
/// # use linepipe::Command;
/// let cmd = Command::new("/bin/grep").args(["-i", "hello"]);
/// assert_eq!(cmd.get_args().len(), 2);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    merge_stderr: bool,
    delimiter: u8,
    cwd: Option<OsString>,
}

impl Command {
    /// Run the program at `program`.
    ///
    /// The path is used as is, without a `PATH` lookup, so it should be
    /// absolute.
    pub fn new(program: impl AsRef<OsStr>) -> Command {
        Command {
            program: program.as_ref().to_owned(),
            args: vec![],
            merge_stderr: true,
            delimiter: b'\n',
            cwd: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Command {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Whether the child's stderr goes to the same pipe as its stdout.
    ///
    /// Defaults to `true`. When `false`, the child inherits the parent's
    /// stderr.
    pub fn merge_stderr(mut self, merge: bool) -> Command {
        self.merge_stderr = merge;
        self
    }

    /// The byte output lines are split on. Defaults to `b'\n'`.
    pub fn delimiter(mut self, delimiter: u8) -> Command {
        self.delimiter = delimiter;
        self
    }

    /// Run the child in `dir` instead of the parent's working directory.
    ///
    /// A directory that cannot be entered makes [`spawn`] fail with
    /// [`Error::Spawn`].
    pub fn cwd(mut self, dir: impl AsRef<OsStr>) -> Command {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_merge_stderr(&self) -> bool {
        self.merge_stderr
    }

    pub fn get_delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn get_cwd(&self) -> Option<&OsStr> {
        self.cwd.as_deref()
    }

    /// The full argument vector passed to the program, starting with the
    /// program path itself.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Start `command` as a child process wired to a fresh [`DuplexChannel`].
///
/// The child's stdin and stdout (and stderr, unless disabled with
/// [`Command::merge_stderr`]) are connected to the channel, and the child is
/// sent SIGTERM should the calling process exit first. Failure to create the
/// pipes or the process, or to set the child up before the exec, is returned
/// as an error; failure to execute the program is only visible as
/// [`EXEC_FAILURE_CODE`] once the child is reaped.
///
/// All children are forked by one long-lived spawner thread. On Linux the
/// parent-death signal follows the thread that forked, so forking from the
/// caller's thread would kill the child as soon as that thread exits, even
/// if the returned handle had been moved elsewhere.
pub fn spawn(command: &Command) -> Result<ChildProcess> {
    let spawner_gone = || Error::Worker("spawner thread is gone".to_string());
    let (reply, response) = mpsc::sync_channel(1);
    let request = SpawnRequest {
        command: command.clone(),
        reply,
    };
    spawner(command)?.send(request).map_err(|_| spawner_gone())?;
    response.recv().map_err(|_| spawner_gone())?
}

struct SpawnRequest {
    command: Command,
    reply: SyncSender<Result<ChildProcess>>,
}

fn spawner(command: &Command) -> Result<&'static Sender<SpawnRequest>> {
    static SPAWNER: OnceLock<Sender<SpawnRequest>> = OnceLock::new();
    if let Some(sender) = SPAWNER.get() {
        return Ok(sender);
    }
    let (sender, requests) = mpsc::channel();
    thread::Builder::new()
        .name("linepipe-spawner".to_string())
        .spawn(move || serve(requests))
        .map_err(|error| Error::Spawn {
            program: command.program.clone(),
            error,
        })?;
    // If another thread won the race, our sender is dropped here and the
    // thread started above exits without having forked anything.
    Ok(SPAWNER.get_or_init(|| sender))
}

fn serve(requests: Receiver<SpawnRequest>) {
    for SpawnRequest { command, reply } in requests {
        let result = fork_exec(&command);
        if let Err(mpsc::SendError(Ok(child))) = reply.send(result) {
            warn!("no one is waiting for child {}, killing it", child.pid());
            let _ = child.kill();
        }
    }
}

fn fork_exec(command: &Command) -> Result<ChildProcess> {
    let spawn_error = |error: io::Error| Error::Spawn {
        program: command.program.clone(),
        error,
    };

    let mut channel = DuplexChannel::with_delimiter(command.delimiter).map_err(Error::Pipe)?;
    let (mut exec_fail_read, exec_fail_write) = posix::pipe().map_err(Error::Pipe)?;
    let argv = command.argv();
    let just_exec = posix::prep_exec(&command.program, &argv).map_err(spawn_error)?;
    let cwd = match &command.cwd {
        Some(dir) => Some(posix::os_to_cstring(dir).map_err(spawn_error)?),
        None => None,
    };
    let parent_pid = posix::getpid();

    let pid = match unsafe { posix::fork() }.map_err(spawn_error)? {
        Some(pid) => pid,
        None => {
            // Nothing here may allocate: another thread of the parent may
            // have held the allocator lock at the time of the fork.
            drop(exec_fail_read);
            let setup = ChildSetup {
                merge_stderr: command.merge_stderr,
                cwd: cwd.as_deref(),
                parent_pid,
            };
            if let Err(e) = setup.apply(&mut channel) {
                report_setup_failure(exec_fail_write, e);
            }
            let _ = just_exec();
            posix::_exit(EXEC_FAILURE_CODE);
        }
    };
    drop(exec_fail_write);

    let mut child = ChildProcess::new(pid, channel);
    child.channel_mut().set_as_parent_end().map_err(spawn_error)?;
    match read_exact_or_eof::<4>(&mut exec_fail_read).map_err(spawn_error)? {
        None => {
            debug!("spawned {:?} as child {}", command.program, pid);
            Ok(child)
        }
        Some(error_buf) => {
            // the child exits right after reporting, dropping it reaps
            let error_code = u32::from_le_bytes(error_buf) as i32;
            Err(spawn_error(io::Error::from_raw_os_error(error_code)))
        }
    }
}

struct ChildSetup<'a> {
    merge_stderr: bool,
    cwd: Option<&'a CStr>,
    parent_pid: u32,
}

impl ChildSetup<'_> {
    // Runs in the forked child, so it must not allocate.
    fn apply(&self, channel: &mut DuplexChannel) -> io::Result<()> {
        channel.set_as_child_end(self.merge_stderr)?;
        posix::set_parent_death_signal(posix::SIGTERM)?;
        // the parent may have exited before the death signal was armed
        if posix::getppid() != self.parent_pid {
            posix::_exit(EXEC_FAILURE_CODE);
        }
        if let Some(dir) = self.cwd {
            posix::chdir(dir)?;
        }
        posix::reset_sigpipe()
    }
}

fn report_setup_failure(mut exec_fail_write: File, error: io::Error) -> ! {
    let error_code = error.raw_os_error().unwrap_or(posix::EINVAL) as u32;
    let _ = exec_fail_write.write_all(&error_code.to_le_bytes());
    posix::_exit(EXEC_FAILURE_CODE)
}

/// Read exactly `N` bytes, or nothing at all if the source is at EOF.
pub(crate) fn read_exact_or_eof<const N: usize>(
    source: &mut impl Read,
) -> io::Result<Option<[u8; N]>> {
    let mut buf = [0u8; N];
    let mut total_read = 0;
    while total_read < N {
        let n = source.read(&mut buf[total_read..])?;
        if n == 0 {
            break;
        }
        total_read += n;
    }
    match total_read {
        0 => Ok(None),
        n if n == N => Ok(Some(buf)),
        _ => Err(io::ErrorKind::UnexpectedEof.into()),
    }
}
