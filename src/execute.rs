use std::collections::VecDeque;

use log::warn;

use crate::error::Result;
use crate::process::{ChildProcess, ExitStatus};
use crate::spawn::{Command, spawn};

/// Output lines and exit status of a finished child, as returned by
/// [`check_output`].
#[derive(Debug, Clone)]
pub struct Capture {
    /// Output lines in the order the child produced them.
    pub lines: Vec<String>,
    /// Exit status of the child.
    pub exit_status: ExitStatus,
}

impl Capture {
    /// True if the child exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_status.success()
    }
}

/// Write queued lines to the child front to back, then close its input.
///
/// Each line is removed from `input` once written. If the child stops
/// accepting input, pumping stops there and the unwritten lines stay in
/// `input`; the input is closed either way.
pub(crate) fn pump_input(child: &mut ChildProcess, input: &mut VecDeque<String>) {
    while let Some(line) = input.front() {
        if let Err(e) = child.write_input(line) {
            warn!(
                "child {} stopped accepting input ({}), {} line(s) not written",
                child.pid(),
                e,
                input.len()
            );
            break;
        }
        input.pop_front();
    }
    child.close_input();
}

/// Run `command`, feeding it `input` and passing each output line to
/// `on_line`.
///
/// All of `input` is written and the child's stdin closed before any output
/// is read. Lines must carry their own terminators: `"1+1\n"`, not `"1+1"`.
/// `on_line` is called on the current thread, once per output line, in order,
/// with the delimiter stripped. Returns the exit status once the child's
/// output has ended and the child has been reaped.
///
/// Only a failure to start the child is returned as an error; a program that
/// can't be executed exits with [`EXEC_FAILURE_CODE`](crate::EXEC_FAILURE_CODE).
///
/// ```no_run
/// # use std::collections::VecDeque;
/// # use linepipe::{Command, execute};
/// # fn dummy() -> linepipe::Result<()> {
/// let mut input = VecDeque::from(["1+1\n".to_string(), "2^10\n".to_string()]);
/// let status = execute(&Command::new("/usr/bin/bc"), &mut input, |line| {
///     println!("output: {}", line);
/// })?;
/// assert!(status.success());
/// # Ok(())
/// # }
/// ```
pub fn execute<F>(
    command: &Command,
    input: &mut VecDeque<String>,
    mut on_line: F,
) -> Result<ExitStatus>
where
    F: FnMut(String),
{
    let mut child = spawn(command)?;
    pump_input(&mut child, input);
    while let Some(line) = child.read_line() {
        on_line(line);
    }
    child.wait()
}

/// Like [`execute`], but collect the output lines instead of handing them to
/// a callback.
pub fn check_output(command: &Command, input: &mut VecDeque<String>) -> Result<Capture> {
    let mut lines = vec![];
    let exit_status = execute(command, input, |line| lines.push(line))?;
    Ok(Capture { lines, exit_status })
}
