mod process;
mod stream;

use std::collections::VecDeque;
use std::io;

use crate::{Capture, ChildProcess, Command, DuplexChannel, Error, ExitStatus, LineStream, Pending};

fn assert_send<T: Send>() {}
fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn public_types_are_send() {
    assert_send_sync::<Command>();
    assert_send_sync::<ExitStatus>();
    assert_send_sync::<Capture>();
    assert_send_sync::<Error>();
    assert_send_sync::<DuplexChannel>();
    assert_send::<ChildProcess>();
    assert_send::<LineStream>();
    assert_send::<Pending>();
}

pub fn input(lines: &[&str]) -> VecDeque<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

pub fn sh(script: &str) -> Command {
    Command::new("/bin/sh").args(["-c", script])
}

/// True if `pid` is no longer a child of this process waiting to be reaped.
pub fn is_reaped(pid: u32) -> bool {
    let rc = unsafe { libc::waitpid(pid as libc::pid_t, std::ptr::null_mut(), libc::WNOHANG) };
    rc == -1 && io::Error::last_os_error().raw_os_error() == Some(libc::ECHILD)
}
