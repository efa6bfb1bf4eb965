use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::thread;

use tempfile::TempDir;

use crate::spawn::read_exact_or_eof;
use crate::{Command, EXEC_FAILURE_CODE, Error, ExitStatus, spawn};

use super::{is_reaped, sh};

#[test]
fn decode_exit_code() {
    let status = ExitStatus::from_raw(7 << 8);
    assert_eq!(status.code(), Some(7));
    assert_eq!(status.signal(), None);
    assert!(!status.success());
    assert_eq!(status.raw(), Some(7 << 8));
    assert_eq!(status.to_string(), "exit code 7");
    assert_eq!(format!("{:?}", status), "ExitStatus(Exited(7))");
}

#[test]
fn decode_signal() {
    let status = ExitStatus::from_raw(libc::SIGKILL);
    assert_eq!(status.code(), None);
    assert!(status.is_killed_by(libc::SIGKILL));
    assert!(!status.success());
    assert_eq!(status.to_string(), format!("signal {}", libc::SIGKILL));
}

#[test]
fn decode_success() {
    assert!(ExitStatus::from_raw(0).success());
    assert!(!ExitStatus::undetermined().success());
    assert_eq!(ExitStatus::undetermined().to_string(), "undetermined exit status");
}

#[test]
fn wait_is_cached() {
    let mut child = spawn(&sh("exit 13")).unwrap();
    assert!(child.exit_status().is_none());
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(13));
    assert_eq!(child.exit_status(), Some(status));
    assert_eq!(child.wait().unwrap(), status);
}

#[test]
fn nonexistent_program() {
    let mut child = spawn(&Command::new("/bin/wangwang")).unwrap();
    child.close_input();
    assert_eq!(child.read_line(), None);
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(EXEC_FAILURE_CODE as u32));
}

#[test]
fn program_not_executable() {
    let tmpdir = TempDir::new().unwrap();
    let script = tmpdir.path().join("script");
    fs::write(&script, "#!/bin/sh\necho never\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();
    let mut child = spawn(&Command::new(&script)).unwrap();
    assert_eq!(child.read_line(), None);
    assert_eq!(child.wait().unwrap().code(), Some(EXEC_FAILURE_CODE as u32));
}

#[test]
fn nul_in_argument() {
    let result = spawn(&Command::new("/bin/echo").arg("foo\0bar"));
    assert!(matches!(result, Err(Error::Spawn { .. })));
}

#[test]
fn kill_child() {
    let mut child = spawn(&Command::new("/bin/sleep").arg("1000")).unwrap();
    child.kill().unwrap();
    assert!(child.wait().unwrap().is_killed_by(libc::SIGKILL));
    // no-op once reaped
    child.terminate().unwrap();
}

#[test]
fn terminate_child() {
    let mut child = spawn(&Command::new("/bin/sleep").arg("1000")).unwrap();
    child.terminate().unwrap();
    assert!(child.wait().unwrap().is_killed_by(libc::SIGTERM));
}

#[test]
fn stderr_merged_by_default() {
    let mut child = spawn(&sh("echo oops >&2")).unwrap();
    child.close_input();
    assert_eq!(child.read_line().as_deref(), Some("oops"));
    child.wait().unwrap();
}

#[test]
fn stderr_not_merged() {
    let mut child = spawn(&sh("echo oops >&2; echo fine").merge_stderr(false)).unwrap();
    child.close_input();
    assert_eq!(child.read_line().as_deref(), Some("fine"));
    assert_eq!(child.read_line(), None);
    child.wait().unwrap();
}

#[test]
fn drop_reaps_child() {
    let child = spawn(&Command::new("/bin/cat")).unwrap();
    let pid = child.pid();
    drop(child);
    assert!(is_reaped(pid));
}

#[test]
fn wait_unblocks_writing_child() {
    // the child fills the pipe and blocks; waiting must not deadlock
    let mut child = spawn(&sh("while :; do echo spam; done")).unwrap();
    child.close_input();
    assert_eq!(child.read_line().as_deref(), Some("spam"));
    let status = child.wait().unwrap();
    // SIGPIPE is back to its default action in the child
    assert!(status.is_killed_by(libc::SIGPIPE));
}

#[test]
fn runs_in_cwd() {
    let tmpdir = TempDir::new().unwrap();
    let expected = fs::canonicalize(tmpdir.path()).unwrap();
    let mut child = spawn(&sh("pwd -P").cwd(tmpdir.path())).unwrap();
    child.close_input();
    assert_eq!(child.read_line().as_deref(), expected.to_str());
    assert!(child.wait().unwrap().success());
}

#[test]
fn bad_cwd_is_spawn_error() {
    let tmpdir = TempDir::new().unwrap();
    let missing = tmpdir.path().join("missing");
    match spawn(&Command::new("/bin/true").cwd(&missing)) {
        Err(Error::Spawn { error, .. }) => assert_eq!(error.kind(), io::ErrorKind::NotFound),
        other => panic!("expected a spawn error, got {:?}", other),
    }
}

#[test]
fn cwd_not_a_directory() {
    let tmpdir = TempDir::new().unwrap();
    let file = tmpdir.path().join("file");
    fs::write(&file, "").unwrap();
    match spawn(&Command::new("/bin/true").cwd(&file)) {
        Err(Error::Spawn { error, .. }) => assert_eq!(error.raw_os_error(), Some(libc::ENOTDIR)),
        other => panic!("expected a spawn error, got {:?}", other),
    }
}

#[test]
fn setup_error_decoding() {
    assert_eq!(read_exact_or_eof::<4>(&mut &b""[..]).unwrap(), None);
    assert_eq!(
        read_exact_or_eof::<4>(&mut &2u32.to_le_bytes()[..]).unwrap(),
        Some([2, 0, 0, 0])
    );
    let truncated = read_exact_or_eof::<4>(&mut &b"\x02\x00"[..]).unwrap_err();
    assert_eq!(truncated.kind(), io::ErrorKind::UnexpectedEof);
}

#[test]
fn child_outlives_spawning_thread() {
    let mut child = thread::spawn(|| spawn(&sh("sleep 0.3; echo still here")).unwrap())
        .join()
        .unwrap();
    child.close_input();
    assert_eq!(child.read_line().as_deref(), Some("still here"));
    assert!(child.wait().unwrap().success());
}

#[test]
fn command_builder() {
    let cmd = Command::new("/bin/grep").arg("-i").args(["a", "b"]);
    assert_eq!(cmd.program(), "/bin/grep");
    assert_eq!(cmd.get_args(), ["-i", "a", "b"]);
    assert_eq!(cmd.argv(), ["/bin/grep", "-i", "a", "b"]);
    assert!(cmd.get_merge_stderr());
    assert_eq!(cmd.get_delimiter(), b'\n');
    assert_eq!(cmd.get_cwd(), None);
    assert_eq!(cmd.cwd("/tmp").get_cwd(), Some(OsStr::new("/tmp")));
}
