use std::ffi::{CStr, CString, OsStr};
use std::fs::File;
use std::io::{Error, Result};
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{FromRawFd, RawFd};
use std::ptr;

use crate::process::ExitStatus;

pub use libc::{ECHILD, EINTR, EINVAL, SIGKILL, SIGTERM};

pub const STDIN_FD: RawFd = libc::STDIN_FILENO;
pub const STDOUT_FD: RawFd = libc::STDOUT_FILENO;
pub const STDERR_FD: RawFd = libc::STDERR_FILENO;

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

/// Create a pipe whose both ends are close-on-exec.
///
/// Returns `(read_end, write_end)`. The ends only survive `exec` once they are
/// `dup2`-ed onto a standard stream, so a child forked concurrently by another
/// thread never inherits them.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    let ends = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
    set_cloexec(fds[0], true)?;
    set_cloexec(fds[1], true)?;
    Ok(ends)
}

/// Fork the current process.
///
/// Returns `Some(child_pid)` in the parent and `None` in the child.
///
/// # Safety
///
/// Between the fork and the exec, the child may only call async-signal-safe
/// functions: no allocation, no locking, no logging.
pub unsafe fn fork() -> Result<Option<u32>> {
    let pid = check_err(unsafe { libc::fork() })?;
    Ok(if pid == 0 { None } else { Some(pid as u32) })
}

pub fn os_to_cstring(s: &OsStr) -> Result<CString> {
    // CString::new fails only on interior NUL bytes
    CString::new(s.as_bytes()).map_err(|_| Error::from_raw_os_error(libc::EINVAL))
}

#[derive(Debug)]
struct CVec {
    // Individual C strings; they are not unused as rustc thinks, they
    // are pointed to by elements of self.ptrs.
    #[allow(dead_code)]
    strings: Vec<CString>,

    // nullptr-terminated vector of pointers to data inside
    // self.strings.
    ptrs: Vec<*const libc::c_char>,
}

impl CVec {
    fn new<S: AsRef<OsStr>>(slice: &[S]) -> Result<CVec> {
        let strings = slice
            .iter()
            .map(|x| os_to_cstring(x.as_ref()))
            .collect::<Result<Vec<CString>>>()?;
        let ptrs = strings
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(CVec { strings, ptrs })
    }

    fn as_c_vec(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

/// Prepare an `execv` call ahead of forking.
///
/// All allocation happens here, in the parent. The returned closure is safe to
/// call in the child; it only returns if the program image could not be
/// replaced, yielding the reason.
pub fn prep_exec<S1, S2>(path: S1, argv: &[S2]) -> Result<impl FnOnce() -> Error + use<S1, S2>>
where
    S1: AsRef<OsStr>,
    S2: AsRef<OsStr>,
{
    let path = os_to_cstring(path.as_ref())?;
    let argv = CVec::new(argv)?;
    Ok(move || {
        unsafe { libc::execv(path.as_ptr(), argv.as_c_vec()) };
        Error::last_os_error()
    })
}

pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

pub fn waitpid(pid: u32, flags: i32) -> Result<(u32, ExitStatus)> {
    let mut status = 0 as libc::c_int;
    let pid = check_err(unsafe {
        libc::waitpid(
            pid as libc::pid_t,
            &mut status as *mut libc::c_int,
            flags as libc::c_int,
        )
    })?;
    Ok((pid as u32, ExitStatus::from_raw(status)))
}

pub fn kill(pid: u32, signal: i32) -> Result<()> {
    check_err(unsafe { libc::kill(pid as libc::pid_t, signal) })?;
    Ok(())
}

pub fn getpid() -> u32 {
    unsafe { libc::getpid() as u32 }
}

pub fn getppid() -> u32 {
    unsafe { libc::getppid() as u32 }
}

pub fn chdir(dir: &CStr) -> Result<()> {
    check_err(unsafe { libc::chdir(dir.as_ptr()) })?;
    Ok(())
}

pub fn dup2(oldfd: RawFd, newfd: RawFd) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

/// Duplicate `fd` to the lowest free descriptor at or above `min`, with
/// close-on-exec set on the copy.
pub fn dup_above(fd: RawFd, min: RawFd) -> Result<RawFd> {
    check_err(unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, min) })
}

pub fn close(fd: RawFd) -> Result<()> {
    check_err(unsafe { libc::close(fd) })?;
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(fd: RawFd, cloexec: bool) -> Result<()> {
    let old = check_err(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    let new = if cloexec {
        old | libc::FD_CLOEXEC
    } else {
        old & !libc::FD_CLOEXEC
    };
    if new != old {
        check_err(unsafe { libc::fcntl(fd, libc::F_SETFD, new) })?;
    }
    Ok(())
}

/// Ask the kernel to send `signal` to the calling process when its parent
/// dies.
///
/// On Linux the "parent" is the thread that forked us, not the whole parent
/// process, which is why all forking happens on one thread that lives as long
/// as the process.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn set_parent_death_signal(signal: i32) -> Result<()> {
    check_err(unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, signal as libc::c_ulong) })?;
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn set_parent_death_signal(_signal: i32) -> Result<()> {
    Ok(())
}

pub fn reset_sigpipe() -> Result<()> {
    // This is called after forking to reset SIGPIPE handling to the
    // defaults that Unix programs expect. libstd ignores SIGPIPE, and
    // child processes inherit ignored signals and the signal mask from
    // their parent.
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        check_err(libc::sigemptyset(set.as_mut_ptr()))?;
        let rc = libc::pthread_sigmask(libc::SIG_SETMASK, set.as_ptr(), ptr::null_mut());
        if rc != 0 {
            return Err(Error::from_raw_os_error(rc));
        }
        let ret = libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        if ret == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}
