//! PTY session launcher.
//!
//! Allocates a pseudo-terminal pair sized like the real terminal, starts the
//! child program on the slave side, and hands back a [`Session`] that owns the
//! master side and the child handle.
//!
//! # Ownership
//!
//! ```text
//! Session
//!  ├── master: MasterPty   (resize + raw fd, non-blocking)
//!  └── child: Child        (signal delivery and exit reaping)
//! ```
//!
//! Program output and program input both go through the master descriptor
//! directly. The master is non-blocking, so a full input queue shows up as
//! `WouldBlock` instead of stalling the caller. No `take_writer` handle is
//! held: its drop types a newline and EOF into the child.
//!
//! The slave handle is dropped right after the spawn so that reads on the
//! master report EOF/EIO once the child and its descendants are gone.

// Rust guideline compliant 2026-02

use std::ffi::OsString;
use std::os::fd::{BorrowedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::error::LaunchError;
use crate::terminal::WindowSize;

/// How the child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildExit {
    /// The child called `exit` with this code.
    Exited(u32),
    /// The child was terminated by a signal.
    Signaled(String),
}

impl ChildExit {
    /// Exit code the bridge itself should report.
    ///
    /// Normal exits pass the child's code through (truncated to a byte, as
    /// the OS does); anything else is a failure.
    pub fn process_exit_code(&self) -> u8 {
        match self {
            Self::Exited(code) => (*code & 0xff) as u8,
            Self::Signaled(_) => crate::constants::EXIT_FAILURE,
        }
    }
}

impl From<portable_pty::ExitStatus> for ChildExit {
    fn from(status: portable_pty::ExitStatus) -> Self {
        match status.signal() {
            Some(name) => Self::Signaled(name.to_string()),
            None => Self::Exited(status.exit_code()),
        }
    }
}

/// A running child attached to the slave side of a pseudo-terminal.
pub struct Session {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    master_fd: RawFd,
    pid: Option<u32>,
    exit: Option<ChildExit>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("master_fd", &self.master_fd)
            .field("pid", &self.pid)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a PTY of `size` and run `argv` on its slave side.
    ///
    /// `argv[0]` is looked up on `PATH`. The child inherits the current
    /// working directory and environment.
    ///
    /// # Errors
    ///
    /// [`LaunchError::OpenPty`] if the pair cannot be allocated,
    /// [`LaunchError::Spawn`] if the program cannot be executed,
    /// [`LaunchError::Io`] if the working directory cannot be determined.
    pub fn launch(argv: &[OsString], size: WindowSize) -> Result<Self, LaunchError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| LaunchError::Spawn("no program given".to_string()))?;

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| LaunchError::OpenPty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.cwd(std::env::current_dir()?);

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            LaunchError::Spawn(format!("{}: {e}", program.to_string_lossy()))
        })?;
        // Only the child may hold the slave open, otherwise the master never
        // sees EOF when the child exits.
        drop(pair.slave);

        let master_fd = pair.master.as_raw_fd().ok_or_else(|| {
            LaunchError::OpenPty("master side has no file descriptor".to_string())
        })?;
        set_nonblocking(master_fd)?;
        let pid = child.process_id();

        log::info!(
            "[session] launched {:?} (pid {:?}) at {}x{}",
            program,
            pid,
            size.cols,
            size.rows
        );

        Ok(Self {
            master: pair.master,
            child,
            master_fd,
            pid,
            exit: None,
        })
    }

    /// Master descriptor for the multiplexed wait.
    pub fn master_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: `master_fd` belongs to `self.master`, which lives as long
        // as the returned borrow.
        unsafe { BorrowedFd::borrow_raw(self.master_fd) }
    }

    /// Child process identifier, if the platform exposes it.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Read one chunk of program output.
    ///
    /// Fails with `WouldBlock` when nothing is queued, and with EIO once the
    /// slave side has no holders left.
    pub fn read_output(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(nix::unistd::read(self.master_fd(), buf)?)
    }

    /// Write bytes to the program as if typed on its terminal.
    ///
    /// Writes as much as the PTY input queue takes and returns that count;
    /// fails with `WouldBlock` when the queue is full.
    pub fn write_input(&self, data: &[u8]) -> std::io::Result<usize> {
        Ok(nix::unistd::write(self.master_fd(), data)?)
    }

    /// Propagate new dimensions to the slave side.
    pub fn resize(&self, size: WindowSize) {
        if let Err(e) = self.master.resize(PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }) {
            log::warn!("[session] failed to resize PTY: {e}");
        } else {
            log::debug!("[session] resized to {}x{}", size.cols, size.rows);
        }
    }

    /// Deliver `signal` to the child process.
    pub fn signal(&self, signal: nix::sys::signal::Signal) {
        let Some(pid) = self.pid else {
            return;
        };
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        if let Err(e) = nix::sys::signal::kill(pid, signal) {
            log::debug!("[session] kill({pid}, {signal}) failed: {e}");
        }
    }

    /// Check for child termination without blocking.
    ///
    /// Returns the exit once it has been observed; later calls keep
    /// returning the same value.
    pub fn try_reap(&mut self) -> Option<ChildExit> {
        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    let exit = ChildExit::from(status);
                    log::info!("[session] child exited: {exit:?}");
                    self.exit = Some(exit);
                }
                Ok(None) => {}
                Err(e) => log::warn!("[session] try_wait failed: {e}"),
            }
        }
        self.exit.clone()
    }

    /// Close the master side and block until the child is gone.
    ///
    /// Closing the master first hangs up a child that is still running, so
    /// the wait cannot deadlock on a program that waits for more input.
    pub fn finish(self) -> std::io::Result<ChildExit> {
        let Self {
            master,
            mut child,
            exit,
            ..
        } = self;
        drop(master);

        if let Some(exit) = exit {
            return Ok(exit);
        }
        let status = child.wait()?;
        let exit = ChildExit::from(status);
        log::info!("[session] child reaped: {exit:?}");
        Ok(exit)
    }
}

/// Switch the master side to non-blocking I/O.
fn set_nonblocking(fd: RawFd) -> Result<(), LaunchError> {
    // SAFETY: `fd` is the master descriptor, open for the whole call.
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(std::io::Error::from)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(std::io::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<OsString> {
        parts.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_exit_code_passthrough() {
        assert_eq!(ChildExit::Exited(0).process_exit_code(), 0);
        assert_eq!(ChildExit::Exited(42).process_exit_code(), 42);
        assert_eq!(
            ChildExit::Signaled("Hangup".into()).process_exit_code(),
            crate::constants::EXIT_FAILURE
        );
    }

    #[test]
    fn test_launch_true_exits_zero() {
        let session = Session::launch(&argv(&["true"]), WindowSize::default()).expect("launch");
        assert!(session.pid().is_some());
        let exit = session.finish().expect("wait");
        assert_eq!(exit, ChildExit::Exited(0));
    }

    #[test]
    fn test_launch_reports_child_exit_code() {
        let session =
            Session::launch(&argv(&["sh", "-c", "exit 7"]), WindowSize::default()).expect("launch");
        let exit = session.finish().expect("wait");
        assert_eq!(exit.process_exit_code(), 7);
    }

    #[test]
    fn test_launch_missing_program_is_spawn_error() {
        let err = Session::launch(
            &argv(&["/definitely/not/a/real/program-xyz"]),
            WindowSize::default(),
        )
        .expect_err("missing program must fail");
        assert!(matches!(err, LaunchError::Spawn(_)), "got {err:?}");
        assert!(err.to_string().starts_with("exec: "));
    }

    #[test]
    fn test_launch_empty_argv_fails() {
        let err = Session::launch(&[], WindowSize::default()).expect_err("empty argv");
        assert!(matches!(err, LaunchError::Spawn(_)));
    }

    /// Collect output until the slave side closes.
    fn read_to_end(session: &Session) -> String {
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

        let mut collected = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let mut fds = [PollFd::new(session.master_fd(), PollFlags::POLLIN)];
            if poll(&mut fds, PollTimeout::from(5000u16)).expect("poll") == 0 {
                break;
            }
            match session.read_output(&mut buf) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    }

    #[test]
    fn test_child_sees_initial_window_size() {
        let session = Session::launch(
            &argv(&["stty", "size"]),
            WindowSize { rows: 33, cols: 101 },
        )
        .expect("launch");

        let text = read_to_end(&session);
        assert!(text.contains("33 101"), "stty output: {text:?}");
        session.finish().expect("wait");
    }

    #[test]
    fn test_resize_reaches_child() {
        let session = Session::launch(
            &argv(&["sh", "-c", "sleep 0.3; stty size"]),
            WindowSize::default(),
        )
        .expect("launch");
        session.resize(WindowSize { rows: 40, cols: 120 });

        let text = read_to_end(&session);
        assert!(text.contains("40 120"), "stty output: {text:?}");
        session.finish().expect("wait");
    }

    #[test]
    fn test_empty_master_reports_would_block() {
        let session = Session::launch(&argv(&["sleep", "5"]), WindowSize::default())
            .expect("launch");
        let mut buf = [0u8; 16];
        let err = session.read_output(&mut buf).expect_err("nothing queued yet");
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
        session.finish().expect("wait");
    }

    #[test]
    fn test_write_input_reaches_child() {
        let session = Session::launch(
            &argv(&["sh", "-c", "read line; echo got:$line"]),
            WindowSize::default(),
        )
        .expect("launch");
        assert_eq!(session.write_input(b"abc\n").expect("write"), 4);

        let text = read_to_end(&session);
        assert!(text.contains("got:abc"), "output: {text:?}");
        assert_eq!(session.finish().expect("wait"), ChildExit::Exited(0));
    }
}
