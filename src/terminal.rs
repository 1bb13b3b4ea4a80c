//! Terminal mode controller for the real (outer) terminal.
//!
//! Captures the line-discipline attributes of the local terminal before the
//! bridge touches them, switches to raw mode for the lifetime of the session,
//! and puts the snapshot back exactly once, on every exit path.
//!
//! # Lifecycle
//!
//! ```text
//! TerminalMode::save(stdin)  → Saved
//!     .enter_raw()           → Raw
//!     .restore() / Drop      → Restored (further restores are no-ops)
//! ```
//!
//! The controller owns a duplicate of the descriptor it was created from, so
//! it stays valid even if the caller closes its own handle first.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use nix::errno::Errno;
use nix::sys::termios::{
    tcgetattr, tcsetattr, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices, Termios,
};

use crate::constants::{DEFAULT_COLS, DEFAULT_ROWS};
use crate::error::TerminalError;

/// Where the controller is in its save → raw → restore lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    /// Attributes captured, nothing changed yet.
    Saved,
    /// Raw mode applied.
    Raw,
    /// Snapshot reapplied; the controller is spent.
    Restored,
}

/// Saves, switches and restores the line discipline of one terminal.
///
/// Dropping the controller restores the snapshot if that has not happened
/// yet, which covers early returns and unwinding panics.
#[derive(Debug)]
pub struct TerminalMode {
    fd: OwnedFd,
    saved: Termios,
    state: ModeState,
}

impl TerminalMode {
    /// Capture the current attributes of `fd`.
    ///
    /// # Errors
    ///
    /// Returns [`TerminalError::NotATerminal`] when `fd` is not a terminal.
    pub fn save(fd: BorrowedFd<'_>) -> Result<Self, TerminalError> {
        let fd = fd
            .try_clone_to_owned()
            .map_err(|e| Errno::from_raw(e.raw_os_error().unwrap_or(libc::EBADF)))?;
        let saved = tcgetattr(fd.as_fd())?;
        log::debug!("[terminal] saved attributes");
        Ok(Self {
            fd,
            saved,
            state: ModeState::Saved,
        })
    }

    /// Switch the terminal to raw mode.
    ///
    /// Disables canonical input, echo, signal characters, CR/NL translation,
    /// flow control and output post-processing; selects 8-bit characters
    /// without parity; and makes reads return whatever is available
    /// (`VMIN = 0`, `VTIME = 0`). Pending input is flushed.
    pub fn enter_raw(&mut self) -> Result<(), TerminalError> {
        let raw = raw_attributes(&self.saved);
        tcsetattr(self.fd.as_fd(), SetArg::TCSAFLUSH, &raw)?;
        self.state = ModeState::Raw;
        log::debug!("[terminal] raw mode enabled");
        Ok(())
    }

    /// Reapply the saved attributes.
    ///
    /// Only the first call touches the terminal; later calls return `Ok`.
    pub fn restore(&mut self) -> Result<(), TerminalError> {
        if self.state == ModeState::Restored {
            return Ok(());
        }
        self.state = ModeState::Restored;
        tcsetattr(self.fd.as_fd(), SetArg::TCSANOW, &self.saved)?;
        log::debug!("[terminal] attributes restored");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModeState {
        self.state
    }

    /// The attributes captured by [`save`](Self::save).
    pub fn saved(&self) -> &Termios {
        &self.saved
    }
}

impl Drop for TerminalMode {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            log::warn!("[terminal] restore on drop failed: {e}");
        }
    }
}

/// Derive raw-mode attributes from a saved snapshot.
pub fn raw_attributes(saved: &Termios) -> Termios {
    let mut raw = saved.clone();
    raw.input_flags &= !(InputFlags::IGNBRK
        | InputFlags::BRKINT
        | InputFlags::PARMRK
        | InputFlags::ISTRIP
        | InputFlags::INLCR
        | InputFlags::IGNCR
        | InputFlags::ICRNL
        | InputFlags::IXON);
    raw.output_flags &= !OutputFlags::OPOST;
    raw.local_flags &= !(LocalFlags::ECHO
        | LocalFlags::ECHONL
        | LocalFlags::ICANON
        | LocalFlags::ISIG
        | LocalFlags::IEXTEN);
    raw.control_flags &= !(ControlFlags::CSIZE | ControlFlags::PARENB);
    raw.control_flags |= ControlFlags::CS8;
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    raw
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Number of rows.
    pub rows: u16,
    /// Number of columns.
    pub cols: u16,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

/// Query the real terminal's current size, falling back to 24×80.
pub fn window_size() -> WindowSize {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if rows > 0 && cols > 0 => WindowSize { rows, cols },
        Ok(_) => WindowSize::default(),
        Err(e) => {
            log::debug!("[terminal] size query failed, using default: {e}");
            WindowSize::default()
        }
    }
}
