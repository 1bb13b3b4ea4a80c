//! Error types for the bridge components.
//!
//! Each component reports its own categorized error so callers can decide
//! between aborting (launch), degrading (mouse) and carrying on (terminal
//! attributes on a non-terminal stdin). The binary wraps these in
//! `anyhow::Error` at the top level.

use nix::errno::Errno;

/// Errors raised while creating the PTY session.
#[derive(Debug)]
pub enum LaunchError {
    /// The pseudo-terminal pair could not be allocated.
    OpenPty(String),
    /// The program could not be found or executed.
    Spawn(String),
    /// Preparing the child's environment failed.
    Io(std::io::Error),
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenPty(msg) => write!(f, "openpty: {msg}"),
            Self::Spawn(msg) => write!(f, "exec: {msg}"),
            Self::Io(e) => write!(f, "pty setup: {e}"),
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LaunchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors raised by the terminal mode controller.
#[derive(Debug)]
pub enum TerminalError {
    /// The descriptor does not refer to a terminal.
    NotATerminal,
    /// Reading or applying line-discipline attributes failed.
    Attributes(Errno),
}

impl std::fmt::Display for TerminalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotATerminal => write!(f, "not a terminal"),
            Self::Attributes(errno) => write!(f, "terminal attributes: {errno}"),
        }
    }
}

impl std::error::Error for TerminalError {}

impl From<Errno> for TerminalError {
    fn from(errno: Errno) -> Self {
        if errno == Errno::ENOTTY {
            Self::NotATerminal
        } else {
            Self::Attributes(errno)
        }
    }
}

/// Errors raised by the mouse server connection.
#[derive(Debug)]
pub enum MouseError {
    /// Connecting or registering with the mouse server failed.
    Connect(String),
    /// The server closed the connection.
    Closed,
    /// Socket I/O failed.
    Io(std::io::Error),
}

impl std::fmt::Display for MouseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "mouse server connect failed: {msg}"),
            Self::Closed => write!(f, "mouse server closed the connection"),
            Self::Io(e) => write!(f, "mouse server I/O error: {e}"),
        }
    }
}

impl std::error::Error for MouseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MouseError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors raised while installing signal handlers.
#[derive(Debug)]
pub struct SignalError {
    /// Signal number that failed to register.
    pub signal: i32,
    /// Underlying OS error.
    pub source: std::io::Error,
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to register handler for signal {}: {}", self.signal, self.source)
    }
}

impl std::error::Error for SignalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
