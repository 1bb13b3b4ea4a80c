//! Mouse protocol adapter.
//!
//! Wraps the native console mouse server and turns its events into the SGR
//! escape sequences terminal programs understand.
//!
//! # Architecture
//!
//! ```text
//! MouseConnection
//!  ├── Connected(Box<dyn MouseServer>)   poll fd, next_event, draw_cursor
//!  └── Unavailable                       mouse support off for the session
//!
//! MouseEvent ──► sgr::to_sgr_sequence(event, tracking) ──► bytes for the PTY
//! ```
//!
//! The server is a soft dependency: failing to connect (or losing the
//! connection later) leaves the session running without mouse input.
//!
//! # Modules
//!
//! - [`gpm`] - Native GPM client over `/dev/gpmctl`
//! - [`sgr`] - SGR (`ESC [ <`) encoding

// Rust guideline compliant 2026-02

pub mod gpm;
pub mod sgr;

use std::os::fd::BorrowedFd;

use crate::config::Config;
use crate::error::MouseError;

pub use sgr::to_sgr_sequence;

/// Mouse button, as reported in the native event's button mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left (primary) button.
    Left,
    /// Middle button.
    Middle,
    /// Right (secondary) button.
    Right,
}

/// What happened to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A button went down.
    Press,
    /// A button went up.
    Release,
    /// The pointer moved with a button held.
    Drag,
    /// The pointer moved with no button held.
    Move,
}

/// One native pointer event, 1-based coordinates as the server reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// Highest-priority button in the event's mask, if any.
    pub button: Option<Button>,
    /// Event kind.
    pub kind: EventKind,
    /// Column, 1-based.
    pub x: i16,
    /// Row, 1-based.
    pub y: i16,
}

/// A live connection to a native mouse server.
///
/// Implemented by [`gpm::GpmConnection`]; tests substitute their own.
pub trait MouseServer: std::fmt::Debug {
    /// Descriptor that becomes readable when an event is queued.
    fn poll_fd(&self) -> BorrowedFd<'_>;

    /// Fetch the next queued event without blocking.
    ///
    /// `Ok(None)` means nothing complete is queued yet.
    fn next_event(&mut self) -> Result<Option<MouseEvent>, MouseError>;

    /// Ask the server to draw its pointer at the event's position.
    fn draw_cursor(&mut self, event: &MouseEvent);

    /// Release the connection.
    fn close(&mut self);
}

/// Presence of the optional mouse subsystem, decided once at startup.
#[derive(Debug)]
pub enum MouseConnection {
    /// Connected to a mouse server.
    Connected(Box<dyn MouseServer>),
    /// No mouse server; mouse features are off.
    Unavailable,
}

impl MouseConnection {
    /// Connect to the GPM server described by `config`.
    ///
    /// On failure, prints a one-line diagnostic to stderr and returns
    /// [`MouseConnection::Unavailable`].
    pub fn connect(config: &Config) -> Self {
        if !config.mouse_enabled {
            log::info!("[mouse] disabled by configuration");
            return Self::Unavailable;
        }
        match gpm::GpmConnection::open(&config.gpm_socket, &config.console_device) {
            Ok(conn) => {
                log::info!("[mouse] connected to {}", config.gpm_socket.display());
                Self::Connected(Box::new(conn))
            }
            Err(e) => {
                log::warn!("[mouse] {e}");
                report("GPM not available (mouse support disabled)");
                Self::Unavailable
            }
        }
    }

    /// Whether a server is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Descriptor to add to the wait set, when connected.
    pub fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        match self {
            Self::Connected(server) => Some(server.poll_fd()),
            Self::Unavailable => None,
        }
    }

    /// Fetch one event without blocking.
    ///
    /// A broken connection is closed and the adapter degrades to
    /// [`MouseConnection::Unavailable`] with a diagnostic.
    pub fn next_event(&mut self) -> Option<MouseEvent> {
        let Self::Connected(server) = self else {
            return None;
        };
        match server.next_event() {
            Ok(event) => event,
            Err(e) => {
                log::warn!("[mouse] connection lost: {e}");
                report("GPM connection lost (mouse support disabled)");
                self.close();
                None
            }
        }
    }

    /// Delegate pointer drawing to the server.
    pub fn draw_cursor(&mut self, event: &MouseEvent) {
        if let Self::Connected(server) = self {
            server.draw_cursor(event);
        }
    }

    /// Close the connection, if open. Idempotent.
    pub fn close(&mut self) {
        if let Self::Connected(mut server) = std::mem::replace(self, Self::Unavailable) {
            server.close();
            log::info!("[mouse] connection closed");
        }
    }
}

/// Print a diagnostic that stays readable while the terminal is raw.
fn report(message: &str) {
    eprint!("Warning: {message}\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    #[derive(Debug)]
    struct ScriptedServer {
        socket: UnixStream,
        events: VecDeque<Result<Option<MouseEvent>, MouseError>>,
        drawn: std::rc::Rc<std::cell::Cell<usize>>,
    }

    impl MouseServer for ScriptedServer {
        fn poll_fd(&self) -> BorrowedFd<'_> {
            self.socket.as_fd()
        }
        fn next_event(&mut self) -> Result<Option<MouseEvent>, MouseError> {
            self.events.pop_front().unwrap_or(Ok(None))
        }
        fn draw_cursor(&mut self, _event: &MouseEvent) {
            self.drawn.set(self.drawn.get() + 1);
        }
        fn close(&mut self) {}
    }

    fn event() -> MouseEvent {
        MouseEvent {
            button: Some(Button::Left),
            kind: EventKind::Press,
            x: 3,
            y: 4,
        }
    }

    #[test]
    fn test_disabled_config_is_unavailable() {
        let config = Config {
            mouse_enabled: false,
            ..Config::default()
        };
        let conn = MouseConnection::connect(&config);
        assert!(!conn.is_connected());
        assert!(conn.poll_fd().is_none());
    }

    #[test]
    fn test_missing_socket_degrades_to_unavailable() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = Config {
            gpm_socket: dir.path().join("no-gpmctl"),
            ..Config::default()
        };
        let mut conn = MouseConnection::connect(&config);
        assert!(!conn.is_connected());
        assert!(conn.next_event().is_none());
    }

    #[test]
    fn test_connected_passes_events_and_draws() {
        let (a, _b) = UnixStream::pair().expect("pair");
        let drawn = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut conn = MouseConnection::Connected(Box::new(ScriptedServer {
            socket: a,
            events: VecDeque::from([Ok(Some(event()))]),
            drawn: std::rc::Rc::clone(&drawn),
        }));
        assert!(conn.poll_fd().is_some());

        let ev = conn.next_event().expect("event");
        conn.draw_cursor(&ev);
        assert_eq!(ev, event());
        assert_eq!(drawn.get(), 1);
        assert!(conn.next_event().is_none());
        assert!(conn.is_connected());
    }

    #[test]
    fn test_error_degrades_connection() {
        let (a, _b) = UnixStream::pair().expect("pair");
        let mut conn = MouseConnection::Connected(Box::new(ScriptedServer {
            socket: a,
            events: VecDeque::from([Err(MouseError::Closed)]),
            drawn: std::rc::Rc::new(std::cell::Cell::new(0)),
        }));
        assert!(conn.next_event().is_none());
        assert!(!conn.is_connected());
        conn.close();
        assert!(!conn.is_connected());
    }
}
