//! Native GPM client.
//!
//! Speaks the GPM daemon's socket protocol directly instead of linking
//! `libgpm`:
//!
//! 1. Connect to the control socket (normally `/dev/gpmctl`).
//! 2. Send one 16-byte connect record naming the events we want.
//! 3. Read 28-byte event records as they arrive.
//!
//! Pointer drawing goes through the console's `TIOCLINUX` selection ioctl in
//! pointer mode, which is how the GPM daemon renders its own cursor.
//!
//! All records use the host's native byte order.

// Rust guideline compliant 2026-02

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::Path;

use super::{Button, EventKind, MouseEvent, MouseServer};
use crate::error::MouseError;

/// Pointer moved with no button held.
pub const GPM_MOVE: u16 = 1;
/// Pointer moved with a button held.
pub const GPM_DRAG: u16 = 2;
/// Button pressed.
pub const GPM_DOWN: u16 = 4;
/// Button released.
pub const GPM_UP: u16 = 8;
/// Default-handler flag: the daemon keeps drawing its own pointer.
pub const GPM_HARD: u16 = 256;

/// Right button bit.
pub const GPM_B_RIGHT: u8 = 1;
/// Middle button bit.
pub const GPM_B_MIDDLE: u8 = 2;
/// Left button bit.
pub const GPM_B_LEFT: u8 = 4;

/// Size of a connect record on the wire.
pub const CONNECT_RECORD_LEN: usize = 16;
/// Size of an event record on the wire.
pub const EVENT_RECORD_LEN: usize = 28;

/// `TIOCLINUX` subcode for setting the selection.
const TIOCL_SETSEL: u8 = 2;
/// Selection mode that only draws the pointer.
const TIOCL_SELPOINTER: u16 = 3;

/// Registration sent to the daemon right after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Events delivered to this client.
    pub event_mask: u16,
    /// Events left to the daemon's default handling.
    pub default_mask: u16,
    /// Lowest modifier mask accepted.
    pub min_mod: u16,
    /// Highest modifier mask accepted.
    pub max_mod: u16,
    /// Client process id.
    pub pid: i32,
    /// Virtual console the client sits on (0 when unknown).
    pub vc: i32,
}

impl ConnectRequest {
    /// Request move, drag, press and release events, leaving pointer
    /// drawing to the daemon.
    pub fn all_events(pid: i32, vc: i32) -> Self {
        Self {
            event_mask: GPM_MOVE | GPM_DRAG | GPM_DOWN | GPM_UP,
            default_mask: GPM_HARD,
            min_mod: 0,
            max_mod: 0,
            pid,
            vc,
        }
    }

    /// Serialize to the daemon's record layout.
    pub fn encode(&self) -> [u8; CONNECT_RECORD_LEN] {
        let mut out = [0u8; CONNECT_RECORD_LEN];
        out[0..2].copy_from_slice(&self.event_mask.to_ne_bytes());
        out[2..4].copy_from_slice(&self.default_mask.to_ne_bytes());
        out[4..6].copy_from_slice(&self.min_mod.to_ne_bytes());
        out[6..8].copy_from_slice(&self.max_mod.to_ne_bytes());
        out[8..12].copy_from_slice(&self.pid.to_ne_bytes());
        out[12..16].copy_from_slice(&self.vc.to_ne_bytes());
        out
    }
}

/// Decoded event record, before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Button bits (`GPM_B_*`).
    pub buttons: u8,
    /// Keyboard modifier bits.
    pub modifiers: u8,
    /// Virtual console.
    pub vc: u16,
    /// Column, 1-based.
    pub x: i16,
    /// Row, 1-based.
    pub y: i16,
    /// Event type bits (`GPM_MOVE`, `GPM_DRAG`, ...).
    pub event_type: i32,
    /// Click count.
    pub clicks: i32,
}

impl RawEvent {
    /// Parse one event record.
    pub fn decode(record: &[u8; EVENT_RECORD_LEN]) -> Self {
        let i16_at = |at: usize| i16::from_ne_bytes([record[at], record[at + 1]]);
        let i32_at = |at: usize| {
            i32::from_ne_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        };
        Self {
            buttons: record[0],
            modifiers: record[1],
            vc: u16::from_ne_bytes([record[2], record[3]]),
            // 4..8 hold dx/dy, unused here.
            x: i16_at(8),
            y: i16_at(10),
            event_type: i32_at(12),
            clicks: i32_at(16),
        }
    }

    /// Classify into a [`MouseEvent`].
    ///
    /// Type bits are checked in the order up, drag, move, down; records with
    /// none of them (enter/leave notifications) yield `None`.
    pub fn to_mouse_event(&self) -> Option<MouseEvent> {
        let kind_bits = self.event_type as u16;
        let kind = if kind_bits & GPM_UP != 0 {
            EventKind::Release
        } else if kind_bits & GPM_DRAG != 0 {
            EventKind::Drag
        } else if kind_bits & GPM_MOVE != 0 {
            EventKind::Move
        } else if kind_bits & GPM_DOWN != 0 {
            EventKind::Press
        } else {
            return None;
        };

        let button = if self.buttons & GPM_B_LEFT != 0 {
            Some(Button::Left)
        } else if self.buttons & GPM_B_MIDDLE != 0 {
            Some(Button::Middle)
        } else if self.buttons & GPM_B_RIGHT != 0 {
            Some(Button::Right)
        } else {
            None
        };

        Some(MouseEvent {
            button,
            kind,
            x: self.x,
            y: self.y,
        })
    }
}

/// Open connection to the GPM daemon.
#[derive(Debug)]
pub struct GpmConnection {
    socket: UnixStream,
    console: Option<File>,
    pending: Vec<u8>,
}

impl GpmConnection {
    /// Connect to the daemon at `socket_path` and register for all pointer
    /// events. `console_path` is opened for pointer drawing; if it cannot be
    /// opened the connection still works, it just draws nothing.
    pub fn open(socket_path: &Path, console_path: &Path) -> Result<Self, MouseError> {
        let mut socket = UnixStream::connect(socket_path)
            .map_err(|e| MouseError::Connect(format!("{}: {e}", socket_path.display())))?;

        let request = ConnectRequest::all_events(std::process::id() as i32, controlling_vc());
        log::debug!("[gpm] registering {request:?}");
        socket
            .write_all(&request.encode())
            .map_err(|e| MouseError::Connect(format!("register: {e}")))?;
        socket.set_nonblocking(true)?;

        let console = match OpenOptions::new().write(true).open(console_path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::debug!(
                    "[gpm] cannot open {} for pointer drawing: {e}",
                    console_path.display()
                );
                None
            }
        };

        Ok(Self::from_parts(socket, console))
    }

    /// Wrap an already-registered socket.
    pub fn from_parts(socket: UnixStream, console: Option<File>) -> Self {
        Self {
            socket,
            console,
            pending: Vec::with_capacity(EVENT_RECORD_LEN),
        }
    }

    /// Pull whatever bytes are available, up to one full record.
    fn fill_record(&mut self) -> Result<(), MouseError> {
        let mut buf = [0u8; EVENT_RECORD_LEN];
        while self.pending.len() < EVENT_RECORD_LEN {
            let want = EVENT_RECORD_LEN - self.pending.len();
            match self.socket.read(&mut buf[..want]) {
                Ok(0) => return Err(MouseError::Closed),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(MouseError::Io(e)),
            }
        }
        Ok(())
    }
}

impl MouseServer for GpmConnection {
    fn poll_fd(&self) -> BorrowedFd<'_> {
        self.socket.as_fd()
    }

    fn next_event(&mut self) -> Result<Option<MouseEvent>, MouseError> {
        self.fill_record()?;
        if self.pending.len() < EVENT_RECORD_LEN {
            return Ok(None);
        }
        let mut record = [0u8; EVENT_RECORD_LEN];
        record.copy_from_slice(&self.pending[..EVENT_RECORD_LEN]);
        self.pending.drain(..EVENT_RECORD_LEN);

        let raw = RawEvent::decode(&record);
        let event = raw.to_mouse_event();
        if event.is_none() {
            log::debug!("[gpm] ignoring event type {:#x}", raw.event_type);
        }
        Ok(event)
    }

    fn draw_cursor(&mut self, event: &MouseEvent) {
        let Some(console) = &self.console else {
            return;
        };
        if let Err(e) = draw_pointer(console, event.x, event.y) {
            log::debug!("[gpm] pointer draw failed: {e}");
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.socket.shutdown(std::net::Shutdown::Both) {
            log::debug!("[gpm] shutdown: {e}");
        }
        self.console = None;
    }
}

/// Build the `TIOCLINUX` argument that draws the pointer at `(x, y)`.
///
/// Layout: subcode byte, then start x/y, end x/y and selection mode as
/// unaligned native `u16`s.
pub fn pointer_selection(x: i16, y: i16) -> [u8; 11] {
    let mut arg = [0u8; 11];
    arg[0] = TIOCL_SETSEL;
    let x = (x as u16).to_ne_bytes();
    let y = (y as u16).to_ne_bytes();
    arg[1..3].copy_from_slice(&x);
    arg[3..5].copy_from_slice(&y);
    arg[5..7].copy_from_slice(&x);
    arg[7..9].copy_from_slice(&y);
    arg[9..11].copy_from_slice(&TIOCL_SELPOINTER.to_ne_bytes());
    arg
}

#[cfg(target_os = "linux")]
fn draw_pointer(console: &File, x: i16, y: i16) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    let mut arg = pointer_selection(x, y);
    // SAFETY: TIOCLINUX reads its subcode byte and the selection record from
    // `arg`, which is a live 11-byte buffer for the duration of the call.
    let rc = unsafe { libc::ioctl(console.as_raw_fd(), libc::TIOCLINUX, arg.as_mut_ptr()) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn draw_pointer(_console: &File, _x: i16, _y: i16) -> std::io::Result<()> {
    Ok(())
}

/// Virtual console number of the controlling terminal (`/dev/ttyN` → N).
fn controlling_vc() -> i32 {
    match nix::unistd::ttyname(std::io::stdin()) {
        Ok(path) => vc_from_tty_name(&path),
        Err(e) => {
            log::debug!("[gpm] stdin has no tty name: {e}");
            0
        }
    }
}

/// Parse the console number out of a `/dev/ttyN` path; anything else is 0.
pub fn vc_from_tty_name(path: &Path) -> i32 {
    path.to_str()
        .and_then(|s| s.strip_prefix("/dev/tty"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(buttons: u8, x: i16, y: i16, event_type: i32) -> [u8; EVENT_RECORD_LEN] {
        let mut r = [0u8; EVENT_RECORD_LEN];
        r[0] = buttons;
        r[2..4].copy_from_slice(&3u16.to_ne_bytes());
        r[8..10].copy_from_slice(&x.to_ne_bytes());
        r[10..12].copy_from_slice(&y.to_ne_bytes());
        r[12..16].copy_from_slice(&event_type.to_ne_bytes());
        r[16..20].copy_from_slice(&1i32.to_ne_bytes());
        r
    }

    #[test]
    fn test_connect_request_layout() {
        let bytes = ConnectRequest::all_events(1234, 2).encode();
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 15);
        assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), GPM_HARD);
        assert_eq!(u16::from_ne_bytes([bytes[4], bytes[5]]), 0);
        assert_eq!(u16::from_ne_bytes([bytes[6], bytes[7]]), 0);
        assert_eq!(i32::from_ne_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 1234);
        assert_eq!(i32::from_ne_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]), 2);
    }

    #[test]
    fn test_decode_event_record() {
        let raw = RawEvent::decode(&record(GPM_B_LEFT, 12, 7, i32::from(GPM_DOWN) | 16));
        assert_eq!(raw.buttons, GPM_B_LEFT);
        assert_eq!(raw.vc, 3);
        assert_eq!((raw.x, raw.y), (12, 7));
        assert_eq!(raw.clicks, 1);
        assert_eq!(
            raw.to_mouse_event(),
            Some(MouseEvent {
                button: Some(Button::Left),
                kind: EventKind::Press,
                x: 12,
                y: 7
            })
        );
    }

    #[test]
    fn test_event_kind_priority() {
        let kind = |t: u16| {
            RawEvent::decode(&record(GPM_B_RIGHT, 1, 1, i32::from(t)))
                .to_mouse_event()
                .map(|e| e.kind)
        };
        assert_eq!(kind(GPM_UP | GPM_DRAG), Some(EventKind::Release));
        assert_eq!(kind(GPM_DRAG | GPM_MOVE), Some(EventKind::Drag));
        assert_eq!(kind(GPM_MOVE), Some(EventKind::Move));
        assert_eq!(kind(GPM_DOWN), Some(EventKind::Press));
        assert_eq!(kind(512), None);
    }

    #[test]
    fn test_button_priority_left_first() {
        let raw = RawEvent::decode(&record(
            GPM_B_LEFT | GPM_B_RIGHT,
            1,
            1,
            i32::from(GPM_DOWN),
        ));
        assert_eq!(raw.to_mouse_event().and_then(|e| e.button), Some(Button::Left));

        let raw = RawEvent::decode(&record(GPM_B_MIDDLE | GPM_B_RIGHT, 1, 1, i32::from(GPM_DOWN)));
        assert_eq!(raw.to_mouse_event().and_then(|e| e.button), Some(Button::Middle));
    }

    #[test]
    fn test_pointer_selection_layout() {
        let arg = pointer_selection(10, 20);
        assert_eq!(arg[0], 2);
        assert_eq!(u16::from_ne_bytes([arg[1], arg[2]]), 10);
        assert_eq!(u16::from_ne_bytes([arg[3], arg[4]]), 20);
        assert_eq!(u16::from_ne_bytes([arg[5], arg[6]]), 10);
        assert_eq!(u16::from_ne_bytes([arg[7], arg[8]]), 20);
        assert_eq!(u16::from_ne_bytes([arg[9], arg[10]]), 3);
    }

    #[test]
    fn test_vc_from_tty_name() {
        assert_eq!(vc_from_tty_name(Path::new("/dev/tty3")), 3);
        assert_eq!(vc_from_tty_name(Path::new("/dev/tty12")), 12);
        assert_eq!(vc_from_tty_name(Path::new("/dev/pts/4")), 0);
        assert_eq!(vc_from_tty_name(Path::new("/dev/ttyS0")), 0);
    }

    #[test]
    fn test_next_event_reassembles_split_records() {
        let (ours, mut daemon) = UnixStream::pair().expect("pair");
        ours.set_nonblocking(true).expect("nonblocking");
        let mut conn = GpmConnection::from_parts(ours, None);

        assert!(conn.next_event().expect("empty").is_none());

        let rec = record(GPM_B_MIDDLE, 40, 2, i32::from(GPM_DRAG));
        daemon.write_all(&rec[..10]).expect("write");
        assert!(conn.next_event().expect("partial").is_none());
        daemon.write_all(&rec[10..]).expect("write");

        let event = conn.next_event().expect("read").expect("complete");
        assert_eq!(event.kind, EventKind::Drag);
        assert_eq!(event.button, Some(Button::Middle));
        assert_eq!((event.x, event.y), (40, 2));
    }

    #[test]
    fn test_daemon_hangup_is_closed_error() {
        let (ours, daemon) = UnixStream::pair().expect("pair");
        ours.set_nonblocking(true).expect("nonblocking");
        let mut conn = GpmConnection::from_parts(ours, None);
        drop(daemon);
        assert!(matches!(conn.next_event(), Err(MouseError::Closed)));
    }

    #[test]
    fn test_open_registers_with_daemon() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("gpmctl");
        let listener = std::os::unix::net::UnixListener::bind(&path).expect("bind");

        let conn = GpmConnection::open(&path, &dir.path().join("no-console")).expect("open");
        let (mut accepted, _) = listener.accept().expect("accept");
        let mut buf = [0u8; CONNECT_RECORD_LEN];
        accepted.read_exact(&mut buf).expect("connect record");

        let expected = ConnectRequest::all_events(std::process::id() as i32, controlling_vc());
        assert_eq!(buf, expected.encode());
        assert!(conn.console.is_none());
    }
}
