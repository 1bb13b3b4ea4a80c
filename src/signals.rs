//! Signal relay.
//!
//! Handlers only flip atomic flags and poke a self-pipe; the multiplexer
//! does the real work (forwarding to the child, reaping, resizing) after its
//! wait returns.
//!
//! # Signals
//!
//! | Signal            | Effect in the main loop                     |
//! |-------------------|---------------------------------------------|
//! | SIGINT, SIGTERM   | forwarded to the child, session stops       |
//! | SIGHUP, SIGQUIT   | forwarded to the child                      |
//! | SIGCHLD           | non-blocking check for child exit           |
//! | SIGWINCH          | real terminal size copied to the PTY        |
//!
//! Every handler also writes a byte to a socket pair whose read end sits in
//! the wait set, so a signal that lands just before the blocking wait still
//! wakes it.

// Rust guideline compliant 2026-02

use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::Signal;
use signal_hook::consts::signal::{SIGCHLD, SIGWINCH};
use signal_hook::SigId;

use crate::error::SignalError;

/// Signals forwarded to the child, in registration order.
pub const FORWARDED_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Signals collected since the last [`SignalRelay::take_pending`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSignals {
    /// Signals to pass on to the child.
    pub forward: Vec<Signal>,
    /// The child may have changed state.
    pub child_changed: bool,
    /// The real terminal was resized.
    pub resized: bool,
}

impl PendingSignals {
    /// Whether any pending signal ends the session directly.
    pub fn stops_session(&self) -> bool {
        self.forward
            .iter()
            .any(|s| matches!(s, Signal::SIGINT | Signal::SIGTERM))
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && !self.child_changed && !self.resized
    }
}

/// Installed handlers plus the flags they set.
///
/// Handlers are removed again when the relay is dropped.
#[derive(Debug)]
pub struct SignalRelay {
    forwarded: Vec<(Signal, Arc<AtomicBool>)>,
    child: Arc<AtomicBool>,
    resize: Arc<AtomicBool>,
    wake: UnixStream,
    ids: Vec<SigId>,
}

impl SignalRelay {
    /// Install all handlers.
    pub fn install() -> Result<Self, SignalError> {
        let wake_error = |source| SignalError { signal: 0, source };
        let (wake, wake_tx) = UnixStream::pair().map_err(wake_error)?;
        wake.set_nonblocking(true).map_err(wake_error)?;
        wake_tx.set_nonblocking(true).map_err(wake_error)?;

        let mut relay = Self {
            forwarded: FORWARDED_SIGNALS
                .iter()
                .map(|&s| (s, Arc::new(AtomicBool::new(false))))
                .collect(),
            child: Arc::new(AtomicBool::new(false)),
            resize: Arc::new(AtomicBool::new(false)),
            wake,
            ids: Vec::new(),
        };

        let mut flags: Vec<(i32, Arc<AtomicBool>)> = relay
            .forwarded
            .iter()
            .map(|(s, flag)| (*s as i32, Arc::clone(flag)))
            .collect();
        flags.push((SIGCHLD, Arc::clone(&relay.child)));
        flags.push((SIGWINCH, Arc::clone(&relay.resize)));

        for (signal, flag) in flags {
            let id = signal_hook::flag::register(signal, flag)
                .map_err(|source| SignalError { signal, source })?;
            relay.ids.push(id);

            let tx = wake_tx
                .try_clone()
                .map_err(|source| SignalError { signal, source })?;
            let id = signal_hook::low_level::pipe::register(signal, tx)
                .map_err(|source| SignalError { signal, source })?;
            relay.ids.push(id);
        }

        log::debug!("[signals] installed {} handlers", relay.ids.len());
        Ok(relay)
    }

    /// Read end of the wake-up socket, for the wait set.
    pub fn wake_fd(&self) -> BorrowedFd<'_> {
        self.wake.as_fd()
    }

    /// Discard queued wake-up bytes.
    pub fn drain_wake(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.wake).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::debug!("[signals] wake drain: {e}");
                    break;
                }
            }
        }
    }

    /// Collect and clear everything that arrived since the last call.
    pub fn take_pending(&self) -> PendingSignals {
        PendingSignals {
            forward: self
                .forwarded
                .iter()
                .filter(|(_, flag)| flag.swap(false, Ordering::AcqRel))
                .map(|(signal, _)| *signal)
                .collect(),
            child_changed: self.child.swap(false, Ordering::AcqRel),
            resized: self.resize.swap(false, Ordering::AcqRel),
        }
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
