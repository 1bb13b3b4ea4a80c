//! I/O multiplexer.
//!
//! The single-threaded loop at the center of the bridge. One blocking wait
//! covers every input source; each ready source is read once per iteration:
//!
//! ```text
//!            ┌────────────── wait (no timeout) ──────────────┐
//!  stdin ───►│ keyboard bytes ─────► backlog ──► PTY master   │
//!  master ──►│ program output ─► scanner ────► stdout         │
//!  mouse ───►│ native event ─► draw pointer ─► SGR ► backlog  │
//!  wake ────►│ pending signals: forward, resize, reap         │
//!            └───────────────────────────────────────────────┘
//! ```
//!
//! The master is non-blocking. Input the PTY cannot take yet waits in a
//! backlog that is flushed when the master turns writable; while the backlog
//! is full, keyboard input is not read, so program output keeps draining and
//! neither side can wedge the other.
//!
//! # States
//!
//! ```text
//! Running ──(stop signal | child exit | EOF | I/O error)──► Draining
//! Draining ──(quiet for 50 ms | 1 s elapsed | EOF)────────► Stopped
//! ```
//!
//! In `Stopped` the mouse connection is closed, the terminal restored, and
//! the child reaped. The master is closed before the blocking reap, so a
//! child that is still alive gets a hangup instead of a deadlock.

// Rust guideline compliant 2026-02

use std::io::{ErrorKind, Write};
use std::os::fd::BorrowedFd;
use std::time::Instant;

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::constants::{
    DRAIN_MAX_DURATION, DRAIN_QUIET_PERIOD, MAX_PENDING_INPUT, READ_BUFFER_SIZE,
};
use crate::mouse::{to_sgr_sequence, MouseConnection};
use crate::scanner::OutputScanner;
use crate::session::{ChildExit, Session};
use crate::signals::SignalRelay;
use crate::terminal::{window_size, TerminalMode};

/// Lifecycle of the forwarding loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Forwarding in both directions.
    Running,
    /// Flushing the remaining program output.
    Draining,
    /// Done; resources are being released.
    Stopped,
}

/// Readiness of each source after one wait.
#[derive(Debug, Default, Clone, Copy)]
struct Ready {
    input: bool,
    output: bool,
    writable: bool,
    mouse: bool,
    wake: bool,
}

fn readable(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|r| {
        r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
    })
}

fn writable(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|r| r.contains(PollFlags::POLLOUT))
}

/// Owns everything a session needs and runs it to completion.
#[derive(Debug)]
pub struct Multiplexer {
    session: Session,
    mouse: MouseConnection,
    signals: SignalRelay,
    terminal: Option<TerminalMode>,
    scanner: OutputScanner,
    state: LoopState,
    /// Input accepted from the user or the mouse but not yet taken by the PTY.
    pending_input: Vec<u8>,
    input_closed: bool,
}

impl Multiplexer {
    /// Assemble a multiplexer around a launched session.
    pub fn new(session: Session, mouse: MouseConnection, signals: SignalRelay) -> Self {
        Self {
            session,
            mouse,
            signals,
            terminal: None,
            scanner: OutputScanner::new(),
            state: LoopState::Running,
            pending_input: Vec::new(),
            input_closed: false,
        }
    }

    /// Hand over the real terminal so it is restored when the loop stops.
    pub fn with_terminal(mut self, terminal: TerminalMode) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Whether the program has mouse tracking on.
    pub fn tracking_enabled(&self) -> bool {
        self.scanner.tracking_enabled()
    }

    /// Forward between `input`, `output` and the session until it ends.
    ///
    /// Returns how the child ended.
    pub fn run<W: Write>(mut self, input: BorrowedFd<'_>, output: &mut W) -> Result<ChildExit> {
        let mut buf = [0u8; READ_BUFFER_SIZE];

        while self.state == LoopState::Running {
            self.handle_signals();
            if self.input_closed && self.pending_input.is_empty() {
                log::info!("[mux] input closed");
                self.state = LoopState::Draining;
            }
            if self.state != LoopState::Running {
                break;
            }

            let ready = match self.wait(input) {
                Ok(ready) => ready,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    log::error!("[mux] wait failed: {e}");
                    self.state = LoopState::Draining;
                    break;
                }
            };

            if ready.wake {
                self.signals.drain_wake();
            }
            if ready.output && !self.forward_output(output, &mut buf) {
                break;
            }
            if ready.input {
                self.read_input(input, &mut buf);
            }
            if ready.mouse {
                self.forward_mouse();
            }
            if ready.writable || ready.input || ready.mouse {
                self.flush_input();
            }
        }

        self.state = LoopState::Draining;
        self.drain(output, &mut buf);
        self.stop()
    }

    /// Apply whatever the signal handlers recorded.
    fn handle_signals(&mut self) {
        let pending = self.signals.take_pending();
        if pending.is_empty() {
            return;
        }

        for signal in &pending.forward {
            log::info!("[mux] forwarding {signal} to child");
            self.session.signal(*signal);
        }
        if pending.stops_session() {
            self.state = LoopState::Draining;
        }
        if pending.resized {
            self.session.resize(window_size());
        }
        if pending.child_changed && self.session.try_reap().is_some() {
            self.state = LoopState::Draining;
        }
    }

    /// Block until at least one source is ready.
    ///
    /// Keyboard input is left out of the wait set while the backlog is at
    /// its bound, and the master is watched for writability while there is
    /// any backlog at all.
    fn wait(&self, input: BorrowedFd<'_>) -> nix::Result<Ready> {
        let mut master_events = PollFlags::POLLIN;
        if !self.pending_input.is_empty() {
            master_events |= PollFlags::POLLOUT;
        }
        let mut fds = vec![
            PollFd::new(self.session.master_fd(), master_events),
            PollFd::new(self.signals.wake_fd(), PollFlags::POLLIN),
        ];
        let input_slot = (!self.input_closed && self.pending_input.len() < MAX_PENDING_INPUT)
            .then(|| {
                fds.push(PollFd::new(input, PollFlags::POLLIN));
                fds.len() - 1
            });
        let mouse_slot = self.mouse.poll_fd().map(|fd| {
            fds.push(PollFd::new(fd, PollFlags::POLLIN));
            fds.len() - 1
        });

        poll(&mut fds, PollTimeout::NONE)?;

        Ok(Ready {
            output: readable(&fds[0]),
            writable: writable(&fds[0]),
            wake: readable(&fds[1]),
            input: input_slot.is_some_and(|i| readable(&fds[i])),
            mouse: mouse_slot.is_some_and(|i| readable(&fds[i])),
        })
    }

    /// Take one read of keyboard input into the backlog.
    fn read_input(&mut self, input: BorrowedFd<'_>, buf: &mut [u8]) {
        match nix::unistd::read(input, buf) {
            Ok(0) => self.input_closed = true,
            Ok(n) => self.pending_input.extend_from_slice(&buf[..n]),
            Err(Errno::EINTR | Errno::EAGAIN) => {}
            Err(e) => {
                log::warn!("[mux] input read failed: {e}");
                self.state = LoopState::Draining;
            }
        }
    }

    /// Hand as much of the backlog to the PTY as it takes without blocking.
    fn flush_input(&mut self) {
        while !self.pending_input.is_empty() {
            match self.session.write_input(&self.pending_input) {
                Ok(0) => break,
                Ok(n) => {
                    self.pending_input.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("[mux] write to PTY failed: {e}");
                    self.state = LoopState::Draining;
                    break;
                }
            }
        }
    }

    /// Read one chunk of program output. Returns `false` at EOF or on error.
    fn forward_output<W: Write>(&mut self, output: &mut W, buf: &mut [u8]) -> bool {
        match self.session.read_output(buf) {
            Ok(0) => {
                log::info!("[mux] PTY closed");
                self.state = LoopState::Draining;
                false
            }
            Ok(n) => {
                self.scanner.scan(&buf[..n]);
                if let Err(e) = output.write_all(&buf[..n]).and_then(|()| output.flush()) {
                    log::warn!("[mux] write to terminal failed: {e}");
                    self.state = LoopState::Draining;
                    return false;
                }
                true
            }
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => true,
            Err(e) => {
                // EIO once the slave side has no more holders.
                log::info!("[mux] PTY read ended: {e}");
                self.state = LoopState::Draining;
                false
            }
        }
    }

    /// Queue the SGR report for one mouse event, if the program wants it.
    fn forward_mouse(&mut self) {
        let Some(event) = self.mouse.next_event() else {
            return;
        };
        self.mouse.draw_cursor(&event);
        let Some(sequence) = to_sgr_sequence(&event, self.scanner.tracking_enabled()) else {
            return;
        };
        log::trace!("[mux] mouse {event:?}");
        self.pending_input.extend_from_slice(&sequence);
    }

    /// Forward remaining output until the PTY goes quiet.
    fn drain<W: Write>(&mut self, output: &mut W, buf: &mut [u8]) {
        let deadline = Instant::now() + DRAIN_MAX_DURATION;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                log::debug!("[mux] drain deadline reached");
                break;
            }
            let quiet = remaining.min(DRAIN_QUIET_PERIOD);
            let timeout = u16::try_from(quiet.as_millis())
                .map(PollTimeout::from)
                .unwrap_or(PollTimeout::from(u16::MAX));

            let mut fds = [PollFd::new(self.session.master_fd(), PollFlags::POLLIN)];
            let polled = poll(&mut fds, timeout).map(|n| n > 0 && readable(&fds[0]));
            match polled {
                Ok(true) => {
                    if !self.forward_output(output, buf) {
                        break;
                    }
                }
                Ok(false) => break,
                Err(Errno::EINTR) => {}
                Err(e) => {
                    log::debug!("[mux] drain wait failed: {e}");
                    break;
                }
            }
        }
    }

    /// Release resources and reap the child.
    fn stop(mut self) -> Result<ChildExit> {
        self.state = LoopState::Stopped;
        self.mouse.close();
        if let Some(mut terminal) = self.terminal.take() {
            if let Err(e) = terminal.restore() {
                log::warn!("[mux] terminal restore failed: {e}");
            }
        }
        let exit = self
            .session
            .finish()
            .context("Failed to wait for child process")?;
        log::info!("[mux] session ended: {exit:?}");
        Ok(exit)
    }
}
