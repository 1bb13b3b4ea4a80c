//! Application-wide constants for mousebridge.
//!
//! Centralizes the magic numbers shared between the multiplexer, the
//! scanner and the binary entry point.
//!
//! # Categories
//!
//! - **I/O**: Buffer sizes for the forwarding paths
//! - **Timeouts**: Draining grace period
//! - **Exit codes**: Process exit status conventions

use std::time::Duration;

// ============================================================================
// I/O
// ============================================================================

/// Size of the buffer used for one read from any source.
///
/// Each ready source is read once per loop iteration, bounded by this size,
/// so a chatty child cannot starve keyboard or mouse input.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Bytes of program input held back while the PTY input queue is full.
///
/// Keyboard input is not read again until the backlog drops below this, so
/// program output keeps flowing while the program catches up.
pub const MAX_PENDING_INPUT: usize = 64 * 1024;

/// Longest incomplete `ESC [ ?` prefix the output scanner carries between
/// reads. Longer fragments are dropped.
pub const SCANNER_CARRY_LIMIT: usize = 32;

// ============================================================================
// Timeouts
// ============================================================================

/// Quiet period used while draining child output after the loop stops.
///
/// Draining ends as soon as the PTY has been silent this long, or reports
/// EOF/EIO.
pub const DRAIN_QUIET_PERIOD: Duration = Duration::from_millis(50);

/// Upper bound on the whole draining phase.
pub const DRAIN_MAX_DURATION: Duration = Duration::from_secs(1);

// ============================================================================
// Exit codes
// ============================================================================

/// Exit code for setup failures, bad arguments, exec failures and abnormal
/// child termination.
pub const EXIT_FAILURE: u8 = 1;

// ============================================================================
// Terminal defaults
// ============================================================================

/// Rows used when the real terminal size cannot be determined.
pub const DEFAULT_ROWS: u16 = 24;

/// Columns used when the real terminal size cannot be determined.
pub const DEFAULT_COLS: u16 = 80;
