//! Mouse-reporting mode detection in child output.
//!
//! Programs opt in to mouse reporting by writing DEC private mode sequences
//! to their terminal:
//!
//! - **1000**: click reporting (`ESC [ ? 1000 h`)
//! - **1002**: click + drag reporting
//! - **1003**: all-motion reporting
//! - **1006**: SGR extended coordinates
//!
//! A final `h` sets the mode, a final `l` resets it. All four drive one
//! shared tracking flag; which of them is active is not remembered.
//!
//! # Example
//!
//! ```
//! use mousebridge::scanner::OutputScanner;
//!
//! let mut scanner = OutputScanner::new();
//! scanner.scan(b"\x1b[?1000h");
//! assert!(scanner.tracking_enabled());
//! ```

// Rust guideline compliant 2026-02

use crate::constants::SCANNER_CARRY_LIMIT;

/// DEC private modes that toggle mouse tracking.
pub const MOUSE_MODES: [u32; 4] = [1000, 1002, 1003, 1006];

const ESC: u8 = 0x1b;

/// Outcome of matching a private-mode sequence at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeMatch {
    /// A complete `ESC [ ? params h|l` sequence of `len` bytes.
    Complete {
        len: usize,
        set: bool,
        mouse: bool,
    },
    /// The buffer ends inside what could still become a sequence.
    Partial,
    /// Not a private-mode set/reset sequence.
    None,
}

/// Watches the child's output stream and tracks whether it asked for mouse
/// reports.
///
/// An incomplete sequence at the end of one chunk is carried over and
/// completed by the next chunk, up to [`SCANNER_CARRY_LIMIT`] bytes.
#[derive(Debug, Default)]
pub struct OutputScanner {
    tracking: bool,
    carry: Vec<u8>,
}

impl OutputScanner {
    /// Create a scanner with tracking disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the child currently wants mouse reports.
    pub fn tracking_enabled(&self) -> bool {
        self.tracking
    }

    /// Examine one chunk of child output.
    ///
    /// Sequences are applied in stream order, so the last mouse mode
    /// sequence in the chunk decides the flag.
    pub fn scan(&mut self, chunk: &[u8]) {
        let joined;
        let data: &[u8] = if self.carry.is_empty() {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.carry);
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        let mut i = 0;
        while i < data.len() {
            if data[i] != ESC {
                i += 1;
                continue;
            }
            match match_private_mode(&data[i..]) {
                ModeMatch::Complete { len, set, mouse } => {
                    if mouse && self.tracking != set {
                        log::debug!(
                            "[scanner] mouse tracking {}",
                            if set { "enabled" } else { "disabled" }
                        );
                    }
                    if mouse {
                        self.tracking = set;
                    }
                    i += len;
                }
                ModeMatch::Partial => {
                    let rest = &data[i..];
                    if rest.len() <= SCANNER_CARRY_LIMIT {
                        self.carry.extend_from_slice(rest);
                    }
                    break;
                }
                ModeMatch::None => i += 1,
            }
        }
    }
}

/// Match `ESC [ ? <digits and ;> h|l` at the start of `data`.
fn match_private_mode(data: &[u8]) -> ModeMatch {
    debug_assert_eq!(data.first(), Some(&ESC));

    match data.get(1) {
        None => return ModeMatch::Partial,
        Some(b'[') => {}
        Some(_) => return ModeMatch::None,
    }
    match data.get(2) {
        None => return ModeMatch::Partial,
        Some(b'?') => {}
        Some(_) => return ModeMatch::None,
    }

    let params_end = data[3..]
        .iter()
        .position(|&b| !(b.is_ascii_digit() || b == b';'))
        .map(|p| p + 3);
    let Some(end) = params_end else {
        return ModeMatch::Partial;
    };

    let set = match data[end] {
        b'h' => true,
        b'l' => false,
        _ => return ModeMatch::None,
    };

    let mouse = data[3..end]
        .split(|&b| b == b';')
        .filter_map(|param| std::str::from_utf8(param).ok()?.parse::<u32>().ok())
        .any(|mode| MOUSE_MODES.contains(&mode));

    ModeMatch::Complete {
        len: end + 1,
        set,
        mouse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_reset_click_tracking() {
        let mut scanner = OutputScanner::new();
        scanner.scan(b"\x1b[?1000h");
        assert!(scanner.tracking_enabled());
        scanner.scan(b"\x1b[?1000l");
        assert!(!scanner.tracking_enabled());
    }

    #[test]
    fn test_every_mouse_mode_toggles_the_same_flag() {
        for mode in MOUSE_MODES {
            let mut scanner = OutputScanner::new();
            scanner.scan(format!("\x1b[?{mode}h").as_bytes());
            assert!(scanner.tracking_enabled(), "mode {mode} should enable");
            scanner.scan(format!("\x1b[?{mode}l").as_bytes());
            assert!(!scanner.tracking_enabled(), "mode {mode} should disable");
        }
    }

    #[test]
    fn test_unrelated_output_leaves_flag_unchanged() {
        let mut scanner = OutputScanner::new();
        scanner.scan(b"\x1b[?1002h");
        scanner.scan(b"plain text, \x1b[1;31mcolors\x1b[0m and \x1b[2J");
        assert!(scanner.tracking_enabled());

        let mut scanner = OutputScanner::new();
        scanner.scan(b"ls -la\r\ntotal 0\r\n");
        assert!(!scanner.tracking_enabled());
    }

    #[test]
    fn test_other_private_modes_are_ignored() {
        let mut scanner = OutputScanner::new();
        // Cursor visibility, alternate screen, bracketed paste.
        scanner.scan(b"\x1b[?25h\x1b[?1049h\x1b[?2004h");
        assert!(!scanner.tracking_enabled());

        scanner.scan(b"\x1b[?1000h");
        scanner.scan(b"\x1b[?25l\x1b[?1049l");
        assert!(scanner.tracking_enabled());
    }

    #[test]
    fn test_multi_parameter_sequence() {
        let mut scanner = OutputScanner::new();
        scanner.scan(b"\x1b[?1002;1006h");
        assert!(scanner.tracking_enabled());
        scanner.scan(b"\x1b[?1049;1006l");
        assert!(!scanner.tracking_enabled());
    }

    #[test]
    fn test_last_sequence_in_chunk_wins() {
        let mut scanner = OutputScanner::new();
        scanner.scan(b"\x1b[?1000h redraw \x1b[?1000l");
        assert!(!scanner.tracking_enabled());

        scanner.scan(b"\x1b[?1003l exit \x1b[?1003h");
        assert!(scanner.tracking_enabled());
    }

    #[test]
    fn test_sequence_embedded_in_output() {
        let mut scanner = OutputScanner::new();
        scanner.scan(b"\x1b[?1049h\x1b[H\x1b[2Jwelcome\x1b[?1000h\x1b[?1006hmore");
        assert!(scanner.tracking_enabled());
    }

    #[test]
    fn test_sequence_split_across_reads() {
        let mut scanner = OutputScanner::new();
        scanner.scan(b"output\x1b[?10");
        assert!(!scanner.tracking_enabled());
        scanner.scan(b"00h");
        assert!(scanner.tracking_enabled());

        scanner.scan(b"\x1b");
        scanner.scan(b"[");
        scanner.scan(b"?1000");
        scanner.scan(b"l");
        assert!(!scanner.tracking_enabled());
    }

    #[test]
    fn test_oversized_fragment_is_dropped() {
        let mut scanner = OutputScanner::new();
        let mut chunk = b"\x1b[?".to_vec();
        chunk.extend(std::iter::repeat(b'1').take(SCANNER_CARRY_LIMIT * 2));
        scanner.scan(&chunk);
        scanner.scan(b"h");
        assert!(!scanner.tracking_enabled());
        assert!(scanner.carry.is_empty());
    }

    #[test]
    fn test_carry_does_not_swallow_following_text() {
        let mut scanner = OutputScanner::new();
        scanner.scan(b"\x1b[");
        scanner.scan(b"31mred\x1b[?1000h");
        assert!(scanner.tracking_enabled());
        assert!(scanner.carry.is_empty());
    }
}
