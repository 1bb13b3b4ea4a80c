//! SGR mouse sequence encoding.
//!
//! Format: `ESC [ < button ; column ; row M` for press, drag and move, and
//! `... m` for release. Button codes:
//!
//! | Event              | Code          |
//! |--------------------|---------------|
//! | press left/mid/right | 0 / 1 / 2   |
//! | release            | press code, final `m` |
//! | drag               | press code + 32 |
//! | move, no button    | 35            |

use super::{Button, EventKind, MouseEvent};

/// Motion flag added to the button code for drag events.
pub const MOTION_FLAG: u16 = 32;

/// Button code for pointer motion with no button held.
pub const MOVE_CODE: u16 = 35;

/// SGR code of a button; no button counts as left.
pub fn button_code(button: Option<Button>) -> u16 {
    match button {
        Some(Button::Left) | None => 0,
        Some(Button::Middle) => 1,
        Some(Button::Right) => 2,
    }
}

/// Encode `event` as an SGR mouse report.
///
/// Returns `None` while the program has not enabled mouse tracking.
/// Coordinates are emitted exactly as received.
pub fn to_sgr_sequence(event: &MouseEvent, tracking_enabled: bool) -> Option<Vec<u8>> {
    if !tracking_enabled {
        return None;
    }
    let (code, final_byte) = match event.kind {
        EventKind::Press => (button_code(event.button), 'M'),
        EventKind::Release => (button_code(event.button), 'm'),
        EventKind::Drag => (button_code(event.button) + MOTION_FLAG, 'M'),
        EventKind::Move => (MOVE_CODE, 'M'),
    };
    Some(format!("\x1b[<{};{};{}{}", code, event.x, event.y, final_byte).into_bytes())
}
