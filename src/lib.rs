//! mousebridge - console mouse support for terminal programs.
//!
//! Runs a program inside a pseudo-terminal, passes keyboard input and program
//! output through untouched, and turns native console mouse events (GPM)
//! into the SGR mouse reports that full-screen terminal programs understand.
//!
//! # Architecture
//!
//! ```text
//! main
//!  ├── SignalRelay::install      handlers set flags, poke a wake socket
//!  ├── Session::launch           PTY pair + child on the slave side
//!  ├── TerminalMode::save/raw    real terminal switched to raw
//!  ├── MouseConnection::connect  GPM, best effort
//!  └── Multiplexer::run          one loop over stdin, master, mouse, wake
//!        └── OutputScanner       watches output for mouse-mode toggles
//! ```
//!
//! # Modules
//!
//! - [`multiplexer`] - The forwarding loop and its state machine
//! - [`session`] - PTY session launcher
//! - [`terminal`] - Real terminal mode save/raw/restore
//! - [`mouse`] - Mouse event types, GPM client and SGR encoding
//! - [`scanner`] - Mouse-mode detection in program output
//! - [`signals`] - Signal relay
//! - [`config`] - Configuration loading

pub mod config;
pub mod constants;
pub mod error;
pub mod mouse;
pub mod multiplexer;
pub mod scanner;
pub mod session;
pub mod signals;
pub mod terminal;

// Re-export commonly used types
pub use config::Config;
pub use error::{LaunchError, MouseError, SignalError, TerminalError};
pub use mouse::{MouseConnection, MouseEvent};
pub use multiplexer::{LoopState, Multiplexer};
pub use scanner::OutputScanner;
pub use session::{ChildExit, Session};
pub use signals::SignalRelay;
pub use terminal::{TerminalMode, WindowSize};
