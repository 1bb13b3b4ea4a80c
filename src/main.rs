//! mousebridge CLI - runs a program with console mouse support.
//!
//! This is the binary entry point. See the `mousebridge` library for the
//! core functionality.

use std::ffi::OsString;
use std::io::IsTerminal;
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use mimalloc::MiMalloc;
use mousebridge::constants::EXIT_FAILURE;
use mousebridge::{
    terminal, Config, MouseConnection, Multiplexer, Session, SignalRelay, TerminalError,
    TerminalMode,
};
use nix::sys::termios::{tcsetattr, SetArg, Termios};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Attributes to put back if we panic while the terminal is raw.
static PANIC_RESTORE: OnceLock<libc::termios> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "mousebridge")]
#[command(version)]
#[command(about = "Run a program with GPM mouse events translated to SGR mouse reports")]
struct Cli {
    /// Do not connect to the mouse server
    #[arg(long)]
    no_mouse: bool,

    /// Write logs to this file instead of the default location
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Program to run, followed by its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<OsString>,
}

fn init_logging(path: &std::path::Path) {
    // The terminal belongs to the child, so logs only ever go to a file.
    let Ok(log_file) = std::fs::File::create(path) else {
        return;
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .try_init();
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {:?}", panic_info);

        // Restore the terminal before the default handler prints.
        if let Some(saved) = PANIC_RESTORE.get() {
            let _ = tcsetattr(std::io::stdin(), SetArg::TCSANOW, &Termios::from(*saved));
        }

        default_hook(panic_info);
    }));
}

/// Save the real terminal and switch it to raw mode.
///
/// Returns `None` when stdin is not a terminal.
fn enter_raw_mode() -> Result<Option<TerminalMode>> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        log::warn!("stdin is not a terminal, leaving terminal mode alone");
        return Ok(None);
    }
    let mut mode = match TerminalMode::save(stdin.as_fd()) {
        Ok(mode) => mode,
        Err(TerminalError::NotATerminal) => {
            log::warn!("stdin is not a terminal, leaving terminal mode alone");
            return Ok(None);
        }
        Err(e) => return Err(e).context("Failed to read terminal attributes"),
    };
    let _ = PANIC_RESTORE.set(libc::termios::from(mode.saved().clone()));
    mode.enter_raw().context("Failed to enter raw mode")?;
    Ok(Some(mode))
}

fn run(cli: Cli, config: Config) -> Result<u8> {
    let signals = SignalRelay::install().context("Failed to install signal handlers")?;

    let size = terminal::window_size();
    let session = match Session::launch(&cli.command, size) {
        Ok(session) => session,
        Err(e) => {
            log::error!("{e}");
            eprintln!("{e}");
            return Ok(EXIT_FAILURE);
        }
    };

    let terminal = enter_raw_mode()?;
    let mouse = MouseConnection::connect(&config);

    let mut mux = Multiplexer::new(session, mouse, signals);
    if let Some(terminal) = terminal {
        mux = mux.with_terminal(terminal);
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    let exit = mux.run(stdin.as_fd(), &mut stdout)?;
    Ok(exit.process_exit_code())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mousebridge: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    if cli.no_mouse {
        config.mouse_enabled = false;
    }

    let log_path = cli.log_file.clone().unwrap_or_else(|| config.log_path());
    init_logging(&log_path);
    install_panic_hook();
    log::info!("mousebridge {} starting: {:?}", env!("CARGO_PKG_VERSION"), cli.command);

    match run(cli, config) {
        Ok(code) => {
            log::info!("exiting with status {code}");
            ExitCode::from(code)
        }
        Err(e) => {
            log::error!("{e:#}");
            eprint!("mousebridge: {e:#}\r\n");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
