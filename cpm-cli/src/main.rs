//! Z80 CP/M CLI - boot a CP/M 2.2 machine in the terminal.
//!
//! Usage:
//!   z80cpm [options] [program.com [args...]]
//!
//! Examples:
//!   z80cpm --root ./disks                # Boot the CCP from ./disks
//!   z80cpm --root ./disks --ccp zcpr3    # Boot a different CCP image
//!   z80cpm hello.com                     # Run hello.com directly (no CCP)
//!   z80cpm --trace stat.com '*.*'        # Trace every instruction to stderr

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing_subscriber::EnvFilter;

use z80cpm_core::{
    CcpVariant, CpmConsole, DirHost, HaltPolicy, Machine, MachineConfig, RunState, Tracer,
};

/// Z80 CP/M 2.2 emulator
#[derive(Parser, Debug)]
#[command(name = "z80cpm")]
#[command(about = "Run a CP/M 2.2 machine over host directories")]
struct Args {
    /// JSON machine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the drive folders (A/, B/, ...) and CCP images
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Command interpreter: dr, ccpz, zcpr2, zcpr3 or z80
    #[arg(long)]
    ccp: Option<CcpVariant>,

    /// RAM size in KiB (16-64)
    #[arg(long)]
    ram: Option<u8>,

    /// What to do when the CPU halts: reboot or exit
    #[arg(long)]
    halt: Option<HaltPolicy>,

    /// Show unimplemented BIOS/BDOS calls on the console
    #[arg(short, long)]
    debug: bool,

    /// Log every instruction and system call to stderr
    #[arg(short, long)]
    trace: bool,

    /// Keep all files in the drive folder instead of per-user folders
    #[arg(long)]
    no_user_areas: bool,

    /// .COM program to run directly instead of booting the CCP
    program: Option<PathBuf>,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Args {
    /// File configuration (or defaults) with command-line overrides.
    fn machine_config(&self) -> Result<MachineConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => MachineConfig::from_json_file(path)?,
            None => MachineConfig::default(),
        };
        if let Some(ccp) = self.ccp {
            config.ccp = ccp;
        }
        if let Some(ram) = self.ram {
            config.ram_kib = ram;
        }
        if let Some(halt) = self.halt {
            config.halt_policy = halt;
        }
        if self.debug {
            config.debug = true;
        }
        if self.no_user_areas {
            config.user_areas = false;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Channel-based console fed by the terminal input task.
struct ChannelConsole {
    /// Receiver for keyboard input
    key_rx: mpsc::Receiver<u8>,
    /// Keys pulled off the channel by a status check
    key_buffer: RefCell<VecDeque<u8>>,
}

impl ChannelConsole {
    fn new(key_rx: mpsc::Receiver<u8>) -> Self {
        Self {
            key_rx,
            key_buffer: RefCell::new(VecDeque::new()),
        }
    }
}

impl CpmConsole for ChannelConsole {
    fn write(&mut self, ch: u8) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = handle.write_all(&[ch]);
        let _ = handle.flush();
    }

    fn has_key(&self) -> bool {
        let mut buffer = self.key_buffer.borrow_mut();
        if buffer.is_empty() {
            if let Ok(ch) = self.key_rx.try_recv() {
                buffer.push_back(ch);
            }
        }
        !buffer.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        // First check buffer
        if let Some(ch) = self.key_buffer.get_mut().pop_front() {
            return Some(ch);
        }

        // Try non-blocking receive
        self.key_rx.try_recv().ok()
    }

    fn wait_for_key(&mut self) -> u8 {
        if let Some(ch) = self.key_buffer.get_mut().pop_front() {
            return ch;
        }

        // Blocking receive; a closed channel reads as ^C
        self.key_rx.recv().unwrap_or(0x03)
    }
}

/// Translate crossterm key events to CP/M key codes.
fn translate_key(code: KeyCode, modifiers: KeyModifiers) -> Option<u8> {
    // Handle control characters
    if modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = code {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                return Some(upper as u8 - 64); // Ctrl+A=1, Ctrl+C=3, etc.
            }
        }
    }

    match code {
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        KeyCode::Enter => Some(13),
        KeyCode::Backspace => Some(8),
        KeyCode::Tab => Some(9),
        KeyCode::Esc => Some(27),
        KeyCode::Delete => Some(127),
        // WordStar cursor diamond
        KeyCode::Up => Some(5),
        KeyCode::Down => Some(24),
        KeyCode::Left => Some(19),
        KeyCode::Right => Some(4),
        _ => None,
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--trace`.
fn init_logging(trace: bool) {
    let default = if trace { "warn,z80cpm_core=trace" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.trace);

    let config = args.machine_config()?;
    let program = match &args.program {
        Some(path) => match std::fs::read(path) {
            Ok(data) => Some(data),
            Err(e) => {
                eprintln!("Failed to read {}: {}", path.display(), e);
                return Err(e.into());
            }
        },
        None => None,
    };
    tracing::info!(root = %args.root.display(), ccp = %config.ccp, "starting");

    // Create channel for keyboard input
    let (key_tx, key_rx) = mpsc::channel::<u8>();

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = tokio_mpsc::channel::<()>(1);

    let console = ChannelConsole::new(key_rx);
    let host = DirHost::new(&args.root);
    let mut machine = Machine::new(console, host, config)?;
    if args.trace {
        machine.set_observer(Box::new(Tracer::new()));
    }

    // Enable raw mode (gracefully handle non-TTY)
    let raw_mode_enabled = enable_raw_mode().is_ok();

    let program_args = args.args.clone();

    // Spawn machine in blocking task
    let machine_handle = tokio::task::spawn_blocking(move || match program {
        Some(image) => {
            let argv: Vec<&str> = program_args.iter().map(String::as_str).collect();
            match machine.run_program(&image, &argv) {
                RunState::Halted => Err(z80cpm_core::CpmError::Halted {
                    pc: machine.cpu().regs().pc(),
                }),
                _ => Ok(()),
            }
        }
        None => machine.boot(),
    });

    // Spawn terminal input reader
    let input_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(10)) => {
                    // Poll for terminal events
                    while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind == KeyEventKind::Release {
                            continue;
                        }
                        if let Some(ch) = translate_key(key_event.code, key_event.modifiers) {
                            if key_tx.send(ch).is_err() {
                                return; // Channel closed
                            }
                        }
                    }
                }
            }
        }
    });

    // Wait for machine to finish
    let result = machine_handle.await?;

    // Signal input handler to stop
    let _ = shutdown_tx.send(()).await;
    let _ = input_handle.await;

    // Disable raw mode if we enabled it
    if raw_mode_enabled {
        let _ = disable_raw_mode();
    }

    if let Err(e) = result {
        eprintln!("\r\nError: {}", e);
        return Err(e.into());
    }

    Ok(())
}
