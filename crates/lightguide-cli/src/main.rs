//! `lightguide`: drive a LightGuide panel from the command line.
//!
//! ```text
//! lightguide ports
//! lightguide --port /dev/ttyUSB0 brightness 80
//! lightguide --port COM3 --ack mask --cells A01,H12 --color 255,0,0
//! lightguide --simulate cell B07 buffer --color 0,255,0 --blank
//! lightguide --port /dev/ttyUSB0 shell < steps.txt
//! ```

mod script;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use lightguide_protocol::{Cell, Command, ProtocolError, Rgb};
use lightguide_serial::{
    list_ports, AckMode, LightGuideConfig, LightPanel, SerialError, SimulatedDevice,
};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::script::ShellCommand;

#[derive(Parser)]
#[command(name = "lightguide")]
#[command(version)]
#[command(about = "Control a LightGuide 96-cell panel over a serial port")]
struct Cli {
    /// Serial port the panel is attached to
    #[arg(long, global = true, conflicts_with = "simulate")]
    port: Option<String>,

    /// Use an in-memory panel and print the frames it receives
    #[arg(long, global = true)]
    simulate: bool,

    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Wait for <ACK> after every frame
    #[arg(long, global = true)]
    ack: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// List serial ports on this machine
    Ports,

    /// Set global brightness (clamped to 0-255)
    Brightness {
        #[arg(allow_negative_numbers = true)]
        level: i64,
    },

    /// Light a set of cells with one colour
    Mask(MaskArgs),

    /// Light one cell and show a note for it
    Cell {
        /// Well name, e.g. A01 or h12
        well: Cell,
        /// Text shown for the cell
        note: String,
        /// Colour as R,G,B
        #[arg(long)]
        color: Rgb,
        /// Send a blank-panel frame first
        #[arg(long)]
        blank: bool,
    },

    /// Turn the panel off
    Off,

    /// Clear every cell
    Blank,

    /// Read commands from stdin, one per line
    Shell,
}

#[derive(Args)]
struct MaskArgs {
    /// Wells, e.g. A01,H12
    #[arg(long, value_delimiter = ',')]
    cells: Vec<Cell>,
    /// Whole rows, e.g. A,C
    #[arg(long, value_delimiter = ',')]
    rows: Vec<String>,
    /// Whole columns, e.g. 1,12
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,
    /// Raw 24-digit hex mask
    #[arg(long)]
    hex: Option<String>,
    /// Colour as R,G,B
    #[arg(long)]
    color: Rgb,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Serial(#[from] SerialError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("{0}")]
    Usage(&'static str),
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    lightguide_metrics::describe_metrics();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Action::Ports = cli.command {
        let ports = list_ports()?;
        if ports.is_empty() {
            info!("no serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => LightGuideConfig::load(path)?,
        None => LightGuideConfig::default(),
    };
    if cli.ack {
        config.sender.wait_for_ack = true;
    }

    let mut panel = LightPanel::new(config);
    let device = open_panel(&mut panel, &cli)?;
    let is_shell = matches!(cli.command, Action::Shell);

    let result = match cli.command {
        Action::Ports => Ok(()),
        Action::Brightness { level } => panel.set_brightness(level).map_err(CliError::from),
        Action::Mask(args) => send_mask(&panel, &args),
        Action::Cell {
            well,
            note,
            color,
            blank,
        } => send_cell(&panel, well, &note, color, blank),
        Action::Off => panel.panel_off().map_err(CliError::from),
        Action::Blank => panel.blank().map_err(CliError::from),
        Action::Shell => run_shell(&panel),
    };

    if is_shell {
        panel.shutdown();
    } else {
        panel.stop();
    }

    if let Some(device) = device {
        for frame in device.frames() {
            println!("{}", frame);
        }
    }
    result
}

/// Connect to the configured port, or attach a simulated panel.
fn open_panel(panel: &mut LightPanel, cli: &Cli) -> Result<Option<SimulatedDevice>, CliError> {
    if cli.simulate {
        let mode = if panel.config().sender.wait_for_ack {
            AckMode::AckEveryFrame
        } else {
            AckMode::Silent
        };
        let device = SimulatedDevice::new(mode);
        panel.attach(Box::new(device.link("simulated")))?;
        return Ok(Some(device));
    }

    let port = cli
        .port
        .as_deref()
        .ok_or(CliError::Usage("either --port or --simulate is required"))?;
    panel.try_connect(port)?;
    Ok(None)
}

fn send_mask(panel: &LightPanel, args: &MaskArgs) -> Result<(), CliError> {
    let mask = script::build_mask(&args.cells, &args.rows, &args.columns, args.hex.as_deref())?;
    if mask.is_empty() {
        warn!("mask selects no cells");
    }
    panel.light_cells(mask, args.color)?;
    Ok(())
}

fn send_cell(
    panel: &LightPanel,
    well: Cell,
    note: &str,
    color: Rgb,
    blank: bool,
) -> Result<(), CliError> {
    if blank {
        panel.show_cell(well, note, color)?;
    } else {
        panel.send(&Command::single_cell(well, note, color)?)?;
    }
    Ok(())
}

/// Queue commands from stdin until `quit`, end of input or Ctrl-C.
fn run_shell(panel: &LightPanel) -> Result<(), CliError> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    // Stdin blocks, so it is read on its own thread and the loop below can
    // notice Ctrl-C between lines.
    let (line_tx, line_rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("lightguide-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    let mut line_number = 0usize;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            info!("interrupted");
            return Ok(());
        }

        let line = match line_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };
        line_number += 1;

        match script::parse_line(&line) {
            Ok(ShellCommand::Empty) => {}
            Ok(ShellCommand::Quit) => return Ok(()),
            Ok(ShellCommand::Send(commands)) => {
                for command in &commands {
                    panel.send(command)?;
                }
            }
            Err(e) => warn!(line = line_number, error = %e, "skipping line"),
        }
    }
}
