use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use lockin_core::session::{CommandSession, SessionConfig, TransportConfig};
use lockin_core::terminal::{run_terminal, write_reply};
use lockin_core::{LockinModel, SessionObserver};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Lock-in amplifier command terminal", long_about = None)]
struct Args {
    /// Load connection settings from a TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the resolved settings to a TOML file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Command to send before terminal mode (repeatable), e.g. -c VER
    #[arg(short = 'c', long = "command")]
    commands: Vec<String>,

    /// Per-command timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Exit after the startup commands instead of entering terminal mode
    #[arg(long)]
    no_terminal: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    transport: Option<TransportCommand>,
}

#[derive(Subcommand, Debug)]
enum TransportCommand {
    /// Raw bulk USB (models 7270, 7230, 7124)
    Usb {
        #[arg(long)]
        model: String,
        #[arg(long)]
        serial: String,
    },
    /// Raw TCP socket on port 50001
    Ethernet {
        #[arg(long)]
        address: String,
    },
    /// GPIB bus address (needs the `visa` feature)
    Gpib {
        #[arg(long)]
        address: String,
    },
    /// RS232, 7 data bits, even parity
    Serial {
        #[arg(long)]
        port: String,
        #[arg(long, default_value_t = 19200)]
        baud: u32,
    },
}

impl TransportCommand {
    fn into_config(self) -> Result<TransportConfig> {
        Ok(match self {
            TransportCommand::Usb { model, serial } => TransportConfig::Usb {
                model: model.parse::<LockinModel>()?,
                serial_number: serial,
            },
            TransportCommand::Ethernet { address } => TransportConfig::Ethernet { address },
            TransportCommand::Gpib { address } => TransportConfig::Gpib { address },
            TransportCommand::Serial { port, baud } => TransportConfig::Serial {
                port,
                baud_rate: baud,
            },
        })
    }
}

fn build_config(args: &mut Args) -> Result<SessionConfig> {
    let mut config = match (args.config.as_ref(), args.transport.take()) {
        (Some(path), None) => SessionConfig::load_from_file(path)?,
        (None, Some(transport)) => SessionConfig::new(transport.into_config()?),
        (Some(_), Some(_)) => bail!("Use either --config or a transport subcommand, not both"),
        (None, None) => bail!("No connection given: pass --config or a transport subcommand"),
    };

    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.startup_commands.append(&mut args.commands);
    Ok(config)
}

fn drive<O: SessionObserver>(
    session: &mut CommandSession<O>,
    config: &SessionConfig,
    terminal: bool,
) -> Result<()> {
    let stdout = io::stdout();

    for command in &config.startup_commands {
        let mut out = stdout.lock();
        match session.send(command) {
            Ok(reply) => write_reply(&mut out, &reply)?,
            Err(e) => writeln!(out, "Error: {e}\n")?,
        }
    }

    if terminal {
        info!("Entering terminal mode (type STOP to exit)");
        let summary = run_terminal(session, io::stdin().lock(), stdout.lock())?;
        info!(
            commands = summary.commands_sent,
            failures = summary.failures,
            "Terminal mode finished"
        );
    }
    Ok(())
}

fn run(mut args: Args) -> Result<()> {
    let config = build_config(&mut args)?;

    if let Some(path) = &args.save_config {
        config.save_to_file(path)?;
        info!(path = %path.display(), "Saved configuration");
    }

    let mut session = CommandSession::open(&config)?;
    let result = drive(&mut session, &config, !args.no_terminal);

    // Close even when the exchange failed; a close error never hides that one.
    if let Err(e) = session.close() {
        warn!(error = %e, "Close failed");
    }
    result
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting lock-in terminal...");

    if let Err(e) = run(args) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}
