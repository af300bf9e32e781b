//! # Scalelink CLI
//!
//! Command-line interface for price-computing scales and the emulator.
//!
//! ## Usage
//!
//! ```bash
//! # Run the emulator on a TCP port with demo data
//! scalelink --channel tcp://127.0.0.1:4001 emulate --seed
//!
//! # Read live weight once, or keep watching
//! scalelink --channel tcp://127.0.0.1:4001 status --watch
//!
//! # Read a PLU as JSON, edit it, write it back
//! scalelink plu get 12 > plu.json
//! scalelink plu put plu.json
//!
//! # Upload a catalogue (JSON array of PLUs)
//! scalelink sync push catalogue.json
//! ```
//!
//! Records are printed and read as JSON. `-` reads from stdin.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scalelink::{
    ScaleClient, ScaleError,
    client::{StatusPoller, StatusUpdate},
    config::AppConfig,
    device,
    protocol::keys::KeyBinding,
    protocol::logo::{PrimaryLogo, SecondaryLogo},
    protocol::message::Message,
    protocol::plu::{Plu, UpdateBorders},
    protocol::settings::UserSettings,
    sync,
    transport,
};

/// Scalelink - price-computing scale utility
#[derive(Parser, Debug)]
#[command(name = "scalelink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial device or tcp://host:port
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Serial bit rate
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the scale on the channel
    Emulate {
        /// Persist records to this JSON file
        #[arg(long, value_name = "FILE")]
        store: Option<PathBuf>,

        /// Fill an empty store with demo PLUs and messages
        #[arg(long)]
        seed: bool,

        /// Serve a fixed zero reading instead of random weights
        #[arg(long)]
        fixed_status: bool,
    },

    /// Read live weighing status
    Status {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// PLU records
    #[command(subcommand)]
    Plu(PluCommand),

    /// Messages
    #[command(subcommand)]
    Message(MessageCommand),

    /// Read sales totals
    Totals {
        /// Reset the totals instead
        #[arg(long)]
        reset: bool,
    },

    /// Settings blocks
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Price keys
    #[command(subcommand)]
    Keys(KeysCommand),

    /// Logos
    #[command(subcommand)]
    Logo(LogoCommand),

    /// Restrict or release PLU updates
    #[command(subcommand)]
    Borders(BordersCommand),

    /// Set the scale clock
    Clock {
        /// Local time, "YYYY-MM-DD HH:MM:SS" (default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Bulk transfer
    #[command(subcommand)]
    Sync(SyncCommand),
}

#[derive(Subcommand, Debug)]
enum PluCommand {
    Get { id: u32 },
    /// Write a PLU from a JSON file
    Put { file: String },
    Delete { id: u32 },
    ResetTotals { id: u32 },
}

#[derive(Subcommand, Debug)]
enum MessageCommand {
    Get { id: u16 },
    /// Write a message from a JSON file
    Put { file: String },
    Delete { id: u16 },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Read user settings, or write them from a JSON file
    User {
        #[arg(long, value_name = "FILE")]
        set: Option<String>,
    },
    /// Read factory settings
    Factory,
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Every bound key
    List,
    Get { key: u8 },
    /// Bind a key (PLU 0 unbinds)
    Bind { key: u8, plu: u32 },
}

#[derive(Subcommand, Debug)]
enum LogoCommand {
    /// Save the primary logo bitmap
    Read {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Upload a raw bitmap (512 bytes primary, 384 bytes secondary)
    Write {
        file: PathBuf,
        /// Four-character certification code
        #[arg(long, default_value = "0000")]
        cert: String,
        #[arg(long)]
        secondary: bool,
    },
}

#[derive(Subcommand, Debug)]
enum BordersCommand {
    Set { start: u32, end: u32 },
    Clear,
}

#[derive(Subcommand, Debug)]
enum SyncCommand {
    /// Upload a JSON array of PLUs (or messages with --messages)
    Push {
        file: String,
        #[arg(long)]
        messages: bool,
    },
    /// Download the used PLUs in a range as JSON
    Pull {
        #[arg(long, default_value = "1")]
        from: u32,
        #[arg(long, default_value = "4000")]
        to: u32,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), ScaleError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(channel) = cli.channel {
        config.link.channel = channel;
    }
    if let Some(baud) = cli.baud {
        config.link.baud = baud;
    }
    config.link.validate()?;

    match cli.command {
        Commands::Emulate {
            store,
            seed,
            fixed_status,
        } => {
            if store.is_some() {
                config.device.store = store;
            }
            config.device.seed_demo |= seed;
            config.device.fixed_status |= fixed_status;
            emulate(&config)
        }
        Commands::Status { watch: true } => watch_status(&config),
        command => {
            let mut scale = ScaleClient::open(&config)?;
            scale.connect()?;
            let result = control(&mut scale, command);
            scale.close()?;
            result
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One-shot controller commands.
fn control(scale: &mut ScaleClient, command: Commands) -> Result<(), ScaleError> {
    match command {
        Commands::Status { .. } => print_json(&scale.read_status()?),
        Commands::Plu(cmd) => match cmd {
            PluCommand::Get { id } => print_json(&scale.read_plu(id)?),
            PluCommand::Put { file } => scale.write_plu(&read_json::<Plu>(&file)?),
            PluCommand::Delete { id } => scale.delete_plu(id),
            PluCommand::ResetTotals { id } => scale.reset_plu_totals(id),
        },
        Commands::Message(cmd) => match cmd {
            MessageCommand::Get { id } => print_json(&scale.read_message(id)?),
            MessageCommand::Put { file } => scale.write_message(&read_json::<Message>(&file)?),
            MessageCommand::Delete { id } => scale.delete_message(id),
        },
        Commands::Totals { reset: true } => scale.reset_sales_totals(),
        Commands::Totals { reset: false } => print_json(&scale.read_sales_totals()?),
        Commands::Settings(cmd) => match cmd {
            SettingsCommand::User { set: Some(file) } => {
                scale.write_user_settings(&read_json::<UserSettings>(&file)?)
            }
            SettingsCommand::User { set: None } => print_json(&scale.read_user_settings()?),
            SettingsCommand::Factory => print_json(&scale.read_factory_settings()?),
        },
        Commands::Keys(cmd) => match cmd {
            KeysCommand::List => print_json(&scale.price_keys()?),
            KeysCommand::Get { key } => {
                let plu = scale.read_price_key(key)?.unwrap_or(0);
                print_json(&KeyBinding { key, plu })
            }
            KeysCommand::Bind { key, plu } => scale.bind_price_key(key, plu),
        },
        Commands::Logo(cmd) => match cmd {
            LogoCommand::Read { out } => {
                let bitmap = scale.read_primary_logo()?;
                std::fs::write(&out, bitmap)?;
                println!("Saved to {}", out.display());
                Ok(())
            }
            LogoCommand::Write {
                file,
                cert,
                secondary,
            } => {
                let bitmap = read_file(&file)?;
                if secondary {
                    scale.write_secondary_logo(&SecondaryLogo::new(bitmap)?)
                } else {
                    scale.write_primary_logo(&PrimaryLogo::new(bitmap, &cert)?)
                }
            }
        },
        Commands::Borders(cmd) => match cmd {
            BordersCommand::Set { start, end } => {
                scale.set_update_borders(UpdateBorders::new(start, end)?)
            }
            BordersCommand::Clear => scale.clear_update_borders(),
        },
        Commands::Clock { at } => {
            let at = match at {
                Some(text) => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
                    .map_err(|e| ScaleError::InvalidValue(format!("bad time '{}': {}", text, e)))?,
                None => Local::now().naive_local(),
            };
            scale.set_clock(at)
        }
        Commands::Sync(cmd) => match cmd {
            SyncCommand::Push {
                file,
                messages: false,
            } => {
                let plus: Vec<Plu> = read_json(&file)?;
                print_json(&sync::upload_plus(scale, &plus)?)
            }
            SyncCommand::Push {
                file,
                messages: true,
            } => {
                let messages: Vec<Message> = read_json(&file)?;
                print_json(&sync::upload_messages(scale, &messages)?)
            }
            SyncCommand::Pull { from, to } => print_json(&sync::download_plus(scale, from..=to)?),
        },
        Commands::Emulate { .. } => Err(ScaleError::Config(
            "emulate runs the device side; it does not drive a scale".to_string(),
        )),
    }
}

/// Run the device engine until Ctrl-C. Over TCP, serve one controller after
/// another.
fn emulate(config: &AppConfig) -> Result<(), ScaleError> {
    let mut engine = device::from_config(&config.device)?;
    let stop = Arc::new(AtomicBool::new(false));

    let runtime = tokio::runtime::Runtime::new()?;
    let flag = stop.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let mut listener = transport::Listener::open(&config.link)?;
    while let Some(mut link) = listener.next_link(&stop)? {
        engine.run(link.as_mut(), &stop)?;
    }
    Ok(())
}

/// Poll live status on a background task and print each update.
fn watch_status(config: &AppConfig) -> Result<(), ScaleError> {
    let mut scale = ScaleClient::open(config)?;
    scale.connect()?;
    let shared = scale.into_shared();
    let interval = config.client.poll_interval();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (poller, mut updates) = StatusPoller::spawn(shared, interval);
        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);
        let result = loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(update) => {
                        if let Err(e) = print_update(&update) {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                },
                _ = &mut interrupted => break Ok(()),
            }
        };
        poller.stop().await;
        result
    })
}

fn print_update(update: &StatusUpdate) -> Result<(), ScaleError> {
    let line = serde_json::to_string(update)?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ScaleError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json<T: DeserializeOwned>(source: &str) -> Result<T, ScaleError> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        String::from_utf8_lossy(&read_file(Path::new(source))?).into_owned()
    };
    Ok(serde_json::from_str(&text)?)
}

fn read_file(path: &Path) -> Result<Vec<u8>, ScaleError> {
    std::fs::read(path)
        .map_err(|e| ScaleError::Config(format!("Failed to read {}: {}", path.display(), e)))
}
