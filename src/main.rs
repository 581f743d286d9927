//! gpsmux - GNSS receiver stream tool
//!
//! Decodes interleaved UBX frames and NMEA sentences from a file, stdin or a
//! live serial receiver, and builds/sends UBX command frames.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};

use gpsmux_core::cli::{
    exit_code_description, print_exit_codes, render_encoded, render_event, render_summary, CliResult, ExitCodes,
    OutputFormat,
};
use gpsmux_core::config::{config_path, AppConfig, ConfigError, LoggingConfig};
use gpsmux_core::core::protocol::nav::{CLASS_NAV, ID_TIMEUTC};
use gpsmux_core::{
    drain_events, list_ports, FrameEncoder, GnssChannel, ReceiverFamily, SerialChannel, Session, SessionError,
    SessionEvent, StreamDecoder, TransportError, TransportStats,
};

/// gpsmux CLI
#[derive(Parser, Debug)]
#[command(name = "gpsmux", version, about = "GNSS receiver UBX/NMEA stream decoder", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "GPSMUX_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Receiver family (ublox, allystar)
    #[arg(long, global = true)]
    family: Option<ReceiverFamily>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Decode a captured byte stream
    Decode {
        /// Capture file (stdin if omitted)
        input: Option<PathBuf>,

        /// Fail if any frame or sentence had a bad checksum
        #[arg(long)]
        strict: bool,
    },

    /// Decode a live receiver on a serial port or I2C bus
    Monitor {
        /// Serial port name (e.g., COM3, /dev/ttyACM0)
        #[arg(short, long, conflicts_with = "i2c")]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// I2C bus device (e.g., /dev/i2c-1) instead of a serial port
        #[arg(long)]
        i2c: Option<PathBuf>,

        /// Stop after this many seconds without a decoded frame or sentence (0 = never)
        #[arg(long)]
        watchdog: Option<u64>,

        /// Poll NAV-TIMEUTC every N seconds
        #[arg(long)]
        poll_time: Option<u64>,
    },

    /// Build a command frame and print it
    Encode {
        /// Message class (hex, e.g. 0x06)
        #[arg(value_parser = parse_byte)]
        class: u8,

        /// Message id (hex, e.g. 0x01)
        #[arg(value_parser = parse_byte)]
        id: u8,

        /// Payload as hex (spaces allowed)
        #[arg(default_value = "")]
        payload: String,
    },

    /// Build a command frame and write it to a receiver
    Send {
        /// Message class (hex, e.g. 0x06)
        #[arg(value_parser = parse_byte)]
        class: u8,

        /// Message id (hex, e.g. 0x01)
        #[arg(value_parser = parse_byte)]
        id: u8,

        /// Payload as hex (spaces allowed)
        #[arg(default_value = "")]
        payload: String,

        /// Serial port name
        #[arg(short, long, conflicts_with = "i2c")]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// I2C bus device instead of a serial port
        #[arg(long)]
        i2c: Option<PathBuf>,

        /// Print traffic received for this many milliseconds after sending
        #[arg(long, default_value = "0")]
        listen: u64,
    },

    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the exit code table
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Parse `0x06`, `06` or `6` as a hex byte
fn parse_byte(s: &str) -> Result<u8, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid hex byte '{}': {}", s, e))
}

fn parse_payload(s: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    hex::decode(digits).context("invalid payload hex")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => {
            init_logging(&cli, &config.logging);
            run(&cli, config).await.unwrap_or_else(|e| CliResult::from(&e))
        }
        Err(e) => CliResult::from(&e),
    };

    match &result {
        CliResult::Success(Some(msg)) if !cli.quiet => eprintln!("{}", msg),
        CliResult::Error(code, msg) => {
            eprintln!("error: {}", msg);
            tracing::debug!("exit code {} ({})", code, exit_code_description(*code));
        }
        _ => {}
    }
    result.to_exit_code()
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(family) = cli.family {
        config.receiver.family = family;
    }
    Ok(config)
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli, mut config: AppConfig) -> anyhow::Result<CliResult> {
    match &cli.command {
        Commands::ListPorts { detailed } => show_ports(cli, *detailed),
        Commands::Decode { input, strict } => decode(cli, &config, input.as_ref(), *strict),
        Commands::Monitor {
            port,
            baud,
            i2c,
            watchdog,
            poll_time,
        } => {
            apply_link_overrides(&mut config, port.as_deref(), *baud, i2c.as_deref());
            if let Some(secs) = watchdog {
                config.monitor.watchdog_secs = *secs;
            }
            monitor(cli, config, poll_time.map(Duration::from_secs)).await
        }
        Commands::Encode { class, id, payload } => {
            let frame = FrameEncoder::new(config.receiver.family.sync()).encode(*class, *id, &parse_payload(payload)?)?;
            println!("{}", render_encoded(&frame, cli.format));
            Ok(CliResult::success())
        }
        Commands::Send {
            class,
            id,
            payload,
            port,
            baud,
            i2c,
            listen,
        } => {
            apply_link_overrides(&mut config, port.as_deref(), *baud, i2c.as_deref());
            send(cli, &config, *class, *id, &parse_payload(payload)?, Duration::from_millis(*listen))
        }
        Commands::Config { action } => config_command(cli, &config, action),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

/// `--port` selects the serial link even when the config names an I2C bus
fn apply_link_overrides(config: &mut AppConfig, port: Option<&str>, baud: Option<u32>, i2c: Option<&Path>) {
    if let Some(port) = port {
        config.serial.port = port.to_string();
        config.receiver.i2c_bus = None;
    }
    if let Some(baud) = baud {
        config.serial.baud_rate = baud;
    }
    if let Some(bus) = i2c {
        config.receiver.i2c_bus = Some(bus.to_path_buf());
    }
}

type BoxedChannel = Box<dyn GnssChannel + Send>;

/// Open the configured link; `cancel` aborts its retries
fn open_channel(config: &AppConfig, cancel: Option<Arc<AtomicBool>>) -> anyhow::Result<BoxedChannel> {
    match &config.receiver.i2c_bus {
        Some(bus) => open_i2c(config, bus, cancel),
        None => {
            let mut channel = SerialChannel::open(config.serial.clone())?.with_retry(config.retry.clone());
            if let Some(flag) = cancel {
                channel = channel.with_cancel(flag);
            }
            Ok(Box::new(channel))
        }
    }
}

#[cfg(target_os = "linux")]
fn open_i2c(config: &AppConfig, bus: &Path, cancel: Option<Arc<AtomicBool>>) -> anyhow::Result<BoxedChannel> {
    let mut channel = gpsmux_core::I2cChannel::<linux_embedded_hal::I2cdev>::open(bus)?
        .with_address(config.receiver.i2c_address)
        .with_retry(config.retry.clone());
    if let Some(flag) = cancel {
        channel = channel.with_cancel(flag);
    }
    Ok(Box::new(channel))
}

#[cfg(not(target_os = "linux"))]
fn open_i2c(_config: &AppConfig, bus: &Path, _cancel: Option<Arc<AtomicBool>>) -> anyhow::Result<BoxedChannel> {
    Err(TransportError::ConnectionFailed(format!("{}: I2C buses are only supported on Linux", bus.display())).into())
}

fn show_ports(cli: &Cli, detailed: bool) -> anyhow::Result<CliResult> {
    let ports = list_ports()?;

    if ports.is_empty() {
        return Ok(if cli.quiet {
            CliResult::success()
        } else {
            CliResult::success_with_message("No serial ports found.")
        });
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text if detailed => {
            println!("Available Serial Ports:");
            println!("{:-<60}", "");
            for port in &ports {
                println!("  {} [{:?}]", port.port_name, port.port_type);
            }
        }
        OutputFormat::Text => {
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
    }

    Ok(CliResult::success())
}

fn decode(cli: &Cli, config: &AppConfig, input: Option<&PathBuf>, strict: bool) -> anyhow::Result<CliResult> {
    let mut reader: Box<dyn Read> = match input {
        Some(path) => Box::new(
            std::fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let mut decoder = StreamDecoder::with_config(config.decoder_config());
    let mut buf = vec![0u8; config.decoder.read_chunk.max(1)];
    let mut out = io::stdout().lock();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        decoder.feed(&buf[..n]);
        for event in drain_events(&mut decoder) {
            writeln!(out, "{}", render_event(&event, cli.format))?;
        }
    }
    out.flush()?;

    let stats = decoder.stats();
    if !cli.quiet {
        eprintln!("{}", render_summary(&stats, None, cli.format));
    }

    let bad = stats.frame_checksum_errors + stats.sentence_checksum_errors;
    if strict && bad > 0 {
        return Ok(CliResult::error(
            ExitCodes::VALIDATION_FAILED,
            format!("{} checksum errors", bad),
        ));
    }
    Ok(CliResult::success())
}

async fn monitor(cli: &Cli, config: AppConfig, poll_every: Option<Duration>) -> anyhow::Result<CliResult> {
    let stop = Arc::new(AtomicBool::new(false));
    let channel = open_channel(&config, Some(Arc::clone(&stop)))?;
    let link = channel.connection_info();
    let decoder = StreamDecoder::with_config(config.decoder_config());
    let mut session = Session::new(channel, decoder).with_read_chunk(config.decoder.read_chunk);
    let shared = session.decoder();

    if !cli.quiet {
        eprintln!("Monitoring {}. Press Ctrl+C to stop.", link);
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SessionEvent>();
    let idle = Duration::from_millis(config.monitor.idle_poll_ms);

    let pump_stop = Arc::clone(&stop);
    let pump = tokio::task::spawn_blocking(move || -> Result<TransportStats, SessionError> {
        match pump_until_stopped(&mut session, &pump_stop, &tx, idle, poll_every) {
            Ok(()) | Err(SessionError::Transport(TransportError::Cancelled(_))) => Ok(session.transport_stats()),
            Err(e) => Err(e),
        }
    });

    let watchdog = (config.monitor.watchdog_secs > 0).then(|| Duration::from_secs(config.monitor.watchdog_secs));
    let mut result = CliResult::success();

    loop {
        let silence = async {
            match watchdog {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => println!("{}", render_event(&event, cli.format)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            _ = silence => {
                tracing::warn!("Nothing decoded for {}s", config.monitor.watchdog_secs);
                result = CliResult::timeout(format!(
                    "no frame or sentence decoded for {}s",
                    config.monitor.watchdog_secs
                ));
                break;
            }
        }
    }

    // also ends a retry loop the worker may be stuck in
    stop.store(true, Ordering::Relaxed);
    drop(rx);
    let transport = pump.await.context("pump task failed")??;

    if !cli.quiet {
        let stats = shared.lock().stats();
        eprintln!("{}", render_summary(&stats, Some(&transport), cli.format));
    }
    Ok(result)
}

/// Blocking poll loop run on a worker thread until `stop` is set or the
/// receiving side goes away
fn pump_until_stopped<C: GnssChannel>(
    session: &mut Session<C>,
    stop: &AtomicBool,
    tx: &tokio::sync::mpsc::UnboundedSender<SessionEvent>,
    idle: Duration,
    poll_every: Option<Duration>,
) -> Result<(), SessionError> {
    let mut last_poll: Option<Instant> = None;
    while !stop.load(Ordering::Relaxed) {
        if let Some(every) = poll_every {
            if last_poll.map_or(true, |t| t.elapsed() >= every) {
                session.send_command(CLASS_NAV, ID_TIMEUTC, &[])?;
                last_poll = Some(Instant::now());
            }
        }

        let fed = session.pump()?;
        for event in session.drain() {
            if tx.send(event).is_err() {
                return Ok(());
            }
        }
        if fed == 0 {
            std::thread::sleep(idle);
        }
    }
    Ok(())
}

fn send(
    cli: &Cli,
    config: &AppConfig,
    class: u8,
    id: u8,
    payload: &[u8],
    listen: Duration,
) -> anyhow::Result<CliResult> {
    let channel = open_channel(config, None)?;
    let decoder = StreamDecoder::with_config(config.decoder_config());
    let mut session = Session::new(channel, decoder).with_read_chunk(config.decoder.read_chunk);

    session.send_command(class, id, payload)?;

    let deadline = Instant::now() + listen;
    let idle = Duration::from_millis(config.monitor.idle_poll_ms);
    while Instant::now() < deadline {
        if session.pump()? == 0 {
            std::thread::sleep(idle);
        }
        for event in session.drain() {
            println!("{}", render_event(&event, cli.format));
        }
    }

    Ok(CliResult::success())
}

fn config_command(cli: &Cli, config: &AppConfig, action: &ConfigAction) -> anyhow::Result<CliResult> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config_path().ok_or(ConfigError::NoConfigDir)?,
    };

    match action {
        ConfigAction::Show => {
            match cli.format {
                OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            }
            Ok(CliResult::success())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(CliResult::success())
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Ok(CliResult::error(
                    ExitCodes::CONFIG_ERROR,
                    format!("{} already exists (use --force)", path.display()),
                ));
            }
            AppConfig::default().save_to(&path)?;
            Ok(CliResult::success_with_message(format!("Wrote {}", path.display())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("0x06"), Ok(0x06));
        assert_eq!(parse_byte("21"), Ok(0x21));
        assert_eq!(parse_byte("ff"), Ok(0xFF));
        assert!(parse_byte("0x100").is_err());
        assert!(parse_byte("zz").is_err());
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload("01 02:0a").unwrap(), vec![0x01, 0x02, 0x0A]);
        assert!(parse_payload("").unwrap().is_empty());
        assert!(parse_payload("abc").is_err());
    }

    #[test]
    fn test_i2c_link_selection() {
        let cli = Cli::try_parse_from(["gpsmux", "monitor", "--i2c", "/dev/i2c-1", "--watchdog", "0"]).unwrap();
        let Commands::Monitor { port, baud, i2c, .. } = cli.command else {
            panic!("expected monitor");
        };
        let mut config = AppConfig::default();
        config.receiver.i2c_address = 0x43;
        apply_link_overrides(&mut config, port.as_deref(), baud, i2c.as_deref());
        assert_eq!(config.receiver.i2c_bus, Some(PathBuf::from("/dev/i2c-1")));
        assert_eq!(config.receiver.i2c_address, 0x43);

        // an explicit serial port wins over a bus from the config file
        apply_link_overrides(&mut config, Some("/dev/ttyUSB0"), Some(9600), None);
        assert_eq!(config.receiver.i2c_bus, None);
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 9600);

        assert!(Cli::try_parse_from(["gpsmux", "send", "06", "01", "--i2c", "/dev/i2c-1", "--port", "COM3"]).is_err());
    }

    #[test]
    fn test_missing_i2c_bus_is_port_not_found() {
        let mut config = AppConfig::default();
        config.receiver.i2c_bus = Some(PathBuf::from("/dev/i2c-does-not-exist"));
        let err = open_channel(&config, None).err().expect("bus should not open");
        let expected = if cfg!(target_os = "linux") {
            ExitCodes::PORT_NOT_FOUND
        } else {
            ExitCodes::CONNECTION_FAILED
        };
        assert_eq!(CliResult::from(&err).code(), expected);
    }

    #[test]
    fn test_encode_args() {
        let cli = Cli::try_parse_from(["gpsmux", "encode", "0x06", "0x01", "F0 05 01"]).unwrap();
        match cli.command {
            Commands::Encode { class, id, payload } => {
                assert_eq!((class, id), (0x06, 0x01));
                assert_eq!(payload, "F0 05 01");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
