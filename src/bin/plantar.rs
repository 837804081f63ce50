//! Plantar CLI - Command-line interface for Plantar Flux
//!
//! Commands:
//! - serve: Receive telemetry over TCP and render pressure maps
//! - node: Run the sensor node loop and stream telemetry
//! - decode: Decode one telemetry message
//! - reconstruct: Decode and render one telemetry message
//! - doctor: Diagnose configuration and environment

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Read, Stdout};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

use plantar_flux::config::{NodeConfig, ReceiverConfig};
use plantar_flux::framing::Framing;
use plantar_flux::layout::FootLayout;
use plantar_flux::motion::MotionSource;
use plantar_flux::node::SensorNode;
use plantar_flux::pipeline::FrameProcessor;
use plantar_flux::pressure::PressureSource;
use plantar_flux::receiver::serve_connection;
use plantar_flux::render::{AsciiRenderer, JsonLinesRenderer, Renderer};
use plantar_flux::simulate::{SimulatedAccelerometer, SimulatedPressurePad, DEFAULT_STRIDE_TICKS};
use plantar_flux::types::{DecodeReport, RenderFrame};
use plantar_flux::{telemetry, PlantarError, PLANTAR_VERSION, PRODUCER_NAME};

/// Plantar - Foot-pressure telemetry from sensor node to pressure map
#[derive(Parser)]
#[command(name = "plantar")]
#[command(author = "Synheart AI Inc")]
#[command(version = PLANTAR_VERSION)]
#[command(about = "Stream foot-sensor telemetry and render pressure maps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive telemetry over TCP and render each message
    Serve(ServeArgs),

    /// Run the sensor node loop and stream telemetry to a receiver
    Node(NodeArgs),

    /// Decode one telemetry message
    Decode {
        /// Message text (reads stdin when omitted)
        text: Option<String>,

        /// Output the decode report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode, reconstruct and render one telemetry message
    Reconstruct {
        /// Message text (reads stdin when omitted)
        text: Option<String>,

        /// Receiver configuration file (layout, outline, smoothing)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Smoothing sigma in grid units
        #[arg(long)]
        sigma: Option<f64>,

        /// Output format
        #[arg(long, default_value = "ascii")]
        format: RenderFormat,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Node configuration file to check
        #[arg(long)]
        node_config: Option<PathBuf>,

        /// Receiver configuration file to check
        #[arg(long)]
        receiver_config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Receiver configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<String>,

    /// Message framing on the stream
    #[arg(long)]
    framing: Option<FramingArg>,

    /// Smoothing sigma in grid units
    #[arg(long)]
    sigma: Option<f64>,

    /// Output format
    #[arg(long, default_value = "ascii")]
    format: RenderFormat,

    /// Accept the next node after a disconnect
    #[arg(long)]
    persist: bool,
}

#[derive(Args)]
struct NodeArgs {
    /// Node configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Receiver address
    #[arg(long)]
    server: Option<String>,

    /// Delay between ticks in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Step threshold in g
    #[arg(long)]
    threshold: Option<f64>,

    /// Message framing on the stream
    #[arg(long)]
    framing: Option<FramingArg>,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Reconnect with backoff after the link fails
    #[arg(long)]
    reconnect: bool,

    /// Samples per simulated stride
    #[arg(long, default_value_t = DEFAULT_STRIDE_TICKS)]
    stride_ticks: u32,

    /// Use the real accelerometer and converter instead of simulated sensors
    #[cfg(feature = "hardware")]
    #[arg(long)]
    hardware: bool,

    /// I2C bus of the accelerometer
    #[cfg(feature = "hardware")]
    #[arg(long, default_value = "/dev/i2c-1")]
    i2c_bus: PathBuf,

    /// SPI device of the pressure converter
    #[cfg(feature = "hardware")]
    #[arg(long, default_value = "/dev/spidev0.0")]
    spi_device: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum FramingArg {
    /// Newline-terminated messages
    Newline,
    /// One message per read (no terminator)
    Unframed,
}

impl From<FramingArg> for Framing {
    fn from(arg: FramingArg) -> Self {
        match arg {
            FramingArg::Newline => Framing::Newline,
            FramingArg::Unframed => Framing::Unframed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RenderFormat {
    /// Text heat map
    Ascii,
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// Pretty-printed JSON
    JsonPretty,
}

/// Stdout renderer chosen at runtime
enum StdoutRenderer {
    Ascii(AsciiRenderer<Stdout>),
    Json(JsonLinesRenderer<Stdout>),
}

impl StdoutRenderer {
    fn new(format: RenderFormat) -> Self {
        match format {
            RenderFormat::Ascii => StdoutRenderer::Ascii(AsciiRenderer::new(io::stdout())),
            RenderFormat::Ndjson => StdoutRenderer::Json(JsonLinesRenderer::ndjson(io::stdout())),
            RenderFormat::JsonPretty => StdoutRenderer::Json(JsonLinesRenderer::pretty(io::stdout())),
        }
    }
}

impl Renderer for StdoutRenderer {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), PlantarError> {
        match self {
            StdoutRenderer::Ascii(r) => r.render(frame),
            StdoutRenderer::Json(r) => r.render(frame),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    match cli.command {
        Commands::Serve(args) => cmd_serve(&args),
        Commands::Node(args) => cmd_node(&args),
        Commands::Decode { text, json } => cmd_decode(text, json),
        Commands::Reconstruct {
            text,
            config,
            sigma,
            format,
        } => cmd_reconstruct(text, config.as_deref(), sigma, format),
        Commands::Doctor {
            node_config,
            receiver_config,
            json,
        } => cmd_doctor(node_config.as_deref(), receiver_config.as_deref(), json),
    }
}

fn load_receiver_config(path: Option<&Path>) -> Result<ReceiverConfig, CliFailure> {
    match path {
        Some(path) => ReceiverConfig::load(path).map_err(CliFailure::Config),
        None => Ok(ReceiverConfig::default()),
    }
}

fn load_node_config(path: Option<&Path>) -> Result<NodeConfig, CliFailure> {
    match path {
        Some(path) => NodeConfig::load(path).map_err(CliFailure::Config),
        None => Ok(NodeConfig::default()),
    }
}

fn cmd_serve(args: &ServeArgs) -> Result<(), CliFailure> {
    let mut config = load_receiver_config(args.config.as_deref())?;
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.clone();
    }
    if let Some(framing) = args.framing {
        config.framing = framing.into();
    }
    if let Some(sigma) = args.sigma {
        config.reconstruction.sigma = sigma;
    }
    config.validate().map_err(CliFailure::Config)?;
    if config.framing == Framing::Unframed {
        warn!("unframed mode assumes one read per message; coalesced or split writes will garble frames");
    }

    let listener = TcpListener::bind(&config.bind_addr)?;
    info!(addr = %config.bind_addr, "listening");

    let mut renderer = StdoutRenderer::new(args.format);
    loop {
        match serve_connection(&listener, &config, &mut renderer) {
            Ok(summary) => {
                if !args.persist {
                    info!(frames = summary.frames_rendered, "receiver finished");
                    return Ok(());
                }
            }
            Err(e @ PlantarError::Transport { .. }) if args.persist => {
                warn!("connection lost: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn cmd_node(args: &NodeArgs) -> Result<(), CliFailure> {
    let mut config = load_node_config(args.config.as_deref())?;
    if let Some(server) = &args.server {
        config.server_addr = server.clone();
    }
    if let Some(interval_ms) = args.interval_ms {
        config.interval_ms = interval_ms;
    }
    if let Some(threshold) = args.threshold {
        config.step_threshold_g = threshold;
    }
    if let Some(framing) = args.framing {
        config.framing = framing.into();
    }
    if args.reconnect {
        config.reconnect.enabled = true;
    }
    config.validate().map_err(CliFailure::Config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliFailure::Signal(e.to_string()))?;

    #[cfg(feature = "hardware")]
    {
        if args.hardware {
            let (motion, pressure) = hardware::open(&args.i2c_bus, &args.spi_device)?;
            return drive_node(motion, pressure, &config, &shutdown, args.max_ticks);
        }
    }

    let motion = SimulatedAccelerometer::new(args.stride_ticks);
    let pressure = SimulatedPressurePad::new(FootLayout::default(), args.stride_ticks);
    drive_node(motion, pressure, &config, &shutdown, args.max_ticks)
}

fn connect(addr: &str) -> Result<TcpStream, PlantarError> {
    let stream = TcpStream::connect(addr).map_err(PlantarError::transport)?;
    info!(server = addr, "connected");
    Ok(stream)
}

/// Reconnect under the configured policy; `None` once attempts are exhausted
fn reconnect(config: &NodeConfig, shutdown: &AtomicBool) -> Option<TcpStream> {
    let policy = &config.reconnect;
    for attempt in 0..policy.max_attempts {
        let delay = policy.backoff(attempt);
        info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "reconnecting");
        thread::sleep(delay);
        if shutdown.load(Ordering::SeqCst) {
            return None;
        }
        match connect(&config.server_addr) {
            Ok(stream) => return Some(stream),
            Err(e) => warn!(attempt = attempt + 1, "reconnect failed: {e}"),
        }
    }
    None
}

fn drive_node<M: MotionSource, P: PressureSource>(
    motion: M,
    pressure: P,
    config: &NodeConfig,
    shutdown: &AtomicBool,
    max_ticks: Option<u64>,
) -> Result<(), CliFailure> {
    let stream = connect(&config.server_addr)?;
    let mut node = SensorNode::from_config(motion, pressure, stream, config);

    let result = loop {
        let remaining = max_ticks.map(|max| max.saturating_sub(node.ticks()));
        match node.run(shutdown, config.interval(), remaining) {
            Ok(_) => break Ok(()),
            Err(e @ PlantarError::Transport { .. }) if config.reconnect.enabled => {
                error!("link lost: {e}");
                match reconnect(config, shutdown) {
                    Some(stream) => {
                        let _ = node.replace_link(stream).shutdown(Shutdown::Both);
                    }
                    None if shutdown.load(Ordering::SeqCst) => break Ok(()),
                    None => break Err(CliFailure::from(e)),
                }
            }
            Err(e) => break Err(e.into()),
        }
    };

    // Summed over every link the node has used
    let totals = node.totals();
    let link = node.into_link();
    // Already closed by the peer on the error paths
    let _ = link.shutdown(Shutdown::Both);
    info!(
        steps = totals.steps,
        ticks = totals.ticks,
        sent = totals.messages_sent,
        dropped = totals.messages_dropped,
        "node stopped, link closed"
    );
    result
}

#[cfg(feature = "hardware")]
mod hardware {
    use super::CliFailure;
    use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
    use linux_embedded_hal::{I2cdev, SpidevDevice};
    use plantar_flux::motion::Adxl345;
    use plantar_flux::pressure::Mcp3008;
    use std::path::Path;

    const SPI_SPEED_HZ: u32 = 1_350_000;

    pub fn open(i2c_bus: &Path, spi_device: &Path) -> Result<(Adxl345<I2cdev>, Mcp3008<SpidevDevice>), CliFailure> {
        let i2c = I2cdev::new(i2c_bus).map_err(|e| CliFailure::Device(format!("{}: {e}", i2c_bus.display())))?;
        let mut accel = Adxl345::with_default_address(i2c);
        accel
            .init()
            .map_err(|e| CliFailure::Device(format!("accelerometer init: {e:?}")))?;

        let mut spi =
            SpidevDevice::open(spi_device).map_err(|e| CliFailure::Device(format!("{}: {e}", spi_device.display())))?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(SPI_SPEED_HZ)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)
            .map_err(|e| CliFailure::Device(format!("{}: {e}", spi_device.display())))?;

        Ok((accel, Mcp3008::new(spi)))
    }
}

fn read_message(text: Option<String>) -> Result<String, CliFailure> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let text = text.trim_end_matches(['\r', '\n']).to_string();
    if text.trim().is_empty() {
        return Err(CliFailure::NoInput);
    }
    Ok(text)
}

fn print_report(report: &DecodeReport) {
    println!("Steps: {}", report.message.step_count);
    for (channel, value) in &report.message.channels {
        println!("  Channel {channel}: {value}");
    }
    for warning in &report.warnings {
        println!("  [WARN] {warning}");
    }
}

fn cmd_decode(text: Option<String>, json: bool) -> Result<(), CliFailure> {
    let text = read_message(text)?;
    let report = telemetry::decode(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn cmd_reconstruct(
    text: Option<String>,
    config: Option<&Path>,
    sigma: Option<f64>,
    format: RenderFormat,
) -> Result<(), CliFailure> {
    let mut config = load_receiver_config(config)?;
    if let Some(sigma) = sigma {
        config.reconstruction.sigma = sigma;
    }
    config.validate().map_err(CliFailure::Config)?;

    let text = read_message(text)?;
    let frame = FrameProcessor::from_config(&config).process(&text, None);
    StdoutRenderer::new(format).render(&frame)?;
    Ok(())
}

fn check_file<T>(name: &str, path: &Path, load: impl Fn(&Path) -> Result<T, PlantarError>, describe: impl Fn(&T) -> String) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist", path.display()),
        };
    }
    match load(path) {
        Ok(value) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: describe(&value),
        },
        Err(e) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    }
}

fn describe_receiver(config: &ReceiverConfig) -> String {
    format!(
        "bind {}, {:?} framing, {} sensors bound, {}-point outline, sigma {}",
        config.bind_addr,
        config.framing,
        config.layout.bound_cells().count(),
        config.outline.points().len(),
        config.reconstruction.sigma
    )
}

fn cmd_doctor(node_config: Option<&Path>, receiver_config: Option<&Path>, json: bool) -> Result<(), CliFailure> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "plantar_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Plantar version {}", PLANTAR_VERSION),
    });

    // The built-in reconstruction context must always be usable
    let defaults = ReceiverConfig::default();
    checks.push(match defaults.validate() {
        Ok(()) => DoctorCheck {
            name: "default_context".to_string(),
            status: CheckStatus::Ok,
            message: describe_receiver(&defaults),
        },
        Err(e) => DoctorCheck {
            name: "default_context".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    if let Some(path) = node_config {
        checks.push(check_file("node_config", path, NodeConfig::load, |c| {
            format!(
                "server {}, threshold {} g, every {} ms, reconnect {}",
                c.server_addr,
                c.step_threshold_g,
                c.interval_ms,
                if c.reconnect.enabled { "on" } else { "off" }
            )
        }));
    }

    if let Some(path) = receiver_config {
        checks.push(check_file("receiver_config", path, ReceiverConfig::load, describe_receiver));
        if let Ok(config) = ReceiverConfig::load(path) {
            if config.framing == Framing::Unframed {
                checks.push(DoctorCheck {
                    name: "framing".to_string(),
                    status: CheckStatus::Warning,
                    message: "unframed mode relies on one read per message".to_string(),
                });
            }
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass messages as arguments)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (decode/reconstruct read from it)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PLANTAR_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Plantar Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CliFailure::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Json(serde_json::Error),
    Config(PlantarError),
    Plantar(PlantarError),
    Device(String),
    Signal(String),
    NoInput,
    DoctorFailed,
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

impl From<PlantarError> for CliFailure {
    fn from(e: PlantarError) -> Self {
        CliFailure::Plantar(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check addresses, file paths and permissions".to_string()),
            },
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CliFailure::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'plantar doctor' with the config file for details".to_string()),
            },
            CliFailure::Plantar(e @ PlantarError::Transport { .. }) => CliError {
                code: "TRANSPORT_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the receiver is running; --reconnect retries with backoff".to_string()),
            },
            CliFailure::Plantar(e @ PlantarError::Device(_)) => CliError {
                code: "DEVICE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check sensor wiring and bus permissions".to_string()),
            },
            CliFailure::Plantar(e) => CliError {
                code: "PLANTAR_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CliFailure::Device(msg) => CliError {
                code: "DEVICE_ERROR".to_string(),
                message: msg,
                hint: Some("Check sensor wiring and bus permissions".to_string()),
            },
            CliFailure::Signal(msg) => CliError {
                code: "SIGNAL_ERROR".to_string(),
                message: msg,
                hint: None,
            },
            CliFailure::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "No telemetry message given".to_string(),
                hint: Some("Pass the message as an argument or on stdin".to_string()),
            },
            CliFailure::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
