//! Hygon DCU Exporter binary.
//!
//! Serves device telemetry on `/metrics`, or prints a single snapshot.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dcu_exporter::{
    start_web_server, BackendKind, DeviceTelemetry, ExporterConfig, TelemetrySnapshot, WebConfig,
    DEFAULT_NAMESPACE, DEFAULT_SCRAPE_TIMEOUT_MS, DEFAULT_WEB_PORT,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "dcu_exporter")]
#[command(about = "Prometheus exporter for Hygon DCU accelerators")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Reads Hygon DCU telemetry from sysfs or hy-smi and exposes it as Prometheus gauges")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Telemetry backend: sysfs or hy-smi
    #[arg(long, default_value_t = BackendKind::Sysfs)]
    backend: BackendKind,

    /// Root of the DRM device class tree
    #[arg(long, default_value = "/sys/class/drm")]
    sysfs_root: PathBuf,

    /// Path to the hy-smi executable (searched on PATH when omitted)
    #[arg(long)]
    hy_smi_path: Option<PathBuf>,

    /// Replace blanks in model names with hyphens
    #[arg(long)]
    replace_blanks_in_model_name: bool,

    /// Override the hostname label
    #[arg(long)]
    hostname: Option<String>,

    /// Leave the hostname label empty
    #[arg(long, conflicts_with = "hostname")]
    no_hostname: bool,

    /// Metric name prefix
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Comma-separated metric kinds to export (default: all)
    #[arg(long)]
    metrics: Option<String>,

    /// Upper bound on one scrape in milliseconds
    #[arg(long, default_value_t = DEFAULT_SCRAPE_TIMEOUT_MS)]
    scrape_timeout_ms: u64,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the exporter (default)
    Serve(ServeArgs),

    /// Acquire a single snapshot, print it and exit
    Snapshot(SnapshotArgs),

    /// List discovered devices
    Devices,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct SnapshotArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = SnapshotFormat::Pretty)]
    format: SnapshotFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SnapshotFormat {
    Json,
    Pretty,
    Prometheus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = exporter_config(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args, &config).await,
        Some(Commands::Snapshot(args)) => snapshot_command(args, &config).await,
        Some(Commands::Devices) => devices_command(&config),
        None => serve_command(&cli, &ServeArgs::default(), &config).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        LevelFilter::DEBUG
    } else if cli.quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn exporter_config(cli: &Cli) -> anyhow::Result<ExporterConfig> {
    let mut config = ExporterConfig::default()
        .with_backend(cli.backend)
        .with_sysfs_root(&cli.sysfs_root)
        .with_hy_smi_path(cli.hy_smi_path.clone())
        .with_replace_blanks_in_model_name(cli.replace_blanks_in_model_name)
        .with_hostname(cli.hostname.clone())
        .with_no_hostname(cli.no_hostname)
        .with_namespace(&cli.namespace)
        .with_scrape_timeout(Duration::from_millis(cli.scrape_timeout_ms));

    if let Some(names) = &cli.metrics {
        config = config
            .with_metric_names(names)
            .context("invalid --metrics list")?;
    }

    config.validate()?;
    Ok(config)
}

async fn serve_command(cli: &Cli, args: &ServeArgs, config: &ExporterConfig) -> anyhow::Result<()> {
    info!("Starting Hygon DCU exporter with {} backend", config.backend);

    let telemetry = DeviceTelemetry::from_config(config)
        .with_context(|| format!("failed to initialize {} backend", config.backend))?;

    let web_config = WebConfig::new(&cli.host, cli.port).with_cors(!args.no_cors);

    info!("Exporter configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!("  - Namespace: {}", config.namespace);
    info!("  - Metrics: {}", config.metrics.len());
    info!("  - Scrape timeout: {:?}", config.scrape_timeout);

    start_web_server(web_config, Arc::new(telemetry), config).await?;

    Ok(())
}

async fn snapshot_command(args: &SnapshotArgs, config: &ExporterConfig) -> anyhow::Result<()> {
    let telemetry = Arc::new(DeviceTelemetry::from_config(config)?);
    let snapshot = telemetry.collect_snapshot(config.scrape_timeout).await?;

    match args.format {
        SnapshotFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        SnapshotFormat::Prometheus => {
            print!(
                "{}",
                dcu_exporter::web::exposition::render(&snapshot, &config.namespace)
            );
        }
        SnapshotFormat::Pretty => print_pretty_snapshot(&snapshot),
    }

    Ok(())
}

fn devices_command(config: &ExporterConfig) -> anyhow::Result<()> {
    let telemetry = DeviceTelemetry::from_config(config)?;

    println!("{} devices via {}", telemetry.devices().len(), telemetry.backend_name());
    for device in telemetry.devices() {
        println!(
            "  {}: {} (uuid: {}, serial: {}, vbios: {})",
            device.display_name(),
            device.product_name,
            device.uuid,
            device.serial,
            device.firmware_version
        );
    }

    Ok(())
}

fn print_pretty_snapshot(snapshot: &TelemetrySnapshot) {
    println!(
        "DCU Snapshot ({}, {})",
        chrono::DateTime::from_timestamp_millis(snapshot.timestamp as i64)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.backend
    );
    println!("==========================================");

    for device in &snapshot.devices {
        println!();
        println!(
            "{} [{}] {}",
            device.labels.device, device.labels.uuid, device.labels.model_name
        );
        for reading in &device.readings {
            match reading.sensor {
                Some(sensor) => println!("  {} ({}): {}", reading.kind, sensor, reading.value),
                None => println!("  {}: {}", reading.kind, reading.value),
            }
        }
    }
}
