//! Meter Sniffer CLI Application
//!
//! Command-line front end for the meter-sniffer-decoder library. It adds the
//! device and output plumbing the library leaves out:
//! - Serial port source (or replay of a raw byte capture)
//! - Console, CSV and MQTT sinks
//! - TOML configuration file

use anyhow::{bail, Context, Result};
use clap::Parser;
use meter_sniffer_decoder::{
    ByteSource, Decoder, Emitter, Pipeline, PipelineSettings, PipelineSummary, ReplaySource,
};
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod output;
mod serial;
mod shutdown;

use config::{AppConfig, MqttConfig};

/// Meter Sniffer - Passive Modbus RTU listener for three-phase power meters
#[derive(Parser, Debug)]
#[command(name = "meter-sniffer")]
#[command(about = "Decode meter readings from passively captured Modbus RTU traffic", long_about = None)]
#[command(version)]
struct Args {
    /// Serial port to listen on (overrides [serial] port)
    #[arg(short, long, value_name = "PORT")]
    port: Option<String>,

    /// Baud rate (overrides [serial] baud_rate)
    #[arg(short, long, value_name = "BAUD")]
    baud: Option<u32>,

    /// Replay a raw byte capture instead of opening a serial port
    #[arg(long, value_name = "FILE", conflicts_with = "port")]
    replay: Option<PathBuf>,

    /// Bytes handed to the decoder per replay read
    #[arg(long, value_name = "BYTES", default_value_t = 64)]
    replay_chunk: usize,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write measurement sets to a CSV file (overrides [output] csv)
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Publish measurement sets to this MQTT broker host
    #[arg(long, value_name = "HOST")]
    mqtt: Option<String>,

    /// Do not print measurement sets to stdout
    #[arg(long)]
    no_console: bool,

    /// Stop after this many measurement sets
    #[arg(long, value_name = "COUNT")]
    max_measurements: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Meter Sniffer v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", meter_sniffer_decoder::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    let config = apply_overrides(config, &args);

    let summary = if let Some(path) = &args.replay {
        let data = std::fs::read(path).with_context(|| format!("Failed to read capture file: {:?}", path))?;
        log::info!("Replaying {} bytes from {:?}", data.len(), path);
        run(ReplaySource::new(data, args.replay_chunk), &config, &args)?
    } else if let Some(port) = &config.serial.port {
        let source = serial::SerialSource::open(port, &config.serial)?;
        log::info!("Listening on {}", source.name());
        run(source, &config, &args)?
    } else {
        bail!("No input specified: use --port <PORT>, --replay <FILE> or set [serial] port in the config file");
    };

    print_summary(&summary);
    Ok(())
}

/// Command-line flags win over the configuration file
fn apply_overrides(mut config: AppConfig, args: &Args) -> AppConfig {
    if let Some(port) = &args.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(csv) = &args.csv {
        config.output.csv = Some(csv.clone());
    }
    if args.no_console {
        config.output.console = false;
    }
    if let Some(host) = &args.mqtt {
        match &mut config.mqtt {
            Some(mqtt) => mqtt.host = host.clone(),
            None => config.mqtt = Some(MqttConfig::for_host(host.clone())),
        }
    }
    config
}

/// Build decoder and sinks, then run the acquisition loop on `source`
fn run<S: ByteSource>(source: S, config: &AppConfig, args: &Args) -> Result<PipelineSummary> {
    let register_map = config.register_map()?;
    let emitter = build_emitter(config, &register_map)?;
    let decoder = Decoder::new(config.decoder.clone(), register_map).context("Invalid decoder configuration")?;

    let settings = PipelineSettings {
        read_size: config.serial.read_size,
        read_timeout: Duration::from_millis(config.serial.read_timeout_ms),
        max_measurements: args.max_measurements,
    };

    let mut pipeline = Pipeline::new(source, decoder, emitter, settings);
    let _signal_thread = shutdown::install(pipeline.shutdown_handle())?;
    let summary = pipeline.run().context("Acquisition stopped")?;
    Ok(summary)
}

fn build_emitter(config: &AppConfig, register_map: &meter_sniffer_decoder::RegisterMap) -> Result<Emitter> {
    let mut emitter = Emitter::new();
    if config.output.console {
        emitter.add_sink(Box::new(output::ConsoleSink::stdout()));
    }
    if let Some(path) = &config.output.csv {
        emitter.add_sink(Box::new(output::CsvSink::create(path, register_map)?));
    }
    if let Some(mqtt) = &config.mqtt {
        emitter.add_sink(Box::new(output::MqttSink::connect(mqtt)?));
    }
    if emitter.sink_count() == 0 {
        log::warn!("No output configured, measurement sets will only be counted");
    }
    Ok(emitter)
}

fn print_summary(summary: &PipelineSummary) {
    let stats = &summary.stats;
    log::info!("═══════════════════════════════════════════════");
    log::info!("  Bytes received:     {}", stats.bytes_received);
    log::info!("  Bytes discarded:    {}", stats.bytes_discarded);
    log::info!("  Requests:           {}", stats.requests);
    log::info!("  Responses:          {}", stats.responses);
    log::info!("  Exceptions:         {}", stats.exception_responses);
    log::info!("  Write frames:       {}", stats.write_frames);
    log::info!("  CRC mismatches:     {}", stats.crc_mismatches);
    log::info!("  Buffer overflows:   {}", stats.buffer_overflows);
    log::info!("  Measurement sets:   {}", summary.measurement_sets);
    log::info!("  Diagnostics:        {}", summary.diagnostics);
    log::info!("  Sink failures:      {}", summary.sink_failures);
    log::info!("═══════════════════════════════════════════════");
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
