//! CLI Entry Point for energy-probe
//!
//! Provides command-line interface for:
//! - Capturing from an energy probe into a CSV file
//! - Decoding an existing raw `caiman` log offline
//! - Listing the channels a configuration exposes
//!
//! # Usage
//!
//! Capture for ten seconds (or until Ctrl+C):
//! ```bash
//! energy-probe capture --duration 10 --output power.csv --channels A57_power,A53_power
//! ```
//!
//! Decode a raw log:
//! ```bash
//! energy-probe decode --raw /tmp/eprobe-caiman-xyz/0000000000 --output power.csv
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use energy_probe::capture::PathLocator;
use energy_probe::config::{ProbeConfig, DEFAULT_CONFIG_PATH};
use energy_probe::data::{RecordLayout, SampleDecoder};
use energy_probe::instrument::{
    ChannelRegistry, ChannelSelection, EnergyProbeInstrument, Instrument, MeasurementKind,
};
use energy_probe::logging::{self, OutputFormat, TracingConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "energy-probe")]
#[command(about = "Energy probe capture and raw log decoding", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a capture and write the decoded CSV
    Capture {
        /// Capture length in seconds; runs until Ctrl+C when omitted
        #[arg(long, value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Output CSV file
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Decode an existing raw capture file
    Decode {
        /// Raw file written by caiman
        #[arg(long)]
        raw: PathBuf,

        /// Output CSV file
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// List the channels of the configured probe
    Channels,
}

#[derive(Args)]
struct SelectionArgs {
    /// Explicit channel labels, in output order
    #[arg(long, value_delimiter = ',')]
    channels: Vec<String>,

    /// Keep only these sites
    #[arg(long, value_delimiter = ',', conflicts_with = "channels")]
    sites: Vec<String>,

    /// Keep only these measurement kinds
    #[arg(long, value_delimiter = ',', conflicts_with = "channels")]
    kinds: Vec<String>,
}

impl SelectionArgs {
    fn to_selection(&self) -> Result<ChannelSelection> {
        if !self.channels.is_empty() {
            return Ok(ChannelSelection::Channels(self.channels.clone()));
        }
        if self.sites.is_empty() && self.kinds.is_empty() {
            return Ok(ChannelSelection::All);
        }
        let kinds = self
            .kinds
            .iter()
            .map(|k| k.parse::<MeasurementKind>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChannelSelection::Filter {
            sites: (!self.sites.is_empty()).then(|| self.sites.clone()),
            kinds: (!kinds.is_empty()).then_some(kinds),
        })
    }
}

/// Parses a positive, finite number of seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|e| format!("'{}' is not a number of seconds: {}", s, e))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("duration must be a positive number of seconds, got {}", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("duration {} out of range: {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ProbeConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate()?;

    let level = logging::parse_log_level(&config.application.log_level).map_err(anyhow::Error::msg)?;
    logging::init(TracingConfig::new(level).with_format(cli.log_format)).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Capture {
            duration,
            output,
            selection,
        } => capture(&config, duration, output, selection.to_selection()?).await,
        Commands::Decode {
            raw,
            output,
            selection,
        } => decode(&config, raw, output, selection.to_selection()?),
        Commands::Channels => list_channels(&config),
    }
}

async fn capture(
    config: &ProbeConfig,
    duration: Option<Duration>,
    output: PathBuf,
    selection: ChannelSelection,
) -> Result<()> {
    let mut probe = EnergyProbeInstrument::new(config.probe.clone(), &PathLocator)?;
    probe.reset(selection)?;
    probe.start()?;

    match duration {
        Some(duration) => {
            info!("Capturing for {:?} (Ctrl+C to stop early)", duration);
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => {
            info!("Capturing until Ctrl+C");
            tokio::signal::ctrl_c().await?;
        }
    }

    probe.stop()?;
    let csv = probe.get_data(&output)?;
    println!(
        "Wrote {} ({} channels)",
        csv.path().display(),
        csv.channels().len()
    );
    Ok(())
}

fn decode(
    config: &ProbeConfig,
    raw: PathBuf,
    output: PathBuf,
    selection: ChannelSelection,
) -> Result<()> {
    let mut registry = ChannelRegistry::for_sites(&config.probe.site_labels())?;
    registry.select(&selection)?;

    let decoder = SampleDecoder::new(
        RecordLayout::new(config.probe.ports()),
        registry.list_channels(),
        registry.active_channels(),
    )?;
    let csv = decoder.decode_file(&raw, &output)?;
    println!(
        "Wrote {} ({} channels)",
        csv.path().display(),
        csv.channels().len()
    );
    Ok(())
}

fn list_channels(config: &ProbeConfig) -> Result<()> {
    let registry = ChannelRegistry::for_sites(&config.probe.site_labels())?;
    for channel in registry.list_channels() {
        println!("{:<24} {}", channel.label(), channel.units());
    }
    Ok(())
}
