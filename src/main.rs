mod logging;

use adcscope::acquisition::{AcquisitionStatus, State};
use adcscope::spectrum::{self, SpectralResult};
use adcscope::{Acquisition, AdcTransport, Config, RollingBuffer, SignalGenerator, wav};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Parser)]
#[command(name = "adcscope")]
#[command(about = "Sample an SPI ADC at a fixed rate and inspect its spectrum")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (default: <config dir>/adcscope/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record from the ADC and report the spectrum of the final window
    Record {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long)]
        duration: Option<u64>,

        /// Use a simulated sine source instead of the MCP3008
        #[arg(long)]
        simulate: bool,

        /// Frequency of the simulated tone in Hz
        #[arg(long, default_value = "440")]
        tone: f64,

        /// Low-pass cutoff in Hz applied to the reported signal (0 = off)
        #[arg(long, default_value = "0")]
        cutoff: f64,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Load a WAV file and report its spectrum
    Analyze {
        path: PathBuf,

        /// Low-pass cutoff in Hz applied to the reported signal (0 = off)
        #[arg(long, default_value = "0")]
        cutoff: f64,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List SPI device nodes
    Devices,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path.or_else(Config::default_path) {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            tracing::debug!(path = %path.display(), "Loaded configuration");
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

async fn record(
    config: Config,
    duration: Option<u64>,
    simulate: bool,
    tone: f64,
    cutoff: f64,
    format: OutputFormat,
) -> Result<()> {
    if simulate {
        let transport = SignalGenerator::sine(tone, 400.0, config.acquisition.rate);
        let session = Acquisition::new(transport, config.acquisition)?;
        run_session(session, duration, cutoff, format).await
    } else {
        let session = Acquisition::open(&config)
            .context("Failed to open ADC; is SPI enabled? Try --simulate")?;
        run_session(session, duration, cutoff, format).await
    }
}

async fn run_session<T: AdcTransport>(
    mut session: Acquisition<T>,
    duration: Option<u64>,
    cutoff: f64,
    format: OutputFormat,
) -> Result<()> {
    session.start()?;

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                let status = session.status();
                if status.state == State::Idle {
                    tracing::warn!("Acquisition ended on its own");
                    break;
                }
                log_status(&status);
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    break;
                }
            }
        }
    }

    // stop(wait) blocks on the sampler; keep it off the runtime threads
    let mut session = tokio::task::spawn_blocking(move || {
        session.stop(true);
        session
    })
    .await
    .map_err(|e| anyhow!("Failed to stop acquisition: {}", e))?;

    let status = session.status();
    let result = session.spectral();
    let filtered = session.filtered(cutoff);
    session.close()?;

    let result = result.context("Nothing recorded")?;
    report(&result, &filtered?, cutoff, Some(&status), format)
}

fn log_status(status: &AcquisitionStatus) {
    tracing::info!(
        state = status.state.as_str(),
        buffered = status.buffered,
        recorded = status.samples_recorded,
        missed = status.missed_deadlines,
        "{:.1}% of window filled",
        100.0 * status.buffered as f64 / status.capacity.max(1) as f64
    );
}

fn analyze(config: &Config, path: &Path, cutoff: f64, format: OutputFormat) -> Result<()> {
    let recording =
        wav::load(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let settings = config
        .acquisition
        .with_rate(recording.rate)
        .with_context(|| format!("{} does not fit the configured window", path.display()))?;

    let window = RollingBuffer::from_samples(
        settings.rate,
        settings.capacity(),
        &recording.samples,
    );
    if window.len() < recording.samples.len() {
        tracing::warn!(
            dropped = recording.samples.len() - window.len(),
            "WAV longer than the memory window, keeping the most recent samples"
        );
    }

    let snapshot = window.snapshot();
    let filtered = spectrum::filtered(&snapshot, cutoff)?;
    let result = SpectralResult::from_snapshot(snapshot).context("WAV file is empty")?;
    report(&result, &filtered, cutoff, None, format)
}

fn report(
    result: &SpectralResult,
    filtered: &[f64],
    cutoff: f64,
    status: Option<&AcquisitionStatus>,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "Window: {} samples ({:.2}s at {} Hz), first index {}",
                result.samples.len(),
                result.duration_secs(),
                result.rate,
                result.first_index
            );
            if let Some(status) = status {
                println!(
                    "Recorded: {} samples, {} missed deadlines ({:.1} ms behind)",
                    status.samples_recorded, status.missed_deadlines, status.overrun_ms
                );
            }
            match result.peak() {
                Some((frequency, power)) => {
                    println!("Peak: {:.2} Hz ({:.1} dB)", frequency, power)
                }
                None => println!("Peak: n/a"),
            }
            if cutoff > 0.0 {
                println!(
                    "RMS: {:.2} raw, {:.2} below {} Hz",
                    rms(&result.samples.iter().map(|&s| s as f64).collect::<Vec<_>>()),
                    rms(filtered),
                    cutoff
                );
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "status": status,
                "spectrum": result,
                "filtered": if cutoff > 0.0 { Some(filtered) } else { None },
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn rms(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    (data.iter().map(|v| v * v).sum::<f64>() / data.len() as f64).sqrt()
}

fn list_devices() -> Result<Vec<(String, PathBuf)>> {
    let mut devices: Vec<(String, PathBuf)> = std::fs::read_dir("/dev")?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_prefix("spidev")
                .map(|id| (id.to_string(), entry.path()))
        })
        .collect();
    devices.sort();
    Ok(devices)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(&cli.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let outcome = match load_config(cli.config) {
        Ok(config) => match cli.command {
            Commands::Record {
                duration,
                simulate,
                tone,
                cutoff,
                format,
            } => record(config, duration, simulate, tone, cutoff, format).await,
            Commands::Analyze {
                path,
                cutoff,
                format,
            } => analyze(&config, &path, cutoff, format),
            Commands::Devices => match list_devices() {
                Ok(devices) if devices.is_empty() => {
                    println!("No SPI devices found (is the SPI interface enabled?)");
                    Ok(())
                }
                Ok(devices) => {
                    println!("{:<10} Path", "Bus.Dev");
                    println!("{}", "-".repeat(40));
                    for (id, path) in devices {
                        println!("{:<10} {}", id, path.display());
                    }
                    Ok(())
                }
                Err(e) => Err(e.context("Failed to list SPI devices")),
            },
        },
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
