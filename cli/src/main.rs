use clap::{Args, Parser, Subcommand};
use hound::WavSpec;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tapecast_core::{
    BitOrder, EncodingConfig, FskPhase, ModulationMode, PcmBuffer, TapecastError, WaveformEncoder,
    DEFAULT_AMPLITUDE, DEFAULT_LEADER_MS, DEFAULT_SAMPLE_RATE, DEFAULT_TAIL_MS,
};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Tapecast(#[from] TapecastError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(not(feature = "audio"))]
    #[error("{0}")]
    Unsupported(&'static str),
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Parser)]
#[command(name = "tapecast")]
#[command(about = "Encode tape images as cassette audio and play them to an output device")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct EncodeArgs {
    /// Modulation: fm250, fm500 or fsk1500
    #[arg(short, long, default_value = "fm500")]
    mode: ModulationMode,

    /// Output sample rate in Hz
    #[arg(short = 'r', long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Peak amplitude, clamped to [0.05, 1.0]
    #[arg(short, long, default_value_t = DEFAULT_AMPLITUDE)]
    amplitude: f32,

    /// Invert output polarity
    #[arg(long)]
    invert: bool,

    /// Leader duration in milliseconds
    #[arg(long, default_value_t = DEFAULT_LEADER_MS)]
    leader_ms: u32,

    /// Tail duration in milliseconds
    #[arg(long, default_value_t = DEFAULT_TAIL_MS)]
    tail_ms: u32,

    /// Emit each byte least significant bit first
    #[arg(long)]
    lsb_first: bool,

    /// FSK phase policy: reset or continuous
    #[arg(long, default_value = "reset")]
    fsk_phase: FskPhase,
}

impl EncodeArgs {
    fn to_config(&self) -> EncodingConfig {
        EncodingConfig {
            sample_rate: self.sample_rate,
            amplitude: self.amplitude,
            invert: self.invert,
            leader_ms: self.leader_ms,
            tail_ms: self.tail_ms,
            bit_order: if self.lsb_first {
                BitOrder::LsbFirst
            } else {
                BitOrder::MsbFirst
            },
            mode: self.mode,
            fsk_phase: self.fsk_phase,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a tape image to a mono 16-bit WAV file
    Encode {
        /// Input tape image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        #[command(flatten)]
        encoding: EncodeArgs,

        /// Print a JSON summary instead of progress text
        #[arg(long)]
        json: bool,
    },

    /// Encode a tape image and play it to the best output device
    Play {
        /// Input tape image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        encoding: EncodeArgs,

        /// Mirror the signal to a second output (e.g. the built-in speaker)
        #[arg(long)]
        monitor: bool,

        /// Monitor output gain in [0, 1]
        #[arg(long, default_value_t = tapecast_core::DEFAULT_MONITOR_VOLUME)]
        monitor_volume: f32,
    },

    /// List output devices, best data output first
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Encode { input, output, encoding, json } => encode_command(&input, &output, &encoding, json),
        Commands::Play { input, encoding, monitor, monitor_volume } => {
            play_command(&input, &encoding, monitor, monitor_volume)
        }
        Commands::Devices { json } => devices_command(json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Whole seconds as `mm:ss`
fn format_mmss(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn encode_payload(data: &[u8], args: &EncodeArgs, show_progress: bool) -> CliResult<PcmBuffer> {
    let encoder = WaveformEncoder::new(args.to_config())?;
    let pcm = encoder.encode_with_progress(data, |p| {
        if show_progress {
            eprint!("\rEncoding... {:3.0}%", p * 100.0);
            let _ = std::io::stderr().flush();
        }
    })?;
    if show_progress {
        eprintln!();
    }
    Ok(pcm)
}

#[derive(Serialize)]
struct EncodeSummary {
    input: String,
    output: String,
    bytes: usize,
    samples: usize,
    sample_rate: u32,
    duration_secs: f64,
    mode: String,
}

fn write_wav(path: &Path, pcm: &PcmBuffer) -> CliResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: pcm.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in pcm.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn encode_command(input: &Path, output: &Path, args: &EncodeArgs, json: bool) -> CliResult<()> {
    let data = read_input(input)?;
    if !json {
        println!("Read {} bytes from {}", data.len(), input.display());
    }

    let pcm = encode_payload(&data, args, !json)?;
    write_wav(output, &pcm)?;
    log::debug!(
        "Wrote {} samples at {} Hz to {}",
        pcm.len(),
        pcm.sample_rate(),
        output.display()
    );

    let duration = pcm.duration().as_secs_f64();
    if json {
        let summary = EncodeSummary {
            input: input.display().to_string(),
            output: output.display().to_string(),
            bytes: data.len(),
            samples: pcm.len(),
            sample_rate: pcm.sample_rate(),
            duration_secs: duration,
            mode: args.mode.to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Encoded {} samples ({} at {} Hz, {}) to {}",
            pcm.len(),
            args.mode,
            pcm.sample_rate(),
            format_mmss(duration),
            output.display()
        );
    }
    Ok(())
}

/// Prints routes and elapsed time; hands the outcome back to the main thread
#[cfg(feature = "audio")]
struct ConsoleObserver {
    duration_secs: f64,
    ended: std::sync::mpsc::SyncSender<tapecast_core::PlaybackOutcome>,
    last_route: parking_lot::Mutex<Option<tapecast_core::RouteReport>>,
}

#[cfg(feature = "audio")]
impl tapecast_core::PlaybackObserver for ConsoleObserver {
    fn on_route(&self, routes: &tapecast_core::RouteReport) {
        let mut last = self.last_route.lock();
        // Only print when the platform has moved a stream
        if last.as_ref() != Some(routes) {
            log::debug!("Bound routes changed: {:?}", routes);
            eprintln!(
                "\rOutput: {} | Monitor: {}",
                routes.primary_label(),
                routes.secondary_label()
            );
            *last = Some(routes.clone());
        }
    }

    fn on_progress(&self, progress: f32) {
        eprint!(
            "\r{} / {} {:3.0}%  (press Enter to stop)",
            format_mmss(progress as f64 * self.duration_secs),
            format_mmss(self.duration_secs),
            progress * 100.0
        );
        let _ = std::io::stderr().flush();
    }

    fn on_end(&self, outcome: &tapecast_core::PlaybackOutcome) {
        eprintln!();
        let _ = self.ended.try_send(outcome.clone());
    }
}

#[cfg(feature = "audio")]
fn play_command(input: &Path, args: &EncodeArgs, monitor: bool, monitor_volume: f32) -> CliResult<()> {
    use std::sync::{mpsc, Arc};
    use tapecast_core::{CpalBackend, DualRoutePlayer, PlaybackConfig, PlaybackOutcome};

    let data = read_input(input)?;
    println!("Read {} bytes from {}", data.len(), input.display());

    let pcm = encode_payload(&data, args, true)?;
    let duration_secs = pcm.duration().as_secs_f64();
    println!("Playing {} ({}) at {} Hz", format_mmss(duration_secs), args.mode, pcm.sample_rate());

    let config = PlaybackConfig {
        sample_rate: pcm.sample_rate(),
        mirror_to_secondary: monitor,
        secondary_volume: monitor_volume,
        ..Default::default()
    };

    let (ended_tx, ended_rx) = mpsc::sync_channel(1);
    let observer = Arc::new(ConsoleObserver {
        duration_secs,
        ended: ended_tx,
        last_route: parking_lot::Mutex::new(None),
    });

    let player = DualRoutePlayer::new(CpalBackend::new());
    let session = player.play(pcm, config, observer)?;

    // Enter stops playback; the reader thread is abandoned at exit
    {
        let session = Arc::clone(&session);
        std::thread::spawn(move || {
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_ok() {
                session.stop();
            }
        });
    }

    let outcome = ended_rx
        .recv()
        .map_err(|_| TapecastError::SessionThread("playback ended without an outcome".into()))?;
    session.wait();
    log::debug!("Session {} ended: {:?}", session.id(), outcome);

    match outcome {
        PlaybackOutcome::Completed => println!("Playback complete"),
        PlaybackOutcome::Stopped => println!("Playback stopped"),
        PlaybackOutcome::Failed(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(not(feature = "audio"))]
fn play_command(_input: &Path, _args: &EncodeArgs, _monitor: bool, _monitor_volume: f32) -> CliResult<()> {
    Err(CliError::Unsupported(
        "built without audio output; rebuild with `--features audio`",
    ))
}

#[cfg(feature = "audio")]
fn devices_command(json: bool) -> CliResult<()> {
    use tapecast_core::{rank_devices, AudioBackend, CpalBackend, RoutePreference};

    let devices = CpalBackend::new().output_devices()?;
    let ranked: Vec<_> = rank_devices(&devices, RoutePreference::Primary)
        .into_iter()
        .cloned()
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }

    if ranked.is_empty() {
        println!("No output devices found");
    }
    for (i, device) in ranked.iter().enumerate() {
        println!(
            "{:>2}. {}{}",
            i + 1,
            device.route(),
            if device.is_default { "  [default]" } else { "" }
        );
    }
    Ok(())
}

#[cfg(not(feature = "audio"))]
fn devices_command(_json: bool) -> CliResult<()> {
    Err(CliError::Unsupported(
        "built without audio output; rebuild with `--features audio`",
    ))
}
