use std::thread::{self, JoinHandle};

use crate::bits::{payload_bits, BitClock};
use crate::config::EncodingConfig;
use crate::error::{Result, TapecastError};
use crate::fm::FmModulator;
use crate::fsk::FskModulator;
use crate::pcm::{LevelMap, PcmBuffer, SampleWriter};
use crate::{MAX_INTERMEDIATE_PROGRESS, PROGRESS_INTERVAL_BITS};

/// One modulation scheme: leader, per-bit waveform, tail
pub(crate) trait Modulator {
    fn leader(&mut self, out: &mut SampleWriter, samples: usize);
    /// Emit bit `k`, ending exactly at `clock.boundary(k + 1)`
    fn bit(&mut self, out: &mut SampleWriter, clock: &BitClock, k: usize, value: bool);
    fn tail(&mut self, out: &mut SampleWriter, samples: usize);
}

/// Monotonic progress over the data bits
///
/// Intermediate values never exceed 0.95; 1.0 is delivered once by `finish`.
struct ProgressReporter<F: FnMut(f32)> {
    total_bits: usize,
    last: f32,
    callback: F,
}

impl<F: FnMut(f32)> ProgressReporter<F> {
    fn new(total_bits: usize, callback: F) -> Self {
        Self {
            total_bits,
            last: 0.0,
            callback,
        }
    }

    fn bits_done(&mut self, done: usize) {
        if done % PROGRESS_INTERVAL_BITS != 0 || done == self.total_bits {
            return;
        }
        let fraction = (done as f32 / self.total_bits as f32).min(MAX_INTERMEDIATE_PROGRESS);
        self.last = self.last.max(fraction);
        (self.callback)(self.last);
    }

    fn finish(mut self) {
        (self.callback)(1.0);
    }
}

/// Synthesize `payload` into a PCM waveform
///
/// Fails only for an empty payload or a zero sample rate. The returned
/// buffer holds exactly leader + data + tail samples.
pub fn generate<F>(payload: &[u8], config: &EncodingConfig, on_progress: F) -> Result<PcmBuffer>
where
    F: FnMut(f32),
{
    if payload.is_empty() {
        return Err(TapecastError::InvalidInput("payload is empty".into()));
    }
    config.validate()?;

    if config.mode.is_fm() {
        let fm = FmModulator::new(config.sample_rate, config.mode.baud());
        run(fm, payload, config, on_progress)
    } else {
        let fsk = FskModulator::new(config.sample_rate, config.fsk_phase);
        run(fsk, payload, config, on_progress)
    }
}

fn run<M, F>(mut modulator: M, payload: &[u8], config: &EncodingConfig, on_progress: F) -> Result<PcmBuffer>
where
    M: Modulator,
    F: FnMut(f32),
{
    let leader_samples = config.leader_samples();
    let tail_samples = config.tail_samples();
    let total_bits = payload.len() * 8;
    let period = config.samples_per_bit();

    // One extra second of slack absorbs rounding; trimmed on finish
    let estimated_data = (total_bits as f64 * period).ceil() as usize;
    let capacity = leader_samples + tail_samples + estimated_data + config.sample_rate as usize;

    let levels = LevelMap::new(config.peak(), config.invert);
    let mut out = SampleWriter::with_len(capacity, levels);
    let mut progress = ProgressReporter::new(total_bits, on_progress);

    modulator.leader(&mut out, leader_samples);

    let clock = BitClock::new(out.written(), period);
    for (k, bit) in payload_bits(payload, config.bit_order).enumerate() {
        modulator.bit(&mut out, &clock, k, bit);
        progress.bits_done(k + 1);
    }

    modulator.tail(&mut out, tail_samples);

    let pcm = out.finish(config.sample_rate);
    progress.finish();

    log::debug!(
        "Generated {} samples ({} leader, {} tail) for {} bytes, mode {}, {:.2}s",
        pcm.len(),
        leader_samples,
        tail_samples,
        payload.len(),
        config.mode,
        pcm.duration().as_secs_f64()
    );

    Ok(pcm)
}

/// Waveform encoder bound to a validated configuration
#[derive(Debug, Clone)]
pub struct WaveformEncoder {
    config: EncodingConfig,
}

impl WaveformEncoder {
    pub fn new(config: EncodingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EncodingConfig {
        &self.config
    }

    /// Encode binary data into PCM samples
    pub fn encode(&self, data: &[u8]) -> Result<PcmBuffer> {
        generate(data, &self.config, |_| {})
    }

    pub fn encode_with_progress<F: FnMut(f32)>(&self, data: &[u8], on_progress: F) -> Result<PcmBuffer> {
        generate(data, &self.config, on_progress)
    }

    pub fn expected_len(&self, payload_len: usize) -> usize {
        self.config.expected_len(payload_len)
    }
}

impl Default for WaveformEncoder {
    fn default() -> Self {
        Self {
            config: EncodingConfig::default(),
        }
    }
}

/// A generation running on its own worker thread
pub struct GenerationTask {
    handle: JoinHandle<Result<PcmBuffer>>,
}

impl GenerationTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the waveform. Generation has no cancellation; it runs to completion.
    pub fn join(self) -> Result<PcmBuffer> {
        self.handle
            .join()
            .map_err(|_| TapecastError::SessionThread("encoder worker panicked".into()))?
    }
}

/// Run [`generate`] off the calling thread
///
/// `on_progress` is invoked from the worker thread.
pub fn spawn_generate<F>(payload: Vec<u8>, config: EncodingConfig, on_progress: F) -> Result<GenerationTask>
where
    F: FnMut(f32) + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("waveform-encoder".into())
        .spawn(move || generate(&payload, &config, on_progress))
        .map_err(|e| TapecastError::SessionThread(format!("failed to spawn encoder: {}", e)))?;

    Ok(GenerationTask { handle })
}
