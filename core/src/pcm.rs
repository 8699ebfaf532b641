use std::time::Duration;

/// Owned mono 16-bit PCM produced by the encoder
///
/// Never mutated after creation; playback borrows it read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl PcmBuffer {
    pub fn from_samples(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playing time of the buffer at its sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Little-endian signed 16-bit byte stream
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

impl AsRef<[i16]> for PcmBuffer {
    fn as_ref(&self) -> &[i16] {
        &self.samples
    }
}

/// Quantizes logical levels to signed samples
///
/// Shared by both modulation schemes so inversion behaves the same way
/// under either mode.
#[derive(Debug, Clone, Copy)]
pub struct LevelMap {
    peak: i16,
    invert: bool,
}

impl LevelMap {
    pub fn new(peak: i16, invert: bool) -> Self {
        Self { peak, invert }
    }

    #[inline]
    pub fn signed(&self, level: bool) -> i16 {
        if level ^ self.invert {
            self.peak
        } else {
            -self.peak
        }
    }
}

/// Append-only writer over a pre-sized sample buffer
///
/// Writes past the allocated length are dropped, so an under-estimated
/// capacity truncates the output instead of growing it.
pub(crate) struct SampleWriter {
    buf: Vec<i16>,
    written: usize,
    levels: LevelMap,
}

impl SampleWriter {
    pub fn with_len(len: usize, levels: LevelMap) -> Self {
        Self {
            buf: vec![0; len],
            written: 0,
            levels,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn push(&mut self, level: bool) {
        if self.written < self.buf.len() {
            self.buf[self.written] = self.levels.signed(level);
            self.written += 1;
        }
    }

    /// Hold `level` until the write position reaches `end` (exclusive)
    pub fn fill_to(&mut self, end: usize, level: bool) {
        let end = end.min(self.buf.len());
        if end <= self.written {
            return;
        }
        let value = self.levels.signed(level);
        self.buf[self.written..end].fill(value);
        self.written = end;
    }

    /// Trim to the samples actually written
    pub fn finish(mut self, sample_rate: u32) -> PcmBuffer {
        self.buf.truncate(self.written);
        self.buf.shrink_to_fit();
        PcmBuffer::from_samples(self.buf, sample_rate)
    }
}
