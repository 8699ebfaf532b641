//! Two-tone FSK encoding
//!
//! Each bit is a square wave at one of two fixed tones: the low tone for 0,
//! the high tone for 1. Leader and tail are the low tone.

use crate::bits::BitClock;
use crate::config::FskPhase;
use crate::encoder::Modulator;
use crate::pcm::SampleWriter;
use crate::{FSK_HIGH_TONE_HZ, FSK_LOW_TONE_HZ};

/// Phase-accumulating square wave generator
///
/// `phase` counts progress through the current half cycle in [0, 1); the
/// output level toggles each time it wraps.
#[derive(Debug, Clone, Copy)]
struct SquareTone {
    phase: f64,
    level: bool,
}

impl SquareTone {
    fn new() -> Self {
        Self {
            phase: 0.0,
            level: true,
        }
    }
}

pub struct FskModulator {
    sample_rate: f64,
    policy: FskPhase,
    tone: SquareTone,
}

impl FskModulator {
    pub fn new(sample_rate: u32, policy: FskPhase) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            policy,
            tone: SquareTone::new(),
        }
    }

    /// Emit `samples` samples of a square wave at `freq`
    ///
    /// One call is one synthesis invocation: under `ResetPerBit` the tone
    /// restarts from phase 0 at the high level.
    fn synthesize(&mut self, out: &mut SampleWriter, freq: f64, samples: usize) {
        if self.policy == FskPhase::ResetPerBit {
            self.tone = SquareTone::new();
        }

        // Fraction of a half period advanced per sample
        let step = 2.0 * freq / self.sample_rate;
        for _ in 0..samples {
            out.push(self.tone.level);
            self.tone.phase += step;
            if self.tone.phase >= 1.0 {
                self.tone.phase -= 1.0;
                self.tone.level = !self.tone.level;
            }
        }
    }
}

impl Modulator for FskModulator {
    fn leader(&mut self, out: &mut SampleWriter, samples: usize) {
        self.synthesize(out, FSK_LOW_TONE_HZ, samples);
    }

    fn bit(&mut self, out: &mut SampleWriter, clock: &BitClock, k: usize, value: bool) {
        let freq = if value { FSK_HIGH_TONE_HZ } else { FSK_LOW_TONE_HZ };
        let samples = clock.boundary(k + 1).saturating_sub(out.written());
        self.synthesize(out, freq, samples);
    }

    fn tail(&mut self, out: &mut SampleWriter, samples: usize) {
        self.synthesize(out, FSK_LOW_TONE_HZ, samples);
    }
}
