//! FM / Kansas-City style encoding
//!
//! Every bit period starts with a level toggle (the clock transition).
//! A 1 bit adds a second toggle at the half-period mark (the data
//! transition); a 0 bit holds the level for the whole period. The bit value
//! is carried by the presence of the mid-period transition, not by tone.

use crate::bits::BitClock;
use crate::encoder::Modulator;
use crate::pcm::SampleWriter;

pub struct FmModulator {
    level: bool,
    period: f64,
}

impl FmModulator {
    pub fn new(sample_rate: u32, baud: u32) -> Self {
        Self {
            level: false,
            period: sample_rate as f64 / baud as f64,
        }
    }

    fn toggle(&mut self) {
        self.level = !self.level;
    }
}

impl Modulator for FmModulator {
    /// Square wave at the bit clock rate: one toggle at the start of every
    /// bit period, the same waveform as a run of 0 bits. A final partial
    /// period is cut at `samples`.
    fn leader(&mut self, out: &mut SampleWriter, samples: usize) {
        let start = out.written();
        let end = start + samples;
        let clock = BitClock::new(start, self.period);

        let mut k = 0;
        while clock.boundary(k) < end {
            self.toggle();
            out.fill_to(clock.boundary(k + 1).min(end), self.level);
            k += 1;
        }
    }

    fn bit(&mut self, out: &mut SampleWriter, clock: &BitClock, k: usize, value: bool) {
        // Clock transition
        self.toggle();
        out.fill_to(clock.midpoint(k), self.level);

        // Data transition
        if value {
            self.toggle();
        }
        out.fill_to(clock.boundary(k + 1), self.level);
    }

    /// Flat hold of the current level
    fn tail(&mut self, out: &mut SampleWriter, samples: usize) {
        let end = out.written() + samples;
        out.fill_to(end, self.level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::LevelMap;

    fn transitions(samples: &[i16], initial: i16) -> usize {
        let mut previous = initial;
        let mut count = 0;
        for &s in samples {
            if s != previous {
                count += 1;
            }
            previous = s;
        }
        count
    }

    #[test]
    fn test_zero_bit_has_single_transition() {
        let mut out = SampleWriter::with_len(1000, LevelMap::new(100, false));
        let mut fm = FmModulator::new(44100, 500);
        let clock = BitClock::new(0, fm.period);
        fm.bit(&mut out, &clock, 0, false);
        let pcm = out.finish(44100);
        assert_eq!(pcm.len(), 88);
        assert_eq!(transitions(pcm.samples(), -100), 1);
    }

    #[test]
    fn test_one_bit_has_mid_period_transition() {
        let mut out = SampleWriter::with_len(1000, LevelMap::new(100, false));
        let mut fm = FmModulator::new(44100, 500);
        let clock = BitClock::new(0, fm.period);
        fm.bit(&mut out, &clock, 0, true);
        let pcm = out.finish(44100);
        assert_eq!(transitions(pcm.samples(), -100), 2);
        // Second toggle lands on the half-period sample
        assert_eq!(pcm.samples()[43], 100);
        assert_eq!(pcm.samples()[44], -100);
    }

    #[test]
    fn test_leader_toggles_once_per_period() {
        let mut out = SampleWriter::with_len(10_000, LevelMap::new(100, false));
        let mut fm = FmModulator::new(44100, 250);
        // 176.4 samples per period, 10 full periods
        fm.leader(&mut out, 1764);
        let pcm = out.finish(44100);
        assert_eq!(pcm.len(), 1764);
        assert_eq!(transitions(pcm.samples(), -100), 10);
    }

    #[test]
    fn test_tail_holds_level() {
        let mut out = SampleWriter::with_len(1000, LevelMap::new(100, false));
        let mut fm = FmModulator::new(44100, 500);
        let clock = BitClock::new(0, fm.period);
        fm.bit(&mut out, &clock, 0, false);
        fm.tail(&mut out, 200);
        let pcm = out.finish(44100);
        assert_eq!(pcm.len(), 288);
        assert!(pcm.samples()[88..].iter().all(|&s| s == 100));
    }
}
