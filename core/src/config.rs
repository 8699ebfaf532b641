use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TapecastError};
use crate::{
    DEFAULT_AMPLITUDE, DEFAULT_LEADER_MS, DEFAULT_MONITOR_VOLUME, DEFAULT_SAMPLE_RATE,
    DEFAULT_TAIL_MS, FULL_SCALE, MAX_AMPLITUDE, MIN_AMPLITUDE, PLAYBACK_CHUNK_SAMPLES,
    ROUTE_REPORT_INTERVAL_CHUNKS,
};

/// Modulation scheme and bit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModulationMode {
    /// FM / Kansas-City at 250 baud
    Fm250,
    /// FM / Kansas-City at 500 baud
    #[default]
    Fm500,
    /// Two-tone FSK at 1500 baud
    Fsk1500,
}

impl ModulationMode {
    pub fn baud(self) -> u32 {
        match self {
            ModulationMode::Fm250 => 250,
            ModulationMode::Fm500 => 500,
            ModulationMode::Fsk1500 => 1500,
        }
    }

    pub fn is_fm(self) -> bool {
        matches!(self, ModulationMode::Fm250 | ModulationMode::Fm500)
    }
}

impl fmt::Display for ModulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModulationMode::Fm250 => write!(f, "250 FM"),
            ModulationMode::Fm500 => write!(f, "500 FM"),
            ModulationMode::Fsk1500 => write!(f, "1500 FSK"),
        }
    }
}

impl FromStr for ModulationMode {
    type Err = TapecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fm250" | "250" => Ok(ModulationMode::Fm250),
            "fm500" | "500" => Ok(ModulationMode::Fm500),
            "fsk1500" | "fsk" | "1500" => Ok(ModulationMode::Fsk1500),
            other => Err(TapecastError::InvalidConfig(format!(
                "unknown mode '{}' (expected fm250, fm500 or fsk1500)",
                other
            ))),
        }
    }
}

/// Order in which the 8 bits of each payload byte are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

impl fmt::Display for BitOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitOrder::MsbFirst => write!(f, "MSB→LSB"),
            BitOrder::LsbFirst => write!(f, "LSB→MSB"),
        }
    }
}

impl FromStr for BitOrder {
    type Err = TapecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "msb" | "msb-first" => Ok(BitOrder::MsbFirst),
            "lsb" | "lsb-first" => Ok(BitOrder::LsbFirst),
            other => Err(TapecastError::InvalidConfig(format!(
                "unknown bit order '{}' (expected msb or lsb)",
                other
            ))),
        }
    }
}

/// Phase policy of the FSK square-wave synthesizer
///
/// `ResetPerBit` restarts phase and level at every synthesis call (one call
/// per bit, one for the leader, one for the tail). `Continuous` carries both
/// across calls so the waveform has no discontinuity at bit edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FskPhase {
    #[default]
    ResetPerBit,
    Continuous,
}

impl fmt::Display for FskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FskPhase::ResetPerBit => write!(f, "reset"),
            FskPhase::Continuous => write!(f, "continuous"),
        }
    }
}

impl FromStr for FskPhase {
    type Err = TapecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(FskPhase::ResetPerBit),
            "continuous" => Ok(FskPhase::Continuous),
            other => Err(TapecastError::InvalidConfig(format!(
                "unknown FSK phase policy '{}' (expected reset or continuous)",
                other
            ))),
        }
    }
}

/// Waveform generation parameters. Treated as immutable once generation starts.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingConfig {
    pub sample_rate: u32,
    /// Normalized gain, clamped to [0.05, 1.0] at quantization time
    pub amplitude: f32,
    pub invert: bool,
    pub leader_ms: u32,
    pub tail_ms: u32,
    pub bit_order: BitOrder,
    pub mode: ModulationMode,
    pub fsk_phase: FskPhase,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            amplitude: DEFAULT_AMPLITUDE,
            invert: false,
            leader_ms: DEFAULT_LEADER_MS,
            tail_ms: DEFAULT_TAIL_MS,
            bit_order: BitOrder::MsbFirst,
            mode: ModulationMode::Fm500,
            fsk_phase: FskPhase::ResetPerBit,
        }
    }
}

impl EncodingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(TapecastError::InvalidInput(
                "sample rate must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Peak sample value after clamping the amplitude
    pub fn peak(&self) -> i16 {
        let amplitude = if self.amplitude.is_nan() {
            MIN_AMPLITUDE
        } else {
            self.amplitude.clamp(MIN_AMPLITUDE, MAX_AMPLITUDE)
        };
        (amplitude * FULL_SCALE).round() as i16
    }

    pub fn leader_samples(&self) -> usize {
        ms_to_samples(self.leader_ms, self.sample_rate)
    }

    pub fn tail_samples(&self) -> usize {
        ms_to_samples(self.tail_ms, self.sample_rate)
    }

    /// Real-valued bit period in samples
    pub fn samples_per_bit(&self) -> f64 {
        self.sample_rate as f64 / self.mode.baud() as f64
    }

    /// Number of data samples for `num_bits` bits
    ///
    /// Bit boundaries sit at `round(k * samples_per_bit)`, so the data
    /// section is exactly `round(num_bits * samples_per_bit)` samples long.
    pub fn data_samples(&self, num_bits: usize) -> usize {
        (num_bits as f64 * self.samples_per_bit()).round() as usize
    }

    /// Exact length of the buffer produced for a payload of `payload_len` bytes
    pub fn expected_len(&self, payload_len: usize) -> usize {
        self.leader_samples() + self.data_samples(payload_len * 8) + self.tail_samples()
    }
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as f64 / 1000.0 * sample_rate as f64).round() as usize
}

/// Playback parameters for [`crate::DualRoutePlayer`]
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    /// Mirror the stream to a second (monitor) output when one is available
    pub mirror_to_secondary: bool,
    /// Gain of the monitor output in [0, 1]; the primary is always full scale
    pub secondary_volume: f32,
    pub chunk_samples: usize,
    /// Re-report the bound routes every N chunks
    pub route_report_interval: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            mirror_to_secondary: false,
            secondary_volume: DEFAULT_MONITOR_VOLUME,
            chunk_samples: PLAYBACK_CHUNK_SAMPLES,
            route_report_interval: ROUTE_REPORT_INTERVAL_CHUNKS,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(TapecastError::InvalidInput(
                "sample rate must be positive".into(),
            ));
        }
        if self.chunk_samples == 0 {
            return Err(TapecastError::InvalidConfig(
                "chunk size must be at least one sample".into(),
            ));
        }
        if self.route_report_interval == 0 {
            return Err(TapecastError::InvalidConfig(
                "route report interval must be at least one chunk".into(),
            ));
        }
        Ok(())
    }

    pub fn secondary_gain(&self) -> f32 {
        if self.secondary_volume.is_nan() {
            0.0
        } else {
            self.secondary_volume.clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_player_app() {
        let config = EncodingConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.leader_ms, 1500);
        assert_eq!(config.tail_ms, 300);
        assert_eq!(config.mode, ModulationMode::Fm500);
        assert_eq!(config.bit_order, BitOrder::MsbFirst);
        assert!(!config.invert);
    }

    #[test]
    fn test_peak_is_clamped() {
        let mut config = EncodingConfig::default();
        config.amplitude = 1.0;
        assert_eq!(config.peak(), 32767);
        config.amplitude = 4.0;
        assert_eq!(config.peak(), 32767);
        config.amplitude = 0.0;
        assert_eq!(config.peak(), (0.05f32 * 32767.0).round() as i16);
        config.amplitude = f32::NAN;
        assert_eq!(config.peak(), (0.05f32 * 32767.0).round() as i16);
        config.amplitude = 0.5;
        assert_eq!(config.peak(), 16384);
    }

    #[test]
    fn test_leader_and_tail_rounding() {
        let config = EncodingConfig {
            sample_rate: 44100,
            leader_ms: 1500,
            tail_ms: 333,
            ..Default::default()
        };
        assert_eq!(config.leader_samples(), 66150);
        // 0.333 * 44100 = 14685.3
        assert_eq!(config.tail_samples(), 14685);
    }

    #[test]
    fn test_expected_len_fm500() {
        let config = EncodingConfig {
            sample_rate: 44100,
            leader_ms: 0,
            tail_ms: 0,
            ..Default::default()
        };
        // 24 bits * 88.2 = 2116.8
        assert_eq!(config.expected_len(3), 2117);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let config = EncodingConfig {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TapecastError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("fm250".parse::<ModulationMode>().unwrap(), ModulationMode::Fm250);
        assert_eq!("FM500".parse::<ModulationMode>().unwrap(), ModulationMode::Fm500);
        assert_eq!("1500".parse::<ModulationMode>().unwrap(), ModulationMode::Fsk1500);
        assert!("fm1200".parse::<ModulationMode>().is_err());
        assert_eq!("lsb".parse::<BitOrder>().unwrap(), BitOrder::LsbFirst);
        assert_eq!("continuous".parse::<FskPhase>().unwrap(), FskPhase::Continuous);
    }

    #[test]
    fn test_secondary_gain_clamped() {
        let mut config = PlaybackConfig::default();
        assert!((config.secondary_gain() - 0.35).abs() < 1e-6);
        config.secondary_volume = 1.5;
        assert_eq!(config.secondary_gain(), 1.0);
        config.secondary_volume = -0.5;
        assert_eq!(config.secondary_gain(), 0.0);
    }

    #[test]
    fn test_playback_config_validation() {
        let config = PlaybackConfig {
            chunk_samples: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(PlaybackConfig::default().validate().is_ok());
    }
}
