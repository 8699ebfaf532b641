//! Cassette-tape audio encoder and player
//!
//! Turns an arbitrary byte payload (a tape image) into a mono 16-bit PCM
//! waveform using one of two classic data-over-audio schemes:
//! - FM / Kansas-City style self-clocking square wave at 250 or 500 baud
//! - Two-tone FSK at 1500 baud
//!
//! The waveform can then be streamed to a primary audio output and an
//! optional monitor output through [`DualRoutePlayer`].

pub mod error;
pub mod config;
pub mod pcm;
pub mod bits;
mod fm;
mod fsk;
pub mod encoder;
pub mod device;
pub mod player;

#[cfg(feature = "cpal")]
pub mod cpal_backend;

pub use config::{BitOrder, EncodingConfig, FskPhase, ModulationMode, PlaybackConfig};
pub use device::{
    rank_devices, select_routes, DeviceKind, OutputDevice, RouteDescriptor, RoutePreference,
    RouteReport, RouteSelection,
};
pub use encoder::{generate, spawn_generate, GenerationTask, WaveformEncoder};
pub use error::{Result, TapecastError};
pub use pcm::PcmBuffer;
pub use player::{
    AudioBackend, AudioSink, DualRoutePlayer, PlaybackObserver, PlaybackOutcome, Session,
    SessionState, SinkSpec,
};

#[cfg(feature = "cpal")]
pub use cpal_backend::CpalBackend;

// Encoding defaults
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_LEADER_MS: u32 = 1500;
pub const DEFAULT_TAIL_MS: u32 = 300;
pub const DEFAULT_AMPLITUDE: f32 = 0.9;

// Amplitude is clamped into this range before quantization
pub const MIN_AMPLITUDE: f32 = 0.05;
pub const MAX_AMPLITUDE: f32 = 1.0;
pub const FULL_SCALE: f32 = 32767.0;

// FSK tone pair (1500 baud)
pub const FSK_LOW_TONE_HZ: f64 = 1320.0; // bit 0, leader, tail
pub const FSK_HIGH_TONE_HZ: f64 = 2680.0; // bit 1

// Progress reporting
pub const PROGRESS_INTERVAL_BITS: usize = 512;
pub const MAX_INTERMEDIATE_PROGRESS: f32 = 0.95;

// Playback defaults
pub const DEFAULT_MONITOR_VOLUME: f32 = 0.35;
pub const PLAYBACK_CHUNK_SAMPLES: usize = 4096;
pub const ROUTE_REPORT_INTERVAL_CHUNKS: usize = 20;
pub const SINK_HEADROOM_MULTIPLE: u32 = 4;

/// Label reported for a route that is absent or cannot be resolved
pub const ROUTE_PLACEHOLDER: &str = "—";
