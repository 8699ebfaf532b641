// Audio output using cpal
// Writes block on a bounded queue that the device callback drains

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig, SupportedBufferSize};
use parking_lot::Mutex;

use crate::device::{OutputDevice, RouteDescriptor};
use crate::error::{Result, TapecastError};
use crate::player::{AudioBackend, AudioSink, SinkSpec};
use crate::SINK_HEADROOM_MULTIPLE;

/// Chunks queued ahead of the device callback
const QUEUE_CHUNKS: usize = 2;

/// Outputs of the platform's default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn output_devices(&self) -> Result<Vec<OutputDevice>> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices = host
            .output_devices()
            .map_err(|e| TapecastError::DeviceUnavailable(format!("cannot enumerate outputs: {}", e)))?;

        Ok(devices
            .filter_map(|d| d.name().ok())
            .map(|name| {
                let is_default = default_name.as_deref() == Some(name.as_str());
                OutputDevice::from_name(&name, is_default)
            })
            .collect())
    }

    fn open(&self, target: Option<&OutputDevice>, spec: &SinkSpec) -> Result<Box<dyn AudioSink>> {
        let host = cpal::default_host();

        let device = match target {
            Some(target) => host
                .output_devices()
                .map_err(|e| TapecastError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == target.id).unwrap_or(false))
                .ok_or_else(|| TapecastError::DeviceUnavailable(format!("'{}' is gone", target.id)))?,
            None => host
                .default_output_device()
                .ok_or_else(|| TapecastError::DeviceUnavailable("no output device available".into()))?,
        };

        let sink = CpalSink::open(device, spec)?;
        Ok(Box::new(sink))
    }
}

fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        SampleFormat::U16 => 2,
        _ => 3,
    }
}

/// Stream config at `sample_rate`, preferring i16 then mono
fn choose_config(device: &cpal::Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let rate = SampleRate(sample_rate);
    let mut ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| TapecastError::DeviceUnavailable(format!("cannot query output configs: {}", e)))?
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter(|r| format_rank(r.sample_format()) < 3)
        .collect();
    ranges.sort_by_key(|r| (format_rank(r.sample_format()), r.channels()));

    let range = ranges.into_iter().next().ok_or_else(|| {
        TapecastError::DeviceUnavailable(format!("output does not support {} Hz", sample_rate))
    })?;

    // A few multiples of the minimum, never below 50ms
    let buffer_size = match range.buffer_size() {
        SupportedBufferSize::Range { min, max } if *min > 0 && *max >= *min => {
            let wanted = min.saturating_mul(SINK_HEADROOM_MULTIPLE).max(sample_rate / 20);
            BufferSize::Fixed(wanted.min(*max))
        }
        _ => BufferSize::Default,
    };

    let format = range.sample_format();
    let mut config = range.with_sample_rate(rate).config();
    config.buffer_size = buffer_size;
    Ok((config, format))
}

/// State owned by the device callback
struct Feed {
    receiver: Receiver<Vec<i16>>,
    current: Vec<i16>,
    position: usize,
    pending: Arc<AtomicUsize>,
}

impl Feed {
    fn next_sample(&mut self) -> Option<i16> {
        if self.position >= self.current.len() {
            match self.receiver.try_recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.position = 0;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
        let sample = self.current.get(self.position).copied();
        if sample.is_some() {
            self.position += 1;
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        sample
    }
}

/// Time for the device to play out one buffer it has already taken
fn buffer_latency(buffer_size: &BufferSize, sample_rate: u32) -> Duration {
    let rate = sample_rate.max(1);
    let frames = match buffer_size {
        BufferSize::Fixed(frames) => *frames,
        // Unknown platform buffer; assume a generous 100ms
        BufferSize::Default => rate / 10,
    };
    Duration::from_secs_f64(frames as f64 / rate as f64)
}

pub struct CpalSink {
    device: cpal::Device,
    stream: Stream,
    sender: Option<SyncSender<Vec<i16>>>,
    pending: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<String>>>,
    sample_rate: u32,
    buffer_latency: Duration,
}

impl CpalSink {
    fn open(device: cpal::Device, spec: &SinkSpec) -> Result<Self> {
        let (config, format) = choose_config(&device, spec.sample_rate)?;
        let (sender, receiver) = mpsc::sync_channel(QUEUE_CHUNKS);
        let pending = Arc::new(AtomicUsize::new(0));
        let failure = Arc::new(Mutex::new(None));

        let feed = Feed {
            receiver,
            current: Vec::new(),
            position: 0,
            pending: Arc::clone(&pending),
        };

        let stream = match format {
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, feed, spec.gain, Arc::clone(&failure))?,
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, feed, spec.gain, Arc::clone(&failure))?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, feed, spec.gain, Arc::clone(&failure))?,
            other => {
                return Err(TapecastError::DeviceUnavailable(format!(
                    "unsupported sample format: {:?}",
                    other
                )))
            }
        };

        log::debug!(
            "Opened '{}' at {} Hz, {} channel(s), {:?}, buffer {:?}, gain {:.2}",
            device.name().unwrap_or_default(),
            config.sample_rate.0,
            config.channels,
            format,
            config.buffer_size,
            spec.gain
        );

        Ok(Self {
            device,
            stream,
            sender: Some(sender),
            pending,
            failure,
            sample_rate: spec.sample_rate,
            buffer_latency: buffer_latency(&config.buffer_size, config.sample_rate.0),
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut feed: Feed,
        gain: f32,
        failure: Arc<Mutex<Option<String>>>,
    ) -> Result<Stream> {
        let channels = config.channels.max(1) as usize;
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // Mono source duplicated into every channel of the frame
                    for frame in data.chunks_mut(channels) {
                        let value = feed
                            .next_sample()
                            .map(|s| s as f32 / 32768.0 * gain)
                            .unwrap_or(0.0);
                        for out in frame.iter_mut() {
                            *out = T::from_sample(value);
                        }
                    }
                },
                move |err| {
                    log::error!("Audio output error: {}", err);
                    *failure.lock() = Some(err.to_string());
                },
                None,
            )
            .map_err(|e| TapecastError::DeviceUnavailable(format!("failed to build output stream: {}", e)))
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(TapecastError::HardwareWriteFailure(message.clone())),
            None => Ok(()),
        }
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| TapecastError::DeviceUnavailable(format!("failed to start stream: {}", e)))
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        self.check_failure()?;
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| TapecastError::HardwareWriteFailure("output already stopped".into()))?;

        self.pending.fetch_add(samples.len(), Ordering::SeqCst);
        sender
            .send(samples.to_vec())
            .map_err(|_| TapecastError::HardwareWriteFailure("output stream closed".into()))
    }

    fn routed_device(&self) -> Option<RouteDescriptor> {
        self.device
            .name()
            .ok()
            .map(|name| OutputDevice::from_name(&name, false).route())
    }

    fn drain(&mut self) {
        let queued = self.pending.load(Ordering::SeqCst);
        let budget = Duration::from_secs_f64(queued as f64 / self.sample_rate.max(1) as f64);
        let deadline = Instant::now() + budget + Duration::from_millis(500);

        while self.pending.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            if self.check_failure().is_err() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        // The callback has handed every sample to the device; let the last
        // device buffer play before the stream is paused.
        if self.pending.load(Ordering::SeqCst) == 0 && self.check_failure().is_ok() {
            std::thread::sleep(self.buffer_latency);
        }
    }

    fn stop(&mut self) {
        self.sender = None;
        if let Err(e) = self.stream.pause() {
            log::debug!("Pausing output stream failed: {}", e);
        }
    }
}
