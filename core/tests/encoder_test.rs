// ============================================================================
// WAVEFORM ENCODER TESTS
// ============================================================================
// These tests inspect the generated waveform directly: buffer length against
// the sample-count formulas, level transitions per bit window for FM, and
// transition counts (zero crossings) for FSK tones.
// ============================================================================

use rand::Rng;
use tapecast_core::{
    generate, spawn_generate, BitOrder, EncodingConfig, FskPhase, ModulationMode, TapecastError,
    FSK_HIGH_TONE_HZ, FSK_LOW_TONE_HZ,
};

fn bare_config(mode: ModulationMode, sample_rate: u32) -> EncodingConfig {
    EncodingConfig {
        sample_rate,
        mode,
        leader_ms: 0,
        tail_ms: 0,
        amplitude: 1.0,
        invert: false,
        bit_order: BitOrder::MsbFirst,
        fsk_phase: FskPhase::ResetPerBit,
    }
}

/// Sample index where bit `k` starts, computed independently of the encoder
fn bit_start(origin: usize, sample_rate: u32, baud: u32, k: usize) -> usize {
    origin + (k as f64 * sample_rate as f64 / baud as f64).round() as usize
}

/// Level changes inside `window`, including a change at its first sample
fn toggles_in(samples: &[i16], window: std::ops::Range<usize>, initial: i16) -> usize {
    let mut previous = if window.start == 0 {
        initial
    } else {
        samples[window.start - 1]
    };
    let mut count = 0;
    for &s in &samples[window] {
        if s != previous {
            count += 1;
        }
        previous = s;
    }
    count
}

fn transitions(samples: &[i16]) -> usize {
    samples.windows(2).filter(|w| w[0] != w[1]).count()
}

/// Recover FM bits by counting toggles per bit window (1 toggle = 0, 2 = 1)
fn fm_bits(samples: &[i16], config: &EncodingConfig, num_bits: usize) -> Vec<bool> {
    let baud = config.mode.baud();
    let origin = config.leader_samples();
    (0..num_bits)
        .map(|k| {
            let window = bit_start(origin, config.sample_rate, baud, k)
                ..bit_start(origin, config.sample_rate, baud, k + 1);
            let toggles = toggles_in(samples, window, -config.peak());
            assert!(toggles == 1 || toggles == 2, "bit {} has {} toggles", k, toggles);
            toggles == 2
        })
        .collect()
}

#[test]
fn test_fm500_three_byte_scenario() {
    let config = bare_config(ModulationMode::Fm500, 44100);
    let payload = [0x00, 0xFF, 0xA5];

    let pcm = generate(&payload, &config, |_| {}).expect("Failed to encode");

    // round(44100/500) * 24 = 2112, within one sample per bit
    let nominal = (44100.0f64 / 500.0).round() as i64 * 24;
    assert!((pcm.len() as i64 - nominal).abs() <= 24, "got {} samples", pcm.len());
    assert_eq!(pcm.len(), 2117);

    let samples = pcm.samples();
    let window = |k| bit_start(0, 44100, 500, k)..bit_start(0, 44100, 500, k + 1);

    // First bit of 0x00 is a 0: only the clock transition
    assert_eq!(toggles_in(samples, window(0), -32767), 1);
    // First bit of 0xFF is a 1: clock and data transitions
    assert_eq!(toggles_in(samples, window(8), -32767), 2);

    let bits = fm_bits(samples, &config, 24);
    let expected: Vec<bool> = payload
        .iter()
        .flat_map(|&b| (0..8).rev().map(move |i| (b >> i) & 1 == 1))
        .collect();
    assert_eq!(bits, expected);
}

#[test]
fn test_fm250_with_leader_and_tail() {
    let config = EncodingConfig {
        leader_ms: 200,
        tail_ms: 100,
        ..bare_config(ModulationMode::Fm250, 48000)
    };
    let payload = b"\x55\xAA";
    let pcm = generate(payload, &config, |_| {}).expect("Failed to encode");

    assert_eq!(config.leader_samples(), 9600);
    assert_eq!(config.tail_samples(), 4800);
    assert_eq!(pcm.len(), 9600 + 16 * 192 + 4800);

    let samples = pcm.samples();

    // Leader: 9600 / 192 = 50 clock periods, one toggle each
    assert_eq!(toggles_in(samples, 0..9600, -config.peak()), 50);

    let bits = fm_bits(samples, &config, 16);
    assert_eq!(
        bits,
        vec![
            false, true, false, true, false, true, false, true, true, false, true, false, true,
            false, true, false
        ]
    );

    // Tail is a flat hold of the last level
    let tail = &samples[samples.len() - 4800..];
    assert!(tail.iter().all(|&s| s == tail[0]));
    assert_eq!(tail[0], samples[samples.len() - 4801]);
}

#[test]
fn test_bit_order_is_a_true_reversal() {
    let byte = [0b1011_0000u8];
    let msb_config = bare_config(ModulationMode::Fm500, 44100);
    let lsb_config = EncodingConfig {
        bit_order: BitOrder::LsbFirst,
        ..msb_config.clone()
    };

    let msb = generate(&byte, &msb_config, |_| {}).unwrap();
    let lsb = generate(&byte, &lsb_config, |_| {}).unwrap();

    let msb_bits = fm_bits(msb.samples(), &msb_config, 8);
    let mut lsb_bits = fm_bits(lsb.samples(), &lsb_config, 8);
    assert_eq!(msb_bits, vec![true, false, true, true, false, false, false, false]);

    lsb_bits.reverse();
    assert_eq!(msb_bits, lsb_bits);
}

#[test]
fn test_fsk_bit_windows_carry_the_right_tone() {
    // 96000 / 1500 = 64 samples per bit: the low tone toggles once per bit,
    // the high tone three times.
    let config = bare_config(ModulationMode::Fsk1500, 96000);
    let mut rng = rand::thread_rng();
    let payload: Vec<u8> = (0..32).map(|_| rng.gen()).collect();

    let pcm = generate(&payload, &config, |_| {}).expect("Failed to encode");
    assert_eq!(pcm.len(), payload.len() * 8 * 64);

    let decoded: Vec<bool> = pcm
        .samples()
        .chunks(64)
        .map(|window| transitions(window) >= 2)
        .collect();
    let expected: Vec<bool> = payload
        .iter()
        .flat_map(|&b| (0..8).rev().map(move |i| (b >> i) & 1 == 1))
        .collect();
    assert_eq!(decoded, expected);
}

#[test]
fn test_fsk_zero_crossings_match_tones() {
    for (byte, freq) in [(0x00u8, FSK_LOW_TONE_HZ), (0xFF, FSK_HIGH_TONE_HZ)] {
        let config = EncodingConfig {
            fsk_phase: FskPhase::Continuous,
            ..bare_config(ModulationMode::Fsk1500, 96000)
        };
        let payload = vec![byte; 50];
        let pcm = generate(&payload, &config, |_| {}).unwrap();

        let seconds = (payload.len() * 8) as f64 / 1500.0;
        let expected = 2.0 * freq * seconds;
        let actual = transitions(pcm.samples()) as f64;
        assert!(
            (actual - expected).abs() <= 3.0,
            "byte {:#04x}: expected ~{:.1} transitions, got {}",
            byte,
            expected,
            actual
        );
    }
}

#[test]
fn test_fsk_leader_and_tail_use_low_tone() {
    let config = EncodingConfig {
        leader_ms: 1000,
        tail_ms: 500,
        ..bare_config(ModulationMode::Fsk1500, 44100)
    };
    let pcm = generate(&[0xFF], &config, |_| {}).unwrap();
    let samples = pcm.samples();

    let leader = &samples[..44100];
    let tail = &samples[samples.len() - 22050..];
    let leader_toggles = transitions(leader) as f64;
    let tail_toggles = transitions(tail) as f64;

    assert!((leader_toggles - 2.0 * FSK_LOW_TONE_HZ).abs() <= 2.0, "leader {}", leader_toggles);
    assert!((tail_toggles - FSK_LOW_TONE_HZ).abs() <= 2.0, "tail {}", tail_toggles);
}

#[test]
fn test_length_matches_formula_for_random_configs() {
    let mut rng = rand::thread_rng();
    let modes = [ModulationMode::Fm250, ModulationMode::Fm500, ModulationMode::Fsk1500];
    let rates = [22050u32, 44100, 48000, 96000];

    for _ in 0..20 {
        let config = EncodingConfig {
            sample_rate: rates[rng.gen_range(0..rates.len())],
            mode: modes[rng.gen_range(0..modes.len())],
            leader_ms: rng.gen_range(0..2000),
            tail_ms: rng.gen_range(0..1000),
            amplitude: rng.gen_range(0.0..1.5),
            ..Default::default()
        };
        let payload: Vec<u8> = (0..rng.gen_range(1..64)).map(|_| rng.gen()).collect();

        let pcm = generate(&payload, &config, |_| {}).expect("Failed to encode");

        let leader = (config.leader_ms as f64 / 1000.0 * config.sample_rate as f64).round() as usize;
        let tail = (config.tail_ms as f64 / 1000.0 * config.sample_rate as f64).round() as usize;
        let data = (payload.len() as f64 * 8.0 * config.sample_rate as f64 / config.mode.baud() as f64)
            .round() as usize;
        assert_eq!(pcm.len(), leader + data + tail, "config {:?}", config);
        assert_eq!(pcm.sample_rate(), config.sample_rate);
    }
}

#[test]
fn test_inversion_negates_both_modes() {
    for mode in [ModulationMode::Fm500, ModulationMode::Fsk1500] {
        let normal = EncodingConfig {
            mode,
            amplitude: 0.5,
            ..Default::default()
        };
        let inverted = EncodingConfig {
            invert: true,
            ..normal.clone()
        };
        let a = generate(b"TRS-80", &normal, |_| {}).unwrap();
        let b = generate(b"TRS-80", &inverted, |_| {}).unwrap();

        assert_eq!(a.len(), b.len());
        assert!(a.samples().iter().zip(b.samples()).all(|(&x, &y)| x == -y), "mode {}", mode);
        assert!(a.samples().iter().all(|&s| s.abs() == 16384));
    }
}

#[test]
fn test_progress_is_monotonic_and_ends_at_one() {
    for mode in [ModulationMode::Fm250, ModulationMode::Fsk1500] {
        let config = bare_config(mode, 22050);
        let payload = vec![0xA5u8; 1000];
        let mut events = Vec::new();
        generate(&payload, &config, |p| events.push(p)).unwrap();

        assert!(events.len() > 10, "progress fired only {} times", events.len());
        assert!(events.windows(2).all(|w| w[0] <= w[1]), "mode {}", mode);
        assert_eq!(*events.last().unwrap(), 1.0);
        assert_eq!(events.iter().filter(|&&p| p >= 1.0).count(), 1);
        assert!(events[..events.len() - 1].iter().all(|&p| p <= 0.95));
    }
}

#[test]
fn test_invalid_input_is_rejected() {
    let result = generate(&[], &EncodingConfig::default(), |_| {});
    assert!(matches!(result, Err(TapecastError::InvalidInput(_))));

    let config = EncodingConfig {
        sample_rate: 0,
        ..Default::default()
    };
    let result = generate(b"data", &config, |_| {});
    assert!(matches!(result, Err(TapecastError::InvalidInput(_))));
}

#[test]
fn test_generation_on_worker_thread() {
    let (tx, rx) = std::sync::mpsc::channel();
    let config = EncodingConfig {
        mode: ModulationMode::Fsk1500,
        ..Default::default()
    };
    let task = spawn_generate(vec![0x42; 200], config.clone(), move |p| {
        let _ = tx.send(p);
    })
    .expect("Failed to spawn encoder");

    let pcm = task.join().expect("Generation failed");
    assert_eq!(pcm.len(), config.expected_len(200));

    let events: Vec<f32> = rx.try_iter().collect();
    assert_eq!(events.last().copied(), Some(1.0));
}
