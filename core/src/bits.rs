use crate::config::BitOrder;

/// Bits of a single byte in emission order
pub fn byte_bits(byte: u8, order: BitOrder) -> impl Iterator<Item = bool> {
    (0..8u8).map(move |i| {
        let index = match order {
            BitOrder::MsbFirst => 7 - i,
            BitOrder::LsbFirst => i,
        };
        (byte >> index) & 1 == 1
    })
}

/// Bits of a whole payload in emission order
pub fn payload_bits(payload: &[u8], order: BitOrder) -> impl Iterator<Item = bool> + '_ {
    payload.iter().flat_map(move |&byte| byte_bits(byte, order))
}

/// Sample positions of bit boundaries
///
/// Boundaries are computed from the bit index against a real-valued period
/// and rounded once, so rounding never accumulates over long payloads.
#[derive(Debug, Clone, Copy)]
pub struct BitClock {
    origin: usize,
    period: f64,
}

impl BitClock {
    pub fn new(origin: usize, period: f64) -> Self {
        Self { origin, period }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// First sample of bit `k` (equivalently, one past the last sample of bit `k - 1`)
    pub fn boundary(&self, k: usize) -> usize {
        self.origin + (k as f64 * self.period).round() as usize
    }

    /// Sample at which the half-period mark of bit `k` falls
    pub fn midpoint(&self, k: usize) -> usize {
        self.origin + ((k as f64 + 0.5) * self.period).round() as usize
    }
}
