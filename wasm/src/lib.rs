use js_sys::{Function, Int16Array};
use tapecast_core::{BitOrder, EncodingConfig, FskPhase, ModulationMode, WaveformEncoder};
use wasm_bindgen::prelude::*;

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[wasm_bindgen]
pub struct WasmEncoder {
    inner: WaveformEncoder,
}

#[wasm_bindgen]
impl WasmEncoder {
    /// `mode` is one of "fm250", "fm500", "fsk1500"
    #[wasm_bindgen(constructor)]
    pub fn new(
        mode: &str,
        sample_rate: u32,
        amplitude: f32,
        invert: bool,
        leader_ms: u32,
        tail_ms: u32,
        lsb_first: bool,
    ) -> Result<WasmEncoder, JsValue> {
        let config = EncodingConfig {
            sample_rate,
            amplitude,
            invert,
            leader_ms,
            tail_ms,
            bit_order: if lsb_first {
                BitOrder::LsbFirst
            } else {
                BitOrder::MsbFirst
            },
            mode: mode.parse::<ModulationMode>().map_err(to_js)?,
            fsk_phase: FskPhase::default(),
        };
        WaveformEncoder::new(config)
            .map(|inner| WasmEncoder { inner })
            .map_err(to_js)
    }

    /// Encode a tape image
    /// Takes a Uint8Array and returns an Int16Array of mono PCM samples
    #[wasm_bindgen]
    pub fn encode(&self, data: &[u8]) -> Result<Int16Array, JsValue> {
        let pcm = self.inner.encode(data).map_err(to_js)?;
        Ok(Int16Array::from(pcm.samples()))
    }

    /// Like `encode`, calling `callback(progress)` with values in [0, 1]
    #[wasm_bindgen(js_name = encodeWithProgress)]
    pub fn encode_with_progress(&self, data: &[u8], callback: &Function) -> Result<Int16Array, JsValue> {
        let pcm = self
            .inner
            .encode_with_progress(data, |p| {
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_f64(p as f64));
            })
            .map_err(to_js)?;
        Ok(Int16Array::from(pcm.samples()))
    }

    /// Number of samples `encode` produces for `payload_len` bytes
    #[wasm_bindgen(js_name = expectedLen)]
    pub fn expected_len(&self, payload_len: usize) -> usize {
        self.inner.expected_len(payload_len)
    }

    #[wasm_bindgen(getter, js_name = sampleRate)]
    pub fn sample_rate(&self) -> u32 {
        self.inner.config().sample_rate
    }
}
