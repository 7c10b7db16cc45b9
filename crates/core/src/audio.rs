//! Client audio buffering and the transport encoding used for audio payloads.

use base64::Engine;
use bytes::Bytes;

// The upstream speaks little-endian PCM16 mono at 24kHz in both directions.
const REALTIME_PCM16_SAMPLE_RATE: usize = 24_000;
const PCM16_BYTES_PER_SAMPLE: usize = 2;

/// Buffered bytes at which a chunk is released upstream: 100ms of audio, 4800 bytes.
pub const FLUSH_THRESHOLD_BYTES: usize = REALTIME_PCM16_SAMPLE_RATE / 10 * PCM16_BYTES_PER_SAMPLE;

/// Smallest chunk the upstream accepts.
///
/// [`AudioPacer`] does not enforce this. Callers flushing a partial buffer on a
/// manual commit are responsible for respecting it.
pub const MIN_CHUNK_BYTES: usize = 2400;

/// Accumulates raw client audio and decides when a chunk should go upstream.
///
/// A flush always releases the whole buffer, never a threshold-sized slice, so
/// the buffer is empty after every flush.
#[derive(Debug)]
pub struct AudioPacer {
    buffer: Vec<u8>,
    threshold: usize,
}

impl Default for AudioPacer {
    fn default() -> Self {
        Self::new(FLUSH_THRESHOLD_BYTES)
    }
}

impl AudioPacer {
    /// Creates a pacer releasing chunks once `threshold` bytes are buffered.
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Appends client audio.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// True once the buffered length has reached the threshold (inclusive).
    pub fn should_flush(&self) -> bool {
        self.buffer.len() >= self.threshold
    }

    /// Takes the entire buffered content, leaving the buffer empty.
    pub fn flush(&mut self) -> Bytes {
        Bytes::from(std::mem::take(&mut self.buffer))
    }

    /// Takes whatever is buffered, if anything, regardless of the threshold.
    pub fn take_remaining(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.flush())
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

/// Encodes raw audio bytes for an `input_audio_buffer.append` payload.
pub fn encode_audio(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decodes an audio payload received from the upstream.
pub fn decode_audio(fragment: &str) -> Result<Bytes, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD
        .decode(fragment)
        .map(Bytes::from)
}
