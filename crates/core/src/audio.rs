//! PCM16 Audio Helpers
//!
//! Little-endian signed 16-bit mono PCM is the only audio format that crosses
//! the session boundary. Chunks are forwarded untouched; these helpers only
//! inspect them (for utterance detection) or synthesize silence.

use base64::Engine;
use std::time::Duration;

/// Sample rate the browser client captures microphone audio at.
pub const CLIENT_INPUT_SAMPLE_RATE: u32 = 16_000;
/// MIME type prefix identifying PCM payloads on the wire and in agent events.
pub const PCM_MIME_PREFIX: &str = "audio/pcm";

/// Interprets a byte slice as little-endian i16 samples.
///
/// A trailing odd byte cannot form a sample and is ignored.
pub fn pcm16_samples(bytes: &[u8]) -> impl Iterator<Item = i16> + '_ {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
}

/// Returns the largest absolute sample value in the chunk, or 0 when empty.
pub fn peak_amplitude(bytes: &[u8]) -> u16 {
    pcm16_samples(bytes)
        .map(|s| s.unsigned_abs())
        .max()
        .unwrap_or(0)
}

/// Produces `duration` worth of PCM16 digital silence at `sample_rate`.
pub fn silence(duration: Duration, sample_rate: u32) -> Vec<u8> {
    let samples = (sample_rate as u128 * duration.as_micros() / 1_000_000) as usize;
    vec![0u8; samples * 2]
}

/// Encodes raw bytes as standard base64, the wire form of audio payloads.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes a standard base64 string into raw bytes.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_samples(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_pcm16_samples_little_endian() {
        // 16384 = 0x4000 -> [0x00, 0x40]
        let samples: Vec<i16> = pcm16_samples(&[0x00, 0x40, 0x00, 0x80]).collect();
        assert_eq!(samples, vec![16384, -32768]);
    }

    #[test]
    fn test_pcm16_samples_ignores_trailing_byte() {
        let samples: Vec<i16> = pcm16_samples(&[0x01, 0x00, 0x7f]).collect();
        assert_eq!(samples, vec![1]);
        assert_eq!(pcm16_samples(&[0x00]).count(), 0);
    }

    #[test]
    fn test_peak_amplitude() {
        assert_eq!(peak_amplitude(&[]), 0);
        assert_eq!(peak_amplitude(&encode_samples(&[10, -600, 300])), 600);
        // i16::MIN has no positive counterpart in i16, unsigned_abs handles it.
        assert_eq!(peak_amplitude(&encode_samples(&[i16::MIN])), 32768);
    }

    #[test]
    fn test_silence_length() {
        // 10ms at 16kHz is 160 samples, 320 bytes.
        let buf = silence(Duration::from_millis(10), CLIENT_INPUT_SAMPLE_RATE);
        assert_eq!(buf.len(), 320);
        assert!(buf.iter().all(|b| *b == 0));
        assert_eq!(peak_amplitude(&buf), 0);
    }

    #[test]
    fn test_base64_preserves_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let decoded = decode_base64(&encode_base64(&bytes)).unwrap();
        assert_eq!(decoded, bytes);
        assert!(decode_base64("not base64!").is_err());
    }
}
