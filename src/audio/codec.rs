//! PCM16 ⇄ float conversion and base64 transport encoding.

use super::AudioBuffer;
use crate::error::{PolarisError, Result};
use crate::types::Blob;
use base64::Engine as _;

/// Scale between the signed 16-bit domain and `[-1.0, 1.0)`.
const PCM16_SCALE: f32 = i16::MAX as f32 + 1.0;

pub fn decode_base64_bytes(b64: &str) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(b64)?)
}

/// Reinterprets interleaved little-endian PCM16 bytes as one float vector per
/// channel. No resampling or filtering.
pub fn decode_pcm_audio(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<AudioBuffer> {
    if channel_count == 0 {
        return Err(PolarisError::MalformedAudio(
            "channel count must be at least 1".to_string(),
        ));
    }
    let channels = channel_count as usize;
    let frame_bytes = 2 * channels;
    if bytes.len() % frame_bytes != 0 {
        return Err(PolarisError::MalformedAudio(format!(
            "{} bytes is not a whole number of {}-channel PCM16 frames",
            bytes.len(),
            channel_count
        )));
    }

    let frames = bytes.len() / frame_bytes;
    let mut data = vec![Vec::with_capacity(frames); channels];
    for (i, sample) in bytes.chunks_exact(2).enumerate() {
        let value = i16::from_le_bytes([sample[0], sample[1]]);
        data[i % channels].push(value as f32 / PCM16_SCALE);
    }

    Ok(AudioBuffer {
        sample_rate,
        channels: data,
    })
}

/// Convenience for payloads that arrive base64-encoded.
pub fn decode_base64_pcm(b64: &str, sample_rate: u32, channel_count: u16) -> Result<AudioBuffer> {
    let bytes = decode_base64_bytes(b64)?;
    decode_pcm_audio(&bytes, sample_rate, channel_count)
}

/// Rescales float samples to PCM16, clamping out-of-range values, and returns
/// the little-endian bytes base64-encoded. Each call stands alone.
pub fn encode_pcm_chunk(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(&bytes)
}

/// Wraps an encoded capture frame in the blob shape the Live API accepts.
pub fn pcm_blob(samples: &[f32], sample_rate: u32) -> Blob {
    Blob {
        mime_type: format!("audio/pcm;rate={}", sample_rate),
        data: encode_pcm_chunk(samples),
    }
}

/// Sample rate advertised in an `audio/pcm;rate=N` MIME type.
pub fn pcm_rate_from_mime(mime_type: &str) -> Option<u32> {
    if !mime_type.starts_with("audio/pcm") {
        return None;
    }
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}

fn float_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * PCM16_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(matches!(
            decode_base64_bytes("not*base64"),
            Err(PolarisError::Decode(_))
        ));
        assert!(matches!(
            decode_base64_bytes("QUJD="),
            Err(PolarisError::Decode(_))
        ));
        assert_eq!(decode_base64_bytes("QUJD").unwrap(), b"ABC");
    }

    #[test]
    fn test_decode_mono_rescales_to_unit_range() {
        let bytes = pcm_bytes(&[0, 16384, -32768, 32767]);
        let buffer = decode_pcm_audio(&bytes, 24000, 1).unwrap();
        assert_eq!(buffer.frames(), 4);
        let ch = &buffer.channels[0];
        assert_eq!(ch[0], 0.0);
        assert_eq!(ch[1], 0.5);
        assert_eq!(ch[2], -1.0);
        assert!(ch[3] < 1.0 && ch[3] > 0.9999);
    }

    #[test]
    fn test_decode_stereo_deinterleaves() {
        let bytes = pcm_bytes(&[100, -100, 200, -200, 300, -300]);
        let buffer = decode_pcm_audio(&bytes, 48000, 2).unwrap();
        assert_eq!(buffer.channels.len(), 2);
        assert_eq!(buffer.frames(), 3);
        assert!(buffer.channels[0].iter().all(|&s| s > 0.0));
        assert!(buffer.channels[1].iter().all(|&s| s < 0.0));
    }

    #[test]
    fn test_decode_rejects_partial_frames() {
        // 3 bytes: not even a whole sample.
        assert!(matches!(
            decode_pcm_audio(&[0, 0, 0], 24000, 1),
            Err(PolarisError::MalformedAudio(_))
        ));
        // 6 bytes = 3 samples: not divisible into stereo frames.
        assert!(matches!(
            decode_pcm_audio(&[0; 6], 24000, 2),
            Err(PolarisError::MalformedAudio(_))
        ));
        assert!(matches!(
            decode_pcm_audio(&[0; 4], 24000, 0),
            Err(PolarisError::MalformedAudio(_))
        ));
    }

    #[test]
    fn test_decode_encode_decode_within_one_step() {
        let original: Vec<i16> = (0..2048)
            .map(|i| ((i as f32 * 0.05).sin() * 30000.0) as i16)
            .chain([i16::MIN, i16::MAX, 0, -1, 1])
            .collect();
        let b64 = base64::engine::general_purpose::STANDARD.encode(pcm_bytes(&original));

        let first = decode_base64_pcm(&b64, 16000, 1).unwrap();
        let reencoded = encode_pcm_chunk(&first.channels[0]);
        let second = decode_base64_pcm(&reencoded, 16000, 1).unwrap();

        let step = 1.0 / PCM16_SCALE;
        for (a, b) in first.channels[0].iter().zip(&second.channels[0]) {
            assert!((a - b).abs() <= step, "{a} vs {b}");
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range_samples() {
        let b64 = encode_pcm_chunk(&[1.0, 1.5, -1.0, -2.0, f32::NAN]);
        let bytes = decode_base64_bytes(&b64).unwrap();
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![i16::MAX, i16::MAX, i16::MIN, i16::MIN, 0]);
    }

    #[test]
    fn test_encode_empty_chunk() {
        assert_eq!(encode_pcm_chunk(&[]), "");
    }

    #[test]
    fn test_pcm_blob_mime_and_rate_parsing() {
        let blob = pcm_blob(&[0.0; 4096], 16000);
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        assert_eq!(decode_base64_bytes(&blob.data).unwrap().len(), 8192);

        assert_eq!(pcm_rate_from_mime("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(pcm_rate_from_mime("audio/pcm; rate=16000"), Some(16000));
        assert_eq!(pcm_rate_from_mime("audio/pcm"), None);
        assert_eq!(pcm_rate_from_mime("image/png"), None);
    }
}
