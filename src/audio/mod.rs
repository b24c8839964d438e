pub mod codec;
pub mod playback;

pub use codec::{
    decode_base64_bytes, decode_base64_pcm, decode_pcm_audio, encode_pcm_chunk, pcm_blob,
    pcm_rate_from_mime,
};
pub use playback::{AudioSink, PlaybackScheduler, SourceId, SpeechPlayer};

/// Sample rate (16kHz) of microphone frames sent to the Live API.
pub const CAPTURE_SAMPLE_RATE_HZ: u32 = 16000;
/// Sample rate (24kHz) of audio the API sends back, both TTS and Live.
pub const PLAYBACK_SAMPLE_RATE_HZ: u32 = 24000;
/// Samples per captured microphone frame.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;
/// All audio exchanged with the API is mono.
pub const CHANNELS_MONO: u16 = 1;

/// Decoded audio, one float vector per channel, all the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_mime_rate_reaches_decoded_buffer_duration() {
        let mime = pcm_blob(&[0.0; 1600], CAPTURE_SAMPLE_RATE_HZ).mime_type;
        let rate = pcm_rate_from_mime(&mime).unwrap_or(PLAYBACK_SAMPLE_RATE_HZ);
        assert_eq!(rate, CAPTURE_SAMPLE_RATE_HZ);

        let buffer =
            decode_base64_pcm(&encode_pcm_chunk(&[0.1; 1600]), rate, CHANNELS_MONO).unwrap();
        assert_eq!(buffer.frames(), 1600);
        assert!((buffer.duration_secs() - 0.1).abs() < 1e-9);
        assert_eq!(pcm_rate_from_mime("audio/pcm"), None);
    }
}
