//! Playback scheduling on top of an output device.
//!
//! The device itself sits behind [`AudioSink`]. [`PlaybackScheduler`] places
//! streamed chunks back to back on a single time cursor. [`SpeechPlayer`]
//! plays one utterance at a time, cutting off whatever was playing.

use super::{AudioBuffer, CHANNELS_MONO, PLAYBACK_SAMPLE_RATE_HZ, codec};
use crate::error::Result;
use std::collections::BTreeSet;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u64);

/// An output device clocked in seconds.
pub trait AudioSink {
    /// Device clock, in seconds since the sink was created.
    fn current_time(&self) -> f64;

    /// Queues `buffer` to start at device time `at`. A time in the past
    /// starts immediately.
    fn start(&mut self, buffer: AudioBuffer, at: f64) -> SourceId;

    /// Stops a source. Unknown or finished ids are ignored.
    fn stop(&mut self, id: SourceId);
}

pub struct PlaybackScheduler<K: AudioSink> {
    sink: K,
    next_start_time: f64,
    active: BTreeSet<SourceId>,
}

impl<K: AudioSink> PlaybackScheduler<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            next_start_time: 0.0,
            active: BTreeSet::new(),
        }
    }

    /// Queues `buffer` right after the previously scheduled one, or now if
    /// the cursor has fallen behind the device clock. Empty buffers are
    /// dropped.
    pub fn schedule(&mut self, buffer: AudioBuffer) -> Option<SourceId> {
        if buffer.is_empty() {
            trace!("[Playback] Skipping empty buffer.");
            return None;
        }
        let now = self.sink.current_time();
        let start_at = self.next_start_time.max(now);
        let duration = buffer.duration_secs();
        let id = self.sink.start(buffer, start_at);
        self.next_start_time = start_at + duration;
        self.active.insert(id);
        trace!(
            "[Playback] Scheduled {:?} at {:.3}s for {:.3}s. Cursor now {:.3}s.",
            id, start_at, duration, self.next_start_time
        );
        Some(id)
    }

    /// Forgets a source the sink reports as finished.
    pub fn source_ended(&mut self, id: SourceId) {
        self.active.remove(&id);
    }

    /// Stops everything queued or playing and rewinds the cursor.
    pub fn interrupt(&mut self) {
        info!(
            "[Playback] Interrupted. Stopping {} source(s).",
            self.active.len()
        );
        for id in std::mem::take(&mut self.active) {
            self.sink.stop(id);
        }
        self.next_start_time = 0.0;
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.active.iter().copied()
    }

    pub fn is_playing(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }
}

pub struct SpeechPlayer<K: AudioSink> {
    sink: K,
    current: Option<SourceId>,
}

impl<K: AudioSink> SpeechPlayer<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            current: None,
        }
    }

    /// Starts `buffer` now, stopping the utterance already playing.
    pub fn play(&mut self, buffer: AudioBuffer) -> SourceId {
        self.stop();
        let now = self.sink.current_time();
        let id = self.sink.start(buffer, now);
        debug!("[Speech] Playing {:?}.", id);
        self.current = Some(id);
        id
    }

    /// Decodes a synthesized speech payload (24kHz mono PCM16) and plays it.
    pub fn play_base64(&mut self, b64: &str) -> Result<SourceId> {
        let buffer = codec::decode_base64_pcm(b64, PLAYBACK_SAMPLE_RATE_HZ, CHANNELS_MONO)?;
        Ok(self.play(buffer))
    }

    pub fn stop(&mut self) {
        if let Some(id) = self.current.take() {
            debug!("[Speech] Stopping {:?}.", id);
            self.sink.stop(id);
        }
    }

    /// Clears the current utterance once the sink reports it finished.
    pub fn source_ended(&mut self, id: SourceId) {
        if self.current == Some(id) {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<SourceId> {
        self.current
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}
