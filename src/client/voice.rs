//! Turns Live server events into scheduled playback and a running transcript.

use crate::audio::{
    AudioSink, CHANNELS_MONO, PLAYBACK_SAMPLE_RATE_HZ, PlaybackScheduler, SourceId,
    decode_base64_pcm, pcm_rate_from_mime,
};
use crate::types::BidiGenerateContentServerContent;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Completed turns kept for callers that never drain them.
pub const MAX_COMPLETED_TURNS: usize = 64;

/// What one server event did to the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentOutcome {
    pub scheduled: usize,
    pub skipped: usize,
    pub interrupted: bool,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub user: String,
    pub model: String,
}

pub struct VoiceSession<K: AudioSink> {
    scheduler: PlaybackScheduler<K>,
    transcript: Transcript,
    turns: VecDeque<Transcript>,
}

impl<K: AudioSink> VoiceSession<K> {
    pub fn new(sink: K) -> Self {
        Self {
            scheduler: PlaybackScheduler::new(sink),
            transcript: Transcript::default(),
            turns: VecDeque::new(),
        }
    }

    /// Applies one `serverContent` event.
    ///
    /// An interruption stops all queued audio before any audio in the same
    /// event is scheduled. Audio parts that fail to decode are skipped.
    pub fn handle_server_content(
        &mut self,
        content: &BidiGenerateContentServerContent,
    ) -> ContentOutcome {
        let mut outcome = ContentOutcome::default();

        if content.interrupted {
            info!("[VoiceSession] Model interrupted; flushing playback.");
            self.scheduler.interrupt();
            outcome.interrupted = true;
        }

        if let Some(turn) = &content.model_turn {
            for blob in turn.parts.iter().filter_map(|p| p.inline_data.as_ref()) {
                if !blob.mime_type.starts_with("audio/") {
                    debug!("[VoiceSession] Ignoring inline {}.", blob.mime_type);
                    continue;
                }
                let rate = pcm_rate_from_mime(&blob.mime_type).unwrap_or(PLAYBACK_SAMPLE_RATE_HZ);
                match decode_base64_pcm(&blob.data, rate, CHANNELS_MONO) {
                    Ok(buffer) => {
                        if self.scheduler.schedule(buffer).is_some() {
                            outcome.scheduled += 1;
                        }
                    }
                    Err(e) => {
                        warn!("[VoiceSession] Skipping bad audio chunk: {}", e);
                        outcome.skipped += 1;
                    }
                }
            }
        }

        if let Some(t) = &content.input_transcription {
            self.transcript.user.push_str(&t.text);
        }
        if let Some(t) = &content.output_transcription {
            self.transcript.model.push_str(&t.text);
        }

        if content.turn_complete {
            outcome.turn_complete = true;
            let finished = std::mem::take(&mut self.transcript);
            if finished != Transcript::default() {
                debug!(
                    "[VoiceSession] Turn complete. User: {:?} Model: {:?}",
                    finished.user, finished.model
                );
                if self.turns.len() == MAX_COMPLETED_TURNS {
                    self.turns.pop_front();
                }
                self.turns.push_back(finished);
            }
        }

        outcome
    }

    pub fn source_ended(&mut self, id: SourceId) {
        self.scheduler.source_ended(id);
    }

    /// Stops playback without waiting for the server to interrupt.
    pub fn stop_playback(&mut self) {
        self.scheduler.interrupt();
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    /// Transcript of the turn in progress.
    pub fn current_transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Finished turns not yet taken, oldest first. At most
    /// [`MAX_COMPLETED_TURNS`] are retained.
    pub fn completed_turns(&self) -> impl ExactSizeIterator<Item = &Transcript> {
        self.turns.iter()
    }

    /// Drains the finished turns, oldest first.
    pub fn take_completed_turns(&mut self) -> Vec<Transcript> {
        self.turns.drain(..).collect()
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<K> {
        &self.scheduler
    }
}
