use super::LiveClientBuilder;
use crate::audio::{CAPTURE_SAMPLE_RATE_HZ, CHANNELS_MONO, pcm_blob};
use crate::error::{PolarisError, Result};
use crate::types::{
    ActivityEnd, ActivityStart, BidiGenerateContentClientContent, BidiGenerateContentRealtimeInput,
    ClientMessagePayload, Content, Part, Role,
};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Handle to an open Live session. Dropping it without [`LiveClient::close`]
/// still signals the connection task to shut down.
#[derive(Clone)]
pub struct LiveClient<S: Clone + Send + Sync + 'static> {
    pub(crate) shutdown_tx: Arc<TokioMutex<Option<oneshot::Sender<()>>>>,
    pub(crate) outgoing_sender: Option<mpsc::Sender<ClientMessagePayload>>,
    pub(crate) state: Arc<S>,
}

impl<S: Clone + Send + Sync + 'static> LiveClient<S> {
    pub fn builder_with_state(api_key: String, model: String, state: S) -> LiveClientBuilder<S> {
        LiveClientBuilder::new_with_state(api_key, model, state)
    }

    pub async fn close(&mut self) -> Result<()> {
        info!("[LiveClient] Close requested.");
        let mut guard = self.shutdown_tx.lock().await;
        if let Some(tx) = guard.take() {
            if tx.send(()).is_err() {
                info!("[LiveClient] Connection task already gone.");
            } else {
                info!("[LiveClient] Shutdown signal sent.");
            }
        }
        self.outgoing_sender.take();
        Ok(())
    }

    pub fn outgoing_sender(&self) -> Option<mpsc::Sender<ClientMessagePayload>> {
        self.outgoing_sender.clone()
    }

    pub fn state(&self) -> Arc<S> {
        self.state.clone()
    }

    pub fn is_open(&self) -> bool {
        self.outgoing_sender
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    pub async fn send_message(&self, payload: ClientMessagePayload) -> Result<()> {
        let Some(sender) = &self.outgoing_sender else {
            error!("[LiveClient] Cannot send: client is closed.");
            return Err(PolarisError::NotReady);
        };
        sender.send(payload).await.map_err(|e| {
            error!("[LiveClient] Connection task channel closed: {}", e);
            PolarisError::SendError
        })
    }

    pub async fn send_text_turn(&self, text: String, end_of_turn: bool) -> Result<()> {
        let content = Content {
            parts: vec![Part::text(text)],
            role: Some(Role::User),
        };
        self.send_message(ClientMessagePayload::ClientContent(
            BidiGenerateContentClientContent {
                turns: Some(vec![content]),
                turn_complete: Some(end_of_turn),
            },
        ))
        .await
    }

    /// Streams one microphone frame. The Live API takes 16 kHz mono only;
    /// any other format is rejected rather than resampled.
    pub async fn send_audio_frame(
        &self,
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
    ) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        if sample_rate != CAPTURE_SAMPLE_RATE_HZ || channels != CHANNELS_MONO {
            let msg = format!(
                "Audio input ({}Hz {}ch) must be {}Hz mono.",
                sample_rate, channels, CAPTURE_SAMPLE_RATE_HZ
            );
            warn!("[LiveClient] {}", msg);
            return Err(PolarisError::Api(msg));
        }
        debug!("[LiveClient] Sending {} audio samples.", samples.len());
        self.send_message(ClientMessagePayload::RealtimeInput(
            BidiGenerateContentRealtimeInput {
                audio: Some(pcm_blob(samples, sample_rate)),
                ..Default::default()
            },
        ))
        .await
    }

    pub async fn send_realtime_text(&self, text: String) -> Result<()> {
        self.send_message(ClientMessagePayload::RealtimeInput(
            BidiGenerateContentRealtimeInput {
                text: Some(text),
                ..Default::default()
            },
        ))
        .await
    }

    pub async fn send_activity_start(&self) -> Result<()> {
        self.send_message(ClientMessagePayload::RealtimeInput(
            BidiGenerateContentRealtimeInput {
                activity_start: Some(ActivityStart {}),
                ..Default::default()
            },
        ))
        .await
    }

    pub async fn send_activity_end(&self) -> Result<()> {
        self.send_message(ClientMessagePayload::RealtimeInput(
            BidiGenerateContentRealtimeInput {
                activity_end: Some(ActivityEnd {}),
                ..Default::default()
            },
        ))
        .await
    }

    pub async fn send_audio_stream_end(&self) -> Result<()> {
        info!("[LiveClient] Sending audio stream end.");
        self.send_message(ClientMessagePayload::RealtimeInput(
            BidiGenerateContentRealtimeInput {
                audio_stream_end: Some(true),
                ..Default::default()
            },
        ))
        .await
    }
}

impl<S: Clone + Send + Sync + 'static> Drop for LiveClient<S> {
    fn drop(&mut self) {
        // Clones share the shutdown slot; only the last open handle fires it.
        if Arc::strong_count(&self.shutdown_tx) > 1 {
            return;
        }
        match self.shutdown_tx.try_lock() {
            Ok(mut guard) => {
                if let Some(tx) = guard.take() {
                    warn!("[LiveClient] Dropped without close(); signalling shutdown.");
                    if tx.send(()).is_err() {
                        info!("[LiveClient] Drop: connection task already gone.");
                    }
                }
            }
            Err(_) => {
                warn!("[LiveClient] Dropped while shutdown lock was held.");
            }
        }
        self.outgoing_sender.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode_base64_pcm;
    use crate::test_utils::setup_test;
    use tokio::time::{Duration, timeout};

    fn test_client() -> (
        LiveClient<()>,
        mpsc::Receiver<ClientMessagePayload>,
        oneshot::Receiver<()>,
    ) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(10);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let client = LiveClient {
            shutdown_tx: Arc::new(TokioMutex::new(Some(shutdown_tx))),
            outgoing_sender: Some(outgoing_tx),
            state: Arc::new(()),
        };
        (client, outgoing_rx, shutdown_rx)
    }

    fn sine(frames: usize, sample_rate: u32, frequency: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    async fn next(rx: &mut mpsc::Receiver<ClientMessagePayload>) -> ClientMessagePayload {
        timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_send_audio_frame_16k_mono() {
        setup_test();
        let (client, mut rx, _shutdown) = test_client();
        let samples = sine(160, 16000, 440.0);
        client.send_audio_frame(&samples, 16000, 1).await.unwrap();

        let ClientMessagePayload::RealtimeInput(BidiGenerateContentRealtimeInput {
            audio: Some(blob),
            ..
        }) = next(&mut rx).await
        else {
            panic!("expected realtime audio");
        };
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        let decoded = decode_base64_pcm(&blob.data, 16000, 1).unwrap();
        assert_eq!(decoded.frames(), 160);
    }

    #[tokio::test]
    async fn test_send_audio_frame_rejects_other_formats() {
        setup_test();
        let (client, _rx, _shutdown) = test_client();
        let result = client.send_audio_frame(&sine(480, 48000, 440.0), 48000, 1).await;
        match result {
            Err(PolarisError::Api(msg)) => assert!(msg.contains("(48000Hz 1ch)")),
            other => panic!("expected Api error, got {:?}", other),
        }
        let result = client.send_audio_frame(&[0.0; 32], 16000, 2).await;
        assert!(matches!(result, Err(PolarisError::Api(_))));
    }

    #[tokio::test]
    async fn test_empty_audio_frame_sends_nothing() {
        let (client, mut rx, _shutdown) = test_client();
        client.send_audio_frame(&[], 44100, 2).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_activity_and_stream_end_signals() {
        let (client, mut rx, _shutdown) = test_client();
        client.send_activity_start().await.unwrap();
        client.send_realtime_text("hey".into()).await.unwrap();
        client.send_activity_end().await.unwrap();
        client.send_audio_stream_end().await.unwrap();

        let mut frames = Vec::new();
        for _ in 0..4 {
            let ClientMessagePayload::RealtimeInput(input) = next(&mut rx).await else {
                panic!("expected realtime input");
            };
            frames.push(input);
        }
        assert!(frames[0].activity_start.is_some());
        assert_eq!(frames[1].text.as_deref(), Some("hey"));
        assert!(frames[2].activity_end.is_some());
        assert_eq!(frames[3].audio_stream_end, Some(true));
    }

    #[tokio::test]
    async fn test_close_signals_shutdown_and_blocks_sends() {
        let (mut client, _rx, shutdown_rx) = test_client();
        client.close().await.unwrap();
        assert!(shutdown_rx.await.is_ok());
        assert!(!client.is_open());
        let result = client.send_text_turn("late".into(), true).await;
        assert!(matches!(result, Err(PolarisError::NotReady)));
    }

    #[tokio::test]
    async fn test_drop_signals_shutdown() {
        let (client, _rx, shutdown_rx) = test_client();
        drop(client);
        assert!(shutdown_rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_send_after_task_gone_is_send_error() {
        let (client, rx, _shutdown) = test_client();
        drop(rx);
        let result = client.send_text_turn("hi".into(), true).await;
        assert!(matches!(result, Err(PolarisError::SendError)));
    }
}
