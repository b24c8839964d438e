// demos/voice_chat.rs
//
// Live voice conversation with Polaris: the default microphone streams at
// 16kHz mono and the model's audio replies play through the default output.
// Ctrl+C to exit.
use polaris::audio::{
    CAPTURE_FRAME_SAMPLES, CAPTURE_SAMPLE_RATE_HZ, CHANNELS_MONO, PLAYBACK_SAMPLE_RATE_HZ,
};
use polaris::client::{ServerContentContext, UsageMetadataContext};
use polaris::credential::probe_key;
use polaris::types::AudioTranscriptionConfig;
use polaris::{CredentialCell, EnvKeyProvider, LiveClientBuilder, PolarisConfig, VoiceSession};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

#[path = "common/cpal_audio.rs"]
mod cpal_audio;

#[derive(Clone)]
struct VoiceAppState {
    session: Arc<StdMutex<VoiceSession<cpal_audio::CpalSink>>>,
    turn_complete: Arc<Notify>,
}

async fn handle_on_content(ctx: ServerContentContext, state: Arc<VoiceAppState>) {
    let Ok(mut session) = state.session.lock() else {
        error!("[Handler] Voice session lock poisoned.");
        return;
    };
    let outcome = session.handle_server_content(&ctx.content);
    if outcome.interrupted {
        info!("[Handler] Interrupted by the user.");
    }
    if outcome.turn_complete {
        for turn in session.take_completed_turns() {
            if !turn.user.is_empty() {
                println!("you:     {}", turn.user.trim());
            }
            if !turn.model.is_empty() {
                println!("polaris: {}", turn.model.trim());
            }
        }
        state.turn_complete.notify_one();
    }
}

async fn handle_usage_metadata(ctx: UsageMetadataContext, _state: Arc<VoiceAppState>) {
    debug!("[Handler] Usage metadata: {:?}", ctx.metadata);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = PolarisConfig::from_env();
    let credential = CredentialCell::new();
    if !probe_key(&EnvKeyProvider, &credential) {
        anyhow::bail!("Set GEMINI_API_KEY (or API_KEY) to start a voice session");
    }
    let api_key = credential
        .get()
        .ok_or_else(|| anyhow::anyhow!("API key disappeared"))?;

    let (_output_stream, sink) = cpal_audio::open_output(PLAYBACK_SAMPLE_RATE_HZ)?;
    let state = VoiceAppState {
        session: Arc::new(StdMutex::new(VoiceSession::new(sink))),
        turn_complete: Arc::new(Notify::new()),
    };

    let mut client = LiveClientBuilder::from_config(&config, api_key, state.clone())
        .input_audio_transcription(AudioTranscriptionConfig {})
        .output_audio_transcription(AudioTranscriptionConfig {})
        .google_search()
        .on_server_content(handle_on_content)
        .on_usage_metadata(handle_usage_metadata)
        .connect()
        .await?;

    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(32);
    let mut pending = Vec::with_capacity(CAPTURE_FRAME_SAMPLES);
    let _input_stream = cpal_audio::open_mono_input(CAPTURE_SAMPLE_RATE_HZ, move |samples| {
        pending.extend(samples);
        while pending.len() >= CAPTURE_FRAME_SAMPLES {
            let frame: Vec<f32> = pending.drain(..CAPTURE_FRAME_SAMPLES).collect();
            if frame_tx.try_send(frame).is_err() {
                debug!("[AudioInput] Frame channel full; dropping a frame.");
            }
        }
    })?;

    let sender = client.clone();
    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = sender
                .send_audio_frame(&frame, CAPTURE_SAMPLE_RATE_HZ, CHANNELS_MONO)
                .await
            {
                error!("[AudioInput] Failed to send frame: {}", e);
                break;
            }
        }
        info!("[AudioInput] Capture task stopped.");
    });

    println!("Listening. Speak to Polaris; Ctrl+C to exit.");
    let mut housekeeping = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = state.turn_complete.notified() => {
                debug!("[Main] Model turn complete.");
            }
            _ = housekeeping.tick() => {
                if let Ok(mut session) = state.session.lock() {
                    let finished = session.scheduler().sink().take_finished();
                    for id in finished {
                        session.source_ended(id);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("[Main] Ctrl+C. Shutting down.");
                break;
            }
        }
    }

    if let Err(e) = client.send_audio_stream_end().await {
        warn!("[Main] Failed to send audio stream end: {}", e);
    }
    client.close().await?;
    Ok(())
}
