use super::connection::{ConnectionParams, spawn_processing_task};
use super::handle::LiveClient;
use super::handlers::{EventHandlerSimple, Handlers, ServerContentContext, UsageMetadataContext};
use crate::config::{DEFAULT_LIVE_URL, PolarisConfig};
use crate::error::{PolarisError, Result};
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct LiveClientBuilder<S: Clone + Send + Sync + 'static> {
    pub(crate) api_key: String,
    pub(crate) live_url: String,
    pub(crate) initial_setup: BidiGenerateContentSetup,
    pub(crate) handlers: Handlers<S>,
    pub(crate) state: S,
}

impl<S: Clone + Send + Sync + 'static + Default> LiveClientBuilder<S> {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_state(api_key, model, S::default())
    }
}

impl<S: Clone + Send + Sync + 'static> LiveClientBuilder<S> {
    pub fn new_with_state(api_key: String, model: String, state: S) -> Self {
        Self {
            api_key,
            live_url: DEFAULT_LIVE_URL.to_string(),
            initial_setup: BidiGenerateContentSetup {
                model,
                ..Default::default()
            },
            handlers: Handlers::default(),
            state,
        }
    }

    /// Starts from a [`PolarisConfig`]: its Live endpoint, model, system
    /// instruction and voice, answering in audio.
    pub fn from_config(config: &PolarisConfig, api_key: String, state: S) -> Self {
        Self::new_with_state(api_key, config.live_model.clone(), state)
            .live_url(config.live_url.clone())
            .system_instruction(Content::text(&config.system_instruction))
            .generation_config(GenerationConfig {
                response_modalities: Some(vec![ResponseModality::Audio]),
                speech_config: Some(SpeechConfig::prebuilt_voice(&config.voice_name)),
                ..Default::default()
            })
    }

    pub fn live_url(mut self, url: impl Into<String>) -> Self {
        self.live_url = url.into();
        self
    }

    pub fn generation_config(mut self, config: GenerationConfig) -> Self {
        self.initial_setup.generation_config = Some(config);
        self
    }

    pub fn system_instruction(mut self, instruction: Content) -> Self {
        self.initial_setup.system_instruction = Some(instruction);
        self
    }

    /// Lets the model ground spoken answers with Google Search.
    pub fn google_search(mut self) -> Self {
        self.initial_setup
            .tools
            .get_or_insert_with(Vec::new)
            .push(Tool::google_search());
        self
    }

    pub fn on_server_content(
        mut self,
        handler: impl EventHandlerSimple<ServerContentContext, S> + 'static,
    ) -> Self {
        self.handlers.on_server_content = Some(Arc::new(handler));
        self
    }

    pub fn on_usage_metadata(
        mut self,
        handler: impl EventHandlerSimple<UsageMetadataContext, S> + 'static,
    ) -> Self {
        self.handlers.on_usage_metadata = Some(Arc::new(handler));
        self
    }

    pub fn input_audio_transcription(mut self, config: AudioTranscriptionConfig) -> Self {
        self.initial_setup.input_audio_transcription = Some(config);
        self
    }

    pub fn output_audio_transcription(mut self, config: AudioTranscriptionConfig) -> Self {
        self.initial_setup.output_audio_transcription = Some(config);
        self
    }

    /// Opens the socket, sends the setup message and waits for the server to
    /// acknowledge it.
    pub async fn connect(self) -> Result<LiveClient<S>> {
        if self.api_key.trim().is_empty() {
            return Err(PolarisError::Configuration(
                "live session needs an API key".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (outgoing_sender, outgoing_receiver) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel();

        let state_arc = Arc::new(self.state);
        info!(
            "[LiveClientBuilder] Connecting with model {}.",
            self.initial_setup.model
        );

        spawn_processing_task(
            ConnectionParams {
                live_url: self.live_url,
                api_key: self.api_key,
                setup: self.initial_setup,
                handlers: Arc::new(self.handlers),
                state: state_arc.clone(),
            },
            ready_tx,
            shutdown_rx,
            outgoing_receiver,
        );

        match tokio::time::timeout(SETUP_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(_)) => {
                return Err(PolarisError::Unexpected(
                    "live connection task exited before setup completed".to_string(),
                ));
            }
            Err(_) => {
                let _ = shutdown_tx.send(());
                return Err(PolarisError::Unexpected(format!(
                    "live setup not acknowledged within {}s",
                    SETUP_TIMEOUT.as_secs()
                )));
            }
        }

        Ok(LiveClient {
            shutdown_tx: Arc::new(TokioMutex::new(Some(shutdown_tx))),
            outgoing_sender: Some(outgoing_sender),
            state: state_arc,
        })
    }
}
