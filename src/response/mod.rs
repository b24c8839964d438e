//! Single-shot answers from `generateContent`, with search grounding,
//! image input and speech synthesis.

pub mod transport;

pub use transport::{HttpTransport, Transport};

use crate::config::PolarisConfig;
use crate::credential::CredentialCell;
use crate::error::{AuthorizationKind, PolarisError, Result};
use crate::mode::Mode;
use crate::types::{
    Blob, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
    ResponseModality, Role, SpeechConfig, ThinkingConfig, Tool, UsageMetadata,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const EMPTY_RESPONSE_FALLBACK: &str = "I couldn't generate a response.";
const UNTITLED_SOURCE: &str = "Source";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GroundingSource {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedResponse {
    pub text: String,
    pub grounding_sources: Vec<GroundingSource>,
    pub usage: Option<UsageMetadata>,
}

pub struct ResponseClient<T: Transport = HttpTransport> {
    config: PolarisConfig,
    credential: CredentialCell,
    transport: T,
}

impl ResponseClient<HttpTransport> {
    pub fn new(config: PolarisConfig, credential: CredentialCell) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, credential, transport))
    }
}

impl<T: Transport> ResponseClient<T> {
    pub fn with_transport(config: PolarisConfig, credential: CredentialCell, transport: T) -> Self {
        Self {
            config,
            credential,
            transport,
        }
    }

    pub fn config(&self) -> &PolarisConfig {
        &self.config
    }

    pub fn credential(&self) -> &CredentialCell {
        &self.credential
    }

    /// Answers `prompt`, optionally about an image given as a data URI.
    ///
    /// Fails with [`PolarisError::Configuration`] before any network call when
    /// no key is connected. API failures are classified into rate-limit and
    /// authorization errors where recognizable.
    pub async fn generate_response(
        &self,
        prompt: &str,
        image: Option<&str>,
        mode: Mode,
    ) -> Result<GeneratedResponse> {
        let api_key = self.credential.get().ok_or_else(|| {
            PolarisError::Configuration("no API key in the credential cell".to_string())
        })?;
        let request = build_request(&self.config.system_instruction, prompt, image, mode)?;
        let model = mode.profile().model;

        info!(
            "[ResponseClient] Generating with {} (mode {}, image: {}).",
            model,
            mode,
            image.is_some()
        );

        match self.transport.generate_content(&api_key, model, &request).await {
            Ok(response) => Ok(normalize_response(response)),
            Err(e) => {
                error!("[ResponseClient] Generation failed: {}", e);
                Err(classify_error(e))
            }
        }
    }

    /// Synthesizes `text` as 24kHz mono PCM16, base64-encoded.
    ///
    /// Returns `None` when no key is connected, the call fails, or the
    /// response holds no audio. Speech is optional; nothing is surfaced.
    pub async fn generate_speech(&self, text: &str) -> Option<String> {
        let Some(api_key) = self.credential.get() else {
            debug!("[ResponseClient] Skipping speech: no API key.");
            return None;
        };

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::text(text)],
                role: Some(Role::User),
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec![ResponseModality::Audio]),
                speech_config: Some(SpeechConfig::prebuilt_voice(&self.config.voice_name)),
                ..Default::default()
            }),
            ..Default::default()
        };

        match self
            .transport
            .generate_content(&api_key, &self.config.tts_model, &request)
            .await
        {
            Ok(response) => {
                let audio = first_inline_data(&response).map(|blob| blob.data.clone());
                if audio.is_none() {
                    debug!("[ResponseClient] Speech response carried no audio.");
                }
                audio
            }
            Err(e) => {
                warn!("[ResponseClient] Speech synthesis failed: {}", e);
                None
            }
        }
    }
}

/// Builds the `generateContent` body for one prompt under `mode`.
pub fn build_request(
    system_instruction: &str,
    prompt: &str,
    image: Option<&str>,
    mode: Mode,
) -> Result<GenerateContentRequest> {
    let mut parts = Vec::with_capacity(2);
    if let Some(data_uri) = image {
        parts.push(Part::inline(parse_data_uri(data_uri)?));
    }
    parts.push(Part::text(prompt));

    let profile = mode.profile();
    let tools = profile.google_search.then(|| vec![Tool::google_search()]);
    let generation_config = profile.thinking_budget.map(|budget| GenerationConfig {
        thinking_config: Some(ThinkingConfig {
            thinking_budget: Some(budget),
        }),
        ..Default::default()
    });

    Ok(GenerateContentRequest {
        contents: vec![Content {
            parts,
            role: Some(Role::User),
        }],
        system_instruction: Some(Content::text(system_instruction)),
        tools,
        generation_config,
    })
}

/// Splits `data:<mime>;base64,<payload>` into an inline blob.
pub fn parse_data_uri(data_uri: &str) -> Result<Blob> {
    let rest = data_uri
        .strip_prefix("data:")
        .ok_or_else(|| PolarisError::InvalidImage("expected a data: URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PolarisError::InvalidImage("data URI has no payload".to_string()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| PolarisError::InvalidImage("data URI is not base64-encoded".to_string()))?;
    if mime_type.is_empty() || payload.is_empty() {
        return Err(PolarisError::InvalidImage(
            "data URI is missing its MIME type or payload".to_string(),
        ));
    }
    Ok(Blob {
        mime_type: mime_type.to_string(),
        data: payload.to_string(),
    })
}

pub fn normalize_response(response: GenerateContentResponse) -> GeneratedResponse {
    let text = response_text(&response);
    let grounding_sources = grounding_sources(&response);
    debug!(
        "[ResponseClient] Response: {} chars, {} source(s).",
        text.len(),
        grounding_sources.len()
    );
    GeneratedResponse {
        text,
        grounding_sources,
        usage: response.usage_metadata,
    }
}

/// Text of the first candidate, thoughts excluded, or the fallback line.
fn response_text(response: &GenerateContentResponse) -> String {
    let text: String = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|p| p.thought != Some(true))
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        EMPTY_RESPONSE_FALLBACK.to_string()
    } else {
        text
    }
}

/// Web citations of the first candidate, in order. Non-web chunks are skipped.
fn grounding_sources(response: &GenerateContentResponse) -> Vec<GroundingSource> {
    response
        .candidates
        .first()
        .and_then(|c| c.grounding_metadata.as_ref())
        .map(|metadata| {
            metadata
                .grounding_chunks
                .iter()
                .filter_map(|chunk| chunk.web.as_ref())
                .map(|web| GroundingSource {
                    title: web
                        .title
                        .clone()
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| UNTITLED_SOURCE.to_string()),
                    url: web.uri.clone().unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn first_inline_data(response: &GenerateContentResponse) -> Option<&Blob> {
    response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .find_map(|p| p.inline_data.as_ref())
}

/// Maps a failed call onto the user-facing taxonomy by matching known
/// substrings. Unrecognized failures keep their original message.
pub fn classify_error(err: PolarisError) -> PolarisError {
    let raw = match err {
        PolarisError::Configuration(_)
        | PolarisError::InvalidImage(_)
        | PolarisError::RateLimit { .. }
        | PolarisError::Authorization(_) => return err,
        PolarisError::Api(msg) | PolarisError::Unexpected(msg) => msg,
        other => other.to_string(),
    };

    if raw.contains("429") || raw.contains("RESOURCE_EXHAUSTED") {
        PolarisError::RateLimit {
            retry_after: parse_retry_delay(&raw),
        }
    } else if raw.contains("API key not valid") {
        PolarisError::Authorization(AuthorizationKind::InvalidKey)
    } else if raw.contains("Requested entity was not found") {
        PolarisError::Authorization(AuthorizationKind::EntityNotFound)
    } else {
        PolarisError::Unexpected(raw)
    }
}

/// Reads a `"retryDelay": "41s"` hint out of an error body.
fn parse_retry_delay(raw: &str) -> Option<Duration> {
    const KEY: &str = "retryDelay";
    let rest = &raw[raw.find(KEY)? + KEY.len()..];
    let start = rest.find(|c: char| c.is_ascii_digit())?;
    if !rest[..start]
        .chars()
        .all(|c| c == '"' || c == ':' || c.is_whitespace())
    {
        return None;
    }
    let number: String = rest[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let secs: f64 = number.parse().ok()?;
    // Out-of-range hints are dropped rather than trusted.
    Duration::try_from_secs_f64(secs).ok()
}
