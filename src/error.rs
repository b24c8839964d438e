use std::time::Duration;
use thiserror::Error;

/// Why the API refused the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationKind {
    /// The key was rejected outright.
    InvalidKey,
    /// The key is valid but the requested model is not available to it,
    /// usually because the project is on a lower plan tier.
    EntityNotFound,
}

#[derive(Error, Debug)]
pub enum PolarisError {
    #[error(
        "API key is not configured. Connect a key or set GEMINI_API_KEY before sending a request. ({0})"
    )]
    Configuration(String),

    #[error("{}", rate_limit_message(.retry_after))]
    RateLimit { retry_after: Option<Duration> },

    #[error("{}", authorization_message(.0))]
    Authorization(AuthorizationKind),

    #[error("Malformed audio payload: {0}")]
    MalformedAudio(String),

    #[error("Base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Invalid image attachment: {0}")]
    InvalidImage(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to send message to the connection task")]
    SendError,

    #[error("Live client is not ready or already closed")]
    NotReady,

    #[error("{0}")]
    Unexpected(String),
}

impl PolarisError {
    /// Text shown to the user when this error ends a conversation turn.
    pub fn user_message(&self) -> String {
        match self {
            PolarisError::Unexpected(msg) if msg.trim().is_empty() => {
                "An unexpected error occurred.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, PolarisError::RateLimit { .. })
    }
}

fn rate_limit_message(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(
            "Polaris has hit the API rate limit. Please retry in about {} seconds.",
            delay.as_secs().max(1)
        ),
        None => "Polaris has hit the API rate limit. Please wait a moment and try again."
            .to_string(),
    }
}

fn authorization_message(kind: &AuthorizationKind) -> &'static str {
    match kind {
        AuthorizationKind::InvalidKey => {
            "The API key was rejected. Please reconnect a valid API key."
        }
        AuthorizationKind::EntityNotFound => {
            "The selected model is not available for this API key. Check that the key's project has access to it, or pick another mode."
        }
    }
}

pub type Result<T> = std::result::Result<T, PolarisError>;
