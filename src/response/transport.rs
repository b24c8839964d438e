use crate::config::PolarisConfig;
use crate::error::{PolarisError, Result};
use crate::types::{ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse};
use reqwest::Client;
use std::future::Future;
use tracing::{debug, warn};

/// The external `generateContent` call.
pub trait Transport: Send + Sync {
    fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> impl Future<Output = Result<GenerateContentResponse>> + Send;
}

/// `generateContent` over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_base: String,
}

impl HttpTransport {
    pub fn new(config: &PolarisConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base,
            model.trim_start_matches("models/")
        )
    }
}

impl Transport for HttpTransport {
    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = self.endpoint(model);
        debug!(
            "[HttpTransport] POST {} ({} content part(s))",
            url,
            request.contents.iter().map(|c| c.parts.len()).sum::<usize>()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ApiErrorEnvelope>(&body) {
                Ok(envelope) => warn!(
                    "[HttpTransport] {} returned {} ({}): {}",
                    model,
                    status,
                    envelope.error.status.unwrap_or_default(),
                    envelope.error.message.unwrap_or_default()
                ),
                Err(_) => warn!("[HttpTransport] {} returned {}", model, status),
            }
            // Status and raw body both go upward; callers classify on substrings.
            return Err(PolarisError::Api(format!("{}: {}", status, body)));
        }

        Ok(response.json::<GenerateContentResponse>().await?)
    }
}
