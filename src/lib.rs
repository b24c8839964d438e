//! Polaris: a Gemini assistant with grounded text answers, image questions,
//! speech synthesis and a live voice session.

pub mod audio;
pub mod client;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod mode;
pub mod response;
pub mod types;

pub use client::{LiveClient, LiveClientBuilder, VoiceSession};
pub use config::PolarisConfig;
pub use conversation::{Conversation, LoadingState, Message, MessageRole};
pub use credential::{CredentialCell, EnvKeyProvider, KeyProvider};
pub use error::{AuthorizationKind, PolarisError, Result};
pub use mode::Mode;
pub use response::{GeneratedResponse, GroundingSource, ResponseClient};

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::Once;
    use tracing::Level;
    use tracing_subscriber::EnvFilter;

    pub(crate) fn init_test_logger() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::builder()
                        .with_default_directive(Level::INFO.into())
                        .from_env_lossy(),
                )
                .with_test_writer()
                .try_init();
        });
    }

    pub(crate) fn setup_test() {
        init_test_logger();
    }
}
