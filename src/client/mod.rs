pub mod builder;
pub mod handle;
pub mod handlers;
pub mod voice;

mod connection;

pub use builder::LiveClientBuilder;
pub use handle::LiveClient;
pub use handlers::{EventHandlerSimple, ServerContentContext, UsageMetadataContext};
pub use voice::{ContentOutcome, Transcript, VoiceSession};
