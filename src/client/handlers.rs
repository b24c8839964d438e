use crate::types::{BidiGenerateContentServerContent, UsageMetadata};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ServerContentContext {
    pub content: BidiGenerateContentServerContent,
}

#[derive(Debug, Clone)]
pub struct UsageMetadataContext {
    pub metadata: UsageMetadata,
}

/// An async callback taking an event context and the shared client state.
///
/// Implemented for any `Fn(Args, Arc<S>) -> impl Future<Output = ()>`, so
/// plain `async fn` handlers can be registered directly.
pub trait EventHandlerSimple<Args, S>: Send + Sync {
    fn call(&self, args: Args, state: Arc<S>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F, Fut, Args, S> EventHandlerSimple<Args, S> for F
where
    F: Fn(Args, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
    Args: Send + 'static,
    S: Send + Sync + 'static,
{
    fn call(&self, args: Args, state: Arc<S>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self(args, state))
    }
}

pub(crate) struct Handlers<S> {
    pub(crate) on_server_content: Option<Arc<dyn EventHandlerSimple<ServerContentContext, S>>>,
    pub(crate) on_usage_metadata: Option<Arc<dyn EventHandlerSimple<UsageMetadataContext, S>>>,
}

impl<S> Default for Handlers<S> {
    fn default() -> Self {
        Self {
            on_server_content: None,
            on_usage_metadata: None,
        }
    }
}
