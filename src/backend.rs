use crate::error::BackendError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A model advertised by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Lazily produced text increments of one streamed response.
pub type IncrementStream = BoxStream<'static, Result<String, BackendError>>;

/// The language-model server the controller talks to.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Lists the models the server can run, in the server's order.
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, BackendError>;

    /// Starts a single-turn chat with `prompt` as the only message.
    ///
    /// The returned stream ends when the server finishes the response. An
    /// `Err` item means the transport failed mid-response.
    async fn stream_chat(&self, model: &str, prompt: &str)
        -> Result<IncrementStream, BackendError>;
}
