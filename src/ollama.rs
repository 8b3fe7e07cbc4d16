use crate::backend::{ChatBackend, IncrementStream, ModelDescriptor};
use crate::error::BackendError;
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageRequest<'a>>,
    stream: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
struct ChatMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

/// One NDJSON record of a streamed `/api/chat` response.
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<Model>,
}

#[derive(Deserialize)]
struct Model {
    name: String,
}

/// What a single stream line contributes to the response.
#[derive(Debug, PartialEq)]
enum LineEvent {
    Increment(String),
    Failed(BackendError),
    Done,
    Skip,
}

fn parse_line(line: &[u8]) -> LineEvent {
    let s = String::from_utf8_lossy(line);
    let s = s.trim();
    if s.is_empty() {
        return LineEvent::Skip;
    }
    match serde_json::from_str::<ChatChunk>(s) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return LineEvent::Failed(BackendError::Api(error));
            }
            let content = chunk.message.map(|m| m.content).unwrap_or_default();
            if !content.is_empty() {
                LineEvent::Increment(content)
            } else if chunk.done {
                LineEvent::Done
            } else {
                LineEvent::Skip
            }
        }
        Err(e) => {
            debug!("skipping unparseable chat line: {}", e);
            LineEvent::Skip
        }
    }
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn error_from_response(response: reqwest::Response) -> BackendError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        BackendError::from_status(status, &body)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, BackendError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let models = response
            .json::<ModelsResponse>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        Ok(models
            .models
            .into_iter()
            .map(|m| ModelDescriptor::new(m.name))
            .collect())
    }

    async fn stream_chat(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<IncrementStream, BackendError> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessageRequest {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let stream = response.bytes_stream();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        // The reader stops, dropping the HTTP response, as soon as the
        // receiving stream is dropped, even while the backend is silent.
        tokio::spawn(async move {
            let mut stream = stream;
            let mut buffer = Vec::new();

            loop {
                let chunk_result = tokio::select! {
                    _ = tx.closed() => {
                        debug!("chat stream dropped, closing response");
                        return;
                    }
                    next = stream.next() => match next {
                        Some(chunk_result) => chunk_result,
                        None => break,
                    },
                };
                match chunk_result {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);

                        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=pos).collect();
                            match parse_line(&line) {
                                LineEvent::Increment(text) => {
                                    if tx.send(Ok(text)).is_err() {
                                        return;
                                    }
                                }
                                LineEvent::Failed(e) => {
                                    let _ = tx.send(Err(e));
                                    return;
                                }
                                LineEvent::Done => return,
                                LineEvent::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(BackendError::from_reqwest(e)));
                        return;
                    }
                }
            }

            // Trailing record without a newline
            match parse_line(&buffer) {
                LineEvent::Increment(text) => {
                    let _ = tx.send(Ok(text));
                }
                LineEvent::Failed(e) => {
                    let _ = tx.send(Err(e));
                }
                LineEvent::Done | LineEvent::Skip => {}
            }
        });

        Ok(tokio_stream::wrappers::UnboundedReceiverStream::new(rx).boxed())
    }
}
