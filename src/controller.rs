//! The streaming response controller.
//!
//! Owns the single active generation request, pumps the backend stream in a
//! background task and relays cumulative text to the view. Stream tasks never
//! post to the view themselves: they report `(request id, event)` pairs back
//! to the controller, which forwards only what belongs to the live request.

use crate::backend::ChatBackend;
use crate::channel::{ControllerEndpoint, Inbox, Outbox, ToController, ToView};
use crate::error::BackendError;
use crate::registry::{ModelListFormat, ModelRegistry};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What happens to a backend stream once its request is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelMode {
    /// Keep reading until the backend finishes and throw the text away.
    #[default]
    Discard,
    /// Drop the stream right away, closing the connection to the backend.
    Abort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerOptions {
    pub cancel_mode: CancelMode,
    pub model_list_format: ModelListFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub id: u64,
    pub prompt: String,
    /// Empty when no model was selected; the backend rejects such requests.
    pub model: String,
    pub created_at: DateTime<Utc>,
}

struct ActiveRequest {
    request: GenerationRequest,
    handle: CancellationToken,
    buffer: String,
}

#[derive(Debug)]
enum StreamEventKind {
    Increment(String),
    Finished,
    Failed(BackendError),
    Aborted,
}

#[derive(Debug)]
struct StreamEvent {
    request_id: u64,
    kind: StreamEventKind,
}

pub struct Controller<B> {
    backend: Arc<B>,
    outbox: Outbox<ToView>,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: mpsc::UnboundedReceiver<StreamEvent>,
    registry: ModelRegistry,
    active: Option<ActiveRequest>,
    next_id: u64,
    options: ControllerOptions,
}

impl<B: ChatBackend> Controller<B> {
    pub fn new(backend: Arc<B>, outbox: Outbox<ToView>, options: ControllerOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            outbox,
            events_tx,
            events_rx,
            registry: ModelRegistry::new(),
            active: None,
            next_id: 1,
            options,
        }
    }

    /// Starts a controller on its own task, serving `endpoint` until the view
    /// side of the channel closes.
    pub fn spawn(
        backend: Arc<B>,
        endpoint: ControllerEndpoint,
        options: ControllerOptions,
    ) -> JoinHandle<()> {
        let (outbox, inbox) = endpoint.split();
        let controller = Self::new(backend, outbox, options);
        tokio::spawn(controller.run(inbox))
    }

    /// Loads the model list, then handles view messages and stream events
    /// until the view goes away. View messages win when both are ready.
    pub async fn run(mut self, mut inbox: Inbox<ToController>) {
        self.load_models().await;

        loop {
            tokio::select! {
                biased;
                message = inbox.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.apply(event),
            }
        }

        self.cancel();
        info!("view channel closed, controller stopped");
    }

    pub fn handle(&mut self, message: ToController) {
        match message {
            ToController::Chat(prompt) => {
                self.submit(prompt);
            }
            ToController::Cancel => {
                self.cancel();
            }
            ToController::ModelSelected(name) => self.select_model(name),
        }
    }

    /// Asks the backend for its models. Failures are logged and leave the
    /// selection unset; nothing is sent to the view.
    pub async fn load_models(&mut self) {
        let backend = Arc::clone(&self.backend);
        match self.registry.load(backend.as_ref()).await {
            Ok(models) => {
                info!("loaded {} models", models.len());
                let rendered = self.registry.render(self.options.model_list_format);
                self.post(ToView::ModelsLoaded(rendered));
            }
            Err(e) => warn!("failed to load models: {}", e),
        }
    }

    /// Starts a new request for `prompt`, cancelling the live one first.
    /// Returns the new request id.
    pub fn submit(&mut self, prompt: impl Into<String>) -> u64 {
        let model = self.registry.selected().map(str::to_string);
        self.start_request(prompt.into(), model)
    }

    fn start_request(&mut self, prompt: String, model: Option<String>) -> u64 {
        if let Some(previous) = self.active.take() {
            previous.handle.cancel();
            debug!(request = previous.request.id, "superseded by new submit");
        }

        let request = GenerationRequest {
            id: self.next_id,
            prompt,
            model: model.unwrap_or_default(),
            created_at: Utc::now(),
        };
        self.next_id += 1;

        let handle = CancellationToken::new();
        debug!(request = request.id, model = %request.model, "starting generation");

        tokio::spawn(pump(
            Arc::clone(&self.backend),
            request.clone(),
            handle.clone(),
            self.events_tx.clone(),
            self.options.cancel_mode,
        ));

        let id = request.id;
        self.active = Some(ActiveRequest {
            request,
            handle,
            buffer: String::new(),
        });
        id
    }

    /// Cancels the live request, if any. Emits nothing to the view.
    pub fn cancel(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                active.handle.cancel();
                debug!(request = active.request.id, "cancelled");
                true
            }
            None => false,
        }
    }

    pub fn select_model(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!(model = %name, "model selected");
        self.registry.select(name);
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.registry.selected()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn active_request(&self) -> Option<&GenerationRequest> {
        self.active.as_ref().map(|a| &a.request)
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Waits for the next event from any running stream and applies it.
    ///
    /// For hosts that drive the controller without [`Controller::run`].
    pub async fn process_stream_event(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: StreamEvent) {
        let is_live = self
            .active
            .as_ref()
            .is_some_and(|a| a.request.id == event.request_id && !a.handle.is_cancelled());
        if !is_live {
            debug!(request = event.request_id, "dropping event for stale request");
            return;
        }

        match event.kind {
            StreamEventKind::Increment(text) => {
                if let Some(active) = self.active.as_mut() {
                    active.buffer.push_str(&text);
                    let snapshot = active.buffer.clone();
                    self.post(ToView::ChatResponse(snapshot));
                }
            }
            StreamEventKind::Finished => {
                self.active = None;
                debug!(request = event.request_id, "generation complete");
                self.post(ToView::ResponseEnd(String::new()));
            }
            StreamEventKind::Failed(e) => {
                self.active = None;
                error!(request = event.request_id, "generation failed: {}", e);
                self.post(ToView::ResponseEnd(e.user_message()));
            }
            StreamEventKind::Aborted => {
                self.active = None;
            }
        }
    }

    fn post(&self, message: ToView) {
        if self.outbox.post(message).is_err() {
            debug!("view channel closed, message dropped");
        }
    }
}

/// Reads one backend stream and reports it to the controller.
///
/// The handle is checked once per increment. Always ends with a terminal
/// event so the controller can tell the stream is over.
async fn pump<B: ChatBackend>(
    backend: Arc<B>,
    request: GenerationRequest,
    handle: CancellationToken,
    events: mpsc::UnboundedSender<StreamEvent>,
    mode: CancelMode,
) {
    let id = request.id;
    let send = |kind: StreamEventKind| {
        let _ = events.send(StreamEvent {
            request_id: id,
            kind,
        });
    };

    let started = match mode {
        CancelMode::Discard => backend.stream_chat(&request.model, &request.prompt).await,
        CancelMode::Abort => {
            tokio::select! {
                biased;
                _ = handle.cancelled() => return send(StreamEventKind::Aborted),
                started = backend.stream_chat(&request.model, &request.prompt) => started,
            }
        }
    };

    let mut stream = match started {
        Ok(stream) => stream,
        Err(e) => return send(StreamEventKind::Failed(e)),
    };

    let mut discarded = 0usize;
    loop {
        let next = match mode {
            CancelMode::Discard => stream.next().await,
            CancelMode::Abort => {
                tokio::select! {
                    biased;
                    _ = handle.cancelled() => {
                        debug!(request = id, "stream aborted");
                        return send(StreamEventKind::Aborted);
                    }
                    next = stream.next() => next,
                }
            }
        };

        match next {
            Some(Ok(text)) => {
                if handle.is_cancelled() {
                    discarded += 1;
                    continue;
                }
                send(StreamEventKind::Increment(text));
            }
            Some(Err(e)) => return send(StreamEventKind::Failed(e)),
            None => break,
        }
    }

    if discarded > 0 {
        debug!(request = id, discarded, "stream finished after cancellation");
    }
    send(StreamEventKind::Finished);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IncrementStream, ModelDescriptor};
    use crate::channel::{self, ViewEndpoint};
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Streams a fixed script per prompt and records every call.
    #[derive(Default)]
    struct ScriptedBackend {
        models: Option<Vec<ModelDescriptor>>,
        scripts: HashMap<String, Vec<Result<String, BackendError>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedBackend {
        fn with_models(names: &[&str]) -> Self {
            Self {
                models: Some(names.iter().map(|n| ModelDescriptor::new(*n)).collect()),
                ..Self::default()
            }
        }

        fn script(mut self, prompt: &str, items: Vec<Result<&str, BackendError>>) -> Self {
            self.scripts.insert(
                prompt.to_string(),
                items.into_iter().map(|i| i.map(str::to_string)).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn list_models(&self) -> Result<Vec<ModelDescriptor>, BackendError> {
            self.models
                .clone()
                .ok_or_else(|| BackendError::Connection("connection refused".to_string()))
        }

        async fn stream_chat(
            &self,
            model: &str,
            prompt: &str,
        ) -> Result<IncrementStream, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.to_string()));
            if model.is_empty() {
                return Err(BackendError::Status {
                    status: 400,
                    message: "model is required".to_string(),
                });
            }
            let items = self.scripts.get(prompt).cloned().unwrap_or_default();
            Ok(stream::iter(items).boxed())
        }
    }

    fn setup(backend: ScriptedBackend) -> (Controller<ScriptedBackend>, ViewEndpoint) {
        let (view, endpoint) = channel::pair();
        let (outbox, _inbox) = endpoint.split();
        let controller = Controller::new(Arc::new(backend), outbox, ControllerOptions::default());
        (controller, view)
    }

    fn drain(view: &mut ViewEndpoint) -> Vec<ToView> {
        std::iter::from_fn(|| view.try_recv()).collect()
    }

    #[tokio::test]
    async fn test_streams_cumulative_text_then_success_end() {
        let backend =
            ScriptedBackend::with_models(&["m1"]).script("Hello", vec![Ok("Hi"), Ok(" there")]);
        let (mut controller, mut view) = setup(backend);
        controller.load_models().await;
        assert_eq!(
            drain(&mut view),
            vec![ToView::ModelsLoaded("<option value=\"m1\" selected>m1</option>".to_string())]
        );

        controller.submit("Hello");
        assert_eq!(controller.active_request().unwrap().model, "m1");
        for _ in 0..3 {
            controller.process_stream_event().await;
        }

        assert_eq!(
            drain(&mut view),
            vec![
                ToView::ChatResponse("Hi".to_string()),
                ToView::ChatResponse("Hi there".to_string()),
                ToView::ResponseEnd(String::new()),
            ]
        );
        assert!(!controller.is_busy());
        assert_eq!(
            *controller.backend.calls.lock().unwrap(),
            vec![("m1".to_string(), "Hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_prompt_is_passed_through() {
        let backend = ScriptedBackend::with_models(&["m1"]).script("", vec![Ok("?")]);
        let (mut controller, mut view) = setup(backend);
        controller.load_models().await;
        drain(&mut view);

        controller.submit("");
        controller.process_stream_event().await;
        controller.process_stream_event().await;

        assert_eq!(
            drain(&mut view),
            vec![
                ToView::ChatResponse("?".to_string()),
                ToView::ResponseEnd(String::new())
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_without_active_request_is_noop() {
        let (mut controller, mut view) = setup(ScriptedBackend::with_models(&["m1"]));
        assert!(!controller.cancel());
        assert!(!controller.is_busy());
        assert!(drain(&mut view).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_first_increment_relays_nothing() {
        let backend =
            ScriptedBackend::with_models(&["m1"]).script("Hello", vec![Ok("Hi"), Ok(" there")]);
        let (mut controller, mut view) = setup(backend);
        controller.load_models().await;
        drain(&mut view);

        controller.submit("Hello");
        assert!(controller.cancel());
        // Discard mode still reads the stream to its end.
        controller.process_stream_event().await;

        assert!(drain(&mut view).is_empty());
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_new_submit_supersedes_previous_request() {
        let backend = ScriptedBackend::with_models(&["m1"])
            .script("first", vec![Ok("a1"), Ok("a2")])
            .script("second", vec![Ok("b1"), Ok("b2")]);
        let (mut controller, mut view) = setup(backend);
        controller.load_models().await;
        drain(&mut view);

        let first = controller.submit("first");
        let second = controller.submit("second");
        assert_ne!(first, second);
        assert_eq!(controller.active_request().unwrap().id, second);

        // first: Finished only (increments discarded); second: b1, b2, Finished
        for _ in 0..4 {
            controller.process_stream_event().await;
        }

        assert_eq!(
            drain(&mut view),
            vec![
                ToView::ChatResponse("b1".to_string()),
                ToView::ChatResponse("b1b2".to_string()),
                ToView::ResponseEnd(String::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_becomes_error_end() {
        let backend = ScriptedBackend::with_models(&["m1"]).script(
            "Hello",
            vec![Ok("Hi"), Err(BackendError::Stream("fetch failed".to_string()))],
        );
        let (mut controller, mut view) = setup(backend);
        controller.load_models().await;
        drain(&mut view);

        controller.submit("Hello");
        controller.process_stream_event().await;
        controller.process_stream_event().await;

        let messages = drain(&mut view);
        assert_eq!(messages[0], ToView::ChatResponse("Hi".to_string()));
        match &messages[1] {
            ToView::ResponseEnd(text) => {
                assert!(text.contains("fetch failed"));
                assert!(text.contains(crate::error::UNREACHABLE_HINT));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_failed_model_load_then_submit_reports_error() {
        let backend = ScriptedBackend::default();
        let (mut controller, mut view) = setup(backend);
        controller.load_models().await;

        assert!(drain(&mut view).is_empty());
        assert_eq!(controller.selected_model(), None);

        controller.submit("Hello");
        assert_eq!(controller.active_request().unwrap().model, "");
        controller.process_stream_event().await;

        assert_eq!(
            drain(&mut view),
            vec![ToView::ResponseEnd(
                "Error: model is required (HTTP 400)".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_selected_model_is_used_for_next_submit() {
        let backend = ScriptedBackend::with_models(&["m1", "m2"]).script("Hello", vec![Ok("x")]);
        let (mut controller, mut view) = setup(backend);
        controller.load_models().await;
        drain(&mut view);

        controller.handle(ToController::ModelSelected("m2".to_string()));
        assert!(drain(&mut view).is_empty());
        assert_eq!(controller.selected_model(), Some("m2"));

        controller.submit("Hello");
        assert_eq!(controller.active_request().unwrap().model, "m2");
    }

    #[tokio::test]
    async fn test_abort_mode_stops_reading() {
        let backend = ScriptedBackend::with_models(&["m1"]).script("Hello", vec![Ok("Hi")]);
        let (mut view, endpoint) = channel::pair();
        let (outbox, _inbox) = endpoint.split();
        let mut controller = Controller::new(
            Arc::new(backend),
            outbox,
            ControllerOptions {
                cancel_mode: CancelMode::Abort,
                ..ControllerOptions::default()
            },
        );

        controller.submit("Hello");
        controller.cancel();
        controller.process_stream_event().await;

        assert!(drain(&mut view).is_empty());
        assert!(!controller.is_busy());
    }
}
