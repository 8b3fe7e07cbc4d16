//! View-side state of the chat panel.
//!
//! `ViewState` is what a host renders. User gestures go through [`ViewState::click`]
//! and [`ViewState::select_model`], which return the message to send; inbound
//! controller messages go through [`ViewState::apply`].

use crate::channel::{ToController, ToView};

pub const ASK_LABEL: &str = "Ask";
pub const STOP_LABEL: &str = "Stop";

/// Content of the response area.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponseView {
    #[default]
    Empty,
    /// Response text, rendered as Markdown.
    Markdown(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewState {
    pub busy: bool,
    pub prompt: String,
    pub response: ResponseView,
    /// Model list exactly as rendered by the controller.
    pub model_list: String,
    pub selected_model: Option<String>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn button_label(&self) -> &'static str {
        if self.busy {
            STOP_LABEL
        } else {
            ASK_LABEL
        }
    }

    /// Action button pressed: asks when idle, cancels when busy.
    pub fn click(&mut self) -> ToController {
        if self.busy {
            self.busy = false;
            ToController::Cancel
        } else {
            self.busy = true;
            self.response = ResponseView::Empty;
            ToController::Chat(self.prompt.clone())
        }
    }

    pub fn select_model(&mut self, name: impl Into<String>) -> ToController {
        let name = name.into();
        self.selected_model = Some(name.clone());
        ToController::ModelSelected(name)
    }

    /// Applies a controller message. Response traffic that arrives while idle
    /// belongs to a request the user already cancelled and is ignored.
    pub fn apply(&mut self, message: ToView) {
        match message {
            ToView::ChatResponse(text) => {
                if self.busy {
                    self.response = ResponseView::Markdown(text);
                }
            }
            ToView::ResponseEnd(text) => {
                if !self.busy {
                    return;
                }
                if !text.is_empty() {
                    self.response = ResponseView::Error(text);
                }
                self.busy = false;
            }
            ToView::ModelsLoaded(list) => {
                self.model_list = list;
                if self.selected_model.is_none() {
                    let first = self.model_names().first().map(|s| s.to_string());
                    self.selected_model = first;
                }
            }
        }
    }

    /// Model names, assuming the list was rendered one name per line.
    pub fn model_names(&self) -> Vec<&str> {
        self.model_list
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }
}
