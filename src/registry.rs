use crate::backend::{ChatBackend, ModelDescriptor};
use crate::error::BackendError;
use serde::Deserialize;

/// How the model list is rendered for the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelListFormat {
    /// `<option>` elements for a webview `<select>`.
    #[default]
    Html,
    /// One model name per line.
    Plain,
}

/// Models discovered at startup plus the current selection.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    selected: Option<String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the model list from the backend and selects the first entry.
    ///
    /// On failure the registry is left untouched.
    pub async fn load<B: ChatBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<&[ModelDescriptor], BackendError> {
        let models = backend.list_models().await?;
        self.selected = models.first().map(|m| m.name.clone());
        self.models = models;
        Ok(&self.models)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Stores `name` as the selection. Unknown names are accepted as-is.
    pub fn select(&mut self, name: impl Into<String>) {
        self.selected = Some(name.into());
    }

    pub fn render(&self, format: ModelListFormat) -> String {
        match format {
            ModelListFormat::Html => self
                .models
                .iter()
                .map(|m| {
                    let name = escape_html(&m.name);
                    if self.selected.as_deref() == Some(m.name.as_str()) {
                        format!("<option value=\"{name}\" selected>{name}</option>")
                    } else {
                        format!("<option value=\"{name}\">{name}</option>")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
            ModelListFormat::Plain => self
                .models
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
