use crate::channel::{Outbox, ToController, ToView};
use crate::view::ViewState;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, BorderType, Borders};
use throbber_widgets_tui::ThrobberState;
use tracing::debug;
use tui_textarea::{Input, TextArea};

#[derive(Debug, PartialEq, Clone)]
pub enum Action {
    Render,
    Resize(u16, u16),
    Quit,
    UserInput(KeyEvent),
    Inbound(ToView),
    Scroll(i16),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Focus {
    Prompt,
    Models,
}

/// Terminal host for the chat panel.
pub struct App<'a> {
    pub view: ViewState,
    pub outbox: Outbox<ToController>,
    pub input: TextArea<'a>,
    pub focus: Focus,
    pub model_cursor: usize,
    pub vertical_scroll: u16,
    pub spinner_state: ThrobberState,
    pub show_help: bool,
    pub should_quit: bool,
}

fn new_input<'a>() -> TextArea<'a> {
    let mut textarea = TextArea::default();
    // Disable default cursor line style (underline)
    textarea.set_cursor_line_style(Style::default());
    textarea.set_placeholder_text("Ask something...");
    textarea.set_block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Prompt "),
    );
    textarea
}

impl<'a> App<'a> {
    pub fn new(outbox: Outbox<ToController>) -> Self {
        Self {
            view: ViewState::new(),
            outbox,
            input: new_input(),
            focus: Focus::Prompt,
            model_cursor: 0,
            vertical_scroll: 0,
            spinner_state: ThrobberState::default(),
            show_help: false,
            should_quit: false,
        }
    }

    fn send(&self, message: ToController) {
        if self.outbox.post(message).is_err() {
            debug!("controller gone, message dropped");
        }
    }

    /// The Ask/Stop button.
    pub fn press_button(&mut self) {
        if !self.view.busy {
            self.view.prompt = self.input.lines().join("\n");
        }
        let message = self.view.click();
        if matches!(message, ToController::Chat(_)) {
            self.input = new_input();
            self.vertical_scroll = 0;
        }
        self.send(message);
    }

    fn choose_model(&mut self) {
        let name = self
            .view
            .model_names()
            .get(self.model_cursor)
            .map(|s| s.to_string());
        if let Some(name) = name {
            let message = self.view.select_model(name);
            self.send(message);
        }
    }

    fn sync_model_cursor(&mut self) {
        let names = self.view.model_names();
        self.model_cursor = self
            .view
            .selected_model
            .as_deref()
            .and_then(|selected| names.iter().position(|n| *n == selected))
            .unwrap_or(0);
    }

    pub fn input_border_color(&self) -> Color {
        if self.focus == Focus::Prompt {
            Color::Cyan
        } else {
            Color::DarkGray
        }
    }

    /// Returns true when the screen needs a redraw.
    pub fn update(&mut self, action: Action) -> bool {
        match action {
            Action::Render | Action::Resize(_, _) => true,
            Action::Quit => {
                self.should_quit = true;
                false
            }
            Action::Inbound(message) => {
                let models_changed = matches!(message, ToView::ModelsLoaded(_));
                self.view.apply(message);
                if models_changed {
                    self.sync_model_cursor();
                }
                true
            }
            Action::Scroll(delta) => {
                if delta > 0 {
                    self.vertical_scroll = self.vertical_scroll.saturating_add(delta as u16);
                } else {
                    self.vertical_scroll =
                        self.vertical_scroll.saturating_sub(delta.unsigned_abs());
                }
                true
            }
            Action::UserInput(key) => self.handle_key(key),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
            self.should_quit = true;
            return false;
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('q')) {
                self.show_help = false;
            }
            return true;
        }

        match key.code {
            KeyCode::F(1) => self.show_help = true,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Prompt => Focus::Models,
                    Focus::Models => Focus::Prompt,
                };
            }
            KeyCode::Esc if self.view.busy => self.press_button(),
            KeyCode::PageUp => self.vertical_scroll = self.vertical_scroll.saturating_sub(5),
            KeyCode::PageDown => self.vertical_scroll = self.vertical_scroll.saturating_add(5),
            _ => match self.focus {
                Focus::Prompt => match key.code {
                    KeyCode::Enter if !key.modifiers.contains(KeyModifiers::SHIFT) => {
                        self.press_button();
                    }
                    _ => {
                        self.input.input(Input::from(key));
                    }
                },
                Focus::Models => match key.code {
                    KeyCode::Up | KeyCode::Char('k') => {
                        self.model_cursor = self.model_cursor.saturating_sub(1);
                    }
                    KeyCode::Down | KeyCode::Char('j') => {
                        let count = self.view.model_names().len();
                        if self.model_cursor + 1 < count {
                            self.model_cursor += 1;
                        }
                    }
                    KeyCode::Enter => self.choose_model(),
                    _ => {}
                },
            },
        }
        true
    }
}
