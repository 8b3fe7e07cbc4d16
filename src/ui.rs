use crate::app::{App, Focus};
use crate::view::ResponseView;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use throbber_widgets_tui::Throbber;

const HELP_TEXT: &str = "Controls:\n\n Enter: Ask / Stop\n Shift+Enter: New Line\n Esc: Stop generating\n Tab: Switch between prompt and models\n Up/Down: Move in model list\n Enter (models): Select model\n PgUp/PgDn: Scroll response\n F1: Help\n Ctrl+c: Quit";

/// Draws the whole panel from the current app state.
pub fn ui(f: &mut Frame, app: &mut App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(1),    // Response + models
            Constraint::Length((3 + app.input.lines().len().saturating_sub(1) as u16).min(10)),
            Constraint::Length(1), // Button
        ])
        .split(size);

    render_header(f, app, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(chunks[1]);
    render_response(f, app, body[0]);
    render_models(f, app, body[1]);

    let border_color = app.input_border_color();
    app.input.set_block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border_color))
            .title(" Prompt "),
    );
    f.render_widget(&app.input, chunks[2]);

    render_button(f, app, chunks[3]);

    if app.show_help {
        let block = Block::default()
            .title(" Help ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded);
        let area = centered_rect(60, 60, size);
        f.render_widget(Clear, area);
        f.render_widget(Paragraph::new(HELP_TEXT).block(block), area);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let model_name = app.view.selected_model.as_deref().unwrap_or("No Model");
    let title = format!(" deepchat - {} (F1 for Help) ", model_name);
    let header = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().fg(Color::Cyan))
        .border_type(BorderType::Rounded);
    f.render_widget(header, area);
}

fn render_response(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(" Response ");

    let paragraph = match &app.view.response {
        ResponseView::Empty => Paragraph::new("Type a prompt below and press Enter.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray)),
        ResponseView::Markdown(text) => Paragraph::new(tui_markdown::from_str(text)),
        ResponseView::Error(text) => {
            Paragraph::new(Text::from(text.as_str())).style(Style::default().fg(Color::Red))
        }
    };

    f.render_widget(
        paragraph
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((app.vertical_scroll, 0)),
        area,
    );
}

fn render_models(f: &mut Frame, app: &App, area: Rect) {
    let border_color = if app.focus == Focus::Models {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color))
        .title(" Models ");

    let names = app.view.model_names();
    if names.is_empty() {
        let p = Paragraph::new("No models loaded")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let selected = app.view.selected_model.as_deref();
    let items: Vec<ListItem> = names
        .iter()
        .map(|name| {
            let marker = if Some(*name) == selected { "● " } else { "  " };
            ListItem::new(Line::from(vec![Span::raw(marker), Span::raw(name.to_string())]))
        })
        .collect();

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(Color::Blue)
            .add_modifier(Modifier::BOLD),
    );
    let mut state = ListState::default();
    if app.focus == Focus::Models {
        state.select(Some(app.model_cursor));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn render_button(f: &mut Frame, app: &mut App, area: Rect) {
    if app.view.busy {
        let throbber = Throbber::default()
            .label(format!("[ {} ] generating... (Esc)", app.view.button_label()))
            .throbber_style(
                Style::default()
                    .fg(Color::LightCyan)
                    .add_modifier(Modifier::BOLD),
            );
        f.render_stateful_widget(throbber, area, &mut app.spinner_state);
    } else {
        let button = Paragraph::new(format!("[ {} ] (Enter)", app.view.button_label()))
            .style(Style::default().fg(Color::Green));
        f.render_widget(button, area);
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{self, ToView};
    use ratatui::{backend::TestBackend, Terminal};

    fn screen(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| ui(f, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_idle_screen_shows_ask_and_models() {
        let (view, _controller) = channel::pair();
        let (outbox, _inbox) = view.split();
        let mut app = App::new(outbox);
        app.update(crate::app::Action::Inbound(ToView::ModelsLoaded(
            "m1\nm2".to_string(),
        )));

        let text = screen(&mut app);
        assert!(text.contains("[ Ask ]"));
        assert!(text.contains("deepchat - m1"));
        assert!(text.contains("m2"));
    }

    #[test]
    fn test_busy_screen_shows_stop_and_errors_in_response() {
        let (view, _controller) = channel::pair();
        let (outbox, _inbox) = view.split();
        let mut app = App::new(outbox);

        app.press_button();
        assert!(screen(&mut app).contains("Stop"));

        app.update(crate::app::Action::Inbound(ToView::ResponseEnd(
            "Error: model is required".to_string(),
        )));
        let text = screen(&mut app);
        assert!(text.contains("[ Ask ]"));
        assert!(text.contains("Error: model is required"));
    }
}
