use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use deepchat::app::{Action, App};
use deepchat::bridge;
use deepchat::channel::{self, ViewEndpoint};
use deepchat::config::Config;
use deepchat::controller::Controller;
use deepchat::logging::init_logging;
use deepchat::ollama::OllamaClient;
use deepchat::registry::ModelListFormat;
use deepchat::ui::ui;

#[derive(Parser, Debug)]
#[command(name = "deepchat", version, about = "Chat with a local Ollama server from your editor")]
struct Cli {
    /// Path to a config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ollama base URL, overriding the config file
    #[arg(long, global = true)]
    ollama_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Exchange JSON-lines messages with an editor over stdin/stdout
    Serve,
    /// Run the chat panel in the terminal
    Tui,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .map_err(|e| eyre!("{:#}", e))?;
    if let Some(url) = cli.ollama_url {
        config.ollama_url = url;
    }

    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let command = cli.command.unwrap_or(Command::Serve);
    let mut options = config.controller_options();
    if command == Command::Tui {
        options.model_list_format = ModelListFormat::Plain;
    }
    info!(url = %config.ollama_url, ?command, "starting");

    let backend = Arc::new(OllamaClient::new(config.ollama_url.clone()));
    let (view, endpoint) = channel::pair();
    let controller = Controller::spawn(backend, endpoint, options);

    match command {
        Command::Serve => bridge::serve_stdio(view)
            .await
            .map_err(|e| eyre!("{:#}", e))?,
        Command::Tui => run_tui(view).await?,
    }

    controller.await?;
    Ok(())
}

async fn run_tui(view: ViewEndpoint) -> color_eyre::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (outbox, mut inbox) = view.split();
    let (action_tx, mut action_rx) = mpsc::unbounded_channel();

    // Terminal input; stops once the app loop is gone
    {
        let tx = action_tx.clone();
        tokio::task::spawn_blocking(move || loop {
            let action = match event::poll(std::time::Duration::from_millis(100)) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        Some(Action::UserInput(key))
                    }
                    Ok(Event::Mouse(mouse)) => match mouse.kind {
                        MouseEventKind::ScrollUp => Some(Action::Scroll(-3)),
                        MouseEventKind::ScrollDown => Some(Action::Scroll(3)),
                        _ => None,
                    },
                    Ok(Event::Resize(w, h)) => Some(Action::Resize(w, h)),
                    Ok(_) => None,
                    Err(_) => break,
                },
                Ok(false) => None,
                Err(_) => break,
            };
            if let Some(action) = action {
                if tx.send(action).is_err() {
                    break;
                }
            } else if tx.is_closed() {
                break;
            }
        });
    }

    // Controller messages
    {
        let tx = action_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                if tx.send(Action::Inbound(message)).is_err() {
                    break;
                }
            }
        });
    }

    let _ = action_tx.send(Action::Render);
    drop(action_tx);

    let mut app = App::new(outbox);
    let res = run_app(&mut terminal, &mut app, &mut action_rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App<'_>,
    action_rx: &mut mpsc::UnboundedReceiver<Action>,
) -> color_eyre::Result<()> {
    let tick_rate = std::time::Duration::from_millis(100);

    loop {
        tokio::select! {
            action = action_rx.recv() => {
                let Some(action) = action else {
                    return Ok(());
                };
                if app.update(action) {
                    terminal.draw(|f| ui(f, app))?;
                }
                if app.should_quit {
                    return Ok(());
                }
            }
            _ = tokio::time::sleep(tick_rate) => {
                if app.view.busy {
                    app.spinner_state.calc_next();
                    terminal.draw(|f| ui(f, app))?;
                }
            }
        }
    }
}
