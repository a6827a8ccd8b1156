use clap::{Parser, Subcommand};
use anyhow::{Result, bail};
use std::sync::Arc;

mod api;
mod app;
mod chat;
mod clipboard;
mod config;
mod error;
mod handler;
mod logging;
mod login;
mod session;
mod speech;
mod tui;
mod ui;

use api::ApiClient;
use app::App;
use chat::{ChatSession, Replier};
use config::{Config, Mode, Overrides, Settings};
use login::LoginForm;
use session::{FileTokenStore, TokenStore};
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "chatdeck")]
#[command(version, about = "Terminal chat client with spoken replies")]
struct Cli {
    /// Use local stand-ins instead of the backend
    #[arg(long, global = true, conflicts_with = "live")]
    mock: bool,
    /// Talk to the backend
    #[arg(long, global = true)]
    live: bool,
    /// Backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in once and store the session token
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Send a single message and print the reply
    Ask {
        /// Message text
        message: String,
    },
    /// Write defaults to the config file
    Configure {
        /// Backend base URL to store
        #[arg(long)]
        server: Option<String>,
        /// Whether replies are mocked by default
        #[arg(long)]
        mock_replies: Option<bool>,
        /// Audio command; the file path is appended
        #[arg(long, num_args = 1..)]
        player: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::new(), Some(e)),
    };
    let overrides = Overrides {
        base_url: cli.base_url.clone(),
        mode: match (cli.mock, cli.live) {
            (true, _) => Some(Mode::Mock),
            (_, true) => Some(Mode::Live),
            _ => None,
        },
    };
    let settings = config.resolve(&overrides)?;

    if let Err(e) = logging::init(&settings.log_path) {
        eprintln!("logging disabled: {}", e);
    }
    if let Some(e) = config_error {
        tracing::warn!(error = %format!("{:#}", e), "config file unreadable, using defaults");
        eprintln!("warning: ignoring config file: {:#}", e);
    }

    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&settings.state_path));

    match cli.command {
        None => run_tui(&settings, tokens).await,
        Some(Commands::Login { email, password }) => login_once(&settings, tokens, email, password).await,
        Some(Commands::Ask { message }) => ask_once(&settings, tokens, message).await,
        Some(Commands::Configure { server, mock_replies, player }) => {
            configure(config, server, mock_replies, player)
        }
    }
}

fn configure(
    mut config: Config,
    server: Option<String>,
    mock_replies: Option<bool>,
    player: Option<Vec<String>>,
) -> Result<()> {
    if server.is_some() {
        config.base_url = server;
    }
    if mock_replies.is_some() {
        config.mock = mock_replies;
    }
    if player.is_some() {
        config.player = player;
    }
    config.save()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn run_tui(settings: &Settings, tokens: Arc<dyn TokenStore>) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(settings, tokens, events.sender());

    let result = event_loop(&mut terminal, &mut app, &mut events).await;

    app.shutdown();
    tui::restore()?;
    tracing::info!("exiting");
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

async fn login_once(
    settings: &Settings,
    tokens: Arc<dyn TokenStore>,
    email: String,
    password: String,
) -> Result<()> {
    let api = ApiClient::new(&settings.base_url, tokens.clone());
    let mut form = LoginForm {
        email,
        password,
        ..LoginForm::default()
    };

    let Some(credentials) = form.begin() else {
        bail!("a login attempt is already running");
    };
    let outcome = login::attempt(&api, &credentials).await;

    if form.finish(outcome, tokens.as_ref()) {
        println!("Logged in; session saved to {}", settings.state_path.display());
        Ok(())
    } else {
        bail!(form.message.unwrap_or_else(|| "Unauthorized".to_string()))
    }
}

async fn ask_once(settings: &Settings, tokens: Arc<dyn TokenStore>, message: String) -> Result<()> {
    let replier = match settings.mode {
        Mode::Mock => Replier::mock(),
        Mode::Live => Replier::Backend(ApiClient::new(&settings.base_url, tokens)),
    };

    let mut session = ChatSession::new();
    session.input = message;
    let Some(turn) = session.send() else {
        bail!("nothing to send");
    };

    let result = replier.reply(&turn).await;
    let failed = result.is_err();
    session.resolve(&turn.placeholder_id, result);

    if let Some(reply) = session.find(&turn.placeholder_id) {
        println!("{}", reply.text);
    }
    if failed {
        bail!("turn failed");
    }
    Ok(())
}
