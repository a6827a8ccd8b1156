use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::api::ApiClient;
use crate::chat::{ChatSession, Message, Replier, Role, Turn};
use crate::clipboard::{Clipboard, CopyMarker};
use crate::config::{Mode, Settings};
use crate::error::ApiError;
use crate::login::{self, LoginForm, LoginOutcome};
use crate::session::TokenStore;
use crate::speech::{self, AudioPlayer, ProcessPlayer, SpeechController, SpeechRequest};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub mode: Mode,
    pub base_url: String,

    // Controllers
    pub chat: ChatSession,
    pub input_cursor: usize, // char position in chat.input
    pub login: LoginForm,
    pub speech: SpeechController,
    pub copy_marker: CopyMarker,

    // Message selection for copy/speak, index into chat.messages
    pub selected: Option<usize>,

    // Chat view geometry, updated during render
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Animation state
    pub animation_frame: u8,

    clipboard: Clipboard,
    replier: Replier,
    api: ApiClient,
    player: Arc<dyn AudioPlayer>,
    cache_dir: PathBuf,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        settings: &Settings,
        tokens: Arc<dyn TokenStore>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let player: Arc<dyn AudioPlayer> = Arc::new(ProcessPlayer::new(settings.player.clone()));
        Self::with_player(settings, tokens, player, events)
    }

    pub fn with_player(
        settings: &Settings,
        tokens: Arc<dyn TokenStore>,
        player: Arc<dyn AudioPlayer>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let api = ApiClient::new(&settings.base_url, tokens);
        let replier = match settings.mode {
            Mode::Mock => Replier::mock(),
            Mode::Live => Replier::Backend(api.clone()),
        };

        // Without a session there is nothing to talk to, unless replies are mocked
        let screen = if settings.mode.is_mock() || api.tokens().token().is_some() {
            Screen::Chat
        } else {
            Screen::Login
        };

        tracing::info!(mode = settings.mode.display_name(), base_url = %settings.base_url, "app started");

        Self {
            should_quit: false,
            screen,
            input_mode: InputMode::Editing,
            mode: settings.mode,
            base_url: settings.base_url.clone(),

            chat: ChatSession::new(),
            input_cursor: 0,
            login: LoginForm::new(),
            speech: SpeechController::new(settings.mode),
            copy_marker: CopyMarker::new(),

            selected: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            clipboard: Clipboard::new(),
            replier,
            api,
            player,
            cache_dir: settings.cache_dir.clone(),
            events,
        }
    }

    // Chat input

    /// Feed a new input buffer through the newline send heuristic.
    pub fn set_chat_input(&mut self, buffer: String) {
        let turn = self.chat.set_input(buffer);
        self.input_cursor = self.input_cursor.min(self.chat.input.chars().count());
        if let Some(turn) = turn {
            self.dispatch_turn(turn);
        }
    }

    pub fn send_chat(&mut self) {
        if let Some(turn) = self.chat.send() {
            self.dispatch_turn(turn);
        }
    }

    fn dispatch_turn(&mut self, turn: Turn) {
        self.input_cursor = 0;
        self.scroll_chat_to_bottom();

        let replier = self.replier.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = replier.reply(&turn).await;
            let _ = tx.send(AppEvent::TurnResolved {
                placeholder_id: turn.placeholder_id,
                result,
            });
        });
    }

    pub fn turn_resolved(&mut self, placeholder_id: &str, result: Result<String, ApiError>) {
        self.chat.resolve(placeholder_id, result);
        self.scroll_chat_to_bottom();
    }

    // Login

    pub fn open_login(&mut self) {
        self.screen = Screen::Login;
    }

    pub fn submit_login(&mut self) {
        let Some(credentials) = self.login.begin() else {
            return;
        };

        let api = self.api.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let outcome = login::attempt(&api, &credentials).await;
            let _ = tx.send(AppEvent::LoginFinished(outcome));
        });
    }

    pub fn login_finished(&mut self, outcome: LoginOutcome) {
        if self.login.finish(outcome, self.api.tokens().as_ref()) {
            self.screen = Screen::Chat;
            self.input_mode = InputMode::Editing;
        }
    }

    // Message actions

    /// Messages that offer copy and speech: settled assistant replies
    fn actionable(msg: &Message) -> bool {
        msg.role == Role::Assistant && !msg.pending
    }

    pub fn selected_message(&self) -> Option<&Message> {
        self.selected
            .and_then(|i| self.chat.messages.get(i))
            .filter(|m| Self::actionable(m))
    }

    pub fn select_next(&mut self) {
        let start = self.selected.map(|i| i + 1).unwrap_or(0);
        if let Some(i) = (start..self.chat.messages.len()).find(|&i| Self::actionable(&self.chat.messages[i])) {
            self.selected = Some(i);
        }
    }

    pub fn select_prev(&mut self) {
        let end = self.selected.unwrap_or(self.chat.messages.len());
        if let Some(i) = (0..end).rev().find(|&i| Self::actionable(&self.chat.messages[i])) {
            self.selected = Some(i);
        }
    }

    pub fn copy_selected(&mut self) {
        let Some(msg) = self.selected_message() else {
            return;
        };
        let (id, text) = (msg.id.clone(), msg.text.clone());

        match self.clipboard.copy(&text) {
            Ok(()) => self.copy_marker.mark(&id, Instant::now()),
            Err(e) => tracing::warn!(id = %id, error = %e, "clipboard copy failed"),
        }
    }

    pub fn speak_selected(&mut self) {
        let Some(msg) = self.selected_message() else {
            return;
        };
        let (id, text) = (msg.id.clone(), msg.text.clone());
        self.speak(id, text);
    }

    pub fn speak(&mut self, id: String, text: String) {
        match self.speech.toggle(&id, &text) {
            SpeechRequest::Stopped | SpeechRequest::Mocked => {}
            SpeechRequest::Play(path) => self.start_playback(&id, path),
            SpeechRequest::Fetch => {
                let api = self.api.clone();
                let cache_dir = self.cache_dir.clone();
                let tx = self.events.clone();
                tokio::spawn(async move {
                    let result = speech::fetch_to_cache(&api, &cache_dir, &id, &text).await;
                    let _ = tx.send(AppEvent::SpeechFetched { id, result });
                });
            }
        }
    }

    pub fn speech_fetched(&mut self, id: &str, result: Result<PathBuf, ApiError>) {
        if let Some(path) = self.speech.fetched(id, result) {
            self.start_playback(id, path);
        }
    }

    fn start_playback(&mut self, id: &str, path: PathBuf) {
        let Some(watch) = self.speech.play(id, &path, self.player.as_ref()) else {
            return;
        };

        let tx = self.events.clone();
        tokio::spawn(async move {
            if watch.finished.await.is_ok() {
                let _ = tx.send(AppEvent::PlaybackFinished { token: watch.token });
            }
        });
    }

    pub fn playback_finished(&mut self, token: u64) {
        self.speech.finished(token);
    }

    /// Stop any audio before exit.
    pub fn shutdown(&mut self) {
        self.speech.stop();
    }

    // Ticks

    pub fn tick(&mut self) {
        if self.chat.is_sending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.copy_marker.tick(Instant::now());
    }

    // Scrolling

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1).min(self.max_chat_scroll());
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    fn max_chat_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_line_count().saturating_sub(visible_height)
    }

    /// Rendered line count of the log at the current width: a role line, the
    /// wrapped text, an actions line for replies, and a blank separator.
    fn chat_line_count(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total: usize = 0;
        for msg in &self.chat.messages {
            total += 1;
            for line in msg.text.lines() {
                let chars = line.chars().count();
                total += if chars == 0 { 1 } else { chars.div_ceil(wrap_width) };
            }
            if Self::actionable(msg) {
                total += 1;
            }
            total += 1;
        }
        u16::try_from(total).unwrap_or(u16::MAX)
    }
}
