//! The interactive event loop.
//!
//! One UI task owns all widget state. It draws, polls the terminal for
//! input, and drains [`SessionEvent`]s queued by background exchanges.
//! Background tasks never touch UI state directly; everything they know
//! arrives here through the channel, and everything the UI knows about chat
//! content comes from manager snapshots.

use std::collections::HashSet;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;

use crate::api::models::{fetch_models, sort_models};
use crate::api::ChatMessage;
use crate::core::chat_stream::{ChatStreamService, ExchangeParams, SessionEvent};
use crate::core::manager::ChatManager;
use crate::core::message::Role;
use crate::ui::renderer;

/// Shown in the settings overlay when the server's model listing is
/// unavailable.
pub const FALLBACK_MODELS: [&str; 3] = ["deepseek-r1", "gemma2", "mistral"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Input,
}

pub enum Overlay {
    None,
    ConfirmDelete {
        chat_id: String,
        title: String,
    },
    Settings {
        models: Vec<String>,
        selected: usize,
        loading: bool,
    },
}

pub struct App {
    pub manager: Arc<ChatManager>,
    pub client: reqwest::Client,
    pub base_url: String,
    /// Model recorded into chats created from now on.
    pub current_model: String,
    /// Selected chat id; `None` means the "New Chat" pseudo-entry.
    pub current_chat: Option<String>,
    pub input: String,
    pub focus: Focus,
    /// Sidebar cursor; 0 is "New Chat", then chats in listing order.
    pub list_index: usize,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub overlay: Overlay,
    /// Transient one-line notice (deletion failures and the like).
    pub status: Option<String>,
    /// Chats with an exchange in flight; sends to them are refused.
    pub streaming: HashSet<String>,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

enum LoopOutcome {
    Continue,
    Quit,
}

pub async fn run_chat(
    base_url: String,
    model: String,
    chats_dir: PathBuf,
) -> Result<(), Box<dyn Error>> {
    let manager = Arc::new(ChatManager::new(chats_dir));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let service = ChatStreamService::new(tx.clone(), Arc::clone(&manager));

    let mut app = App {
        manager,
        client: reqwest::Client::new(),
        base_url,
        current_model: model,
        current_chat: None,
        input: String::new(),
        focus: Focus::Input,
        list_index: 0,
        scroll_offset: 0,
        auto_scroll: true,
        overlay: Overlay::None,
        status: None,
        streaming: HashSet::new(),
        tx,
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = loop {
        if let Err(err) = terminal.draw(|f| renderer::ui(f, &app)) {
            break Err(err.into());
        }

        match pump_input(&mut app, &service, &terminal) {
            Ok(LoopOutcome::Quit) => break Ok(()),
            Ok(LoopOutcome::Continue) => {}
            Err(err) => break Err(err),
        }

        while let Ok(event) = rx.try_recv() {
            handle_session_event(&mut app, event);
        }
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn pump_input(
    app: &mut App,
    service: &ChatStreamService,
    terminal: &Terminal<CrosstermBackend<io::Stdout>>,
) -> Result<LoopOutcome, Box<dyn Error>> {
    if !event::poll(Duration::from_millis(50))? {
        return Ok(LoopOutcome::Continue);
    }

    if let Event::Key(key) = event::read()? {
        if key.kind == KeyEventKind::Press {
            let available_height = terminal
                .size()
                .map(|s| s.height)
                .unwrap_or_default()
                .saturating_sub(6);
            return Ok(handle_key(app, service, key, available_height));
        }
    }

    Ok(LoopOutcome::Continue)
}

fn handle_key(
    app: &mut App,
    service: &ChatStreamService,
    key: KeyEvent,
    available_height: u16,
) -> LoopOutcome {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return LoopOutcome::Quit;
    }

    match app.overlay {
        Overlay::ConfirmDelete { .. } => handle_delete_modal_key(app, key),
        Overlay::Settings { .. } => handle_settings_key(app, key),
        Overlay::None => handle_main_key(app, service, key, available_height),
    }

    LoopOutcome::Continue
}

fn handle_delete_modal_key(app: &mut App, key: KeyEvent) {
    let Overlay::ConfirmDelete { chat_id, .. } = &app.overlay else {
        return;
    };
    let chat_id = chat_id.clone();

    match key.code {
        KeyCode::Char('y') | KeyCode::Enter => {
            match app.manager.delete_chat(&chat_id) {
                Ok(()) => {
                    if app.current_chat.as_deref() == Some(chat_id.as_str()) {
                        app.current_chat = None;
                    }
                    app.list_index = app.list_index.min(app.manager.len());
                    app.status = None;
                    let _ = app.tx.send(SessionEvent::ChatListChanged);
                }
                Err(err) => {
                    app.status = Some(format!("Error deleting chat: {err}"));
                }
            }
            app.overlay = Overlay::None;
        }
        KeyCode::Char('n') | KeyCode::Esc => {
            app.overlay = Overlay::None;
        }
        _ => {}
    }
}

fn handle_settings_key(app: &mut App, key: KeyEvent) {
    let Overlay::Settings {
        models,
        selected,
        loading,
    } = &mut app.overlay
    else {
        return;
    };

    match key.code {
        KeyCode::Esc => {
            app.overlay = Overlay::None;
        }
        KeyCode::Up => {
            *selected = selected.saturating_sub(1);
        }
        KeyCode::Down => {
            if !models.is_empty() {
                *selected = (*selected + 1).min(models.len() - 1);
            }
        }
        KeyCode::Enter => {
            if !*loading {
                let chosen = models.get(*selected).cloned();
                if let Some(name) = chosen {
                    app.current_model = name;
                    app.status = Some(format!("Model for new chats: {}", app.current_model));
                }
                app.overlay = Overlay::None;
            }
        }
        _ => {}
    }
}

fn handle_main_key(
    app: &mut App,
    service: &ChatStreamService,
    key: KeyEvent,
    available_height: u16,
) {
    if key.code == KeyCode::Char('d') && key.modifiers.contains(KeyModifiers::CONTROL) {
        open_settings(app);
        return;
    }

    if key.code == KeyCode::Tab {
        app.focus = match app.focus {
            Focus::Sidebar => Focus::Input,
            Focus::Input => Focus::Sidebar,
        };
        return;
    }

    match app.focus {
        Focus::Sidebar => handle_sidebar_key(app, key),
        Focus::Input => handle_input_key(app, service, key, available_height),
    }
}

fn open_settings(app: &mut App) {
    app.overlay = Overlay::Settings {
        models: Vec::new(),
        selected: 0,
        loading: true,
    };
    spawn_models_loader(app.client.clone(), app.base_url.clone(), app.tx.clone());
}

fn handle_sidebar_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Up => {
            app.list_index = app.list_index.saturating_sub(1);
        }
        KeyCode::Down => {
            app.list_index = (app.list_index + 1).min(app.manager.len());
        }
        KeyCode::Enter => {
            if app.list_index == 0 {
                app.current_chat = None;
                app.input.clear();
            } else if let Some(chat) = app.manager.list_all().get(app.list_index - 1) {
                app.current_chat = Some(chat.id.to_string());
                app.auto_scroll = true;
            }
            app.focus = Focus::Input;
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            if app.list_index > 0 {
                if let Some(chat) = app.manager.list_all().get(app.list_index - 1) {
                    app.overlay = Overlay::ConfirmDelete {
                        chat_id: chat.id.to_string(),
                        title: chat.title.clone(),
                    };
                }
            }
        }
        _ => {}
    }
}

fn handle_input_key(
    app: &mut App,
    service: &ChatStreamService,
    key: KeyEvent,
    available_height: u16,
) {
    match key.code {
        KeyCode::Enter => send_message(app, service),
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Up => {
            app.auto_scroll = false;
            app.scroll_offset = app.scroll_offset.saturating_sub(1);
        }
        KeyCode::Down => {
            let current = app
                .current_chat
                .as_ref()
                .and_then(|id| app.manager.get_by_id(id));
            let max_scroll = renderer::max_scroll_offset(current.as_ref(), available_height);
            app.scroll_offset = (app.scroll_offset + 1).min(max_scroll);
            if app.scroll_offset >= max_scroll {
                app.auto_scroll = true;
            }
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.push(c);
        }
        _ => {}
    }
}

/// The send-message intent: resolve (or create) the target chat, append the
/// user turn and the empty assistant placeholder, snapshot history, and hand
/// the exchange to the stream service.
fn send_message(app: &mut App, service: &ChatStreamService) {
    let text = app.input.trim().to_string();
    if text.is_empty() {
        return;
    }

    if let Some(id) = &app.current_chat {
        if app.streaming.contains(id) {
            app.status = Some("A reply is still streaming in this chat".to_string());
            return;
        }
    }
    app.input.clear();
    app.status = None;

    let chat_id = match &app.current_chat {
        Some(id) => id.clone(),
        None => {
            let title = format!("Chat {}", app.manager.len() + 1);
            let (chat, saved) = app.manager.create_chat(&title, &app.current_model);
            if let Err(err) = saved {
                app.status = Some(format!("Chat not saved: {err}"));
            }
            let id = chat.id.to_string();
            app.current_chat = Some(id.clone());
            app.list_index = app.manager.len();
            let _ = app.tx.send(SessionEvent::ChatListChanged);
            id
        }
    };

    if let Err(err) = app.manager.append_message(&chat_id, Role::User, &text) {
        app.status = Some(format!("Error adding message: {err}"));
        return;
    }
    if let Err(err) = app.manager.append_message(&chat_id, Role::Assistant, "") {
        app.status = Some(format!("Error creating reply placeholder: {err}"));
        return;
    }
    app.auto_scroll = true;

    let Some(chat) = app.manager.get_by_id(&chat_id) else {
        return;
    };
    // History excludes the placeholder the reply streams into.
    let history: Vec<ChatMessage> = chat.messages[..chat.messages.len() - 1]
        .iter()
        .map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();

    app.streaming.insert(chat_id.clone());
    service.spawn_exchange(ExchangeParams {
        client: app.client.clone(),
        base_url: app.base_url.clone(),
        chat_id,
        model: chat.model.clone(),
        history,
    });
}

fn handle_session_event(app: &mut App, event: SessionEvent) {
    match event {
        SessionEvent::ChatListChanged => {}
        SessionEvent::ChatContentChanged { .. } => {
            // Content is re-read from the manager on the next draw; nothing
            // to copy here.
        }
        SessionEvent::ExchangeCompleted { chat_id } => {
            app.streaming.remove(&chat_id);
        }
        SessionEvent::ExchangeFailed { chat_id, error } => {
            app.streaming.remove(&chat_id);
            app.status = Some(error);
        }
        SessionEvent::ModelsLoaded { models } => {
            let current_model = app.current_model.clone();
            if let Overlay::Settings {
                models: list,
                selected,
                loading,
            } = &mut app.overlay
            {
                *selected = models
                    .iter()
                    .position(|name| *name == current_model)
                    .unwrap_or(0);
                *list = models;
                *loading = false;
            }
        }
        SessionEvent::ModelsLoadFailed { error } => {
            let mut failed = false;
            if let Overlay::Settings {
                models: list,
                selected,
                loading,
            } = &mut app.overlay
            {
                *list = FALLBACK_MODELS.iter().map(|s| s.to_string()).collect();
                *selected = 0;
                *loading = false;
                failed = true;
            }
            if failed {
                app.status = Some(format!("Could not list models: {error}"));
            }
        }
    }
}

fn spawn_models_loader(
    client: reqwest::Client,
    base_url: String,
    tx: mpsc::UnboundedSender<SessionEvent>,
) {
    tokio::spawn(async move {
        let fetched = fetch_models(&client, &base_url)
            .await
            .map_err(|e| e.to_string());
        match fetched {
            Ok(mut response) => {
                sort_models(&mut response.models);
                let models = response.models.into_iter().map(|m| m.name).collect();
                let _ = tx.send(SessionEvent::ModelsLoaded { models });
            }
            Err(error) => {
                let _ = tx.send(SessionEvent::ModelsLoadFailed { error });
            }
        }
    });
}
