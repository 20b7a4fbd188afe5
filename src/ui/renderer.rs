//! View composition for the chat screen.
//!
//! Everything here is read-only over [`App`] state: the sidebar, the
//! transcript, the input field, and the overlays are rebuilt from structured
//! `(role, content)` pairs on every frame. No widget holds chat state of its
//! own.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::core::session::ChatSession;
use crate::ui::chat_loop::{App, Focus, Overlay};

const SIDEBAR_WIDTH: u16 = 24;

/// Transcript lines for one session, role-colored, with spacing between
/// messages.
pub fn build_transcript_lines(session: &ChatSession) -> Vec<Line<'_>> {
    let mut lines = Vec::new();

    for msg in &session.messages {
        if msg.role.is_user() {
            lines.push(Line::from(vec![
                Span::styled(
                    "You: ",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(&msg.content, Style::default().fg(Color::Cyan)),
            ]));
            lines.push(Line::from(""));
        } else if !msg.content.is_empty() {
            for content_line in msg.content.lines() {
                if content_line.trim().is_empty() {
                    lines.push(Line::from(""));
                } else {
                    lines.push(Line::from(Span::styled(
                        content_line,
                        Style::default().fg(Color::White),
                    )));
                }
            }
            lines.push(Line::from(""));
        }
    }

    lines
}

/// The largest transcript scroll offset that still shows a full screen.
pub fn max_scroll_offset(session: Option<&ChatSession>, available_height: u16) -> u16 {
    let total_lines = session
        .map(|s| build_transcript_lines(s).len() as u16)
        .unwrap_or(0);
    total_lines.saturating_sub(available_height)
}

fn border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

pub fn ui(f: &mut Frame, app: &App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
        .split(f.area());

    draw_sidebar(f, app, columns[0]);
    draw_chat_area(f, app, columns[1]);

    match &app.overlay {
        Overlay::None => {}
        Overlay::ConfirmDelete { title, .. } => draw_delete_modal(f, title),
        Overlay::Settings {
            models,
            selected,
            loading,
        } => draw_settings(f, app, models, *selected, *loading),
    }
}

fn draw_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let mut items = vec![ListItem::new("New Chat")];
    for chat in app.manager.list_all() {
        items.push(ListItem::new(chat.title.clone()));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Chats")
                .border_style(border_style(app.focus == Focus::Sidebar)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    state.select(Some(app.list_index));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_chat_area(f: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(area);

    let current = app
        .current_chat
        .as_ref()
        .and_then(|id| app.manager.get_by_id(id));

    let (title, lines) = match &current {
        Some(chat) => (chat.title.as_str(), build_transcript_lines(chat)),
        None => ("New Chat", Vec::new()),
    };

    let available_height = rows[0].height.saturating_sub(2);
    let max_offset = max_scroll_offset(current.as_ref(), available_height);
    let scroll_offset = if app.auto_scroll {
        max_offset
    } else {
        app.scroll_offset.min(max_offset)
    };

    let transcript = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} [{}]", title, app.current_model)),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll_offset, 0));
    f.render_widget(transcript, rows[0]);

    let status = Paragraph::new(app.status.as_deref().unwrap_or(""))
        .style(Style::default().fg(Color::Yellow));
    f.render_widget(status, rows[1]);

    let input = Paragraph::new(app.input.as_str())
        .style(if app.focus == Focus::Input {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Message (Enter to send, Tab to switch, Ctrl+D settings, Ctrl+C quit)")
                .border_style(border_style(app.focus == Focus::Input)),
        );
    f.render_widget(input, rows[2]);

    if app.focus == Focus::Input && matches!(app.overlay, Overlay::None) {
        f.set_cursor_position((rows[2].x + app.input.len() as u16 + 1, rows[2].y + 1));
    }
}

fn draw_delete_modal(f: &mut Frame, title: &str) {
    let area = centered_rect(40, 20, f.area());
    f.render_widget(Clear, area);

    let text = vec![
        Line::from(""),
        Line::from(format!("Delete \"{}\" permanently?", title)),
        Line::from(""),
        Line::from(Span::styled(
            "[y] Delete    [n] Cancel",
            Style::default().fg(Color::Red),
        )),
    ];
    let modal = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Delete chat")
                .border_style(Style::default().fg(Color::Red)),
        )
        .wrap(Wrap { trim: true });
    f.render_widget(modal, area);
}

fn draw_settings(f: &mut Frame, app: &App, models: &[String], selected: usize, loading: bool) {
    let area = centered_rect(50, 60, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Settings - model for new chats")
        .border_style(Style::default().fg(Color::Yellow));

    if loading {
        let text = Paragraph::new("Loading models…").block(block);
        f.render_widget(text, area);
        return;
    }

    let items: Vec<ListItem> = models
        .iter()
        .map(|name| {
            if *name == app.current_model {
                ListItem::new(format!("{name} (current)"))
            } else {
                ListItem::new(name.as_str())
            }
        })
        .collect();

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = ListState::default();
    state.select(Some(selected.min(models.len().saturating_sub(1))));
    f.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;

    fn session() -> ChatSession {
        let mut session = ChatSession::new("Chat 1", "llama3");
        session.messages.push(Message::user("Hi"));
        session.messages.push(Message::assistant("Hello there"));
        session
    }

    #[test]
    fn transcript_prefixes_user_messages_only() {
        let binding = session();
        let lines = build_transcript_lines(&binding);
        // user line + spacer + assistant line + spacer
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].spans[0].content, "You: ");
        assert_eq!(lines[0].spans[1].content, "Hi");
        assert_eq!(lines[2].spans[0].content, "Hello there");
    }

    #[test]
    fn empty_assistant_placeholder_renders_no_lines() {
        let mut session = session();
        session.messages.push(Message::user("More"));
        session.messages.push(Message::assistant(""));

        let lines = build_transcript_lines(&session);
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn max_scroll_offset_saturates_at_zero() {
        assert_eq!(max_scroll_offset(None, 20), 0);
        assert_eq!(max_scroll_offset(Some(&session()), 20), 0);
        assert_eq!(max_scroll_offset(Some(&session()), 2), 2);
    }

    #[test]
    fn centered_rect_stays_inside_the_area() {
        let area = Rect::new(0, 0, 100, 40);
        let rect = centered_rect(50, 60, area);
        assert!(rect.width <= area.width);
        assert!(rect.height <= area.height);
        assert!(rect.x >= area.x && rect.y >= area.y);
    }
}
