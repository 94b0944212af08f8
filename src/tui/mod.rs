use std::{
    collections::HashSet,
    io::{self, Stdout},
    time::{Duration, Instant},
};

use crate::{
    form::Form,
    protocol::Endpoint,
    replay::ReplayOutcome,
    ui::detail::{self, DetailSegment, DetailViewModel, SegmentStyle},
};
use color_eyre::Result;
use crossterm::{
    event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use tokio::{sync::mpsc, task};
use tracing::{debug, error};

#[derive(Debug)]
pub enum Event {
    Input(KeyEvent),
    Tick,
    Resize(u16, u16),
    /// A background refresh wrote new data into the shared state.
    Loaded,
    ReplayFinished(ReplayOutcome),
    FilterReady {
        endpoint_id: String,
        result: std::result::Result<(Vec<String>, Endpoint), String>,
    },
    FilterSaved(std::result::Result<Endpoint, String>),
    FormReady(std::result::Result<Form, String>),
    /// A create, update or delete finished. `Ok` carries the notice to show.
    Mutation(std::result::Result<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Success,
    Failure,
    Pending,
    Muted,
}

#[derive(Debug, Clone)]
pub struct ListEntry {
    pub kind: String,
    pub summary: String,
    pub age: String,
    pub tone: Tone,
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutConfig {
    pub list_percent: u16,
    pub detail_percent: u16,
}

#[derive(Debug, Clone)]
pub struct DetailStateView {
    pub cursor: usize,
    pub collapsed: HashSet<usize>,
}

#[derive(Debug, Clone)]
pub struct SearchView {
    pub query: String,
    pub editing: bool,
}

#[derive(Debug, Clone)]
pub struct FieldView {
    pub label: &'static str,
    pub value: String,
    pub focused: bool,
    pub locked: bool,
}

#[derive(Debug, Clone)]
pub struct PickerView {
    pub rows: Vec<String>,
    pub cursor: usize,
    pub focused: bool,
}

#[derive(Debug, Clone)]
pub struct FormView {
    pub title: String,
    pub fields: Vec<FieldView>,
    pub picker: Option<PickerView>,
    pub submitting: bool,
}

#[derive(Debug, Clone)]
pub enum Overlay {
    Help,
    Error(String),
    Loading {
        title: &'static str,
        message: &'static str,
    },
    Form(FormView),
    Confirm(String),
    Filter {
        endpoint_url: String,
        rows: Vec<String>,
        cursor: usize,
        saving: bool,
    },
    Replay {
        short_msg_id: String,
        options: Vec<(&'static str, bool)>,
        submitting: bool,
    },
}

#[derive(Debug, Clone)]
pub struct AppViewModel {
    pub breadcrumb: String,
    pub api_url: String,
    pub list_title: String,
    pub rows: Vec<ListEntry>,
    pub selected: Option<usize>,
    pub loading: bool,
    pub search: Option<SearchView>,
    pub detail: Option<DetailViewModel>,
    pub detail_state: Option<DetailStateView>,
    pub focus_detail: bool,
    pub detail_scroll: usize,
    pub layout: LayoutConfig,
    pub keymap: &'static str,
    pub status: Option<String>,
    pub overlays: Vec<Overlay>,
}

pub struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor()?;

        Ok(Self { terminal })
    }

    pub fn draw<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Frame<'_>),
    {
        self.terminal.draw(f)?;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(err) = disable_raw_mode() {
            error!(?err, "failed to disable raw mode");
        }

        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, LeaveAlternateScreen) {
            error!(?err, "failed to leave alternate screen");
        }

        if let Err(err) = self.terminal.show_cursor() {
            error!(?err, "failed to show cursor");
        }
    }
}

pub fn spawn_event_loop(
    tx: mpsc::UnboundedSender<Event>,
    tick_rate: Duration,
) -> task::JoinHandle<()> {
    task::spawn_blocking(move || {
        let mut last_tick = Instant::now();

        loop {
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            match event::poll(timeout) {
                Ok(true) => match event::read() {
                    Ok(CrosstermEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                        if tx.send(Event::Input(key)).is_err() {
                            break;
                        }
                    }
                    Ok(CrosstermEvent::Resize(w, h)) => {
                        if tx.send(Event::Resize(w, h)).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(?err, "failed to read terminal event");
                        break;
                    }
                },
                Ok(false) => {}
                Err(err) => {
                    error!(?err, "failed to poll terminal events");
                    break;
                }
            }

            if last_tick.elapsed() >= tick_rate {
                if tx.send(Event::Tick).is_err() {
                    break;
                }
                last_tick = Instant::now();
            }
        }

        debug!("terminal event loop terminated");
    })
}

pub fn render_app(frame: &mut Frame<'_>, view_model: &AppViewModel) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(5),
            Constraint::Length(2),
        ])
        .split(frame.size());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(view_model.layout.list_percent),
            Constraint::Percentage(view_model.layout.detail_percent),
        ])
        .split(layout[1]);

    render_header(frame, layout[0], view_model);
    render_list(frame, body[0], view_model);
    render_detail(frame, body[1], view_model);
    render_footer(frame, layout[2], view_model);

    for overlay in &view_model.overlays {
        render_overlay(frame, overlay);
    }
}

fn render_header(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let loading = if view_model.loading { " · loading…" } else { "" };
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .title(format!(
            "hookdash · {} @ {}{}",
            view_model.breadcrumb, view_model.api_url, loading
        ))
        .style(Style::default().fg(Color::Cyan));

    frame.render_widget(block, area);
}

fn render_list(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let mut title = format!("{} ({})", view_model.list_title, view_model.rows.len());
    if let Some(search) = &view_model.search {
        let cursor = if search.editing { "_" } else { "" };
        title = format!("{} · /{}{}", title, search.query, cursor);
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if view_model.focus_detail {
            Color::DarkGray
        } else {
            Color::Cyan
        }))
        .title_style(
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_widget(block, area);

    if view_model.rows.is_empty() {
        let message = if view_model.loading {
            "Loading…"
        } else {
            "Nothing to show.\n\nPress ctrl+r to refresh or Esc to go back."
        };
        let content = Paragraph::new(message)
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(Color::Gray));

        frame.render_widget(content, inner(area));
        return;
    }

    let list_area = inner(area);
    let visible_rows = list_area.height.max(1) as usize;
    let offset = view_model
        .selected
        .map(|selected| selected.saturating_sub(visible_rows.saturating_sub(1)))
        .unwrap_or(0);

    let items: Vec<ListItem> = view_model
        .rows
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible_rows)
        .map(|(idx, entry)| {
            let base = Style::default().fg(Color::Gray);
            let style = if Some(idx) == view_model.selected {
                base.add_modifier(Modifier::BOLD).bg(Color::DarkGray)
            } else {
                base
            };
            let mut spans = vec![
                Span::styled(format!("[{}] ", entry.kind), tone_style(entry.tone)),
                Span::raw(entry.summary.clone()),
            ];
            if !entry.age.is_empty() {
                spans.push(Span::styled(
                    format!(" · {}", entry.age),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            let line = Line::from(spans);
            ListItem::new(line).style(style)
        })
        .collect();

    frame.render_widget(List::new(items), list_area);
}

fn render_detail(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let block = Block::default()
        .title("Details")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if view_model.focus_detail {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title_style(
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_widget(block, area);

    let inner_area = inner(area);

    let Some(detail) = &view_model.detail else {
        let paragraph =
            Paragraph::new("Nothing selected").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, inner_area);
        return;
    };

    let mut lines: Vec<Line> = Vec::new();
    if !detail.header.is_empty() {
        lines.push(Line::from(vec![Span::styled(
            detail.header.clone(),
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        )]));
        lines.push(Line::default());
    }
    let header_len = lines.len();

    let collapsed = view_model.detail_state.as_ref().map(|state| &state.collapsed);
    let (visible, has_children) = detail::visible_indices_with_children(detail, collapsed);
    let cursor = view_model.detail_state.as_ref().map(|state| state.cursor);

    for (position, &index) in visible.iter().enumerate() {
        let detail_line = &detail.lines[index];
        let highlight = view_model.focus_detail && cursor == Some(position);
        let paint = |style: Style| {
            if highlight {
                style.bg(Color::DarkGray)
            } else {
                style
            }
        };

        let mut spans = Vec::new();
        if detail_line.indent > 0 {
            spans.push(Span::styled(
                "  ".repeat(detail_line.indent),
                paint(Style::default()),
            ));
        }
        if has_children[index] {
            let folded = collapsed.map(|set| set.contains(&index)).unwrap_or(false);
            spans.push(Span::styled(
                if folded { "▶ " } else { "▼ " },
                paint(Style::default().fg(Color::DarkGray)),
            ));
        }
        for segment in &detail_line.segments {
            spans.push(Span::styled(
                segment.text.clone(),
                paint(style_for_segment(segment)),
            ));
        }
        lines.push(Line::from(spans));
    }

    if !detail.footer.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(vec![Span::styled(
            detail.footer.clone(),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )]));
    }

    let scroll = view_model
        .detail_scroll
        .saturating_add(header_len)
        .saturating_sub(inner_area.height.saturating_sub(1) as usize)
        .min(u16::MAX as usize) as u16;
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, inner_area);
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let block = Block::default()
        .borders(Borders::TOP)
        .style(Style::default().fg(Color::DarkGray));

    let content = match &view_model.status {
        Some(status) => Paragraph::new(status.clone()).style(Style::default().fg(Color::Yellow)),
        None => Paragraph::new(view_model.keymap).style(Style::default().fg(Color::DarkGray)),
    };

    frame.render_widget(block, area);
    frame.render_widget(
        content,
        Rect {
            y: area.y + 1,
            height: area.height.saturating_sub(1),
            ..area
        },
    );
}

fn render_overlay(frame: &mut Frame<'_>, overlay: &Overlay) {
    match overlay {
        Overlay::Help => render_help(frame),
        Overlay::Error(message) => {
            let area = centered_rect(60, 30, frame.size());
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    message.clone(),
                    Style::default().fg(Color::White),
                )),
                Line::default(),
                Line::from(Span::styled(
                    "Enter/Esc dismiss",
                    Style::default().fg(Color::DarkGray),
                )),
            ])
            .wrap(Wrap { trim: true })
            .block(modal_block("Error", Color::Red));
            frame.render_widget(Clear, area);
            frame.render_widget(paragraph, area);
        }
        Overlay::Loading { title, message } => {
            let area = centered_rect(40, 20, frame.size());
            let paragraph = Paragraph::new(*message).block(modal_block(title, Color::Cyan));
            frame.render_widget(Clear, area);
            frame.render_widget(paragraph, area);
        }
        Overlay::Form(form) => render_form(frame, form),
        Overlay::Confirm(prompt) => {
            let area = centered_rect(50, 25, frame.size());
            let paragraph = Paragraph::new(vec![
                Line::from(prompt.clone()),
                Line::default(),
                Line::from(Span::styled(
                    "y/Enter confirm · n/Esc cancel",
                    Style::default().fg(Color::DarkGray),
                )),
            ])
            .wrap(Wrap { trim: true })
            .block(modal_block("Confirm", Color::Yellow));
            frame.render_widget(Clear, area);
            frame.render_widget(paragraph, area);
        }
        Overlay::Filter {
            endpoint_url,
            rows,
            cursor,
            saving,
        } => {
            let area = centered_rect(60, 70, frame.size());
            let title = if *saving {
                format!("Filter types · {} · saving…", endpoint_url)
            } else {
                format!("Filter types · {}", endpoint_url)
            };
            let block = modal_block(&title, Color::Cyan);
            let body = block.inner(area);
            frame.render_widget(Clear, area);
            frame.render_widget(block, area);

            if rows.is_empty() {
                frame.render_widget(
                    Paragraph::new("No event types defined. Every event will be delivered.")
                        .style(Style::default().fg(Color::Gray)),
                    body,
                );
                return;
            }

            let height = body.height.saturating_sub(1).max(1) as usize;
            let offset = cursor.saturating_sub(height.saturating_sub(1));
            let items: Vec<ListItem> = rows
                .iter()
                .enumerate()
                .skip(offset)
                .take(height)
                .map(|(index, row)| {
                    let style = if index == *cursor {
                        Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(Color::Gray)
                    };
                    ListItem::new(row.clone()).style(style)
                })
                .collect();
            frame.render_widget(List::new(items), body);
            frame.render_widget(
                Paragraph::new("Space toggle · s save · Esc cancel")
                    .style(Style::default().fg(Color::DarkGray)),
                Rect {
                    y: body.y + body.height.saturating_sub(1),
                    height: 1,
                    ..body
                },
            );
        }
        Overlay::Replay {
            short_msg_id,
            options,
            submitting,
        } => {
            let area = centered_rect(50, 35, frame.size());
            let mut lines = vec![
                Line::from(format!("Replay message …{}", short_msg_id)),
                Line::default(),
            ];
            for (index, (label, selected)) in options.iter().enumerate() {
                let marker = if *selected { "(•)" } else { "( )" };
                let style = if *selected {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Gray)
                };
                lines.push(Line::from(Span::styled(
                    format!("{} {} {}", index + 1, marker, label),
                    style,
                )));
            }
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                if *submitting {
                    "Replaying…"
                } else {
                    "↑/↓ choose · Enter replay · Esc cancel"
                },
                Style::default().fg(Color::DarkGray),
            )));

            frame.render_widget(Clear, area);
            frame.render_widget(
                Paragraph::new(lines).block(modal_block("Replay", Color::Cyan)),
                area,
            );
        }
    }
}

fn render_form(frame: &mut Frame<'_>, form: &FormView) {
    let area = centered_rect(60, 70, frame.size());
    let title = if form.submitting {
        format!("{} · saving…", form.title)
    } else {
        form.title.clone()
    };
    let block = modal_block(&title, Color::Cyan);
    let body = block.inner(area);
    frame.render_widget(Clear, area);
    frame.render_widget(block, area);

    let mut lines = Vec::new();
    for field in &form.fields {
        let label_style = if field.focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        let value_style = if field.locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::White)
        };
        let cursor = if field.focused { "_" } else { "" };
        lines.push(Line::from(vec![
            Span::styled(format!("{:<12} ", field.label), label_style),
            Span::styled(format!("{}{}", field.value, cursor), value_style),
        ]));
    }

    if let Some(picker) = &form.picker {
        lines.push(Line::default());
        let heading = if picker.focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        lines.push(Line::from(Span::styled("Filter types", heading)));
        if picker.rows.is_empty() {
            lines.push(Line::from(Span::styled(
                "No event types defined. Every event will be delivered.",
                Style::default().fg(Color::DarkGray),
            )));
        }
        let room = body.height.saturating_sub(lines.len() as u16 + 2).max(1) as usize;
        let offset = picker.cursor.saturating_sub(room.saturating_sub(1));
        for (index, row) in picker.rows.iter().enumerate().skip(offset).take(room) {
            let style = if picker.focused && index == picker.cursor {
                Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            lines.push(Line::from(Span::styled(row.clone(), style)));
        }
    }

    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "Tab next field · Enter save · Esc cancel",
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(Paragraph::new(lines), body);
}

fn render_help(frame: &mut Frame<'_>) {
    let area = centered_rect(60, 70, frame.size());
    let text = vec![
        "↑/↓ j/k      move",
        "PgUp/PgDn    jump",
        "Enter        open / expand",
        "Esc          back",
        "Tab          switch list and details",
        "←/→ Space    collapse / expand details",
        "m            messages (application or endpoint)",
        "t            event types (applications)",
        "n            new application / endpoint / event type",
        "e            edit event type",
        "d            enable or disable endpoint",
        "D            delete endpoint or event type",
        "f            edit filter types (endpoints)",
        "r            replay (attempts)",
        "/            filter attempts by URL",
        "ctrl+r       refresh",
        "ctrl+l       cycle layout",
        "q            quit",
    ];
    let lines: Vec<Line> = text.into_iter().map(Line::from).collect();
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(modal_block("Help", Color::Cyan)),
        area,
    );
}

fn modal_block(title: &str, color: Color) -> Block<'static> {
    Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
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

fn inner(area: Rect) -> Rect {
    Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

fn tone_style(tone: Tone) -> Style {
    match tone {
        Tone::Neutral => Style::default().fg(Color::LightBlue),
        Tone::Success => Style::default().fg(Color::Green),
        Tone::Failure => Style::default().fg(Color::Red),
        Tone::Pending => Style::default().fg(Color::Yellow),
        Tone::Muted => Style::default().fg(Color::DarkGray),
    }
}

fn style_for_segment(segment: &DetailSegment) -> Style {
    match segment.style {
        SegmentStyle::Plain => Style::default().fg(Color::Gray),
        SegmentStyle::Key => Style::default().fg(Color::Cyan),
        SegmentStyle::Type => Style::default().fg(Color::Yellow),
        SegmentStyle::String => Style::default().fg(Color::Green),
        SegmentStyle::Number => Style::default().fg(Color::LightMagenta),
        SegmentStyle::Boolean => Style::default().fg(Color::LightBlue),
        SegmentStyle::Null => Style::default().fg(Color::DarkGray),
        SegmentStyle::Success => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        SegmentStyle::Failure => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}
