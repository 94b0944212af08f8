use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde_json::Value;
use tokio::{select, sync::mpsc};
use tracing::{debug, info, warn};

use crate::{
    client::{ApiClient, ApiError},
    filter::FilterEditor,
    form::{Form, Submission},
    protocol::{
        Application, Attempt, DeliveryStatus, Endpoint, EndpointPayload, EventType, Message,
    },
    replay::{self, DialogEffect, ReplayDialog, ReplayOutcome, ReplayStrategy, ReplayTarget},
    state::{AppState, AttemptScope, EndpointEntry, MessageScope},
    tui::{
        self, AppViewModel, DetailStateView, Event, FieldView, FormView, LayoutConfig, ListEntry,
        Overlay, PickerView, SearchView, TerminalGuard, Tone,
    },
    ui::{
        self,
        detail::{self, DetailViewModel},
    },
};

pub struct HookdashApp {
    tick_rate: Duration,
    state: Arc<AppState>,
    api_url: String,
    screens: Vec<Screen>,
    rows: Rows,
    focus: Focus,
    layout: LayoutPreset,
    detail: Option<DetailViewModel>,
    detail_states: HashMap<String, DetailState>,
    search: Option<Search>,
    filter: Option<FilterPane>,
    form: Option<FormPane>,
    confirm: Option<PendingDelete>,
    replay: Option<ReplayDialog>,
    error: Option<String>,
    notice: Option<String>,
    show_help: bool,
    pending_loads: usize,
    events: Option<mpsc::UnboundedSender<Event>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    List,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AppRef {
    id: String,
    name: String,
}

impl From<&Application> for AppRef {
    fn from(app: &Application) -> Self {
        Self {
            id: app.id.clone(),
            name: app.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScreenKind {
    Applications,
    Endpoints {
        app: AppRef,
    },
    Messages {
        app: AppRef,
        scope: MessageScope,
        /// Endpoint URL when the list is narrowed to one endpoint.
        label: Option<String>,
    },
    Attempts {
        app: AppRef,
        scope: AttemptScope,
        label: String,
    },
    EventTypes,
}

#[derive(Debug, Clone)]
struct Screen {
    kind: ScreenKind,
    selected: usize,
}

impl Screen {
    fn new(kind: ScreenKind) -> Self {
        Self { kind, selected: 0 }
    }
}

/// Snapshot of the rows shown on the current screen, in display order.
#[derive(Debug, Clone)]
enum Rows {
    Applications(Vec<Application>),
    Endpoints(Vec<EndpointEntry>),
    Messages(Vec<Message>),
    Attempts(Vec<Attempt>),
    EventTypes(Vec<EventType>),
}

impl Rows {
    fn len(&self) -> usize {
        match self {
            Rows::Applications(items) => items.len(),
            Rows::Endpoints(items) => items.len(),
            Rows::Messages(items) => items.len(),
            Rows::Attempts(items) => items.len(),
            Rows::EventTypes(items) => items.len(),
        }
    }

    fn id(&self, index: usize) -> Option<&str> {
        match self {
            Rows::Applications(items) => items.get(index).map(|app| app.id.as_str()),
            Rows::Endpoints(items) => items.get(index).map(|entry| entry.endpoint.id.as_str()),
            Rows::Messages(items) => items.get(index).map(|msg| msg.id.as_str()),
            Rows::Attempts(items) => items.get(index).map(|attempt| attempt.id.as_str()),
            Rows::EventTypes(items) => items.get(index).map(|event_type| event_type.name.as_str()),
        }
    }

    fn entries(&self, now: DateTime<Utc>) -> Vec<ListEntry> {
        match self {
            Rows::Applications(items) => items.iter().map(|app| summarize_application(app, now)).collect(),
            Rows::Endpoints(items) => items.iter().map(|entry| summarize_endpoint(entry, now)).collect(),
            Rows::Messages(items) => items.iter().map(|msg| summarize_message(msg, now)).collect(),
            Rows::Attempts(items) => items.iter().map(|attempt| summarize_attempt(attempt, now)).collect(),
            Rows::EventTypes(items) => items.iter().map(summarize_event_type).collect(),
        }
    }

    fn detail(&self, index: usize) -> Option<DetailViewModel> {
        match self {
            Rows::Applications(items) => items.get(index).map(detail::build_application_detail),
            Rows::Endpoints(items) => items.get(index).map(detail::build_endpoint_detail),
            Rows::Messages(items) => items.get(index).map(detail::build_message_detail),
            Rows::Attempts(items) => items.get(index).map(detail::build_attempt_detail),
            Rows::EventTypes(items) => items.get(index).map(detail::build_event_type_detail),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Search {
    query: String,
    editing: bool,
}

enum FilterPane {
    Loading {
        app_id: String,
        endpoint_id: String,
    },
    Editing(FilterSession),
}

struct FilterSession {
    app_id: String,
    endpoint: Endpoint,
    editor: FilterEditor,
    cursor: usize,
    saving: bool,
}

enum FilterAction {
    Stay,
    Save,
    Close,
}

enum FormPane {
    Loading(&'static str),
    Editing(Form),
}

enum FormAction {
    Stay,
    Submit,
    Close,
}

struct PendingDelete {
    prompt: String,
    target: DeleteTarget,
}

#[derive(Debug)]
enum DeleteTarget {
    Endpoint {
        app_id: String,
        endpoint_id: String,
        url: String,
    },
    EventType {
        name: String,
    },
}

#[derive(Debug, Clone, Default)]
struct DetailState {
    cursor: usize,
    collapsed: HashSet<usize>,
}

#[derive(Debug, Clone, Copy)]
enum Fold {
    Expand,
    Collapse,
    Toggle,
}

impl HookdashApp {
    pub async fn bootstrap(state: Arc<AppState>, app_id: Option<String>) -> Result<Self> {
        let mut screens = vec![Screen::new(ScreenKind::Applications)];

        if let Some(app_id) = app_id {
            let app = match state.client().get_application(&app_id).await {
                Ok(app) => AppRef::from(&app),
                Err(err) => {
                    warn!(%app_id, %err, "could not load application, opening it by id");
                    AppRef {
                        name: app_id.clone(),
                        id: app_id,
                    }
                }
            };
            screens.push(Screen::new(ScreenKind::Endpoints { app }));
        }

        Ok(Self::with_screens(state, screens))
    }

    fn with_screens(state: Arc<AppState>, screens: Vec<Screen>) -> Self {
        let api_url = state.client().base_url().to_string();
        Self {
            tick_rate: Duration::from_millis(250),
            state,
            api_url,
            screens,
            rows: Rows::Applications(Vec::new()),
            focus: Focus::List,
            layout: LayoutPreset::Balanced,
            detail: None,
            detail_states: HashMap::new(),
            search: None,
            filter: None,
            form: None,
            confirm: None,
            replay: None,
            error: None,
            notice: None,
            show_help: false,
            pending_loads: 0,
            events: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        info!(api_url = %self.api_url, "starting dashboard");

        let mut terminal = TerminalGuard::new()?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.events = Some(tx.clone());
        let event_handle = tui::spawn_event_loop(tx, self.tick_rate);

        self.refresh_current();

        loop {
            let view_model = self.build_view_model().await;
            terminal.draw(|frame| tui::render_app(frame, &view_model))?;

            let exit_requested = select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event),
                        None => true,
                    }
                }
                ctrl_c = tokio::signal::ctrl_c() => {
                    if let Err(err) = ctrl_c {
                        warn!(?err, "failed to listen for ctrl+c");
                    } else {
                        info!("received ctrl+c");
                    }
                    true
                }
            };

            if exit_requested {
                break;
            }
        }

        drop(terminal);
        self.events = None;
        drop(rx);

        if let Err(err) = event_handle.await {
            warn!(?err, "terminal event loop task ended unexpectedly");
        }

        info!("hookdash shutting down");
        Ok(())
    }

    async fn build_view_model(&mut self) -> AppViewModel {
        let kind = self.current().kind.clone();
        let mut rows = match &kind {
            ScreenKind::Applications => Rows::Applications(self.state.applications().await),
            ScreenKind::Endpoints { app } => Rows::Endpoints(self.state.endpoints(&app.id).await),
            ScreenKind::Messages { scope, .. } => Rows::Messages(self.state.messages(scope).await),
            ScreenKind::Attempts { scope, .. } => Rows::Attempts(self.state.attempts(scope).await),
            ScreenKind::EventTypes => Rows::EventTypes(self.state.event_types().await),
        };

        if let (Rows::Attempts(attempts), Some(search)) = (&mut rows, &self.search) {
            attempts.retain(|attempt| url_matches(&attempt.url, &search.query));
        }
        self.rows = rows;

        let len = self.rows.len();
        let screen = self.current_mut();
        screen.selected = screen.selected.min(len.saturating_sub(1));
        let selected = (len > 0).then_some(screen.selected);

        self.detail = selected.and_then(|index| self.rows.detail(index));
        if self.detail.is_none() {
            self.focus = Focus::List;
        }

        let detail_state = self.current_detail_state().map(|state| DetailStateView {
            cursor: state.cursor,
            collapsed: state.collapsed.clone(),
        });
        let detail_scroll = detail_state.as_ref().map(|state| state.cursor).unwrap_or(0);

        let status = match &self.notice {
            Some(notice) => Some(notice.clone()),
            None => self.state.last_error().await,
        };

        AppViewModel {
            breadcrumb: breadcrumb(&kind),
            api_url: self.api_url.clone(),
            list_title: list_title(&kind).to_string(),
            rows: self.rows.entries(Utc::now()),
            selected,
            loading: self.pending_loads > 0,
            search: self.search.as_ref().map(|search| SearchView {
                query: search.query.clone(),
                editing: search.editing,
            }),
            detail: self.detail.clone(),
            detail_state,
            focus_detail: self.focus == Focus::Detail,
            detail_scroll,
            layout: self.layout.config(),
            keymap: keymap(&kind),
            status,
            overlays: self.overlays(),
        }
    }

    fn overlays(&self) -> Vec<Overlay> {
        let mut overlays = Vec::new();

        match &self.filter {
            Some(FilterPane::Loading { .. }) => overlays.push(Overlay::Loading {
                title: "Filter types",
                message: "Loading event types…",
            }),
            Some(FilterPane::Editing(session)) => {
                let separator = session.editor.tree().separator();
                overlays.push(Overlay::Filter {
                    endpoint_url: session.endpoint.url.clone(),
                    rows: session
                        .editor
                        .rows()
                        .iter()
                        .map(|row| ui::filter_row_text(row, separator))
                        .collect(),
                    cursor: session.cursor,
                    saving: session.saving,
                });
            }
            None => {}
        }

        match &self.form {
            Some(FormPane::Loading(message)) => overlays.push(Overlay::Loading {
                title: "Form",
                message: *message,
            }),
            Some(FormPane::Editing(form)) => overlays.push(Overlay::Form(form_view(form))),
            None => {}
        }

        if let Some(pending) = &self.confirm {
            overlays.push(Overlay::Confirm(pending.prompt.clone()));
        }

        if let Some(dialog) = &self.replay {
            overlays.push(Overlay::Replay {
                short_msg_id: dialog.target().short_msg_id().to_string(),
                options: ReplayStrategy::ALL
                    .iter()
                    .map(|strategy| (strategy.label(), *strategy == dialog.strategy()))
                    .collect(),
                submitting: dialog.is_submitting(),
            });
        }

        if let Some(message) = &self.error {
            overlays.push(Overlay::Error(message.clone()));
        }

        if self.show_help {
            overlays.push(Overlay::Help);
        }

        overlays
    }

    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Input(key) => self.handle_key(key),
            Event::Tick => false,
            Event::Resize(width, height) => {
                debug!(%width, %height, "terminal resized");
                false
            }
            Event::Loaded => {
                self.pending_loads = self.pending_loads.saturating_sub(1);
                false
            }
            Event::ReplayFinished(outcome) => {
                self.on_replay_finished(outcome);
                false
            }
            Event::FilterReady {
                endpoint_id,
                result,
            } => {
                self.on_filter_ready(endpoint_id, result);
                false
            }
            Event::FilterSaved(result) => {
                self.on_filter_saved(result);
                false
            }
            Event::FormReady(result) => {
                self.on_form_ready(result);
                false
            }
            Event::Mutation(result) => {
                self.on_mutation(result);
                false
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            return true;
        }

        if self.error.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.dismiss_error();
            }
            return false;
        }

        if self.show_help {
            if matches!(
                key.code,
                KeyCode::Char('q') | KeyCode::Char('?') | KeyCode::Enter | KeyCode::Esc
            ) {
                self.show_help = false;
            }
            return false;
        }

        if self.replay.is_some() {
            self.handle_replay_key(key);
            return false;
        }

        if self.filter.is_some() {
            self.handle_filter_key(key);
            return false;
        }

        if self.confirm.is_some() {
            self.handle_confirm_key(key);
            return false;
        }

        if self.form.is_some() {
            self.handle_form_key(key);
            return false;
        }

        if self.search.as_ref().is_some_and(|search| search.editing) {
            self.handle_search_key(key);
            return false;
        }

        self.notice = None;

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return true,
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('r') if ctrl => self.refresh_current(),
            KeyCode::Char('l') if ctrl => self.layout = self.layout.next(),
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::List if self.detail.is_some() => Focus::Detail,
                    _ => Focus::List,
                };
            }
            KeyCode::BackTab => self.focus = Focus::List,
            KeyCode::Esc => {
                if self.search.is_some() {
                    self.search = None;
                } else if self.focus == Focus::Detail {
                    self.focus = Focus::List;
                } else {
                    self.pop_screen();
                }
            }
            KeyCode::Backspace => self.pop_screen(),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::PageDown => self.move_cursor(10),
            KeyCode::PageUp => self.move_cursor(-10),
            KeyCode::Home => self.move_cursor(i32::MIN / 2),
            KeyCode::End => self.move_cursor(i32::MAX / 2),
            KeyCode::Enter => match self.focus {
                Focus::List => self.open_selected(),
                Focus::Detail => self.fold_current(Fold::Expand),
            },
            KeyCode::Right if self.focus == Focus::Detail => self.fold_current(Fold::Expand),
            KeyCode::Left if self.focus == Focus::Detail => self.fold_current(Fold::Collapse),
            KeyCode::Char(' ') if self.focus == Focus::Detail => self.fold_current(Fold::Toggle),
            KeyCode::Char('m') => self.open_messages(),
            KeyCode::Char('t') => {
                if self.current().kind == ScreenKind::Applications {
                    self.push_screen(ScreenKind::EventTypes);
                }
            }
            KeyCode::Char('n') => self.open_create(),
            KeyCode::Char('e') => self.open_event_type_edit(),
            KeyCode::Char('d') => self.toggle_endpoint_disabled(),
            KeyCode::Char('D') => self.confirm_delete(),
            KeyCode::Char('f') => self.open_filter(),
            KeyCode::Char('r') => self.open_replay(),
            KeyCode::Char('/') => {
                if matches!(self.current().kind, ScreenKind::Attempts { .. }) {
                    let query = self
                        .search
                        .take()
                        .map(|search| search.query)
                        .unwrap_or_default();
                    self.search = Some(Search {
                        query,
                        editing: true,
                    });
                }
            }
            _ => {}
        }

        false
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        let Some(search) = self.search.as_mut() else {
            return;
        };

        match key.code {
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                search.query.push(ch);
            }
            KeyCode::Backspace => {
                search.query.pop();
            }
            KeyCode::Enter => {
                search.editing = false;
                if search.query.is_empty() {
                    self.search = None;
                }
            }
            KeyCode::Esc => self.search = None,
            _ => return,
        }

        self.current_mut().selected = 0;
    }

    fn handle_replay_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Enter {
            self.submit_replay();
            return;
        }

        let Some(dialog) = self.replay.as_mut() else {
            return;
        };

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => dialog.select(dialog.strategy().previous()),
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                dialog.select(dialog.strategy().next())
            }
            KeyCode::Char(digit @ '1'..='3') => {
                let index = (digit as u8 - b'1') as usize;
                dialog.select(ReplayStrategy::ALL[index]);
            }
            KeyCode::Esc | KeyCode::Char('q') => {
                dialog.close();
                if !dialog.is_open() {
                    self.replay = None;
                }
            }
            _ => {}
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) {
        if matches!(self.filter, Some(FilterPane::Loading { .. })) {
            if key.code == KeyCode::Esc {
                self.filter = None;
            }
            return;
        }

        let Some(FilterPane::Editing(session)) = self.filter.as_mut() else {
            return;
        };
        if session.saving {
            return;
        }

        let rows = session.editor.rows();
        let last = rows.len().saturating_sub(1);
        let action = match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                session.cursor = session.cursor.saturating_sub(1);
                FilterAction::Stay
            }
            KeyCode::Down | KeyCode::Char('j') => {
                session.cursor = (session.cursor + 1).min(last);
                FilterAction::Stay
            }
            KeyCode::PageUp => {
                session.cursor = session.cursor.saturating_sub(10);
                FilterAction::Stay
            }
            KeyCode::PageDown => {
                session.cursor = (session.cursor + 10).min(last);
                FilterAction::Stay
            }
            KeyCode::Char(' ') | KeyCode::Enter => {
                if let Some(row) = rows.get(session.cursor) {
                    session.editor.toggle(&row.name);
                }
                FilterAction::Stay
            }
            KeyCode::Char('s') => FilterAction::Save,
            KeyCode::Esc | KeyCode::Char('q') => FilterAction::Close,
            _ => FilterAction::Stay,
        };

        match action {
            FilterAction::Stay => {}
            FilterAction::Save => self.save_filter(),
            FilterAction::Close => self.filter = None,
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        if matches!(self.form, Some(FormPane::Loading(_))) {
            if key.code == KeyCode::Esc {
                self.form = None;
            }
            return;
        }

        let Some(FormPane::Editing(form)) = self.form.as_mut() else {
            return;
        };
        if form.submitting {
            return;
        }

        let action = match key.code {
            KeyCode::Esc => FormAction::Close,
            KeyCode::Enter => FormAction::Submit,
            KeyCode::Tab => {
                form.next_field();
                FormAction::Stay
            }
            KeyCode::BackTab => {
                form.previous_field();
                FormAction::Stay
            }
            KeyCode::Up if form.filter_focused() => {
                form.move_filter(-1);
                FormAction::Stay
            }
            KeyCode::Down if form.filter_focused() => {
                form.move_filter(1);
                FormAction::Stay
            }
            KeyCode::Backspace => {
                form.backspace();
                FormAction::Stay
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                form.input(ch);
                FormAction::Stay
            }
            _ => FormAction::Stay,
        };

        match action {
            FormAction::Stay => {}
            FormAction::Submit => self.submit_form(),
            FormAction::Close => self.form = None,
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                if let Some(pending) = self.confirm.take() {
                    self.run_delete(pending.target);
                }
            }
            KeyCode::Char('n') | KeyCode::Esc => self.confirm = None,
            _ => {}
        }
    }

    fn move_cursor(&mut self, delta: i32) {
        match self.focus {
            Focus::List => {
                let len = self.rows.len();
                if len == 0 {
                    return;
                }
                let screen = self.current_mut();
                let next = (screen.selected as i64 + delta as i64).clamp(0, len as i64 - 1);
                screen.selected = next as usize;
            }
            Focus::Detail => {
                let (visible, _) = self.detail_visible();
                if visible.is_empty() {
                    return;
                }
                let max = visible.len() as i64 - 1;
                if let Some(state) = self.current_detail_state_mut() {
                    let next = (state.cursor as i64 + delta as i64).clamp(0, max);
                    state.cursor = next as usize;
                }
            }
        }
    }

    fn fold_current(&mut self, fold: Fold) {
        let (visible, has_children) = self.detail_visible();
        let indents: Vec<usize> = self
            .detail
            .as_ref()
            .map(|detail| detail.lines.iter().map(|line| line.indent).collect())
            .unwrap_or_default();

        let Some(state) = self.current_detail_state_mut() else {
            return;
        };
        let cursor = state.cursor.min(visible.len().saturating_sub(1));
        let Some(&line) = visible.get(cursor) else {
            return;
        };
        let branch = has_children.get(line).copied().unwrap_or(false);

        match fold {
            Fold::Expand => {
                if branch {
                    state.collapsed.remove(&line);
                }
            }
            Fold::Toggle => {
                if branch && !state.collapsed.remove(&line) {
                    state.collapsed.insert(line);
                }
            }
            Fold::Collapse => {
                if branch && state.collapsed.insert(line) {
                    return;
                }
                // Already folded or a leaf: move to the enclosing line.
                let indent = indents.get(line).copied().unwrap_or(0);
                if let Some(parent) = visible[..cursor]
                    .iter()
                    .rposition(|&index| indents.get(index).copied().unwrap_or(0) < indent)
                {
                    state.cursor = parent;
                }
            }
        }
    }

    fn detail_visible(&self) -> (Vec<usize>, Vec<bool>) {
        match &self.detail {
            Some(detail) => detail::visible_indices_with_children(
                detail,
                self.current_detail_state().map(|state| &state.collapsed),
            ),
            None => (Vec::new(), Vec::new()),
        }
    }

    fn open_selected(&mut self) {
        let index = self.current().selected;
        let next = match (&self.current().kind, &self.rows) {
            (ScreenKind::Applications, Rows::Applications(apps)) => apps
                .get(index)
                .map(|app| ScreenKind::Endpoints { app: app.into() }),
            (ScreenKind::Endpoints { app }, Rows::Endpoints(entries)) => {
                entries.get(index).map(|entry| ScreenKind::Attempts {
                    app: app.clone(),
                    scope: AttemptScope::Endpoint {
                        app_id: app.id.clone(),
                        endpoint_id: entry.endpoint.id.clone(),
                    },
                    label: entry.endpoint.url.clone(),
                })
            }
            (ScreenKind::Messages { app, .. }, Rows::Messages(messages)) => {
                messages.get(index).map(|msg| ScreenKind::Attempts {
                    app: app.clone(),
                    scope: AttemptScope::Message {
                        app_id: app.id.clone(),
                        msg_id: msg.id.clone(),
                    },
                    label: format!("{} {}", msg.event_type, msg.id),
                })
            }
            _ => None,
        };

        if let Some(kind) = next {
            self.push_screen(kind);
        }
    }

    fn open_messages(&mut self) {
        let index = self.current().selected;
        let next = match (&self.current().kind, &self.rows) {
            (ScreenKind::Applications, Rows::Applications(apps)) => {
                apps.get(index).map(|app| app_messages(app.into()))
            }
            (ScreenKind::Endpoints { app }, Rows::Endpoints(entries)) => {
                Some(match entries.get(index) {
                    Some(entry) => ScreenKind::Messages {
                        app: app.clone(),
                        scope: MessageScope::Endpoint {
                            app_id: app.id.clone(),
                            endpoint_id: entry.endpoint.id.clone(),
                        },
                        label: Some(entry.endpoint.url.clone()),
                    },
                    None => app_messages(app.clone()),
                })
            }
            _ => None,
        };

        if let Some(kind) = next {
            self.push_screen(kind);
        }
    }

    fn push_screen(&mut self, kind: ScreenKind) {
        debug!(screen = ?kind, "opening screen");
        self.screens.push(Screen::new(kind));
        self.search = None;
        self.focus = Focus::List;
        self.refresh_current();
    }

    fn pop_screen(&mut self) {
        if self.screens.len() > 1 {
            self.screens.pop();
            self.search = None;
            self.focus = Focus::List;
            self.refresh_current();
        }
    }

    fn refresh_current(&mut self) {
        let kind = self.current().kind.clone();
        let state = Arc::clone(&self.state);
        self.spawn_load(async move {
            state.clear_error().await;
            match kind {
                ScreenKind::Applications => state.refresh_applications().await,
                ScreenKind::Endpoints { app } => state.refresh_endpoints(&app.id).await,
                ScreenKind::Messages { scope, .. } => state.refresh_messages(&scope).await,
                ScreenKind::Attempts { scope, .. } => state.refresh_attempts(&scope).await,
                ScreenKind::EventTypes => state.refresh_event_types().await,
            }
        });
    }

    fn spawn_load<F>(&mut self, load: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(tx) = self.events.clone() else {
            return;
        };
        self.pending_loads += 1;
        tokio::spawn(async move {
            load.await;
            let _ = tx.send(Event::Loaded);
        });
    }

    fn open_replay(&mut self) {
        let target = match (&self.current().kind, &self.rows) {
            (ScreenKind::Attempts { app, .. }, Rows::Attempts(attempts)) => attempts
                .get(self.current().selected)
                .map(|attempt| ReplayTarget::from_attempt(&app.id, attempt)),
            _ => None,
        };

        if let Some(target) = target {
            debug!(msg_id = %target.msg_id, endpoint_id = %target.endpoint_id, "opening replay dialog");
            self.replay = Some(ReplayDialog::new(target));
        }
    }

    fn submit_replay(&mut self) {
        let Some(tx) = self.events.clone() else {
            return;
        };
        let Some(dialog) = self.replay.as_mut() else {
            return;
        };
        let Some(request) = dialog.begin_submit(Utc::now()) else {
            debug!("replay already in flight");
            return;
        };

        let client = self.state.client().clone();
        tokio::spawn(async move {
            let outcome = replay::dispatch(&client, &request).await;
            let _ = tx.send(Event::ReplayFinished(outcome));
        });
    }

    fn on_replay_finished(&mut self, outcome: ReplayOutcome) {
        let Some(dialog) = self.replay.as_mut() else {
            debug!("replay finished after its dialog was closed");
            return;
        };

        match dialog.finish(outcome) {
            DialogEffect::CloseAndRefresh => {
                let target = dialog.target().clone();
                self.replay = None;
                self.notice = Some(format!("Replay of message …{} accepted", target.short_msg_id()));
                self.refresh_after_replay(target);
            }
            DialogEffect::ShowError(message) => self.error = Some(message),
            DialogEffect::Ignored => {}
        }
    }

    fn refresh_after_replay(&mut self, target: ReplayTarget) {
        let scope = match &self.current().kind {
            ScreenKind::Attempts { scope, .. } => Some(scope.clone()),
            _ => None,
        };
        let state = Arc::clone(&self.state);
        self.spawn_load(async move {
            if let Some(scope) = scope {
                state.refresh_attempts(&scope).await;
            }
            state.refresh_endpoints(&target.app_id).await;
        });
    }

    fn dismiss_error(&mut self) {
        self.error = None;
        if let Some(dialog) = self.replay.as_mut() {
            dialog.dismiss_error();
        }
    }

    fn open_filter(&mut self) {
        let index = self.current().selected;
        let (app_id, endpoint_id) = match (&self.current().kind, &self.rows) {
            (ScreenKind::Endpoints { app }, Rows::Endpoints(entries)) => match entries.get(index) {
                Some(entry) => (app.id.clone(), entry.endpoint.id.clone()),
                None => return,
            },
            _ => return,
        };
        let Some(tx) = self.events.clone() else {
            return;
        };

        self.filter = Some(FilterPane::Loading {
            app_id: app_id.clone(),
            endpoint_id: endpoint_id.clone(),
        });

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.refresh_event_types().await;
            let names: Vec<String> = state
                .event_types()
                .await
                .into_iter()
                .map(|event_type| event_type.name)
                .collect();
            let result = state
                .client()
                .get_endpoint(&app_id, &endpoint_id)
                .await
                .map(|endpoint| (names, endpoint))
                .map_err(|err| err.to_string());
            let _ = tx.send(Event::FilterReady {
                endpoint_id,
                result,
            });
        });
    }

    fn on_filter_ready(
        &mut self,
        endpoint_id: String,
        result: std::result::Result<(Vec<String>, Endpoint), String>,
    ) {
        let app_id = match &self.filter {
            Some(FilterPane::Loading {
                app_id,
                endpoint_id: expected,
            }) if *expected == endpoint_id => app_id.clone(),
            _ => {
                debug!(%endpoint_id, "filter data arrived for a closed editor");
                return;
            }
        };

        match result {
            Ok((names, endpoint)) => {
                let editor = FilterEditor::new(names, endpoint.filter_types.as_deref());
                self.filter = Some(FilterPane::Editing(FilterSession {
                    app_id,
                    endpoint,
                    editor,
                    cursor: 0,
                    saving: false,
                }));
            }
            Err(message) => {
                self.filter = None;
                self.error = Some(message);
            }
        }
    }

    fn save_filter(&mut self) {
        let Some(tx) = self.events.clone() else {
            return;
        };
        let Some(FilterPane::Editing(session)) = self.filter.as_mut() else {
            return;
        };

        let payload =
            EndpointPayload::with_filter_types(&session.endpoint, session.editor.filter_types());
        let app_id = session.app_id.clone();
        let endpoint_id = session.endpoint.id.clone();
        session.saving = true;
        info!(endpoint = %endpoint_id, filter_types = ?payload.filter_types, "saving filter types");

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let result = state
                .client()
                .update_endpoint(&app_id, &endpoint_id, &payload)
                .await;
            if let Ok(endpoint) = &result {
                state.replace_endpoint(&app_id, endpoint.clone()).await;
            }
            let _ = tx.send(Event::FilterSaved(result.map_err(|err| err.to_string())));
        });
    }

    fn on_filter_saved(&mut self, result: std::result::Result<Endpoint, String>) {
        match result {
            Ok(endpoint) => {
                self.filter = None;
                self.notice = Some(format!("Saved filter types for {}", endpoint.url));
            }
            Err(message) => {
                if let Some(FilterPane::Editing(session)) = self.filter.as_mut() {
                    session.saving = false;
                }
                self.error = Some(message);
            }
        }
    }

    fn open_create(&mut self) {
        match self.current().kind.clone() {
            ScreenKind::Applications => {
                self.form = Some(FormPane::Editing(Form::application()));
            }
            ScreenKind::EventTypes => {
                self.form = Some(FormPane::Editing(Form::event_type(None)));
            }
            ScreenKind::Endpoints { app } => {
                let state = Arc::clone(&self.state);
                self.load_form("Loading event types…", endpoint_form(state, app.id));
            }
            _ => {}
        }
    }

    fn open_event_type_edit(&mut self) {
        let name = match &self.rows {
            Rows::EventTypes(items) if self.current().kind == ScreenKind::EventTypes => {
                match items.get(self.current().selected) {
                    Some(event_type) => event_type.name.clone(),
                    None => return,
                }
            }
            _ => return,
        };

        let client = self.state.client().clone();
        self.load_form("Loading event type…", event_type_form(client, name));
    }

    fn load_form<F>(&mut self, message: &'static str, load: F)
    where
        F: Future<Output = std::result::Result<Form, ApiError>> + Send + 'static,
    {
        let Some(tx) = self.events.clone() else {
            return;
        };
        self.form = Some(FormPane::Loading(message));
        tokio::spawn(async move {
            let result = load.await.map_err(|err| err.to_string());
            let _ = tx.send(Event::FormReady(result));
        });
    }

    fn on_form_ready(&mut self, result: std::result::Result<Form, String>) {
        if !matches!(self.form, Some(FormPane::Loading(_))) {
            debug!("form data arrived after the dialog was closed");
            return;
        }

        match result {
            Ok(form) => self.form = Some(FormPane::Editing(form)),
            Err(message) => {
                self.form = None;
                self.error = Some(message);
            }
        }
    }

    fn submit_form(&mut self) {
        let Some(FormPane::Editing(form)) = self.form.as_mut() else {
            return;
        };
        let submission = match form.submission() {
            Ok(submission) => submission,
            Err(err) => {
                self.error = Some(err.to_string());
                return;
            }
        };
        form.submitting = true;
        info!(?submission, "submitting form");

        let client = self.state.client().clone();
        self.spawn_mutation(apply_submission(client, submission));
    }

    fn toggle_endpoint_disabled(&mut self) {
        let (app_id, endpoint) = match (&self.current().kind, &self.rows) {
            (ScreenKind::Endpoints { app }, Rows::Endpoints(entries)) => {
                match entries.get(self.current().selected) {
                    Some(entry) => (app.id.clone(), entry.endpoint.clone()),
                    None => return,
                }
            }
            _ => return,
        };

        let disabled = !endpoint.disabled;
        info!(endpoint = %endpoint.id, disabled, "changing endpoint state");
        let state = Arc::clone(&self.state);
        self.spawn_mutation(set_endpoint_state(state, app_id, endpoint.id, disabled));
    }

    fn confirm_delete(&mut self) {
        let index = self.current().selected;
        let target = match (&self.current().kind, &self.rows) {
            (ScreenKind::Endpoints { app }, Rows::Endpoints(entries)) => {
                entries.get(index).map(|entry| DeleteTarget::Endpoint {
                    app_id: app.id.clone(),
                    endpoint_id: entry.endpoint.id.clone(),
                    url: entry.endpoint.url.clone(),
                })
            }
            (ScreenKind::EventTypes, Rows::EventTypes(items)) => {
                items.get(index).map(|event_type| DeleteTarget::EventType {
                    name: event_type.name.clone(),
                })
            }
            _ => None,
        };

        if let Some(target) = target {
            let prompt = match &target {
                DeleteTarget::Endpoint { url, .. } => format!("Delete endpoint {}?", url),
                DeleteTarget::EventType { name } => format!("Delete event type {}?", name),
            };
            self.confirm = Some(PendingDelete { prompt, target });
        }
    }

    fn run_delete(&mut self, target: DeleteTarget) {
        info!(?target, "deleting");
        let client = self.state.client().clone();
        self.spawn_mutation(apply_delete(client, target));
    }

    fn spawn_mutation<F>(&mut self, mutation: F)
    where
        F: Future<Output = std::result::Result<String, ApiError>> + Send + 'static,
    {
        let Some(tx) = self.events.clone() else {
            return;
        };
        tokio::spawn(async move {
            let result = mutation.await.map_err(|err| err.to_string());
            let _ = tx.send(Event::Mutation(result));
        });
    }

    fn on_mutation(&mut self, result: std::result::Result<String, String>) {
        match result {
            Ok(notice) => {
                if matches!(&self.form, Some(FormPane::Editing(form)) if form.submitting) {
                    self.form = None;
                }
                self.notice = Some(notice);
                self.refresh_current();
            }
            Err(message) => {
                if let Some(FormPane::Editing(form)) = self.form.as_mut() {
                    form.submitting = false;
                }
                self.error = Some(message);
            }
        }
    }

    fn current(&self) -> &Screen {
        // The applications screen is never popped.
        &self.screens[self.screens.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Screen {
        let last = self.screens.len() - 1;
        &mut self.screens[last]
    }

    fn current_row_id(&self) -> Option<String> {
        if self.detail.is_none() {
            return None;
        }
        self.rows.id(self.current().selected).map(ToOwned::to_owned)
    }

    fn current_detail_state(&self) -> Option<&DetailState> {
        self.current_row_id()
            .and_then(|id| self.detail_states.get(&id))
    }

    fn current_detail_state_mut(&mut self) -> Option<&mut DetailState> {
        let id = self.current_row_id()?;
        Some(self.detail_states.entry(id).or_default())
    }
}

async fn endpoint_form(state: Arc<AppState>, app_id: String) -> std::result::Result<Form, ApiError> {
    // A failed event-type load leaves the picker empty.
    state.refresh_event_types().await;
    let names = state
        .event_types()
        .await
        .into_iter()
        .map(|event_type| event_type.name)
        .collect();
    Ok(Form::endpoint(app_id, names))
}

async fn event_type_form(client: ApiClient, name: String) -> std::result::Result<Form, ApiError> {
    let event_type = client.get_event_type(&name).await?;
    Ok(Form::event_type(Some(&event_type)))
}

async fn apply_submission(
    client: ApiClient,
    submission: Submission,
) -> std::result::Result<String, ApiError> {
    match submission {
        Submission::Application(payload) => {
            let app = client.create_application(&payload).await?;
            Ok(format!("Created application {}", app.name))
        }
        Submission::Endpoint { app_id, payload } => {
            let endpoint = client.create_endpoint(&app_id, &payload).await?;
            Ok(format!("Created endpoint {}", endpoint.url))
        }
        Submission::CreateEventType(payload) => {
            let event_type = client.create_event_type(&payload).await?;
            Ok(format!("Created event type {}", event_type.name))
        }
        Submission::UpdateEventType { name, payload } => {
            client.update_event_type(&name, &payload).await?;
            Ok(format!("Updated event type {}", name))
        }
    }
}

async fn set_endpoint_state(
    state: Arc<AppState>,
    app_id: String,
    endpoint_id: String,
    disabled: bool,
) -> std::result::Result<String, ApiError> {
    let updated = state
        .client()
        .set_endpoint_disabled(&app_id, &endpoint_id, disabled)
        .await?;
    let verb = if updated.disabled { "Disabled" } else { "Enabled" };
    let notice = format!("{} {}", verb, updated.url);
    state.replace_endpoint(&app_id, updated).await;
    Ok(notice)
}

async fn apply_delete(client: ApiClient, target: DeleteTarget) -> std::result::Result<String, ApiError> {
    match target {
        DeleteTarget::Endpoint {
            app_id,
            endpoint_id,
            url,
        } => {
            client.delete_endpoint(&app_id, &endpoint_id).await?;
            Ok(format!("Deleted endpoint {}", url))
        }
        DeleteTarget::EventType { name } => {
            client.delete_event_type(&name).await?;
            Ok(format!("Deleted event type {}", name))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayoutPreset {
    ListFocus,
    Balanced,
    DetailFocus,
}

impl LayoutPreset {
    fn next(self) -> Self {
        match self {
            LayoutPreset::ListFocus => LayoutPreset::Balanced,
            LayoutPreset::Balanced => LayoutPreset::DetailFocus,
            LayoutPreset::DetailFocus => LayoutPreset::ListFocus,
        }
    }

    fn config(self) -> LayoutConfig {
        let (list_percent, detail_percent) = match self {
            LayoutPreset::ListFocus => (65, 35),
            LayoutPreset::Balanced => (50, 50),
            LayoutPreset::DetailFocus => (33, 67),
        };
        LayoutConfig {
            list_percent,
            detail_percent,
        }
    }
}

fn breadcrumb(kind: &ScreenKind) -> String {
    match kind {
        ScreenKind::Applications => "Applications".to_string(),
        ScreenKind::Endpoints { app } => format!("{} › Endpoints", app.name),
        ScreenKind::Messages {
            app, label: None, ..
        } => format!("{} › Messages", app.name),
        ScreenKind::Messages {
            app,
            label: Some(label),
            ..
        } => format!("{} › {} › Messages", app.name, clip(label, 48)),
        ScreenKind::Attempts { app, label, .. } => {
            format!("{} › {} › Attempts", app.name, clip(label, 48))
        }
        ScreenKind::EventTypes => "Event types".to_string(),
    }
}

fn list_title(kind: &ScreenKind) -> &'static str {
    match kind {
        ScreenKind::Applications => "Applications",
        ScreenKind::Endpoints { .. } => "Endpoints",
        ScreenKind::Messages { .. } => "Messages",
        ScreenKind::Attempts { .. } => "Attempts",
        ScreenKind::EventTypes => "Event types",
    }
}

fn keymap(kind: &ScreenKind) -> &'static str {
    match kind {
        ScreenKind::Applications => {
            "Enter endpoints · m messages · t event types · n new · ? help · q quit"
        }
        ScreenKind::Endpoints { .. } => {
            "Enter attempts · f filter types · m messages · n new · d disable · D delete · ? help"
        }
        ScreenKind::Messages { .. } => "Enter attempts · Tab details · Esc back · ? help",
        ScreenKind::Attempts { .. } => {
            "r replay · / filter by URL · Tab details · Esc back · ? help"
        }
        ScreenKind::EventTypes => "n new · e edit · D delete · Tab details · Esc back · ? help",
    }
}

fn app_messages(app: AppRef) -> ScreenKind {
    ScreenKind::Messages {
        scope: MessageScope::App {
            app_id: app.id.clone(),
        },
        app,
        label: None,
    }
}

fn form_view(form: &Form) -> FormView {
    let fields = form
        .fields()
        .iter()
        .enumerate()
        .map(|(index, field)| FieldView {
            label: field.label,
            value: field.value.clone(),
            focused: index == form.focus(),
            locked: field.locked,
        })
        .collect();
    let picker = form.filter().map(|editor| {
        let separator = editor.tree().separator();
        PickerView {
            rows: editor
                .rows()
                .iter()
                .map(|row| ui::filter_row_text(row, separator))
                .collect(),
            cursor: form.filter_cursor(),
            focused: form.filter_focused(),
        }
    });

    FormView {
        title: form.title(),
        fields,
        picker,
        submitting: form.submitting,
    }
}

fn url_matches(url: &str, query: &str) -> bool {
    url.to_lowercase().contains(&query.to_lowercase())
}

fn summarize_application(app: &Application, now: DateTime<Utc>) -> ListEntry {
    ListEntry {
        kind: "app".to_string(),
        summary: format!("{} ({})", app.name, app.id),
        age: format_age(now, app.created_at),
        tone: Tone::Neutral,
    }
}

fn summarize_endpoint(entry: &EndpointEntry, now: DateTime<Utc>) -> ListEntry {
    let endpoint = &entry.endpoint;
    let (kind, tone) = match (endpoint.disabled, entry.stats) {
        (true, _) => ("disabled", Tone::Muted),
        (false, Some(stats)) if stats.fail > 0 => ("failing", Tone::Failure),
        (false, Some(stats)) if stats.pending + stats.sending > 0 => ("pending", Tone::Pending),
        (false, Some(_)) => ("ok", Tone::Success),
        (false, None) => ("endpoint", Tone::Neutral),
    };

    let mut summary = clip(&endpoint.url, 60);
    if let Some(types) = endpoint.filter_types.as_ref().filter(|types| !types.is_empty()) {
        summary = format!("{} · {} types", summary, types.len());
    }

    ListEntry {
        kind: kind.to_string(),
        summary,
        age: format_age(now, endpoint.updated_at),
        tone,
    }
}

fn summarize_message(msg: &Message, now: DateTime<Utc>) -> ListEntry {
    ListEntry {
        kind: msg.event_type.clone(),
        summary: format!("{} {}", msg.id, clip(&value_preview(&msg.payload), 48)),
        age: format_age(now, msg.timestamp),
        tone: Tone::Neutral,
    }
}

fn summarize_event_type(event_type: &EventType) -> ListEntry {
    let (kind, tone) = if event_type.archived {
        ("archived", Tone::Muted)
    } else if event_type.deprecated {
        ("deprecated", Tone::Pending)
    } else {
        ("type", Tone::Neutral)
    };
    let summary = if event_type.description.is_empty() {
        event_type.name.clone()
    } else {
        format!("{} · {}", event_type.name, clip(&event_type.description, 48))
    };

    ListEntry {
        kind: kind.to_string(),
        summary,
        age: String::new(),
        tone,
    }
}

fn summarize_attempt(attempt: &Attempt, now: DateTime<Utc>) -> ListEntry {
    let tone = match attempt.status {
        DeliveryStatus::Success => Tone::Success,
        DeliveryStatus::Failed => Tone::Failure,
        DeliveryStatus::Pending | DeliveryStatus::Sending => Tone::Pending,
        DeliveryStatus::Unknown(_) => Tone::Muted,
    };
    let event_type = attempt
        .msg
        .as_ref()
        .map(|msg| msg.event_type.as_str())
        .unwrap_or("-");

    ListEntry {
        kind: attempt.status.label().to_string(),
        summary: format!(
            "{} {} {} {}",
            attempt.response_status_code,
            event_type,
            attempt.msg_id,
            clip(&attempt.url, 40)
        ),
        age: format_age(now, attempt.timestamp),
        tone,
    }
}

fn value_preview(value: &Value) -> String {
    match value {
        Value::String(text) => flatten(text),
        Value::Null => "null".to_string(),
        other => flatten(&other.to_string()),
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", truncated)
}

fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn format_age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0) as u64;
    if secs < 1 {
        "just now".to_string()
    } else if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3_600 {
        format!("{}m {:02}s ago", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {:02}m ago", secs / 3_600, (secs % 3_600) / 60)
    } else {
        format!("{}d {:02}h ago", secs / 86_400, (secs % 86_400) / 3_600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::StatusCode,
        routing::{get, post},
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::{
        client::ClientConfig,
        replay::DialogPhase,
    };

    fn key(code: KeyCode) -> Event {
        Event::Input(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn attempt(id: &str, url: &str) -> Attempt {
        serde_json::from_value(json!({
            "id": id,
            "msgId": "msg_2bV1y8ZkQx3a",
            "endpointId": "ep_1",
            "url": url,
            "responseStatusCode": 500,
            "status": 2,
            "triggerType": 0,
            "timestamp": "2024-03-05T10:15:00Z"
        }))
        .expect("attempt")
    }

    fn endpoint_json(filter_types: Value) -> Value {
        json!({
            "id": "ep_1",
            "url": "https://example.test/hooks",
            "filterTypes": filter_types,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-02T00:00:00Z"
        })
    }

    fn billing() -> AppRef {
        AppRef {
            id: "app_1".to_string(),
            name: "Billing".to_string(),
        }
    }

    async fn closed_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        format!("http://{}", addr)
    }

    /// Fake API for one app with a single endpoint. Every write reports its
    /// method and JSON body on `writes`.
    async fn serve_fake_api(writes: mpsc::UnboundedSender<(&'static str, Value)>) -> String {
        let (created, patched, deleted) = (writes.clone(), writes.clone(), writes);
        let router = Router::new()
            .route(
                "/api/v1/event-type",
                get(|| async {
                    Json(json!({
                        "data": [
                            { "name": "invoice.paid" },
                            { "name": "invoice.voided" },
                            { "name": "user.signup" }
                        ],
                        "done": true
                    }))
                }),
            )
            .route(
                "/api/v1/app/app_1/endpoint",
                post(move |Json(body): Json<Value>| {
                    let created = created.clone();
                    async move {
                        let mut endpoint = endpoint_json(body["filterTypes"].clone());
                        endpoint["id"] = json!("ep_2");
                        endpoint["url"] = body["url"].clone();
                        let _ = created.send(("POST", body));
                        (StatusCode::CREATED, Json(endpoint))
                    }
                }),
            )
            .route(
                "/api/v1/app/app_1/endpoint/ep_1",
                get(|| async { Json(endpoint_json(Value::Null)) })
                    .patch(move |Json(body): Json<Value>| {
                        let patched = patched.clone();
                        async move {
                            let endpoint = endpoint_json(body["filterTypes"].clone());
                            let _ = patched.send(("PATCH", body));
                            Json(endpoint)
                        }
                    })
                    .delete(move || {
                        let deleted = deleted.clone();
                        async move {
                            let _ = deleted.send(("DELETE", Value::Null));
                            StatusCode::NO_CONTENT
                        }
                    }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service()).await;
        });
        format!("http://{}", addr)
    }

    fn dashboard_at(
        base_url: String,
        kind: ScreenKind,
        rows: Rows,
    ) -> (HookdashApp, mpsc::UnboundedReceiver<Event>) {
        let client = ApiClient::new(ClientConfig {
            base_url,
            token: None,
            timeout: Duration::from_secs(2),
            request_log: None,
        })
        .expect("client");
        let screens = vec![Screen::new(ScreenKind::Applications), Screen::new(kind)];

        let mut dashboard = HookdashApp::with_screens(Arc::new(AppState::new(client)), screens);
        dashboard.rows = rows;
        let (tx, rx) = mpsc::unbounded_channel();
        dashboard.events = Some(tx);
        (dashboard, rx)
    }

    /// An app on the attempts screen whose API points at a closed port.
    async fn attempts_app() -> (HookdashApp, mpsc::UnboundedReceiver<Event>) {
        let app = billing();
        dashboard_at(
            closed_url().await,
            ScreenKind::Attempts {
                app: app.clone(),
                scope: AttemptScope::Endpoint {
                    app_id: app.id.clone(),
                    endpoint_id: "ep_1".to_string(),
                },
                label: "https://example.test/hooks".to_string(),
            },
            Rows::Attempts(vec![
                attempt("atmpt_1", "https://example.test/hooks"),
                attempt("atmpt_2", "https://other.test/hooks"),
            ]),
        )
    }

    fn endpoints_app(base_url: String) -> (HookdashApp, mpsc::UnboundedReceiver<Event>) {
        let endpoint = serde_json::from_value(endpoint_json(Value::Null)).expect("endpoint");
        dashboard_at(
            base_url,
            ScreenKind::Endpoints { app: billing() },
            Rows::Endpoints(vec![EndpointEntry {
                endpoint,
                stats: None,
            }]),
        )
    }

    async fn wait_for(
        rx: &mut mpsc::UnboundedReceiver<Event>,
        wanted: impl Fn(&Event) -> bool,
    ) -> Event {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event in time")
                .expect("event");
            if wanted(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn failed_replay_keeps_dialog_open_until_dismissed() {
        let (mut dashboard, mut rx) = attempts_app().await;

        dashboard.handle_event(key(KeyCode::Char('r')));
        dashboard.handle_event(key(KeyCode::Char('2')));
        assert_eq!(
            dashboard.replay.as_ref().map(|dialog| dialog.strategy()),
            Some(ReplayStrategy::RecoverSince)
        );

        dashboard.handle_event(key(KeyCode::Enter));
        assert!(dashboard.replay.as_ref().is_some_and(|dialog| dialog.is_submitting()));

        dashboard.handle_event(key(KeyCode::Enter));
        dashboard.handle_event(key(KeyCode::Esc));
        assert!(dashboard.replay.is_some(), "dialog cannot close while submitting");

        let outcome = loop {
            match rx.recv().await.expect("event") {
                event @ Event::ReplayFinished(_) => break event,
                _ => continue,
            }
        };
        dashboard.handle_event(outcome);

        assert!(dashboard.error.is_some());
        assert!(matches!(
            dashboard.replay.as_ref().map(|dialog| dialog.phase()),
            Some(DialogPhase::Failed(_))
        ));

        dashboard.handle_event(key(KeyCode::Enter));
        assert!(dashboard.error.is_none());
        assert!(matches!(
            dashboard.replay.as_ref().map(|dialog| dialog.phase()),
            Some(DialogPhase::Choosing)
        ));
        assert_eq!(
            dashboard.replay.as_ref().map(|dialog| dialog.strategy()),
            Some(ReplayStrategy::RecoverSince)
        );
    }

    #[tokio::test]
    async fn accepted_replay_closes_dialog_and_refreshes() {
        let (mut dashboard, _rx) = attempts_app().await;

        dashboard.handle_event(key(KeyCode::Char('r')));
        dashboard.handle_event(key(KeyCode::Enter));
        let loads_before = dashboard.pending_loads;

        dashboard.handle_event(Event::ReplayFinished(ReplayOutcome::Accepted));

        assert!(dashboard.replay.is_none());
        assert!(dashboard.error.is_none());
        assert_eq!(dashboard.pending_loads, loads_before + 1);
        assert_eq!(
            dashboard.notice.as_deref(),
            Some("Replay of message …ZkQx3a accepted")
        );
    }

    #[tokio::test]
    async fn saving_the_filter_editor_patches_the_endpoint() {
        let (writes, mut written) = mpsc::unbounded_channel();
        let (mut dashboard, mut rx) = endpoints_app(serve_fake_api(writes).await);

        dashboard.handle_event(key(KeyCode::Char('f')));
        assert!(matches!(dashboard.filter, Some(FilterPane::Loading { .. })));
        let ready = wait_for(&mut rx, |event| matches!(event, Event::FilterReady { .. })).await;
        dashboard.handle_event(ready);

        // invoice, invoice.paid, invoice.voided, user, user.signup
        dashboard.handle_event(key(KeyCode::Down));
        dashboard.handle_event(key(KeyCode::Char(' ')));
        dashboard.handle_event(key(KeyCode::Char('s')));
        assert!(matches!(
            &dashboard.filter,
            Some(FilterPane::Editing(session)) if session.saving
        ));

        let saved = wait_for(&mut rx, |event| matches!(event, Event::FilterSaved(_))).await;
        let (method, body) = written.recv().await.expect("patch body");
        assert_eq!(method, "PATCH");
        assert_eq!(body["filterTypes"], json!(["invoice.paid"]));
        assert_eq!(body["url"], json!("https://example.test/hooks"));
        assert_eq!(body["disabled"], json!(false));

        dashboard.handle_event(saved);
        assert!(dashboard.filter.is_none());
        assert!(dashboard.error.is_none());
        assert_eq!(
            dashboard.notice.as_deref(),
            Some("Saved filter types for https://example.test/hooks")
        );
    }

    #[tokio::test]
    async fn new_endpoint_form_posts_the_checked_branch() {
        let (writes, mut written) = mpsc::unbounded_channel();
        let (mut dashboard, mut rx) = endpoints_app(serve_fake_api(writes).await);

        dashboard.handle_event(key(KeyCode::Char('n')));
        let ready = wait_for(&mut rx, |event| matches!(event, Event::FormReady(_))).await;
        dashboard.handle_event(ready);

        for ch in "https://example.test/new".chars() {
            dashboard.handle_event(key(KeyCode::Char(ch)));
        }
        for _ in 0..3 {
            dashboard.handle_event(key(KeyCode::Tab));
        }
        dashboard.handle_event(key(KeyCode::Char(' ')));
        dashboard.handle_event(key(KeyCode::Enter));
        assert!(matches!(
            &dashboard.form,
            Some(FormPane::Editing(form)) if form.submitting
        ));

        let finished = wait_for(&mut rx, |event| matches!(event, Event::Mutation(_))).await;
        let (method, body) = written.recv().await.expect("create body");
        assert_eq!(method, "POST");
        assert_eq!(body["url"], json!("https://example.test/new"));
        assert_eq!(body["filterTypes"], json!(["invoice.paid", "invoice.voided"]));
        assert_eq!(body["channels"], Value::Null);

        dashboard.handle_event(finished);
        assert!(dashboard.form.is_none());
        assert_eq!(
            dashboard.notice.as_deref(),
            Some("Created endpoint https://example.test/new")
        );
    }

    #[tokio::test]
    async fn invalid_endpoint_url_is_reported_without_a_request() {
        let (mut dashboard, _rx) = endpoints_app(closed_url().await);
        dashboard.form = Some(FormPane::Editing(Form::endpoint("app_1", Vec::new())));

        for ch in "example.test".chars() {
            dashboard.handle_event(key(KeyCode::Char(ch)));
        }
        dashboard.handle_event(key(KeyCode::Enter));

        assert_eq!(
            dashboard.error.as_deref(),
            Some("example.test is not an http(s) URL")
        );
        assert!(matches!(
            &dashboard.form,
            Some(FormPane::Editing(form)) if !form.submitting
        ));
    }

    #[tokio::test]
    async fn deleting_an_endpoint_asks_first() {
        let (writes, mut written) = mpsc::unbounded_channel();
        let (mut dashboard, mut rx) = endpoints_app(serve_fake_api(writes).await);

        dashboard.handle_event(key(KeyCode::Char('D')));
        assert_eq!(
            dashboard.confirm.as_ref().map(|pending| pending.prompt.as_str()),
            Some("Delete endpoint https://example.test/hooks?")
        );
        dashboard.handle_event(key(KeyCode::Char('n')));
        assert!(dashboard.confirm.is_none());
        assert!(written.try_recv().is_err());

        dashboard.handle_event(key(KeyCode::Char('D')));
        dashboard.handle_event(key(KeyCode::Char('y')));
        let finished = wait_for(&mut rx, |event| matches!(event, Event::Mutation(_))).await;
        assert_eq!(written.recv().await.expect("delete").0, "DELETE");

        dashboard.handle_event(finished);
        assert_eq!(
            dashboard.notice.as_deref(),
            Some("Deleted endpoint https://example.test/hooks")
        );
    }

    #[tokio::test]
    async fn messages_from_endpoints_are_scoped_to_the_endpoint() {
        let (mut dashboard, _rx) = endpoints_app(closed_url().await);

        dashboard.handle_event(key(KeyCode::Char('m')));

        let kind = dashboard.current().kind.clone();
        assert_eq!(
            kind,
            ScreenKind::Messages {
                app: billing(),
                scope: MessageScope::Endpoint {
                    app_id: "app_1".to_string(),
                    endpoint_id: "ep_1".to_string(),
                },
                label: Some("https://example.test/hooks".to_string()),
            }
        );
        assert_eq!(
            breadcrumb(&kind),
            "Billing › https://example.test/hooks › Messages"
        );
    }

    #[tokio::test]
    async fn search_narrows_attempts_by_url() {
        let (mut dashboard, _rx) = attempts_app().await;

        dashboard.handle_event(key(KeyCode::Char('/')));
        for ch in "OTHER".chars() {
            dashboard.handle_event(key(KeyCode::Char(ch)));
        }
        dashboard.handle_event(key(KeyCode::Enter));

        let search = dashboard.search.as_ref().expect("search kept");
        assert_eq!(search.query, "OTHER");
        assert!(!search.editing);
        assert!(url_matches("https://other.test/hooks", &search.query));
        assert!(!url_matches("https://example.test/hooks", &search.query));

        dashboard.handle_event(key(KeyCode::Esc));
        assert!(dashboard.search.is_none());
    }

    #[tokio::test]
    async fn quits_on_q_and_ctrl_c_only() {
        let (mut dashboard, _rx) = attempts_app().await;
        assert!(!dashboard.handle_event(key(KeyCode::Char('x'))));
        assert!(!dashboard.handle_event(Event::Tick));
        assert!(dashboard.handle_event(Event::Input(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL
        ))));
        assert!(dashboard.handle_event(key(KeyCode::Char('q'))));
    }

    #[test]
    fn formats_ages() {
        let then: DateTime<Utc> = "2024-03-05T10:00:00Z".parse().expect("then");
        let at = |offset: i64| then + chrono::Duration::seconds(offset);

        assert_eq!(format_age(at(-5), then), "just now");
        assert_eq!(format_age(at(42), then), "42s ago");
        assert_eq!(format_age(at(125), then), "2m 05s ago");
        assert_eq!(format_age(at(7_260), then), "2h 01m ago");
        assert_eq!(format_age(at(90_000), then), "1d 01h ago");
    }

    #[test]
    fn attempt_rows_carry_status_tone() {
        let now: DateTime<Utc> = "2024-03-05T10:16:00Z".parse().expect("now");
        let entry = summarize_attempt(&attempt("atmpt_1", "https://example.test/hooks"), now);

        assert_eq!(entry.kind, "Failed");
        assert_eq!(entry.tone, Tone::Failure);
        assert!(entry.summary.starts_with("500 - msg_2bV1y8ZkQx3a"));
        assert_eq!(entry.age, "1m 00s ago");
    }
}
