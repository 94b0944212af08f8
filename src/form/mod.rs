//! Create and edit dialogs for applications, endpoints and event types.

use reqwest::Url;
use thiserror::Error;

use crate::{
    filter::{FilterEditor, FilterRow},
    protocol::{ApplicationPayload, EndpointPayload, EventType, EventTypePayload},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("{0} is not an http(s) URL")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormKind {
    Application,
    Endpoint { app_id: String },
    EventType { editing: Option<String> },
}

#[derive(Debug, Clone)]
pub struct TextField {
    pub label: &'static str,
    pub value: String,
    /// Shown but not editable, like an event type's name on edit.
    pub locked: bool,
}

impl TextField {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            value: String::new(),
            locked: false,
        }
    }
}

/// What a valid form turns into once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Application(ApplicationPayload),
    Endpoint {
        app_id: String,
        payload: EndpointPayload,
    },
    CreateEventType(EventTypePayload),
    UpdateEventType {
        name: String,
        payload: EventTypePayload,
    },
}

#[derive(Debug, Clone)]
pub struct Form {
    kind: FormKind,
    fields: Vec<TextField>,
    filter: Option<FilterEditor>,
    /// Index into `fields`; `fields.len()` is the filter picker.
    focus: usize,
    filter_cursor: usize,
    pub submitting: bool,
}

impl Form {
    pub fn application() -> Self {
        Self::with_fields(FormKind::Application, vec![TextField::new("Name")], None)
    }

    /// New endpoint with nothing checked, which delivers every event type.
    pub fn endpoint(app_id: impl Into<String>, event_types: Vec<String>) -> Self {
        Self::with_fields(
            FormKind::Endpoint {
                app_id: app_id.into(),
            },
            vec![
                TextField::new("URL"),
                TextField::new("Description"),
                TextField::new("Channels"),
            ],
            Some(FilterEditor::new(event_types, None)),
        )
    }

    pub fn event_type(existing: Option<&EventType>) -> Self {
        let mut name = TextField::new("Name");
        let mut description = TextField::new("Description");
        if let Some(event_type) = existing {
            name.value = event_type.name.clone();
            name.locked = true;
            description.value = event_type.description.clone();
        }

        let mut form = Self::with_fields(
            FormKind::EventType {
                editing: existing.map(|event_type| event_type.name.clone()),
            },
            vec![name, description],
            None,
        );
        if existing.is_some() {
            form.focus = 1;
        }
        form
    }

    fn with_fields(kind: FormKind, fields: Vec<TextField>, filter: Option<FilterEditor>) -> Self {
        Self {
            kind,
            fields,
            filter,
            focus: 0,
            filter_cursor: 0,
            submitting: false,
        }
    }

    pub fn title(&self) -> String {
        match &self.kind {
            FormKind::Application => "New application".to_string(),
            FormKind::Endpoint { .. } => "New endpoint".to_string(),
            FormKind::EventType { editing: None } => "New event type".to_string(),
            FormKind::EventType {
                editing: Some(name),
            } => format!("Edit event type {}", name),
        }
    }

    pub fn fields(&self) -> &[TextField] {
        &self.fields
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn filter_focused(&self) -> bool {
        self.filter.is_some() && self.focus == self.fields.len()
    }

    pub fn filter(&self) -> Option<&FilterEditor> {
        self.filter.as_ref()
    }

    pub fn filter_cursor(&self) -> usize {
        self.filter_cursor
    }

    pub fn next_field(&mut self) {
        let stops = self.stops();
        self.focus = (self.focus + 1) % stops;
        if self.focused_field().is_some_and(|field| field.locked) {
            self.next_field();
        }
    }

    pub fn previous_field(&mut self) {
        let stops = self.stops();
        self.focus = (self.focus + stops - 1) % stops;
        if self.focused_field().is_some_and(|field| field.locked) {
            self.previous_field();
        }
    }

    fn stops(&self) -> usize {
        self.fields.len() + usize::from(self.filter.is_some())
    }

    fn focused_field(&self) -> Option<&TextField> {
        self.fields.get(self.focus)
    }

    fn editable_field(&mut self) -> Option<&mut TextField> {
        self.fields.get_mut(self.focus).filter(|field| !field.locked)
    }

    /// Typed characters go to the focused field, except space on the
    /// filter picker which toggles the row under the cursor.
    pub fn input(&mut self, ch: char) {
        if self.filter_focused() {
            if ch == ' ' {
                self.toggle_filter();
            }
            return;
        }
        if let Some(field) = self.editable_field() {
            field.value.push(ch);
        }
    }

    pub fn backspace(&mut self) {
        if let Some(field) = self.editable_field() {
            field.value.pop();
        }
    }

    pub fn move_filter(&mut self, delta: isize) {
        let Some(editor) = &self.filter else {
            return;
        };
        let last = editor.rows().len().saturating_sub(1);
        self.filter_cursor = self.filter_cursor.saturating_add_signed(delta).min(last);
    }

    fn toggle_filter(&mut self) {
        let Some(editor) = self.filter.as_mut() else {
            return;
        };
        let rows: Vec<FilterRow> = editor.rows();
        if let Some(row) = rows.get(self.filter_cursor) {
            editor.toggle(&row.name);
        }
    }

    pub fn submission(&self) -> Result<Submission, FormError> {
        match &self.kind {
            FormKind::Application => Ok(Submission::Application(ApplicationPayload {
                name: self.required(0)?,
            })),
            FormKind::Endpoint { app_id } => {
                let url = self.required(0)?;
                let parsed = Url::parse(&url).map_err(|_| FormError::InvalidUrl(url.clone()))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(FormError::InvalidUrl(url));
                }

                let channels: Vec<String> = self
                    .value(2)
                    .split(',')
                    .map(str::trim)
                    .filter(|channel| !channel.is_empty())
                    .map(ToOwned::to_owned)
                    .collect();

                Ok(Submission::Endpoint {
                    app_id: app_id.clone(),
                    payload: EndpointPayload {
                        url,
                        description: self.value(1).trim().to_string(),
                        disabled: None,
                        filter_types: self.filter.as_ref().and_then(FilterEditor::filter_types),
                        channels: (!channels.is_empty()).then_some(channels),
                        rate_limit: None,
                    },
                })
            }
            FormKind::EventType { editing } => {
                let payload = EventTypePayload {
                    name: self.required(0)?,
                    description: Some(self.value(1).trim())
                        .filter(|description| !description.is_empty())
                        .map(ToOwned::to_owned),
                };
                Ok(match editing {
                    Some(name) => Submission::UpdateEventType {
                        name: name.clone(),
                        payload,
                    },
                    None => Submission::CreateEventType(payload),
                })
            }
        }
    }

    fn value(&self, index: usize) -> &str {
        self.fields
            .get(index)
            .map(|field| field.value.as_str())
            .unwrap_or_default()
    }

    fn required(&self, index: usize) -> Result<String, FormError> {
        let value = self.value(index).trim();
        if value.is_empty() {
            let label = self.fields.get(index).map(|field| field.label).unwrap_or("field");
            return Err(FormError::Required(label));
        }
        Ok(value.to_string())
    }
}
