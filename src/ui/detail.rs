use std::collections::HashSet;

use chrono::{DateTime, Local, Utc};
use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::{
    protocol::{Application, Attempt, DeliveryStatus, EventType, Message},
    state::EndpointEntry,
};

#[derive(Debug, Clone)]
pub struct DetailViewModel {
    pub header: String,
    pub footer: String,
    pub lines: Vec<DetailLine>,
}

#[derive(Debug, Clone)]
pub struct DetailLine {
    pub indent: usize,
    pub segments: Vec<DetailSegment>,
}

#[derive(Debug, Clone)]
pub struct DetailSegment {
    pub text: String,
    pub style: SegmentStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStyle {
    Plain,
    Key,
    Type,
    String,
    Number,
    Boolean,
    Null,
    Success,
    Failure,
}

pub fn build_attempt_detail(attempt: &Attempt) -> DetailViewModel {
    let header = format!(
        "{} • {}",
        attempt.status.label(),
        local_timestamp(attempt.timestamp)
    );

    let footer = attempt
        .msg
        .as_ref()
        .and_then(|msg| msg.channels.as_ref())
        .filter(|channels| !channels.is_empty())
        .map(|channels| format!("channels: {}", channels.join(", ")))
        .unwrap_or_default();

    let mut lines = vec![
        detail_key_value("Attempt", &attempt.id),
        detail_key_value("Message", &attempt.msg_id),
        detail_key_value("Endpoint", &attempt.endpoint_id),
        detail_key_value("URL", &attempt.url),
        DetailLine {
            indent: 0,
            segments: vec![
                key_segment("Status"),
                DetailSegment {
                    text: format!(
                        "{} ({})",
                        attempt.response_status_code,
                        attempt.status.label()
                    ),
                    style: status_style(attempt.status),
                },
            ],
        },
        detail_key_value("Duration", &format!("{} ms", attempt.response_duration_ms)),
        detail_key_value("Trigger", attempt.trigger_type.label()),
        detail_key_value("Timestamp", &local_timestamp(attempt.timestamp)),
    ];

    if let Some(msg) = &attempt.msg {
        lines.push(detail_key_value("Event type", &msg.event_type));
    }

    lines.push(empty_line(0));
    lines.extend(render_response(&attempt.response));

    if let Some(msg) = &attempt.msg {
        lines.push(empty_line(0));
        push_value_lines(&mut lines, 0, "Payload", &msg.payload);
    }

    DetailViewModel {
        header,
        footer,
        lines,
    }
}

pub fn build_application_detail(app: &Application) -> DetailViewModel {
    DetailViewModel {
        header: app.name.clone(),
        footer: String::new(),
        lines: vec![
            detail_key_value("Id", &app.id),
            detail_key_value("Created", &local_timestamp(app.created_at)),
            detail_key_value("Updated", &local_timestamp(app.updated_at)),
        ],
    }
}

pub fn build_endpoint_detail(entry: &EndpointEntry) -> DetailViewModel {
    let endpoint = &entry.endpoint;
    let mut lines = vec![
        detail_key_value("Id", &endpoint.id),
        detail_key_value("URL", &endpoint.url),
    ];
    if !endpoint.description.is_empty() {
        lines.push(detail_key_value("Description", &endpoint.description));
    }
    if let Some(version) = endpoint.version {
        lines.push(detail_key_value("Version", &version.to_string()));
    }
    if let Some(limit) = endpoint.rate_limit {
        lines.push(detail_key_value("Rate limit", &format!("{}/s", limit)));
    }
    lines.push(detail_key_value(
        "State",
        if endpoint.disabled { "disabled" } else { "enabled" },
    ));
    lines.push(detail_key_value("Updated", &local_timestamp(endpoint.updated_at)));

    lines.push(empty_line(0));
    match &entry.stats {
        Some(stats) => {
            lines.push(DetailLine {
                indent: 0,
                segments: vec![key_segment("Deliveries")],
            });
            lines.push(labelled(1, "success", &stats.success.to_string(), SegmentStyle::Success));
            lines.push(labelled(1, "pending", &stats.pending.to_string(), SegmentStyle::Number));
            lines.push(labelled(1, "sending", &stats.sending.to_string(), SegmentStyle::Number));
            lines.push(labelled(1, "fail", &stats.fail.to_string(), SegmentStyle::Failure));
        }
        None => lines.push(labelled(0, "Deliveries", "unavailable", SegmentStyle::Null)),
    }

    lines.push(empty_line(0));
    push_name_list(&mut lines, "Filter types", endpoint.filter_types.as_deref(), "all event types");
    push_name_list(&mut lines, "Channels", endpoint.channels.as_deref(), "none");

    DetailViewModel {
        header: endpoint.url.clone(),
        footer: "f edit filter types".to_string(),
        lines,
    }
}

pub fn build_message_detail(msg: &Message) -> DetailViewModel {
    let mut lines = vec![
        detail_key_value("Id", &msg.id),
        detail_key_value("Event type", &msg.event_type),
    ];
    if let Some(event_id) = &msg.event_id {
        lines.push(detail_key_value("Event id", event_id));
    }
    lines.push(detail_key_value("Timestamp", &local_timestamp(msg.timestamp)));
    push_name_list(&mut lines, "Channels", msg.channels.as_deref(), "none");
    lines.push(empty_line(0));
    push_value_lines(&mut lines, 0, "Payload", &msg.payload);

    DetailViewModel {
        header: format!("{} • {}", msg.event_type, local_timestamp(msg.timestamp)),
        footer: String::new(),
        lines,
    }
}

pub fn build_event_type_detail(event_type: &EventType) -> DetailViewModel {
    let mut lines = vec![detail_key_value("Name", &event_type.name)];
    if event_type.description.is_empty() {
        lines.push(labelled(0, "Description", "none", SegmentStyle::Null));
    } else {
        lines.push(detail_key_value("Description", &event_type.description));
    }
    if event_type.archived {
        lines.push(labelled(0, "State", "archived", SegmentStyle::Failure));
    } else if event_type.deprecated {
        lines.push(labelled(0, "State", "deprecated", SegmentStyle::Type));
    }

    DetailViewModel {
        header: event_type.name.clone(),
        footer: "e edit · D delete".to_string(),
        lines,
    }
}

fn push_name_list(lines: &mut Vec<DetailLine>, label: &str, names: Option<&[String]>, empty: &str) {
    match names {
        Some(names) if !names.is_empty() => {
            lines.push(DetailLine {
                indent: 0,
                segments: vec![key_segment(label)],
            });
            for name in names {
                lines.push(DetailLine {
                    indent: 1,
                    segments: vec![DetailSegment {
                        text: name.clone(),
                        style: SegmentStyle::String,
                    }],
                });
            }
        }
        _ => lines.push(labelled(0, label, empty, SegmentStyle::Null)),
    }
}

pub fn visible_indices_with_children(
    detail: &DetailViewModel,
    collapsed: Option<&HashSet<usize>>,
) -> (Vec<usize>, Vec<bool>) {
    let has_children = compute_has_children(&detail.lines);
    let mut visible = Vec::new();
    let mut hidden_indent: Option<usize> = None;

    for (index, line) in detail.lines.iter().enumerate() {
        if let Some(indent) = hidden_indent {
            if line.indent > indent {
                continue;
            }
            hidden_indent = None;
        }

        visible.push(index);

        let is_collapsed = collapsed.map(|set| set.contains(&index)).unwrap_or(false);

        if has_children[index] && is_collapsed {
            hidden_indent = Some(line.indent);
        }
    }

    (visible, has_children)
}

/// Response bodies are shown as a JSON tree when they parse, as flattened
/// text when they look like HTML, and verbatim otherwise.
fn render_response(body: &str) -> Vec<DetailLine> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return vec![DetailLine {
            indent: 0,
            segments: vec![
                key_segment("Response"),
                DetailSegment {
                    text: "(empty)".to_string(),
                    style: SegmentStyle::Null,
                },
            ],
        }];
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let mut lines = Vec::new();
        push_value_lines(&mut lines, 0, "Response", &value);
        return lines;
    }

    let text = if looks_like_html(trimmed) {
        strip_html(trimmed)
    } else {
        trimmed.to_string()
    };

    let mut lines = vec![DetailLine {
        indent: 0,
        segments: vec![key_segment("Response")],
    }];
    lines.extend(
        text.lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .map(|line| DetailLine {
                indent: 1,
                segments: vec![DetailSegment {
                    text: line.to_string(),
                    style: SegmentStyle::Plain,
                }],
            }),
    );
    lines
}

fn push_value_lines(lines: &mut Vec<DetailLine>, indent: usize, label: &str, value: &Value) {
    match value {
        Value::String(text) => {
            if text.is_empty() {
                lines.push(labelled(indent, label, "\"\"", SegmentStyle::String));
                return;
            }

            let mut pieces = text.lines();
            if let Some(first) = pieces.next() {
                lines.push(labelled(indent, label, first, SegmentStyle::String));
            }

            for extra in pieces {
                if extra.is_empty() {
                    lines.push(empty_line(indent + 1));
                } else {
                    lines.push(DetailLine {
                        indent: indent + 1,
                        segments: vec![DetailSegment {
                            text: extra.to_string(),
                            style: SegmentStyle::String,
                        }],
                    });
                }
            }
        }
        Value::Number(number) => {
            lines.push(labelled(indent, label, &number.to_string(), SegmentStyle::Number));
        }
        Value::Bool(boolean) => {
            lines.push(labelled(indent, label, &boolean.to_string(), SegmentStyle::Boolean));
        }
        Value::Null => {
            lines.push(labelled(indent, label, "null", SegmentStyle::Null));
        }
        Value::Array(items) => {
            let summary = match items.len() {
                1 => "[1 item]".to_string(),
                count => format!("[{} items]", count),
            };
            lines.push(labelled(indent, label, &summary, SegmentStyle::Type));
            for (index, item) in items.iter().enumerate() {
                push_value_lines(lines, indent + 1, &index.to_string(), item);
            }
        }
        Value::Object(map) => {
            let summary = match map.len() {
                1 => "{1 key}".to_string(),
                count => format!("{{{} keys}}", count),
            };
            lines.push(labelled(indent, label, &summary, SegmentStyle::Type));
            for (key, item) in map {
                push_value_lines(lines, indent + 1, key, item);
            }
        }
    }
}

fn labelled(indent: usize, label: &str, text: &str, style: SegmentStyle) -> DetailLine {
    DetailLine {
        indent,
        segments: vec![
            key_segment(label),
            DetailSegment {
                text: text.to_string(),
                style,
            },
        ],
    }
}

fn key_segment(label: &str) -> DetailSegment {
    DetailSegment {
        text: format!("{}: ", label),
        style: SegmentStyle::Key,
    }
}

fn empty_line(indent: usize) -> DetailLine {
    DetailLine {
        indent,
        segments: vec![DetailSegment {
            text: String::new(),
            style: SegmentStyle::Plain,
        }],
    }
}

fn detail_key_value(label: &str, value: &str) -> DetailLine {
    labelled(0, label, value, SegmentStyle::Plain)
}

fn status_style(status: DeliveryStatus) -> SegmentStyle {
    match status {
        DeliveryStatus::Success => SegmentStyle::Success,
        DeliveryStatus::Failed => SegmentStyle::Failure,
        _ => SegmentStyle::Plain,
    }
}

pub fn local_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|h[1-6]|li|tr|title)>").unwrap()
});
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());

fn looks_like_html(input: &str) -> bool {
    input.starts_with('<') && input.contains('>')
}

fn strip_html(input: &str) -> String {
    let without_script = SCRIPT_RE.replace_all(input, "");
    let with_breaks = BLOCK_RE.replace_all(&without_script, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, " ");
    let decoded = decode_html_entities(&stripped).into_owned();

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn compute_has_children(lines: &[DetailLine]) -> Vec<bool> {
    let mut result = vec![false; lines.len()];
    for (index, line) in lines.iter().enumerate() {
        let current_indent = line.indent;
        let mut walker = index + 1;
        while walker < lines.len() {
            let next_indent = lines[walker].indent;
            if next_indent <= current_indent {
                break;
            }
            if next_indent == current_indent + 1 {
                result[index] = true;
                break;
            }
            walker += 1;
        }
    }
    result
}
