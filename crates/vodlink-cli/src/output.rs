//! Output formatting for CLI

use console::style;
use serde_json::{json, Value};
use vodlink_core::{Event, Reply, SessionId};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Format the reply to one method call
pub fn format_reply(method: &str, reply: &Reply, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!({ "method": method, "reply": reply }).to_string(),
        OutputFormat::Text => match reply {
            Reply::Success { result } if result.is_null() => {
                format!("{} {}", style("ok").green(), method)
            }
            Reply::Success { result } => format!("{} {} {}", style("ok").green(), method, result),
            Reply::Error { code, message } => {
                format!("{} {} {}: {}", style("error").red(), method, code, message)
            }
            Reply::NotImplemented => format!("{} {}", style("not implemented").yellow(), method),
        },
    }
}

/// Format one session event
pub fn format_event(id: SessionId, event: &Event, format: OutputFormat) -> String {
    let mut value = serde_json::to_value(event).unwrap_or_default();
    match format {
        OutputFormat::Json => {
            if let Some(fields) = value.as_object_mut() {
                fields.insert("sessionId".to_string(), json!(id));
            }
            value.to_string()
        }
        OutputFormat::Text => {
            if let Some(fields) = value.as_object_mut() {
                fields.remove("event");
            }
            let label = style(format!("[session {id}]")).dim();
            match value {
                Value::Object(fields) if !fields.is_empty() => {
                    format!("{label} {} {}", event.kind(), Value::Object(fields))
                }
                _ => format!("{label} {}", event.kind()),
            }
        }
    }
}
