//! Conversation export.
//!
//! Renders a stored conversation as a Markdown report or a JSON document.

use serde_json::json;

use crate::message::{ConversationId, Role};
use crate::store::{ConversationStore, ConversationSummary, StoredMessage};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
}

/// Render conversation `id` from `store` in `format`.
///
/// # Errors
///
/// Returns error if the conversation does not exist or cannot be read
pub fn export(store: &ConversationStore, id: ConversationId, format: ExportFormat) -> Result<String> {
    let summary = store
        .conversation(id)?
        .ok_or_else(|| Error::Storage(format!("conversation {id} not found")))?;
    let messages = store.messages(id)?;

    match format {
        ExportFormat::Markdown => Ok(markdown(&summary, &messages)),
        ExportFormat::Json => json_document(&summary, &messages),
    }
}

fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        let minutes = (seconds / 60.0) as u64;
        let secs = seconds % 60.0;
        if minutes < 60 {
            format!("{minutes}m {secs:.0}s")
        } else {
            let hours = minutes / 60;
            let mins = minutes % 60;
            format!("{hours}h {mins}m")
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ").replace('|', "\\|");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let kept: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn role_heading(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

/// Markdown report: summary, message log table, then the full transcript.
#[must_use]
pub fn markdown(summary: &ConversationSummary, messages: &[StoredMessage]) -> String {
    let title = format!("# {} (#{})", summary.title, summary.id);
    let started = summary.created_at.format("%Y-%m-%d %H:%M").to_string();

    if messages.is_empty() {
        return format!("{title}\n\nStarted {started}. No messages recorded.");
    }

    let count = |role: Role| messages.iter().filter(|m| m.role == role).count();
    let total_chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    let total_words: usize = messages
        .iter()
        .map(|m| m.content.split_whitespace().count())
        .sum();
    let span = match (messages.first(), messages.last()) {
        (Some(first), Some(last)) => (last.created_at - first.created_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0,
        _ => 0.0,
    };

    let mut lines = vec![
        title,
        String::new(),
        "## Summary".to_string(),
        format!("- **Started**: {started}"),
        format!("- **Messages**: {}", messages.len()),
        format!("- **User messages**: {}", count(Role::User)),
        format!("- **Assistant messages**: {}", count(Role::Assistant)),
        format!("- **Total characters**: {total_chars}"),
        format!("- **Total words**: {total_words}"),
        format!("- **Duration**: {}", format_duration(span)),
        String::new(),
        "## Message Log".to_string(),
        String::new(),
        "| Time | Role | Chars | Preview |".to_string(),
        "|------|------|-------|---------|".to_string(),
    ];

    for m in messages {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            m.created_at.format("%H:%M:%S"),
            m.role,
            m.content.chars().count(),
            truncate(&m.content, 40)
        ));
    }

    lines.extend([String::new(), "## Transcript".to_string()]);
    for m in messages {
        lines.push(String::new());
        lines.push(format!("### {}", role_heading(m.role)));
        lines.push(String::new());
        lines.push(m.content.clone());
    }

    lines.join("\n")
}

fn json_document(summary: &ConversationSummary, messages: &[StoredMessage]) -> Result<String> {
    let doc = json!({
        "id": summary.id,
        "title": summary.title,
        "created_at": summary.created_at.to_rfc3339(),
        "message_count": summary.message_count,
        "messages": messages
            .iter()
            .map(|m| json!({
                "role": m.role,
                "content": m.content,
                "created_at": m.created_at.to_rfc3339(),
            }))
            .collect::<Vec<_>>(),
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}
