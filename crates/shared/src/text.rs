//! Display-safe text helpers shared by every front end.

use chrono::{DateTime, Utc};

/// Escapes text for embedding in HTML so message content can never execute
/// as markup. For HTML-rendering front ends; the terminal client prints
/// message text verbatim and does not need it.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Short clock label for a message timestamp, e.g. `16:16`.
pub fn clock_label(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%H:%M").to_string()
}
