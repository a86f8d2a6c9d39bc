//! Notification email rendering.

use pulldown_cmark::{Event, Options, Parser};
use serde::{Deserialize, Serialize};

use super::NotificationEvent;

const SUBJECT_PREFIX: &str = "💬 New chat message: ";
const SUBJECT_CHARS: usize = 30;
const PREVIEW_CHARS: usize = 50;

/// Settings shared by every rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    /// Link target for the "open chat" button.
    pub chat_url: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            chat_url: "http://127.0.0.1:3000/dashboard/chat".to_owned(),
        }
    }
}

/// A rendered notification ready to hand to a mail service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatNotification {
    pub subject: String,
    /// Inbox preview line.
    pub preview: String,
    pub html: String,
    /// Plain-text alternative body.
    pub text: String,
}

impl ChatNotification {
    /// Render the notification for one completed exchange.
    pub fn render(event: &NotificationEvent, settings: &TemplateSettings) -> Self {
        let user_text = event.user_message.content.as_str();
        let reply = event.assistant_message.content.as_str();

        let subject = format!("{SUBJECT_PREFIX}{}", truncate_chars(user_text, SUBJECT_CHARS));
        let preview = format!("New chat message: {}", truncate_chars(user_text, PREVIEW_CHARS));

        let mut html = String::with_capacity(1024 + user_text.len() + reply.len());
        html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>");
        html.push_str(&html_escape(&subject));
        html.push_str("</title></head><body style=\"font-family:sans-serif;background:#f6f9fc;\">");
        html.push_str("<div style=\"display:none;max-height:0;overflow:hidden;\">");
        html.push_str(&html_escape(&preview));
        html.push_str("</div><div style=\"max-width:600px;margin:0 auto;padding:20px;background:#fff;\">");
        html.push_str("<h1 style=\"font-size:24px;\">New Chat Message</h1>");
        html.push_str(&format!(
            "<p>Hi {},</p><p>You sent a new message in your chat:</p>",
            html_escape(&event.recipient.name)
        ));
        html.push_str(
            "<div style=\"background:#f0f4f8;border-left:4px solid #5469d4;padding:12px;\"><p style=\"white-space:pre-wrap;\">",
        );
        html.push_str(&html_escape(user_text));
        html.push_str("</p></div>");
        if !reply.is_empty() {
            html.push_str("<h2 style=\"font-size:18px;\">AI Response:</h2>");
            html.push_str("<div style=\"background:#f9fafb;padding:12px;\">");
            html.push_str(&render_markdown_html(reply));
            html.push_str("</div>");
        }
        html.push_str(&format!(
            "<p><a href=\"{}\" style=\"background:#5469d4;color:#fff;padding:10px 18px;border-radius:4px;text-decoration:none;\">View Chat</a></p>",
            html_escape(&settings.chat_url)
        ));
        html.push_str(&format!(
            "<p style=\"color:#8898aa;font-size:12px;\">Sent {}</p></div></body></html>",
            event.completed_at.format("%Y-%m-%d %H:%M UTC")
        ));

        let mut text = format!(
            "Hi {},\n\nYou sent a new message in your chat:\n\n{}\n",
            event.recipient.name, user_text
        );
        if !reply.is_empty() {
            text.push_str("\nAI Response:\n\n");
            text.push_str(reply);
            text.push('\n');
        }
        text.push_str(&format!("\nView chat: {}\n", settings.chat_url));

        Self {
            subject,
            preview,
            html,
            text,
        }
    }
}

/// First `max` characters of `s`, with `...` appended when anything was cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

/// Render model output as HTML. Raw HTML in the source is escaped, not passed through.
pub fn render_markdown_html(content: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(content, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::new();
    pulldown_cmark::html::push_html(&mut out, parser);
    out
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
