use std::collections::HashMap;

use soul_chat::{ChatApp, ConnectionState, MessageId, Role};

/// Turns successive [`ChatApp`] snapshots into append-only terminal text.
///
/// Streamed content is written as it grows. A reply whose content no longer extends what was
/// already printed is reprinted on a fresh line.
#[derive(Debug, Default)]
pub struct Renderer {
    state: Option<ConnectionState>,
    error: Option<String>,
    printed: HashMap<MessageId, String>,
    open_line: Option<MessageId>,
}

impl Renderer {
    pub fn diff(&mut self, app: &ChatApp) -> String {
        let mut out = String::new();

        if self.state.as_ref() != Some(app.state()) {
            self.close_line(&mut out);
            out.push_str(&status_line(app.state()));
            out.push('\n');
            self.state = Some(app.state().clone());
        }

        for message in app.messages() {
            if message.role == Role::User {
                self.printed
                    .entry(message.id)
                    .or_insert_with(|| message.content.clone());
                continue;
            }

            let printed = self.printed.get(&message.id).cloned();
            match printed.as_deref() {
                Some(printed) if printed == message.content => continue,
                Some(printed)
                    if self.open_line == Some(message.id)
                        && message.content.starts_with(printed) =>
                {
                    out.push_str(&message.content[printed.len()..]);
                }
                _ => {
                    self.close_line(&mut out);
                    out.push_str("soul> ");
                    out.push_str(&message.content);
                    self.open_line = Some(message.id);
                }
            }
            self.printed.insert(message.id, message.content.clone());
        }

        if self.error.as_deref() != app.error() {
            if let Some(error) = app.error() {
                self.close_line(&mut out);
                out.push_str(&format!("[error] {error} (/dismiss to clear)\n"));
            }
            self.error = app.error().map(str::to_string);
        }

        out
    }

    fn close_line(&mut self, out: &mut String) {
        if self.open_line.take().is_some() {
            out.push('\n');
        }
    }
}

pub fn status_line(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Error { message } => format!("[status] error: {message}"),
        other => format!("[status] {}", other.label()),
    }
}
