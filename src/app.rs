//! Visible chat state: connection status, message list, input buffer and error banner.

pub type MessageId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Error { message: String },
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub is_streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatApp {
    state: ConnectionState,
    messages: Vec<Message>,
    input: String,
    error: Option<String>,
    next_message_id: MessageId,
}

impl Default for ChatApp {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatApp {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            messages: Vec::new(),
            input: String::new(),
            error: None,
            next_message_id: 1,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns true when the state actually changed.
    pub fn set_state(&mut self, state: ConnectionState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        true
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Clears the error banner. Returns false when nothing was shown.
    pub fn dismiss_error(&mut self) -> bool {
        self.error.take().is_some()
    }

    /// Enters `error` and shows the same message in the banner.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.error = Some(message.clone());
        self.state = ConnectionState::Error { message };
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> MessageId {
        self.push(Role::User, content.into(), false)
    }

    /// Appends an empty assistant message so "responding" shows before any content.
    pub fn push_assistant_placeholder(&mut self, is_streaming: bool) -> MessageId {
        self.push(Role::Assistant, String::new(), is_streaming)
    }

    fn push(&mut self, role: Role, content: String, is_streaming: bool) -> MessageId {
        let id = self.next_message_id;
        self.next_message_id += 1;
        self.messages.push(Message {
            id,
            role,
            content,
            is_streaming,
        });
        id
    }

    /// Replaces the message with `id` by `update(current)`, keeping its position.
    ///
    /// Role and id always survive the update. Returns false for unknown ids.
    pub fn update_message(
        &mut self,
        id: MessageId,
        update: impl FnOnce(&Message) -> Message,
    ) -> bool {
        let Some(index) = self.messages.iter().position(|message| message.id == id) else {
            return false;
        };

        let current = &self.messages[index];
        let mut next = update(current);
        next.id = current.id;
        next.role = current.role;
        self.messages[index] = next;
        true
    }

    /// Sets the full content of message `id`.
    pub fn replace_content(&mut self, id: MessageId, content: impl Into<String>) -> bool {
        let content = content.into();
        self.update_message(id, |message| Message {
            content,
            ..message.clone()
        })
    }
}
