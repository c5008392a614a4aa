use crate::models::message::Message;

/// The ordered log of a chat, consumed in full by every completion request.
///
/// A conversation always opens with the system message it was created with.
/// Entries can only be appended; nothing is edited or removed once pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new<S: Into<String>>(system_prompt: S) -> Self {
        Self {
            messages: vec![Message::system().with_text(system_prompt)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Entries appended since the conversation held `len` entries
    pub fn since(&self, len: usize) -> &[Message] {
        &self.messages[len.min(self.messages.len())..]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
