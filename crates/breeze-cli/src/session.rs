use anyhow::Result;
use breeze::agent::Agent;
use breeze::conversation::Conversation;
use breeze::models::message::{Message, MessageContent};
use breeze::models::role::Role;
use tracing::warn;

use crate::prompt::{InputType, Prompt};

/// The read-eval-print loop around one agent and one conversation
pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
    conversation: Conversation,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<dyn Prompt + 'a>, system_prompt: &str) -> Self {
        Session {
            agent,
            prompt,
            conversation: Conversation::new(system_prompt),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(query) = input.content {
                        self.process_query(&query).await;
                    }
                }
                InputType::Exit => break,
                InputType::AskAgain => continue,
            }
        }
        self.prompt.close();
        Ok(())
    }

    /// One turn. Failures are rendered and never end the loop.
    async fn process_query(&mut self, query: &str) {
        let before = self.conversation.len();

        self.prompt.show_busy();
        let result = self.agent.reply(&mut self.conversation, query).await;
        self.prompt.hide_busy();

        for message in self.conversation.since(before) {
            if let Some(calls) = tool_calls_only(message) {
                self.prompt.render(Box::new(calls));
            }
        }

        match result {
            Ok(answer) => self
                .prompt
                .render(Box::new(Message::assistant().with_text(answer))),
            Err(e) => self.prompt.render_error(&format!("Error: {}", e)),
        }
    }

    #[cfg(test)]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Release the tool server behind the agent
    pub async fn shutdown(&self) {
        if let Err(e) = self.agent.shutdown().await {
            warn!(error = %e, "failed to close the tool server cleanly");
        }
    }
}

/// The tool calls an assistant entry carries, without its text
fn tool_calls_only(message: &Message) -> Option<Message> {
    if message.role != Role::Assistant || message.tool_requests().is_empty() {
        return None;
    }
    let calls = message
        .content
        .iter()
        .filter(|content| matches!(content, MessageContent::ToolRequest(_)))
        .cloned()
        .fold(Message::assistant(), Message::with_content);
    Some(calls)
}
