use anyhow::Result;
use breeze::models::message::Message;
use breeze::models::tool::Tool;

pub mod rustyline;

/// Typing this (any case) ends the session
pub const QUIT_COMMAND: &str = "quit";

pub trait Prompt {
    fn render(&mut self, message: Box<Message>);
    fn render_error(&mut self, error: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn close(&self);
    fn breeze_ready(&self, server: &str, tools: &[Tool]) {
        let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
        println!("\nConnected to {} with tools: {}", server, names.join(", "));
        println!("Type your queries or '{}' to exit.\n", QUIT_COMMAND);
    }
}

#[derive(Debug, PartialEq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for messages
}

#[derive(Debug, PartialEq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // User wants to exit the session
}

impl Input {
    /// Classify one line the user typed
    pub fn from_line(line: &str) -> Self {
        let text = line.trim();
        if text.is_empty() {
            Input {
                input_type: InputType::AskAgain,
                content: None,
            }
        } else if text.eq_ignore_ascii_case(QUIT_COMMAND) {
            Input::exit()
        } else {
            Input {
                input_type: InputType::Message,
                content: Some(text.to_string()),
            }
        }
    }

    pub fn exit() -> Self {
        Input {
            input_type: InputType::Exit,
            content: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_any_case() {
        assert_eq!(Input::from_line("quit").input_type, InputType::Exit);
        assert_eq!(Input::from_line("  QUIT \n").input_type, InputType::Exit);
        assert_eq!(Input::from_line("Quit").input_type, InputType::Exit);
    }

    #[test]
    fn test_blank_line_asks_again() {
        assert_eq!(Input::from_line("").input_type, InputType::AskAgain);
        assert_eq!(Input::from_line("   \t").input_type, InputType::AskAgain);
    }

    #[test]
    fn test_message_is_trimmed() {
        let input = Input::from_line("  weather in Paris  ");
        assert_eq!(input.input_type, InputType::Message);
        assert_eq!(input.content.as_deref(), Some("weather in Paris"));

        // only the exact command quits
        let input = Input::from_line("quit please");
        assert_eq!(input.input_type, InputType::Message);
    }
}
