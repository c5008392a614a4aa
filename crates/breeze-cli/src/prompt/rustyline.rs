use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use breeze::models::message::{Message, MessageContent, ToolRequest};
use breeze::models::tool::{Tool, ToolCall};
use cliclack::spinner;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;

use super::{Input, Prompt, QUIT_COMMAND};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30mQuery: \x1b[0m";
const MAX_STRING_LENGTH: usize = 40;
const INDENT: &str = "    ";
const THEME: &str = "zenburn";

pub struct RustylinePrompt {
    editor: DefaultEditor,
    spinner: cliclack::ProgressBar,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self> {
        Ok(RustylinePrompt {
            editor: DefaultEditor::new()?,
            spinner: spinner(),
        })
    }
}

fn print_tool_request(tool_request: &ToolRequest, theme: &str) {
    match &tool_request.tool_call {
        Ok(call) => {
            print_request_header(call);
            print_params(&call.arguments, 0);
            print_newline();
        }
        Err(e) => print_markdown(&e.to_string(), theme),
    }
}

fn print_request_header(call: &ToolCall) {
    let tool_header = format!(
        "─── {} | {} ──────────────────────────",
        style(&call.name),
        style("calling tool").magenta().dim(),
    );
    print_newline();
    println!("{}", tool_header);
}

fn print_markdown(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        // fall back to plain text when highlighting is unavailable
        println!("{}", content);
    }
}

/// Format and print parameters recursively with proper indentation and colors
fn print_params(value: &Value, depth: usize) {
    let indent = INDENT.repeat(depth);

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        println!("{}{}:", indent, style(key).dim());
                        print_params(val, depth + 1);
                    }
                    Value::String(s) if s.len() > MAX_STRING_LENGTH => {
                        println!("{}{}: {}", indent, style(key).dim(), style("...").dim());
                    }
                    Value::String(s) => {
                        println!("{}{}: {}", indent, style(key).dim(), style(s).green());
                    }
                    other => {
                        println!("{}{}: {}", indent, style(key).dim(), style(other).blue());
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("{}{}.", indent, i + 1);
                print_params(item, depth + 1);
            }
        }
        Value::String(s) => println!("{}{}", indent, style(s).green()),
        other => println!("{}{}", indent, style(other).yellow()),
    }
}

fn print_newline() {
    println!();
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, message: Box<Message>) {
        for message_content in &message.content {
            match message_content {
                MessageContent::Text(text) => print_markdown(&text.text, THEME),
                MessageContent::ToolRequest(tool_request) => print_tool_request(tool_request, THEME),
                // tool output reaches the user through the final answer
                MessageContent::ToolResponse(_) => {}
            }
        }

        print_newline();
        let _ = io::stdout().flush();
    }

    fn render_error(&mut self, error: &str) {
        eprintln!("{}", style(error).red());
        print_newline();
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("awaiting reply...");
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        match self.editor.readline(PROMPT) {
            Ok(line) => {
                let input = Input::from_line(&line);
                if input.content.is_some() {
                    let _ = self.editor.add_history_entry(line.trim());
                }
                Ok(input)
            }
            // Ctrl-C and Ctrl-D at the prompt end the session like the quit command
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(Input::exit()),
            Err(e) => {
                eprintln!("Input error: {}", e);
                Ok(Input::exit())
            }
        }
    }

    fn close(&self) {
        // No cleanup required
    }

    fn breeze_ready(&self, server: &str, tools: &[Tool]) {
        let names: Vec<String> = tools
            .iter()
            .map(|tool| style(&tool.name).cyan().to_string())
            .collect();
        println!(
            "\nConnected to {} with tools: {}",
            style(server).bold(),
            names.join(", ")
        );
        println!(
            "Type your queries or {} to exit.\n",
            style(QUIT_COMMAND).dim()
        );
    }
}
