use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

use super::base::{Completion, FinishReason, Usage};
use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        if message.role == Role::Tool {
            for response in message.tool_responses() {
                messages_spec.push(json!({
                    "role": "tool",
                    "content": response.text(),
                    "tool_call_id": response.id,
                }));
            }
            continue;
        }

        let mut tool_calls = Vec::new();
        for content in &message.content {
            // A request that failed to parse was never executed, so it is not replayed
            if let MessageContent::ToolRequest(request) = content {
                if let Ok(tool_call) = &request.tool_call {
                    tool_calls.push(json!({
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": sanitize_function_name(&tool_call.name),
                            "arguments": tool_call.arguments.to_string(),
                        }
                    }));
                }
            }
        }

        let text = message.text();
        let mut converted = Map::new();
        converted.insert("role".to_string(), json!(message.role));
        if tool_calls.is_empty() {
            converted.insert("content".to_string(), json!(text));
        } else {
            let content = if text.is_empty() { Value::Null } else { json!(text) };
            converted.insert("content".to_string(), content);
            converted.insert("tool_calls".to_string(), json!(tool_calls));
        }
        messages_spec.push(Value::Object(converted));
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification.
///
/// Names are sent sanitized, so two tools that only differ in disallowed
/// characters are rejected as duplicates.
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        let name = sanitize_function_name(&tool.name);
        if !tool_names.insert(name.clone()) {
            return Err(anyhow!("Duplicate tool name: {} (sent as {})", tool.name, name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to a completion, keeping every proposed tool call.
/// Sanitized names are mapped back to the matching tool in `tools`.
pub fn openai_response_to_completion(response: &Value, tools: &[Tool]) -> Result<Completion> {
    let choice = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| anyhow!("No choices in completion response: {}", response))?;
    let original = choice
        .get("message")
        .ok_or_else(|| anyhow!("No message in completion choice: {}", choice))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|text| text.as_str()) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|calls| calls.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            let parsed = if !is_valid_function_name(&function_name) {
                Err(AgentError::InvalidToolName(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    function_name
                )))
            } else {
                let name = original_tool_name(&function_name, tools);
                serde_json::from_str::<Value>(arguments)
                    .map(|params| ToolCall::new(name, params))
                    .map_err(|e| {
                        AgentError::MalformedToolArguments(format!(
                            "Could not interpret tool use parameters for id {}: {}",
                            id, e
                        ))
                    })
            };
            message = message.with_tool_request(id, parsed);
        }
    }

    Ok(Completion {
        message,
        finish_reason: FinishReason::from_wire(
            choice.get("finish_reason").and_then(|reason| reason.as_str()),
        ),
    })
}

pub fn get_openai_usage(data: &Value) -> Usage {
    let Some(usage) = data.get("usage") else {
        return Usage::default();
    };

    let count = |key: &str| usage.get(key).and_then(|v| v.as_i64()).map(|v| v as i32);
    let input_tokens = count("prompt_tokens");
    let output_tokens = count("completion_tokens");
    let total_tokens = count("total_tokens").or_else(|| match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

fn function_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("function name pattern compiles"))
}

fn sanitize_function_name(name: &str) -> String {
    function_name_pattern().replace_all(name, "_").to_string()
}

fn original_tool_name<'a>(sent: &'a str, tools: &'a [Tool]) -> &'a str {
    tools
        .iter()
        .find(|tool| sanitize_function_name(&tool.name) == sent)
        .map_or(sent, |tool| tool.name.as_str())
}

fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty() && !function_name_pattern().is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
