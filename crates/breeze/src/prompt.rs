use anyhow::{Context, Result};
use indoc::indoc;
use std::fs;
use std::path::Path;

/// The behavioral contract a conversation opens with unless one is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = indoc! {"
    You answer the user's questions, calling a tool when one of the available tools applies.
    - When a tool returns data, reply in natural language using only the facts it returned,
      such as temperature, humidity, wind and conditions for a weather report.
    - Do not add unrelated content, and do not ask the user about other needs.
    - When the question has nothing to do with the available tools, answer it directly
      without calling a tool.
"};

/// Read a system prompt from a file, trimming surrounding whitespace
pub fn load_system_prompt_file(path: &Path) -> Result<String> {
    let prompt = fs::read_to_string(path)
        .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
    let prompt = prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("System prompt file {} is empty", path.display());
    }
    Ok(prompt.to_string())
}
