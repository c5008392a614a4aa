use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that end a single turn of the agent. The session survives them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Malformed tool arguments: {0}")]
    MalformedToolArguments(String),

    #[error("Invalid tool name: {0}")]
    InvalidToolName(String),

    #[error("The model requested a tool call but did not include one")]
    MissingToolCall,

    #[error("Could not list tools: {0}")]
    ToolCatalog(String),

    #[error("Completion request failed: {0}")]
    Provider(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
