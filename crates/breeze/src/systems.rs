use async_trait::async_trait;

use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{SystemError, SystemResult};
pub use session::ToolSession;
pub use transport::{
    connect, Launch, Launchers, ServerCommand, StdioTransport, Transport, NO_SUFFIX,
};

/// Core trait that defines a system that can be operated by an AI agent
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get the tools currently available. Order carries no meaning.
    async fn tools(&self) -> SystemResult<Vec<Tool>>;

    /// Call a tool, waiting for its single result
    async fn call(&self, tool_call: ToolCall) -> SystemResult<Vec<Content>>;

    /// Release whatever the system holds open
    async fn shutdown(&self) -> SystemResult<()> {
        Ok(())
    }
}
