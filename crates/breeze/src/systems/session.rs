use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::{SystemError, SystemResult};
use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, METHOD_CALL_TOOL, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_LIST_TOOLS, PROTOCOL_VERSION,
};
use super::transport::Transport;
use super::System;
use crate::models::content::{joined_text, Content};
use crate::models::tool::{Tool, ToolCall};

const UNNAMED_SERVER: &str = "tool-server";

/// A Model Context Protocol client session over a single transport.
///
/// Requests are strictly sequential: the id counter lock is held from sending a
/// request until its response arrives, so at most one call is ever in flight.
pub struct ToolSession<T: Transport> {
    transport: T,
    next_id: Mutex<u64>,
    server: OnceLock<InitializeResult>,
}

impl<T: Transport> ToolSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: Mutex::new(0),
            server: OnceLock::new(),
        }
    }

    /// Perform the protocol handshake. Must succeed before any other request.
    pub async fn initialize(&self) -> SystemResult<&InitializeResult> {
        if let Some(server) = self.server.get() {
            return Ok(server);
        }

        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let result: InitializeResult = self
            .request(METHOD_INITIALIZE, Some(serde_json::to_value(params)?))
            .await
            .map_err(|e| SystemError::HandshakeFailed(e.to_string()))?;

        self.transport
            .send(serde_json::to_value(JsonRpcRequest::notification(
                METHOD_INITIALIZED,
                None,
            ))?)
            .await
            .map_err(|e| SystemError::HandshakeFailed(e.to_string()))?;

        info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "tool server initialized"
        );
        Ok(self.server.get_or_init(|| result))
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server.get().map(|server| &server.server_info)
    }

    /// The server's current tool catalog, following pagination cursors to the end
    pub async fn list_tools(&self) -> SystemResult<Vec<Tool>> {
        self.ensure_initialized()?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|cursor| json!({ "cursor": cursor }));
            let page: ListToolsResult = self.request(METHOD_LIST_TOOLS, params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    /// Invoke one tool and wait for its single response
    pub async fn call_tool(&self, name: &str, arguments: Value) -> SystemResult<Vec<Content>> {
        self.ensure_initialized()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self
            .request(METHOD_CALL_TOOL, Some(serde_json::to_value(params)?))
            .await?;

        let contents = result.text_contents();
        if result.is_error {
            return Err(SystemError::ToolFailed(joined_text(&contents)));
        }
        Ok(contents)
    }

    /// Close the underlying channel
    pub async fn close(&self) -> SystemResult<()> {
        self.transport.close().await
    }

    fn ensure_initialized(&self) -> SystemResult<()> {
        match self.server.get() {
            Some(_) => Ok(()),
            None => Err(SystemError::NotInitialized),
        }
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> SystemResult<R> {
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let id = *next_id;

        debug!(id, method, "sending request");
        let request = JsonRpcRequest::new(id, method, params);
        self.transport.send(serde_json::to_value(request)?).await?;

        loop {
            let message = self.transport.receive().await?;
            if message.get("method").is_some() {
                // server notifications and server-initiated requests are not acted on
                debug!(message = %message, "skipping server message");
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(message)
                .map_err(|e| SystemError::MalformedMessage(e.to_string()))?;
            if response.id != json!(id) {
                debug!(expected = id, received = %response.id, "skipping stale response");
                continue;
            }
            if let Some(error) = response.error {
                return Err(SystemError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            let result = response.result.ok_or_else(|| {
                SystemError::MalformedMessage(format!("response {} has no result", id))
            })?;
            return serde_json::from_value(result)
                .map_err(|e| SystemError::MalformedMessage(format!("{}: {}", method, e)));
        }
    }
}

#[async_trait]
impl<T: Transport> System for ToolSession<T> {
    fn name(&self) -> &str {
        self.server_info()
            .map(|info| info.name.as_str())
            .unwrap_or(UNNAMED_SERVER)
    }

    async fn tools(&self) -> SystemResult<Vec<Tool>> {
        self.list_tools().await
    }

    async fn call(&self, tool_call: ToolCall) -> SystemResult<Vec<Content>> {
        self.call_tool(&tool_call.name, tool_call.arguments).await
    }

    async fn shutdown(&self) -> SystemResult<()> {
        self.close().await
    }
}
