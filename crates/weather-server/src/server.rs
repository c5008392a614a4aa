use anyhow::Result;
use breeze::models::tool::Tool;
use breeze::systems::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, INTERNAL_ERROR, INVALID_PARAMS,
    METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_LIST_TOOLS, METHOD_NOT_FOUND, PARSE_ERROR,
    PROTOCOL_VERSION,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::weather::WeatherClient;

pub const SERVER_NAME: &str = "WeatherServer";
pub const TOOL_NAME: &str = "query_weather";

/// A tool server answering one JSON-RPC message per line
pub struct WeatherServer {
    weather: WeatherClient,
}

impl WeatherServer {
    pub fn new(weather: WeatherClient) -> Self {
        Self { weather }
    }

    pub fn tools() -> Vec<Tool> {
        vec![Tool::new(
            TOOL_NAME,
            "Get today's weather for a city. Takes the city's name in English.",
            json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "City name in English, for example Paris"
                    }
                },
                "required": ["city"]
            }),
        )]
    }

    /// Serve until the reader reaches end of input
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("{} ready", SERVER_NAME);
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let mut encoded = serde_json::to_string(&response)?;
                encoded.push('\n');
                writer.write_all(encoded.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        info!("input closed, shutting down");
        Ok(())
    }

    /// Answer one line. Notifications get no response.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!(error = %e, "unparsable message");
                Some(JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!(method = %request.method, "notification");
            return None;
        };

        let result = match request.method.as_str() {
            METHOD_INITIALIZE => to_result(initialize_result()),
            METHOD_LIST_TOOLS => to_result(ListToolsResult {
                tools: Self::tools(),
                next_cursor: None,
            }),
            METHOD_CALL_TOOL => self.call_tool(request.params).await,
            "ping" => Ok(json!({})),
            other => Err(rpc_error(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error.code, error.message),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| rpc_error(INVALID_PARAMS, format!("Invalid params: {}", e)))?;
        if params.name != TOOL_NAME {
            return Err(rpc_error(
                METHOD_NOT_FOUND,
                format!("Unknown tool: {}", params.name),
            ));
        }
        let city = params
            .arguments
            .get("city")
            .and_then(Value::as_str)
            .ok_or_else(|| rpc_error(INVALID_PARAMS, "Missing required argument: city"))?;

        info!(city, "query_weather");
        let report = self.weather.query_weather(city).await;
        to_result(CallToolResult::text(report, false))
    }
}

fn initialize_result() -> InitializeResult {
    InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: json!({"tools": {}}),
        server_info: Implementation {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        instructions: None,
    }
}

fn rpc_error<S: Into<String>>(code: i64, message: S) -> JsonRpcError {
    JsonRpcError {
        code,
        message: message.into(),
        data: None,
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| rpc_error(INTERNAL_ERROR, e.to_string()))
}
