use tracing::{debug, info, warn};

use crate::conversation::Conversation;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::{Completion, Provider};
use crate::systems::{System, SystemResult};

/// Agent integrates a foundational LLM with the tool system it pilots.
///
/// A turn asks the model once with the tool catalog attached. When the model
/// asks for a tool, exactly one call is made, its result is appended, and the
/// model is asked again without tools for the final answer.
pub struct Agent {
    system: Box<dyn System>,
    provider: Box<dyn Provider>,
}

impl Agent {
    pub fn new(provider: Box<dyn Provider>, system: Box<dyn System>) -> Self {
        Self { system, provider }
    }

    /// Release the tool system
    pub async fn shutdown(&self) -> SystemResult<()> {
        self.system.shutdown().await
    }

    /// Answer one user query, appending the whole exchange to `conversation`.
    ///
    /// On error the entries appended so far stay in place. A failed tool call
    /// does not end the turn: its error is appended as the tool result, so every
    /// tool call entry is always followed by its result entry.
    pub async fn reply(&self, conversation: &mut Conversation, query: &str) -> AgentResult<String> {
        conversation.push(Message::user().with_text(query));

        let tools = self
            .system
            .tools()
            .await
            .map_err(|e| AgentError::ToolCatalog(e.to_string()))?;

        let completion = self.complete(conversation, &tools).await?;
        if !completion.finish_reason.is_tool_calls() {
            return Ok(finish(conversation, completion.message));
        }

        let (id, tool_call) = first_tool_call(&completion.message)?;
        let text = completion.message.text();
        let mut request = Message::assistant();
        if !text.is_empty() {
            request = request.with_text(text);
        }
        conversation.push(request.with_tool_request(id.clone(), Ok(tool_call.clone())));

        let result = self.dispatch_tool_call(tool_call).await;
        conversation.push(Message::tool().with_tool_response(id, result));

        let completion = self.complete(conversation, &[]).await?;
        if completion.finish_reason.is_tool_calls() {
            warn!("model asked for another tool after its tool result; answering with its text");
        }
        Ok(finish(conversation, completion.message))
    }

    async fn complete(&self, conversation: &Conversation, tools: &[Tool]) -> AgentResult<Completion> {
        let (completion, usage) = self
            .provider
            .complete(conversation.messages(), tools)
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;
        debug!(?usage, tools = tools.len(), "completion usage");
        Ok(completion)
    }

    /// Dispatch a single tool call to the system
    async fn dispatch_tool_call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        info!(tool = %tool_call.name, arguments = %tool_call.arguments, "calling tool");
        self.system.call(tool_call).await.map_err(|e| {
            warn!(error = %e, "tool call failed");
            AgentError::ExecutionError(e.to_string())
        })
    }
}

/// Pick the first tool call the model proposed. Any others are dropped.
fn first_tool_call(message: &Message) -> AgentResult<(String, ToolCall)> {
    let requests = message.tool_requests();
    let (first, dropped) = requests.split_first().ok_or(AgentError::MissingToolCall)?;

    if !dropped.is_empty() {
        let names: Vec<&str> = dropped
            .iter()
            .map(|request| match &request.tool_call {
                Ok(call) => call.name.as_str(),
                Err(_) => "<invalid>",
            })
            .collect();
        warn!(
            executed = %first.id,
            dropped = ?names,
            "model proposed several tool calls; only the first is executed"
        );
    }

    let tool_call = first.tool_call.clone()?;
    Ok((first.id.clone(), tool_call))
}

/// Append the final assistant answer and hand its text back
fn finish(conversation: &mut Conversation, message: Message) -> String {
    let answer = message.text();
    conversation.push(Message::assistant().with_text(answer.clone()));
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageContent;
    use crate::models::role::Role;
    use crate::providers::mock::MockProvider;
    use crate::systems::SystemError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const PARIS_REPORT: &str = "Paris, FR\nTemperature: 18.5°C\nHumidity: 62%\nWind speed: 4.1 m/s\nConditions: light rain\n";

    // Mock system for testing
    #[derive(Clone)]
    struct MockSystem {
        tools: Vec<Tool>,
        calls: Arc<Mutex<Vec<ToolCall>>>,
        catalog_requests: Arc<Mutex<usize>>,
        fail_with: Option<String>,
    }

    impl MockSystem {
        fn new() -> Self {
            Self {
                tools: vec![Tool::new(
                    "query_weather",
                    "Today's weather for a city",
                    json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]}),
                )],
                calls: Arc::default(),
                catalog_requests: Arc::default(),
                fail_with: None,
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<ToolCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl System for MockSystem {
        fn name(&self) -> &str {
            "mock"
        }

        async fn tools(&self) -> SystemResult<Vec<Tool>> {
            *self.catalog_requests.lock().unwrap() += 1;
            Ok(self.tools.clone())
        }

        async fn call(&self, tool_call: ToolCall) -> SystemResult<Vec<Content>> {
            self.calls.lock().unwrap().push(tool_call.clone());
            if let Some(message) = &self.fail_with {
                return Err(SystemError::ToolFailed(message.clone()));
            }
            match tool_call.name.as_str() {
                "query_weather" => Ok(vec![Content::text(PARIS_REPORT)]),
                _ => Err(SystemError::Rpc {
                    code: -32602,
                    message: format!("Unknown tool: {}", tool_call.name),
                }),
            }
        }
    }

    fn weather_request(id: &str, city: &str) -> Message {
        Message::assistant().with_tool_request(id, Ok(ToolCall::new("query_weather", json!({"city": city}))))
    }

    fn agent(provider: &MockProvider, system: &MockSystem) -> Agent {
        Agent::new(Box::new(provider.clone()), Box::new(system.clone()))
    }

    #[tokio::test]
    async fn test_direct_answer_appends_two_entries() {
        let provider = MockProvider::new(vec![MockProvider::answer("Rust is a programming language.")]);
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        let answer = agent
            .reply(&mut conversation, "What is Rust?")
            .await
            .unwrap();

        assert_eq!(answer, "Rust is a programming language.");
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.messages()[1].role, Role::User);
        assert_eq!(conversation.messages()[1].text(), "What is Rust?");
        assert_eq!(conversation.messages()[2].role, Role::Assistant);
        assert_eq!(conversation.messages()[2].text(), answer);

        assert!(system.calls().is_empty());
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools, system.tools);
        assert_eq!(requests[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_call_appends_four_entries() {
        let provider = MockProvider::new(vec![
            MockProvider::tool_calls(weather_request("call_1", "Paris")),
            MockProvider::answer("Paris: 18.5°C, humidity 62%, wind 4.1 m/s, light rain."),
        ]);
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        let answer = agent
            .reply(&mut conversation, "weather in Paris")
            .await
            .unwrap();

        let roles: Vec<Role> = conversation.since(1).iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(conversation.last().unwrap().text(), answer);

        assert_eq!(
            system.calls(),
            vec![ToolCall::new("query_weather", json!({"city": "Paris"}))]
        );

        let tool_request = conversation.messages()[2].tool_requests()[0].clone();
        let tool_response = conversation.messages()[3].tool_responses()[0].clone();
        assert_eq!(tool_request.id, "call_1");
        assert_eq!(tool_response.id, "call_1");
        assert_eq!(tool_response.text(), PARIS_REPORT);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].tools.is_empty());
        assert!(requests[1].tools.is_empty(), "no tools offered on the second request");
        let second = &requests[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[2], conversation.messages()[2]);
        assert_eq!(second[3], conversation.messages()[3]);
        for field in ["Paris", "18.5°C", "62%", "4.1 m/s", "light rain"] {
            assert!(second[3].tool_responses()[0].text().contains(field));
        }
    }

    #[tokio::test]
    async fn test_only_first_tool_call_is_executed() {
        let provider = MockProvider::new(vec![
            MockProvider::tool_calls(
                weather_request("call_1", "Paris").with_tool_request(
                    "call_2",
                    Ok(ToolCall::new("query_weather", json!({"city": "Oslo"}))),
                ),
            ),
            MockProvider::answer("Paris is rainy."),
        ]);
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        agent.reply(&mut conversation, "Paris and Oslo?").await.unwrap();

        assert_eq!(system.calls().len(), 1);
        assert_eq!(system.calls()[0].arguments, json!({"city": "Paris"}));
        assert_eq!(conversation.len(), 5);
        let recorded = conversation.messages()[2].tool_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id, "call_1");
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_the_turn() {
        let provider = MockProvider::new(vec![MockProvider::tool_calls(
            Message::assistant().with_tool_request(
                "call_1",
                Err(AgentError::MalformedToolArguments("expected value".into())),
            ),
        )]);
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        let err = agent
            .reply(&mut conversation, "weather in Paris")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::MalformedToolArguments(_)));
        assert!(system.calls().is_empty());
        assert_eq!(conversation.len(), 2, "only the user entry was appended");
    }

    #[tokio::test]
    async fn test_tool_failure_is_recorded_as_its_result() {
        let provider = MockProvider::new(vec![
            MockProvider::tool_calls(weather_request("call_1", "Paris")),
            MockProvider::answer("The weather service is unavailable right now."),
        ]);
        let system = MockSystem::failing("HTTP error: 503");
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        let answer = agent
            .reply(&mut conversation, "weather in Paris")
            .await
            .unwrap();

        assert_eq!(answer, "The weather service is unavailable right now.");
        assert_eq!(conversation.len(), 5);
        let response = &conversation.messages()[3].content[0];
        match response {
            MessageContent::ToolResponse(response) => {
                assert_eq!(response.id, "call_1");
                assert!(matches!(response.tool_result, Err(AgentError::ExecutionError(_))));
                assert!(response.text().contains("HTTP error: 503"));
            }
            other => panic!("expected a tool response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completion_failure_keeps_user_entry() {
        let provider = MockProvider::default().then_fail("Server error: 503");
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        let err = agent.reply(&mut conversation, "hello").await.unwrap_err();

        assert_eq!(err, AgentError::Provider("Server error: 503".into()));
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn test_second_completion_failure_keeps_pairing() {
        let provider = MockProvider::new(vec![MockProvider::tool_calls(weather_request(
            "call_1", "Paris",
        ))])
        .then_fail("Server error: 502");
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        let err = agent
            .reply(&mut conversation, "weather in Paris")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Provider(_)));
        let roles: Vec<Role> = conversation.since(1).iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
    }

    #[tokio::test]
    async fn test_tool_calls_reason_without_calls() {
        let provider = MockProvider::new(vec![MockProvider::tool_calls(
            Message::assistant().with_text("let me check"),
        )]);
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        let err = agent.reply(&mut conversation, "hi").await.unwrap_err();
        assert_eq!(err, AgentError::MissingToolCall);
    }

    #[tokio::test]
    async fn test_catalog_is_fetched_every_turn() {
        let provider = MockProvider::new(vec![
            MockProvider::answer("one"),
            MockProvider::answer("two"),
        ]);
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        agent.reply(&mut conversation, "first").await.unwrap();
        agent.reply(&mut conversation, "second").await.unwrap();

        assert_eq!(*system.catalog_requests.lock().unwrap(), 2);
        assert_eq!(conversation.len(), 5);
        assert_eq!(provider.requests()[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_null_content_answer_is_empty_text() {
        let provider = MockProvider::new(vec![Completion {
            message: Message::assistant(),
            finish_reason: crate::providers::base::FinishReason::Other("stop".into()),
        }]);
        let system = MockSystem::new();
        let agent = agent(&provider, &system);
        let mut conversation = Conversation::new("system prompt");

        let answer = agent.reply(&mut conversation, "hi").await.unwrap();
        assert_eq!(answer, "");
        assert_eq!(conversation.last().unwrap().role, Role::Assistant);
    }
}
