use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::client::ChatClient;
use super::functions::{extract_function_calls, FunctionCall, FunctionCallResult, FunctionRegistry};
use super::intent::IntentResult;
use crate::error::AssistantError;
use crate::models::ChatMessage;

/// Stands in for the id returned by the immediately preceding call
pub const LAST_CREATED_ACTION_ID: &str = "LAST_CREATED_ACTION_ID";

/// Composite call split into `create_action_item` + `set_action_trigger`
pub const CREATE_ACTION_WITH_TRIGGER: &str = "create_action_with_trigger";

const ACKNOWLEDGE_PROMPT: &str = "You are Meenoe, a meeting assistant. Acknowledge the user's request in one short, friendly sentence. Do not perform the task or ask questions.";

const EXPLAIN_PROMPT: &str = "You are Meenoe, a meeting assistant that changes the meeting by calling functions. Briefly explain what you will do, then output ONE JSON object of the form {\"function_calls\": [{\"name\": \"...\", \"parameters\": {...}}]}. Only use the functions listed below. If no function applies, output {\"function_calls\": []}.";

/// Reply when the request maps to no function call and the model gave no prose
pub const NO_CHANGES_REPLY: &str = "I couldn't find anything to change for that request. Could you rephrase it?";

const SUMMARY_PROMPT: &str = "You are Meenoe, a meeting assistant. Summarize for the user, in two sentences at most, what was changed based on the function results. Mention failures plainly.";

/// Everything produced while handling one message
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub acknowledgement: String,
    pub explanation: String,
    pub calls: Vec<FunctionCall>,
    pub results: Vec<FunctionCallResult>,
    pub summary: String,
}

impl PipelineOutcome {
    /// Text shown to the user
    pub fn reply(&self) -> String {
        if self.results.is_empty() {
            return self.summary.trim().to_string();
        }
        format!("{}\n\n{}", self.acknowledgement.trim(), self.summary.trim())
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// Acknowledge, explain, execute, summarize
pub struct UnifiedFunctionCaller {
    client: Arc<dyn ChatClient>,
    registry: FunctionRegistry,
}

impl UnifiedFunctionCaller {
    pub fn new(client: Arc<dyn ChatClient>, registry: FunctionRegistry) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub async fn run(
        &self,
        message: &str,
        intent: &IntentResult,
        history: &[ChatMessage],
    ) -> Result<PipelineOutcome, AssistantError> {
        let acknowledgement = self
            .client
            .complete(&[ChatMessage::system(ACKNOWLEDGE_PROMPT), ChatMessage::user(message)])
            .await?;

        let mut explain_messages = vec![ChatMessage::system(self.explain_prompt(intent).await)];
        explain_messages.extend_from_slice(history);
        explain_messages.push(ChatMessage::user(message));
        let explanation_raw = self.client.complete(&explain_messages).await?;

        // Model-supplied calls win; otherwise infer from the user's text
        let calls = parse_function_calls(&explanation_raw)
            .filter(|calls| !calls.is_empty())
            .unwrap_or_else(|| extract_function_calls(&intent.intent, message));
        let calls = expand_dependent_calls(calls);
        let explanation = strip_json(&explanation_raw);

        if calls.is_empty() {
            tracing::info!("No function calls for intent {}", intent.intent);
            let summary = if explanation.is_empty() {
                NO_CHANGES_REPLY.to_string()
            } else {
                explanation.clone()
            };
            return Ok(PipelineOutcome {
                acknowledgement,
                summary,
                explanation,
                calls,
                results: Vec::new(),
            });
        }

        let results = self.execute_batch(&calls).await;

        let results_json = serde_json::to_string_pretty(&results)
            .map_err(|e| AssistantError::MalformedResponse(e.to_string()))?;
        let summary = self
            .client
            .complete(&[
                ChatMessage::system(SUMMARY_PROMPT),
                ChatMessage::user(format!("Request: {}\n\nFunction results:\n{}", message, results_json)),
            ])
            .await?;

        Ok(PipelineOutcome {
            acknowledgement,
            explanation,
            calls,
            results,
            summary,
        })
    }

    /// Run calls in order; a failing call is recorded and the batch continues
    pub async fn execute_batch(&self, calls: &[FunctionCall]) -> Vec<FunctionCallResult> {
        let mut results: Vec<FunctionCallResult> = Vec::with_capacity(calls.len());

        for call in calls {
            let call = substitute_placeholders(call, results.last());
            let outcome = self.registry.invoke(&call).await;
            let result = match outcome {
                Ok(value) => FunctionCallResult {
                    function: call.name,
                    parameters: call.parameters,
                    success: true,
                    result: Some(value),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("Function {} failed: {}", call.name, e);
                    FunctionCallResult {
                        function: call.name,
                        parameters: call.parameters,
                        success: false,
                        result: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }

        results
    }

    async fn explain_prompt(&self, intent: &IntentResult) -> String {
        let mut functions: Vec<String> = self
            .registry
            .descriptions()
            .await
            .into_iter()
            .map(|(name, description)| format!("- {}: {}", name, description))
            .collect();
        functions.push(format!(
            "- {}: Create an action item and set its trigger. Params: title, assignee?, due_date?, trigger",
            CREATE_ACTION_WITH_TRIGGER
        ));

        format!(
            "{}\n\nDetected intent: {}\n\nFunctions:\n{}",
            EXPLAIN_PROMPT,
            intent.intent,
            functions.join("\n")
        )
    }
}

/// Split composite calls into their dependent steps
pub fn expand_dependent_calls(calls: Vec<FunctionCall>) -> Vec<FunctionCall> {
    let mut expanded = Vec::with_capacity(calls.len());

    for call in calls {
        if call.name != CREATE_ACTION_WITH_TRIGGER {
            expanded.push(call);
            continue;
        }

        let mut create = FunctionCall::new("create_action_item");
        for key in ["title", "assignee", "due_date"] {
            if let Some(v) = call.parameters.get(key) {
                create.parameters.insert(key.to_string(), v.clone());
            }
        }
        expanded.push(create);

        if let Some(trigger) = call.parameters.get("trigger") {
            expanded.push(
                FunctionCall::new("set_action_trigger")
                    .with_param("action_id", LAST_CREATED_ACTION_ID)
                    .with_param("trigger", trigger.clone()),
            );
        }
    }

    expanded
}

/// Replace placeholder parameters with the id from the previous successful call
fn substitute_placeholders(call: &FunctionCall, previous: Option<&FunctionCallResult>) -> FunctionCall {
    let previous_id = previous
        .filter(|r| r.success)
        .and_then(|r| r.result.as_ref())
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str);

    let mut call = call.clone();
    for value in call.parameters.values_mut() {
        if value.as_str() == Some(LAST_CREATED_ACTION_ID) {
            if let Some(id) = previous_id {
                *value = Value::String(id.to_string());
            }
        }
    }
    call
}

/// Byte range of the JSON object in a model reply: a ```json fence, else first '{' to last '}'
fn json_span(text: &str) -> Option<(usize, usize)> {
    if let Some(fence) = text.find("```json") {
        let start = fence + "```json".len();
        if let Some(len) = text[start..].find("```") {
            return Some((start, start + len));
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start >= end {
        return None;
    }
    Some((start, end + 1))
}

/// Function calls from a `{"function_calls": [...]}` object, or a single `{name, parameters}`
pub fn parse_function_calls(text: &str) -> Option<Vec<FunctionCall>> {
    let (start, end) = json_span(text)?;
    let value: Value = serde_json::from_str(text[start..end].trim()).ok()?;

    if let Some(calls) = value.get("function_calls") {
        return serde_json::from_value(calls.clone()).ok();
    }
    if value.get("name").is_some() {
        return serde_json::from_value::<FunctionCall>(value).ok().map(|c| vec![c]);
    }
    None
}

/// Reply text with any JSON object or fence removed
fn strip_json(text: &str) -> String {
    let Some((start, end)) = json_span(text) else {
        return text.trim().to_string();
    };

    let mut head = &text[..start];
    let mut tail = &text[end..];
    if let Some(h) = head.strip_suffix("```json") {
        head = h;
    }
    if let Some(t) = tail.strip_prefix("```") {
        tail = t;
    }
    format!("{} {}", head.trim(), tail.trim()).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::{register_meeting_functions, MeetingState};
    use async_trait::async_trait;
    use futures::FutureExt;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with queued strings, then a fixed fallback
    struct ScriptedClient {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<usize>,
    }

    impl ScriptedClient {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                calls: Mutex::new(0),
            })
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, AssistantError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or_else(|| "ok".to_string()))
        }
    }

    fn intent(name: &str) -> IntentResult {
        IntentResult {
            intent: name.to_string(),
            confidence: 0.9,
            requires_function_call: true,
        }
    }

    async fn caller(client: Arc<ScriptedClient>) -> (UnifiedFunctionCaller, MeetingState) {
        let registry = FunctionRegistry::new();
        let state = MeetingState::new();
        register_meeting_functions(&registry, &state).await;
        (UnifiedFunctionCaller::new(client, registry), state)
    }

    #[tokio::test]
    async fn test_failing_call_does_not_abort_batch() {
        let (caller, state) = caller(ScriptedClient::new(&[])).await;
        caller
            .registry()
            .register_fn("explode", "Always fails", |_| {
                async { Err::<Value, _>(AssistantError::Chat("boom".into())) }.boxed()
            })
            .await;

        let results = caller
            .execute_batch(&[
                FunctionCall::new("explode"),
                FunctionCall::new("create_agenda_point").with_param("title", "Budget Review"),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("boom"));
        assert!(results[1].success);
        assert_eq!(state.agenda_points().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_uses_model_function_calls() {
        let client = ScriptedClient::new(&[
            "Sure, adding that now.",
            "I'll add the point.\n```json\n{\"function_calls\": [{\"name\": \"create_agenda_point\", \"parameters\": {\"title\": \"Roadmap\"}}, {\"name\": \"nope\", \"parameters\": {}}]}\n```",
            "Added Roadmap; one step failed.",
        ]);
        let (caller, state) = caller(client.clone()).await;

        let outcome = caller.run("add roadmap to the agenda", &intent("create_agenda"), &[]).await.unwrap();

        assert_eq!(client.call_count(), 3);
        assert_eq!(outcome.explanation, "I'll add the point.");
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].success);
        assert!(!outcome.results[1].success);
        assert!(!outcome.all_succeeded());
        assert_eq!(outcome.reply(), "Sure, adding that now.\n\nAdded Roadmap; one step failed.");
        assert_eq!(state.agenda_points().await[0].title, "Roadmap");
    }

    #[tokio::test]
    async fn test_run_splits_action_with_trigger() {
        let client = ScriptedClient::new(&["On it.", "Creating the action.", "Created and armed."]);
        let (caller, state) = caller(client).await;

        let outcome = caller
            .run(
                r#"create an action "Send minutes" assigned to Dana when the meeting ends"#,
                &intent("create_action"),
                &[],
            )
            .await
            .unwrap();

        let names: Vec<&str> = outcome.calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["create_action_item", "set_action_trigger"]);
        assert!(outcome.all_succeeded());

        let items = state.action_items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].assignee.as_deref(), Some("Dana"));
        assert_eq!(items[0].trigger.as_deref(), Some("the meeting ends"));
        assert_eq!(outcome.results[1].parameters["action_id"], json!(items[0].id));
    }

    #[tokio::test]
    async fn test_placeholder_left_when_previous_failed() {
        let (caller, _) = caller(ScriptedClient::new(&[])).await;
        let results = caller
            .execute_batch(&expand_dependent_calls(vec![FunctionCall::new(CREATE_ACTION_WITH_TRIGGER)
                .with_param("title", "")
                .with_param("trigger", "later")]))
            .await;

        assert!(!results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].parameters["action_id"], json!(LAST_CREATED_ACTION_ID));
    }

    #[tokio::test]
    async fn test_run_without_calls_skips_summary() {
        let client = ScriptedClient::new(&["Hi!", "Nothing to change here. {\"function_calls\": []}"]);
        let (caller, _) = caller(client.clone()).await;

        let outcome = caller.run("thanks", &intent("general_conversation"), &[]).await.unwrap();

        assert_eq!(client.call_count(), 2);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.reply(), "Nothing to change here.");
    }

    #[tokio::test]
    async fn test_json_only_explanation_without_calls() {
        struct EmptyCallsClient;

        #[async_trait]
        impl ChatClient for EmptyCallsClient {
            async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, AssistantError> {
                Ok("{\"function_calls\": []}".to_string())
            }
        }

        let registry = FunctionRegistry::new();
        let state = MeetingState::new();
        register_meeting_functions(&registry, &state).await;
        let caller = UnifiedFunctionCaller::new(Arc::new(EmptyCallsClient), registry);

        let outcome = caller
            .run("create an agenda point", &intent("create_agenda"), &[])
            .await
            .unwrap();

        assert!(outcome.calls.is_empty());
        assert_eq!(outcome.explanation, "");
        assert_eq!(outcome.reply(), NO_CHANGES_REPLY);
        assert!(state.agenda_points().await.is_empty());
    }

    #[test]
    fn test_parse_function_calls_variants() {
        let single = parse_function_calls(r#"{"name": "list_action_items", "arguments": {}}"#).unwrap();
        assert_eq!(single, vec![FunctionCall::new("list_action_items")]);

        assert!(parse_function_calls("no json here").is_none());
        assert!(parse_function_calls("{broken").is_none());
    }

    #[test]
    fn test_expand_without_trigger() {
        let calls = expand_dependent_calls(vec![
            FunctionCall::new(CREATE_ACTION_WITH_TRIGGER).with_param("title", "Call vendor"),
        ]);
        assert_eq!(calls, vec![FunctionCall::new("create_action_item").with_param("title", "Call vendor")]);
    }
}
