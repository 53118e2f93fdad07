use async_trait::async_trait;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

use crate::error::AssistantError;

pub type Params = Map<String, Value>;

/// Structured instruction to run a registered function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default, alias = "arguments")]
    pub parameters: Params,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Params::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Adds the parameter only when a value is present
    pub fn with_opt_param(self, key: &str, value: Option<String>) -> Self {
        match value {
            Some(v) => self.with_param(key, v),
            None => self,
        }
    }
}

/// Outcome of one function invocation within a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResult {
    pub function: String,
    pub parameters: Params,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait FunctionHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call(&self, params: &Params) -> Result<Value, AssistantError>;
}

type HandlerFn = dyn Fn(Params) -> BoxFuture<'static, Result<Value, AssistantError>> + Send + Sync;

/// Handler backed by a closure
pub struct FnHandler {
    name: String,
    description: String,
    f: Box<HandlerFn>,
}

impl FnHandler {
    pub fn new<F>(name: &str, description: &str, f: F) -> Self
    where
        F: Fn(Params) -> BoxFuture<'static, Result<Value, AssistantError>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl FunctionHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, params: &Params) -> Result<Value, AssistantError> {
        (self.f)(params.clone()).await
    }
}

/// Registry of callable functions, keyed by name
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    handlers: Arc<RwLock<BTreeMap<String, Arc<dyn FunctionHandler>>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handler: Arc<dyn FunctionHandler>) {
        let mut handlers = self.handlers.write().await;
        tracing::debug!("Registering function: {}", handler.name());
        handlers.insert(handler.name().to_string(), handler);
    }

    pub async fn register_fn<F>(&self, name: &str, description: &str, f: F)
    where
        F: Fn(Params) -> BoxFuture<'static, Result<Value, AssistantError>> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnHandler::new(name, description, f))).await;
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.handlers.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    /// (name, description) pairs sorted by name
    pub async fn descriptions(&self) -> Vec<(String, String)> {
        self.handlers
            .read()
            .await
            .values()
            .map(|h| (h.name().to_string(), h.description().to_string()))
            .collect()
    }

    pub async fn invoke(&self, call: &FunctionCall) -> Result<Value, AssistantError> {
        let handler = self
            .handlers
            .read()
            .await
            .get(&call.name)
            .cloned()
            .ok_or_else(|| AssistantError::UnknownFunction(call.name.clone()))?;

        tracing::info!("Invoking function: {} {:?}", call.name, call.parameters);
        handler.call(&call.parameters).await
    }
}

/// Non-empty string parameter or `MissingParameter`
pub fn required_str<'a>(params: &'a Params, function: &str, key: &str) -> Result<&'a str, AssistantError> {
    optional_str(params, key).ok_or_else(|| AssistantError::MissingParameter {
        function: function.to_string(),
        param: key.to_string(),
    })
}

pub fn optional_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// --- Regex parameter extraction ---

struct Extractors {
    quoted: Regex,
    named: Regex,
    rename: Regex,
    urgency: Regex,
    assignee: Regex,
    due: Regex,
    trigger: Regex,
    status: Regex,
    action_title: Regex,
}

const BAD_REGEX: &str = "built-in extraction regex must compile";

fn extractors() -> &'static Extractors {
    static EXTRACTORS: OnceLock<Extractors> = OnceLock::new();
    EXTRACTORS.get_or_init(|| Extractors {
        quoted: Regex::new(r#"["“]([^"”]+)["”]"#).expect(BAD_REGEX),
        named: Regex::new(r"(?i)\b(?:named|called|titled|about|regarding)\s+(.+?)\s*(?:[.!?]|$)").expect(BAD_REGEX),
        rename: Regex::new(r#"(?i)["“]([^"”]+)["”]\s+to\s+["“]([^"”]+)["”]"#).expect(BAD_REGEX),
        urgency: Regex::new(r"(?i)\b(urgent|critical|important|high|low|normal)\s*(?:priority|urgency)?\b").expect(BAD_REGEX),
        assignee: Regex::new(r"(?i)\b(?:assign(?:ed)?|delegated?|give|hand)\b.*?\bto\s+([A-Za-z][\w\-]*(?:\.[A-Za-z][\w\-]*)*)").expect(BAD_REGEX),
        due: Regex::new(r"(?i)\b(?:due|by)\s+(today|tomorrow|(?:next\s+)?(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|week)|\d{4}-\d{2}-\d{2})\b").expect(BAD_REGEX),
        trigger: Regex::new(r"(?i)\b(?:when|once|after)\s+(.+?)\s*(?:[.!?]|$)").expect(BAD_REGEX),
        status: Regex::new(r"(?i)\b(done|completed?|finished|in[\s\-]progress|started|pending|open)\b").expect(BAD_REGEX),
        action_title: Regex::new(r"(?i)\b(?:action(?:\s+item)?|task|todo)\s+(?:to|for)\s+(.+?)(?:\s+(?:assign(?:ed)?|due|by|when|once|after)\b|[.!?]|$)").expect(BAD_REGEX),
    })
}

fn capture(re: &Regex, text: &str, group: usize) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(group))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Title from the first quoted span, else from "named X" / "about X"
fn extract_title(text: &str) -> Option<String> {
    let ex = extractors();
    capture(&ex.quoted, text, 1).or_else(|| capture(&ex.named, text, 1))
}

/// Infer function calls for an intent from the user's own words
pub fn extract_function_calls(intent: &str, text: &str) -> Vec<FunctionCall> {
    let ex = extractors();
    // Quoted titles must not leak into assignee or status captures
    let bare = ex.quoted.replace_all(text, "\"\"");

    let call = match intent {
        "create_agenda" => extract_title(text).map(|title| {
            FunctionCall::new("create_agenda_point")
                .with_param("title", title)
                .with_opt_param("urgency", capture(&ex.urgency, text, 1))
        }),
        "update_agenda" => ex.rename.captures(text).map(|c| {
            FunctionCall::new("update_agenda_point")
                .with_param("agenda_point", c[1].trim())
                .with_param("title", c[2].trim())
        }),
        "delete_agenda" => extract_title(text)
            .map(|title| FunctionCall::new("delete_agenda_point").with_param("agenda_point", title)),
        "list_agenda" => Some(FunctionCall::new("list_agenda_points")),
        "create_action" => extract_title(text)
            .or_else(|| capture(&ex.action_title, text, 1))
            .map(|title| {
                let trigger = capture(&ex.trigger, text, 1);
                let name = if trigger.is_some() {
                    "create_action_with_trigger"
                } else {
                    "create_action_item"
                };
                FunctionCall::new(name)
                    .with_param("title", title)
                    .with_opt_param("assignee", capture(&ex.assignee, &bare, 1))
                    .with_opt_param("due_date", capture(&ex.due, text, 1))
                    .with_opt_param("trigger", trigger)
            }),
        "assign_action" => {
            let action = extract_title(text);
            let assignee = capture(&ex.assignee, &bare, 1);
            action.zip(assignee).map(|(action, assignee)| {
                FunctionCall::new("assign_action")
                    .with_param("action_id", action)
                    .with_param("assignee", assignee)
            })
        }
        "update_action_status" => {
            let action = extract_title(text);
            let status = capture(&ex.status, &bare, 1);
            action.zip(status).map(|(action, status)| {
                FunctionCall::new("update_action_status")
                    .with_param("action_id", action)
                    .with_param("status", status)
            })
        }
        "list_actions" => Some(FunctionCall::new("list_action_items")),
        _ => None,
    };

    call.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    #[test]
    fn test_extract_create_agenda_quoted() {
        let calls = extract_function_calls("create_agenda", r#"create an agenda point named "Budget Review""#);
        assert_eq!(calls, vec![FunctionCall::new("create_agenda_point").with_param("title", "Budget Review")]);
    }

    #[test]
    fn test_extract_create_agenda_unquoted_with_urgency() {
        let calls = extract_function_calls("create_agenda", "add an urgent agenda item about hiring plan.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters["title"], json!("hiring plan"));
        assert_eq!(calls[0].parameters["urgency"], json!("urgent"));
    }

    #[test]
    fn test_extract_action_with_trigger() {
        let calls = extract_function_calls(
            "create_action",
            r#"create an action "Send minutes" assigned to Dana when the meeting ends"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "create_action_with_trigger");
        assert_eq!(calls[0].parameters["assignee"], json!("Dana"));
        assert_eq!(calls[0].parameters["trigger"], json!("the meeting ends"));
    }

    #[test]
    fn test_extract_action_unquoted_title() {
        let calls = extract_function_calls("create_action", "add a task to book the venue due friday");
        assert_eq!(calls[0].name, "create_action_item");
        assert_eq!(calls[0].parameters["title"], json!("book the venue"));
        assert_eq!(calls[0].parameters["due_date"], json!("friday"));
    }

    #[test]
    fn test_extract_assign_action_phrasings() {
        use crate::assistant::intent::{IntentClassifier, IntentContext};

        let classifier = IntentClassifier::new();
        let expected = vec![FunctionCall::new("assign_action")
            .with_param("action_id", "Book venue")
            .with_param("assignee", "Dana")];

        for text in [
            r#"assign task "Book venue" to Dana"#,
            r#"assign the action "Book venue" to Dana"#,
            r#"assign "Book venue" task to Dana"#,
            r#"please assign the task "Book venue" to Dana."#,
        ] {
            let intent = classifier.classify(text, &IntentContext::default());
            assert_eq!(intent.intent, "assign_action", "{}", text);
            assert_eq!(extract_function_calls(&intent.intent, text), expected, "{}", text);
        }
    }

    #[test]
    fn test_extract_assignee_ignores_quoted_title() {
        let calls = extract_function_calls("assign_action", r#"assign task "Talk to Bob" to Dana"#);
        assert_eq!(calls[0].parameters["action_id"], json!("Talk to Bob"));
        assert_eq!(calls[0].parameters["assignee"], json!("Dana"));
    }

    #[test]
    fn test_extract_update_action_status() {
        let calls = extract_function_calls("update_action_status", r#"mark task "Book venue" as done"#);
        assert_eq!(
            calls,
            vec![FunctionCall::new("update_action_status")
                .with_param("action_id", "Book venue")
                .with_param("status", "done")]
        );

        // A status word inside the title is not the requested status
        let calls = extract_function_calls("update_action_status", r#"set task "Open questions" to in progress"#);
        assert_eq!(calls[0].parameters["action_id"], json!("Open questions"));
        assert_eq!(calls[0].parameters["status"], json!("in progress"));

        assert!(extract_function_calls("update_action_status", r#"mark task "Book venue""#).is_empty());
    }

    #[test]
    fn test_extract_rename_agenda() {
        let calls = extract_function_calls("update_agenda", r#"rename agenda point "Budget" to "Budget 2025""#);
        assert_eq!(calls[0].parameters["agenda_point"], json!("Budget"));
        assert_eq!(calls[0].parameters["title"], json!("Budget 2025"));
    }

    #[test]
    fn test_extract_nothing_without_title() {
        assert!(extract_function_calls("create_agenda", "create an agenda point").is_empty());
        assert!(extract_function_calls("general_conversation", "hello").is_empty());
    }

    #[tokio::test]
    async fn test_registry_invoke() {
        let registry = FunctionRegistry::new();
        registry
            .register_fn("echo", "Echo params", |params| {
                async move { Ok(Value::Object(params)) }.boxed()
            })
            .await;

        assert!(registry.contains("echo").await);
        let result = registry
            .invoke(&FunctionCall::new("echo").with_param("a", 1))
            .await
            .unwrap();
        assert_eq!(result, json!({ "a": 1 }));

        let err = registry.invoke(&FunctionCall::new("missing")).await.unwrap_err();
        assert!(matches!(err, AssistantError::UnknownFunction(name) if name == "missing"));
    }

    #[test]
    fn test_required_str() {
        let params = FunctionCall::new("f").with_param("title", "  ").parameters;
        assert!(matches!(
            required_str(&params, "f", "title"),
            Err(AssistantError::MissingParameter { .. })
        ));
    }
}
