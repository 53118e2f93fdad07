use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

use super::client::ChatClient;
use super::functions::{FunctionCallResult, FunctionRegistry};
use super::intent::{IntentClassifier, IntentContext, IntentResult, SLASH_COMMAND};
use super::pipeline::UnifiedFunctionCaller;
use crate::error::AssistantError;
use crate::meeting::{register_meeting_functions, MeetingState};
use crate::models::{ChatMessage, ConversationTurn, Role};

pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Shown whenever the AI path fails, whatever the cause
pub const FALLBACK_REPLY: &str = "I encountered an issue processing your request. Please try again.";

const CONVERSATION_PROMPT: &str = "You are Meenoe, a concise assistant inside a meeting-management app. Help the user plan and run their meeting.";

const HELP_TEXT: &str = "Available commands:\n\
/help - show this message\n\
/clear - clear the conversation\n\
/agenda - list agenda points\n\
/actions - list action items\n\
/status - meeting overview\n\n\
You can also ask in plain words, e.g. create an agenda point named \"Budget Review\".";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Command,
    FunctionCall,
    Conversation,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub kind: ReplyKind,
    pub text: String,
    pub intent: IntentResult,
    pub function_results: Vec<FunctionCallResult>,
}

/// Routes user messages to commands, the function-calling pipeline or plain chat
pub struct ConversationManager {
    classifier: IntentClassifier,
    caller: UnifiedFunctionCaller,
    client: Arc<dyn ChatClient>,
    meeting: MeetingState,
    history: VecDeque<ConversationTurn>,
    max_history: usize,
}

impl ConversationManager {
    pub fn new(client: Arc<dyn ChatClient>, registry: FunctionRegistry, meeting: MeetingState) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            caller: UnifiedFunctionCaller::new(client.clone(), registry),
            client,
            meeting,
            history: VecDeque::new(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    /// Manager with the built-in meeting functions registered
    pub async fn with_meeting(client: Arc<dyn ChatClient>, meeting: MeetingState) -> Self {
        let registry = FunctionRegistry::new();
        register_meeting_functions(&registry, &meeting).await;
        Self::new(client, registry, meeting)
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history.max(1);
        self.trim_history();
        self
    }

    pub fn history(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.history.iter()
    }

    pub fn meeting(&self) -> &MeetingState {
        &self.meeting
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.classifier.clear_cache();
    }

    fn push_turn(&mut self, role: Role, content: &str) {
        self.history.push_back(ConversationTurn::new(role, content));
        self.trim_history();
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// History as chat messages, excluding the newest `skip_last` turns
    fn history_messages(&self, skip_last: usize) -> Vec<ChatMessage> {
        let take = self.history.len().saturating_sub(skip_last);
        self.history.iter().take(take).map(ChatMessage::from).collect()
    }

    pub async fn process_message(&mut self, text: &str) -> AssistantReply {
        let text = text.trim();
        self.push_turn(Role::User, text);

        let counts = self.meeting.counts().await;
        let ctx = IntentContext {
            agenda_count: counts.agenda_points,
            action_count: counts.action_items,
        };
        let intent = self.classifier.classify(text, &ctx);

        let reply = if intent.intent == SLASH_COMMAND {
            let command_text = self.handle_command(text).await;
            AssistantReply {
                kind: ReplyKind::Command,
                text: command_text,
                intent,
                function_results: Vec::new(),
            }
        } else if intent.requires_function_call {
            self.run_function_call(text, intent).await
        } else {
            self.run_conversation(intent).await
        };

        // /clear leaves an empty history behind
        if !(reply.kind == ReplyKind::Command && self.history.is_empty()) {
            self.push_turn(Role::Assistant, &reply.text);
        }
        reply
    }

    async fn run_function_call(&self, text: &str, intent: IntentResult) -> AssistantReply {
        // The current user turn is passed separately
        let history = self.history_messages(1);
        match self.caller.run(text, &intent, &history).await {
            Ok(outcome) => AssistantReply {
                kind: ReplyKind::FunctionCall,
                text: outcome.reply(),
                intent,
                function_results: outcome.results,
            },
            Err(e) => self.fallback(intent, e),
        }
    }

    async fn run_conversation(&self, intent: IntentResult) -> AssistantReply {
        let counts = self.meeting.counts().await;
        let mut messages = vec![ChatMessage::system(format!(
            "{}\n\nThe meeting has {} agenda point(s) and {} action item(s), {} completed.",
            CONVERSATION_PROMPT, counts.agenda_points, counts.action_items, counts.completed_actions
        ))];
        messages.extend(self.history_messages(0));

        match self.client.complete(&messages).await {
            Ok(text) => AssistantReply {
                kind: ReplyKind::Conversation,
                text: text.trim().to_string(),
                intent,
                function_results: Vec::new(),
            },
            Err(e) => self.fallback(intent, e),
        }
    }

    fn fallback(&self, intent: IntentResult, error: AssistantError) -> AssistantReply {
        tracing::error!("AI request failed for intent {}: {}", intent.intent, error);
        AssistantReply {
            kind: ReplyKind::Error,
            text: FALLBACK_REPLY.to_string(),
            intent,
            function_results: Vec::new(),
        }
    }

    async fn handle_command(&mut self, text: &str) -> String {
        let command = text.split_whitespace().next().unwrap_or("").to_lowercase();

        match command.as_str() {
            "/help" => HELP_TEXT.to_string(),
            "/clear" => {
                self.clear();
                "Conversation cleared.".to_string()
            }
            "/agenda" => {
                let points = self.meeting.agenda_points().await;
                if points.is_empty() {
                    return "No agenda points yet.".to_string();
                }
                points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| format!("{}. {} ({})", i + 1, p.title, p.urgency.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            "/actions" => {
                let items = self.meeting.action_items().await;
                if items.is_empty() {
                    return "No action items yet.".to_string();
                }
                items
                    .iter()
                    .enumerate()
                    .map(|(i, a)| {
                        let assignee = a.assignee.as_deref().unwrap_or("unassigned");
                        format!("{}. {} - {} [{}]", i + 1, a.title, assignee, a.status.as_str())
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            "/status" => {
                let counts = self.meeting.counts().await;
                format!(
                    "Agenda points: {}\nAction items: {} ({} completed)",
                    counts.agenda_points, counts.action_items, counts.completed_actions
                )
            }
            other => format!("Unknown command: {}. Type /help for available commands.", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::Urgency;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes a fixed reply and records the messages of every request
    struct RecordingClient {
        reply: Result<String, String>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl RecordingClient {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("upstream down".to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatClient for RecordingClient {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistantError> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.reply.clone().map_err(AssistantError::Chat)
        }
    }

    #[tokio::test]
    async fn test_help_command_skips_ai() {
        let client = RecordingClient::ok("unused");
        let mut manager = ConversationManager::with_meeting(client.clone(), MeetingState::new()).await;

        let reply = manager.process_message("/help").await;

        assert_eq!(reply.kind, ReplyKind::Command);
        assert!(reply.text.contains("/agenda"));
        assert_eq!(client.request_count(), 0);
        assert_eq!(manager.history().count(), 2);
    }

    #[tokio::test]
    async fn test_agenda_and_status_commands() {
        let meeting = MeetingState::new();
        meeting.add_agenda_point("Budget Review", "", Urgency::Critical).await.unwrap();
        let mut manager = ConversationManager::with_meeting(RecordingClient::ok("-"), meeting).await;

        let agenda = manager.process_message("/agenda").await;
        assert_eq!(agenda.text, "1. Budget Review (critical)");

        let status = manager.process_message("/status").await;
        assert!(status.text.contains("Agenda points: 1"));

        let actions = manager.process_message("/actions").await;
        assert_eq!(actions.text, "No action items yet.");

        let unknown = manager.process_message("/dance").await;
        assert!(unknown.text.starts_with("Unknown command: /dance"));
    }

    #[tokio::test]
    async fn test_clear_command_empties_history_and_cache() {
        let mut manager = ConversationManager::with_meeting(RecordingClient::ok("Hello!"), MeetingState::new()).await;
        manager.process_message("hello there").await;
        assert_eq!(manager.history().count(), 2);

        let reply = manager.process_message("/clear").await;

        assert_eq!(reply.text, "Conversation cleared.");
        assert_eq!(manager.history().count(), 0);
        assert_eq!(manager.classifier().cache_len(), 0);
    }

    #[tokio::test]
    async fn test_general_conversation_sends_history() {
        let client = RecordingClient::ok("  Happy to help.  ");
        let mut manager = ConversationManager::with_meeting(client.clone(), MeetingState::new()).await;

        manager.process_message("hi").await;
        let reply = manager.process_message("how are you").await;

        assert_eq!(reply.kind, ReplyKind::Conversation);
        assert_eq!(reply.text, "Happy to help.");

        let requests = client.requests.lock().unwrap();
        let last = requests.last().unwrap();
        assert_eq!(last[0].role, Role::System);
        // system + hi + reply + how are you
        assert_eq!(last.len(), 4);
        assert_eq!(last[3].content, "how are you");
    }

    #[tokio::test]
    async fn test_function_call_path_updates_meeting() {
        let client = RecordingClient::ok("Done.");
        let meeting = MeetingState::new();
        let mut manager = ConversationManager::with_meeting(client, meeting.clone()).await;

        let reply = manager.process_message(r#"create an agenda point named "Budget Review""#).await;

        assert_eq!(reply.kind, ReplyKind::FunctionCall);
        assert_eq!(reply.intent.intent, "create_agenda");
        assert_eq!(reply.function_results.len(), 1);
        assert!(reply.function_results[0].success);
        assert_eq!(meeting.agenda_points().await[0].title, "Budget Review");
    }

    #[tokio::test]
    async fn test_json_only_reply_never_stores_blank_turn() {
        let client = RecordingClient::ok(r#"{"function_calls": []}"#);
        let mut manager = ConversationManager::with_meeting(client, MeetingState::new()).await;

        let reply = manager.process_message("create an agenda point").await;

        assert_eq!(reply.kind, ReplyKind::FunctionCall);
        assert_eq!(reply.text, crate::assistant::pipeline::NO_CHANGES_REPLY);
        assert!(manager.history().all(|turn| !turn.content.trim().is_empty()));
    }

    #[tokio::test]
    async fn test_failure_returns_fallback() {
        let mut manager = ConversationManager::with_meeting(RecordingClient::failing(), MeetingState::new()).await;

        let chat = manager.process_message("hello").await;
        assert_eq!(chat.kind, ReplyKind::Error);
        assert_eq!(chat.text, FALLBACK_REPLY);

        let call = manager.process_message("add an agenda item called Hiring").await;
        assert_eq!(call.kind, ReplyKind::Error);
        assert_eq!(call.text, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mut manager = ConversationManager::with_meeting(RecordingClient::ok("ok"), MeetingState::new())
            .await
            .with_max_history(4);

        for i in 0..5 {
            manager.process_message(&format!("message {}", i)).await;
        }

        let turns: Vec<&ConversationTurn> = manager.history().collect();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "message 3");
    }
}
