pub mod client;
pub mod conversation;
pub mod functions;
pub mod intent;
pub mod pipeline;

pub use client::{ChatClient, ProxyChatClient};
pub use conversation::{AssistantReply, ConversationManager, ReplyKind, FALLBACK_REPLY};
pub use functions::{FunctionCall, FunctionCallResult, FunctionRegistry};
pub use intent::{IntentClassifier, IntentContext, IntentResult};
pub use pipeline::{PipelineOutcome, UnifiedFunctionCaller};
