pub mod chat;
pub mod session;

pub use chat::{ChatMessage, ConversationTurn, Role};
pub use session::{ConfigureRequest, PublicSessionConfig, SessionConfig, SessionSummary};
