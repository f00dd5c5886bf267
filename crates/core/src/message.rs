//! Message, Turn, and ConversationWindow domain types.
//!
//! These are the value objects that flow through the pipeline: the caller
//! supplies a flat message history, the window groups it into turns (the
//! atomic unit of trimming), and the dispatcher flattens it back out for
//! the provider wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters, rounding up. Accurate within ~10%
/// for BPE tokenizers on English text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (persona directive, prethought block, step hints)
    System,
    /// The end user
    User,
    /// The model's reply
    Assistant,
}

/// A single message. Immutable once created — the token count is computed
/// at construction and never revised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Estimated token cost of the content
    pub token_count: usize,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = estimate_tokens(&content);
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            token_count,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// One user/assistant exchange — the atomic unit of history trimming.
///
/// A turn holds at minimum one message (usually the user's) and is never
/// split: trimming either keeps the whole turn or drops it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Ordered messages in this exchange.
    pub messages: Vec<Message>,
}

impl Turn {
    /// Start a turn from its opening message.
    pub fn opening(message: Message) -> Self {
        Self {
            messages: vec![message],
        }
    }

    /// A complete user → assistant exchange.
    pub fn exchange(user: Message, assistant: Message) -> Self {
        Self {
            messages: vec![user, assistant],
        }
    }

    /// Attach a follow-up message (typically the assistant reply).
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Total token cost of the turn.
    pub fn cost(&self) -> usize {
        self.messages.iter().map(|m| m.token_count).sum()
    }
}

/// An ordered conversation: a leading block of standalone system messages
/// (persona directive, prethought block) followed by turns, oldest first.
///
/// Invariant: `total_tokens()` equals the sum of all member token counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationWindow {
    /// Leading system messages. Always retained by trimming.
    pub system: Vec<Message>,

    /// Conversation turns, oldest first.
    pub turns: Vec<Turn>,
}

impl ConversationWindow {
    /// Build a window from a flat role-tagged message list.
    ///
    /// System messages (wherever they appear) join the leading block. Each
    /// user message opens a new turn; assistant messages attach to the open
    /// turn, or open one themselves if the history starts mid-exchange.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut window = Self::default();
        let mut current: Option<Turn> = None;

        for message in messages {
            match message.role {
                Role::System => window.system.push(message),
                Role::User => {
                    if let Some(turn) = current.take() {
                        window.turns.push(turn);
                    }
                    current = Some(Turn::opening(message));
                }
                Role::Assistant => match current.as_mut() {
                    Some(turn) => turn.push(message),
                    None => current = Some(Turn::opening(message)),
                },
            }
        }

        if let Some(turn) = current {
            window.turns.push(turn);
        }
        window
    }

    /// Append a turn.
    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Total token cost of the window (system block + all turns).
    pub fn total_tokens(&self) -> usize {
        let system: usize = self.system.iter().map(|m| m.token_count).sum();
        let turns: usize = self.turns.iter().map(|t| t.cost()).sum();
        system + turns
    }

    /// Flatten back to an ordered message list for the provider wire format.
    pub fn to_messages(&self) -> Vec<Message> {
        self.system
            .iter()
            .chain(self.turns.iter().flat_map(|t| t.messages.iter()))
            .cloned()
            .collect()
    }

    /// Concatenated turn text, used for retention scoring.
    pub fn turn_text(&self) -> String {
        self.turns
            .iter()
            .flat_map(|t| t.messages.iter())
            .filter(|m| !m.content.is_empty())
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the window has no turns (the system block may be non-empty).
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
