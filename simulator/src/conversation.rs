use chrono::{DateTime, Utc};
use tic_core::chat::ChatContext;

use crate::persona::PersonaDescriptor;

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    /// Label used in exported transcripts
    pub fn export_label(self) -> &'static str {
        match self {
            Role::Teacher => "user",
            Role::Student => "assistant",
        }
    }

    /// Accepts both the transcript labels and the export labels
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "teacher" | "user" => Some(Role::Teacher),
            "student" | "assistant" | "model" => Some(Role::Student),
            _ => None,
        }
    }

    /// Whether the model speaks this role
    pub fn is_model(self) -> bool {
        matches!(self, Role::Student)
    }
}

/// One message of the visible transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub sequence_index: usize,
}

/// Ordered, append-only log of turns plus the scenario it belongs to
#[derive(Debug, Clone)]
pub struct ConversationStore {
    user_id: String,
    persona: PersonaDescriptor,
    turns: Vec<Turn>,
    updated_at: DateTime<Utc>,
}

impl ConversationStore {
    pub fn new(user_id: impl Into<String>, persona: PersonaDescriptor) -> Self {
        Self {
            user_id: user_id.into(),
            persona,
            turns: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Rebuilds a store from imported turns, renumbering them in order
    pub fn from_turns(
        user_id: impl Into<String>,
        persona: PersonaDescriptor,
        turns: impl IntoIterator<Item = Turn>,
    ) -> Self {
        let mut store = Self::new(user_id, persona);
        for turn in turns {
            store.append(turn.role, turn.text);
        }
        store
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn persona(&self) -> &PersonaDescriptor {
        &self.persona
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Time of the last append
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn append(&mut self, role: Role, text: impl Into<String>) -> &Turn {
        let sequence_index = self.turns.len();
        self.turns.push(Turn {
            role,
            text: text.into(),
            sequence_index,
        });
        self.updated_at = Utc::now();
        &self.turns[sequence_index]
    }

    /// Teacher turns after the last student reply
    pub fn unanswered(&self) -> &[Turn] {
        let start = self
            .turns
            .iter()
            .rposition(|t| t.role.is_model())
            .map_or(0, |last| last + 1);
        &self.turns[start..]
    }

    /// Scenario header followed by one `[role]: text` line per turn
    pub fn transcript_text(&self) -> String {
        let mut text = format!("{}\n\n", self.persona.summary());
        for turn in &self.turns {
            text.push_str(&format!("[{}]: {}\n", turn.role.label(), turn.text));
        }
        text
    }
}

/// A live rehearsal: the transcript, when it started, and the model
/// context bound to it.
///
/// The context always reflects every turn up to the last student reply;
/// teacher turns after that are carried into the next model call.
#[derive(Debug)]
pub struct ConversationSession {
    store: ConversationStore,
    started_at: DateTime<Utc>,
    language: String,
    context: ChatContext,
}

impl ConversationSession {
    pub(crate) fn new(
        store: ConversationStore,
        context: ChatContext,
        language: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            started_at,
            language: language.into(),
            context,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn user_id(&self) -> &str {
        self.store.user_id()
    }

    pub fn persona(&self) -> &PersonaDescriptor {
        self.store.persona()
    }

    pub fn turns(&self) -> &[Turn] {
        self.store.turns()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut ChatContext {
        &mut self.context
    }

    /// A session counts as initialized once the student has spoken
    pub fn is_initialized(&self) -> bool {
        self.store.turns().iter().any(|t| t.role.is_model())
    }
}
