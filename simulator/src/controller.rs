use std::sync::Mutex;

use chrono::Utc;
use tic_core::chat::{ChatContext, ChatProviderRef};
use tic_sheets::{RemoteLogRow, RemoteLogSync};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationSession, ConversationStore, Role};
use crate::error::{SimulatorError, SimulatorResult};
use crate::persona::PersonaDescriptor;
use crate::prompt::{
    replay_history, resumed_instruction, seed_instruction, seed_turns, truncate_corpus,
    DEFAULT_CORPUS_BUDGET, OPENING_ACTION,
};
use crate::sender::{RateLimitedSender, SendOutcome};
use crate::snapshot;

/// Result of submitting a teacher turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The student answered; the reply is already in the transcript
    Reply(String),
    /// The provider is throttling. The teacher turn is kept and goes out
    /// with the next message or retry.
    Deferred,
}

/// Drives rehearsal sessions: opening, turn taking, export and resume, and
/// keeping the remote session log current.
pub struct SessionController {
    provider: ChatProviderRef,
    sender: RateLimitedSender,
    corpus_char_budget: usize,
    log_sync: Option<RemoteLogSync>,
    /// Last scheduled save; each new save waits for it
    pending_sync: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(provider: ChatProviderRef, sender: RateLimitedSender) -> Self {
        Self {
            provider,
            sender,
            corpus_char_budget: DEFAULT_CORPUS_BUDGET,
            log_sync: None,
            pending_sync: Mutex::new(None),
        }
    }

    pub fn with_corpus_budget(mut self, budget: usize) -> Self {
        self.corpus_char_budget = budget;
        self
    }

    pub fn with_log_sync(mut self, log_sync: Option<RemoteLogSync>) -> Self {
        self.log_sync = log_sync;
        self
    }

    pub fn provider(&self) -> &ChatProviderRef {
        &self.provider
    }

    /// Opens a session for `persona` and lets the student speak first.
    ///
    /// On success the transcript holds exactly the opening student turn.
    pub async fn start_new(
        &self,
        user_id: &str,
        persona: PersonaDescriptor,
        corpus: &str,
        language: &str,
    ) -> SimulatorResult<ConversationSession> {
        let excerpt = truncate_corpus(corpus, self.corpus_char_budget);
        let instruction = seed_instruction(&persona, excerpt, language);
        let mut context = ChatContext::open(self.provider.clone(), seed_turns(instruction));

        let opening = match self.sender.send(&mut context, OPENING_ACTION).await? {
            SendOutcome::Reply(text) => text,
            SendOutcome::Deferred => return Err(SimulatorError::RateLimited),
        };

        let mut store = ConversationStore::new(user_id, persona);
        store.append(Role::Student, opening);
        let session = ConversationSession::new(store, context, language, Utc::now());

        info!(
            user_id,
            persona = %session.persona().name,
            session_number = session.persona().session_number,
            "Session started"
        );
        self.schedule_sync(&session);
        Ok(session)
    }

    /// Records the teacher's message, then asks the student for a reply.
    ///
    /// The teacher turn is appended before the model is called and stays
    /// in the transcript whatever happens next.
    pub async fn apply_teacher_turn(
        &self,
        session: &mut ConversationSession,
        text: &str,
    ) -> SimulatorResult<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SimulatorError::EmptyTurn);
        }

        session.store_mut().append(Role::Teacher, text);
        self.answer_pending(session).await
    }

    /// Asks again for a reply to teacher turns left unanswered by a
    /// deferral or an upstream failure.
    pub async fn retry_pending(
        &self,
        session: &mut ConversationSession,
    ) -> SimulatorResult<TurnOutcome> {
        if session.store().unanswered().is_empty() {
            return Err(SimulatorError::NothingToRetry);
        }
        self.answer_pending(session).await
    }

    async fn answer_pending(
        &self,
        session: &mut ConversationSession,
    ) -> SimulatorResult<TurnOutcome> {
        let pending: Vec<String> = session
            .store()
            .unanswered()
            .iter()
            .map(|t| t.text.clone())
            .collect();
        let texts: Vec<&str> = pending.iter().map(String::as_str).collect();
        debug!(pending = texts.len(), "Sending teacher turns");

        match self.sender.send_batch(session.context_mut(), &texts).await? {
            SendOutcome::Reply(reply) => {
                session.store_mut().append(Role::Student, reply.clone());
                self.schedule_sync(session);
                Ok(TurnOutcome::Reply(reply))
            }
            SendOutcome::Deferred => Ok(TurnOutcome::Deferred),
        }
    }

    /// CSV export of the session, persona embedded
    pub fn export_snapshot(&self, session: &ConversationSession) -> SimulatorResult<Vec<u8>> {
        let store = session.store();
        snapshot::export_csv(
            store.user_id(),
            store.persona(),
            store.turns(),
            store.updated_at(),
        )
    }

    /// Rebuilds a session from an export without calling the model.
    ///
    /// The resumed session gets a fresh start time and therefore its own
    /// row in the remote log.
    pub async fn resume_from_snapshot(
        &self,
        user_id: &str,
        bytes: &[u8],
        corpus: &str,
        language: &str,
    ) -> SimulatorResult<ConversationSession> {
        let imported = snapshot::import_csv(bytes)?;

        let excerpt = truncate_corpus(corpus, self.corpus_char_budget);
        let instruction = resumed_instruction(&imported.persona, excerpt, language);
        let history = replay_history(instruction, &imported.turns);
        let context = ChatContext::open(self.provider.clone(), history);

        let store = ConversationStore::from_turns(user_id, imported.persona, imported.turns);
        let session = ConversationSession::new(store, context, language, Utc::now());

        info!(
            user_id,
            persona = %session.persona().name,
            turns = session.turns().len(),
            "Session resumed"
        );
        Ok(session)
    }

    /// Ends the current case so a new persona can be started. The login
    /// identity stays with the caller.
    pub async fn reset(&self, session: ConversationSession) {
        info!(user_id = session.user_id(), "Resetting case");
        self.finalize(session).await;
    }

    /// Final save of the session, waiting for every save still in flight.
    pub async fn finalize(&self, session: ConversationSession) {
        self.schedule_sync(&session);
        self.flush_sync().await;
        debug!(user_id = session.user_id(), "Session closed");
    }

    /// Waits until every scheduled save has finished
    pub async fn flush_sync(&self) {
        let handle = self.take_pending();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Remote session log task ended abnormally: {}", e);
            }
        }
    }

    /// Saves the session's row in the background.
    ///
    /// Saves from this controller run one after another. Failures are
    /// logged and never reach the conversation.
    fn schedule_sync(&self, session: &ConversationSession) {
        let Some(sync) = self.log_sync.clone() else {
            return;
        };

        let row = RemoteLogRow::new(
            session.user_id(),
            session.started_at(),
            Utc::now(),
            sync.offset(),
            session.store().transcript_text(),
        );
        let previous = self.take_pending();

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!("Previous remote session log task ended abnormally: {}", e);
                }
            }
            match sync.upsert(row).await {
                Ok(outcome) => debug!(
                    row = outcome.row_number,
                    ordinal = outcome.session_ordinal,
                    "Remote session log saved"
                ),
                Err(e) => warn!("Remote session log save failed: {}", e),
            }
        });

        *self
            .pending_sync
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
    }

    fn take_pending(&self) -> Option<JoinHandle<()>> {
        self.pending_sync
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
