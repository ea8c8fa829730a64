use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::debug;

use crate::errors::GeminiResult;
use crate::types::Content;

/// Conversational model provider.
///
/// The provider is stateless: every call carries the full history, so the
/// conversation state lives in [`ChatContext`] and can be rebuilt from a
/// transcript at any time.
#[async_trait]
pub trait ChatProvider: Send + Sync + Debug {
    /// Identifiers of models that support conversational generation
    async fn list_models(&self) -> GeminiResult<Vec<String>>;

    /// Generate the next model reply for the given history.
    /// The last entry of `history` is the user turn being answered.
    async fn generate(&self, history: &[Content]) -> GeminiResult<String>;
}

/// Type alias for Arc-wrapped ChatProvider trait objects
pub type ChatProviderRef = Arc<dyn ChatProvider>;

/// Accumulated instruction plus turn history bound to one conversation.
///
/// History is only extended after the provider answered; a failed `send`
/// leaves the context exactly as it was.
#[derive(Clone)]
pub struct ChatContext {
    provider: ChatProviderRef,
    history: Vec<Content>,
}

impl ChatContext {
    /// Opens a context seeded with the given turns (usually the hidden
    /// instruction and its acknowledgement). Same-role neighbours are merged.
    pub fn open(provider: ChatProviderRef, seed: Vec<Content>) -> Self {
        let mut history = Vec::with_capacity(seed.len());
        for content in seed {
            push_merged(&mut history, content);
        }
        Self { provider, history }
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    pub fn provider(&self) -> &ChatProviderRef {
        &self.provider
    }

    /// Sends a user message and returns the model reply.
    pub async fn send(&mut self, text: &str) -> GeminiResult<String> {
        self.send_batch(&[text]).await
    }

    /// Sends several user messages as one turn, one part each.
    pub async fn send_batch(&mut self, texts: &[&str]) -> GeminiResult<String> {
        let mut pending = self.history.clone();
        for text in texts {
            push_merged(&mut pending, Content::user(*text));
        }

        let reply = self.provider.generate(&pending).await?;

        push_merged(&mut pending, Content::model(reply.clone()));
        self.history = pending;
        debug!(history_len = self.history.len(), "Context extended");
        Ok(reply)
    }
}

impl Debug for ChatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatContext")
            .field("provider", &self.provider)
            .field("history_len", &self.history.len())
            .finish()
    }
}

/// Appends `content`, folding it into the previous entry when both share a
/// role. The API expects user and model turns to alternate.
pub fn push_merged(history: &mut Vec<Content>, content: Content) {
    match history.last_mut() {
        Some(last) if last.role() == content.role() => last.parts.extend(content.parts),
        _ => history.push(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GeminiError;
    use crate::types::ROLE_MODEL;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct EchoProvider {
        fail: bool,
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ChatProvider for EchoProvider {
        async fn list_models(&self) -> GeminiResult<Vec<String>> {
            Ok(vec!["models/echo".to_string()])
        }

        async fn generate(&self, history: &[Content]) -> GeminiResult<String> {
            self.calls.lock().unwrap().push(history.len());
            if self.fail {
                return Err(GeminiError::ApiError("boom".to_string()));
            }
            Ok(format!("echo: {}", history.last().map(|c| c.text()).unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn test_send_extends_history_on_success() {
        let provider = Arc::new(EchoProvider::default());
        let mut ctx = ChatContext::open(
            provider.clone(),
            vec![Content::user("seed"), Content::model("Ready.")],
        );

        let reply = ctx.send("hello").await.unwrap();
        assert_eq!(reply, "echo: hello");
        assert_eq!(ctx.history().len(), 4);
        assert_eq!(ctx.history()[3], Content::model("echo: hello"));
        assert_eq!(*provider.calls.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_failed_send_leaves_history_untouched() {
        let provider = Arc::new(EchoProvider {
            fail: true,
            ..Default::default()
        });
        let mut ctx = ChatContext::open(provider, vec![Content::user("seed"), Content::model("Ready.")]);

        assert!(ctx.send("hello").await.is_err());
        assert_eq!(ctx.history().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_is_one_user_turn() {
        let provider = Arc::new(EchoProvider::default());
        let mut ctx = ChatContext::open(provider, vec![Content::user("seed"), Content::model("Ready.")]);

        ctx.send_batch(&["are you ok?", "I'm here"]).await.unwrap();
        assert_eq!(ctx.history().len(), 4);
        assert_eq!(ctx.history()[2].parts.len(), 2);
        assert_eq!(ctx.history()[3].role(), ROLE_MODEL);
    }

    #[test]
    fn test_same_role_neighbours_merge() {
        let provider = Arc::new(EchoProvider::default());
        let ctx = ChatContext::open(
            provider,
            vec![
                Content::user("seed"),
                Content::model("Ready."),
                Content::model("first reply"),
                Content::user("a"),
            ],
        );

        assert_eq!(ctx.history().len(), 3);
        assert_eq!(ctx.history()[1].parts.len(), 2);
        assert_eq!(ctx.history()[1].text(), "Ready.first reply");
    }
}
