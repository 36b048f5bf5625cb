use crate::error::GenerationError;
use crate::models::RetrievedChunk;
use crate::pipeline::{PipelineFactory, PreparedPrompt, RagPipeline};
use crate::traits::TokenStream;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Author name the chat layer assigns to generated messages before renaming.
pub const DEFAULT_AUTHOR: &str = "Assistant";

/// Sessions untouched for this long are dropped from the registry.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Presentation-only rename of the generic assistant author.
pub fn rename_author(original: &str, product_name: &str) -> String {
    if original == DEFAULT_AUTHOR {
        product_name.to_string()
    } else {
        original.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalMessage {
    pub author: String,
    pub content: String,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Context { chunks: Vec<RetrievedChunk> },
    Token { text: String },
    Done { message: FinalMessage },
    Error { error: String, message: FinalMessage },
}

/// Assistant message being streamed to the user.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    author: String,
    content: String,
}

impl MessageDraft {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: String::new(),
        }
    }

    pub fn stream_token(&mut self, token: &str) {
        self.content.push_str(token);
    }

    pub fn send(self) -> FinalMessage {
        FinalMessage {
            author: self.author,
            content: self.content,
            interrupted: false,
        }
    }

    pub fn interrupt(self, error: &GenerationError) -> ChatEvent {
        ChatEvent::Error {
            error: error.to_string(),
            message: FinalMessage {
                author: self.author,
                content: self.content,
                interrupted: true,
            },
        }
    }
}

/// Per-session state: exactly one compiled pipeline.
pub struct SessionContext {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub author: String,
    pub pipeline: RagPipeline,
    last_active_ms: AtomicI64,
}

impl SessionContext {
    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.last_active_ms.load(Ordering::Relaxed))
            .unwrap_or(self.started_at)
    }

    fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        let idle_ms = now.timestamp_millis() - self.last_active_ms.load(Ordering::Relaxed);
        Duration::from_millis(u64::try_from(idle_ms).unwrap_or(0))
    }
}

pub struct SessionRegistry {
    factory: PipelineFactory,
    assistant_name: String,
    idle_timeout: Duration,
    sessions: RwLock<HashMap<Uuid, Arc<SessionContext>>>,
}

impl SessionRegistry {
    pub fn new(factory: PipelineFactory, assistant_name: impl Into<String>) -> Self {
        Self {
            factory,
            assistant_name: assistant_name.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Builds the session's pipeline and stores it under a fresh id. Idle sessions
    /// are pruned first.
    pub async fn on_chat_start(&self) -> Arc<SessionContext> {
        self.prune_idle().await;

        let started_at = Utc::now();
        let session = Arc::new(SessionContext {
            id: Uuid::new_v4(),
            started_at,
            author: rename_author(DEFAULT_AUTHOR, &self.assistant_name),
            pipeline: self.factory.build(),
            last_active_ms: AtomicI64::new(started_at.timestamp_millis()),
        });

        self.sessions
            .write()
            .await
            .insert(session.id, Arc::clone(&session));
        info!(session = %session.id, "chat session started, pipeline set");
        session
    }

    /// Looks up a session and marks it as active.
    pub async fn get(&self, id: &Uuid) -> Option<Arc<SessionContext>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        session.touch();
        Some(session)
    }

    /// Drops every session idle for longer than the timeout. Messages already
    /// streaming keep their own handle and finish normally.
    pub async fn prune_idle(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for(now) <= self.idle_timeout);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, remaining = sessions.len(), "idle chat sessions expired");
        }
        pruned
    }

    pub async fn end(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session = %id, "chat session ended");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

enum Phase {
    Retrieve {
        session: Arc<SessionContext>,
        query: String,
    },
    Generate {
        session: Arc<SessionContext>,
        prepared: PreparedPrompt,
    },
    Streaming {
        tokens: TokenStream,
        draft: MessageDraft,
    },
    Finished,
}

/// Runs one inbound message through the session's pipeline.
///
/// Emits the retrieved context, then each token as it arrives, then either `Done`
/// with the full answer or `Error` with whatever was produced before the failure.
/// Dropping the returned stream abandons the generation request.
pub fn on_message(
    session: Arc<SessionContext>,
    query: String,
) -> impl Stream<Item = ChatEvent> + Send + 'static {
    info!(session = %session.id, query = %query, "message received");

    stream::unfold(Phase::Retrieve { session, query }, |phase| async move {
        match phase {
            Phase::Retrieve { session, query } => {
                let prepared = session.pipeline.prepare(&query).await;
                match prepared {
                    Ok(prepared) => Some((
                        ChatEvent::Context {
                            chunks: prepared.context.clone(),
                        },
                        Phase::Generate { session, prepared },
                    )),
                    Err(error) => {
                        warn!(session = %session.id, %error, "retrieval failed");
                        Some((
                            MessageDraft::new(session.author.clone()).interrupt(&error),
                            Phase::Finished,
                        ))
                    }
                }
            }
            Phase::Generate { session, prepared } => {
                let draft = MessageDraft::new(session.author.clone());
                let started = session.pipeline.generate(&prepared).await;
                match started {
                    Ok(tokens) => next_token(tokens, draft).await,
                    Err(error) => {
                        warn!(session = %session.id, %error, "generation request failed");
                        Some((draft.interrupt(&error), Phase::Finished))
                    }
                }
            }
            Phase::Streaming { tokens, draft } => next_token(tokens, draft).await,
            Phase::Finished => None,
        }
    })
}

async fn next_token(mut tokens: TokenStream, mut draft: MessageDraft) -> Option<(ChatEvent, Phase)> {
    let next = tokens.next().await;
    match next {
        Some(Ok(text)) => {
            draft.stream_token(&text);
            Some((ChatEvent::Token { text }, Phase::Streaming { tokens, draft }))
        }
        Some(Err(error)) => {
            warn!(%error, "generation stream interrupted");
            Some((draft.interrupt(&error), Phase::Finished))
        }
        None => Some((
            ChatEvent::Done {
                message: draft.send(),
            },
            Phase::Finished,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{factory_with, ScriptedGenerator};

    async fn registry(generator: ScriptedGenerator) -> SessionRegistry {
        SessionRegistry::new(factory_with(Arc::new(generator)).await, "AirBnB 10K Q&A Bot")
    }

    #[test]
    fn only_the_assistant_author_is_renamed() {
        assert_eq!(rename_author("Assistant", "Doc Bot"), "Doc Bot");
        assert_eq!(rename_author("User", "Doc Bot"), "User");
        assert_eq!(rename_author("assistant", "Doc Bot"), "assistant");
    }

    #[tokio::test]
    async fn sessions_start_and_end() {
        let registry = registry(ScriptedGenerator::default()).await;

        let first = registry.on_chat_start().await;
        let second = registry.on_chat_start().await;
        assert_ne!(first.id, second.id);
        assert_eq!(first.author, "AirBnB 10K Q&A Bot");
        assert_eq!(registry.len().await, 2);

        assert!(registry.get(&first.id).await.is_some());
        assert!(registry.end(&first.id).await);
        assert!(!registry.end(&first.id).await);
        assert!(registry.get(&first.id).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn message_streams_context_tokens_then_done() {
        let registry = registry(ScriptedGenerator {
            tokens: vec!["It is".to_string(), " 500,000.".to_string()],
            ..ScriptedGenerator::default()
        })
        .await;
        let session = registry.on_chat_start().await;

        let events = on_message(session, "What is the maximum number of shares?".to_string())
            .collect::<Vec<_>>()
            .await;

        assert_eq!(events.len(), 4);
        match &events[0] {
            ChatEvent::Context { chunks } => {
                assert!(chunks.iter().any(|retrieved| retrieved.chunk.text.contains("500,000")));
            }
            other => panic!("expected context first, got {other:?}"),
        }
        assert!(matches!(&events[1], ChatEvent::Token { text } if text == "It is"));
        match &events[3] {
            ChatEvent::Done { message } => {
                assert_eq!(message.content, "It is 500,000.");
                assert_eq!(message.author, "AirBnB 10K Q&A Bot");
                assert!(!message.interrupted);
            }
            other => panic!("expected done last, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_keeps_partial_text_and_session_usable() {
        let registry = registry(ScriptedGenerator {
            tokens: vec!["Par".to_string(), "tial".to_string(), "ly".to_string()],
            fail_after: Some(2),
            ..ScriptedGenerator::default()
        })
        .await;
        let session = registry.on_chat_start().await;

        let events = on_message(Arc::clone(&session), "first".to_string())
            .collect::<Vec<_>>()
            .await;
        match events.last() {
            Some(ChatEvent::Error { error, message }) => {
                assert!(error.contains("connection reset"));
                assert_eq!(message.content, "Partial");
                assert!(message.interrupted);
            }
            other => panic!("expected error last, got {other:?}"),
        }

        let again = on_message(session, "second".to_string())
            .collect::<Vec<_>>()
            .await;
        assert!(matches!(again.first(), Some(ChatEvent::Context { .. })));
        assert!(registry.len().await == 1);
    }

    #[tokio::test]
    async fn idle_sessions_expire_and_active_ones_stay() {
        let registry = registry(ScriptedGenerator::default())
            .await
            .with_idle_timeout(Duration::from_millis(300));

        let idle = registry.on_chat_start().await;
        let active = registry.on_chat_start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.get(&active.id).await.is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(registry.prune_idle().await, 1);
        assert!(registry.get(&idle.id).await.is_none());
        assert!(registry.get(&active.id).await.is_some());
        assert!(active.last_active() > active.started_at);
    }

    #[tokio::test]
    async fn starting_a_chat_prunes_abandoned_sessions() {
        let registry = registry(ScriptedGenerator::default())
            .await
            .with_idle_timeout(Duration::from_millis(10));

        for _ in 0..3 {
            registry.on_chat_start().await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        let fresh = registry.on_chat_start().await;

        assert_eq!(registry.len().await, 1);
        assert!(registry.get(&fresh.id).await.is_some());
    }

    #[test]
    fn events_serialize_with_a_type_tag() -> Result<(), serde_json::Error> {
        let event = ChatEvent::Token {
            text: "hi".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event)?,
            serde_json::json!({ "type": "token", "text": "hi" })
        );
        Ok(())
    }
}
