//! Reply engine: staleness filter, extraction, reset, completion, reply.
//!
//! Classification runs inline on the event loop; everything after it (provider call and send)
//! runs in its own task so one slow or failing command never holds up the next event.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use super::boundary::SessionBoundary;
use super::compose::compose;
use super::event::{Command, ConversationKind, InboundEvent};
use super::extract::{extract, Ineligible};
use super::reset::{is_reset, RESET_ACKNOWLEDGEMENT};
use crate::config::{EngineConfig, ReplyOrdering};
use crate::llm::CompletionProvider;

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Sent before the engine started.
    Stale,
    Ineligible(Ineligible),
    /// Reset keyword acknowledged; no provider call.
    Reset,
    Replied,
    /// Provider failed and the failure policy sends nothing.
    Suppressed,
    SendFailed,
    /// The conversation worker went away before handling the command.
    Cancelled,
}

type Job = (Command, oneshot::Sender<Outcome>);
type WorkerMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>>;

/// Provider call and reply for one command. Shared by the engine and its conversation workers.
#[derive(Clone)]
struct Pipeline {
    config: Arc<EngineConfig>,
    provider: Arc<dyn CompletionProvider>,
}

impl Pipeline {
    async fn run(&self, command: Command) -> Outcome {
        let conversation = command.conversation.clone();
        if is_reset(&command.text, &self.config) {
            log::info!("conversation {}: reset", conversation.id());
            return match conversation.send(RESET_ACKNOWLEDGEMENT).await {
                Ok(()) => Outcome::Reset,
                Err(e) => {
                    log::warn!("conversation {}: reset acknowledgement failed: {}", conversation.id(), e);
                    Outcome::SendFailed
                }
            };
        }

        let result = self.provider.complete(&command.text).await;
        if let Err(ref e) = result {
            log::warn!("conversation {}: completion failed: {}", conversation.id(), e);
        }
        let Some(reply) = compose(&command.text, conversation.is_group(), &result, &self.config) else {
            return Outcome::Suppressed;
        };
        match conversation.send(&reply).await {
            Ok(()) => Outcome::Replied,
            Err(e) => {
                log::warn!("conversation {}: send failed: {}", conversation.id(), e);
                Outcome::SendFailed
            }
        }
    }
}

/// Classifies inbound events and runs the reply pipeline for eligible ones.
#[derive(Clone)]
pub struct ReplyEngine {
    boundary: SessionBoundary,
    pipeline: Pipeline,
    /// Conversation id -> worker queue. Only used with `ReplyOrdering::PerConversation`.
    workers: WorkerMap,
}

impl ReplyEngine {
    /// Create an engine whose startup cutoff is now.
    pub fn new(config: EngineConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        Self::with_boundary(config, provider, SessionBoundary::new())
    }

    pub fn with_boundary(
        config: EngineConfig,
        provider: Arc<dyn CompletionProvider>,
        boundary: SessionBoundary,
    ) -> Self {
        Self {
            boundary,
            pipeline: Pipeline {
                config: Arc::new(config),
                provider,
            },
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn boundary(&self) -> &SessionBoundary {
        &self.boundary
    }

    /// Staleness filter then extraction. Synchronous; no I/O.
    pub fn classify(&self, event: &InboundEvent) -> Result<Command, Outcome> {
        if !self.boundary.accept(event) {
            log::debug!("dropping message sent before startup at {}", event.sent_at);
            return Err(Outcome::Stale);
        }
        match &event.kind {
            ConversationKind::Group { topic } => log::info!(
                "group name: {} talker: {} content: {}",
                topic,
                event.sender_name,
                event.text.trim()
            ),
            ConversationKind::Direct => log::info!(
                "talker: {} content: {}",
                event.sender_name,
                event.text.trim()
            ),
        }
        extract(event, &self.pipeline.config).map_err(|reason| {
            log::debug!("conversation {}: {}", event.conversation.id(), reason);
            Outcome::Ineligible(reason)
        })
    }

    /// Handle one event to completion on the current task.
    pub async fn process(&self, event: InboundEvent) -> Outcome {
        match self.classify(&event) {
            Ok(command) => self.pipeline.run(command).await,
            Err(outcome) => outcome,
        }
    }

    /// Classify the event and hand an eligible command to its own task (or its conversation's
    /// worker). Returns None when the event was dropped.
    pub async fn dispatch(&self, event: InboundEvent) -> Option<JoinHandle<Outcome>> {
        let command = self.classify(&event).ok()?;
        let handle = match self.pipeline.config.reply_ordering {
            ReplyOrdering::Concurrent => {
                let pipeline = self.pipeline.clone();
                tokio::spawn(async move { pipeline.run(command).await })
            }
            ReplyOrdering::PerConversation => {
                let rx = self.enqueue(command).await;
                tokio::spawn(async move { rx.await.unwrap_or(Outcome::Cancelled) })
            }
        };
        Some(handle)
    }

    /// Event loop: dispatch every event received until the sender side closes.
    pub async fn run(self, mut events: mpsc::Receiver<InboundEvent>) {
        log::info!("reply engine started, ignoring messages sent before {}", self.boundary.startup());
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        log::info!("reply engine stopped: inbound channel closed");
    }

    async fn enqueue(&self, command: Command) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let key = command.conversation.id().to_string();
        let mut workers = self.workers.lock().await;
        let sender = workers.entry(key.clone()).or_insert_with(|| {
            spawn_worker(self.pipeline.clone(), self.workers.clone(), key.clone())
        });
        if let Err(mpsc::error::SendError(job)) = sender.send((command, tx)) {
            let sender = spawn_worker(self.pipeline.clone(), self.workers.clone(), key.clone());
            let _ = sender.send(job);
            workers.insert(key, sender);
        }
        rx
    }
}

/// One worker per conversation: commands are handled strictly in the order they were queued.
/// The worker exits and unregisters itself once its queue is empty; `enqueue` holds the map
/// lock while sending, so nothing can be queued between the emptiness check and the removal.
fn spawn_worker(
    pipeline: Pipeline,
    workers: WorkerMap,
    conversation_id: String,
) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    let own = tx.clone();
    tokio::spawn(async move {
        log::debug!("conversation {}: worker started", conversation_id);
        let mut next = rx.recv().await;
        while let Some((command, reply)) = next {
            let outcome = pipeline.run(command).await;
            {
                let mut map = workers.lock().await;
                next = rx.try_recv().ok();
                if next.is_none()
                    && map
                        .get(&conversation_id)
                        .is_some_and(|sender| sender.same_channel(&own))
                {
                    map.remove(&conversation_id);
                }
            }
            let _ = reply.send(outcome);
        }
        log::debug!("conversation {}: worker stopped", conversation_id);
    });
    tx
}
