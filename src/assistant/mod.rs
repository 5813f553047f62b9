//! The chat assistant's command interpreter.
//!
//! A submitted message goes through three stages:
//!
//! 1. [`InputGuard`] rejects empty, oversized, too-frequent, anonymous or
//!    unconfigured submissions.
//! 2. [`intent::parse`] turns the text into an [`Intent`].
//! 3. [`Executor`] performs the data operation and renders the reply.
//!
//! The user message and the reply are appended to the session's transcript.
//! Transient rejections (empty input, rate limit) and data-store failures
//! produce a notice for the caller that is not recorded as an assistant
//! message.

mod executor;
mod guard;
pub mod intent;
mod session;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use executor::{clamp_progress, format_date, Executor, MAX_TITLE_CHARS};
pub use guard::{GuardContext, InputGuard, Rejection};
pub use intent::{help_text, Intent};
pub use session::{SessionHandle, SessionRegistry, SessionState, Transcript};

use crate::config::AssistantConfig;
use crate::models::Role;
use crate::store::{DataStore, StoreError};

/// Greeting shown when a conversation opens.
pub const WELCOME: &str = "Hi! Ask me about your projects and tasks. Type \"help\" to see commands.";

const FAILURE_NOTICE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("data store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Result of submitting one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The session was busy with another command.
    Ignored,
    /// Turned away before reaching the matcher; nothing was recorded.
    Rejected { message: String },
    /// The reply was recorded in the transcript.
    Replied { message: String },
    /// The command failed; only the user message was recorded.
    Failed { message: String },
}

impl SubmitOutcome {
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Ignored => None,
            Self::Rejected { message } | Self::Replied { message } | Self::Failed { message } => {
                Some(message)
            }
        }
    }
}

pub struct Assistant {
    store: Option<Arc<dyn DataStore>>,
    guard: InputGuard,
    config: AssistantConfig,
}

impl Assistant {
    pub fn new(store: Arc<dyn DataStore>, config: AssistantConfig) -> Self {
        Self {
            store: Some(store),
            guard: InputGuard::new(config.max_input_chars, config.min_interval),
            config,
        }
    }

    /// An assistant without a data store. Every accepted message is answered
    /// with a configuration error.
    pub fn unconfigured(config: AssistantConfig) -> Self {
        Self {
            store: None,
            guard: InputGuard::new(config.max_input_chars, config.min_interval),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    pub async fn submit(&self, session: &mut SessionState, text: &str) -> SubmitOutcome {
        self.submit_at(session, text, Instant::now()).await
    }

    /// Like [`Assistant::submit`] with an explicit clock reading for the rate gate.
    pub async fn submit_at(
        &self,
        session: &mut SessionState,
        text: &str,
        now: Instant,
    ) -> SubmitOutcome {
        let ctx = GuardContext {
            authenticated: session.user_id().is_some(),
            backend_configured: self.store.is_some(),
            last_accepted: session.last_accepted(),
        };

        let checked = self.guard.check(text, &ctx, now);
        if let Err(rejection) = &checked {
            if rejection.is_transient() {
                tracing::debug!(session_id = %session.id(), "Rejected submission: {}", rejection);
                return SubmitOutcome::Rejected {
                    message: rejection.message(),
                };
            }
        }

        session.mark_accepted(now);
        let text = text.trim();
        session.record(Role::User, text);

        if let Err(rejection) = checked {
            return reply(session, rejection.message());
        }
        let Some(store) = self.store.as_deref() else {
            return reply(session, Rejection::NotConfigured.message());
        };

        let intent = intent::parse(text);
        tracing::debug!(session_id = %session.id(), intent = intent.name(), "Running command");

        match self.run(store, session.user_id(), intent).await {
            Ok(message) => reply(session, message),
            Err(e) => {
                tracing::error!(session_id = %session.id(), error = %e, "Assistant command failed");
                let message = match e {
                    AssistantError::Timeout(_) => {
                        "The data store took too long to answer. Please try again.".to_string()
                    }
                    AssistantError::Store(_) => FAILURE_NOTICE.to_string(),
                };
                SubmitOutcome::Failed { message }
            }
        }
    }

    async fn run(
        &self,
        store: &dyn DataStore,
        user_id: Option<Uuid>,
        intent: Intent,
    ) -> Result<String, AssistantError> {
        let executor = Executor::new(store, user_id, self.config.list_limit);
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, executor.execute(intent)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AssistantError::Timeout(timeout)),
        }
    }
}

fn reply(session: &mut SessionState, message: String) -> SubmitOutcome {
    session.record(Role::Assistant, message.clone());
    SubmitOutcome::Replied { message }
}
