use std::time::{Duration, Instant};

/// What the guard knows about the session submitting a message.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext {
    pub authenticated: bool,
    pub backend_configured: bool,
    /// When the session last got past the rate gate.
    pub last_accepted: Option<Instant>,
}

/// Why a message was turned away before reaching the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    RateLimited { retry_in: Duration },
    TooLong { max_chars: usize },
    Unauthenticated,
    NotConfigured,
}

impl Rejection {
    pub fn message(&self) -> String {
        match self {
            Self::Empty => "Please type something.".to_string(),
            Self::RateLimited { .. } => "Please wait before sending another message.".to_string(),
            Self::TooLong { max_chars } => format!(
                "Message too long. Please keep messages under {} characters.",
                max_chars
            ),
            Self::Unauthenticated => "Please sign in to use the assistant.".to_string(),
            Self::NotConfigured => {
                "The data store is not configured. Set TEAMSYNC_DB_PATH and try again.".to_string()
            }
        }
    }

    /// Transient rejections are shown once and leave the transcript untouched.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Empty | Self::RateLimited { .. })
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

/// Validates raw input and enforces the per-session minimum interval.
///
/// Checks run in a fixed order: empty input, rate gate, length, sign-in,
/// backend configuration.
#[derive(Debug, Clone)]
pub struct InputGuard {
    max_chars: usize,
    min_interval: Duration,
}

impl InputGuard {
    pub fn new(max_chars: usize, min_interval: Duration) -> Self {
        Self {
            max_chars,
            min_interval,
        }
    }

    pub fn check(&self, text: &str, ctx: &GuardContext, now: Instant) -> Result<(), Rejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::Empty);
        }

        if let Some(last) = ctx.last_accepted {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Err(Rejection::RateLimited {
                    retry_in: self.min_interval - elapsed,
                });
            }
        }

        if text.chars().count() > self.max_chars {
            return Err(Rejection::TooLong {
                max_chars: self.max_chars,
            });
        }
        if !ctx.authenticated {
            return Err(Rejection::Unauthenticated);
        }
        if !ctx.backend_configured {
            return Err(Rejection::NotConfigured);
        }

        Ok(())
    }
}
