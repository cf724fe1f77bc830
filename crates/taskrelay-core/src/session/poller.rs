//! Completion detection for delegated sessions.

use std::time::Duration;

use taskrelay_traits::{DispatchHooks, PollTick, SessionBackend, SessionMessage, SessionState};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Finish reasons that mean the assistant paused mid-turn.
const NON_TERMINAL_FINISH_REASONS: &[&str] = &["tool-calls", "unknown"];

/// Newest matching message by creation time; ties and missing timestamps go to
/// the later position.
fn latest<'a>(
    messages: &'a [SessionMessage],
    pred: impl Fn(&SessionMessage) -> bool,
) -> Option<&'a SessionMessage> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, message)| pred(message))
        .max_by_key(|(position, message)| (message.created_at.unwrap_or(i64::MIN), *position))
        .map(|(_, message)| message)
}

/// Whether the assistant has finished replying to the latest user message.
///
/// Idle status alone is not enough: text may have streamed while the turn is
/// still waiting on tool results, and a newer user message means the reply
/// has not started yet.
pub fn is_complete(messages: &[SessionMessage]) -> bool {
    let Some(assistant) = latest(messages, SessionMessage::is_assistant) else {
        return false;
    };
    let Some(finish) = assistant.finish_reason.as_deref() else {
        return false;
    };
    if NON_TERMINAL_FINISH_REASONS.contains(&finish) {
        return false;
    }
    let Some(user) = latest(messages, SessionMessage::is_user) else {
        return false;
    };
    match (user.id.as_deref(), assistant.id.as_deref()) {
        (Some(user_id), Some(assistant_id)) => user_id < assistant_id,
        _ => false,
    }
}

/// Completion for hosts that never report a finish reason: the latest message
/// is an assistant reply with text and no finish reason at all.
pub fn is_complete_without_finish_reason(messages: &[SessionMessage]) -> bool {
    latest(messages, |_| true).is_some_and(|message| {
        message.is_assistant() && message.finish_reason.is_none() && message.has_text_content()
    })
}

/// Terminal state of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Complete { message_count: usize },
    Aborted,
    TimedOut,
}

/// Idle-with-unchanged-history requirement used for unstable models.
#[derive(Debug, Clone, Copy)]
pub struct StabilityRule {
    /// Polls before this much time has passed never count
    pub min_elapsed: Duration,
    pub polls_required: u32,
}

/// Samples session status and history until a terminal condition.
pub struct CompletionPoller<'a> {
    backend: &'a dyn SessionBackend,
    hooks: &'a dyn DispatchHooks,
    interval: Duration,
    budget: Duration,
}

/// What a single sample observed.
enum Sample {
    Busy,
    Messages(Vec<SessionMessage>),
    Failed,
}

impl<'a> CompletionPoller<'a> {
    pub fn new(
        backend: &'a dyn SessionBackend,
        hooks: &'a dyn DispatchHooks,
        interval: Duration,
        budget: Duration,
    ) -> Self {
        Self {
            backend,
            hooks,
            interval,
            budget,
        }
    }

    /// Sleep one interval. Returns false when cancelled.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.interval) => {}
        }
        !cancel.is_cancelled()
    }

    async fn sample(&self, session_id: &str) -> Sample {
        match self.backend.session_status().await {
            Ok(statuses) => {
                if statuses.get(session_id) == Some(&SessionState::Busy) {
                    return Sample::Busy;
                }
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to fetch session status, retrying");
                return Sample::Failed;
            }
        }

        match self.backend.list_messages(session_id).await {
            Ok(messages) => Sample::Messages(messages),
            Err(e) => {
                warn!(session_id, error = %e, "Failed to fetch session messages, retrying");
                Sample::Failed
            }
        }
    }

    fn tick(&self, session_id: &str, iteration: u32, start: Instant, sample: &Sample) {
        self.hooks.on_poll_tick(&PollTick {
            session_id: session_id.to_string(),
            iteration,
            elapsed_ms: start.elapsed().as_millis() as u64,
            message_count: match sample {
                Sample::Messages(messages) => Some(messages.len()),
                _ => None,
            },
            session_busy: matches!(sample, Sample::Busy),
        });
    }

    /// Poll until the session's latest turn is complete.
    ///
    /// With an `anchor`, history must have grown past that many messages
    /// before completion is considered.
    pub async fn wait_for_completion(
        &self,
        session_id: &str,
        anchor: Option<usize>,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let start = Instant::now();
        let mut iteration = 0u32;
        let mut last_count: Option<usize> = None;

        loop {
            if start.elapsed() >= self.budget {
                info!(
                    session_id,
                    budget_ms = self.budget.as_millis() as u64,
                    "Poll budget exhausted"
                );
                return PollOutcome::TimedOut;
            }
            if !self.pause(cancel).await {
                info!(session_id, iteration, "Polling aborted");
                return PollOutcome::Aborted;
            }
            iteration += 1;

            let sample = self.sample(session_id).await;
            self.tick(session_id, iteration, start, &sample);

            let Sample::Messages(messages) = sample else {
                continue;
            };
            let count = messages.len();
            let previous = last_count.replace(count);

            if anchor.is_some_and(|anchor| count <= anchor) {
                debug!(session_id, count, ?anchor, "No new messages yet");
                continue;
            }

            if is_complete(&messages)
                || (previous == Some(count) && is_complete_without_finish_reason(&messages))
            {
                info!(session_id, iteration, message_count = count, "Session completed");
                return PollOutcome::Complete {
                    message_count: count,
                };
            }
        }
    }

    /// Poll until the session stays idle with an unchanged message count for
    /// the required number of consecutive polls.
    pub async fn wait_for_stability(
        &self,
        session_id: &str,
        rule: StabilityRule,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let start = Instant::now();
        let mut iteration = 0u32;
        let mut last_count: Option<usize> = None;
        let mut stable_polls = 0u32;

        loop {
            if start.elapsed() >= self.budget {
                info!(
                    session_id,
                    budget_ms = self.budget.as_millis() as u64,
                    "Poll budget exhausted"
                );
                return PollOutcome::TimedOut;
            }
            if !self.pause(cancel).await {
                info!(session_id, iteration, "Polling aborted");
                return PollOutcome::Aborted;
            }
            iteration += 1;

            let sample = self.sample(session_id).await;
            self.tick(session_id, iteration, start, &sample);

            let messages = match sample {
                Sample::Messages(messages) => messages,
                Sample::Busy => {
                    stable_polls = 0;
                    continue;
                }
                Sample::Failed => continue,
            };
            let count = messages.len();

            if start.elapsed() < rule.min_elapsed {
                last_count = Some(count);
                continue;
            }

            if last_count == Some(count) {
                stable_polls += 1;
            } else {
                stable_polls = 0;
                last_count = Some(count);
            }

            if stable_polls >= rule.polls_required {
                info!(session_id, iteration, message_count = count, "Session output stable");
                return PollOutcome::Complete {
                    message_count: count,
                };
            }
        }
    }
}
