//! Detecting the agent's reply by polling session history.
//!
//! The gateway offers no push channel, and the send call's completion is
//! not a reliable signal that the reply is in place. The waiter therefore
//! records the latest qualifying reply *before* sending, launches the send
//! as an independent task, and polls until a snapshot supersedes the
//! baseline, the poll budget is spent, or the wall-clock ceiling passes.

use crate::client::ConversationGateway;
use crate::config::ReplyWaitConfig;
use crate::error::GatewayError;
use crate::history::align_positions;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use voxrelay_types::{AssistantSnapshot, HistoryMessage};

/// Result of waiting for a reply. Running out of time is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Reply(String),
    NoResponse,
}

impl ReplyOutcome {
    /// The reply text, or `fallback` when the agent never answered.
    pub fn into_text(self, fallback: &str) -> String {
        match self {
            ReplyOutcome::Reply(text) => text,
            ReplyOutcome::NoResponse => fallback.to_string(),
        }
    }
}

pub struct ReplyWaiter {
    gateway: Arc<dyn ConversationGateway>,
    config: ReplyWaitConfig,
    history_limit: usize,
}

impl ReplyWaiter {
    pub fn new(gateway: Arc<dyn ConversationGateway>, config: ReplyWaitConfig, history_limit: usize) -> Self {
        Self {
            gateway,
            config,
            history_limit,
        }
    }

    async fn read_history(&self, token: &str) -> Result<Vec<HistoryMessage>, GatewayError> {
        self.gateway.fetch_history(token, self.history_limit).await
    }

    /// Reads the most recent qualifying assistant message, numbered
    /// consistently with `baseline`.
    pub async fn latest_snapshot(
        &self,
        token: &str,
        baseline: &[HistoryMessage],
    ) -> Result<AssistantSnapshot, GatewayError> {
        let mut history = self.read_history(token).await?;
        align_positions(baseline, &mut history);
        Ok(AssistantSnapshot::latest(&history))
    }

    /// Sends `message` into the session and waits for a fresh reply.
    ///
    /// A failure to read the baseline aborts before anything is sent. During
    /// polling only [`GatewayError::Unauthorized`] aborts; other read errors
    /// count as "no reply yet". Slow history reads never stretch the wait
    /// past [`ReplyWaitConfig::ceiling`].
    pub async fn send_and_wait(&self, token: &str, message: &str) -> Result<ReplyOutcome, GatewayError> {
        let baseline = self.read_history(token).await?;
        let before = AssistantSnapshot::latest(&baseline);
        tracing::debug!(marker = before.marker, "captured reply baseline");

        // Detached: its outcome is logged by the task itself.
        drop(self.spawn_submission(token, message));

        let ceiling = self.config.ceiling();
        match tokio::time::timeout(ceiling, self.poll_for_reply(token, &baseline, &before)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    ceiling_ms = ceiling.as_millis() as u64,
                    "no agent reply before the wait ceiling"
                );
                Ok(ReplyOutcome::NoResponse)
            }
        }
    }

    async fn poll_for_reply(
        &self,
        token: &str,
        baseline: &[HistoryMessage],
        before: &AssistantSnapshot,
    ) -> Result<ReplyOutcome, GatewayError> {
        tokio::time::sleep(self.config.grace()).await;

        for attempt in 1..=self.config.max_polls {
            match self.latest_snapshot(token, baseline).await {
                Ok(after) if after.supersedes(before) => {
                    tracing::info!(attempt, marker = after.marker, "agent reply detected");
                    return Ok(ReplyOutcome::Reply(after.text));
                }
                Ok(_) => {}
                Err(GatewayError::Unauthorized) => return Err(GatewayError::Unauthorized),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "history poll failed");
                }
            }

            if attempt < self.config.max_polls {
                tokio::time::sleep(self.config.interval()).await;
            }
        }

        tracing::warn!(
            polls = self.config.max_polls,
            "no agent reply within the poll budget"
        );
        Ok(ReplyOutcome::NoResponse)
    }

    fn spawn_submission(&self, token: &str, message: &str) -> JoinHandle<()> {
        let gateway = Arc::clone(&self.gateway);
        let token = token.to_string();
        let message = message.to_string();

        tokio::spawn(async move {
            let started = Instant::now();
            match gateway.send_message(&token, &message).await {
                Ok(_) => tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "message submission completed"
                ),
                Err(e) => tracing::warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "message submission failed"
                ),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;
    use crate::history::parse_history;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use voxrelay_types::{MessageKind, MessageRules, Role};

    fn agent(text: &str, marker: i64) -> HistoryMessage {
        HistoryMessage {
            role: Role::Assistant,
            kind: MessageKind::Agent,
            text: text.to_string(),
            marker,
            positional: false,
        }
    }

    fn heartbeat(marker: i64) -> HistoryMessage {
        HistoryMessage {
            role: Role::Assistant,
            kind: MessageKind::Heartbeat,
            text: String::new(),
            marker,
            positional: false,
        }
    }

    /// A window as decoded from a gateway that sends no timestamps.
    fn untimed(entries: &[(&str, &str)]) -> Vec<HistoryMessage> {
        let messages: Vec<Value> = entries
            .iter()
            .map(|(role, text)| json!({ "role": role, "content": text }))
            .collect();
        parse_history(&json!({ "messages": messages }), &MessageRules::default())
    }

    enum Step {
        History(Vec<HistoryMessage>),
        /// History that takes this long to arrive.
        Slow(Duration, Vec<HistoryMessage>),
        Timeout,
        Unauthorized,
    }

    /// History that changes according to how many times it has been read.
    struct ScriptedGateway {
        /// `script[i]` is returned on the i-th read; the last entry repeats.
        script: Vec<Step>,
        reads: AtomicUsize,
        sent: Mutex<Vec<String>>,
        send_fails: bool,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script,
                reads: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                send_fails: false,
            })
        }
    }

    #[async_trait]
    impl ConversationGateway for ScriptedGateway {
        async fn fetch_history(&self, _token: &str, _limit: usize) -> Result<Vec<HistoryMessage>, GatewayError> {
            let i = self.reads.fetch_add(1, Ordering::SeqCst);
            let step = &self.script[i.min(self.script.len() - 1)];
            match step {
                Step::History(history) => Ok(history.clone()),
                Step::Slow(delay, history) => {
                    tokio::time::sleep(*delay).await;
                    Ok(history.clone())
                }
                Step::Timeout => Err(GatewayError::Timeout),
                Step::Unauthorized => Err(GatewayError::Unauthorized),
            }
        }

        async fn send_message(&self, _token: &str, message: &str) -> Result<Value, GatewayError> {
            self.sent.lock().unwrap().push(message.to_string());
            // Blocks for as long as a real agent turn might.
            tokio::time::sleep(Duration::from_secs(600)).await;
            if self.send_fails {
                Err(GatewayError::Timeout)
            } else {
                Ok(Value::Null)
            }
        }

        async fn chat_complete(
            &self,
            _token: &str,
            _messages: &[ChatMessage],
            _session_hint: Option<&str>,
        ) -> Result<Option<String>, GatewayError> {
            Ok(None)
        }

        async fn echo(&self, _token: &str, _text: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn reset_session(&self, _token: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn fast_config(max_polls: u32) -> ReplyWaitConfig {
        ReplyWaitConfig {
            grace_ms: 2000,
            interval_ms: 2000,
            max_polls,
            no_response_text: "No response".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_reply_seen_on_first_poll() {
        let gateway = ScriptedGateway::new(vec![
            Step::History(vec![agent("old", 1)]),
            Step::History(vec![agent("old", 1), agent("Lights are off.", 2)]),
        ]);
        let waiter = ReplyWaiter::new(gateway.clone(), fast_config(10), 20);

        let outcome = waiter.send_and_wait("tok", "turn off the lights").await.unwrap();
        assert_eq!(outcome, ReplyOutcome::Reply("Lights are off.".to_string()));
        assert_eq!(gateway.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_runs_without_blocking_the_poll() {
        let gateway = ScriptedGateway::new(vec![
            Step::History(vec![]),
            Step::History(vec![]),
            Step::History(vec![agent("done", 5)]),
        ]);
        let waiter = ReplyWaiter::new(gateway.clone(), fast_config(10), 20);

        let started = tokio::time::Instant::now();
        let outcome = waiter.send_and_wait("tok", "hello").await.unwrap();
        assert_eq!(outcome, ReplyOutcome::Reply("done".to_string()));
        // The send call sleeps for ten minutes; the reply arrives long before.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(gateway.sent.lock().unwrap().as_slice(), ["hello".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_poll_budget() {
        let gateway = ScriptedGateway::new(vec![Step::History(vec![agent("same", 1)])]);
        let config = fast_config(5);
        let ceiling = config.ceiling();
        let waiter = ReplyWaiter::new(gateway.clone(), config, 20);

        let started = tokio::time::Instant::now();
        let outcome = waiter.send_and_wait("tok", "anyone?").await.unwrap();

        assert_eq!(outcome, ReplyOutcome::NoResponse);
        assert_eq!(outcome.into_text("No response"), "No response");
        assert!(started.elapsed() <= ceiling + Duration::from_millis(1));
        // One baseline read plus one read per poll.
        assert_eq!(gateway.reads.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn replayed_or_filler_messages_do_not_count() {
        let gateway = ScriptedGateway::new(vec![
            Step::History(vec![agent("x", 5)]),
            // Same text under a newer marker.
            Step::History(vec![agent("x", 6)]),
            // Heartbeat on top of the old reply.
            Step::History(vec![agent("x", 5), heartbeat(7)]),
            // Different text with the same marker.
            Step::History(vec![agent("y", 5)]),
            Step::History(vec![agent("x", 5), agent("y", 8)]),
        ]);
        let waiter = ReplyWaiter::new(gateway.clone(), fast_config(10), 20);

        let outcome = waiter.send_and_wait("tok", "q").await.unwrap();
        assert_eq!(outcome, ReplyOutcome::Reply("y".to_string()));
        assert_eq!(gateway.reads.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_are_tolerated() {
        let gateway = ScriptedGateway::new(vec![
            Step::History(vec![]),
            Step::Timeout,
            Step::History(vec![agent("recovered", 3)]),
        ]);
        let waiter = ReplyWaiter::new(gateway, fast_config(10), 20);

        let outcome = waiter.send_and_wait("tok", "q").await.unwrap();
        assert_eq!(outcome, ReplyOutcome::Reply("recovered".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_baseline_aborts_before_sending() {
        let gateway = ScriptedGateway::new(vec![Step::Unauthorized]);
        let waiter = ReplyWaiter::new(gateway.clone(), fast_config(10), 20);

        let result = waiter.send_and_wait("bad", "q").await;
        assert!(matches!(result, Err(GatewayError::Unauthorized)));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_during_poll_aborts() {
        let gateway = ScriptedGateway::new(vec![Step::History(vec![]), Step::Unauthorized]);
        let waiter = ReplyWaiter::new(gateway, fast_config(10), 20);

        let result = waiter.send_and_wait("tok", "q").await;
        assert!(matches!(result, Err(GatewayError::Unauthorized)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_still_times_out_cleanly() {
        let gateway = Arc::new(ScriptedGateway {
            script: vec![Step::History(vec![])],
            reads: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            send_fails: true,
        });
        let waiter = ReplyWaiter::new(gateway, fast_config(3), 20);

        let outcome = waiter.send_and_wait("tok", "q").await.unwrap();
        assert_eq!(outcome, ReplyOutcome::NoResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_history_reads_stop_at_the_ceiling() {
        let gateway = ScriptedGateway::new(vec![
            Step::History(vec![agent("old", 1)]),
            Step::Slow(Duration::from_secs(60), vec![agent("old", 1)]),
        ]);
        let config = ReplyWaitConfig::default();
        let ceiling = config.ceiling();
        let waiter = ReplyWaiter::new(gateway.clone(), config, 20);

        let started = tokio::time::Instant::now();
        let outcome = waiter.send_and_wait("tok", "hello").await.unwrap();

        assert_eq!(outcome, ReplyOutcome::NoResponse);
        assert!(started.elapsed() >= ceiling);
        assert!(started.elapsed() <= ceiling + Duration::from_millis(1));
        // Baseline plus the three reads that started before the deadline.
        assert_eq!(gateway.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_in_a_slid_untimed_window_is_detected() {
        let gateway = ScriptedGateway::new(vec![
            Step::History(untimed(&[
                ("user", "q1"),
                ("assistant", "a1"),
                ("user", "q2"),
                ("assistant", "Old reply"),
            ])),
            Step::History(untimed(&[
                ("assistant", "a1"),
                ("user", "q2"),
                ("assistant", "Old reply"),
                ("user", "q3"),
            ])),
            Step::History(untimed(&[
                ("user", "q2"),
                ("assistant", "Old reply"),
                ("user", "q3"),
                ("assistant", "New reply"),
            ])),
        ]);
        let waiter = ReplyWaiter::new(gateway.clone(), fast_config(10), 4);

        let outcome = waiter.send_and_wait("tok", "q3").await.unwrap();
        assert_eq!(outcome, ReplyOutcome::Reply("New reply".to_string()));
        assert_eq!(gateway.reads.load(Ordering::SeqCst), 3);
    }
}
