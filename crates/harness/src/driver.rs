//! Conversation driver
//!
//! Drives one scenario run against a [`Transport`]:
//!
//! ```text
//! SENDING → AWAITING_FIRST_FRAGMENT → AGGREGATING → CLASSIFYING
//!    ▲                                                   │
//!    ├──────────── REPLYING / RETRYING ◀─────────────────┤
//!                                                        ▼
//!                                                   TERMINATED
//! ```
//!
//! The loop has no iteration cap. It ends on a terminal phrase, on the
//! deadline, on the first-fragment timeout, when the last replies are all
//! identical, or (if configured) after too many turns nobody understood.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use botcheck_common::{Action, OutcomeReason, ResponseClassifier, RunOutcome};

use crate::context::{RandomChooser, Randomization, RunContext, ValueChooser};
use crate::error::HarnessResult;
use crate::transport::Transport;

/// Driver timing and termination settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// How long to wait for the first fragment of a turn
    pub first_fragment_timeout: Duration,
    /// Fragment count polling period
    pub poll_interval: Duration,
    /// Extra wait after the first-fragment timeout before giving up
    pub first_fragment_grace: Duration,
    /// Wait after the first fragment so the rest of the turn can arrive
    pub settle: Duration,
    /// Backoffs between re-reads when a settled turn reads back empty
    pub aggregation_backoff: Vec<Duration>,
    /// Pause between the cancel keyword and the conversation reset
    pub cancel_settle: Duration,
    pub cancel_keyword: String,
    /// Wall-clock bound of one run; `None` is unbounded
    pub deadline: Option<Duration>,
    pub reset_conversation: bool,
    /// Consecutive unmatched turns tolerated; `None` is unbounded
    pub max_idle_turns: Option<u32>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            first_fragment_timeout: Duration::from_secs(45),
            poll_interval: Duration::from_millis(200),
            first_fragment_grace: Duration::from_millis(1500),
            settle: Duration::from_secs(5),
            aggregation_backoff: vec![Duration::from_secs(2), Duration::from_secs(1)],
            cancel_settle: Duration::from_millis(500),
            cancel_keyword: "cancelar".to_string(),
            deadline: None,
            reset_conversation: true,
            max_idle_turns: None,
        }
    }
}

/// Result of one driver run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Starter actually sent, after randomization
    pub starter: String,
    pub turns: u32,
    pub duration_ms: u64,
    /// Error message for `exception` outcomes
    pub error: Option<String>,
}

/// Drives one scenario run at a time
pub struct ConversationDriver {
    classifier: ResponseClassifier,
    config: DriverConfig,
    randomization: Randomization,
    chooser: Box<dyn ValueChooser>,
}

impl ConversationDriver {
    pub fn new(classifier: ResponseClassifier, config: DriverConfig) -> Self {
        Self {
            classifier,
            config,
            randomization: Randomization::default(),
            chooser: Box::new(RandomChooser::new()),
        }
    }

    pub fn with_randomization(mut self, randomization: Randomization) -> Self {
        self.randomization = randomization;
        self
    }

    pub fn with_chooser(mut self, chooser: impl ValueChooser + 'static) -> Self {
        self.chooser = Box::new(chooser);
        self
    }

    pub fn classifier(&self) -> &ResponseClassifier {
        &self.classifier
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run one scenario from its starter message.
    ///
    /// Never fails: transport errors become an `exception` outcome after a
    /// best-effort cleanup. `ctx` is reset before anything is sent.
    pub async fn run<T>(
        &mut self,
        transport: &mut T,
        ctx: &mut RunContext,
        scenario: &str,
        starter: &str,
    ) -> RunReport
    where
        T: Transport + ?Sized,
    {
        let span = info_span!("run", scenario = %scenario);
        async move {
            let started = Instant::now();
            ctx.reset();

            let mut sent_starter = starter.to_string();
            let result = self
                .drive(transport, ctx, scenario, starter, started, &mut sent_starter)
                .await;

            let (outcome, error) = match result {
                Ok(outcome) => (outcome, None),
                Err(e) => {
                    error!(starter = %sent_starter, "Run aborted: {}", e);
                    ctx.log_mut().failure(format!("exception: {}", e));
                    self.finish(transport, ctx).await;
                    (RunOutcome::failed(OutcomeReason::Exception), Some(e.to_string()))
                }
            };

            let duration_ms = started.elapsed().as_millis() as u64;
            if outcome.success {
                info!(starter = %sent_starter, turns = ctx.turns(), "✓ {} ({} ms)", outcome, duration_ms);
            } else {
                warn!(starter = %sent_starter, turns = ctx.turns(), "✗ {} ({} ms)", outcome, duration_ms);
            }

            RunReport {
                outcome,
                starter: sent_starter,
                turns: ctx.turns(),
                duration_ms,
                error,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive<T>(
        &mut self,
        transport: &mut T,
        ctx: &mut RunContext,
        scenario: &str,
        starter: &str,
        started: Instant,
        sent_starter: &mut String,
    ) -> HarnessResult<RunOutcome>
    where
        T: Transport + ?Sized,
    {
        if self.config.reset_conversation {
            if let Err(e) = transport.reset_conversation().await {
                debug!("Conversation reset failed: {}", e);
            }
        }

        let mut starter =
            ctx.apply_randomization(&self.randomization, self.chooser.as_mut(), starter)?;
        *sent_starter = starter.clone();
        ctx.log_mut().scenario(format!("{}: {}", scenario, starter));
        info!(starter = %starter, "Starting run");

        let mut pending = Some(starter.clone());

        loop {
            if let Some(deadline) = self.config.deadline {
                if started.elapsed() >= deadline {
                    warn!("Deadline of {:?} exceeded", deadline);
                    ctx.log_mut().failure("deadline exceeded");
                    return Ok(self.terminate(transport, ctx, OutcomeReason::TotalTimeout).await);
                }
            }

            let baseline = transport.fragment_count().await?;

            if let Some(text) = pending.take() {
                debug!(text = %text, "Sending");
                transport.send_text(&text).await?;
                ctx.log_mut().sent(text);
            }

            let fragments = match self.await_turn(transport, ctx, baseline).await? {
                Some(fragments) => fragments,
                None => {
                    warn!("No response from bot");
                    return Ok(self
                        .terminate(transport, ctx, OutcomeReason::NoResponseTimeout)
                        .await);
                }
            };

            ctx.count_turn();
            for fragment in &fragments {
                ctx.log_mut().received(fragment.clone());
            }

            let action = match self
                .classifier
                .classify_detailed(&fragments, Some(scenario), ctx.bindings())
            {
                Some(classification) => {
                    debug!(
                        rule = %classification.rule.note,
                        priority = classification.rule.priority,
                        "Classified as {}",
                        classification.action
                    );
                    Some(classification.action)
                }
                None => None,
            };

            match action {
                None => {
                    let idle = ctx.note_idle_turn();
                    debug!("No rule matched ({} idle turn(s))", idle);
                    if let Some(limit) = self.config.max_idle_turns {
                        if idle > limit {
                            warn!("{} consecutive unmatched turns", idle);
                            ctx.log_mut().failure("idle turn limit reached");
                            return Ok(self
                                .terminate(transport, ctx, OutcomeReason::IdleTurnLimit)
                                .await);
                        }
                    }
                }
                Some(Action::Reply(text)) => {
                    ctx.clear_idle_turns();
                    if ctx.record_reply(&text) {
                        warn!(text = %text, "Same reply repeated, bot is looping");
                        ctx.log_mut().failure(format!("loop detected on {:?}", text));
                        return Ok(self
                            .terminate(transport, ctx, OutcomeReason::InfiniteLoopDetected)
                            .await);
                    }
                    pending = Some(text);
                }
                Some(Action::RetryExists) => {
                    ctx.clear_idle_turns();
                    if ctx.retry_spent() {
                        warn!("Entity still exists after retry");
                        return Ok(self.terminate(transport, ctx, OutcomeReason::EndedError).await);
                    }

                    match self.randomization.retry_variable.clone() {
                        Some(variable) => {
                            let (previous, mutated) =
                                ctx.mutate_for_retry(&variable, self.chooser.as_mut())?;
                            info!("Entity exists, retrying with {} = {:?}", variable, mutated);
                            if !previous.is_empty() && starter.contains(&previous) {
                                starter = starter.replace(&previous, &mutated);
                            }
                        }
                        None => {
                            info!("Entity exists, retrying unchanged");
                            ctx.spend_retry();
                        }
                    }

                    self.finish(transport, ctx).await;
                    pending = Some(starter.clone());
                }
                Some(Action::EndOk) => {
                    self.finish(transport, ctx).await;
                    return Ok(RunOutcome::completed());
                }
                Some(Action::EndErr) => {
                    return Ok(self.terminate(transport, ctx, OutcomeReason::EndedError).await);
                }
            }
        }
    }

    /// Wait for the bot's next turn after `baseline`.
    ///
    /// `None` means nothing arrived in time. A turn whose fragments all
    /// sanitize away comes back as an empty turn.
    async fn await_turn<T>(
        &self,
        transport: &mut T,
        ctx: &mut RunContext,
        baseline: usize,
    ) -> HarnessResult<Option<Vec<String>>>
    where
        T: Transport + ?Sized,
    {
        if !self.wait_first_fragment(transport, baseline).await? {
            sleep(self.config.first_fragment_grace).await;
            let late = transport.fragments_since(baseline).await?;
            if late.is_empty() {
                ctx.log_mut().failure("no first fragment");
                return Ok(None);
            }
            debug!("{} late fragment(s) after grace wait", late.len());
            return Ok(Some(late));
        }

        sleep(self.config.settle).await;
        let mut fragments = transport.fragments_since(baseline).await?;

        for backoff in &self.config.aggregation_backoff {
            if !fragments.is_empty() {
                break;
            }
            debug!("Turn read back empty, retrying in {:?}", backoff);
            sleep(*backoff).await;
            fragments = transport.fragments_since(baseline).await?;
        }

        if fragments.is_empty() {
            ctx.log_mut().failure("empty turn after aggregation");
        }
        Ok(Some(fragments))
    }

    async fn wait_first_fragment<T>(&self, transport: &mut T, baseline: usize) -> HarnessResult<bool>
    where
        T: Transport + ?Sized,
    {
        let deadline = Instant::now() + self.config.first_fragment_timeout;
        loop {
            if transport.fragment_count().await? > baseline {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(self.config.poll_interval).await;
        }
    }

    async fn terminate<T>(
        &self,
        transport: &mut T,
        ctx: &mut RunContext,
        reason: OutcomeReason,
    ) -> RunOutcome
    where
        T: Transport + ?Sized,
    {
        self.finish(transport, ctx).await;
        RunOutcome::failed(reason)
    }

    /// Cancel the flow and clear the chat; failures are only logged
    async fn finish<T>(&self, transport: &mut T, ctx: &mut RunContext)
    where
        T: Transport + ?Sized,
    {
        let keyword = &self.config.cancel_keyword;
        match transport.send_text(keyword).await {
            Ok(()) => ctx.log_mut().sent(keyword.clone()),
            Err(e) => debug!("Cancel failed: {}", e),
        }
        sleep(self.config.cancel_settle).await;
        if let Err(e) = transport.reset_conversation().await {
            debug!("Conversation reset failed: {}", e);
        }
    }
}
