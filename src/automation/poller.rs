use crate::automation::client::AutomationBackend;
use crate::automation::schema::{AutomationStatus, JobStatus, FAILED_MESSAGE};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest poll period; `interval` panics on zero.
pub const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Receives what the poller observes. Implementations ignore calls that do
/// not fit their current state.
pub trait ProgressSink: Send + Sync {
    /// Render a running snapshot.
    fn apply(&self, status: &AutomationStatus);
    /// Enter the completion grace period. False if no longer running.
    fn begin_finishing(&self) -> bool;
    fn complete(&self);
    fn fail(&self, error: String);
}

/// How one poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Completed,
    Failed,
    Cancelled,
}

pub struct StatusPoller {
    backend: Arc<dyn AutomationBackend>,
    sink: Arc<dyn ProgressSink>,
    period: Duration,
    grace: Duration,
}

impl StatusPoller {
    pub fn new(
        backend: Arc<dyn AutomationBackend>,
        sink: Arc<dyn ProgressSink>,
        period: Duration,
        grace: Duration,
    ) -> Self {
        if period < MIN_POLL_PERIOD {
            tracing::warn!("Poll period {:?} too short, using {:?}", period, MIN_POLL_PERIOD);
        }
        Self {
            backend,
            sink,
            period: period.max(MIN_POLL_PERIOD),
            grace,
        }
    }

    /// Poll until a terminal snapshot or until `token` is cancelled. Requests
    /// are sequential, so at most one is in flight.
    pub async fn run(self, token: CancellationToken) -> PollExit {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return PollExit::Cancelled,
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                biased;
                _ = token.cancelled() => return PollExit::Cancelled,
                polled = self.backend.automation_status() => polled,
            };

            let status = match polled {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("Status poll failed, retrying next tick: {}", e);
                    continue;
                }
            };
            tracing::debug!(
                "Polled status {:?} progress={:?} message={:?}",
                status.status,
                status.progress,
                status.message
            );

            if status.is_failure() {
                token.cancel();
                let error = status
                    .message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| FAILED_MESSAGE.to_string());
                tracing::warn!("Backend reported failure: {}", error);
                self.sink.fail(error);
                return PollExit::Failed;
            }

            if status.status == JobStatus::Idle {
                continue;
            }

            self.sink.apply(&status);

            if status.is_completion() {
                token.cancel();
                if !self.sink.begin_finishing() {
                    return PollExit::Cancelled;
                }
                tracing::info!("Automation reported complete, finishing in {:?}", self.grace);
                tokio::time::sleep(self.grace).await;
                self.sink.complete();
                return PollExit::Completed;
            }
        }
    }
}
