//! Operator-facing automation panel.
//!
//! `start` spawns the status poller and the launcher side by side. Both report
//! into the shared core, which owns the state machine and publishes a
//! [`PanelSnapshot`] after every change.
//!
//! State is monotonic within an attempt: Idle -> Running -> Completed|Failed.
//! Running has a hidden finishing phase covering the completion grace delay,
//! during which failures and further snapshots are ignored. Only `close`
//! returns the panel to Idle.

use crate::automation::client::AutomationBackend;
use crate::automation::launcher::{failure_message, AutomationLauncher};
use crate::automation::poller::{ProgressSink, StatusPoller};
use crate::automation::schema::{
    AutomationRequest, AutomationResult, AutomationStatus, AutomationUiState, CompletionSummary,
    FailureSummary, PanelSnapshot, UserData, TOTAL_FIELDS,
};
use crate::config::TimingConfig;
use crate::error::{PilotError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const INITIAL_MESSAGE: &str = "Initializing automation...";
pub const INITIAL_LOG: &str = "Preparing to start automation...";

type CompleteCallback = Box<dyn Fn(&AutomationResult) + Send + Sync>;
type CloseCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct PanelCallbacks {
    on_complete: Option<CompleteCallback>,
    on_close: Option<CloseCallback>,
}

impl PanelCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per attempt, on its terminal transition.
    pub fn on_complete(mut self, f: impl Fn(&AutomationResult) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }
}

#[derive(Default)]
struct PanelInner {
    snapshot: PanelSnapshot,
    finishing: bool,
    /// Bumped on start and close; stale tasks carry an old value
    attempt: u64,
    request: Option<AutomationRequest>,
    token: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

struct PanelCore {
    inner: Mutex<PanelInner>,
    snapshots: watch::Sender<PanelSnapshot>,
    callbacks: PanelCallbacks,
}

impl PanelCore {
    fn publish(&self, inner: &PanelInner) {
        self.snapshots.send_replace(inner.snapshot.clone());
    }

    /// Lock and check that `attempt` is still the live, running attempt.
    fn running(&self, attempt: u64) -> Option<parking_lot::MutexGuard<'_, PanelInner>> {
        let inner = self.inner.lock();
        let live = inner.attempt == attempt && inner.snapshot.state == AutomationUiState::Running;
        live.then_some(inner)
    }

    fn notify_terminal(&self, result: &AutomationResult) {
        if let Some(cb) = &self.callbacks.on_complete {
            cb(result);
        }
    }
}

/// The poller and launcher of one attempt report through this.
struct AttemptSink {
    core: Arc<PanelCore>,
    attempt: u64,
}

impl ProgressSink for AttemptSink {
    fn apply(&self, status: &AutomationStatus) {
        let Some(mut inner) = self.core.running(self.attempt) else {
            return;
        };
        if inner.finishing {
            return;
        }

        let snapshot = &mut inner.snapshot;
        if let Some(progress) = status.progress {
            snapshot.progress = progress.min(100);
        }
        if let Some(message) = status.message.as_ref().filter(|m| !m.is_empty()) {
            snapshot.message = message.clone();
        }
        if let Some(fields) = status.fields_completed {
            snapshot.fields_completed = fields.min(TOTAL_FIELDS);
        }
        if let Some(logs) = status.logs.as_ref().filter(|l| !l.is_empty()) {
            snapshot.logs = logs.iter().map(|l| l.message.clone()).collect();
        }
        self.core.publish(&inner);
    }

    fn begin_finishing(&self) -> bool {
        let Some(mut inner) = self.core.running(self.attempt) else {
            return false;
        };
        if inner.finishing {
            return false;
        }
        inner.finishing = true;
        if let Some(token) = &inner.token {
            token.cancel();
        }
        true
    }

    fn complete(&self) {
        let result = {
            let Some(mut inner) = self.core.running(self.attempt) else {
                return;
            };
            if !inner.finishing {
                return;
            }
            let request = inner.request.clone().unwrap_or_default();
            let result = AutomationResult::Completed(CompletionSummary::for_request(&request));
            inner.finishing = false;
            inner.snapshot.state = AutomationUiState::Completed;
            inner.snapshot.progress = 100;
            inner.snapshot.result = Some(result.clone());
            self.core.publish(&inner);
            result
        };
        tracing::info!("Automation completed");
        self.core.notify_terminal(&result);
    }

    fn fail(&self, error: String) {
        let result = {
            let Some(mut inner) = self.core.running(self.attempt) else {
                return;
            };
            if inner.finishing {
                tracing::debug!("Ignoring failure during completion grace: {}", error);
                return;
            }
            if let Some(token) = &inner.token {
                token.cancel();
            }
            let result = AutomationResult::Failed(FailureSummary::new(error.clone()));
            inner.snapshot.state = AutomationUiState::Failed;
            inner.snapshot.message = format!("Failed: {}", error);
            inner.snapshot.result = Some(result.clone());
            self.core.publish(&inner);
            result
        };
        tracing::warn!("Automation failed: {}", error);
        self.core.notify_terminal(&result);
    }
}

pub struct AutomationPanel {
    user_data: UserData,
    backend: Arc<dyn AutomationBackend>,
    timing: TimingConfig,
    core: Arc<PanelCore>,
}

impl AutomationPanel {
    pub fn new(
        user_data: UserData,
        backend: Arc<dyn AutomationBackend>,
        timing: TimingConfig,
        callbacks: PanelCallbacks,
    ) -> Self {
        let (snapshots, _) = watch::channel(PanelSnapshot::default());
        Self {
            user_data,
            backend,
            timing,
            core: Arc::new(PanelCore {
                inner: Mutex::new(PanelInner::default()),
                snapshots,
                callbacks,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PanelSnapshot> {
        self.core.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        self.core.inner.lock().snapshot.clone()
    }

    /// Begin an attempt. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let request = AutomationRequest::from_user_data(&self.user_data);
        let token = CancellationToken::new();

        let attempt = {
            let mut inner = self.core.inner.lock();
            if inner.snapshot.state != AutomationUiState::Idle {
                return Err(PilotError::AlreadyStarted);
            }
            inner.attempt += 1;
            inner.finishing = false;
            inner.request = Some(request.clone());
            inner.token = Some(token.clone());
            inner.snapshot = PanelSnapshot {
                state: AutomationUiState::Running,
                message: INITIAL_MESSAGE.to_string(),
                logs: vec![INITIAL_LOG.to_string()],
                ..PanelSnapshot::default()
            };
            self.core.publish(&inner);
            inner.attempt
        };
        tracing::info!(
            "Starting automation for service number {:?} in {}",
            request.service_number,
            request.city
        );

        let sink = Arc::new(AttemptSink {
            core: self.core.clone(),
            attempt,
        });

        let poller = StatusPoller::new(
            self.backend.clone(),
            sink.clone(),
            self.timing.poll_interval(),
            self.timing.completion_grace(),
        );
        let poll_token = token.clone();
        let poll_task = tokio::spawn(async move {
            let exit = poller.run(poll_token).await;
            tracing::debug!("Status poller exited: {:?}", exit);
        });

        let launcher = AutomationLauncher::new(self.backend.clone());
        let launch_task = tokio::spawn(async move {
            if let Err(e) = launcher.launch(&request).await {
                token.cancel();
                sink.fail(failure_message(&e));
            }
        });

        let mut inner = self.core.inner.lock();
        if inner.attempt == attempt {
            inner.tasks = vec![poll_task, launch_task];
        } else {
            // Closed while spawning.
            poll_task.abort();
            launch_task.abort();
        }
        Ok(())
    }

    /// Stop everything, reset to Idle and notify `on_close`. Safe to call repeatedly.
    pub fn close(&self) {
        self.shutdown();
        if let Some(cb) = &self.core.callbacks.on_close {
            cb();
        }
    }

    fn shutdown(&self) {
        let (token, tasks) = {
            let mut inner = self.core.inner.lock();
            inner.attempt += 1;
            inner.finishing = false;
            inner.request = None;
            inner.snapshot = PanelSnapshot::default();
            self.core.publish(&inner);
            (inner.token.take(), std::mem::take(&mut inner.tasks))
        };
        if let Some(token) = token {
            token.cancel();
        }
        for task in tasks {
            task.abort();
        }
    }

    /// Resolve once the current attempt is terminal. `None` if the panel is
    /// idle or gets closed first.
    pub async fn wait_terminal(&self) -> Option<AutomationResult> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| s.state != AutomationUiState::Running)
            .await
            .ok()?
            .clone();
        if snapshot.state.is_terminal() {
            snapshot.result
        } else {
            None
        }
    }
}

impl Drop for AutomationPanel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
