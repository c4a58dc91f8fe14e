//! End-to-end tests for the automation panel.
//! A scripted backend stands in for the HTTP service; time is paused.

use async_trait::async_trait;
use parking_lot::Mutex;
use portalpilot_lib::automation::{
    AutomationBackend, AutomationPanel, AutomationRequest, AutomationResult, AutomationStatus,
    AutomationUiState, LaunchAck, PanelCallbacks, UserData, REMEDIATION_STEPS,
};
use portalpilot_lib::config::TimingConfig;
use portalpilot_lib::error::{PilotError, Result};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

enum Launch {
    Ok,
    Reject(&'static str),
    Hang,
}

struct ScriptedBackend {
    launch: Launch,
    replies: Mutex<VecDeque<AutomationStatus>>,
    polled_at: Mutex<Vec<Instant>>,
    started: Mutex<Vec<AutomationRequest>>,
}

impl ScriptedBackend {
    fn new(launch: Launch, replies: Vec<serde_json::Value>) -> Arc<Self> {
        Arc::new(Self {
            launch,
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| serde_json::from_value(r).unwrap())
                    .collect(),
            ),
            polled_at: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
        })
    }

    fn polls(&self) -> usize {
        self.polled_at.lock().len()
    }
}

#[async_trait]
impl AutomationBackend for ScriptedBackend {
    async fn start_automation(&self, request: &AutomationRequest) -> Result<LaunchAck> {
        self.started.lock().push(request.clone());
        match self.launch {
            Launch::Ok => Ok(serde_json::from_value(json!({
                "success": true,
                "message": "Automation started successfully",
            }))
            .unwrap()),
            Launch::Reject(message) => Err(PilotError::Backend(message.to_string())),
            Launch::Hang => std::future::pending().await,
        }
    }

    async fn automation_status(&self) -> Result<AutomationStatus> {
        self.polled_at.lock().push(Instant::now());
        // Once the script runs out, the job just sits there.
        Ok(self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| serde_json::from_value(json!({ "status": "running" })).unwrap()))
    }
}

fn applicant() -> UserData {
    UserData::new()
        .set("city", "Ahmedabad")
        .set("serviceNumber", "123")
        .set("mobile", "999")
        .set("email", "a@b.com")
}

struct Counters {
    completed: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

fn panel(backend: Arc<ScriptedBackend>) -> (AutomationPanel, Counters) {
    let completed = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let callbacks = {
        let completed = completed.clone();
        let closed = closed.clone();
        PanelCallbacks::new()
            .on_complete(move |_| {
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .on_close(move || {
                closed.fetch_add(1, Ordering::SeqCst);
            })
    };
    let panel = AutomationPanel::new(applicant(), backend, TimingConfig::default(), callbacks);
    (panel, Counters { completed, closed })
}

// ---------------------------------------------------------------------------
// Progress and completion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_progress_then_completion() {
    let backend = ScriptedBackend::new(
        Launch::Ok,
        vec![
            json!({
                "status": "running",
                "progress": 40,
                "fields_completed": 2,
                "message": "Filling mobile",
            }),
            json!({ "status": "completed", "progress": 100 }),
        ],
    );
    let (panel, counters) = panel(backend.clone());
    let mut snapshots = panel.subscribe();
    let start = Instant::now();
    panel.start().unwrap();

    let running = snapshots.wait_for(|s| s.progress == 40).await.unwrap().clone();
    assert_eq!(running.state, AutomationUiState::Running);
    assert_eq!(running.fields_completed, 2);
    assert_eq!(running.total_fields, 5);
    assert_eq!(running.message, "Filling mobile");
    // Absent logs keep the initial line.
    assert_eq!(running.logs, vec!["Preparing to start automation..."]);

    let result = panel.wait_terminal().await.unwrap();
    let completion_poll = backend.polled_at.lock()[1];
    assert!(Instant::now() - completion_poll >= Duration::from_millis(1000));
    assert_eq!(completion_poll - start, Duration::from_millis(1000));

    let AutomationResult::Completed(summary) = result else {
        panic!("expected completion, got {:?}", result);
    };
    assert!(summary.not_submitted);
    assert_eq!(summary.fields_completed.len(), 5);
    assert!(summary.fields_completed.iter().all(|f| f.status == "completed"));
    assert_eq!(summary.fields_completed[0].value, "Ahmedabad");
    assert_eq!(summary.fields_completed[1].value, "123");

    let snapshot = panel.snapshot();
    assert_eq!(snapshot.state, AutomationUiState::Completed);
    assert_eq!(snapshot.progress, 100);

    // No polls after completion.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.polls(), 2);
    assert_eq!(counters.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_polls_every_half_second_with_one_in_flight() {
    let backend = ScriptedBackend::new(Launch::Ok, vec![]);
    let (panel, _counters) = panel(backend.clone());
    let start = Instant::now();
    panel.start().unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let offsets: Vec<Duration> = backend.polled_at.lock().iter().map(|t| *t - start).collect();
    assert_eq!(
        offsets,
        vec![
            Duration::from_millis(500),
            Duration::from_millis(1000),
            Duration::from_millis(1500),
            Duration::from_millis(2000),
        ]
    );
    assert_eq!(panel.snapshot().state, AutomationUiState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_logs_replace_wholesale() {
    let backend = ScriptedBackend::new(
        Launch::Ok,
        vec![json!({
            "status": "running",
            "progress": 20,
            "logs": [
                { "message": "Opening Torrent Power portal" },
                { "message": "Configuring Chrome browser" },
            ],
        })],
    );
    let (panel, _counters) = panel(backend);
    let mut snapshots = panel.subscribe();
    panel.start().unwrap();

    let snapshot = snapshots.wait_for(|s| s.progress == 20).await.unwrap().clone();
    assert_eq!(snapshot.logs, vec!["Opening Torrent Power portal", "Configuring Chrome browser"]);
}

#[tokio::test(start_paused = true)]
async fn test_start_is_not_reentrant() {
    let backend = ScriptedBackend::new(Launch::Hang, vec![]);
    let (panel, _counters) = panel(backend.clone());

    panel.start().unwrap();
    assert!(matches!(panel.start(), Err(PilotError::AlreadyStarted)));
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(backend.started.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_still_completes() {
    let backend = ScriptedBackend::new(
        Launch::Ok,
        vec![json!({ "status": "completed", "progress": 100 })],
    );
    let timing = TimingConfig {
        poll_interval_ms: 0,
        completion_grace_ms: 0,
        ..TimingConfig::default()
    };
    let panel = AutomationPanel::new(applicant(), backend.clone(), timing, PanelCallbacks::new());
    panel.start().unwrap();

    let result = panel.wait_terminal().await.unwrap();
    assert!(result.is_success());
    assert_eq!(backend.polls(), 1);
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_launch_rejection_fails_with_remediation() {
    let backend = ScriptedBackend::new(Launch::Reject("Could not setup browser"), vec![]);
    let (panel, counters) = panel(backend.clone());
    panel.start().unwrap();

    let result = panel.wait_terminal().await.unwrap();
    let AutomationResult::Failed(failure) = &result else {
        panic!("expected failure, got {:?}", result);
    };
    assert_eq!(failure.error, "Could not setup browser");
    assert_eq!(failure.message, "Automation failed");

    let snapshot = panel.snapshot();
    assert_eq!(snapshot.state, AutomationUiState::Failed);
    assert!(snapshot.message.contains("Could not setup browser"));
    assert!(snapshot.show_remediation());
    assert_eq!(REMEDIATION_STEPS.len(), 4);

    // Polling stops with the failure.
    let polls = backend.polls();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(backend.polls(), polls);
    assert_eq!(counters.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_report() {
    let backend = ScriptedBackend::new(
        Launch::Ok,
        vec![
            json!({ "status": "running", "progress": 30 }),
            json!({ "success": true, "status": "failed", "message": "Failed to load website" }),
        ],
    );
    let (panel, _counters) = panel(backend);
    panel.start().unwrap();

    let result = panel.wait_terminal().await.unwrap();
    assert!(!result.is_success());
    let snapshot = panel.snapshot();
    assert_eq!(snapshot.message, "Failed: Failed to load website");
    assert!(!snapshot.show_remediation());
}

// ---------------------------------------------------------------------------
// Close
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_close_resets_and_stops_polling() {
    let backend = ScriptedBackend::new(Launch::Hang, vec![]);
    let (panel, counters) = panel(backend.clone());
    panel.start().unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(backend.polls(), 2);

    panel.close();
    let snapshot = panel.snapshot();
    assert_eq!(snapshot.state, AutomationUiState::Idle);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.result.is_none());
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(backend.polls(), 2);
    assert_eq!(counters.completed.load(Ordering::SeqCst), 0);
    assert!(panel.wait_terminal().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_close_during_grace_discards_completion() {
    let backend = ScriptedBackend::new(
        Launch::Ok,
        vec![json!({ "status": "completed", "progress": 100 })],
    );
    let (panel, counters) = panel(backend);
    let mut snapshots = panel.subscribe();
    panel.start().unwrap();

    snapshots.wait_for(|s| s.progress == 100).await.unwrap();
    panel.close();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(panel.snapshot().state, AutomationUiState::Idle);
    assert_eq!(counters.completed.load(Ordering::SeqCst), 0);

    // A fresh attempt can start after close.
    panel.start().unwrap();
    assert_eq!(panel.snapshot().state, AutomationUiState::Running);
}
