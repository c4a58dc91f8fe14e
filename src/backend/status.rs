use crate::automation::schema::{AutomationStatus, JobStatus, StatusLog};
use parking_lot::RwLock;

#[derive(Debug, Clone, Default)]
struct BoardState {
    status: JobStatus,
    progress: u32,
    message: String,
    fields_completed: u32,
    logs: Vec<StatusLog>,
}

/// Progress of the single backend job, read by the status endpoint.
#[derive(Debug, Default)]
pub struct StatusBoard {
    state: RwLock<BoardState>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the job fields and append `log` as a timestamped entry.
    pub fn update(
        &self,
        status: JobStatus,
        progress: u32,
        message: &str,
        fields_completed: u32,
        log: Option<&str>,
    ) {
        let mut state = self.state.write();
        state.status = status;
        state.progress = progress;
        state.message = message.to_string();
        state.fields_completed = fields_completed;
        if let Some(log) = log {
            state.logs.push(StatusLog {
                message: log.to_string(),
                timestamp: Some(chrono::Local::now().to_rfc3339()),
            });
        }
        tracing::info!("Status updated: {:?} - {}% - {}", status, progress, message);
    }

    pub fn fail(&self, message: &str, log: &str) {
        self.update(JobStatus::Failed, 0, message, 0, Some(log));
    }

    pub fn snapshot(&self) -> AutomationStatus {
        let state = self.state.read();
        AutomationStatus {
            success: true,
            status: state.status,
            progress: Some(state.progress),
            message: Some(state.message.clone()),
            fields_completed: Some(state.fields_completed),
            logs: Some(state.logs.clone()),
        }
    }
}
