use crate::automation::client::AutomationBackend;
use crate::automation::schema::{AutomationRequest, LaunchAck};
use crate::error::{PilotError, Result};
use std::sync::Arc;

/// Issues the single start request for an automation attempt.
pub struct AutomationLauncher {
    backend: Arc<dyn AutomationBackend>,
}

impl AutomationLauncher {
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self { backend }
    }

    /// An ack with `success: false` counts as a failed launch.
    pub async fn launch(&self, request: &AutomationRequest) -> Result<LaunchAck> {
        let ack = self.backend.start_automation(request).await?;
        if !ack.success {
            let reason = ack
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| ack.message.clone());
            return Err(PilotError::Launch(reason));
        }
        tracing::info!("Automation started: {}", ack.message);
        Ok(ack)
    }
}

/// The text shown to the operator for a launch error.
pub fn failure_message(error: &PilotError) -> String {
    match error {
        PilotError::Launch(message) | PilotError::Backend(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::schema::AutomationStatus;
    use async_trait::async_trait;

    struct AckBackend(LaunchAck);

    #[async_trait]
    impl AutomationBackend for AckBackend {
        async fn start_automation(&self, _: &AutomationRequest) -> Result<LaunchAck> {
            Ok(self.0.clone())
        }

        async fn automation_status(&self) -> Result<AutomationStatus> {
            Ok(AutomationStatus::default())
        }
    }

    #[tokio::test]
    async fn test_unsuccessful_ack_is_launch_failure() {
        let backend = Arc::new(AckBackend(LaunchAck {
            success: false,
            message: "Failed to start".into(),
            error: Some("Chrome missing".into()),
            ..LaunchAck::default()
        }));
        let err = AutomationLauncher::new(backend)
            .launch(&AutomationRequest::default())
            .await
            .unwrap_err();
        assert_eq!(failure_message(&err), "Chrome missing");
    }

    #[tokio::test]
    async fn test_successful_ack_passes_through() {
        let backend = Arc::new(AckBackend(LaunchAck {
            success: true,
            message: "Automation started successfully".into(),
            ..LaunchAck::default()
        }));
        let ack = AutomationLauncher::new(backend)
            .launch(&AutomationRequest::default())
            .await
            .unwrap();
        assert_eq!(ack.message, "Automation started successfully");
    }
}
