use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields on the name-change application
pub const TOTAL_FIELDS: u32 = 5;
pub const DEFAULT_CITY: &str = "Ahmedabad";

pub const COMPLETED_MESSAGE: &str = "Application Submitted Successfully";
pub const COMPLETED_DETAILS: &str = "Form automation completed successfully.";
pub const AUTOMATION_TYPE: &str = "automated";
pub const FAILED_MESSAGE: &str = "Automation failed";

/// Failure text that gets the browser setup checklist
pub const REMEDIATION_TRIGGER: &str = "setup browser";
pub const REMEDIATION_STEPS: [&str; 4] = [
    "Make sure Google Chrome is installed on your system",
    "Try restarting the backend server",
    "Check if ChromeDriver is compatible with your Chrome version",
    "Contact support if the issue persists",
];

/// Caller-supplied applicant data. Keys may be camelCase or snake_case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserData(pub Map<String, Value>);

impl UserData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// First non-empty value among `keys`, stringified.
    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.0.get(*key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }
}

impl TryFrom<Value> for UserData {
    type Error = crate::error::PilotError;

    fn try_from(value: Value) -> crate::error::Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(crate::error::PilotError::Validation(format!(
                "User data must be a JSON object, got {}",
                other
            ))),
        }
    }
}

/// Body of the start-automation request. Every field is always a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRequest {
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default)]
    pub service_number: String,
    #[serde(default)]
    pub t_number: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub confirm_email: String,
}

fn default_city() -> String {
    DEFAULT_CITY.to_string()
}

impl AutomationRequest {
    pub fn from_user_data(data: &UserData) -> Self {
        Self {
            city: data.first(&["city"]).unwrap_or_else(default_city),
            service_number: data.first(&["serviceNumber", "service_number"]).unwrap_or_default(),
            t_number: data.first(&["tNumber", "t_number"]).unwrap_or_default(),
            mobile: data.first(&["mobile"]).unwrap_or_default(),
            email: data.first(&["email"]).unwrap_or_default(),
            confirm_email: data.first(&["confirmEmail", "email"]).unwrap_or_default(),
        }
    }

    /// The backend's acceptance rules, checked in order.
    pub fn validation_error(&self) -> Option<&'static str> {
        if self.service_number.trim().is_empty() {
            Some("Service Number is required for Torrent Power automation")
        } else if self.t_number.trim().is_empty() {
            Some("Transaction Number (T No) is required for Torrent Power automation")
        } else if self.mobile.trim().chars().count() < 10 {
            Some("Valid mobile number is required (at least 10 digits)")
        } else if self.email.trim().is_empty() {
            Some("Email address is required for Torrent Power automation")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLog {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Backend job snapshot. Absent fields leave the rendered value unchanged;
/// an absent `success` counts as true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationStatus {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_completed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<StatusLog>>,
}

fn default_success() -> bool {
    true
}

impl Default for AutomationStatus {
    fn default() -> Self {
        Self {
            success: true,
            status: JobStatus::Idle,
            progress: None,
            message: None,
            fields_completed: None,
            logs: None,
        }
    }
}

impl AutomationStatus {
    pub fn is_completion(&self) -> bool {
        self.status == JobStatus::Completed || self.progress.is_some_and(|p| p >= 100)
    }

    /// An explicit failure report from the backend.
    pub fn is_failure(&self) -> bool {
        !self.success || self.status == JobStatus::Failed
    }
}

/// Response to the start-automation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchAck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_filled: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_fields: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReport {
    pub field: String,
    pub status: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub success: bool,
    pub message: String,
    pub automation_type: String,
    pub details: String,
    pub fields_completed: Vec<FieldReport>,
    /// The application was filled but never submitted to the utility.
    pub not_submitted: bool,
}

impl CompletionSummary {
    /// Fixed summary echoing what was sent, not what the backend confirmed.
    pub fn for_request(request: &AutomationRequest) -> Self {
        let field = |name: &str, value: &str| FieldReport {
            field: name.to_string(),
            status: "completed".to_string(),
            value: value.to_string(),
        };
        Self {
            success: true,
            message: COMPLETED_MESSAGE.to_string(),
            automation_type: AUTOMATION_TYPE.to_string(),
            details: COMPLETED_DETAILS.to_string(),
            fields_completed: vec![
                field("City", &request.city),
                field("Service Number", &request.service_number),
                field("T Number", &request.t_number),
                field("Mobile Number", &request.mobile),
                field("Email", &request.email),
            ],
            not_submitted: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl FailureSummary {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: FAILED_MESSAGE.to_string(),
        }
    }

    pub fn needs_remediation(&self) -> bool {
        self.error.contains(REMEDIATION_TRIGGER)
    }
}

/// Terminal outcome of one automation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutomationResult {
    Completed(CompletionSummary),
    Failed(FailureSummary),
}

impl AutomationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AutomationResult::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationUiState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl AutomationUiState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AutomationUiState::Completed | AutomationUiState::Failed)
    }
}

/// Everything a renderer needs to draw the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelSnapshot {
    pub state: AutomationUiState,
    pub progress: u32,
    pub message: String,
    pub fields_completed: u32,
    pub total_fields: u32,
    pub logs: Vec<String>,
    pub result: Option<AutomationResult>,
}

impl Default for PanelSnapshot {
    fn default() -> Self {
        Self {
            state: AutomationUiState::Idle,
            progress: 0,
            message: String::new(),
            fields_completed: 0,
            total_fields: TOTAL_FIELDS,
            logs: Vec::new(),
            result: None,
        }
    }
}

impl PanelSnapshot {
    pub fn show_remediation(&self) -> bool {
        matches!(&self.result, Some(AutomationResult::Failed(f)) if f.needs_remediation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_key_fallbacks() {
        let data = UserData::new()
            .set("service_number", "SN1")
            .set("tNumber", "T9")
            .set("t_number", "ignored")
            .set("mobile", 9998887770u64)
            .set("email", "a@b.com");
        let request = AutomationRequest::from_user_data(&data);

        assert_eq!(request.city, DEFAULT_CITY);
        assert_eq!(request.service_number, "SN1");
        assert_eq!(request.t_number, "T9");
        assert_eq!(request.mobile, "9998887770");
        assert_eq!(request.confirm_email, "a@b.com");
    }

    #[test]
    fn test_request_empty_values_fall_through() {
        let data = UserData::new()
            .set("serviceNumber", "")
            .set("service_number", "SN2")
            .set("city", Value::Null)
            .set("confirmEmail", "c@d.com")
            .set("email", "a@b.com");
        let request = AutomationRequest::from_user_data(&data);
        assert_eq!(request.service_number, "SN2");
        assert_eq!(request.city, DEFAULT_CITY);
        assert_eq!(request.confirm_email, "c@d.com");
        assert_eq!(request.t_number, "");
    }

    #[test]
    fn test_request_serializes_snake_case() {
        let value = serde_json::to_value(AutomationRequest::default()).unwrap();
        for key in ["city", "service_number", "t_number", "mobile", "email", "confirm_email"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_validation_order() {
        let mut request = AutomationRequest::default();
        assert!(request.validation_error().unwrap().starts_with("Service Number"));
        request.service_number = "1".into();
        assert!(request.validation_error().unwrap().contains("T No"));
        request.t_number = "T1".into();
        request.mobile = " 12345 ".into();
        assert!(request.validation_error().unwrap().contains("10 digits"));
        request.mobile = "9998887770".into();
        assert!(request.validation_error().unwrap().starts_with("Email"));
        request.email = "a@b.com".into();
        assert_eq!(request.validation_error(), None);
    }

    #[test]
    fn test_status_decodes_partial_snapshot() {
        let status: AutomationStatus = serde_json::from_value(json!({
            "success": true,
            "status": "running",
            "progress": 40,
        }))
        .unwrap();
        assert_eq!(status.progress, Some(40));
        assert_eq!(status.message, None);
        assert!(!status.is_completion());
        assert!(!status.is_failure());

        let done: AutomationStatus = serde_json::from_value(json!({
            "success": true,
            "status": "running",
            "progress": 100,
            "result": null,
        }))
        .unwrap();
        assert!(done.is_completion());
    }

    #[test]
    fn test_status_success_flag() {
        let bare: AutomationStatus =
            serde_json::from_value(json!({ "status": "running" })).unwrap();
        assert!(bare.success);
        assert!(!bare.is_failure());

        let rejected: AutomationStatus =
            serde_json::from_value(json!({ "success": false, "status": "running" })).unwrap();
        assert!(rejected.is_failure());
    }

    #[test]
    fn test_result_shapes() {
        let request = AutomationRequest {
            city: "Surat".into(),
            ..AutomationRequest::default()
        };
        let summary = CompletionSummary::for_request(&request);
        let done = serde_json::to_value(AutomationResult::Completed(summary)).unwrap();
        assert_eq!(done["fields_completed"].as_array().unwrap().len(), TOTAL_FIELDS as usize);
        assert_eq!(done["fields_completed"][0]["value"], "Surat");
        assert_eq!(done["not_submitted"], true);

        let failed = FailureSummary::new("Could not setup browser");
        assert!(failed.needs_remediation());
        assert!(!FailureSummary::new("timeout").needs_remediation());
    }
}
