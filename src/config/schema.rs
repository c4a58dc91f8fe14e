use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PilotConfig {
    /// Portal the page engine is allowed to act on
    #[serde(default)]
    pub portal: PortalConfig,

    /// Settle, dismissal and polling delays
    #[serde(default)]
    pub timing: TimingConfig,

    /// Automation backend endpoints
    #[serde(default)]
    pub backend: BackendConfig,

    /// Chrome used by the page watcher and the form job
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Name-change form job settings
    #[serde(default)]
    pub form: FormConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalConfig {
    /// Exact hostname the engine activates on
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Page opened by `watch --open` when no URL is given
    #[serde(default = "default_start_url")]
    pub start_url: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            start_url: default_start_url(),
        }
    }
}

/// All delays are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_login_settle")]
    pub login_settle_ms: u64,

    #[serde(default = "default_select_user_settle")]
    pub select_user_settle_ms: u64,

    #[serde(default = "default_notification")]
    pub notification_dismiss_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_completion_grace")]
    pub completion_grace_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            login_settle_ms: default_login_settle(),
            select_user_settle_ms: default_select_user_settle(),
            notification_dismiss_ms: default_notification(),
            poll_interval_ms: default_poll_interval(),
            completion_grace_ms: default_completion_grace(),
        }
    }
}

impl TimingConfig {
    pub fn login_settle(&self) -> Duration {
        Duration::from_millis(self.login_settle_ms)
    }

    pub fn select_user_settle(&self) -> Duration {
        Duration::from_millis(self.select_user_settle_ms)
    }

    pub fn notification_dismiss(&self) -> Duration {
        Duration::from_millis(self.notification_dismiss_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// API root, e.g. "http://127.0.0.1:8000/api"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every backend request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Listen address for `portalpilot-backend`
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserConfig {
    /// Chrome executable path
    #[serde(default = "default_chrome_path")]
    pub chrome_path: PathBuf,

    /// Remote debugging port to attach to or launch on
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    #[serde(default)]
    pub headless: bool,

    /// Dedicated profile directory for launched Chrome instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: default_chrome_path(),
            cdp_port: default_cdp_port(),
            headless: false,
            user_data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormConfig {
    #[serde(default = "default_name_change_url")]
    pub name_change_url: String,

    /// How long to wait for the form element after navigation
    #[serde(default = "default_form_wait")]
    pub form_wait_ms: u64,

    /// Pause between field checkpoints
    #[serde(default = "default_field_pause")]
    pub field_pause_ms: u64,

    /// How long the filled form stays open before the browser closes
    #[serde(default = "default_review_hold")]
    pub review_hold_ms: u64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            name_change_url: default_name_change_url(),
            form_wait_ms: default_form_wait(),
            field_pause_ms: default_field_pause(),
            review_hold_ms: default_review_hold(),
        }
    }
}

fn default_hostname() -> String {
    "portal.guvnl.in".to_string()
}

fn default_start_url() -> String {
    "https://portal.guvnl.in/login.php".to_string()
}

fn default_login_settle() -> u64 {
    2000
}

fn default_select_user_settle() -> u64 {
    1500
}

fn default_notification() -> u64 {
    5000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_completion_grace() -> u64 {
    1000
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_cdp_port() -> u16 {
    9222
}

fn default_name_change_url() -> String {
    "https://connect.torrentpower.com/tplcp/application/namechangerequest".to_string()
}

fn default_form_wait() -> u64 {
    20_000
}

fn default_field_pause() -> u64 {
    500
}

fn default_review_hold() -> u64 {
    3000
}

/// Get default Chrome path based on platform
fn default_chrome_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from("C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe")
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        PathBuf::from("/usr/bin/google-chrome")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: PilotConfig = toml::from_str(
            r#"
            [timing]
            poll_interval_ms = 250

            [backend]
            base_url = "http://10.0.0.5:9000/api"
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.poll_interval_ms, 250);
        assert_eq!(config.timing.login_settle_ms, 2000);
        assert_eq!(config.backend.base_url, "http://10.0.0.5:9000/api");
        assert_eq!(config.portal.hostname, "portal.guvnl.in");
        assert_eq!(config.browser.cdp_port, 9222);
    }

    #[test]
    fn test_timing_durations() {
        let timing = TimingConfig::default();
        assert_eq!(timing.select_user_settle(), Duration::from_millis(1500));
        assert_eq!(timing.notification_dismiss(), Duration::from_secs(5));
        assert_eq!(timing.completion_grace(), Duration::from_secs(1));
    }
}
