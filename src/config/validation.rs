use crate::config::schema::PilotConfig;
use crate::error::{PilotError, Result};

/// Validate a loaded configuration before anything is started with it
pub fn validate_config(config: &PilotConfig) -> Result<()> {
    let hostname = config.portal.hostname.trim();
    if hostname.is_empty() {
        return Err(PilotError::Validation(
            "Portal hostname cannot be empty".to_string(),
        ));
    }
    if hostname.contains('/') || hostname.contains(':') {
        return Err(PilotError::Validation(format!(
            "Portal hostname must be a bare host, got {}",
            hostname
        )));
    }

    validate_http_url("portal.start_url", &config.portal.start_url)?;
    validate_http_url("backend.base_url", &config.backend.base_url)?;
    validate_http_url("form.name_change_url", &config.form.name_change_url)?;

    let timing = &config.timing;
    for (name, value) in [
        ("timing.login_settle_ms", timing.login_settle_ms),
        ("timing.select_user_settle_ms", timing.select_user_settle_ms),
        ("timing.notification_dismiss_ms", timing.notification_dismiss_ms),
        ("timing.poll_interval_ms", timing.poll_interval_ms),
        ("timing.completion_grace_ms", timing.completion_grace_ms),
    ] {
        if value == 0 {
            return Err(PilotError::Validation(format!("{} must be greater than 0", name)));
        }
    }

    if config.backend.request_timeout_secs == 0 {
        return Err(PilotError::Validation(
            "backend.request_timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.browser.cdp_port < 1024 {
        return Err(PilotError::Validation(format!(
            "browser.cdp_port {} is a privileged port",
            config.browser.cdp_port
        )));
    }

    Ok(())
}

fn validate_http_url(name: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value).map_err(|e| {
        PilotError::Validation(format!("{} is not a valid URL ({}): {}", name, value, e))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PilotError::Validation(format!(
            "{} must use http:// or https://, got {}://",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&PilotConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_hostname_with_scheme() {
        let mut config = PilotConfig::default();
        config.portal.hostname = "https://portal.guvnl.in".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let mut config = PilotConfig::default();
        config.timing.poll_interval_ms = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_rejects_non_http_backend() {
        let mut config = PilotConfig::default();
        config.backend.base_url = "ftp://example.com/api".to_string();
        assert!(validate_config(&config).is_err());
    }
}
