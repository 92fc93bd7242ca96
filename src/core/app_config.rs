// Application Configuration
// Settings defaults compiled from config.yaml at build time
// Modify config.yaml and rebuild to change these values

use super::settings::{AuthMode, NotificationLevel, RetrySettings, Settings};

// Include the auto-generated config from build.rs
pub mod compiled {
    include!(concat!(env!("OUT_DIR"), "/compiled_config.rs"));
}

fn compiled_auth_mode() -> AuthMode {
    match compiled::AUTH_MODE {
        "ssh" => AuthMode::Ssh,
        _ => AuthMode::Https,
    }
}

fn compiled_notifications() -> NotificationLevel {
    match compiled::NOTIFICATIONS {
        "all" => NotificationLevel::All,
        "none" | "off" => NotificationLevel::None,
        _ => NotificationLevel::Errors,
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: compiled::RETRY_ATTEMPTS,
            base_delay_ms: compiled::RETRY_BASE_DELAY_MS,
            max_requeues: compiled::MAX_REQUEUES,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_name: compiled::REMOTE_NAME.to_string(),
            branch: compiled::BRANCH.to_string(),
            auth_mode: compiled_auth_mode(),
            auto_sync: compiled::AUTO_SYNC,
            auto_push: compiled::AUTO_PUSH,
            commit_template: compiled::COMMIT_TEMPLATE.to_string(),
            debounce_ms: compiled::DEBOUNCE_MS,
            exclude_patterns: compiled::EXCLUDE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            committer_name: None,
            committer_email: None,
            notifications: compiled_notifications(),
            retry: RetrySettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiled_defaults_are_valid() {
        let settings = Settings::default().validated().unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.commit_template.contains("{action}"));
        assert!(settings.retry.attempts >= 1);
    }
}
