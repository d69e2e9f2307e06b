use std::{env, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use thiserror::Error;
use url::Url;

const DEFAULT_STATE_TTL_SECS: u64 = 15 * 60;
const DEFAULT_FILE_REFERENCE_TTL_SECS: u64 = 5 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{field} is not a valid URL: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{field} must be a whole number of seconds, got {value:?}")]
    InvalidDuration { field: &'static str, value: String },
}

/// Immutable bridge configuration. Changes are applied by building a new value and swapping it
/// into a [`ConfigHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Base URL of the remote agent instance.
    pub instance_url: String,
    /// Public base URL under which this bridge is reachable.
    pub site_url: String,
    pub webhook_secret: String,
    pub encryption_secret: String,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    pub state_ttl: Duration,
    pub file_reference_ttl: Duration,
    pub request_timeout: Duration,
    pub bind: String,
    pub disconnect_keyword: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            site_url: String::new(),
            webhook_secret: String::new(),
            encryption_secret: String::new(),
            oauth_client_id: String::new(),
            oauth_client_secret: String::new(),
            state_ttl: Duration::from_secs(DEFAULT_STATE_TTL_SECS),
            file_reference_ttl: Duration::from_secs(DEFAULT_FILE_REFERENCE_TTL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            bind: "0.0.0.0:8095".into(),
            disconnect_keyword: "disconnect".into(),
        }
    }
}

impl BridgeConfig {
    /// Reads the configuration from `VAB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            instance_url: required("VAB_INSTANCE_URL")?,
            site_url: required("VAB_SITE_URL")?,
            webhook_secret: required("VAB_WEBHOOK_SECRET")?,
            encryption_secret: required("VAB_ENCRYPTION_SECRET")?,
            oauth_client_id: required("VAB_OAUTH_CLIENT_ID")?,
            oauth_client_secret: required("VAB_OAUTH_CLIENT_SECRET")?,
            state_ttl: seconds("VAB_STATE_TTL_SECONDS", defaults.state_ttl)?,
            file_reference_ttl: seconds("VAB_FILE_TTL_SECONDS", defaults.file_reference_ttl)?,
            request_timeout: seconds("VAB_REQUEST_TIMEOUT_SECONDS", defaults.request_timeout)?,
            bind: env::var("BIND").unwrap_or(defaults.bind),
            disconnect_keyword: env::var("VAB_DISCONNECT_KEYWORD")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.disconnect_keyword),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_empty = [
            ("instance_url", &self.instance_url),
            ("site_url", &self.site_url),
            ("webhook_secret", &self.webhook_secret),
            ("encryption_secret", &self.encryption_secret),
            ("oauth_client_id", &self.oauth_client_id),
            ("oauth_client_secret", &self.oauth_client_secret),
        ];
        for (field, value) in non_empty {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }
        for (field, value) in [
            ("instance_url", &self.instance_url),
            ("site_url", &self.site_url),
        ] {
            Url::parse(value).map_err(|source| ConfigError::InvalidUrl { field, source })?;
        }
        Ok(())
    }

    /// Joins `path` onto the public site URL.
    pub fn site_path(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.site_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Joins `path` onto the remote agent instance URL.
    pub fn instance_path(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.instance_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn oauth_redirect_url(&self) -> String {
        self.site_path("oauth2/complete")
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn seconds(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidDuration { field: name, value }),
        Err(_) => Ok(default),
    }
}

/// Shared, atomically replaceable configuration snapshot.
///
/// Readers always observe a complete [`BridgeConfig`]; a replacement never mutates the value a
/// reader already holds.
#[derive(Debug)]
pub struct ConfigHandle {
    current: ArcSwap<BridgeConfig>,
}

impl ConfigHandle {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    pub fn snapshot(&self) -> Arc<BridgeConfig> {
        self.current.load_full()
    }

    pub fn replace(&self, config: BridgeConfig) {
        self.current.store(Arc::new(config));
    }
}

pub type SharedConfig = Arc<ConfigHandle>;

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BridgeConfig {
        BridgeConfig {
            instance_url: "https://agent.example".into(),
            site_url: "https://chat.example/plugins/vab/".into(),
            webhook_secret: "hook".into(),
            encryption_secret: "0123456789abcdef0123456789abcdef".into(),
            oauth_client_id: "client".into(),
            oauth_client_secret: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn validate_reports_first_missing_field() {
        let mut config = valid();
        assert!(config.validate().is_ok());
        config.webhook_secret = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("webhook_secret"))
        ));
    }

    #[test]
    fn validate_rejects_bad_urls() {
        let config = BridgeConfig {
            instance_url: "not a url".into(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl {
                field: "instance_url",
                ..
            })
        ));
    }

    #[test]
    fn site_path_normalises_slashes() {
        let config = valid();
        assert_eq!(
            config.site_path("/file/abc"),
            "https://chat.example/plugins/vab/file/abc"
        );
        assert_eq!(
            config.oauth_redirect_url(),
            "https://chat.example/plugins/vab/oauth2/complete"
        );
    }

    #[test]
    fn handle_swaps_whole_snapshots() {
        let handle = ConfigHandle::new(valid());
        let before = handle.snapshot();
        handle.replace(BridgeConfig {
            webhook_secret: "rotated".into(),
            ..valid()
        });
        assert_eq!(before.webhook_secret, "hook");
        assert_eq!(handle.snapshot().webhook_secret, "rotated");
    }
}
