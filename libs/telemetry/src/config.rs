use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub json_logs: bool,
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        let service_name =
            env::var("SERVICE_NAME").unwrap_or_else(|_| default_service_name.to_string());
        let service_version =
            env::var("SERVICE_VERSION").unwrap_or_else(|_| default_service_version.to_string());
        let json_logs = env::var("LOG_FORMAT")
            .map(|v| json_format(&v))
            .unwrap_or(true);

        Self {
            service_name,
            service_version,
            json_logs,
            default_filter: "info".into(),
        }
    }
}

fn json_format(value: &str) -> bool {
    !matches!(value.to_lowercase().as_str(), "text" | "pretty" | "plain")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_human_formats_disable_json() {
        assert!(!json_format("text"));
        assert!(!json_format("Pretty"));
        assert!(!json_format("PLAIN"));
        assert!(json_format("json"));
        assert!(json_format(""));
    }
}
