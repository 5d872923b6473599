use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::payload::{PayloadSerializer, DEFAULT_EXCLUDED_FIELDS, MAX_DEPTH, SENSITIVE_FIELDS};
use crate::registry::{StaticRegistry, SubscriberConfig};

pub const CONFIG_PATH_VAR: &str = "WEBFILTER_CONFIG";
pub const TIMEOUT_VAR: &str = "WEBFILTER_TIMEOUT_SECS";
pub const DEFAULT_CONFIG_PATH: &str = "./config/webfilter.toml";

/// TOML-backed configuration: dispatch settings plus the ordered subscriber
/// table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(rename = "subscriber", default)]
    pub subscribers: Vec<SubscriberConfig>,
}

/// Settings the engine is built with. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSettings {
    pub timeout_secs: u64,
    pub max_depth: usize,
    pub excluded_fields: Vec<String>,
    pub sensitive_fields: Vec<String>,
    pub user_agent: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_depth: MAX_DEPTH,
            excluded_fields: DEFAULT_EXCLUDED_FIELDS.iter().map(|s| s.to_string()).collect(),
            sensitive_fields: SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
            user_agent: concat!("webfilter/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DispatchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn serializer(&self) -> PayloadSerializer {
        PayloadSerializer::new(
            self.max_depth,
            self.excluded_fields.iter().cloned(),
            self.sensitive_fields.iter().cloned(),
        )
    }
}

impl FileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FileConfig = toml::from_str(content).context("Failed to parse webfilter config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn registry(&self) -> StaticRegistry {
        StaticRegistry::new(self.subscribers.clone())
    }

    /// Apply a raw `WEBFILTER_TIMEOUT_SECS` value.
    pub fn override_timeout(&mut self, raw: &str) -> Result<()> {
        let secs: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{TIMEOUT_VAR} must be a whole number of seconds, got {raw:?}"))?;
        if secs == 0 {
            bail!("{TIMEOUT_VAR} must be greater than zero");
        }
        self.dispatch.timeout_secs = secs;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch.timeout_secs == 0 {
            bail!("dispatch.timeout_secs must be greater than zero");
        }
        for (i, sub) in self.subscribers.iter().enumerate() {
            if sub.event.trim().is_empty() {
                bail!("subscriber #{} has an empty event name", i + 1);
            }
            let url = url::Url::parse(&sub.webhook_url).with_context(|| {
                format!("subscriber #{} ({}) has an invalid webhook_url", i + 1, sub.event)
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!(
                    "subscriber #{} ({}) webhook_url must be http or https, got {}",
                    i + 1,
                    sub.event,
                    url.scheme()
                );
            }
        }
        Ok(())
    }

    /// Log what was loaded without leaking paths or query strings of the
    /// webhook URLs.
    pub fn log_summary(&self) {
        let mut hosts: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for sub in self.subscribers.iter().filter(|s| s.enabled) {
            let host = url::Url::parse(&sub.webhook_url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| "<invalid>".to_string());
            hosts.entry(sub.event.as_str()).or_default().push(host);
        }

        info!(
            timeout_secs = self.dispatch.timeout_secs,
            max_depth = self.dispatch.max_depth,
            subscribers = self.subscribers.len(),
            "Webfilter config loaded"
        );
        for (event, hosts) in hosts {
            info!(event, count = hosts.len(), hosts = ?hosts, "Subscribers registered");
        }
    }
}

/// Load, env-override and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if let Ok(raw) = std::env::var(TIMEOUT_VAR) {
        config.override_timeout(&raw)?;
    }

    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    config.log_summary();
    Ok(config)
}

/// Config path from `WEBFILTER_CONFIG` (after reading `.env`), or the default.
pub fn config_path_from_env() -> PathBuf {
    dotenvy::dotenv().ok();
    std::env::var(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use webfilter_client::PayloadEncoding;

    const SAMPLE: &str = r#"
[dispatch]
timeout_secs = 3

[[subscriber]]
event = "StudentLoginRequested"
webhook_url = "https://hooks.example.com/login?token=abc"
halt_on_4xx = true
redirect_on_4xx = "/blocked"

[[subscriber]]
event = "StudentLoginRequested"
webhook_url = "http://audit.internal/login"
encoding = "form"
enabled = false
"#;

    #[test]
    fn parses_subscribers_in_file_order() {
        let config = FileConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.dispatch.timeout(), Duration::from_secs(3));
        assert_eq!(config.dispatch.max_depth, MAX_DEPTH);
        assert_eq!(config.subscribers.len(), 2);

        let first = &config.subscribers[0];
        assert!(first.halt_on_4xx);
        assert_eq!(first.redirect_on_4xx.as_deref(), Some("/blocked"));
        assert!(first.enabled);

        let second = &config.subscribers[1];
        assert_eq!(second.encoding, PayloadEncoding::Form);
        assert!(!second.enabled);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = FileConfig::from_toml_str("").unwrap();
        assert_eq!(config.dispatch, DispatchSettings::default());
        assert!(config.subscribers.is_empty());
        assert!(config.dispatch.sensitive_fields.contains(&"password".to_string()));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::from_toml_str("[dispatch]\ntimeout = 3\n").is_err());
        assert!(FileConfig::from_toml_str("[server]\nport = 1\n").is_err());
    }

    #[test]
    fn invalid_urls_are_rejected() {
        let bad = "[[subscriber]]\nevent = \"E\"\nwebhook_url = \"not a url\"\n";
        assert!(FileConfig::from_toml_str(bad).is_err());

        let ftp = "[[subscriber]]\nevent = \"E\"\nwebhook_url = \"ftp://files.example.com\"\n";
        assert!(FileConfig::from_toml_str(ftp).is_err());
    }

    #[test]
    fn timeout_override() {
        let mut config = FileConfig::default();
        config.override_timeout(" 25 ").unwrap();
        assert_eq!(config.dispatch.timeout_secs, 25);
        assert!(config.override_timeout("0").is_err());
        assert!(config.override_timeout("soon").is_err());
    }

    #[test]
    fn serializer_follows_settings() {
        let settings = DispatchSettings {
            max_depth: 2,
            ..DispatchSettings::default()
        };
        assert_eq!(settings.serializer().max_depth(), 2);
    }

    #[test]
    fn load_config_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("webfilter-{}.toml", std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();
        let config = load_config(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(config.unwrap().registry().len(), 2);
    }
}
