use std::env;
use std::fs;

use anyhow::{anyhow, Context, Result};

use crate::filter::FilterConfig;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_ORIGIN: &str = "https://wordcompass.io";
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://wordcompass.io",
    "https://wordcompass.netlify.app",
    "https://wordcompass.netlify.app/",
];

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub max_bytes: Option<u64>,
    pub keep: usize,
    pub compress: bool,
}

/// How the feedback endpoint derives its quota key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    /// Forwarded-for header, real-ip header, then the socket peer.
    Address,
    /// Every caller shares one counter under this key.
    Fixed(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub upstream_url: String,
    pub upstream_timeout_ms: u64,
    pub allowed_origins: Vec<String>,
    pub default_origin: String,
    pub feedback_limit: u32,
    pub relay_limit: u32,
    pub feedback_identity: IdentityMode,
    pub rate_limit_disabled: bool,
    pub filter_config: FilterConfig,
    pub max_request_bytes: Option<usize>,
    pub feedback_log_file: Option<String>,
    pub rotation: RotationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            upstream_url: DEFAULT_UPSTREAM_URL.to_owned(),
            upstream_timeout_ms: 30_000,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_origin: DEFAULT_ORIGIN.to_owned(),
            feedback_limit: 3,
            relay_limit: 30,
            feedback_identity: IdentityMode::Address,
            rate_limit_disabled: false,
            filter_config: FilterConfig::default(),
            max_request_bytes: None,
            feedback_log_file: None,
            rotation: RotationConfig {
                max_bytes: None,
                keep: 1,
                compress: false,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let filter_config = if let Ok(path) = env::var("WORDGATE_FILTER_RULES") {
            let content = fs::read_to_string(&path).with_context(|| {
                format!(
                    "Failed to read WORDGATE_FILTER_RULES '{}': file unreadable",
                    path
                )
            })?;
            serde_json::from_str::<FilterConfig>(&content).with_context(|| {
                format!(
                    "Failed to parse WORDGATE_FILTER_RULES '{}': invalid JSON rule set",
                    path
                )
            })?
        } else {
            defaults.filter_config
        };

        // An empty secret is treated the same as a missing one.
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let upstream_url = non_empty_var("WORDGATE_UPSTREAM_URL").unwrap_or(defaults.upstream_url);
        let upstream_timeout_ms =
            parse_optional_u64("WORDGATE_UPSTREAM_TIMEOUT_MS")?.unwrap_or(defaults.upstream_timeout_ms);

        let allowed_origins = non_empty_var("WORDGATE_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.allowed_origins);
        let default_origin =
            non_empty_var("WORDGATE_DEFAULT_ORIGIN").unwrap_or(defaults.default_origin);

        let feedback_limit = parse_limit("WORDGATE_FEEDBACK_LIMIT")?.unwrap_or(defaults.feedback_limit);
        let relay_limit = parse_limit("WORDGATE_RELAY_LIMIT")?.unwrap_or(defaults.relay_limit);
        let feedback_identity = match non_empty_var("WORDGATE_FEEDBACK_IDENTITY") {
            None => IdentityMode::Address,
            Some(v) if v.eq_ignore_ascii_case("address") => IdentityMode::Address,
            Some(v) => IdentityMode::Fixed(v),
        };
        let rate_limit_disabled =
            parse_bool_env("WORDGATE_RATE_LIMIT_DISABLED")?.unwrap_or(false);

        let max_request_bytes =
            parse_optional_u64("WORDGATE_MAX_REQUEST_BYTES")?.map(|v| v as usize);
        let feedback_log_file = env::var("FEEDBACK_LOG_FILE").ok();
        let rotation = RotationConfig {
            max_bytes: parse_optional_u64("LOG_MAX_BYTES")?,
            keep: parse_optional_u64("LOG_ROTATE_KEEP")?.unwrap_or(1) as usize,
            compress: parse_bool_env("LOG_ROTATE_COMPRESS")?.unwrap_or(false),
        };

        Ok(Self {
            api_key,
            upstream_url,
            upstream_timeout_ms,
            allowed_origins,
            default_origin,
            feedback_limit,
            relay_limit,
            feedback_identity,
            rate_limit_disabled,
            filter_config,
            max_request_bytes,
            feedback_log_file,
            rotation,
        })
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_limit(var: &str) -> Result<Option<u32>> {
    match parse_optional_u64(var)? {
        Some(0) => Err(anyhow!("{} must be at least 1", var)),
        Some(v) => u32::try_from(v)
            .map(Some)
            .map_err(|_| anyhow!("{} is out of range", var)),
        None => Ok(None),
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const VARS: &[&str] = &[
        "OPENAI_API_KEY",
        "WORDGATE_UPSTREAM_URL",
        "WORDGATE_UPSTREAM_TIMEOUT_MS",
        "WORDGATE_ALLOWED_ORIGINS",
        "WORDGATE_DEFAULT_ORIGIN",
        "WORDGATE_FEEDBACK_LIMIT",
        "WORDGATE_RELAY_LIMIT",
        "WORDGATE_FEEDBACK_IDENTITY",
        "WORDGATE_RATE_LIMIT_DISABLED",
        "WORDGATE_FILTER_RULES",
        "WORDGATE_MAX_REQUEST_BYTES",
        "FEEDBACK_LOG_FILE",
        "LOG_MAX_BYTES",
        "LOG_ROTATE_KEEP",
        "LOG_ROTATE_COMPRESS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn parses_environment_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let cfg = AppConfig::from_env().unwrap();
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.upstream_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(cfg.feedback_limit, 3);
        assert_eq!(cfg.relay_limit, 30);
        assert_eq!(cfg.feedback_identity, IdentityMode::Address);
        assert_eq!(cfg.default_origin, "https://wordcompass.io");
        assert_eq!(cfg.allowed_origins.len(), 3);
        assert!(!cfg.rate_limit_disabled);
        assert_eq!(cfg.rotation.keep, 1);
        assert!(!cfg.filter_config.rules.is_empty());
    }

    #[test]
    fn parses_full_configuration() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let mut temp = NamedTempFile::new().unwrap();
        let rules = serde_json::json!({
            "rules": [
                {"category": "custom", "regex": ["\\bforbidden\\b"]}
            ]
        });
        use std::io::Write;
        write!(temp, "{}", rules).unwrap();

        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("WORDGATE_UPSTREAM_URL", "http://127.0.0.1:9/v1/chat/completions");
        std::env::set_var("WORDGATE_UPSTREAM_TIMEOUT_MS", "1500");
        std::env::set_var("WORDGATE_ALLOWED_ORIGINS", "https://a.test, https://b.test");
        std::env::set_var("WORDGATE_DEFAULT_ORIGIN", "https://a.test");
        std::env::set_var("WORDGATE_FEEDBACK_LIMIT", "5");
        std::env::set_var("WORDGATE_RELAY_LIMIT", "50");
        std::env::set_var("WORDGATE_FEEDBACK_IDENTITY", "test_user");
        std::env::set_var("WORDGATE_RATE_LIMIT_DISABLED", "yes");
        std::env::set_var("WORDGATE_FILTER_RULES", temp.path());
        std::env::set_var("WORDGATE_MAX_REQUEST_BYTES", "4096");
        std::env::set_var("FEEDBACK_LOG_FILE", "/tmp/feedback.log");
        std::env::set_var("LOG_MAX_BYTES", "1024");
        std::env::set_var("LOG_ROTATE_KEEP", "3");
        std::env::set_var("LOG_ROTATE_COMPRESS", "true");

        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.upstream_timeout_ms, 1500);
        assert_eq!(cfg.allowed_origins, vec!["https://a.test", "https://b.test"]);
        assert_eq!(cfg.default_origin, "https://a.test");
        assert_eq!(cfg.feedback_limit, 5);
        assert_eq!(cfg.relay_limit, 50);
        assert_eq!(
            cfg.feedback_identity,
            IdentityMode::Fixed("test_user".into())
        );
        assert!(cfg.rate_limit_disabled);
        assert_eq!(cfg.filter_config.rules.len(), 1);
        assert_eq!(cfg.max_request_bytes, Some(4096));
        assert_eq!(cfg.feedback_log_file.as_deref(), Some("/tmp/feedback.log"));
        assert_eq!(cfg.rotation.max_bytes, Some(1024));
        assert_eq!(cfg.rotation.keep, 3);
        assert!(cfg.rotation.compress);

        clear_env();
    }

    #[test]
    fn rejects_malformed_values() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("WORDGATE_RELAY_LIMIT", "lots");
        assert!(AppConfig::from_env().is_err());
        std::env::set_var("WORDGATE_RELAY_LIMIT", "0");
        assert!(AppConfig::from_env().is_err());
        std::env::remove_var("WORDGATE_RELAY_LIMIT");

        std::env::set_var("WORDGATE_RATE_LIMIT_DISABLED", "maybe");
        assert!(AppConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var("OPENAI_API_KEY", "   ");
        let cfg = AppConfig::from_env().unwrap();
        assert!(cfg.api_key.is_none());
        clear_env();
    }
}
