//! Process configuration, constructed once at startup from environment
//! variables (plus a best-effort `.env` load before parsing). No
//! process-wide mutable globals: one `Config` is built in `main` and
//! threaded through the orchestrator, scheduler and reporter.

use std::env;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_INPUT_COST_PER_MILLION, DEFAULT_ORACLE_MAX_TOKENS,
    DEFAULT_ORACLE_MODEL, DEFAULT_ORACLE_TEMPERATURE, DEFAULT_ORACLE_TIMEOUT_SECS,
    DEFAULT_OUTPUT_COST_PER_MILLION,
};
use crate::error::{KaiError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub use_tls: bool,
    pub use_ssl: bool,
    pub recipients: Vec<String>,
    pub from: String,
    pub reply_to: Option<String>,
    pub notify_on_no_changes: bool,
    pub notify_on_errors_only: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Raw interval specifier, e.g. `"1d"`, `"12h"`, `"2w"`, `"1mo"`.
    pub interval: String,
    /// Wall-clock activation time, `HH:MM`.
    pub start_time: String,
    /// IANA timezone name (default `"UTC"`).
    pub timezone: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub radarr_url: String,
    #[serde(skip_serializing)]
    pub radarr_api_key: String,

    #[serde(skip_serializing)]
    pub claude_api_key: String,
    pub claude_model: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    pub oracle_temperature: f64,
    pub oracle_max_tokens: u32,
    pub oracle_timeout_secs: u64,

    pub debug_logging: bool,

    pub smtp: Option<SmtpConfig>,
    pub schedule: Option<ScheduleConfig>,

    pub batch_size: usize,
    pub fix_tags: bool,

    pub rubric_dir: String,
    pub state_dir: String,
}

impl Config {
    /// Load from the process environment (after a best-effort `.env`
    /// load), applying defaults and validating the credentials that are
    /// fatal if missing.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env_map(&env::vars().collect())
    }

    /// Testable variant that reads from a supplied map instead of the
    /// real environment.
    pub fn from_env_map(vars: &std::collections::HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|s| s.as_str());
        let require = |key: &str| -> Result<String> {
            get(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| KaiError::Config(format!("missing required environment variable {key}")))
        };

        let radarr_url = require("RADARR_URL")?;
        let radarr_api_key = require("RADARR_API_KEY")?;
        let claude_api_key = require("CLAUDE_API_KEY")?;

        let claude_model = get("CLAUDE_MODEL").unwrap_or(DEFAULT_ORACLE_MODEL).to_string();
        let debug_logging = parse_bool(get("DEBUG_LOGGING")).unwrap_or(false);
        let batch_size = get("BATCH_SIZE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE);
        let fix_tags = parse_bool(get("KOMETA_FIX_TAGS")).unwrap_or(false);

        let smtp = if get("SMTP_SERVER").is_some() {
            Some(SmtpConfig {
                server: require("SMTP_SERVER")?,
                port: get("SMTP_PORT").and_then(|v| v.parse().ok()).unwrap_or(587),
                username: get("SMTP_USERNAME").map(str::to_string),
                password: get("SMTP_PASSWORD").map(str::to_string),
                use_tls: parse_bool(get("SMTP_USE_TLS")).unwrap_or(true),
                use_ssl: parse_bool(get("SMTP_USE_SSL")).unwrap_or(false),
                recipients: get("NOTIFICATION_RECIPIENTS")
                    .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                    .unwrap_or_default(),
                from: get("NOTIFICATION_FROM").unwrap_or("kometa-ai@localhost").to_string(),
                reply_to: get("NOTIFICATION_REPLY_TO").map(str::to_string),
                notify_on_no_changes: parse_bool(get("NOTIFY_ON_NO_CHANGES")).unwrap_or(false),
                notify_on_errors_only: parse_bool(get("NOTIFY_ON_ERRORS_ONLY")).unwrap_or(false),
            })
        } else {
            None
        };

        let schedule = get("SCHEDULE_INTERVAL").map(|interval| ScheduleConfig {
            interval: interval.to_string(),
            start_time: get("SCHEDULE_START_TIME").unwrap_or("03:00").to_string(),
            timezone: get("TZ").unwrap_or("UTC").to_string(),
        });

        Ok(Config {
            radarr_url,
            radarr_api_key,
            claude_api_key,
            claude_model,
            input_cost_per_million: DEFAULT_INPUT_COST_PER_MILLION,
            output_cost_per_million: DEFAULT_OUTPUT_COST_PER_MILLION,
            oracle_temperature: DEFAULT_ORACLE_TEMPERATURE,
            oracle_max_tokens: DEFAULT_ORACLE_MAX_TOKENS,
            oracle_timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
            debug_logging,
            smtp,
            schedule,
            batch_size,
            fix_tags,
            rubric_dir: get("KOMETA_RUBRIC_DIR").unwrap_or("config").to_string(),
            state_dir: get("KOMETA_STATE_DIR").unwrap_or("state").to_string(),
        })
    }

    /// Pretty-printed, secret-redacted JSON for `--dump-config`.
    pub fn dump(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn parse_bool(value: Option<&str>) -> Option<bool> {
    value.map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("RADARR_URL".into(), "http://radarr.local".into());
        m.insert("RADARR_API_KEY".into(), "rk".into());
        m.insert("CLAUDE_API_KEY".into(), "ck".into());
        m
    }

    #[test]
    fn missing_required_var_is_fatal() {
        let mut vars = base_vars();
        vars.remove("CLAUDE_API_KEY");
        let err = Config::from_env_map(&vars).unwrap_err();
        assert!(matches!(err, KaiError::Config(_)));
    }

    #[test]
    fn defaults_fill_in_when_unset() {
        let cfg = Config::from_env_map(&base_vars()).unwrap();
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!cfg.fix_tags);
        assert!(cfg.smtp.is_none());
    }

    #[test]
    fn dump_redacts_secrets() {
        let cfg = Config::from_env_map(&base_vars()).unwrap();
        let dumped = cfg.dump();
        assert!(!dumped.contains("ck"));
        assert!(!dumped.contains("rk"));
    }

    #[test]
    fn smtp_recipients_parsed_from_comma_list() {
        let mut vars = base_vars();
        vars.insert("SMTP_SERVER".into(), "smtp.local".into());
        vars.insert("NOTIFICATION_RECIPIENTS".into(), "a@x.com, b@x.com".into());
        let cfg = Config::from_env_map(&vars).unwrap();
        let smtp = cfg.smtp.unwrap();
        assert_eq!(smtp.recipients, vec!["a@x.com", "b@x.com"]);
    }
}
