// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Monitor configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! event_enabled = true
//! store_stacktrace = true
//! store_ip = false
//! store_cookies = true
//! store_post = false
//! silenced_policy = "discard"
//! ```

use crate::context::PrivacyOptions;
use crate::error::{ApmError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// What the dispatcher does with events raised inside a suppression block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SilencedPolicy {
    /// Forward them, flagged as silenced, and let drivers decide.
    #[default]
    Forward,
    /// Drop them before any capture work.
    Discard,
}

impl FromStr for SilencedPolicy {
    type Err = ApmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(SilencedPolicy::Forward),
            "discard" => Ok(SilencedPolicy::Discard),
            other => Err(ApmError::InvalidValue {
                key: "silenced_policy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Configuration consumed by the monitor. Every switch defaults to on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApmConfig {
    /// Master switch for error and exception capture.
    #[serde(default = "default_true")]
    pub event_enabled: bool,

    /// Attach a stack trace to every captured event.
    #[serde(default = "default_true")]
    pub store_stacktrace: bool,

    #[serde(default = "default_true")]
    pub store_ip: bool,

    #[serde(default = "default_true")]
    pub store_cookies: bool,

    #[serde(default = "default_true")]
    pub store_post: bool,

    #[serde(default)]
    pub silenced_policy: SilencedPolicy,
}

fn default_true() -> bool {
    true
}

impl Default for ApmConfig {
    fn default() -> Self {
        Self {
            event_enabled: true,
            store_stacktrace: true,
            store_ip: true,
            store_cookies: true,
            store_post: true,
            silenced_policy: SilencedPolicy::Forward,
        }
    }
}

impl ApmConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&contents),
            Some("json") => Self::from_json(&contents),
            other => Err(ApmError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Defaults overridden by `APM_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let silenced_policy = match env::var("APM_SILENCED_POLICY") {
            Ok(policy) => policy.parse()?,
            Err(_) => defaults.silenced_policy,
        };

        Ok(Self {
            event_enabled: env_flag("APM_EVENT_ENABLED", defaults.event_enabled)?,
            store_stacktrace: env_flag("APM_STORE_STACKTRACE", defaults.store_stacktrace)?,
            store_ip: env_flag("APM_STORE_IP", defaults.store_ip)?,
            store_cookies: env_flag("APM_STORE_COOKIES", defaults.store_cookies)?,
            store_post: env_flag("APM_STORE_POST", defaults.store_post)?,
            silenced_policy,
        })
    }

    pub fn with_event_enabled(mut self, enabled: bool) -> Self {
        self.event_enabled = enabled;
        self
    }

    pub fn with_store_stacktrace(mut self, store: bool) -> Self {
        self.store_stacktrace = store;
        self
    }

    pub fn with_privacy(mut self, privacy: PrivacyOptions) -> Self {
        self.store_ip = privacy.store_ip;
        self.store_cookies = privacy.store_cookies;
        self.store_post = privacy.store_post;
        self
    }

    pub fn with_silenced_policy(mut self, policy: SilencedPolicy) -> Self {
        self.silenced_policy = policy;
        self
    }

    pub fn privacy(&self) -> PrivacyOptions {
        PrivacyOptions {
            store_ip: self.store_ip,
            store_cookies: self.store_cookies,
            store_post: self.store_post,
        }
    }
}

fn env_flag(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(value) => parse_flag(&value).ok_or_else(|| ApmError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ApmConfig::default();
        assert!(config.event_enabled);
        assert!(config.store_stacktrace);
        assert_eq!(config.privacy(), PrivacyOptions::default());
        assert_eq!(config.silenced_policy, SilencedPolicy::Forward);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ApmConfig::from_toml(
            r#"
            store_ip = false
            silenced_policy = "discard"
            "#,
        )
        .unwrap();
        assert!(config.event_enabled);
        assert!(!config.store_ip);
        assert!(config.store_cookies);
        assert_eq!(config.silenced_policy, SilencedPolicy::Discard);
    }

    #[test]
    fn test_from_json() {
        let config = ApmConfig::from_json(r#"{"event_enabled": false}"#).unwrap();
        assert!(!config.event_enabled);
        assert!(ApmConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "store_stacktrace = false").unwrap();

        let config = ApmConfig::from_file(file.path()).unwrap();
        assert!(!config.store_stacktrace);

        let other = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            ApmConfig::from_file(other.path()),
            Err(ApmError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_from_env() {
        env::set_var("APM_STORE_POST", "off");
        env::set_var("APM_SILENCED_POLICY", "Discard");
        let config = ApmConfig::from_env().unwrap();
        assert!(!config.store_post);
        assert_eq!(config.silenced_policy, SilencedPolicy::Discard);

        env::set_var("APM_STORE_POST", "maybe");
        assert!(ApmConfig::from_env().is_err());

        env::remove_var("APM_STORE_POST");
        env::remove_var("APM_SILENCED_POLICY");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("On"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("sometimes"), None);
    }
}
