//! Client configuration: [`ClientConfig`] and where it lives on disk.
//!
//! The file is camelCase JSON. Every field has a default, so a missing file
//! or a partial one is fine. Resolution order for the path:
//! explicit path, `$XDG_CONFIG_HOME/kf/config.json`, `~/.config/kf/config.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kf_runtime::{WebSocketOptions, endpoint_url};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::session::SessionOptions;

/// Schema version written into new config files.
pub const SCHEMA_VERSION: u32 = 1;

/// Automatic reconnection policy of the transports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectConfig {
	pub enabled: bool,
	pub initial_delay_ms: u64,
	pub max_delay_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			initial_delay_ms: 1000,
			max_delay_ms: 5000,
			max_attempts: None,
		}
	}
}

/// Topic names of the two built-in sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicsConfig {
	/// Namespace-scoped entity updates.
	pub entities: String,
	/// Privileged issue updates.
	pub issues: String,
}

impl Default for TopicsConfig {
	fn default() -> Self {
		Self {
			entities: "shoots".to_string(),
			issues: "journals".to_string(),
		}
	}
}

/// Everything needed to reach the event server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	pub schema: u32,
	/// Origin of the dashboard, e.g. `https://dashboard.example.com`.
	pub url: String,
	/// Path below the origin where topics are served.
	pub path: String,
	pub coalesce_window_ms: u64,
	pub reauth_guard_ms: u64,
	pub connect_timeout_ms: u64,
	pub reconnect: ReconnectConfig,
	pub topics: TopicsConfig,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			schema: SCHEMA_VERSION,
			url: "http://localhost:3030".to_string(),
			path: "/api/events".to_string(),
			coalesce_window_ms: 1000,
			reauth_guard_ms: 1000,
			connect_timeout_ms: 20_000,
			reconnect: ReconnectConfig::default(),
			topics: TopicsConfig::default(),
		}
	}
}

/// Values given on the command line, applied over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
	pub url: Option<String>,
	pub path: Option<String>,
	pub coalesce_window_ms: Option<u64>,
	pub no_reconnect: bool,
}

impl ClientConfig {
	/// Default location of the config file.
	pub fn default_path() -> PathBuf {
		let config_home = std::env::var_os("XDG_CONFIG_HOME")
			.map(PathBuf::from)
			.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
			.unwrap_or_else(|| PathBuf::from("."));
		config_home.join("kf").join("config.json")
	}

	/// Loads from `path`, or from [`default_path`](Self::default_path).
	///
	/// A missing file yields the defaults; an unreadable or malformed one is
	/// an error.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let path = path.map_or_else(Self::default_path, Path::to_path_buf);
		let content = match fs::read_to_string(&path) {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(target = "kf.config", path = %path.display(), "no config file, using defaults");
				return Ok(Self::default());
			}
			Err(source) => return Err(Error::ConfigRead { path, source }),
		};
		serde_json::from_str(&content).map_err(|source| Error::ConfigParse { path, source })
	}

	/// Writes the config as pretty JSON, creating parent directories.
	pub fn save(&self, path: &Path) -> Result<()> {
		let io_error = |source| Error::ConfigRead {
			path: path.to_path_buf(),
			source,
		};
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).map_err(io_error)?;
		}
		let json = serde_json::to_string_pretty(self).map_err(|source| Error::ConfigParse {
			path: path.to_path_buf(),
			source,
		})?;
		fs::write(path, json).map_err(io_error)
	}

	pub fn apply(&mut self, overrides: &ConfigOverrides) {
		if let Some(url) = &overrides.url {
			self.url.clone_from(url);
		}
		if let Some(path) = &overrides.path {
			self.path.clone_from(path);
		}
		if let Some(window) = overrides.coalesce_window_ms {
			self.coalesce_window_ms = window;
		}
		if overrides.no_reconnect {
			self.reconnect.enabled = false;
		}
	}

	/// Rejects configurations no session could run with.
	pub fn validate(&self) -> Result<()> {
		let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
		if self.url.trim().is_empty() {
			return invalid("url must not be empty");
		}
		if self.coalesce_window_ms == 0 {
			return invalid("coalesceWindowMs must be greater than zero");
		}
		if self.reauth_guard_ms == 0 {
			return invalid("reauthGuardMs must be greater than zero");
		}
		if self.connect_timeout_ms == 0 {
			return invalid("connectTimeoutMs must be greater than zero");
		}
		if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
			return invalid("reconnect.initialDelayMs exceeds reconnect.maxDelayMs");
		}
		if self.topics.entities.is_empty() || self.topics.issues.is_empty() {
			return invalid("topic names must not be empty");
		}
		if self.topics.entities == self.topics.issues {
			return invalid("topics must be distinct");
		}
		self.endpoint(&self.topics.entities)?;
		Ok(())
	}

	/// Socket URL of `topic`.
	pub fn endpoint(&self, topic: &str) -> Result<Url> {
		Ok(endpoint_url(&self.url, &self.path, topic)?)
	}

	pub fn session_options(&self) -> SessionOptions {
		SessionOptions {
			coalesce_window: Duration::from_millis(self.coalesce_window_ms),
			reauth_guard: Duration::from_millis(self.reauth_guard_ms),
			..SessionOptions::default()
		}
	}

	pub fn websocket_options(&self) -> WebSocketOptions {
		WebSocketOptions {
			reconnection: self.reconnect.enabled,
			initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
			max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
			max_attempts: self.reconnect.max_attempts,
			connect_timeout: Duration::from_millis(self.connect_timeout_ms),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn defaults_match_the_documented_values() {
		let config = ClientConfig::default();
		assert_eq!(config.path, "/api/events");
		assert_eq!(config.coalesce_window_ms, 1000);
		assert_eq!(config.reauth_guard_ms, 1000);
		assert_eq!(config.connect_timeout_ms, 20_000);
		assert_eq!(config.topics.entities, "shoots");
		assert_eq!(config.topics.issues, "journals");
		assert!(config.validate().is_ok());
	}

	#[test]
	fn partial_file_fills_in_defaults() {
		let config: ClientConfig = serde_json::from_value(json!({
			"url": "https://dash.example.com",
			"reconnect": {"maxAttempts": 3},
		}))
		.unwrap();
		assert_eq!(config.url, "https://dash.example.com");
		assert_eq!(config.reconnect.max_attempts, Some(3));
		assert!(config.reconnect.enabled);
		assert_eq!(config.reconnect.max_delay_ms, 5000);
		assert_eq!(config.coalesce_window_ms, 1000);
	}

	#[test]
	fn missing_file_means_defaults() {
		let tmp = TempDir::new().unwrap();
		let config = ClientConfig::load(Some(&tmp.path().join("absent.json"))).unwrap();
		assert_eq!(config, ClientConfig::default());
	}

	#[test]
	fn malformed_file_is_an_error() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, "{ not json").unwrap();
		let err = ClientConfig::load(Some(&path)).unwrap_err();
		assert!(matches!(err, Error::ConfigParse { .. }));
	}

	#[test]
	fn save_then_load() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("nested/kf/config.json");
		let mut config = ClientConfig::default();
		config.url = "https://dash.example.com".into();
		config.reconnect.max_attempts = Some(10);
		config.save(&path).unwrap();
		assert_eq!(ClientConfig::load(Some(&path)).unwrap(), config);
	}

	#[test]
	fn overrides_win_over_file() {
		let mut config = ClientConfig::default();
		config.apply(&ConfigOverrides {
			url: Some("https://other.example.com".into()),
			coalesce_window_ms: Some(250),
			no_reconnect: true,
			..ConfigOverrides::default()
		});
		assert_eq!(config.url, "https://other.example.com");
		assert_eq!(config.path, "/api/events");
		assert_eq!(config.session_options().coalesce_window, Duration::from_millis(250));
		assert!(!config.websocket_options().reconnection);
	}

	#[test]
	fn validation_rejects_unusable_values() {
		let mut config = ClientConfig::default();
		config.coalesce_window_ms = 0;
		assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

		let mut config = ClientConfig::default();
		config.url = " ".into();
		assert!(config.validate().is_err());

		let mut config = ClientConfig::default();
		config.topics.issues = "shoots".into();
		assert!(config.validate().is_err());

		let mut config = ClientConfig::default();
		config.url = "ftp://example.com".into();
		assert!(matches!(config.validate(), Err(Error::Runtime(_))));
	}

	#[test]
	fn endpoint_joins_path_and_topic() {
		let mut config = ClientConfig::default();
		config.url = "https://dash.example.com".into();
		assert_eq!(
			config.endpoint("journals").unwrap().as_str(),
			"wss://dash.example.com/api/events/journals"
		);
	}
}
