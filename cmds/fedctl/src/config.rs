//! Configuration file support for fedctl.
//!
//! The file is optional. It names the control plane context, a default
//! request timeout, and the member cluster registry:
//!
//! ```yaml
//! controlPlaneContext: karmada-apiserver
//! requestTimeout: 30s
//! clusters:
//!   # reached through the control plane's cluster proxy
//!   - name: member1
//!   # reached through a kubeconfig context
//!   - name: member2
//!     context: kind-member2
//!   # reached directly
//!   - name: member3
//!     server: https://10.0.0.3:6443
//!     certificateAuthorityData: LS0tLS1CRUdJTi...
//!     token: eyJhbGciOi...
//!     namespace: apps
//! ```

use std::{
	collections::HashSet,
	fs, io,
	path::{Path, PathBuf},
	time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FEDCTL_CONFIG";

/// Errors that can occur while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file {}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to parse config file {}", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml_with_quirks::Error,
	},

	#[error("cluster entry has an empty name")]
	EmptyClusterName,

	#[error("cluster `{0}` is listed more than once")]
	DuplicateCluster(String),

	#[error("cluster `{0}` sets both `context` and `server`; pick one")]
	AmbiguousEndpoint(String),

	#[error("invalid requestTimeout")]
	RequestTimeout(#[source] DurationError),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FedctlConfig {
	/// Kubeconfig context of the control plane. Defaults to the current context.
	#[serde(default)]
	pub control_plane_context: Option<String>,

	/// Default for `--request-timeout`, e.g. `30s`.
	#[serde(default)]
	pub request_timeout: Option<String>,

	/// Registered member clusters. When empty, kubeconfig contexts are used.
	#[serde(default)]
	pub clusters: Vec<ClusterEntry>,
}

/// One registered member cluster.
///
/// With `context` the cluster is reached through that kubeconfig context; with
/// `server` it is reached directly; with neither it is reached through the
/// control plane's cluster proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterEntry {
	pub name: String,
	#[serde(default)]
	pub context: Option<String>,
	#[serde(default)]
	pub server: Option<String>,
	#[serde(default)]
	pub certificate_authority_data: Option<String>,
	#[serde(default)]
	pub insecure_skip_tls_verify: bool,
	#[serde(default)]
	pub token: Option<String>,
	#[serde(default)]
	pub namespace: Option<String>,
}

impl FedctlConfig {
	/// Load and validate config from a specific file path.
	pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let config: FedctlConfig =
			serde_yaml_with_quirks::from_str(&content).map_err(|source| ConfigError::Parse {
				path: path.to_path_buf(),
				source,
			})?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		let mut seen = HashSet::new();
		for entry in &self.clusters {
			if entry.name.is_empty() {
				return Err(ConfigError::EmptyClusterName);
			}
			if !seen.insert(entry.name.as_str()) {
				return Err(ConfigError::DuplicateCluster(entry.name.clone()));
			}
			if entry.context.is_some() && entry.server.is_some() {
				return Err(ConfigError::AmbiguousEndpoint(entry.name.clone()));
			}
		}
		self.request_timeout()?;
		Ok(())
	}

	pub fn request_timeout(&self) -> Result<Option<Duration>, ConfigError> {
		self.request_timeout
			.as_deref()
			.map(parse_duration)
			.transpose()
			.map_err(ConfigError::RequestTimeout)
	}
}

/// Errors from [`parse_duration`].
#[derive(Debug, Clone, Error)]
pub enum DurationError {
	#[error("duration is empty")]
	Empty,

	#[error("invalid duration `{value}`")]
	Invalid {
		value: String,
		#[source]
		source: humantime::DurationError,
	},
}

/// Parse `0`, bare seconds, or a duration such as `30s`, `1m30s` or `500ms`.
pub fn parse_duration(value: &str) -> Result<Duration, DurationError> {
	let value = value.trim();
	if value.is_empty() {
		return Err(DurationError::Empty);
	}
	if let Ok(seconds) = value.parse::<u64>() {
		return Ok(Duration::from_secs(seconds));
	}
	humantime::parse_duration(value).map_err(|source| DurationError::Invalid {
		value: value.to_string(),
		source,
	})
}
