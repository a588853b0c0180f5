//! Command line surface.
//!
//! [`GlobalOptions`] is parsed once and threaded into the connection factory;
//! nothing reads it from global state.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kube::config::Kubeconfig;
use tracing::Level;

use crate::{
	cluster::{ConnectionFactory, ConnectionOverrides, KubeconfigRegistry, StaticRegistry},
	commands::{self, api_resources, api_versions, attach, explain},
	config::{parse_duration, FedctlConfig, CONFIG_ENV},
};

#[derive(Debug, Parser)]
#[command(name = "fedctl")]
#[command(about = "Run kubectl-style commands against a control plane or any of its member clusters", long_about = None)]
#[command(version)]
pub struct Cli {
	#[command(flatten)]
	pub global: GlobalOptions,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
	/// Print the supported API resources on the server
	#[command(long_about = "Print the supported API resources on the server.", after_help = api_resources::EXAMPLES)]
	ApiResources(api_resources::ApiResourcesArgs),

	/// Print the supported API versions on the server, in the form of "group/version"
	#[command(long_about = "Print the supported API versions on the server, in the form of \"group/version\".", after_help = api_versions::EXAMPLES)]
	ApiVersions(api_versions::ApiVersionsArgs),

	/// Get documentation for a resource
	#[command(long_about = explain::LONG_ABOUT, after_help = explain::EXAMPLES)]
	Explain(explain::ExplainArgs),

	/// Attach to a running container in a member cluster
	#[command(long_about = "Attach to a process that is already running inside an existing container.", after_help = attach::EXAMPLES)]
	Attach(attach::AttachArgs),

	/// Generate shell completion scripts
	Completion(commands::completion::CompletionArgs),
}

/// Flags accepted by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalOptions {
	/// Path to the kubeconfig file holding the control plane context
	#[arg(long, global = true, value_name = "PATH")]
	pub kubeconfig: Option<PathBuf>,

	/// Name of the control plane context in the kubeconfig. Defaults to the current context
	#[arg(long, global = true, value_name = "CONTEXT")]
	pub karmada_context: Option<String>,

	/// Path to the fedctl configuration file
	#[arg(long, global = true, env = CONFIG_ENV, value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// If present, the namespace scope for this CLI request
	#[arg(short = 'n', long, global = true)]
	pub namespace: Option<String>,

	/// The length of time to wait before giving up on a single server request, e.g. 30s or 1m. 0 means no timeout
	#[arg(long, global = true, value_parser = parse_duration, value_name = "DURATION")]
	pub request_timeout: Option<Duration>,

	/// Log level (trace, debug, info, warn, error). Takes precedence over RUST_LOG
	#[arg(long, global = true, value_name = "LEVEL")]
	pub log_level: Option<Level>,
}

impl GlobalOptions {
	/// Load the configuration file, if any.
	pub fn load_config(&self) -> Result<FedctlConfig> {
		match &self.config {
			Some(path) => Ok(FedctlConfig::load_from_file(path)?),
			None => Ok(FedctlConfig::default()),
		}
	}

	/// Read the kubeconfig named by `--kubeconfig`, or the default one.
	///
	/// An explicit path must exist. Without one, a missing kubeconfig is
	/// tolerated so that members reached directly keep working.
	pub fn load_kubeconfig(&self) -> Result<Kubeconfig> {
		if let Some(path) = &self.kubeconfig {
			return Kubeconfig::read_from(path)
				.with_context(|| format!("failed to read kubeconfig {}", path.display()));
		}
		match Kubeconfig::read() {
			Ok(kubeconfig) => Ok(kubeconfig),
			Err(e) => {
				tracing::debug!(error = %e, "no default kubeconfig, continuing without one");
				Ok(Kubeconfig::default())
			}
		}
	}

	/// Build the factory every cluster-aware subcommand resolves through.
	///
	/// Flags take precedence over configuration file values. Members come
	/// from the configuration file when it lists any, from kubeconfig
	/// contexts otherwise.
	pub fn connection_factory(&self) -> Result<ConnectionFactory> {
		let config = self.load_config()?;
		let kubeconfig = self.load_kubeconfig()?;

		let control_plane_context = self
			.karmada_context
			.clone()
			.or_else(|| config.control_plane_context.clone());
		let overrides = ConnectionOverrides {
			namespace: self.namespace.clone(),
			request_timeout: match self.request_timeout {
				Some(timeout) => Some(timeout),
				None => config.request_timeout()?,
			},
		};

		let factory = if config.clusters.is_empty() {
			let registry = KubeconfigRegistry::new(&kubeconfig, control_plane_context.as_deref());
			ConnectionFactory::new(kubeconfig, control_plane_context, registry, overrides)
		} else {
			let registry = StaticRegistry::from_entries(&config.clusters);
			ConnectionFactory::new(kubeconfig, control_plane_context, registry, overrides)
		};
		Ok(factory)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use assert_matches::assert_matches;
	use clap::CommandFactory;
	use indoc::indoc;
	use tempfile::NamedTempFile;

	use super::*;
	use crate::cluster::ClusterSelector;

	#[test]
	fn test_cli_is_consistent() {
		Cli::command().debug_assert();
	}

	#[test]
	fn test_global_flags_after_subcommand() {
		let cli = Cli::try_parse_from([
			"fedctl",
			"api-resources",
			"-C",
			"member1",
			"-n",
			"apps",
			"--request-timeout",
			"30s",
			"--log-level",
			"debug",
		])
		.unwrap();
		assert_eq!(cli.global.namespace.as_deref(), Some("apps"));
		assert_eq!(cli.global.request_timeout, Some(Duration::from_secs(30)));
		assert_eq!(cli.global.log_level, Some(Level::DEBUG));
		assert_matches!(cli.command, Commands::ApiResources(args) if args.cluster.cluster.as_deref() == Some("member1"));
	}

	#[test]
	fn test_attach_arguments() {
		let cli = Cli::try_parse_from([
			"fedctl",
			"attach",
			"rs",
			"nginx",
			"-c",
			"ruby-container",
			"-it",
			"-C",
			"member1",
		])
		.unwrap();
		let Commands::Attach(args) = cli.command else {
			panic!("expected attach");
		};
		assert_eq!(args.args, vec!["rs", "nginx"]);
		assert_eq!(args.options.container.as_deref(), Some("ruby-container"));
		assert!(args.options.stdin);
		assert!(args.options.tty);
		assert_eq!(args.options.pod_running_timeout, Duration::from_secs(60));
	}

	#[test]
	fn test_compound_durations() {
		let cli = Cli::try_parse_from([
			"fedctl",
			"attach",
			"mypod",
			"-C",
			"member1",
			"--pod-running-timeout",
			"1m30s",
			"--request-timeout",
			"500ms",
		])
		.unwrap();
		assert_eq!(cli.global.request_timeout, Some(Duration::from_millis(500)));
		let Commands::Attach(args) = cli.command else {
			panic!("expected attach");
		};
		assert_eq!(args.options.pod_running_timeout, Duration::from_secs(90));
	}

	#[test]
	fn test_invalid_request_timeout() {
		assert!(Cli::try_parse_from(["fedctl", "api-versions", "--request-timeout", "soon"]).is_err());
	}

	#[test]
	fn test_missing_explicit_kubeconfig() {
		let options = GlobalOptions {
			kubeconfig: Some(PathBuf::from("/nonexistent/kubeconfig")),
			..Default::default()
		};
		assert!(options.load_kubeconfig().is_err());
	}

	fn write_file(content: &str) -> NamedTempFile {
		let mut file = NamedTempFile::new().unwrap();
		file.write_all(content.as_bytes()).unwrap();
		file
	}

	#[tokio::test]
	async fn test_flags_beat_config() {
		let config = write_file(indoc! {"
			requestTimeout: 5m
			clusters:
			  - name: member3
			    server: https://10.0.0.3:6443
			    token: secret
			    namespace: apps
		"});
		let kubeconfig = write_file("apiVersion: v1\nkind: Config\n");

		let options = GlobalOptions {
			kubeconfig: Some(kubeconfig.path().to_path_buf()),
			config: Some(config.path().to_path_buf()),
			namespace: Some("override".to_string()),
			request_timeout: Some(Duration::from_secs(3)),
			..Default::default()
		};
		let factory = options.connection_factory().unwrap();
		let connection = factory.resolve(&ClusterSelector::member("member3")).await.unwrap();
		assert_eq!(connection.read_timeout(), Some(Duration::from_secs(3)));
		assert_eq!(connection.default_namespace(), "override");
	}

	#[tokio::test]
	async fn test_config_request_timeout_applies_without_flag() {
		let config = write_file(indoc! {"
			requestTimeout: 5m
			clusters:
			  - name: member3
			    server: https://10.0.0.3:6443
			    namespace: apps
		"});
		let kubeconfig = write_file("apiVersion: v1\nkind: Config\n");

		let options = GlobalOptions {
			kubeconfig: Some(kubeconfig.path().to_path_buf()),
			config: Some(config.path().to_path_buf()),
			..Default::default()
		};
		let factory = options.connection_factory().unwrap();
		let connection = factory.resolve(&ClusterSelector::member("member3")).await.unwrap();
		assert_eq!(connection.read_timeout(), Some(Duration::from_secs(300)));
		assert_eq!(connection.default_namespace(), "apps");
	}
}
