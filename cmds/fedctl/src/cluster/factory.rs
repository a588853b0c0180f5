//! Turning a cluster selector into connection parameters.

use std::time::Duration;

use http::Uri;
use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

use super::{
	registry::{ClusterRegistry, MemberCluster, MemberEndpoint},
	ClusterSelector, Target,
};

/// Path under the control plane API that proxies requests to a member.
const CLUSTER_PROXY_PREFIX: &str = "/apis/cluster.karmada.io/v1alpha1/clusters";

/// Errors that can occur while resolving a cluster selector.
#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("cluster `{name}` is not registered{}", known_clusters_hint(.known))]
	UnknownCluster { name: String, known: Vec<String> },

	#[error("failed to build connection configuration for cluster `{cluster}`")]
	ConnectionBuild {
		cluster: String,
		#[source]
		source: BuildError,
	},

	#[error("failed to build control plane connection configuration")]
	ControlPlane(#[source] BuildError),
}

fn known_clusters_hint(known: &[String]) -> String {
	if known.is_empty() {
		String::new()
	} else {
		format!(" (registered clusters: {})", known.join(", "))
	}
}

/// Why a registered target could not be turned into a configuration.
#[derive(Debug, Error)]
pub enum BuildError {
	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error("invalid cluster entry")]
	Entry(#[from] serde_json::Error),

	#[error("invalid cluster proxy URL `{url}`")]
	ProxyUrl {
		url: String,
		#[source]
		source: http::uri::InvalidUri,
	},
}

/// Values from the command line that apply to whichever target is resolved.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
	/// Takes precedence over the member's and the context's namespace.
	pub namespace: Option<String>,
	/// Client read timeout. Zero disables the timeout.
	pub request_timeout: Option<Duration>,
}

/// Everything a command needs to reach exactly one cluster.
///
/// Built once per invocation by [`ConnectionFactory::resolve`] and never
/// modified afterwards.
#[derive(Clone)]
pub struct ConnectionConfig {
	target: Target,
	config: Config,
}

impl std::fmt::Debug for ConnectionConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectionConfig")
			.field("target", &self.target)
			.field("cluster_url", &self.config.cluster_url)
			.field("default_namespace", &self.config.default_namespace)
			.finish_non_exhaustive()
	}
}

impl ConnectionConfig {
	pub fn target(&self) -> &Target {
		&self.target
	}

	pub fn cluster_url(&self) -> &Uri {
		&self.config.cluster_url
	}

	pub fn default_namespace(&self) -> &str {
		&self.config.default_namespace
	}

	pub fn read_timeout(&self) -> Option<Duration> {
		self.config.read_timeout
	}

	/// Create a client for the target. Does not contact the server.
	pub fn client(&self) -> Result<Client, kube::Error> {
		Client::try_from(self.config.clone())
	}
}

/// Resolves cluster selectors against the control plane kubeconfig and a member registry.
pub struct ConnectionFactory {
	kubeconfig: Kubeconfig,
	control_plane_context: Option<String>,
	registry: Box<dyn ClusterRegistry>,
	overrides: ConnectionOverrides,
}

impl ConnectionFactory {
	/// `control_plane_context` defaults to the kubeconfig's current context.
	pub fn new(
		kubeconfig: Kubeconfig,
		control_plane_context: Option<String>,
		registry: impl ClusterRegistry + 'static,
		overrides: ConnectionOverrides,
	) -> Self {
		Self {
			kubeconfig,
			control_plane_context,
			registry: Box::new(registry),
			overrides,
		}
	}

	/// Resolve a selector into a connection configuration.
	///
	/// An empty selector yields the control plane. A named selector must be
	/// registered; its configuration is scoped to that member only.
	#[instrument(skip(self), fields(cluster = %selector))]
	pub async fn resolve(&self, selector: &ClusterSelector) -> Result<ConnectionConfig, ResolveError> {
		let Some(name) = selector.member_name() else {
			let config = self
				.control_plane_config()
				.await
				.map_err(ResolveError::ControlPlane)?;
			tracing::debug!(server = %config.cluster_url, "resolved control plane");
			return Ok(self.finish(Target::ControlPlane, config, None));
		};

		let member = self
			.registry
			.lookup(name)
			.ok_or_else(|| ResolveError::UnknownCluster {
				name: name.to_string(),
				known: self.registry.names(),
			})?;

		let config = self
			.member_config(&member)
			.await
			.map_err(|source| ResolveError::ConnectionBuild {
				cluster: name.to_string(),
				source,
			})?;
		tracing::debug!(server = %config.cluster_url, "resolved member cluster");

		Ok(self.finish(
			Target::Member(member.name),
			config,
			member.namespace.as_deref(),
		))
	}

	async fn control_plane_config(&self) -> Result<Config, BuildError> {
		config_for_context(self.kubeconfig.clone(), self.control_plane_context.clone()).await
	}

	async fn member_config(&self, member: &MemberCluster) -> Result<Config, BuildError> {
		match &member.endpoint {
			MemberEndpoint::Proxy => {
				let mut config = self.control_plane_config().await?;
				config.cluster_url = proxy_url(&config.cluster_url, &member.name)?;
				Ok(config)
			}
			MemberEndpoint::Context(context) => {
				config_for_context(self.kubeconfig.clone(), Some(context.clone())).await
			}
			MemberEndpoint::Direct(endpoint) => {
				let kubeconfig = endpoint.to_kubeconfig(&member.name)?;
				config_for_context(kubeconfig, None).await
			}
		}
	}

	fn finish(&self, target: Target, mut config: Config, member_namespace: Option<&str>) -> ConnectionConfig {
		if let Some(namespace) = self.overrides.namespace.as_deref().or(member_namespace) {
			config.default_namespace = namespace.to_string();
		}
		if let Some(timeout) = self.overrides.request_timeout {
			config.read_timeout = (!timeout.is_zero()).then_some(timeout);
		}
		ConnectionConfig { target, config }
	}
}

async fn config_for_context(kubeconfig: Kubeconfig, context: Option<String>) -> Result<Config, BuildError> {
	let options = KubeConfigOptions {
		context,
		..Default::default()
	};
	Ok(Config::from_custom_kubeconfig(kubeconfig, &options).await?)
}

/// URL of the control plane's proxy to `cluster`.
fn proxy_url(control_plane: &Uri, cluster: &str) -> Result<Uri, BuildError> {
	let base = control_plane.to_string();
	let url = format!(
		"{}{CLUSTER_PROXY_PREFIX}/{cluster}/proxy",
		base.trim_end_matches('/')
	);
	url.parse().map_err(|source| BuildError::ProxyUrl { url, source })
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	use assert_matches::assert_matches;
	use kube::config::{AuthInfo, Cluster, Context, NamedAuthInfo, NamedCluster, NamedContext};

	use super::*;
	use crate::cluster::{DirectEndpoint, StaticRegistry};

	fn kubeconfig(contexts: &[(&str, &str)], current: &str) -> Kubeconfig {
		Kubeconfig {
			clusters: contexts
				.iter()
				.map(|(name, server)| NamedCluster {
					name: (*name).to_string(),
					cluster: Some(Cluster {
						server: Some((*server).to_string()),
						..Default::default()
					}),
				})
				.collect(),
			contexts: contexts
				.iter()
				.map(|(name, _)| NamedContext {
					name: (*name).to_string(),
					context: Some(Context {
						cluster: (*name).to_string(),
						user: Some((*name).to_string()),
						..Default::default()
					}),
				})
				.collect(),
			auth_infos: contexts
				.iter()
				.map(|(name, _)| NamedAuthInfo {
					name: (*name).to_string(),
					auth_info: Some(AuthInfo::default()),
				})
				.collect(),
			current_context: Some(current.to_string()),
			..Default::default()
		}
	}

	fn member(name: &str, endpoint: MemberEndpoint) -> MemberCluster {
		MemberCluster {
			name: name.to_string(),
			endpoint,
			namespace: None,
		}
	}

	/// Registry that counts lookups.
	#[derive(Clone, Default)]
	struct CountingRegistry {
		lookups: Arc<AtomicUsize>,
	}

	impl ClusterRegistry for CountingRegistry {
		fn lookup(&self, _name: &str) -> Option<MemberCluster> {
			self.lookups.fetch_add(1, Ordering::SeqCst);
			None
		}

		fn names(&self) -> Vec<String> {
			Vec::new()
		}
	}

	#[tokio::test]
	async fn test_empty_selector_resolves_control_plane() {
		let factory = ConnectionFactory::new(
			kubeconfig(&[("karmada", "https://karmada:5443")], "karmada"),
			None,
			StaticRegistry::default(),
			ConnectionOverrides::default(),
		);

		let config = factory.resolve(&ClusterSelector::control_plane()).await.unwrap();
		assert_eq!(config.target(), &Target::ControlPlane);
		assert_eq!(config.cluster_url().host(), Some("karmada"));
	}

	#[tokio::test]
	async fn test_explicit_control_plane_context_beats_current_context() {
		let factory = ConnectionFactory::new(
			kubeconfig(
				&[("karmada", "https://karmada:5443"), ("other", "https://other:6443")],
				"other",
			),
			Some("karmada".to_string()),
			StaticRegistry::default(),
			ConnectionOverrides::default(),
		);

		let config = factory.resolve(&ClusterSelector::control_plane()).await.unwrap();
		assert_eq!(config.cluster_url().host(), Some("karmada"));
	}

	#[tokio::test]
	async fn test_member_context_resolves_to_member() {
		let factory = ConnectionFactory::new(
			kubeconfig(
				&[("karmada", "https://karmada:5443"), ("member1", "https://member1:6443")],
				"karmada",
			),
			None,
			StaticRegistry::new([member("member1", MemberEndpoint::Context("member1".into()))]),
			ConnectionOverrides::default(),
		);

		let config = factory.resolve(&ClusterSelector::member("member1")).await.unwrap();
		assert_eq!(config.target(), &Target::Member("member1".into()));
		assert_eq!(config.cluster_url().host(), Some("member1"));
	}

	#[tokio::test]
	async fn test_proxy_member_goes_through_control_plane() {
		let factory = ConnectionFactory::new(
			kubeconfig(&[("karmada", "https://karmada:5443")], "karmada"),
			None,
			StaticRegistry::new([member("member1", MemberEndpoint::Proxy)]),
			ConnectionOverrides::default(),
		);

		let config = factory.resolve(&ClusterSelector::member("member1")).await.unwrap();
		assert_eq!(config.target(), &Target::Member("member1".into()));
		assert_eq!(
			config.cluster_url().to_string(),
			"https://karmada:5443/apis/cluster.karmada.io/v1alpha1/clusters/member1/proxy"
		);
	}

	#[tokio::test]
	async fn test_unknown_cluster_lists_registered_names() {
		let factory = ConnectionFactory::new(
			Kubeconfig::default(),
			None,
			StaticRegistry::new([member("member1", MemberEndpoint::Proxy)]),
			ConnectionOverrides::default(),
		);

		let err = factory.resolve(&ClusterSelector::member("ghost")).await.unwrap_err();
		assert_eq!(
			err.to_string(),
			"cluster `ghost` is not registered (registered clusters: member1)"
		);
		assert_matches!(err, ResolveError::UnknownCluster { name, .. } if name == "ghost");
	}

	#[tokio::test]
	async fn test_unknown_cluster_consults_registry_once() {
		let registry = CountingRegistry::default();
		let lookups = registry.lookups.clone();
		let factory = ConnectionFactory::new(
			Kubeconfig::default(),
			None,
			registry,
			ConnectionOverrides::default(),
		);

		let result = factory.resolve(&ClusterSelector::member("ghost")).await;
		assert_matches!(result, Err(ResolveError::UnknownCluster { .. }));
		assert_eq!(lookups.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_invalid_server_is_connection_build_error() {
		let factory = ConnectionFactory::new(
			Kubeconfig::default(),
			None,
			StaticRegistry::new([member(
				"broken",
				MemberEndpoint::Direct(DirectEndpoint {
					server: "not a url".into(),
					..DirectEndpoint::default()
				}),
			)]),
			ConnectionOverrides::default(),
		);

		let result = factory.resolve(&ClusterSelector::member("broken")).await;
		assert_matches!(
			result,
			Err(ResolveError::ConnectionBuild { cluster, .. }) if cluster == "broken"
		);
	}

	#[tokio::test]
	async fn test_malformed_certificate_is_connection_build_error() {
		let factory = ConnectionFactory::new(
			Kubeconfig::default(),
			None,
			StaticRegistry::new([member(
				"corrupt",
				MemberEndpoint::Direct(DirectEndpoint {
					server: "https://10.0.0.1:6443".into(),
					certificate_authority_data: Some("%%% not base64 %%%".into()),
					..DirectEndpoint::default()
				}),
			)]),
			ConnectionOverrides::default(),
		);

		let result = factory.resolve(&ClusterSelector::member("corrupt")).await;
		assert_matches!(result, Err(ResolveError::ConnectionBuild { .. }));
	}

	#[tokio::test]
	async fn test_dangling_context_is_connection_build_error() {
		let factory = ConnectionFactory::new(
			kubeconfig(&[("karmada", "https://karmada:5443")], "karmada"),
			None,
			StaticRegistry::new([member("member1", MemberEndpoint::Context("missing".into()))]),
			ConnectionOverrides::default(),
		);

		let result = factory.resolve(&ClusterSelector::member("member1")).await;
		assert_matches!(result, Err(ResolveError::ConnectionBuild { .. }));
	}

	#[tokio::test]
	async fn test_missing_control_plane_context_fails() {
		let factory = ConnectionFactory::new(
			Kubeconfig::default(),
			None,
			StaticRegistry::default(),
			ConnectionOverrides::default(),
		);

		let result = factory.resolve(&ClusterSelector::control_plane()).await;
		assert_matches!(result, Err(ResolveError::ControlPlane(_)));
	}

	#[tokio::test]
	async fn test_overrides_apply_to_member() {
		let factory = ConnectionFactory::new(
			Kubeconfig::default(),
			None,
			StaticRegistry::new([MemberCluster {
				name: "member1".into(),
				endpoint: MemberEndpoint::Direct(DirectEndpoint {
					server: "https://member1:6443".into(),
					..DirectEndpoint::default()
				}),
				namespace: Some("from-registry".into()),
			}]),
			ConnectionOverrides {
				namespace: None,
				request_timeout: Some(Duration::from_secs(5)),
			},
		);

		let config = factory.resolve(&ClusterSelector::member("member1")).await.unwrap();
		assert_eq!(config.default_namespace(), "from-registry");
		assert_eq!(config.read_timeout(), Some(Duration::from_secs(5)));
	}

	#[tokio::test]
	async fn test_namespace_flag_beats_registry_namespace() {
		let factory = ConnectionFactory::new(
			Kubeconfig::default(),
			None,
			StaticRegistry::new([MemberCluster {
				name: "member1".into(),
				endpoint: MemberEndpoint::Direct(DirectEndpoint {
					server: "https://member1:6443".into(),
					..DirectEndpoint::default()
				}),
				namespace: Some("from-registry".into()),
			}]),
			ConnectionOverrides {
				namespace: Some("from-flag".into()),
				request_timeout: Some(Duration::ZERO),
			},
		);

		let config = factory.resolve(&ClusterSelector::member("member1")).await.unwrap();
		assert_eq!(config.default_namespace(), "from-flag");
		assert_eq!(config.read_timeout(), None);
	}

	#[test]
	fn test_proxy_url_strips_trailing_slash() {
		let base: Uri = "https://karmada:5443/".parse().unwrap();
		assert_eq!(
			proxy_url(&base, "member2").unwrap().to_string(),
			"https://karmada:5443/apis/cluster.karmada.io/v1alpha1/clusters/member2/proxy"
		);
	}
}
