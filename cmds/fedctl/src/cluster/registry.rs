//! Member cluster registries.
//!
//! A registry answers one question: given a cluster name, how is that cluster
//! reached? It never builds clients or talks to the network.

use std::collections::BTreeMap;

use kube::config::Kubeconfig;

use crate::config::ClusterEntry;

/// How a member cluster is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEndpoint {
	/// Through the control plane's aggregated cluster proxy, reusing the
	/// control plane credentials.
	Proxy,
	/// Through a context of the loaded kubeconfig.
	Context(String),
	/// Through an explicit endpoint and credentials.
	Direct(DirectEndpoint),
}

/// Explicit connection parameters for a member cluster.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DirectEndpoint {
	pub server: String,
	/// Base64-encoded PEM bundle.
	pub certificate_authority_data: Option<String>,
	pub insecure_skip_tls_verify: bool,
	pub token: Option<String>,
}

impl std::fmt::Debug for DirectEndpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DirectEndpoint")
			.field("server", &self.server)
			.field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
			.field("has_token", &self.token.is_some())
			.finish_non_exhaustive()
	}
}

impl DirectEndpoint {
	/// Express the endpoint as a single-context kubeconfig named after the cluster.
	///
	/// Going through kubeconfig lets kube validate certificates and the server
	/// URL exactly as it does for any other context.
	pub fn to_kubeconfig(&self, cluster: &str) -> Result<Kubeconfig, serde_json::Error> {
		let mut cluster_entry = serde_json::Map::new();
		cluster_entry.insert("server".into(), self.server.clone().into());
		if let Some(ca) = &self.certificate_authority_data {
			cluster_entry.insert("certificate-authority-data".into(), ca.clone().into());
		}
		if self.insecure_skip_tls_verify {
			cluster_entry.insert("insecure-skip-tls-verify".into(), true.into());
		}

		let mut user_entry = serde_json::Map::new();
		if let Some(token) = &self.token {
			user_entry.insert("token".into(), token.clone().into());
		}

		serde_json::from_value(serde_json::json!({
			"apiVersion": "v1",
			"kind": "Config",
			"clusters": [{ "name": cluster, "cluster": cluster_entry }],
			"users": [{ "name": cluster, "user": user_entry }],
			"contexts": [{ "name": cluster, "context": { "cluster": cluster, "user": cluster } }],
			"current-context": cluster,
		}))
	}
}

/// A registered member cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberCluster {
	pub name: String,
	pub endpoint: MemberEndpoint,
	/// Default namespace for commands targeting this member.
	pub namespace: Option<String>,
}

/// Source of member cluster connection parameters.
pub trait ClusterRegistry: Send + Sync {
	/// Look up a member by name. `None` means the cluster is not registered.
	fn lookup(&self, name: &str) -> Option<MemberCluster>;

	/// Names of all registered members, sorted.
	fn names(&self) -> Vec<String>;
}

/// Members listed in the fedctl configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
	clusters: BTreeMap<String, MemberCluster>,
}

impl StaticRegistry {
	pub fn new(clusters: impl IntoIterator<Item = MemberCluster>) -> Self {
		Self {
			clusters: clusters
				.into_iter()
				.map(|cluster| (cluster.name.clone(), cluster))
				.collect(),
		}
	}

	/// Build from configuration entries, which are expected to be validated.
	pub fn from_entries(entries: &[ClusterEntry]) -> Self {
		Self::new(entries.iter().map(MemberCluster::from))
	}
}

impl From<&ClusterEntry> for MemberCluster {
	fn from(entry: &ClusterEntry) -> Self {
		let endpoint = match (&entry.context, &entry.server) {
			(Some(context), _) => MemberEndpoint::Context(context.clone()),
			(None, Some(server)) => MemberEndpoint::Direct(DirectEndpoint {
				server: server.clone(),
				certificate_authority_data: entry.certificate_authority_data.clone(),
				insecure_skip_tls_verify: entry.insecure_skip_tls_verify,
				token: entry.token.clone(),
			}),
			(None, None) => MemberEndpoint::Proxy,
		};
		Self {
			name: entry.name.clone(),
			endpoint,
			namespace: entry.namespace.clone(),
		}
	}
}

impl ClusterRegistry for StaticRegistry {
	fn lookup(&self, name: &str) -> Option<MemberCluster> {
		self.clusters.get(name).cloned()
	}

	fn names(&self) -> Vec<String> {
		self.clusters.keys().cloned().collect()
	}
}

/// Every kubeconfig context except the control plane's is a member of the same name.
#[derive(Debug, Clone, Default)]
pub struct KubeconfigRegistry {
	contexts: BTreeMap<String, Option<String>>,
}

impl KubeconfigRegistry {
	/// `control_plane_context` defaults to the kubeconfig's current context.
	pub fn new(kubeconfig: &Kubeconfig, control_plane_context: Option<&str>) -> Self {
		let control_plane = control_plane_context.or(kubeconfig.current_context.as_deref());
		let contexts = kubeconfig
			.contexts
			.iter()
			.filter(|c| Some(c.name.as_str()) != control_plane)
			.map(|c| {
				let namespace = c.context.as_ref().and_then(|ctx| ctx.namespace.clone());
				(c.name.clone(), namespace)
			})
			.collect();
		Self { contexts }
	}
}

impl ClusterRegistry for KubeconfigRegistry {
	fn lookup(&self, name: &str) -> Option<MemberCluster> {
		let namespace = self.contexts.get(name)?;
		Some(MemberCluster {
			name: name.to_string(),
			endpoint: MemberEndpoint::Context(name.to_string()),
			namespace: namespace.clone(),
		})
	}

	fn names(&self) -> Vec<String> {
		self.contexts.keys().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use kube::config::{Context, NamedContext};

	use super::*;

	fn kubeconfig_with_contexts(names: &[&str], current: &str) -> Kubeconfig {
		Kubeconfig {
			contexts: names
				.iter()
				.map(|name| NamedContext {
					name: (*name).to_string(),
					context: Some(Context {
						cluster: format!("{name}-cluster"),
						namespace: Some(format!("{name}-ns")),
						..Default::default()
					}),
				})
				.collect(),
			current_context: Some(current.to_string()),
			..Default::default()
		}
	}

	#[test]
	fn test_kubeconfig_registry_excludes_current_context() {
		let kubeconfig = kubeconfig_with_contexts(&["karmada-apiserver", "member1", "member2"], "karmada-apiserver");
		let registry = KubeconfigRegistry::new(&kubeconfig, None);

		assert_eq!(registry.names(), vec!["member1", "member2"]);
		assert!(registry.lookup("karmada-apiserver").is_none());
	}

	#[test]
	fn test_kubeconfig_registry_excludes_explicit_control_plane() {
		let kubeconfig = kubeconfig_with_contexts(&["karmada-apiserver", "member1"], "member1");
		let registry = KubeconfigRegistry::new(&kubeconfig, Some("karmada-apiserver"));

		let member = registry.lookup("member1").expect("member1 should be registered");
		assert_eq!(member.endpoint, MemberEndpoint::Context("member1".to_string()));
		assert_eq!(member.namespace.as_deref(), Some("member1-ns"));
		assert!(registry.lookup("karmada-apiserver").is_none());
	}

	#[test]
	fn test_static_registry_endpoint_kinds() {
		let entries = vec![
			ClusterEntry {
				name: "proxied".into(),
				..ClusterEntry::default()
			},
			ClusterEntry {
				name: "ctx".into(),
				context: Some("kind-ctx".into()),
				..ClusterEntry::default()
			},
			ClusterEntry {
				name: "direct".into(),
				server: Some("https://10.0.0.1:6443".into()),
				token: Some("secret".into()),
				namespace: Some("apps".into()),
				..ClusterEntry::default()
			},
		];
		let registry = StaticRegistry::from_entries(&entries);

		assert_eq!(registry.names(), vec!["ctx", "direct", "proxied"]);
		assert_eq!(registry.lookup("proxied").unwrap().endpoint, MemberEndpoint::Proxy);
		assert_eq!(
			registry.lookup("ctx").unwrap().endpoint,
			MemberEndpoint::Context("kind-ctx".into())
		);

		let direct = registry.lookup("direct").unwrap();
		assert_eq!(direct.namespace.as_deref(), Some("apps"));
		assert_eq!(
			direct.endpoint,
			MemberEndpoint::Direct(DirectEndpoint {
				server: "https://10.0.0.1:6443".into(),
				token: Some("secret".into()),
				..DirectEndpoint::default()
			})
		);
		assert!(registry.lookup("ghost").is_none());
	}

	#[test]
	fn test_direct_endpoint_kubeconfig() {
		let endpoint = DirectEndpoint {
			server: "https://10.0.0.1:6443".into(),
			insecure_skip_tls_verify: true,
			token: Some("secret".into()),
			..DirectEndpoint::default()
		};
		let kubeconfig = endpoint.to_kubeconfig("member1").unwrap();

		assert_eq!(kubeconfig.current_context.as_deref(), Some("member1"));
		let cluster = kubeconfig.clusters[0].cluster.as_ref().unwrap();
		assert_eq!(cluster.server.as_deref(), Some("https://10.0.0.1:6443"));
		assert_eq!(cluster.insecure_skip_tls_verify, Some(true));
		assert!(kubeconfig.auth_infos[0]
			.auth_info
			.as_ref()
			.unwrap()
			.token
			.is_some());
	}

	#[test]
	fn test_direct_endpoint_debug_hides_token() {
		let endpoint = DirectEndpoint {
			server: "https://10.0.0.1:6443".into(),
			token: Some("super-secret".into()),
			..DirectEndpoint::default()
		};
		assert!(!format!("{endpoint:?}").contains("super-secret"));
	}
}
