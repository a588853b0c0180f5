//! Mock Kubernetes API discovery types.

use std::collections::BTreeMap;

/// Pre-configured discovery responses.
///
/// `group_resources` is keyed by `group/version`. Every group is served with a
/// single version which is also its preferred version.
#[derive(Clone)]
pub struct MockDiscovery {
	pub core_resources: Vec<MockApiResource>,
	pub group_resources: BTreeMap<String, Vec<MockApiResource>>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self {
			core_resources: vec![
				MockApiResource::namespaced("configmaps", "ConfigMap").short_names(&["cm"]),
				MockApiResource::namespaced("secrets", "Secret"),
				MockApiResource::namespaced("services", "Service")
					.short_names(&["svc"])
					.categories(&["all"]),
				MockApiResource::namespaced("pods", "Pod")
					.short_names(&["po"])
					.categories(&["all"]),
				MockApiResource::namespaced("pods/attach", "PodAttachOptions")
					.verbs(&["create", "get"]),
				MockApiResource::cluster_scoped("namespaces", "Namespace").short_names(&["ns"]),
			],
			group_resources: BTreeMap::from([(
				"apps/v1".to_string(),
				vec![
					MockApiResource::namespaced("deployments", "Deployment")
						.short_names(&["deploy"])
						.categories(&["all"]),
					MockApiResource::namespaced("statefulsets", "StatefulSet")
						.short_names(&["sts"])
						.categories(&["all"]),
					MockApiResource::namespaced("daemonsets", "DaemonSet")
						.short_names(&["ds"])
						.categories(&["all"]),
					MockApiResource::namespaced("replicasets", "ReplicaSet")
						.short_names(&["rs"])
						.categories(&["all"]),
				],
			)]),
		}
	}
}

impl MockDiscovery {
	/// Discovery of a federation control plane: the default resources plus the
	/// cluster registry and propagation policy groups.
	pub fn control_plane() -> Self {
		Self::default()
			.with_group(
				"cluster.karmada.io/v1alpha1",
				vec![MockApiResource::cluster_scoped("clusters", "Cluster")],
			)
			.with_group(
				"policy.karmada.io/v1alpha1",
				vec![
					MockApiResource::namespaced("propagationpolicies", "PropagationPolicy")
						.short_names(&["pp"]),
				],
			)
	}

	/// Add (or replace) the resources served for `group_version`.
	pub fn with_group(mut self, group_version: &str, resources: Vec<MockApiResource>) -> Self {
		self.group_resources
			.insert(group_version.to_string(), resources);
		self
	}

	/// Find the plural name and scope of `kind` within `api_version`.
	pub fn resource_for(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		let resources = if api_version.contains('/') {
			self.group_resources.get(api_version)?
		} else {
			&self.core_resources
		};
		resources
			.iter()
			.find(|r| r.kind == kind && !r.is_subresource())
	}

	/// Whether `name` is the plural name of any served resource.
	pub fn is_plural(&self, name: &str) -> bool {
		self.core_resources
			.iter()
			.chain(self.group_resources.values().flatten())
			.any(|r| r.name == name)
	}
}

/// A mock API resource definition.
#[derive(Clone)]
pub struct MockApiResource {
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
	pub verbs: Vec<String>,
	pub short_names: Vec<String>,
	pub categories: Vec<String>,
}

const DEFAULT_VERBS: [&str; 8] = [
	"create",
	"delete",
	"deletecollection",
	"get",
	"list",
	"patch",
	"update",
	"watch",
];

impl MockApiResource {
	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self::new(name, kind, true)
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self::new(name, kind, false)
	}

	fn new(name: &str, kind: &str, namespaced: bool) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced,
			verbs: DEFAULT_VERBS.iter().map(|v| (*v).to_string()).collect(),
			short_names: Vec::new(),
			categories: Vec::new(),
		}
	}

	#[must_use]
	pub fn short_names(mut self, names: &[&str]) -> Self {
		self.short_names = names.iter().map(|n| (*n).to_string()).collect();
		self
	}

	#[must_use]
	pub fn categories(mut self, categories: &[&str]) -> Self {
		self.categories = categories.iter().map(|c| (*c).to_string()).collect();
		self
	}

	#[must_use]
	pub fn verbs(mut self, verbs: &[&str]) -> Self {
		self.verbs = verbs.iter().map(|v| (*v).to_string()).collect();
		self
	}

	pub fn is_subresource(&self) -> bool {
		self.name.contains('/')
	}

	/// Legacy `APIResource` JSON as served under `/api/v1` and `/apis/<gv>`.
	pub(crate) fn to_json(&self) -> serde_json::Value {
		let singular = if self.is_subresource() {
			String::new()
		} else {
			self.kind.to_lowercase()
		};
		let mut value = serde_json::json!({
			"name": self.name,
			"singularName": singular,
			"namespaced": self.namespaced,
			"kind": self.kind,
			"verbs": self.verbs,
		});
		if !self.short_names.is_empty() {
			value["shortNames"] = serde_json::json!(self.short_names);
		}
		if !self.categories.is_empty() {
			value["categories"] = serde_json::json!(self.categories);
		}
		value
	}
}
