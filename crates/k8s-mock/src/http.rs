//! HTTP-based mock Kubernetes server using wiremock.
//!
//! Serves legacy discovery, an OpenAPI v2 document and read-only access to a
//! fixed set of objects. One server impersonates one cluster; tests that need
//! a control plane and members start several and stitch their kubeconfigs
//! together with [`merged_kubeconfig`].

use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{discovery::MockDiscovery, openapi::default_document};

/// Objects keyed by (collection path, name).
type Objects = HashMap<(String, String), serde_json::Value>;

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	#[builder(default)]
	discovery: MockDiscovery,
	/// Objects to serve as raw manifests. The server derives API paths from
	/// apiVersion/kind using the discovery data.
	#[builder(default)]
	resources: Vec<serde_json::Value>,
	/// OpenAPI v2 document, [`default_document`] when unset.
	openapi: Option<serde_json::Value>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut objects = Objects::new();
		for manifest in self.resources {
			if let Some((collection, name)) = collection_for_manifest(&manifest, &self.discovery) {
				trace!(collection = %collection, name = %name, "Registered object");
				objects.insert((collection, name), manifest);
			}
		}

		let openapi = self.openapi.unwrap_or_else(default_document);

		mount_discovery(&server, &self.discovery).await;
		mount_openapi(&server, openapi).await;
		mount_objects(&server, Arc::new(objects), Arc::new(self.discovery)).await;

		RunningHttpMockK8sServer { server }
	}
}

/// Derive the collection path and name for a manifest using discovery data.
fn collection_for_manifest(
	manifest: &serde_json::Value,
	discovery: &MockDiscovery,
) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(|n| n.as_str())
		.unwrap_or("default");

	let resource = discovery.resource_for(api_version, kind)?;
	let root = if api_version.contains('/') {
		format!("/apis/{api_version}")
	} else {
		format!("/api/{api_version}")
	};

	let collection = if resource.namespaced {
		format!("{root}/namespaces/{namespace}/{}", resource.name)
	} else {
		format!("{root}/{}", resource.name)
	};

	Some((collection, name))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	///
	/// Cluster and user entries are named after the context so several of these
	/// can be merged without collisions.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = format!("{context_name}-cluster");
		let user_name = format!("{context_name}-user");

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.clone(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name,
					user: Some(user_name.clone()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name,
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Paths of every request this server has received so far.
	pub async fn request_paths(&self) -> Vec<String> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.map(|req| req.url.path().to_string())
			.collect()
	}
}

/// Build one kubeconfig holding a context per server.
///
/// The first entry becomes the current context.
pub fn merged_kubeconfig(servers: &[(&str, &RunningHttpMockK8sServer)]) -> Kubeconfig {
	let mut merged = Kubeconfig::default();
	for (context, server) in servers {
		let single = server.kubeconfig_with_context(context);
		merged.clusters.extend(single.clusters);
		merged.contexts.extend(single.contexts);
		merged.auth_infos.extend(single.auth_infos);
	}
	merged.current_context = servers.first().map(|(context, _)| (*context).to_string());
	merged
}

async fn mount_discovery(server: &MockServer, discovery: &MockDiscovery) {
	// Core API versions
	Mock::given(method("GET"))
		.and(path("/api"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": []
		})))
		.mount(server)
		.await;

	// API groups
	let groups: Vec<_> = discovery
		.group_resources
		.keys()
		.map(|gv| {
			let (group, version) = gv.split_once('/').unwrap_or(("", gv));
			serde_json::json!({
				"name": group,
				"versions": [{"groupVersion": gv, "version": version}],
				"preferredVersion": {"groupVersion": gv, "version": version}
			})
		})
		.collect();

	Mock::given(method("GET"))
		.and(path("/apis"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIGroupList",
			"apiVersion": "v1",
			"groups": groups
		})))
		.mount(server)
		.await;

	let core_resources: Vec<_> = discovery
		.core_resources
		.iter()
		.map(super::MockApiResource::to_json)
		.collect();

	Mock::given(method("GET"))
		.and(path("/api/v1"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIResourceList",
			"apiVersion": "v1",
			"groupVersion": "v1",
			"resources": core_resources
		})))
		.mount(server)
		.await;

	for (gv, rs) in &discovery.group_resources {
		let resources: Vec<_> = rs.iter().map(super::MockApiResource::to_json).collect();

		Mock::given(method("GET"))
			.and(path(format!("/apis/{}", gv)))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"kind": "APIResourceList",
				"apiVersion": "v1",
				"groupVersion": gv,
				"resources": resources
			})))
			.mount(server)
			.await;
	}
}

async fn mount_openapi(server: &MockServer, document: serde_json::Value) {
	Mock::given(method("GET"))
		.and(path("/openapi/v2"))
		.respond_with(ResponseTemplate::new(200).set_body_json(document))
		.mount(server)
		.await;
}

/// Serve GET for single objects and collections.
///
/// Discovery endpoints are mounted first and therefore take precedence over
/// this catch-all.
async fn mount_objects(server: &MockServer, objects: Arc<Objects>, discovery: Arc<MockDiscovery>) {
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.+"))
		.respond_with(move |req: &Request| {
			let path_str = req.url.path().trim_end_matches('/');
			let selector: BTreeMap<String, String> = req
				.url
				.query_pairs()
				.find(|(key, _)| key == "labelSelector")
				.map(|(_, value)| parse_label_selector(&value))
				.unwrap_or_default();

			let items: Vec<_> = objects
				.iter()
				.filter(|((collection, _), _)| collection == path_str)
				.map(|(_, object)| object)
				.filter(|object| labels_match(object, &selector))
				.cloned()
				.collect();

			let (collection, name) = path_str.rsplit_once('/').unwrap_or((path_str, ""));

			if !items.is_empty() || discovery.is_plural(name) {
				return ResponseTemplate::new(200).set_body_json(serde_json::json!({
					"kind": "List",
					"apiVersion": "v1",
					"metadata": {"resourceVersion": "1"},
					"items": items
				}));
			}

			if let Some(object) = objects.get(&(collection.to_string(), name.to_string())) {
				return ResponseTemplate::new(200).set_body_json(object.clone());
			}

			ResponseTemplate::new(404).set_body_json(serde_json::json!({
				"kind": "Status",
				"apiVersion": "v1",
				"metadata": {},
				"status": "Failure",
				"message": format!("\"{name}\" not found"),
				"reason": "NotFound",
				"code": 404
			}))
		})
		.mount(server)
		.await;
}

/// Parse an equality-based label selector (`a=b,c==d`).
fn parse_label_selector(selector: &str) -> BTreeMap<String, String> {
	selector
		.split(',')
		.filter_map(|term| {
			let (key, value) = term.split_once("==").or_else(|| term.split_once('='))?;
			Some((key.trim().to_string(), value.trim().to_string()))
		})
		.collect()
}

fn labels_match(object: &serde_json::Value, selector: &BTreeMap<String, String>) -> bool {
	selector.iter().all(|(key, value)| {
		object
			.pointer("/metadata/labels")
			.and_then(|labels| labels.get(key))
			.and_then(|v| v.as_str())
			== Some(value.as_str())
	})
}
