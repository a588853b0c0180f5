//! Shared fixtures: a control plane and one member, each a separate mock server.

#![allow(dead_code)]

use fedctl::cluster::{
	ConnectionFactory, ConnectionOverrides, KubeconfigRegistry, MemberCluster, MemberEndpoint,
	StaticRegistry,
};
use k8s_mock::{
	merged_kubeconfig, HttpMockK8sServer, MockApiResource, MockDiscovery, RunningHttpMockK8sServer,
};
use kube::config::Kubeconfig;

pub const CONTROL_PLANE_CONTEXT: &str = "karmada-apiserver";
pub const MEMBER: &str = "member1";

pub struct Clusters {
	pub control_plane: RunningHttpMockK8sServer,
	pub member: RunningHttpMockK8sServer,
}

impl Clusters {
	/// The control plane serves the federation groups, the member a
	/// `widgets.example.io` group of its own.
	pub async fn start() -> Self {
		Self::start_with_member_objects(Vec::new()).await
	}

	pub async fn start_with_member_objects(objects: Vec<serde_json::Value>) -> Self {
		let control_plane = HttpMockK8sServer::builder()
			.discovery(MockDiscovery::control_plane())
			.build()
			.start()
			.await;
		let member = HttpMockK8sServer::builder()
			.discovery(MockDiscovery::default().with_group(
				"example.io/v1",
				vec![MockApiResource::namespaced("widgets", "Widget").short_names(&["wd"])],
			))
			.resources(objects)
			.build()
			.start()
			.await;
		Self {
			control_plane,
			member,
		}
	}

	/// Control plane as the current context, the member as a second context.
	pub fn kubeconfig(&self) -> Kubeconfig {
		merged_kubeconfig(&[
			(CONTROL_PLANE_CONTEXT, &self.control_plane),
			(MEMBER, &self.member),
		])
	}

	/// Members come from kubeconfig contexts.
	pub fn factory(&self) -> ConnectionFactory {
		let kubeconfig = self.kubeconfig();
		let registry = KubeconfigRegistry::new(&kubeconfig, None);
		ConnectionFactory::new(kubeconfig, None, registry, ConnectionOverrides::default())
	}

	/// Members come from an explicit registry.
	pub fn factory_with(&self, members: Vec<MemberCluster>) -> ConnectionFactory {
		ConnectionFactory::new(
			self.kubeconfig(),
			None,
			StaticRegistry::new(members),
			ConnectionOverrides::default(),
		)
	}
}

pub fn member(name: &str, endpoint: MemberEndpoint) -> MemberCluster {
	MemberCluster {
		name: name.to_string(),
		endpoint,
		namespace: None,
	}
}
