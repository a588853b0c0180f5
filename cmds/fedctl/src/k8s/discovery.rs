//! Legacy API discovery.
//!
//! Resources are read from `/api/<version>` and `/apis/<group>/<version>`,
//! one request per group version, with bounded parallelism.

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::Client;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::instrument;

/// Errors that can occur during API discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("failed to list API groups")]
	Groups(#[source] kube::Error),

	#[error("failed to list core API versions")]
	CoreVersions(#[source] kube::Error),

	#[error("failed to list resources of {group_version}")]
	GroupVersion {
		group_version: String,
		#[source]
		source: kube::Error,
	},

	#[error("discovery task panicked")]
	TaskPanicked(#[source] tokio::task::JoinError),
}

/// A `group/version` as used in `apiVersion`. The core group has no prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersion {
	pub group: String,
	pub version: String,
}

impl GroupVersion {
	pub fn parse(api_version: &str) -> Self {
		match api_version.split_once('/') {
			Some((group, version)) => Self {
				group: group.to_string(),
				version: version.to_string(),
			},
			None => Self {
				group: String::new(),
				version: api_version.to_string(),
			},
		}
	}

	pub fn is_core(&self) -> bool {
		self.group.is_empty()
	}
}

impl std::fmt::Display for GroupVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.is_core() {
			f.write_str(&self.version)
		} else {
			write!(f, "{}/{}", self.group, self.version)
		}
	}
}

/// One top-level resource served by the cluster.
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
	pub group_version: GroupVersion,
	pub resource: APIResource,
}

impl DiscoveredResource {
	pub fn name(&self) -> &str {
		&self.resource.name
	}

	pub fn kind(&self) -> &str {
		&self.resource.kind
	}

	pub fn group(&self) -> &str {
		&self.group_version.group
	}

	pub fn api_version(&self) -> String {
		self.group_version.to_string()
	}

	/// `resource` for the core group, `resource.group` otherwise.
	pub fn qualified_name(&self) -> String {
		if self.group_version.is_core() {
			self.resource.name.clone()
		} else {
			format!("{}.{}", self.resource.name, self.group_version.group)
		}
	}

	pub fn short_names(&self) -> &[String] {
		self.resource.short_names.as_deref().unwrap_or_default()
	}

	pub fn categories(&self) -> &[String] {
		self.resource.categories.as_deref().unwrap_or_default()
	}

	fn singular_name(&self) -> String {
		if self.resource.singular_name.is_empty() {
			self.resource.kind.to_lowercase()
		} else {
			self.resource.singular_name.clone()
		}
	}

	/// Whether `query` names this resource by plural, singular, short name or kind.
	pub fn matches(&self, query: &str) -> bool {
		let query = query.to_lowercase();
		self.resource.name == query
			|| self.singular_name() == query
			|| self.resource.kind.to_lowercase() == query
			|| self.short_names().iter().any(|s| *s == query)
	}
}

/// Resources discovered from one cluster.
#[derive(Debug, Clone, Default)]
pub struct ServerResources {
	resources: Vec<DiscoveredResource>,
}

impl ServerResources {
	/// Maximum concurrent group version requests.
	const MAX_CONCURRENT_DISCOVERIES: usize = 8;

	/// Discover the resources of every group's preferred version.
	#[instrument(skip(client))]
	pub async fn preferred(client: &Client) -> Result<Self, DiscoveryError> {
		let core = client
			.list_core_api_versions()
			.await
			.map_err(DiscoveryError::CoreVersions)?;
		let groups = client
			.list_api_groups()
			.await
			.map_err(DiscoveryError::Groups)?;

		let mut group_versions: Vec<GroupVersion> = core
			.versions
			.first()
			.map(|version| GroupVersion::parse(version))
			.into_iter()
			.collect();
		for group in groups.groups {
			let preferred = group
				.preferred_version
				.or_else(|| group.versions.into_iter().next());
			if let Some(preferred) = preferred {
				group_versions.push(GroupVersion::parse(&preferred.group_version));
			}
		}

		Self::discover(client, group_versions).await
	}

	/// Discover the resources of a single group version.
	#[instrument(skip(client), fields(group_version = %group_version))]
	pub async fn for_group_version(
		client: &Client,
		group_version: &GroupVersion,
	) -> Result<Self, DiscoveryError> {
		let list = list_resources(client, group_version)
			.await
			.map_err(|source| DiscoveryError::GroupVersion {
				group_version: group_version.to_string(),
				source,
			})?;
		Ok(Self::from_lists([(group_version.clone(), list)]))
	}

	/// Build from already fetched lists, dropping subresources.
	pub fn from_lists(lists: impl IntoIterator<Item = (GroupVersion, APIResourceList)>) -> Self {
		let resources = lists
			.into_iter()
			.flat_map(|(group_version, list)| {
				list.resources
					.into_iter()
					.filter(|r| !r.name.contains('/'))
					.map(move |resource| DiscoveredResource {
						group_version: group_version.clone(),
						resource,
					})
			})
			.collect();
		Self { resources }
	}

	async fn discover(client: &Client, group_versions: Vec<GroupVersion>) -> Result<Self, DiscoveryError> {
		let semaphore = Arc::new(Semaphore::new(Self::MAX_CONCURRENT_DISCOVERIES));
		let mut join_set = JoinSet::new();

		for (index, group_version) in group_versions.into_iter().enumerate() {
			let client = client.clone();
			let sem = semaphore.clone();

			join_set.spawn(async move {
				let _permit = sem.acquire_owned().await.ok();
				tracing::debug!(group_version = %group_version, "discovering group version");
				let result = list_resources(&client, &group_version).await;
				(index, group_version, result)
			});
		}

		let mut lists = Vec::new();
		let mut errors = Vec::new();

		while let Some(joined) = join_set.join_next().await {
			let (index, group_version, result) = joined.map_err(DiscoveryError::TaskPanicked)?;
			match result {
				Ok(list) => lists.push((index, group_version, list)),
				Err(e) => {
					tracing::warn!(
						group_version = %group_version,
						error = %e,
						"unable to retrieve the complete list of server APIs"
					);
					errors.push((group_version, e));
				}
			}
		}

		if lists.is_empty() && !errors.is_empty() {
			let (group_version, source) = errors.remove(0);
			return Err(DiscoveryError::GroupVersion {
				group_version: group_version.to_string(),
				source,
			});
		}

		// Keep the server's group order regardless of completion order.
		lists.sort_by_key(|(index, _, _)| *index);
		Ok(Self::from_lists(
			lists.into_iter().map(|(_, gv, list)| (gv, list)),
		))
	}

	pub fn into_vec(self) -> Vec<DiscoveredResource> {
		self.resources
	}

	/// First resource matching `query`, in discovery order.
	pub fn find(&self, query: &str) -> Option<&DiscoveredResource> {
		self.resources.iter().find(|r| r.matches(query))
	}
}

async fn list_resources(client: &Client, group_version: &GroupVersion) -> Result<APIResourceList, kube::Error> {
	if group_version.is_core() {
		client.list_core_api_resources(&group_version.version).await
	} else {
		client
			.list_api_group_resources(&group_version.to_string())
			.await
	}
}

/// Every `group/version` the server offers, core versions included, sorted.
#[instrument(skip(client))]
pub async fn server_group_versions(client: &Client) -> Result<Vec<String>, DiscoveryError> {
	let core = client
		.list_core_api_versions()
		.await
		.map_err(DiscoveryError::CoreVersions)?;
	let groups = client
		.list_api_groups()
		.await
		.map_err(DiscoveryError::Groups)?;

	let mut versions = core.versions;
	versions.extend(
		groups
			.groups
			.into_iter()
			.flat_map(|group| group.versions)
			.map(|version| version.group_version),
	);
	versions.sort();
	versions.dedup();
	Ok(versions)
}
