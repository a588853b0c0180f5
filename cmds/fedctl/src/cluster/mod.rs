//! Cluster selection and connection resolution.
//!
//! A [`ClusterSelector`] is parsed from `--cluster` and handed to the
//! [`ConnectionFactory`], which turns it into exactly one
//! [`ConnectionConfig`] for either the control plane or a registered member.

use std::fmt;

pub mod factory;
pub mod registry;

pub use factory::{BuildError, ConnectionConfig, ConnectionFactory, ConnectionOverrides, ResolveError};
pub use registry::{
	ClusterRegistry, DirectEndpoint, KubeconfigRegistry, MemberCluster, MemberEndpoint,
	StaticRegistry,
};

/// The member cluster picked with `--cluster`. Empty means the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSelector(Option<String>);

impl ClusterSelector {
	pub fn control_plane() -> Self {
		Self(None)
	}

	/// Select a member by name. An empty name selects the control plane.
	pub fn member(name: impl Into<String>) -> Self {
		let name = name.into();
		if name.is_empty() {
			Self(None)
		} else {
			Self(Some(name))
		}
	}

	/// Build a selector from an optional flag value.
	pub fn from_flag(flag: Option<String>) -> Self {
		flag.map_or_else(Self::control_plane, Self::member)
	}

	pub fn member_name(&self) -> Option<&str> {
		self.0.as_deref()
	}

	pub fn is_control_plane(&self) -> bool {
		self.0.is_none()
	}
}

impl fmt::Display for ClusterSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.0 {
			Some(name) => f.write_str(name),
			None => f.write_str("<control-plane>"),
		}
	}
}

/// The cluster a connection was resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
	ControlPlane,
	Member(String),
}

impl fmt::Display for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ControlPlane => f.write_str("control plane"),
			Self::Member(name) => write!(f, "cluster({name})"),
		}
	}
}
