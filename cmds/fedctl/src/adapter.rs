//! Running single-cluster command units against a selected cluster.
//!
//! A [`CommandUnit`] knows how to do one thing against one cluster. The
//! [`Adapter`] decides which cluster that is: during `complete` it resolves
//! the selector through the [`ConnectionFactory`] and hands the result to the
//! unit, then forwards `validate` and `run` untouched.

use thiserror::Error;

use crate::cluster::{ClusterSelector, ConnectionConfig, ConnectionFactory, ResolveError, Target};

/// One operation that works against a single cluster.
///
/// Units are created fresh per invocation. The three phases are always called
/// in order, each at most once.
#[allow(async_fn_in_trait)]
pub trait CommandUnit {
	type Error: std::error::Error + Send + Sync + 'static;

	/// Bind the connection and interpret positional arguments.
	async fn complete(&mut self, connection: ConnectionConfig, args: Vec<String>) -> Result<(), Self::Error>;

	/// Check options and arguments before doing any work.
	fn validate(&mut self) -> Result<(), Self::Error> {
		Ok(())
	}

	/// Do the work.
	async fn run(&mut self) -> Result<(), Self::Error>;
}

/// Whether a command may fall back to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPolicy {
	/// `--cluster` must name a member.
	RequiresMember,
	/// Without `--cluster` the control plane is used.
	DefaultsToControlPlane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Fresh,
	Completed,
	Validated,
	Finished,
}

/// Errors surfaced by an [`Adapter`].
///
/// Unit errors pass through unchanged.
#[derive(Debug, Error)]
pub enum AdapterError<E> {
	#[error("must specify a cluster: pass --cluster (-C) with the name of a member cluster")]
	MissingClusterSelector,

	#[error(transparent)]
	Resolve(#[from] ResolveError),

	#[error("{attempted} called out of order: expected {expected} first")]
	PhaseOrder {
		attempted: &'static str,
		expected: &'static str,
	},

	#[error(transparent)]
	Unit(E),
}

/// Binds cluster resolution to one command unit.
pub struct Adapter<U> {
	unit: U,
	policy: ClusterPolicy,
	phase: Phase,
	target: Option<Target>,
}

impl<U: CommandUnit> Adapter<U> {
	pub fn new(unit: U, policy: ClusterPolicy) -> Self {
		Self {
			unit,
			policy,
			phase: Phase::Fresh,
			target: None,
		}
	}

	/// Reject a selector the policy does not allow.
	///
	/// Needs neither a factory nor a registry, so callers can run it before
	/// loading either.
	pub fn check_selector(&self, selector: &ClusterSelector) -> Result<(), AdapterError<U::Error>> {
		if self.policy == ClusterPolicy::RequiresMember && selector.is_control_plane() {
			return Err(AdapterError::MissingClusterSelector);
		}
		Ok(())
	}

	/// Resolve the cluster and complete the unit with its configuration.
	///
	/// The selector policy is checked before the registry is consulted.
	pub async fn complete(
		&mut self,
		factory: &ConnectionFactory,
		selector: ClusterSelector,
		args: Vec<String>,
	) -> Result<(), AdapterError<U::Error>> {
		if self.phase != Phase::Fresh {
			return Err(AdapterError::PhaseOrder {
				attempted: "complete",
				expected: "a fresh adapter",
			});
		}
		self.check_selector(&selector)?;

		let connection = factory.resolve(&selector).await?;
		let target = connection.target().clone();
		tracing::debug!(target = %target, "completing command");

		self.unit
			.complete(connection, args)
			.await
			.map_err(AdapterError::Unit)?;
		self.target = Some(target);
		self.phase = Phase::Completed;
		Ok(())
	}

	pub fn validate(&mut self) -> Result<(), AdapterError<U::Error>> {
		if self.phase != Phase::Completed {
			return Err(AdapterError::PhaseOrder {
				attempted: "validate",
				expected: "complete",
			});
		}
		self.unit.validate().map_err(AdapterError::Unit)?;
		self.phase = Phase::Validated;
		Ok(())
	}

	pub async fn run(&mut self) -> Result<(), AdapterError<U::Error>> {
		if self.phase != Phase::Validated {
			return Err(AdapterError::PhaseOrder {
				attempted: "run",
				expected: "validate",
			});
		}
		self.phase = Phase::Finished;
		self.unit.run().await.map_err(AdapterError::Unit)
	}

	/// Run all three phases, stopping at the first error.
	pub async fn execute(
		mut self,
		factory: &ConnectionFactory,
		selector: ClusterSelector,
		args: Vec<String>,
	) -> Result<(), AdapterError<U::Error>> {
		self.complete(factory, selector, args).await?;
		self.validate()?;
		self.run().await
	}

	/// The cluster the unit was completed against.
	pub fn target(&self) -> Option<&Target> {
		self.target.as_ref()
	}

	pub fn unit(&self) -> &U {
		&self.unit
	}

	pub fn into_unit(self) -> U {
		self.unit
	}
}
