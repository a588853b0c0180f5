//! Print the API versions a cluster serves.

use std::io::{self, Write};

use kube::Client;
use thiserror::Error;
use tracing::instrument;

use super::{reject_arguments, NotCompleted, UnexpectedArguments};
use crate::{
	adapter::CommandUnit,
	cluster::ConnectionConfig,
	k8s::discovery::{server_group_versions, DiscoveryError},
};

#[derive(Debug, Error)]
pub enum ApiVersionsError {
	#[error(transparent)]
	UnexpectedArguments(#[from] UnexpectedArguments),

	#[error("failed to create client")]
	Client(#[source] kube::Error),

	#[error("couldn't get available api versions from server")]
	Discovery(#[from] DiscoveryError),

	#[error("failed to write output")]
	Output(#[from] io::Error),

	#[error(transparent)]
	NotCompleted(#[from] NotCompleted),
}

pub struct ApiVersions<W> {
	out: W,
	client: Option<Client>,
}

impl<W: Write> ApiVersions<W> {
	pub fn new(out: W) -> Self {
		Self { out, client: None }
	}
}

impl<W: Write> CommandUnit for ApiVersions<W> {
	type Error = ApiVersionsError;

	async fn complete(&mut self, connection: ConnectionConfig, args: Vec<String>) -> Result<(), Self::Error> {
		reject_arguments(args)?;
		self.client = Some(connection.client().map_err(ApiVersionsError::Client)?);
		Ok(())
	}

	#[instrument(skip_all)]
	async fn run(&mut self) -> Result<(), Self::Error> {
		let client = self.client.as_ref().ok_or(NotCompleted)?;
		for version in server_group_versions(client).await? {
			writeln!(self.out, "{version}")?;
		}
		self.out.flush()?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[tokio::test]
	async fn test_run_before_complete() {
		let mut unit = ApiVersions::new(Vec::new());
		assert_matches!(unit.run().await, Err(ApiVersionsError::NotCompleted(_)));
	}
}
