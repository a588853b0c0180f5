//! api-versions command handler.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::ClusterArgs;
use crate::{adapter::ClusterPolicy, cli::GlobalOptions, units::api_versions::ApiVersions};

pub const EXAMPLES: &str = "\
Examples:
  # Print the supported API versions
  fedctl api-versions

  # Print the API versions served by cluster(member1)
  fedctl api-versions -C member1";

pub const POLICY: ClusterPolicy = ClusterPolicy::DefaultsToControlPlane;

#[derive(Debug, Args)]
pub struct ApiVersionsArgs {
	#[command(flatten)]
	pub cluster: ClusterArgs,

	#[arg(hide = true)]
	pub args: Vec<String>,
}

/// Run the api-versions command.
pub fn run<W: Write>(args: ApiVersionsArgs, global: &GlobalOptions, writer: W) -> Result<()> {
	super::execute(ApiVersions::new(writer), POLICY, global, &args.cluster, args.args)
}
