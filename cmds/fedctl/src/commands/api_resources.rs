//! api-resources command handler.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::ClusterArgs;
use crate::{
	adapter::ClusterPolicy,
	cli::GlobalOptions,
	units::api_resources::{ApiResources, ApiResourcesOptions},
};

pub const EXAMPLES: &str = "\
Examples:
  # Print the supported API resources in the control plane
  fedctl api-resources

  # Print the supported API resources with more information in cluster(member1)
  fedctl api-resources -o wide -C member1

  # Print the supported API resources sorted by a column in the control plane
  fedctl api-resources --sort-by=name

  # Print the supported namespaced resources in the control plane
  fedctl api-resources --namespaced=true

  # Print the supported non-namespaced resources in the control plane
  fedctl api-resources --namespaced=false

  # Print the supported API resources with a specific APIGroup in the control plane
  fedctl api-resources --api-group=rbac.authorization.k8s.io";

/// Listing falls back to the control plane without `-C`.
pub const POLICY: ClusterPolicy = ClusterPolicy::DefaultsToControlPlane;

#[derive(Debug, Args)]
pub struct ApiResourcesArgs {
	#[command(flatten)]
	pub cluster: ClusterArgs,

	#[command(flatten)]
	pub options: ApiResourcesOptions,

	#[arg(hide = true)]
	pub args: Vec<String>,
}

/// Run the api-resources command.
pub fn run<W: Write>(args: ApiResourcesArgs, global: &GlobalOptions, writer: W) -> Result<()> {
	let unit = ApiResources::new(args.options, writer);
	super::execute(unit, POLICY, global, &args.cluster, args.args)
}
