//! explain command handler.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::ClusterArgs;
use crate::{
	adapter::ClusterPolicy,
	cli::GlobalOptions,
	units::explain::{Explain, ExplainOptions},
};

pub const LONG_ABOUT: &str = "\
Describe fields and structure of various resources in the control plane or a member cluster.

This command describes the fields associated with each supported API resource.
Fields are identified via a simple JSONPath identifier:

    <type>.<fieldName>[.<fieldName>]

Information about each field is retrieved from the server in OpenAPI format.";

pub const EXAMPLES: &str = "\
Examples:
  # Get the documentation of the resource and its fields in the control plane
  fedctl explain pods

  # Get all the fields in the resource in member cluster member1
  fedctl explain pods --recursive -C member1

  # Get the explanation for deployment in supported api versions in the control plane
  fedctl explain deployments --api-version=apps/v1

  # Get the documentation of a specific field of a resource in member cluster member1
  fedctl explain pods.spec.containers -C member1

  # Get the documentation of resources in different format in the control plane
  fedctl explain deployment --output=plaintext-openapiv2";

pub const POLICY: ClusterPolicy = ClusterPolicy::DefaultsToControlPlane;

#[derive(Debug, Args)]
pub struct ExplainArgs {
	/// Resource type, optionally followed by a field path
	#[arg(value_name = "TYPE[.FIELD...]")]
	pub args: Vec<String>,

	#[command(flatten)]
	pub cluster: ClusterArgs,

	#[command(flatten)]
	pub options: ExplainOptions,
}

/// Run the explain command.
pub fn run<W: Write>(args: ExplainArgs, global: &GlobalOptions, writer: W) -> Result<()> {
	let unit = Explain::new(args.options, writer);
	super::execute(unit, POLICY, global, &args.cluster, args.args)
}
