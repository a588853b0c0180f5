//! attach command handler.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::ClusterArgs;
use crate::{
	adapter::ClusterPolicy,
	cli::GlobalOptions,
	units::attach::{Attach, AttachOptions},
};

pub const EXAMPLES: &str = "\
Examples:
  # Get output from running pod mypod in cluster(member1); use the 'kubectl.kubernetes.io/default-container' annotation
  # for selecting the container to be attached or the first container in the pod will be chosen
  fedctl attach mypod -C member1

  # Get output from ruby-container from pod mypod in cluster(member1)
  fedctl attach mypod -c ruby-container -C member1

  # Sends stdin to 'bash' in ruby-container from pod mypod in cluster(member1)
  # and sends stdout/stderr from 'bash' back to the client
  fedctl attach mypod -c ruby-container -i -t -C member1

  # Get output from the first pod of a replica set named nginx in cluster(member1)
  fedctl attach rs/nginx -C member1";

/// Attaching to the control plane makes no sense, so `-C` is mandatory.
pub const POLICY: ClusterPolicy = ClusterPolicy::RequiresMember;

#[derive(Debug, Args)]
pub struct AttachArgs {
	/// The pod to attach to, as POD, TYPE/NAME or TYPE NAME
	#[arg(value_name = "POD | TYPE/NAME")]
	pub args: Vec<String>,

	#[command(flatten)]
	pub cluster: ClusterArgs,

	#[command(flatten)]
	pub options: AttachOptions,
}

/// Run the attach command. Notices go to `err`; the session itself uses the
/// process stdio.
pub fn run<E: Write>(args: AttachArgs, global: &GlobalOptions, err: E) -> Result<()> {
	let unit = Attach::new(args.options, err);
	super::execute(unit, POLICY, global, &args.cluster, args.args)
}
