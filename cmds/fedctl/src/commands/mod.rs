//! Subcommand registration and dispatch.
//!
//! Every cluster-aware subcommand flattens [`ClusterArgs`] next to its unit's
//! own options, and runs the unit through an [`Adapter`] with the policy it
//! registered.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args;

use crate::{
	adapter::{Adapter, ClusterPolicy, CommandUnit},
	cli::{Cli, Commands, GlobalOptions},
	cluster::ClusterSelector,
};

pub mod api_resources;
pub mod api_versions;
pub mod attach;
pub mod completion;
pub mod explain;

pub mod util;

/// The `-C/--cluster` flag shared by every cluster-aware subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct ClusterArgs {
	/// Specify a member cluster
	#[arg(short = 'C', long = "cluster", value_name = "NAME")]
	pub cluster: Option<String>,
}

impl ClusterArgs {
	pub fn selector(&self) -> ClusterSelector {
		ClusterSelector::from_flag(self.cluster.clone())
	}
}

/// Run the subcommand picked on the command line.
///
/// The connection factory is only built for subcommands that talk to a
/// cluster.
pub fn dispatch<W: Write>(cli: Cli, stdout: W) -> Result<()> {
	let Cli { global, command } = cli;
	match command {
		Commands::ApiResources(args) => api_resources::run(args, &global, stdout),
		Commands::ApiVersions(args) => api_versions::run(args, &global, stdout),
		Commands::Explain(args) => explain::run(args, &global, stdout),
		Commands::Attach(args) => attach::run(args, &global, io::stderr()),
		Commands::Completion(args) => completion::run(args, stdout),
	}
}

/// Drive a unit through complete, validate and run on a fresh runtime.
fn execute<U: CommandUnit>(
	unit: U,
	policy: ClusterPolicy,
	global: &GlobalOptions,
	cluster: &ClusterArgs,
	args: Vec<String>,
) -> Result<()> {
	let adapter = Adapter::new(unit, policy);
	let selector = cluster.selector();
	// Config and kubeconfig are only loaded once the selector is acceptable.
	adapter.check_selector(&selector)?;
	let factory = global.connection_factory()?;

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime.block_on(adapter.execute(&factory, selector, args))?;
	Ok(())
}
