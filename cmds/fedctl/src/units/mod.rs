//! Single-cluster command units.
//!
//! Each unit owns its clap options, performs the kubectl-equivalent work
//! against whatever connection it is completed with, and knows nothing about
//! member clusters.

use thiserror::Error;

pub mod api_resources;
pub mod api_versions;
pub mod attach;
pub mod explain;

/// `run` was called on a unit that never completed.
#[derive(Debug, Error)]
#[error("command was run before it was completed")]
pub struct NotCompleted;

/// Positional arguments were passed to a command that takes none.
#[derive(Debug, Error)]
#[error("unexpected arguments: [{}]", .0.join(" "))]
pub struct UnexpectedArguments(pub Vec<String>);

fn reject_arguments(args: Vec<String>) -> Result<(), UnexpectedArguments> {
	if args.is_empty() {
		Ok(())
	} else {
		Err(UnexpectedArguments(args))
	}
}
