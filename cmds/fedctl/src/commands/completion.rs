//! completion command handler.

use std::io::Write;

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::cli::Cli;

#[derive(Debug, Args)]
pub struct CompletionArgs {
	/// Shell to generate the completion script for
	#[arg(value_enum)]
	pub shell: Shell,
}

/// Write the completion script for the requested shell.
pub fn run<W: Write>(args: CompletionArgs, mut writer: W) -> Result<()> {
	let mut command = Cli::command();
	let name = command.get_name().to_string();
	clap_complete::generate(args.shell, &mut command, name, &mut writer);
	writer.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bash_completion_lists_subcommands() {
		let mut out = Vec::new();
		run(CompletionArgs { shell: Shell::Bash }, &mut out).unwrap();
		let script = String::from_utf8(out).unwrap();
		assert!(script.contains("fedctl"));
		assert!(script.contains("api-resources"));
		assert!(script.contains("attach"));
	}
}
