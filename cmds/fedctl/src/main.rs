use anyhow::Result;
use clap::Parser;
use fedctl::{
	cli::Cli,
	commands::{self, util::BrokenPipeGuard},
	telemetry,
};

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

fn main() -> Result<()> {
	let cli = Cli::parse();

	telemetry::init(cli.global.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());
	commands::dispatch(cli, stdout)
}
