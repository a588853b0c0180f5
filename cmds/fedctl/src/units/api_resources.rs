//! Print the API resources a cluster serves.

use std::io::{self, Write};

use clap::Args;
use kube::Client;
use tabwriter::TabWriter;
use thiserror::Error;
use tracing::instrument;

use super::{reject_arguments, NotCompleted, UnexpectedArguments};
use crate::{
	adapter::CommandUnit,
	cluster::ConnectionConfig,
	k8s::discovery::{DiscoveredResource, DiscoveryError, ServerResources},
};

#[derive(Debug, Clone, Default, Args)]
pub struct ApiResourcesOptions {
	/// When using the default or custom-column output format, don't print headers (default print headers).
	#[arg(long)]
	pub no_headers: bool,

	/// Output format. One of: (wide, name).
	#[arg(short = 'o', long)]
	pub output: Option<String>,

	/// Limit to resources in the specified API group.
	#[arg(long)]
	pub api_group: Option<String>,

	/// If false, non-namespaced resources will be returned, otherwise returning namespaced resources by default.
	#[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
	pub namespaced: Option<bool>,

	/// Limit to resources that support the specified verbs.
	#[arg(long, value_delimiter = ',')]
	pub verbs: Vec<String>,

	/// If non-empty, sort list of resources using specified field. The field can be either 'name' or 'kind'.
	#[arg(long)]
	pub sort_by: Option<String>,

	/// Use the cached list of resources if available.
	#[arg(long)]
	pub cached: bool,

	/// Limit to resources that belong to the specified categories.
	#[arg(long, value_delimiter = ',')]
	pub categories: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ApiResourcesError {
	#[error(transparent)]
	UnexpectedArguments(#[from] UnexpectedArguments),

	#[error("--output {0} is not available")]
	InvalidOutput(String),

	#[error("--sort-by accepts only name or kind")]
	InvalidSortBy,

	#[error("failed to create client")]
	Client(#[source] kube::Error),

	#[error("failed to discover server resources")]
	Discovery(#[from] DiscoveryError),

	#[error("failed to write output")]
	Output(#[from] io::Error),

	#[error(transparent)]
	NotCompleted(#[from] NotCompleted),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
	Table,
	Wide,
	Name,
}

impl OutputFormat {
	fn parse(output: Option<&str>) -> Result<Self, ApiResourcesError> {
		match output.unwrap_or_default() {
			"" => Ok(Self::Table),
			"wide" => Ok(Self::Wide),
			"name" => Ok(Self::Name),
			other => Err(ApiResourcesError::InvalidOutput(other.to_string())),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortBy {
	Group,
	Name,
	Kind,
}

impl SortBy {
	fn parse(sort_by: Option<&str>) -> Result<Self, ApiResourcesError> {
		match sort_by.unwrap_or_default() {
			"" => Ok(Self::Group),
			"name" => Ok(Self::Name),
			"kind" => Ok(Self::Kind),
			_ => Err(ApiResourcesError::InvalidSortBy),
		}
	}

	fn key<'a>(self, resource: &'a DiscoveredResource) -> &'a str {
		match self {
			Self::Group => resource.group(),
			Self::Name => resource.name(),
			Self::Kind => resource.kind(),
		}
	}
}

pub struct ApiResources<W> {
	options: ApiResourcesOptions,
	out: W,
	client: Option<Client>,
	format: OutputFormat,
	sort_by: SortBy,
}

impl<W: Write> ApiResources<W> {
	pub fn new(options: ApiResourcesOptions, out: W) -> Self {
		Self {
			options,
			out,
			client: None,
			format: OutputFormat::Table,
			sort_by: SortBy::Group,
		}
	}
}

impl<W: Write> CommandUnit for ApiResources<W> {
	type Error = ApiResourcesError;

	async fn complete(&mut self, connection: ConnectionConfig, args: Vec<String>) -> Result<(), Self::Error> {
		reject_arguments(args)?;
		self.client = Some(connection.client().map_err(ApiResourcesError::Client)?);
		Ok(())
	}

	fn validate(&mut self) -> Result<(), Self::Error> {
		self.format = OutputFormat::parse(self.options.output.as_deref())?;
		self.sort_by = SortBy::parse(self.options.sort_by.as_deref())?;
		Ok(())
	}

	#[instrument(skip_all)]
	async fn run(&mut self) -> Result<(), Self::Error> {
		let client = self.client.as_ref().ok_or(NotCompleted)?;
		if self.options.cached {
			tracing::warn!("--cached has no effect: discovery results are never cached");
		}

		let discovered = ServerResources::preferred(client).await?;
		let resources = select(discovered.into_vec(), &self.options, self.sort_by);
		tracing::debug!(count = resources.len(), "selected resources");

		print(&mut self.out, &resources, self.format, self.options.no_headers)?;
		Ok(())
	}
}

/// Apply the filters and sort order.
fn select(
	resources: Vec<DiscoveredResource>,
	options: &ApiResourcesOptions,
	sort_by: SortBy,
) -> Vec<DiscoveredResource> {
	let mut selected: Vec<_> = resources
		.into_iter()
		.filter(|r| {
			options
				.api_group
				.as_deref()
				.is_none_or(|group| group.is_empty() || r.group() == group)
		})
		.filter(|r| {
			options
				.namespaced
				.is_none_or(|namespaced| r.resource.namespaced == namespaced)
		})
		.filter(|r| {
			options
				.verbs
				.iter()
				.all(|verb| r.resource.verbs.contains(verb))
		})
		.filter(|r| {
			options
				.categories
				.iter()
				.all(|category| r.categories().contains(category))
		})
		.collect();

	selected.sort_by(|a, b| {
		sort_by
			.key(a)
			.cmp(sort_by.key(b))
			.then_with(|| a.name().cmp(b.name()))
	});
	selected
}

fn print<W: Write>(
	out: W,
	resources: &[DiscoveredResource],
	format: OutputFormat,
	no_headers: bool,
) -> io::Result<()> {
	let mut w = TabWriter::new(out).minwidth(6).padding(3);

	if format != OutputFormat::Name && !no_headers {
		write!(w, "NAME\tSHORTNAMES\tAPIVERSION\tNAMESPACED\tKIND")?;
		if format == OutputFormat::Wide {
			write!(w, "\tVERBS\tCATEGORIES")?;
		}
		writeln!(w)?;
	}

	for r in resources {
		match format {
			OutputFormat::Name => writeln!(w, "{}", r.qualified_name())?,
			OutputFormat::Table | OutputFormat::Wide => {
				write!(
					w,
					"{}\t{}\t{}\t{}\t{}",
					r.name(),
					r.short_names().join(","),
					r.api_version(),
					r.resource.namespaced,
					r.kind()
				)?;
				if format == OutputFormat::Wide {
					write!(
						w,
						"\t{}\t{}",
						r.resource.verbs.join(","),
						r.categories().join(",")
					)?;
				}
				writeln!(w)?;
			}
		}
	}

	w.flush()
}
