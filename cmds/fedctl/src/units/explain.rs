//! Describe the fields of a resource from the cluster's OpenAPI schema.
//!
//! Fields are addressed as `<type>.<fieldName>[.<fieldName>]`. The type is
//! resolved through discovery, then the path is walked through `properties`,
//! array `items` and `$ref` links of the OpenAPI v2 definitions.

use std::io::{self, Write};

use clap::{Args, ValueEnum};
use kube::Client;
use thiserror::Error;
use tracing::instrument;

use super::NotCompleted;
use crate::{
	adapter::CommandUnit,
	cluster::ConnectionConfig,
	k8s::{
		discovery::{DiscoveryError, GroupVersion, ServerResources},
		openapi::{OpenApiDocument, OpenApiError, Schema},
	},
};

/// Descriptions are wrapped to this many columns, indentation included.
const WRAP_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExplainFormat {
	#[default]
	Plaintext,
	#[value(name = "plaintext-openapiv2")]
	PlaintextOpenapiv2,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ExplainOptions {
	/// When true, print the name of all the fields recursively. Otherwise, print the available fields with their description.
	#[arg(long)]
	pub recursive: bool,

	/// Use given api-version (group/version) of the resource.
	#[arg(long)]
	pub api_version: Option<String>,

	/// Format in which to render the schema.
	#[arg(long, value_enum, default_value_t = ExplainFormat::Plaintext)]
	pub output: ExplainFormat,
}

#[derive(Debug, Error)]
pub enum ExplainError {
	#[error(
		"You must specify the type of resource to explain. \
		 Use \"fedctl api-resources\" for a complete list of supported resources."
	)]
	MissingResource,

	#[error("We accept only this format: explain RESOURCE")]
	TooManyArguments,

	#[error("failed to create client")]
	Client(#[source] kube::Error),

	#[error("failed to discover server resources")]
	Discovery(#[from] DiscoveryError),

	#[error("the server doesn't have a resource type \"{0}\"")]
	UnknownResource(String),

	#[error(transparent)]
	OpenApi(#[from] OpenApiError),

	#[error("couldn't find resource for \"{api_version}, Kind={kind}\"")]
	MissingSchema { api_version: String, kind: String },

	#[error("field \"{0}\" does not exist")]
	UnknownField(String),

	#[error("failed to write output")]
	Output(#[from] io::Error),

	#[error(transparent)]
	NotCompleted(#[from] NotCompleted),
}

pub struct Explain<W> {
	options: ExplainOptions,
	out: W,
	client: Option<Client>,
	args: Vec<String>,
}

impl<W: Write> Explain<W> {
	pub fn new(options: ExplainOptions, out: W) -> Self {
		Self {
			options,
			out,
			client: None,
			args: Vec::new(),
		}
	}
}

impl<W: Write> CommandUnit for Explain<W> {
	type Error = ExplainError;

	async fn complete(&mut self, connection: ConnectionConfig, args: Vec<String>) -> Result<(), Self::Error> {
		self.args = args;
		self.client = Some(connection.client().map_err(ExplainError::Client)?);
		Ok(())
	}

	fn validate(&mut self) -> Result<(), Self::Error> {
		match self.args.len() {
			0 => Err(ExplainError::MissingResource),
			1 => Ok(()),
			_ => Err(ExplainError::TooManyArguments),
		}
	}

	#[instrument(skip_all, fields(query = ?self.args.first()))]
	async fn run(&mut self) -> Result<(), Self::Error> {
		let client = self.client.as_ref().ok_or(NotCompleted)?;
		let query = self.args.first().ok_or(ExplainError::MissingResource)?;
		let mut path = query.split('.');
		let resource_name = path.next().unwrap_or_default();
		let fields: Vec<&str> = path.collect();

		let resources = match &self.options.api_version {
			Some(api_version) => {
				ServerResources::for_group_version(client, &GroupVersion::parse(api_version)).await?
			}
			None => ServerResources::preferred(client).await?,
		};
		let resource = resources
			.find(resource_name)
			.ok_or_else(|| ExplainError::UnknownResource(resource_name.to_string()))?;
		tracing::debug!(
			api_version = %resource.api_version(),
			kind = %resource.kind(),
			"resolved resource"
		);

		let document = OpenApiDocument::fetch(client).await?;
		let group_version = &resource.group_version;
		let root = document
			.find_kind(&group_version.group, &group_version.version, resource.kind())
			.ok_or_else(|| ExplainError::MissingSchema {
				api_version: resource.api_version(),
				kind: resource.kind().to_string(),
			})?;

		let explained = walk(&document, root, &fields)?;
		Renderer {
			document: &document,
			format: self.options.output,
		}
		.render(
			&mut self.out,
			group_version,
			resource.kind(),
			&explained,
			self.options.recursive,
		)?;
		self.out.flush()?;
		Ok(())
	}
}

/// The node a field path ends at.
#[derive(Debug)]
struct Explained<'a> {
	/// Last field of the path with its unresolved schema, if the path was non-empty.
	field: Option<(&'a str, Schema<'a>)>,
	/// Resolved schema whose properties are listed.
	node: Schema<'a>,
	/// Whether the parent lists `field` as required.
	required: bool,
}

fn walk<'a>(document: &'a OpenApiDocument, root: Schema<'a>, path: &[&'a str]) -> Result<Explained<'a>, ExplainError> {
	let mut explained = Explained {
		field: None,
		node: document.resolve(root),
		required: false,
	};
	for name in path {
		let schema = explained
			.node
			.property(name)
			.ok_or_else(|| ExplainError::UnknownField((*name).to_string()))?;
		explained = Explained {
			field: Some((*name, schema)),
			node: element(document, schema),
			required: explained.node.is_required(name),
		};
	}
	Ok(explained)
}

/// Resolve references and unwrap arrays down to the element schema.
fn element<'a>(document: &'a OpenApiDocument, schema: Schema<'a>) -> Schema<'a> {
	let mut current = document.resolve(schema);
	while current.type_name() == Some("array") {
		let Some(items) = current.items() else {
			break;
		};
		current = document.resolve(items);
	}
	current
}

struct Renderer<'d> {
	document: &'d OpenApiDocument,
	format: ExplainFormat,
}

impl<'d> Renderer<'d> {
	/// Width of the `KIND:` style header labels.
	fn label_width(&self) -> usize {
		match self.format {
			ExplainFormat::Plaintext => 12,
			ExplainFormat::PlaintextOpenapiv2 => 10,
		}
	}

	/// Indentation step for field lists and nested fields.
	fn step(&self) -> usize {
		match self.format {
			ExplainFormat::Plaintext => 2,
			ExplainFormat::PlaintextOpenapiv2 => 3,
		}
	}

	fn render<W: Write>(
		&self,
		out: &mut W,
		group_version: &GroupVersion,
		kind: &str,
		explained: &Explained<'d>,
		recursive: bool,
	) -> io::Result<()> {
		let width = self.label_width();
		match self.format {
			ExplainFormat::Plaintext => {
				if !group_version.is_core() {
					writeln!(out, "{:width$}{}", "GROUP:", group_version.group)?;
				}
				writeln!(out, "{:width$}{kind}", "KIND:")?;
				writeln!(out, "{:width$}{}", "VERSION:", group_version.version)?;
			}
			ExplainFormat::PlaintextOpenapiv2 => {
				writeln!(out, "{:width$}{kind}", "KIND:")?;
				writeln!(out, "{:width$}{group_version}", "VERSION:")?;
			}
		}
		writeln!(out)?;

		let mut descriptions = Vec::new();
		if let Some((name, schema)) = explained.field {
			let header = match self.format {
				ExplainFormat::Plaintext => "FIELD:",
				ExplainFormat::PlaintextOpenapiv2 => "RESOURCE:",
			};
			let required = if explained.required { " -required-" } else { "" };
			writeln!(out, "{header} {name} <{}>{required}", self.type_label(schema))?;
			writeln!(out)?;
			descriptions.push(schema.description());
			if explained.node.definition.is_some() {
				descriptions.push(explained.node.description());
			}
		} else {
			descriptions.push(explained.node.description());
		}

		let indent = self.step() + 2;
		writeln!(out, "DESCRIPTION:")?;
		let descriptions: Vec<_> = descriptions.into_iter().filter(|d| !d.is_empty()).collect();
		if descriptions.is_empty() {
			writeln!(out, "{:indent$}<empty>", "")?;
		}
		for (i, description) in descriptions.iter().enumerate() {
			if i > 0 {
				writeln!(out)?;
			}
			write_wrapped(out, description, indent)?;
		}

		let properties = sorted_properties(explained.node);
		if properties.is_empty() {
			return Ok(());
		}
		writeln!(out)?;
		writeln!(out, "FIELDS:")?;
		if recursive {
			let mut stack: Vec<&str> = explained.node.definition.into_iter().collect();
			self.write_tree(out, explained.node, self.step(), &mut stack)
		} else {
			self.write_fields(out, explained.node, &properties)
		}
	}

	fn write_fields<W: Write>(
		&self,
		out: &mut W,
		node: Schema<'_>,
		properties: &[(&str, Schema<'_>)],
	) -> io::Result<()> {
		let indent = self.step();
		for (name, schema) in properties {
			let required = if node.is_required(name) { " -required-" } else { "" };
			writeln!(out, "{:indent$}{name}\t<{}>{required}", "", self.type_label(*schema))?;
			let description = schema.description();
			if description.is_empty() {
				writeln!(out, "{:width$}<no description>", "", width = indent + 2)?;
			} else {
				write_wrapped(out, description, indent + 2)?;
			}
			writeln!(out)?;
		}
		Ok(())
	}

	/// Field names only, descending into nested objects.
	///
	/// `stack` holds the definitions on the current path; a definition is never
	/// entered twice on one path.
	fn write_tree<W: Write>(
		&self,
		out: &mut W,
		node: Schema<'d>,
		indent: usize,
		stack: &mut Vec<&'d str>,
	) -> io::Result<()> {
		for (name, schema) in sorted_properties(node) {
			writeln!(out, "{:indent$}{name}\t<{}>", "", self.type_label(schema))?;

			let child = element(self.document, schema);
			let entered = match child.definition {
				Some(definition) if stack.contains(&definition) => continue,
				Some(definition) => {
					stack.push(definition);
					true
				}
				None => false,
			};
			self.write_tree(out, child, indent + self.step(), stack)?;
			if entered {
				stack.pop();
			}
		}
		Ok(())
	}

	fn type_label(&self, schema: Schema<'_>) -> String {
		if let Some(name) = schema.ref_short_name() {
			return match self.format {
				ExplainFormat::Plaintext => name.to_string(),
				ExplainFormat::PlaintextOpenapiv2 => "Object".to_string(),
			};
		}
		match schema.type_name() {
			Some("array") => match schema.items() {
				Some(items) => format!("[]{}", self.type_label(items)),
				None => "[]Object".to_string(),
			},
			Some("object") | None => match schema.additional_properties() {
				Some(values) => format!("map[string]{}", self.type_label(values)),
				None => "Object".to_string(),
			},
			Some(other) => other.to_string(),
		}
	}
}

fn sorted_properties(node: Schema<'_>) -> Vec<(&str, Schema<'_>)> {
	let mut properties = node.properties();
	properties.sort_by_key(|(name, _)| *name);
	properties
}

/// Write `text` word-wrapped, each line prefixed with `indent` spaces.
fn write_wrapped<W: Write>(out: &mut W, text: &str, indent: usize) -> io::Result<()> {
	let width = WRAP_WIDTH.saturating_sub(indent).max(20);
	for paragraph in text.lines() {
		let mut line = String::new();
		for word in paragraph.split_whitespace() {
			if !line.is_empty() && line.len() + 1 + word.len() > width {
				writeln!(out, "{:indent$}{line}", "")?;
				line.clear();
			}
			if !line.is_empty() {
				line.push(' ');
			}
			line.push_str(word);
		}
		if line.is_empty() {
			writeln!(out)?;
		} else {
			writeln!(out, "{:indent$}{line}", "")?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;
	use k8s_mock::openapi::default_document;
	use rstest::rstest;

	use super::*;

	fn document() -> OpenApiDocument {
		OpenApiDocument::from_value(default_document()).unwrap()
	}

	fn explain(query: &str, api_version: &str, kind: &str, format: ExplainFormat, recursive: bool) -> String {
		let document = document();
		let group_version = GroupVersion::parse(api_version);
		let root = document
			.find_kind(&group_version.group, &group_version.version, kind)
			.unwrap();
		let fields: Vec<&str> = query.split('.').skip(1).collect();
		let explained = walk(&document, root, &fields).unwrap();

		let mut out = Vec::new();
		Renderer {
			document: &document,
			format,
		}
		.render(&mut out, &group_version, kind, &explained, recursive)
		.unwrap();
		String::from_utf8(out).unwrap()
	}

	fn validate(args: &[&str]) -> Result<(), ExplainError> {
		let mut unit = Explain::new(ExplainOptions::default(), Vec::new());
		unit.args = args.iter().map(|a| (*a).to_string()).collect();
		unit.validate()
	}

	#[test]
	fn test_validate_requires_one_argument() {
		assert_matches!(validate(&[]), Err(ExplainError::MissingResource));
		assert_matches!(validate(&["pods", "extra"]), Err(ExplainError::TooManyArguments));
		assert!(validate(&["pods.spec"]).is_ok());
	}

	#[test]
	fn test_missing_resource_message() {
		assert!(ExplainError::MissingResource
			.to_string()
			.starts_with("You must specify the type of resource to explain."));
		assert_eq!(
			ExplainError::TooManyArguments.to_string(),
			"We accept only this format: explain RESOURCE"
		);
	}

	#[test]
	fn test_explain_field_plaintext() {
		assert_eq!(
			explain("pods.spec", "v1", "Pod", ExplainFormat::Plaintext, false),
			indoc! {"
				KIND:       Pod
				VERSION:    v1

				FIELD: spec <PodSpec>

				DESCRIPTION:
				    Specification of the desired behavior of the pod.

				    PodSpec is a description of a pod.

				FIELDS:
				  containers\t<[]Container> -required-
				    List of containers belonging to the pod.

				  nodeName\t<string>
				    NodeName indicates in which node this pod is scheduled.

				  restartPolicy\t<string>
				    Restart policy for all containers within the pod.

			"}
		);
	}

	#[test]
	fn test_explain_required_field_header() {
		let output = explain("pods.spec.containers", "v1", "Pod", ExplainFormat::Plaintext, false);
		assert!(output.contains("FIELD: containers <[]Container> -required-\n"));
		assert!(output.contains("  name\t<string> -required-\n"));
		assert!(output.contains("  image\t<string>\n"));
	}

	#[test]
	fn test_explain_group_resource_openapiv2() {
		let output = explain(
			"deployments",
			"apps/v1",
			"Deployment",
			ExplainFormat::PlaintextOpenapiv2,
			false,
		);
		assert!(output.starts_with(indoc! {"
			KIND:     Deployment
			VERSION:  apps/v1

			DESCRIPTION:
			     Deployment enables declarative updates for Pods and ReplicaSets.

			FIELDS:
			   apiVersion\t<string>
		"}));
		assert!(output.contains("   metadata\t<Object>\n"));
	}

	#[test]
	fn test_explain_group_resource_plaintext_has_group() {
		let output = explain("deployments", "apps/v1", "Deployment", ExplainFormat::Plaintext, false);
		assert!(output.starts_with("GROUP:      apps\nKIND:       Deployment\nVERSION:    v1\n\n"));
		assert!(output.contains("  metadata\t<ObjectMeta>\n"));
	}

	#[test]
	fn test_explain_recursive() {
		let output = explain(
			"deployments",
			"apps/v1",
			"Deployment",
			ExplainFormat::PlaintextOpenapiv2,
			true,
		);
		let fields = &output[output.find("FIELDS:\n").unwrap()..];
		assert_eq!(
			fields,
			indoc! {"
				FIELDS:
				   apiVersion\t<string>
				   kind\t<string>
				   metadata\t<Object>
				      labels\t<map[string]string>
				      name\t<string>
				      namespace\t<string>
				   spec\t<Object>
				      replicas\t<integer>
				      selector\t<map[string]string>
				      template\t<Object>
				         metadata\t<Object>
				            labels\t<map[string]string>
				            name\t<string>
				            namespace\t<string>
				         spec\t<Object>
				            containers\t<[]Object>
				               args\t<[]string>
				               image\t<string>
				               name\t<string>
				               stdin\t<boolean>
				               tty\t<boolean>
				            nodeName\t<string>
				            restartPolicy\t<string>
			"}
		);
	}

	#[test]
	fn test_recursive_tree_stops_at_cycles() {
		let document = OpenApiDocument::from_value(serde_json::json!({
			"definitions": {
				"io.example.Node": {
					"x-kubernetes-group-version-kind": [{"group": "example.io", "version": "v1", "kind": "Node"}],
					"properties": {
						"next": {"$ref": "#/definitions/io.example.Node"},
						"value": {"type": "string"}
					}
				}
			}
		}))
		.unwrap();
		let root = document.find_kind("example.io", "v1", "Node").unwrap();
		let explained = walk(&document, root, &[]).unwrap();
		let mut out = Vec::new();
		Renderer {
			document: &document,
			format: ExplainFormat::Plaintext,
		}
		.render(&mut out, &GroupVersion::parse("example.io/v1"), "Node", &explained, true)
		.unwrap();

		let output = String::from_utf8(out).unwrap();
		assert!(output.ends_with("FIELDS:\n  next\t<Node>\n  value\t<string>\n"));
	}

	#[rstest]
	#[case::top_level("pods.status")]
	#[case::nested("pods.spec.volumes")]
	fn test_unknown_field(#[case] query: &str) {
		let document = document();
		let root = document.find_kind("", "v1", "Pod").unwrap();
		let fields: Vec<&str> = query.split('.').skip(1).collect();
		let last = (*fields.last().unwrap()).to_string();
		assert_matches!(
			walk(&document, root, &fields),
			Err(ExplainError::UnknownField(name)) if name == last
		);
	}

	#[test]
	fn test_wrap_long_description() {
		let mut out = Vec::new();
		let text = "word ".repeat(30);
		write_wrapped(&mut out, text.trim_end(), 4).unwrap();
		let output = String::from_utf8(out).unwrap();
		assert!(output.lines().count() > 1);
		assert!(output.lines().all(|line| line.len() <= WRAP_WIDTH));
		assert!(output.lines().all(|line| line.starts_with("    word")));
	}
}
