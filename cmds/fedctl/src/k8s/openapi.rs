//! OpenAPI v2 schema access.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

const DEFINITION_PREFIX: &str = "#/definitions/";

/// Longest `$ref` chain followed before giving up.
const MAX_REF_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum OpenApiError {
	#[error("failed to build OpenAPI request")]
	Request(#[from] http::Error),

	#[error("failed to download OpenAPI schema")]
	Fetch(#[source] kube::Error),

	#[error("failed to parse OpenAPI schema")]
	Parse(#[from] serde_json::Error),

	#[error("OpenAPI schema has no definitions")]
	MissingDefinitions,
}

/// The `definitions` section of an OpenAPI v2 document.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
	definitions: Map<String, Value>,
}

impl OpenApiDocument {
	/// Download `/openapi/v2` from the cluster.
	#[instrument(skip(client))]
	pub async fn fetch(client: &kube::Client) -> Result<Self, OpenApiError> {
		let request = http::Request::get("/openapi/v2")
			.header(http::header::ACCEPT, "application/json")
			.body(Vec::new())?;
		let text = client
			.request_text(request)
			.await
			.map_err(OpenApiError::Fetch)?;
		tracing::debug!(bytes = text.len(), "downloaded OpenAPI schema");
		Self::from_value(serde_json::from_str(&text)?)
	}

	pub fn from_value(mut document: Value) -> Result<Self, OpenApiError> {
		match document.get_mut("definitions").map(Value::take) {
			Some(Value::Object(definitions)) => Ok(Self { definitions }),
			_ => Err(OpenApiError::MissingDefinitions),
		}
	}

	/// The definition tagged with the given group, version and kind.
	pub fn find_kind(&self, group: &str, version: &str, kind: &str) -> Option<Schema<'_>> {
		self.definitions.iter().find_map(|(name, schema)| {
			let tagged = schema
				.get("x-kubernetes-group-version-kind")?
				.as_array()?
				.iter()
				.any(|gvk| {
					gvk.get("group").and_then(Value::as_str).unwrap_or_default() == group
						&& gvk.get("version").and_then(Value::as_str) == Some(version)
						&& gvk.get("kind").and_then(Value::as_str) == Some(kind)
				});
			tagged.then(|| Schema {
				value: schema,
				definition: Some(name.as_str()),
			})
		})
	}

	/// Follow `$ref` until a concrete schema is reached.
	///
	/// The returned schema remembers the last definition it passed through.
	pub fn resolve<'a>(&'a self, schema: Schema<'a>) -> Schema<'a> {
		let mut current = schema;
		for _ in 0..MAX_REF_DEPTH {
			let Some(name) = current.ref_target() else {
				return current;
			};
			let Some((name, value)) = self.definitions.get_key_value(name) else {
				return current;
			};
			current = Schema {
				value,
				definition: Some(name.as_str()),
			};
		}
		current
	}
}

/// A schema node plus the definition it was reached through, if any.
#[derive(Debug, Clone, Copy)]
pub struct Schema<'a> {
	pub value: &'a Value,
	pub definition: Option<&'a str>,
}

impl<'a> Schema<'a> {
	pub fn new(value: &'a Value) -> Self {
		Self {
			value,
			definition: None,
		}
	}

	fn ref_target(&self) -> Option<&'a str> {
		self.value
			.get("$ref")?
			.as_str()?
			.strip_prefix(DEFINITION_PREFIX)
	}

	/// Short name of the referenced definition (`io.k8s.api.core.v1.PodSpec` is `PodSpec`).
	pub fn ref_short_name(&self) -> Option<&'a str> {
		let target = self.ref_target()?;
		Some(target.rsplit('.').next().unwrap_or(target))
	}

	pub fn description(&self) -> &'a str {
		self.value
			.get("description")
			.and_then(Value::as_str)
			.unwrap_or_default()
	}

	pub fn type_name(&self) -> Option<&'a str> {
		self.value.get("type").and_then(Value::as_str)
	}

	pub fn items(&self) -> Option<Schema<'a>> {
		self.value.get("items").map(Schema::new)
	}

	pub fn additional_properties(&self) -> Option<Schema<'a>> {
		self.value
			.get("additionalProperties")
			.filter(|v| v.is_object())
			.map(Schema::new)
	}

	pub fn properties(&self) -> Vec<(&'a str, Schema<'a>)> {
		self.value
			.get("properties")
			.and_then(Value::as_object)
			.map(|props| {
				props
					.iter()
					.map(|(name, schema)| (name.as_str(), Schema::new(schema)))
					.collect()
			})
			.unwrap_or_default()
	}

	pub fn property(&self, name: &str) -> Option<Schema<'a>> {
		self.value
			.get("properties")?
			.get(name)
			.map(Schema::new)
	}

	pub fn is_required(&self, field: &str) -> bool {
		self.value
			.get("required")
			.and_then(Value::as_array)
			.is_some_and(|required| required.iter().any(|r| r.as_str() == Some(field)))
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn document() -> OpenApiDocument {
		OpenApiDocument::from_value(json!({
			"definitions": {
				"io.k8s.api.core.v1.Pod": {
					"description": "Pod.",
					"x-kubernetes-group-version-kind": [{"group": "", "version": "v1", "kind": "Pod"}],
					"properties": {
						"spec": {"$ref": "#/definitions/io.k8s.api.core.v1.PodSpec"}
					}
				},
				"io.k8s.api.core.v1.PodSpec": {
					"description": "PodSpec.",
					"required": ["containers"],
					"properties": {
						"containers": {"type": "array", "items": {"type": "object"}}
					}
				},
				"loop.A": {"$ref": "#/definitions/loop.B"},
				"loop.B": {"$ref": "#/definitions/loop.A"}
			}
		}))
		.unwrap()
	}

	#[test]
	fn test_find_kind() {
		let document = document();
		let pod = document.find_kind("", "v1", "Pod").unwrap();
		assert_eq!(pod.definition, Some("io.k8s.api.core.v1.Pod"));
		assert!(document.find_kind("apps", "v1", "Pod").is_none());
	}

	#[test]
	fn test_resolve_follows_ref() {
		let document = document();
		let pod = document.find_kind("", "v1", "Pod").unwrap();
		let spec = pod.property("spec").unwrap();
		assert_eq!(spec.ref_short_name(), Some("PodSpec"));

		let resolved = document.resolve(spec);
		assert_eq!(resolved.description(), "PodSpec.");
		assert_eq!(resolved.definition, Some("io.k8s.api.core.v1.PodSpec"));
		assert!(resolved.is_required("containers"));
		assert!(!resolved.is_required("nodeName"));
	}

	#[test]
	fn test_resolve_stops_on_cycles() {
		let document = document();
		let value = json!({"$ref": "#/definitions/loop.A"});
		let resolved = document.resolve(Schema::new(&value));
		assert!(resolved.ref_short_name().is_some());
	}

	#[test]
	fn test_missing_definitions() {
		assert!(matches!(
			OpenApiDocument::from_value(json!({"swagger": "2.0"})),
			Err(OpenApiError::MissingDefinitions)
		));
	}
}
