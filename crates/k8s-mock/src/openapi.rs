//! A trimmed OpenAPI v2 document served at `/openapi/v2`.
//!
//! Only the definitions needed to explain pods, deployments and configmaps are
//! included. Descriptions are shortened versions of the upstream ones.

use serde_json::{json, Value};

fn gvk(group: &str, version: &str, kind: &str) -> Value {
	json!([{ "group": group, "version": version, "kind": kind }])
}

fn object_meta() -> Value {
	json!({
		"description": "ObjectMeta is metadata that all persisted resources must have.",
		"type": "object",
		"properties": {
			"name": {
				"description": "Name must be unique within a namespace.",
				"type": "string"
			},
			"namespace": {
				"description": "Namespace defines the space within which each name must be unique.",
				"type": "string"
			},
			"labels": {
				"description": "Map of string keys and values that can be used to organize and categorize objects.",
				"type": "object",
				"additionalProperties": { "type": "string" }
			}
		}
	})
}

fn top_level(description: &str, kind: &str, spec_ref: Option<&str>, extra: Value) -> Value {
	let mut properties = json!({
		"apiVersion": {
			"description": "APIVersion defines the versioned schema of this representation of an object.",
			"type": "string"
		},
		"kind": {
			"description": "Kind is a string value representing the REST resource this object represents.",
			"type": "string"
		},
		"metadata": {
			"description": "Standard object's metadata.",
			"$ref": "#/definitions/io.k8s.apimachinery.pkg.apis.meta.v1.ObjectMeta"
		}
	});
	if let Some(spec_ref) = spec_ref {
		properties["spec"] = json!({
			"description": format!("Specification of the desired behavior of the {kind}."),
			"$ref": format!("#/definitions/{spec_ref}")
		});
	}
	if let (Value::Object(props), Value::Object(extra)) = (&mut properties, extra) {
		props.extend(extra);
	}
	json!({
		"description": description,
		"type": "object",
		"properties": properties,
	})
}

/// The default document: core/v1 Pod and ConfigMap, apps/v1 Deployment.
pub fn default_document() -> Value {
	let mut pod = top_level(
		"Pod is a collection of containers that can run on a host.",
		"pod",
		Some("io.k8s.api.core.v1.PodSpec"),
		json!({}),
	);
	pod["x-kubernetes-group-version-kind"] = gvk("", "v1", "Pod");

	let mut config_map = top_level(
		"ConfigMap holds configuration data for pods to consume.",
		"configmap",
		None,
		json!({
			"data": {
				"description": "Data contains the configuration data.",
				"type": "object",
				"additionalProperties": { "type": "string" }
			},
			"immutable": {
				"description": "Immutable, if set to true, ensures that data stored in the ConfigMap cannot be updated.",
				"type": "boolean"
			}
		}),
	);
	config_map["x-kubernetes-group-version-kind"] = gvk("", "v1", "ConfigMap");

	let mut deployment = top_level(
		"Deployment enables declarative updates for Pods and ReplicaSets.",
		"Deployment",
		Some("io.k8s.api.apps.v1.DeploymentSpec"),
		json!({}),
	);
	deployment["x-kubernetes-group-version-kind"] = gvk("apps", "v1", "Deployment");

	json!({
		"swagger": "2.0",
		"info": { "title": "Kubernetes", "version": "v1.31.0" },
		"paths": {},
		"definitions": {
			"io.k8s.apimachinery.pkg.apis.meta.v1.ObjectMeta": object_meta(),
			"io.k8s.api.core.v1.Pod": pod,
			"io.k8s.api.core.v1.ConfigMap": config_map,
			"io.k8s.api.apps.v1.Deployment": deployment,
			"io.k8s.api.core.v1.PodSpec": {
				"description": "PodSpec is a description of a pod.",
				"type": "object",
				"required": ["containers"],
				"properties": {
					"containers": {
						"description": "List of containers belonging to the pod.",
						"type": "array",
						"items": { "$ref": "#/definitions/io.k8s.api.core.v1.Container" }
					},
					"nodeName": {
						"description": "NodeName indicates in which node this pod is scheduled.",
						"type": "string"
					},
					"restartPolicy": {
						"description": "Restart policy for all containers within the pod.",
						"type": "string"
					}
				}
			},
			"io.k8s.api.core.v1.Container": {
				"description": "A single application container that you want to run within a pod.",
				"type": "object",
				"required": ["name"],
				"properties": {
					"name": {
						"description": "Name of the container specified as a DNS_LABEL.",
						"type": "string"
					},
					"image": {
						"description": "Container image name.",
						"type": "string"
					},
					"args": {
						"description": "Arguments to the entrypoint.",
						"type": "array",
						"items": { "type": "string" }
					},
					"stdin": {
						"description": "Whether this container should allocate a buffer for stdin in the container runtime.",
						"type": "boolean"
					},
					"tty": {
						"description": "Whether this container should allocate a TTY for itself.",
						"type": "boolean"
					}
				}
			},
			"io.k8s.api.apps.v1.DeploymentSpec": {
				"description": "DeploymentSpec is the specification of the desired behavior of the Deployment.",
				"type": "object",
				"required": ["selector", "template"],
				"properties": {
					"replicas": {
						"description": "Number of desired pods. Defaults to 1.",
						"type": "integer",
						"format": "int32"
					},
					"selector": {
						"description": "Label selector for pods.",
						"type": "object",
						"additionalProperties": { "type": "string" }
					},
					"template": {
						"description": "Template describes the pods that will be created.",
						"$ref": "#/definitions/io.k8s.api.core.v1.PodTemplateSpec"
					}
				}
			},
			"io.k8s.api.core.v1.PodTemplateSpec": {
				"description": "PodTemplateSpec describes the data a pod should have when created from a template.",
				"type": "object",
				"properties": {
					"metadata": {
						"description": "Standard object's metadata.",
						"$ref": "#/definitions/io.k8s.apimachinery.pkg.apis.meta.v1.ObjectMeta"
					},
					"spec": {
						"description": "Specification of the desired behavior of the pod.",
						"$ref": "#/definitions/io.k8s.api.core.v1.PodSpec"
					}
				}
			}
		}
	})
}
