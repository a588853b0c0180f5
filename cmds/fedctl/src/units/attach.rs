//! Attach to a process that is already running inside an existing container.

use std::{
	fmt::Debug,
	io::{self, IsTerminal, Write},
	time::Duration,
};

use clap::Args;
use k8s_openapi::{
	api::{
		apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
		batch::v1::Job,
		core::v1::{Pod, ReplicationController, Service},
	},
	apimachinery::pkg::apis::meta::v1::LabelSelector,
	NamespaceResourceScope,
};
use kube::{
	api::{AttachParams, ListParams},
	Api, Client, Resource,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

use super::NotCompleted;
use crate::{
	adapter::CommandUnit,
	cluster::ConnectionConfig,
	config::parse_duration,
};

/// Annotation naming the container commands should default to.
pub const DEFAULT_CONTAINER_ANNOTATION: &str = "kubectl.kubernetes.io/default-container";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Args)]
pub struct AttachOptions {
	/// Container name. If omitted, use the kubectl.kubernetes.io/default-container annotation for selecting the container to be attached or the first container in the pod will be chosen
	#[arg(short = 'c', long)]
	pub container: Option<String>,

	/// Pass stdin to the container
	#[arg(short = 'i', long)]
	pub stdin: bool,

	/// Stdin is a TTY
	#[arg(short = 't', long)]
	pub tty: bool,

	/// Only print output from the remote session
	#[arg(short = 'q', long)]
	pub quiet: bool,

	/// The length of time (like 5s, 2m, or 3h, higher than zero) to wait until at least one pod is running
	#[arg(long, value_parser = parse_duration, default_value = "1m")]
	pub pod_running_timeout: Duration,
}

impl Default for AttachOptions {
	fn default() -> Self {
		Self {
			container: None,
			stdin: false,
			tty: false,
			quiet: false,
			pod_running_timeout: Duration::from_secs(60),
		}
	}
}

#[derive(Debug, Error)]
pub enum AttachError {
	#[error("at least 1 argument is required for attach")]
	MissingArguments,

	#[error("expected POD, TYPE/NAME, or TYPE NAME, (at most 2 arguments) saw {}: [{}]", .0.len(), .0.join(" "))]
	TooManyArguments(Vec<String>),

	#[error("--pod-running-timeout must be greater than 0")]
	InvalidTimeout,

	#[error("failed to create client")]
	Client(#[source] kube::Error),

	#[error("cannot attach to {0}: the resource type has no pods")]
	UnsupportedType(String),

	#[error("failed to get {kind} {name}")]
	Get {
		kind: &'static str,
		name: String,
		#[source]
		source: kube::Error,
	},

	#[error("failed to list pods matching {selector}")]
	List {
		selector: String,
		#[source]
		source: kube::Error,
	},

	#[error("cannot attach to {kind} {name}: it has no pod selector")]
	MissingSelector { kind: &'static str, name: String },

	#[error("timed out after {timeout:?} waiting for a running pod for {target}")]
	Timeout { target: String, timeout: Duration },

	#[error("cannot attach a container in a completed pod; current phase is {0}")]
	CompletedPod(String),

	#[error("container {container} not found in pod {pod}")]
	ContainerNotFound { container: String, pod: String },

	#[error("pod {0} has no containers")]
	NoContainers(String),

	#[error("failed to attach to pod {pod}")]
	Attach {
		pod: String,
		#[source]
		source: kube::Error,
	},

	#[error("attach session failed: {0}")]
	Session(String),

	#[error("failed to stream")]
	Io(#[from] io::Error),

	#[error(transparent)]
	NotCompleted(#[from] NotCompleted),
}

/// Controllers whose pods can be attached to through their label selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Workload {
	Deployment,
	ReplicaSet,
	StatefulSet,
	DaemonSet,
	Job,
	ReplicationController,
	Service,
}

impl Workload {
	fn kind(self) -> &'static str {
		match self {
			Self::Deployment => "deployment",
			Self::ReplicaSet => "replicaset",
			Self::StatefulSet => "statefulset",
			Self::DaemonSet => "daemonset",
			Self::Job => "job",
			Self::ReplicationController => "replicationcontroller",
			Self::Service => "service",
		}
	}
}

/// What the positional arguments point at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PodReference {
	Pod(String),
	Workload { workload: Workload, name: String },
}

impl PodReference {
	fn parse(args: &[String]) -> Result<Self, AttachError> {
		let (resource_type, name) = match args {
			[single] => match single.split_once('/') {
				Some((resource_type, name)) => (Some(resource_type), name),
				None => (None, single.as_str()),
			},
			[resource_type, name] => (Some(resource_type.as_str()), name.as_str()),
			[] => return Err(AttachError::MissingArguments),
			_ => return Err(AttachError::TooManyArguments(args.to_vec())),
		};
		let Some(resource_type) = resource_type else {
			return Ok(Self::Pod(name.to_string()));
		};

		// `deployments.apps` and `deployment` name the same thing.
		let base = resource_type
			.split('.')
			.next()
			.unwrap_or_default()
			.to_lowercase();
		let workload = match base.as_str() {
			"pod" | "pods" | "po" => return Ok(Self::Pod(name.to_string())),
			"deployment" | "deployments" | "deploy" => Workload::Deployment,
			"replicaset" | "replicasets" | "rs" => Workload::ReplicaSet,
			"statefulset" | "statefulsets" | "sts" => Workload::StatefulSet,
			"daemonset" | "daemonsets" | "ds" => Workload::DaemonSet,
			"job" | "jobs" => Workload::Job,
			"replicationcontroller" | "replicationcontrollers" | "rc" => Workload::ReplicationController,
			"service" | "services" | "svc" => Workload::Service,
			_ => return Err(AttachError::UnsupportedType(resource_type.to_string())),
		};
		Ok(Self::Workload {
			workload,
			name: name.to_string(),
		})
	}
}

impl std::fmt::Display for PodReference {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Pod(name) => write!(f, "pod/{name}"),
			Self::Workload { workload, name } => write!(f, "{}/{name}", workload.kind()),
		}
	}
}

/// A container of the pod as far as attaching is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContainerInfo {
	name: String,
	stdin: bool,
	tty: bool,
	/// Printed after the name when listing containers.
	suffix: &'static str,
}

/// Decide whether the session uses a TTY, with the warning for a refused request.
///
/// A container started with a TTY only speaks the TTY protocol, so one is
/// forced for it. Without stdin there is nothing to drive a TTY and it is
/// always off.
fn negotiate_tty(
	requested: bool,
	stdin: bool,
	container: &ContainerInfo,
	stdin_is_terminal: bool,
) -> (bool, Option<String>) {
	if requested && !container.tty {
		return (
			false,
			Some(format!(
				"error: Unable to use a TTY - container {} did not allocate one",
				container.name
			)),
		);
	}
	let tty = requested || container.tty;
	if !stdin {
		return (false, None);
	}
	if tty && !stdin_is_terminal {
		return (
			false,
			Some("Unable to use a TTY - input is not a terminal or the right kind of file".to_string()),
		);
	}
	(tty, None)
}

fn containers(pod: &Pod) -> Vec<ContainerInfo> {
	let Some(spec) = &pod.spec else {
		return Vec::new();
	};
	let regular = spec.containers.iter().map(|c| ContainerInfo {
		name: c.name.clone(),
		stdin: c.stdin.unwrap_or_default(),
		tty: c.tty.unwrap_or_default(),
		suffix: "",
	});
	let init = spec.init_containers.iter().flatten().map(|c| ContainerInfo {
		name: c.name.clone(),
		stdin: c.stdin.unwrap_or_default(),
		tty: c.tty.unwrap_or_default(),
		suffix: " (init)",
	});
	let ephemeral = spec
		.ephemeral_containers
		.iter()
		.flatten()
		.map(|c| ContainerInfo {
			name: c.name.clone(),
			stdin: c.stdin.unwrap_or_default(),
			tty: c.tty.unwrap_or_default(),
			suffix: " (ephem)",
		});
	regular.chain(init).chain(ephemeral).collect()
}

/// The container to attach to plus any notices to show the user.
fn pick_container(pod: &Pod, requested: Option<&str>) -> Result<(ContainerInfo, Vec<String>), AttachError> {
	let pod_name = pod.metadata.name.clone().unwrap_or_default();
	let all = containers(pod);

	if let Some(requested) = requested {
		return all
			.into_iter()
			.find(|c| c.name == requested)
			.map(|c| (c, Vec::new()))
			.ok_or_else(|| AttachError::ContainerNotFound {
				container: requested.to_string(),
				pod: pod_name,
			});
	}

	let mut notices = Vec::new();
	let annotated = pod
		.metadata
		.annotations
		.as_ref()
		.and_then(|a| a.get(DEFAULT_CONTAINER_ANNOTATION));
	if let Some(annotated) = annotated {
		if let Some(container) = all.iter().find(|c| &c.name == annotated) {
			return Ok((container.clone(), notices));
		}
		notices.push(format!(
			"Warning: default container name \"{annotated}\" not found in pod {pod_name}"
		));
	}

	let regular_count = pod.spec.as_ref().map_or(0, |s| s.containers.len());
	let first = all
		.first()
		.filter(|_| regular_count > 0)
		.cloned()
		.ok_or_else(|| AttachError::NoContainers(pod_name.clone()))?;
	if all.len() > 1 {
		let names: Vec<_> = all.iter().map(|c| format!("{}{}", c.name, c.suffix)).collect();
		notices.push(format!(
			"Defaulted container \"{}\" out of: {}",
			first.name,
			names.join(", ")
		));
	}
	Ok((first, notices))
}

/// Render a label selector in the `key=value,key in (a,b)` query syntax.
fn selector_string(selector: &LabelSelector) -> String {
	let mut terms: Vec<String> = selector
		.match_labels
		.iter()
		.flatten()
		.map(|(key, value)| format!("{key}={value}"))
		.collect();
	for requirement in selector.match_expressions.iter().flatten() {
		let values = requirement.values.clone().unwrap_or_default().join(",");
		let key = &requirement.key;
		terms.push(match requirement.operator.as_str() {
			"In" => format!("{key} in ({values})"),
			"NotIn" => format!("{key} notin ({values})"),
			"DoesNotExist" => format!("!{key}"),
			_ => key.clone(),
		});
	}
	terms.join(",")
}

fn map_selector(selector: Option<&std::collections::BTreeMap<String, String>>) -> String {
	selector
		.into_iter()
		.flatten()
		.map(|(key, value)| format!("{key}={value}"))
		.collect::<Vec<_>>()
		.join(",")
}

fn pod_phase(pod: &Pod) -> &str {
	pod.status
		.as_ref()
		.and_then(|s| s.phase.as_deref())
		.unwrap_or("Unknown")
}

/// Running pods first, then by name.
fn best_candidate(mut pods: Vec<Pod>) -> Option<Pod> {
	pods.sort_by(|a, b| {
		let not_running = |p: &Pod| pod_phase(p) != "Running";
		not_running(a)
			.cmp(&not_running(b))
			.then_with(|| a.metadata.name.cmp(&b.metadata.name))
	});
	pods.into_iter().next()
}

async fn get_object<K>(client: &Client, namespace: &str, kind: &'static str, name: &str) -> Result<K, AttachError>
where
	K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
	<K as Resource>::DynamicType: Default,
{
	Api::<K>::namespaced(client.clone(), namespace)
		.get(name)
		.await
		.map_err(|source| AttachError::Get {
			kind,
			name: name.to_string(),
			source,
		})
}

pub struct Attach<E> {
	options: AttachOptions,
	err: E,
	client: Option<Client>,
	namespace: String,
	args: Vec<String>,
}

impl<E: Write> Attach<E> {
	/// `err` receives notices such as the defaulted container name.
	pub fn new(options: AttachOptions, err: E) -> Self {
		Self {
			options,
			err,
			client: None,
			namespace: String::new(),
			args: Vec::new(),
		}
	}

	/// The label selector of a workload.
	async fn selector_for(&self, client: &Client, workload: Workload, name: &str) -> Result<String, AttachError> {
		let ns = &self.namespace;
		let kind = workload.kind();
		let selector = match workload {
			Workload::Deployment => {
				let object: Deployment = get_object(client, ns, kind, name).await?;
				object.spec.map(|s| selector_string(&s.selector))
			}
			Workload::ReplicaSet => {
				let object: ReplicaSet = get_object(client, ns, kind, name).await?;
				object.spec.map(|s| selector_string(&s.selector))
			}
			Workload::StatefulSet => {
				let object: StatefulSet = get_object(client, ns, kind, name).await?;
				object.spec.map(|s| selector_string(&s.selector))
			}
			Workload::DaemonSet => {
				let object: DaemonSet = get_object(client, ns, kind, name).await?;
				object.spec.map(|s| selector_string(&s.selector))
			}
			Workload::Job => {
				let object: Job = get_object(client, ns, kind, name).await?;
				object
					.spec
					.and_then(|s| s.selector)
					.map(|s| selector_string(&s))
			}
			Workload::ReplicationController => {
				let object: ReplicationController = get_object(client, ns, kind, name).await?;
				object.spec.map(|s| map_selector(s.selector.as_ref()))
			}
			Workload::Service => {
				let object: Service = get_object(client, ns, kind, name).await?;
				object.spec.map(|s| map_selector(s.selector.as_ref()))
			}
		};
		selector
			.filter(|s| !s.is_empty())
			.ok_or_else(|| AttachError::MissingSelector {
				kind,
				name: name.to_string(),
			})
	}

	/// Fetch the pod the reference currently points at, if any.
	async fn current_pod(
		&self,
		pods: &Api<Pod>,
		reference: &PodReference,
		selector: Option<&str>,
	) -> Result<Option<Pod>, AttachError> {
		match (reference, selector) {
			(PodReference::Pod(name), _) => pods
				.get(name)
				.await
				.map(Some)
				.map_err(|source| AttachError::Get {
					kind: "pod",
					name: name.clone(),
					source,
				}),
			(PodReference::Workload { .. }, Some(selector)) => {
				let list = pods
					.list(&ListParams::default().labels(selector))
					.await
					.map_err(|source| AttachError::List {
						selector: selector.to_string(),
						source,
					})?;
				Ok(best_candidate(list.items))
			}
			(PodReference::Workload { .. }, None) => Ok(None),
		}
	}

	/// Wait until the reference yields a running pod.
	///
	/// Completed pods fail immediately; pending ones are polled until the
	/// pod-running timeout expires.
	#[instrument(skip_all, fields(reference = %reference))]
	async fn wait_for_pod(&self, client: &Client, reference: &PodReference) -> Result<Pod, AttachError> {
		let selector = match reference {
			PodReference::Pod(_) => None,
			PodReference::Workload { workload, name } => Some(self.selector_for(client, *workload, name).await?),
		};
		let pods: Api<Pod> = Api::namespaced(client.clone(), &self.namespace);

		let timeout = self.options.pod_running_timeout;
		tokio::time::timeout(timeout, self.poll_until_running(&pods, reference, selector.as_deref()))
			.await
			.map_err(|_| AttachError::Timeout {
				target: reference.to_string(),
				timeout,
			})?
	}

	async fn poll_until_running(
		&self,
		pods: &Api<Pod>,
		reference: &PodReference,
		selector: Option<&str>,
	) -> Result<Pod, AttachError> {
		loop {
			if let Some(pod) = self.current_pod(pods, reference, selector).await? {
				match pod_phase(&pod) {
					"Running" => return Ok(pod),
					phase @ ("Succeeded" | "Failed") => {
						return Err(AttachError::CompletedPod(phase.to_string()));
					}
					phase => tracing::debug!(phase, "waiting for pod to run"),
				}
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}
}

/// Stream local stdio to and from the attached container.
async fn stream(pods: &Api<Pod>, pod: &str, params: &AttachParams) -> Result<(), AttachError> {
	let mut attached = pods
		.attach(pod, params)
		.await
		.map_err(|source| AttachError::Attach {
			pod: pod.to_string(),
			source,
		})?;

	let remote_stdin = attached.stdin();
	let remote_stdout = attached.stdout();
	let remote_stderr = attached.stderr();

	let input = async move {
		if let Some(mut remote) = remote_stdin {
			tokio::io::copy(&mut tokio::io::stdin(), &mut remote).await?;
		}
		Ok::<_, io::Error>(())
	};
	let output = async move {
		let stdout = async {
			if let Some(mut remote) = remote_stdout {
				tokio::io::copy(&mut remote, &mut tokio::io::stdout()).await?;
			}
			Ok::<_, io::Error>(())
		};
		let stderr = async {
			if let Some(mut remote) = remote_stderr {
				tokio::io::copy(&mut remote, &mut tokio::io::stderr()).await?;
			}
			Ok::<_, io::Error>(())
		};
		tokio::try_join!(stdout, stderr).map(|_| ())
	};
	let mut output = Box::pin(output);

	// Local stdin may stay open after the remote process exits.
	tokio::select! {
		result = input => {
			result?;
			(&mut output).await?;
		}
		result = &mut output => result?,
	}
	drop(output);

	if let Err(e) = attached.join().await {
		return Err(AttachError::Session(e.to_string()));
	}
	Ok(())
}

impl<E: Write> CommandUnit for Attach<E> {
	type Error = AttachError;

	async fn complete(&mut self, connection: ConnectionConfig, args: Vec<String>) -> Result<(), Self::Error> {
		self.namespace = connection.default_namespace().to_string();
		self.args = args;
		self.client = Some(connection.client().map_err(AttachError::Client)?);
		Ok(())
	}

	fn validate(&mut self) -> Result<(), Self::Error> {
		match self.args.len() {
			0 => return Err(AttachError::MissingArguments),
			1 | 2 => {}
			_ => return Err(AttachError::TooManyArguments(self.args.clone())),
		}
		if self.options.pod_running_timeout.is_zero() {
			return Err(AttachError::InvalidTimeout);
		}
		Ok(())
	}

	#[instrument(skip_all, fields(namespace = %self.namespace))]
	async fn run(&mut self) -> Result<(), Self::Error> {
		let client = self.client.clone().ok_or(NotCompleted)?;
		let reference = PodReference::parse(&self.args)?;
		let pod = self.wait_for_pod(&client, &reference).await?;
		let pod_name = pod.metadata.name.clone().unwrap_or_default();

		let (container, notices) = pick_container(&pod, self.options.container.as_deref())?;
		let quiet = self.options.quiet;
		if !quiet {
			for notice in &notices {
				writeln!(self.err, "{notice}")?;
			}
		}

		let (tty, warning) = negotiate_tty(
			self.options.tty,
			self.options.stdin,
			&container,
			io::stdin().is_terminal(),
		);
		if let Some(warning) = warning.filter(|_| !quiet) {
			writeln!(self.err, "{warning}")?;
		}
		if tty && !quiet {
			writeln!(self.err, "If you don't see a command prompt, try pressing enter.")?;
		}
		self.err.flush()?;

		tracing::debug!(pod = %pod_name, container = %container.name, tty, "attaching");
		let params = AttachParams::default()
			.container(container.name.as_str())
			.stdin(self.options.stdin)
			.stdout(true)
			.stderr(!tty)
			.tty(tty);
		let pods: Api<Pod> = Api::namespaced(client, &self.namespace);
		stream(&pods, &pod_name, &params).await
	}
}
